// Bundler integration - compiler seams, compilation handling, output location

pub mod handler;
pub mod node;

pub use handler::{BundlesView, CompilationEvent, CompilationHandler, CompilationReady};
pub use node::{NodeWatching, NodeWebpackBundler};

use crate::config::{Configuration, StatsOptions};
use crate::error::PluginError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the per-session output directory inside the temp dir
pub const OUTPUT_DIR_PREFIX: &str = "_wtr_webpack_";

/// Upper bound (exclusive) of the output directory's random suffix
pub const OUTPUT_DIR_ENTROPY: u32 = 1_000_000;

/// A bundler that can be started with a merged config
///
/// Implementations call `handler.handle(..)` once per finished compilation:
/// once in single-run mode, after every rebuild in watch mode.
pub trait Bundler: Send + Sync {
    /// Start compiling `config`, reporting to `handler`
    ///
    /// # Errors
    ///
    /// Returns an error if the compiler could not be started at all.
    /// Failed compilations are reported through the handler instead.
    fn compile(
        &self,
        config: Configuration,
        handler: CompilationHandler,
    ) -> Result<Box<dyn Watching>, PluginError>;
}

/// Handle to a started compiler
#[async_trait]
pub trait Watching: Send + Sync {
    /// Stop watching and release the compiler's resources
    async fn close(&mut self);
}

/// Result of a successful compilation
pub trait Stats {
    /// Human readable build report, formatted per the user's stats options
    fn render(&self, options: Option<&StatsOptions>) -> String;

    /// Machine readable summary of the compilation
    fn to_json(&self) -> StatsJson;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsJson {
    #[serde(default)]
    pub assets: Vec<StatsAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsAsset {
    pub name: String,
}

/// Fresh output directory for one session
///
/// A random suffix keeps concurrent sessions sharing the temp dir apart.
/// Collisions only mean one session overwrites another's bundles, so this
/// does not need to be unguessable.
pub fn output_path() -> PathBuf {
    output_path_in(&std::env::temp_dir(), &mut rand::rng())
}

/// `output_path` with an explicit temp dir and random source
pub fn output_path_in<R: Rng>(temp_dir: &Path, rng: &mut R) -> PathBuf {
    let suffix = rng.random_range(0..OUTPUT_DIR_ENTROPY);
    temp_dir.join(format!("{OUTPUT_DIR_PREFIX}{suffix}"))
}
