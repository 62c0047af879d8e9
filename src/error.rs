// Error types for the webpack test runner plugin

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for plugin operations
///
/// This is the primary error type returned by the plugin hooks.
/// Individual error types are exposed through `From` conversions.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid test file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to resolve test files: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Compilation failed: {0}")]
    Compilation(#[from] CompilationError),

    #[error("Bundler error: {0}")]
    Bundler(#[from] BundlerError),

    #[error("Failed to read bundle asset '{}': {source}", path.display())]
    ReadAsset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compiler exited before reporting a compilation")]
    CompilerExited,

    #[error("Unsupported config file format: {}", path.display())]
    UnsupportedConfigFormat { path: PathBuf },

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed compilation as reported by the bundler
///
/// Mirrors what the compiler hands to its completion callback: a message,
/// an optional stack and optional extra details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationError {
    pub message: String,
    pub stack: Option<String>,
    pub details: Option<String>,
}

impl CompilationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CompilationError {}

/// Errors raised while starting or talking to the bundler process
#[derive(Debug, Error)]
pub enum BundlerError {
    #[error(
        "node not found. Install Node.js and make sure it is in PATH.\n\
         node is required to run the webpack compiler."
    )]
    NodeNotFound,

    #[error("Failed to spawn webpack driver: {0}")]
    Spawn(String),

    #[error("Malformed driver report: {0}")]
    Protocol(String),
}

/// Non-fatal diagnostics for user config fields the plugin overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    EntryIgnored,
    OutputFilenameIgnored,
    OptimizationIgnored,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::EntryIgnored => f.write_str(
                "webpack entries will be automatically created from each of your test files. \
                 The entry specified in the webpack config will be ignored.",
            ),
            ConfigWarning::OutputFilenameIgnored => f.write_str(
                "webpack output filename set to [name].js. \
                 The output filename specified in the webpack config will be ignored.",
            ),
            ConfigWarning::OptimizationIgnored => f.write_str(
                "The optimization settings specified in the webpack config will be ignored.",
            ),
        }
    }
}
