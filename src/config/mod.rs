// Webpack configuration types, baseline and loading

pub mod merge;

pub use merge::{generate_config, validate_user_config};

use crate::entries::EntryMap;
use crate::error::PluginError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output filename every bundle is emitted under
pub const DEFAULT_OUTPUT_FILENAME: &str = "[name].js";

/// Webpack configuration understood by the plugin
///
/// The fields the plugin reads or enforces are typed. Everything else
/// (module rules, resolve, devtool, ...) rides along untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Entry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<Optimization>,

    /// Plugin entries, passed to webpack as plain JSON
    ///
    /// The node driver receives the config as JSON, so these cannot be plugin
    /// instances. Entries that are not objects webpack accepts as plugins make
    /// webpack reject the config, which surfaces as a failed compilation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<Value>>,

    /// Any other webpack option
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
    None,
}

/// Webpack `entry` in its string, array and object forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Path(String),
    Paths(Vec<String>),
    Named(BTreeMap<String, Value>),
}

impl Entry {
    pub fn is_empty(&self) -> bool {
        match self {
            Entry::Path(path) => path.is_empty(),
            Entry::Paths(paths) => paths.is_empty(),
            Entry::Named(named) => named.is_empty(),
        }
    }
}

impl From<EntryMap> for Entry {
    fn from(entries: EntryMap) -> Self {
        Entry::Named(
            entries
                .into_iter()
                .map(|(key, path)| (key, Value::String(path.to_string_lossy().into_owned())))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Webpack `stats`: a toggle, a preset name or an options object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatsOptions {
    Toggle(bool),
    Preset(String),
    Options(Map<String, Value>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_chunk: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_chunks: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Optimization {
    /// Single runtime chunk plus one shared `commons` chunk
    ///
    /// Every test bundle then loads the same runtime and module registry,
    /// which is what lets the runner import several bundles into one page.
    pub fn baseline() -> Self {
        Self {
            runtime_chunk: Some(Value::from("single")),
            split_chunks: Some(serde_json::json!({
                "chunks": "all",
                "minSize": 0,
                "cacheGroups": {
                    "commons": {
                        "name": "commons",
                        "chunks": "all",
                        "minChunks": 1
                    }
                }
            })),
            extra: Map::new(),
        }
    }
}

impl Configuration {
    /// The defaults every generated config starts from
    pub fn baseline() -> Self {
        let mut stats = Map::new();
        stats.insert("modules".to_string(), Value::Bool(false));
        stats.insert("colors".to_string(), Value::Bool(true));

        Self {
            mode: Some(Mode::Development),
            entry: None,
            output: Some(OutputOptions {
                filename: Some(DEFAULT_OUTPUT_FILENAME.to_string()),
                ..Default::default()
            }),
            watch: Some(false),
            stats: Some(StatsOptions::Options(stats)),
            optimization: Some(Optimization::baseline()),
            plugins: Some(Vec::new()),
            extra: Map::new(),
        }
    }

    /// Load a user config from a `.json` or `.toml` file
    ///
    /// # Errors
    ///
    /// Returns `PluginError::UnsupportedConfigFormat` for any other extension,
    /// and I/O or parse errors as they occur.
    pub fn from_file(path: &Path) -> Result<Self, PluginError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some("json") => {
                let raw = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&raw)?)
            }
            Some("toml") => {
                let raw = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&raw)?)
            }
            _ => Err(PluginError::UnsupportedConfigFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Output filename, if one is set
    pub fn output_filename(&self) -> Option<&str> {
        self.output.as_ref()?.filename.as_deref()
    }

    /// Output path, if one is set
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_ref()?.path.as_deref()
    }
}
