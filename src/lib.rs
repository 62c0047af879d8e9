// wtr-webpack-plugin - serve webpack bundles to a browser test runner
//
// Test files matched by the runner's globs become webpack entries keyed by
// a hash of their path. webpack builds them once (or keeps watching), the
// emitted bundles are held in memory, and the runner's file requests are
// answered from that map.

pub mod bundle;
pub mod config;
pub mod entries;
pub mod error;
pub mod path_key;
pub mod plugin;
pub mod serve;

#[cfg(test)]
mod test_support;

pub use bundle::{
    output_path, Bundler, BundlesView, CompilationEvent, CompilationHandler, CompilationReady,
    NodeWebpackBundler, Stats, StatsAsset, StatsJson, Watching,
};
pub use config::{
    generate_config, validate_user_config, Configuration, Entry, Mode, OutputOptions,
    StatsOptions, DEFAULT_OUTPUT_FILENAME,
};
pub use entries::{collect_entries, collect_test_files, EntryMap};
pub use error::{BundlerError, CompilationError, ConfigWarning, PluginError};
pub use path_key::{compute_key, force_js_extension, normalize_separators};
pub use plugin::{
    webpack_plugin, Context, Request, ServerStartParams, TestRunnerConfig, TestRunnerPlugin,
    WebpackPlugin, PLUGIN_NAME,
};
pub use serve::{serve, ServeResponse};
