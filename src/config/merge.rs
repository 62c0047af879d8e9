// Config merging - baseline < user < plugin, field by field

use super::{Configuration, OutputOptions, StatsOptions, DEFAULT_OUTPUT_FILENAME};
use crate::error::ConfigWarning;
use serde_json::{Map, Value};

/// Strip the user config fields the plugin has to own
///
/// * `entry` is always generated from the test files.
/// * `output.filename` must stay `[name].js` so served keys line up with
///   bundle names. A matching value is kept silently.
/// * `optimization` is replaced by the fixed runtime/commons split.
///
/// Each stripped field produces a `ConfigWarning`, which is also logged.
pub fn validate_user_config(user_config: &Configuration) -> (Configuration, Vec<ConfigWarning>) {
    let mut config = user_config.clone();
    let mut warnings = Vec::new();

    if let Some(entry) = config.entry.take() {
        if !entry.is_empty() {
            warnings.push(ConfigWarning::EntryIgnored);
        }
    }

    if let Some(output) = config.output.as_mut() {
        let filename = output.filename.as_deref().unwrap_or(DEFAULT_OUTPUT_FILENAME);
        if filename != DEFAULT_OUTPUT_FILENAME {
            warnings.push(ConfigWarning::OutputFilenameIgnored);
            output.filename = None;
        }
    }

    if config.optimization.take().is_some() {
        warnings.push(ConfigWarning::OptimizationIgnored);
    }

    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    (config, warnings)
}

/// Build the final webpack config
///
/// Precedence, lowest first: the baseline, the sanitized user config, then
/// `plugin_config` (entries, output path and watch flag computed for the
/// session).
pub fn generate_config(user_config: &Configuration, plugin_config: Configuration) -> Configuration {
    let (valid_config, _) = validate_user_config(user_config);

    [valid_config, plugin_config]
        .into_iter()
        .fold(Configuration::baseline(), merge_config)
}

fn merge_config(base: Configuration, overlay: Configuration) -> Configuration {
    Configuration {
        mode: overlay.mode.or(base.mode),
        entry: overlay.entry.or(base.entry),
        output: merge_option(base.output, overlay.output, merge_output),
        watch: overlay.watch.or(base.watch),
        stats: merge_option(base.stats, overlay.stats, merge_stats),
        optimization: overlay.optimization.or(base.optimization),
        plugins: merge_option(base.plugins, overlay.plugins, |mut base, overlay| {
            base.extend(overlay);
            base
        }),
        extra: merge_maps(base.extra, overlay.extra),
    }
}

fn merge_option<T>(base: Option<T>, overlay: Option<T>, merge: impl FnOnce(T, T) -> T) -> Option<T> {
    match (base, overlay) {
        (Some(base), Some(overlay)) => Some(merge(base, overlay)),
        (base, overlay) => overlay.or(base),
    }
}

fn merge_output(base: OutputOptions, overlay: OutputOptions) -> OutputOptions {
    OutputOptions {
        path: overlay.path.or(base.path),
        filename: overlay.filename.or(base.filename),
        extra: merge_maps(base.extra, overlay.extra),
    }
}

fn merge_stats(base: StatsOptions, overlay: StatsOptions) -> StatsOptions {
    match (base, overlay) {
        (StatsOptions::Options(base), StatsOptions::Options(overlay)) => {
            StatsOptions::Options(merge_maps(base, overlay))
        }
        (_, overlay) => overlay,
    }
}

fn merge_maps(mut base: Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in overlay {
        let merged = match base.remove(&key) {
            Some(existing) => merge_values(existing, value),
            None => value,
        };
        base.insert(key, merged);
    }
    base
}

/// Objects merge key-wise, arrays concatenate, anything else is replaced
fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => Value::Object(merge_maps(base, overlay)),
        (Value::Array(mut base), Value::Array(overlay)) => {
            base.extend(overlay);
            Value::Array(base)
        }
        (_, overlay) => overlay,
    }
}
