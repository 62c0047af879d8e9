// Path keys - stable bundle names derived from absolute file paths

use sha2::{Digest, Sha256};
use std::path::{Path, MAIN_SEPARATOR};

/// Compute the key a file is bundled and served under
///
/// The key has the form `<file stem>.<sha256 hex of path>`, with
/// `.<extension>` appended when `include_extension` is set. The digest covers
/// the whole path string, so files sharing a stem in different directories
/// never share a key.
///
/// # Examples
///
/// ```
/// # use wtr_webpack_plugin::path_key::compute_key;
/// let key = compute_key("/path/to/some/file.js", true);
/// assert!(key.starts_with("file."));
/// assert!(key.ends_with(".js"));
/// ```
pub fn compute_key(path: &str, include_extension: bool) -> String {
    let parsed = Path::new(path);
    let stem = parsed
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();

    let digest = hex::encode(Sha256::digest(path.as_bytes()));
    let key = format!("{stem}.{digest}");

    match parsed.extension() {
        Some(ext) if include_extension => format!("{key}.{}", ext.to_string_lossy()),
        _ => key,
    }
}

/// Replace the host's path separator with `/`
pub fn normalize_separators(path: &str) -> String {
    normalize_separators_with(path, MAIN_SEPARATOR)
}

/// Replace `separator` with `/`
pub fn normalize_separators_with(path: &str, separator: char) -> String {
    if separator == '/' {
        return path.to_string();
    }
    path.replace(separator, "/")
}

/// Rewrite the final extension of `path` to `.js`
///
/// Bundles are always emitted as JavaScript, so a request for `foo.test.ts`
/// has to be looked up as `foo.test.js`.
pub fn force_js_extension(path: &str) -> String {
    let parsed = Path::new(path);
    match parsed.file_stem() {
        Some(stem) => {
            let file_name = format!("{}.js", stem.to_string_lossy());
            parsed.with_file_name(file_name).to_string_lossy().into_owned()
        }
        None => format!("{path}.js"),
    }
}
