// Test file collection - glob patterns to webpack entry points

use crate::error::PluginError;
use crate::path_key::{compute_key, normalize_separators, normalize_separators_with};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// Webpack entries keyed by path key, pointing at absolute test file paths
pub type EntryMap = BTreeMap<String, PathBuf>;

/// Resolve test file glob patterns to absolute file paths
///
/// Patterns are separator-normalized before expansion. Relative patterns and
/// matches are resolved against the current directory, with `.` and `..`
/// segments folded away. Directories are skipped and duplicates (files
/// matched by several patterns) removed.
///
/// # Errors
///
/// Returns `PluginError::Pattern` for a pattern the glob syntax rejects and
/// `PluginError::Glob` when a matched path cannot be read.
pub fn collect_test_files<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>, PluginError> {
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let pattern = normalize_separators(pattern.as_ref());
        let matches = glob::glob(&pattern).map_err(|source| PluginError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        for entry in matches {
            let path = entry?;
            if path.is_dir() {
                continue;
            }
            files.insert(resolve(&path)?);
        }
    }

    Ok(files.into_iter().collect())
}

/// Turn test file glob patterns into webpack entries
///
/// Each resolved file becomes one entry named after its extension-less path
/// key, so webpack emits it as `<key>.js`. Paths are keyed with `/`
/// separators, the same form requests are looked up in.
pub fn collect_entries<S: AsRef<str>>(patterns: &[S]) -> Result<EntryMap, PluginError> {
    let files = collect_test_files(patterns)?;
    let mut entries = EntryMap::new();

    for file in files {
        let (key, path) = entry_for(&file.to_string_lossy(), MAIN_SEPARATOR);
        entries.insert(key, path);
    }

    tracing::debug!(count = entries.len(), "Collected webpack entries");
    Ok(entries)
}

/// Entry key and normalized path for a file on a host using `separator`
fn entry_for(file: &str, separator: char) -> (String, PathBuf) {
    let normalized = normalize_separators_with(file, separator);
    (compute_key(&normalized, false), PathBuf::from(normalized))
}

/// Absolute form of `path` with `.` and `..` removed lexically
fn resolve(path: &Path) -> Result<PathBuf, PluginError> {
    let absolute = std::path::absolute(path)?;
    let mut resolved = PathBuf::new();

    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("test/nested")).unwrap();
        fs::write(dir.path().join("test/sample.ts"), "export {};").unwrap();
        fs::write(dir.path().join("test/sample.js"), "export {};").unwrap();
        fs::write(dir.path().join("test/nested/readme.md"), "# docs").unwrap();
        dir
    }

    fn pattern(dir: &Path, tail: &str) -> String {
        format!("{}/{tail}", dir.display())
    }

    #[test]
    fn entries_for_every_matching_file() {
        let dir = fixture();
        let entries = collect_entries(&[pattern(dir.path(), "test/**/*.[jt]s")]).unwrap();

        let ts = dir.path().join("test/sample.ts");
        let js = dir.path().join("test/sample.js");

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries.get(&compute_key(&ts.to_string_lossy(), false)),
            Some(&ts)
        );
        assert_eq!(
            entries.get(&compute_key(&js.to_string_lossy(), false)),
            Some(&js)
        );
    }

    #[test]
    fn overlapping_patterns_do_not_duplicate_files() {
        let dir = fixture();
        let files = collect_test_files(&[
            pattern(dir.path(), "test/*.ts"),
            pattern(dir.path(), "test/**/*.ts"),
        ])
        .unwrap();

        assert_eq!(files, vec![dir.path().join("test/sample.ts")]);
    }

    #[test]
    fn directories_are_not_entries() {
        let dir = fixture();
        let files = collect_test_files(&[pattern(dir.path(), "test/*")]).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|file| file.is_file()));
    }

    #[test]
    fn empty_patterns_yield_no_entries() {
        let patterns: [&str; 0] = [];
        assert!(collect_entries(&patterns).unwrap().is_empty());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = collect_entries(&["test/***/x.ts"]).unwrap_err();
        assert!(matches!(err, PluginError::Pattern { .. }));
    }

    #[test]
    fn parent_segments_are_resolved() {
        let dir = fixture();
        fs::create_dir_all(dir.path().join("other")).unwrap();

        let files = collect_test_files(&[pattern(dir.path(), "other/../test/*.ts")]).unwrap();

        assert_eq!(files, vec![dir.path().join("test/sample.ts")]);
    }

    #[cfg(unix)]
    #[test]
    fn resolve_folds_dot_segments() {
        let resolved = resolve(Path::new("/repo/other/../proj/./test/a.ts")).unwrap();
        assert_eq!(resolved, PathBuf::from("/repo/proj/test/a.ts"));

        let resolved = resolve(Path::new("/../repo/a.ts")).unwrap();
        assert_eq!(resolved, PathBuf::from("/repo/a.ts"));
    }

    #[test]
    fn backslash_paths_are_keyed_like_requests() {
        let (key, path) = entry_for("C:/repo/test\\sample.ts", '\\');

        assert_eq!(path, PathBuf::from("C:/repo/test/sample.ts"));
        assert_eq!(key, compute_key("C:/repo/test/sample.ts", false));

        let request = normalize_separators_with("C:\\repo\\test\\sample.ts", '\\');
        assert_eq!(
            crate::path_key::force_js_extension(&compute_key(&request, true)),
            format!("{key}.js")
        );
    }

    #[test]
    fn relative_matches_are_made_absolute() {
        let files = collect_test_files(&["Cargo.toml"]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_absolute());
        assert!(files[0].ends_with("Cargo.toml"));
    }
}
