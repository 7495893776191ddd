//! Result artifact lookup inside a run directory.
//!
//! Checkers name their outputs with timestamps or counters, so the artifact
//! is found by picking the most recently modified matching entry. Ties on
//! modification time fall back to the larger file name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Most recently modified regular file in `dir` whose extension is `extension`
///
/// # Errors
///
/// Returns error if `dir` cannot be listed
pub fn newest_file_with_extension(dir: &Path, extension: &str) -> io::Result<Option<PathBuf>> {
    newest_matching(dir, |path, file_type| {
        file_type.is_file() && path.extension().is_some_and(|ext| ext == extension)
    })
}

/// Most recently modified directory in `dir` whose name starts with `prefix`
///
/// # Errors
///
/// Returns error if `dir` cannot be listed
pub fn newest_dir_with_prefix(dir: &Path, prefix: &str) -> io::Result<Option<PathBuf>> {
    newest_matching(dir, |path, file_type| {
        file_type.is_dir()
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
    })
}

fn newest_matching(
    dir: &Path,
    matches: impl Fn(&Path, &fs::FileType) -> bool,
) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if !matches(&path, &file_type) {
            continue;
        }
        // Entries removed between listing and stat are skipped.
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let replace = match &newest {
            None => true,
            Some((best_time, best_path)) => (modified, &path) > (*best_time, best_path),
        };
        if replace {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, secs: u64) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_newest_file_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.log"), 100);
        touch(&dir.path().join("a.log"), 200);
        touch(&dir.path().join("c.txt"), 300);

        let newest = newest_file_with_extension(dir.path(), "log").unwrap();
        assert_eq!(newest, Some(dir.path().join("a.log")));
    }

    #[test]
    fn test_newest_file_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("x.log")).unwrap();
        assert_eq!(newest_file_with_extension(dir.path(), "log").unwrap(), None);
    }

    #[test]
    fn test_newest_dir_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("traincheck_checker_results_1")).unwrap();
        fs::create_dir(dir.path().join("other")).unwrap();
        touch(&dir.path().join("traincheck_checker_results_file"), 0);

        let newest = newest_dir_with_prefix(dir.path(), "traincheck_checker_results").unwrap();
        assert_eq!(newest, Some(dir.path().join("traincheck_checker_results_1")));
    }

    #[test]
    fn test_empty_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(newest_file_with_extension(dir.path(), "log").unwrap(), None);
        assert!(newest_file_with_extension(&dir.path().join("gone"), "log").is_err());
    }

    proptest! {
        #[test]
        fn prop_newest_is_latest_mtime(times in proptest::collection::vec(0u64..1_000_000, 1..8)) {
            let dir = tempfile::tempdir().unwrap();
            for (i, secs) in times.iter().enumerate() {
                touch(&dir.path().join(format!("run{}.log", i)), *secs);
            }
            let newest = newest_file_with_extension(dir.path(), "log").unwrap().unwrap();
            let modified = fs::metadata(&newest).unwrap().modified().unwrap();
            let latest = times.iter().max().copied().unwrap();
            prop_assert_eq!(modified, SystemTime::UNIX_EPOCH + Duration::from_secs(latest));
        }
    }
}
