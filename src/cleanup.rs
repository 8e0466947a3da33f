//! Spill file removal.

use log;

use crate::spill::SpillFile;
use crate::storage::SpillStorage;

/// Outcome of a cleanup pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of removed spill files.
    pub removed: usize,
    /// Names of spill files that could not be removed.
    pub failed: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes every spill file. Failures are logged and reported but never stop the pass.
pub fn remove_spill_files<S: SpillStorage>(storage: &S, files: &[SpillFile]) -> CleanupReport {
    let mut report = CleanupReport::default();

    for file in files {
        match storage.remove(&file.name) {
            Ok(()) => report.removed += 1,
            Err(err) => {
                log::warn!("spill file {} not removed: {}", file.name, err);
                report.failed.push(file.name.clone());
            }
        }
    }

    log::debug!("{} spill files removed", report.removed);

    report
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use rstest::*;

    use super::remove_spill_files;
    use crate::spill::{spill_file_name, SpillFile};
    use crate::storage::{FsStorage, SpillStorage};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn spill_file(chunk: usize) -> SpillFile {
        SpillFile {
            chunk,
            name: spill_file_name(chunk),
            lines: 1,
        }
    }

    #[rstest]
    fn test_removes_all_files(tmp_dir: tempfile::TempDir) {
        let storage = FsStorage::in_dir(tmp_dir.path());
        let files: Vec<SpillFile> = (0..3).map(spill_file).collect();
        for file in &files {
            storage.create(&file.name).unwrap().write_all(b"1.1.1.1\n").unwrap();
        }

        let report = remove_spill_files(&storage, &files);

        assert!(report.is_clean());
        assert_eq!(report.removed, 3);
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_failure_does_not_stop_cleanup(tmp_dir: tempfile::TempDir) {
        let storage = FsStorage::in_dir(tmp_dir.path());
        let files: Vec<SpillFile> = (0..3).map(spill_file).collect();
        for file in [&files[0], &files[2]] {
            storage.create(&file.name).unwrap().flush().unwrap();
        }

        let report = remove_spill_files(&storage, &files);

        assert!(!report.is_clean());
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, vec![spill_file_name(1)]);
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }
}
