//! Move marked files into `keep/` and `delete/`.
//!
//! - Destination comes from the mark; unmarked files inside a sort folder go
//!   back to the root, unmarked files already in the root stay put
//! - A file already in its destination is skipped, so re-running a plan that
//!   matches the disk moves nothing
//! - Name collisions get a numeric suffix (`name_1.ext`), nothing is overwritten
//! - A failed move is recorded and the remaining moves continue

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::config::CullConfig;
use crate::error::{CullError, Result};
use crate::models::{file_name_of, Mark, MovePlan};

/// Maximum number of errors listed in [`SortReport::summary_message`].
pub const MAX_REPORTED_ERRORS: usize = 20;

/// Outcome of executing a move plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortReport {
    pub moved: usize,
    pub sidecars_moved: usize,
    pub skipped: usize,
    /// `"<file name>: <error>"` for each failed move.
    pub errors: Vec<String>,
}

impl SortReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// One message for the user, listing at most [`MAX_REPORTED_ERRORS`] failures.
    pub fn summary_message(&self) -> String {
        if self.errors.is_empty() {
            return format!("Successfully moved {} files.", self.moved);
        }
        let mut msg = format!("Moved {} files.\n\nErrors:\n", self.moved);
        msg.push_str(
            &self
                .errors
                .iter()
                .take(MAX_REPORTED_ERRORS)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let hidden = self.errors.len().saturating_sub(MAX_REPORTED_ERRORS);
        if hidden > 0 {
            msg.push_str(&format!("\n... and {} more", hidden));
        }
        msg
    }
}

/// Relocates files under one session root.
#[derive(Debug, Clone)]
pub struct Sorter {
    root: PathBuf,
    keep_dir: PathBuf,
    delete_dir: PathBuf,
}

impl Sorter {
    pub fn new(root: &Path, config: &CullConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            keep_dir: root.join(&config.keep_folder),
            delete_dir: root.join(&config.delete_folder),
        }
    }

    pub fn keep_dir(&self) -> &Path {
        &self.keep_dir
    }

    pub fn delete_dir(&self) -> &Path {
        &self.delete_dir
    }

    /// Folder `path` belongs in, or `None` when it should not move.
    pub fn destination_dir(&self, path: &Path, mark: Mark) -> Option<&Path> {
        let current = path.parent()?;
        let dest = match mark {
            Mark::Keep => self.keep_dir.as_path(),
            Mark::Delete => self.delete_dir.as_path(),
            Mark::None if current == self.keep_dir || current == self.delete_dir => {
                self.root.as_path()
            }
            Mark::None => return None,
        };
        (current != dest).then_some(dest)
    }

    /// Execute `plan`. Only failing to create the sort folders is fatal;
    /// per-file failures are collected in the report.
    pub fn execute(&self, plan: &MovePlan) -> Result<SortReport> {
        for dir in [&self.keep_dir, &self.delete_dir] {
            fs::create_dir_all(dir).map_err(|e| CullError::io(dir, e))?;
        }

        let mut report = SortReport::default();
        for (path, &mark) in &plan.marks {
            let filename = file_name_of(path);
            let Some(dest_dir) = self.destination_dir(path, mark) else {
                report.skipped += 1;
                continue;
            };

            // Already moved by an earlier run of this plan.
            if !path.exists() && dest_dir.join(&filename).exists() {
                trace!(?path, "Already in destination");
                report.skipped += 1;
                continue;
            }

            let dest = unique_destination(&dest_dir.join(&filename));
            match move_file(path, &dest) {
                Ok(()) => {
                    debug!(?path, ?dest, "Moved");
                    report.moved += 1;
                }
                Err(e) => {
                    warn!(?path, error = %e, "Move failed");
                    report.errors.push(format!("{}: {}", filename, e));
                    continue;
                }
            }

            if let Some(sidecar) = plan.sidecar_of(path) {
                let sidecar_dest = unique_destination(&sidecar_destination(path, &dest, sidecar));
                match move_file(sidecar, &sidecar_dest) {
                    Ok(()) => report.sidecars_moved += 1,
                    Err(e) => {
                        warn!(?sidecar, error = %e, "Sidecar move failed");
                        report
                            .errors
                            .push(format!("{}: {}", file_name_of(sidecar), e));
                    }
                }
            }
        }

        info!(
            moved = report.moved,
            sidecars = report.sidecars_moved,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Sort complete"
        );
        Ok(report)
    }
}

/// `dest` if free, otherwise `stem_1.ext`, `stem_2.ext`, ... until unused.
pub fn unique_destination(dest: &Path) -> PathBuf {
    if !dest.exists() {
        return dest.to_path_buf();
    }
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| parent.join(format!("{}_{}{}", stem, n, ext)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| dest.to_path_buf())
}

/// Where a sidecar lands so it still pairs with the RAW file's final name.
fn sidecar_destination(raw_src: &Path, raw_dest: &Path, sidecar: &Path) -> PathBuf {
    let dest_dir = raw_dest.parent().unwrap_or_else(|| Path::new(""));
    let ext = sidecar
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar_stem = sidecar
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw_name = file_name_of(raw_src);

    // `IMG_1.CR2.xmp` follows the full name, `IMG_1.xmp` follows the stem.
    let base = if sidecar_stem.eq_ignore_ascii_case(&raw_name) {
        file_name_of(raw_dest)
    } else {
        raw_dest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(sidecar_stem)
    };
    dest_dir.join(format!("{}.{}", base, ext))
}

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Err(e) if is_cross_device(&e) => {
            trace!(?src, ?dst, "Cross-device move, copying");
            fs::copy(src, dst)?;
            if let Err(e) = fs::remove_file(src) {
                let _ = fs::remove_file(dst);
                return Err(e);
            }
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs::File;
    use std::io::Write;

    use tempfile::tempdir;

    use crate::cull::CullState;
    use crate::scanner::FolderScanner;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    fn plan(entries: &[(&Path, Mark)]) -> MovePlan {
        let marks: BTreeMap<PathBuf, Mark> = entries
            .iter()
            .map(|(p, m)| (p.to_path_buf(), *m))
            .collect();
        MovePlan::new(marks)
    }

    #[test]
    fn test_destination_rules() {
        let sorter = Sorter::new(Path::new("/shoot"), &CullConfig::default());
        let root_file = Path::new("/shoot/a.nef");
        let kept_file = Path::new("/shoot/keep/b.nef");

        assert_eq!(
            sorter.destination_dir(root_file, Mark::Keep),
            Some(Path::new("/shoot/keep"))
        );
        assert_eq!(sorter.destination_dir(root_file, Mark::None), None);
        assert_eq!(sorter.destination_dir(kept_file, Mark::Keep), None);
        assert_eq!(
            sorter.destination_dir(kept_file, Mark::None),
            Some(Path::new("/shoot"))
        );
        assert_eq!(
            sorter.destination_dir(kept_file, Mark::Delete),
            Some(Path::new("/shoot/delete"))
        );
    }

    #[test]
    fn test_execute_moves_by_mark() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("a.nef");
        let b = root.join("b.nef");
        let c = root.join("c.nef");
        let d = root.join("keep/d.nef");
        for p in [&a, &b, &c, &d] {
            write(p, "raw");
        }

        let sorter = Sorter::new(root, &CullConfig::default());
        let report = sorter
            .execute(&plan(&[
                (&a, Mark::Keep),
                (&b, Mark::Delete),
                (&c, Mark::None),
                (&d, Mark::None),
            ]))
            .unwrap();

        assert_eq!(report.moved, 3);
        assert_eq!(report.skipped, 1);
        assert!(!report.has_errors());
        assert!(root.join("keep/a.nef").exists());
        assert!(root.join("delete/b.nef").exists());
        assert!(c.exists());
        assert!(root.join("d.nef").exists());
    }

    #[test]
    fn test_execute_twice_moves_nothing_more() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a = root.join("a.nef");
        let b = root.join("b.nef");
        write(&a, "a");
        write(&b, "b");

        let sorter = Sorter::new(root, &CullConfig::default());
        let plan = plan(&[(&a, Mark::Keep), (&b, Mark::Delete)]);
        assert_eq!(sorter.execute(&plan).unwrap().moved, 2);

        let again = sorter.execute(&plan).unwrap();
        assert_eq!(again.moved, 0);
        assert!(!again.has_errors());

        // A plan rebuilt from the new disk layout is a no-op too.
        let scan = FolderScanner::default().scan(root).unwrap();
        let state = CullState::from_scan(scan).unwrap();
        let rebuilt = sorter.execute(&state.build_move_plan()).unwrap();
        assert_eq!(rebuilt.moved, 0);
        assert_eq!(rebuilt.skipped, 2);
    }

    #[test]
    fn test_collision_gets_suffix() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let first = root.join("IMG_1.cr2");
        let second = root.join("delete/IMG_1.cr2");
        write(&first, "first");
        write(&second, "second");
        write(&root.join("keep/IMG_1.cr2"), "existing");

        let sorter = Sorter::new(root, &CullConfig::default());
        let report = sorter
            .execute(&plan(&[(&first, Mark::Keep), (&second, Mark::Keep)]))
            .unwrap();

        assert_eq!(report.moved, 2);
        let keep = root.join("keep");
        assert_eq!(fs::read_to_string(keep.join("IMG_1.cr2")).unwrap(), "existing");
        let moved: Vec<String> = ["IMG_1_1.cr2", "IMG_1_2.cr2"]
            .iter()
            .map(|n| fs::read_to_string(keep.join(n)).unwrap())
            .collect();
        assert!(moved.contains(&"first".to_string()));
        assert!(moved.contains(&"second".to_string()));
    }

    #[test]
    fn test_unique_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("x.nef");
        assert_eq!(unique_destination(&dest), dest);
        write(&dest, "");
        write(&dir.path().join("x_1.nef"), "");
        assert_eq!(unique_destination(&dest), dir.path().join("x_2.nef"));
    }

    #[test]
    fn test_missing_source_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let gone = root.join("gone.nef");
        let here = root.join("here.nef");
        write(&here, "raw");

        let sorter = Sorter::new(root, &CullConfig::default());
        let report = sorter
            .execute(&plan(&[(&gone, Mark::Delete), (&here, Mark::Delete)]))
            .unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("gone.nef: "));
        assert!(root.join("delete/here.nef").exists());
    }

    #[test]
    fn test_sidecar_follows_raw() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let raw = root.join("IMG_7.NEF");
        let xmp = root.join("IMG_7.xmp");
        write(&raw, "raw");
        write(&xmp, "xmp");
        write(&root.join("keep/IMG_7.NEF"), "older");

        let mut sidecars = std::collections::HashMap::new();
        sidecars.insert(raw.clone(), xmp.clone());
        let plan = plan(&[(&raw, Mark::Keep)]).with_sidecars(sidecars);

        let report = Sorter::new(root, &CullConfig::default())
            .execute(&plan)
            .unwrap();
        assert_eq!(report.moved, 1);
        assert_eq!(report.sidecars_moved, 1);
        assert!(root.join("keep/IMG_7_1.NEF").exists());
        assert!(root.join("keep/IMG_7_1.xmp").exists());
        assert!(!xmp.exists());
    }

    #[test]
    fn test_shared_stem_sidecar_sorts_without_errors() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("IMG_1.CR2"), "cr2");
        write(&root.join("IMG_1.NEF"), "nef");
        write(&root.join("IMG_1.xmp"), "shared");

        let scan = FolderScanner::default().scan(root).unwrap();
        let mut state = CullState::from_scan(scan).unwrap();
        assert!(state.set_mark(&root.join("IMG_1.CR2"), Mark::Keep));
        assert!(state.set_mark(&root.join("IMG_1.NEF"), Mark::Delete));

        let report = Sorter::new(root, &CullConfig::default())
            .execute(&state.skip_review().unwrap())
            .unwrap();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.moved, 2);
        assert_eq!(report.sidecars_moved, 0);
        assert!(root.join("keep/IMG_1.CR2").exists());
        assert!(root.join("delete/IMG_1.NEF").exists());
        assert!(root.join("IMG_1.xmp").exists());
    }

    #[test]
    fn test_summary_message_bounded() {
        let report = SortReport {
            moved: 3,
            errors: (0..25).map(|i| format!("f{}.nef: denied", i)).collect(),
            ..Default::default()
        };
        let msg = report.summary_message();
        assert!(msg.starts_with("Moved 3 files."));
        assert!(msg.contains("f19.nef"));
        assert!(!msg.contains("f20.nef"));
        assert!(msg.ends_with("... and 5 more"));

        let clean = SortReport {
            moved: 2,
            ..Default::default()
        };
        assert_eq!(clean.summary_message(), "Successfully moved 2 files.");
    }
}
