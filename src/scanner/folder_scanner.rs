//! Folder scanner for a culling session.
//!
//! Looks at the session root plus its `keep/` and `delete/` subfolders, one
//! level deep each:
//! - RAW files are recognised by extension, case-insensitively
//! - The subfolder a file sits in becomes its initial mark
//! - An `.xmp` sidecar next to a RAW file marks it as already edited

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::task;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::config::CullConfig;
use crate::error::{CullError, Result};
use crate::models::{sort_key_of, Mark};

/// A RAW file found by the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub initial_mark: Mark,
    pub sidecar: Option<PathBuf>,
}

/// Result of scanning a session root.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub root: PathBuf,
    /// De-duplicated files, sorted case-insensitively by file name.
    pub files: Vec<ScannedFile>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Files with a sidecar, i.e. edited in another tool.
    pub fn edited(&self) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|f| f.sidecar.is_some())
            .map(|f| f.path.as_path())
            .collect()
    }

    /// RAW path to sidecar path.
    pub fn sidecars(&self) -> HashMap<PathBuf, PathBuf> {
        self.files
            .iter()
            .filter_map(|f| f.sidecar.clone().map(|s| (f.path.clone(), s)))
            .collect()
    }

    pub fn count_marked(&self, mark: Mark) -> usize {
        self.files.iter().filter(|f| f.initial_mark == mark).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    config: CullConfig,
}

impl FolderScanner {
    pub fn new(config: CullConfig) -> Self {
        Self { config }
    }

    /// Scan `root`, `root/keep` and `root/delete`.
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        if !root.is_dir() {
            return Err(CullError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        info!("Scanning {:?}", root);

        let folders = [
            (root.to_path_buf(), Mark::None),
            (root.join(&self.config.keep_folder), Mark::Keep),
            (root.join(&self.config.delete_folder), Mark::Delete),
        ];

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for (dir, mark) in folders {
            if !dir.is_dir() {
                trace!(?dir, "Sort folder not present");
                continue;
            }
            for file in self.scan_folder(&dir, mark) {
                if seen.insert(file.path.clone()) {
                    files.push(file);
                }
            }
        }

        if files.is_empty() {
            return Err(CullError::EmptyFolder {
                path: root.to_path_buf(),
            });
        }

        files.sort_by_cached_key(|f| (sort_key_of(&f.path), f.path.clone()));

        let result = ScanResult {
            root: root.to_path_buf(),
            files,
        };
        info!(
            total = result.len(),
            keep = result.count_marked(Mark::Keep),
            delete = result.count_marked(Mark::Delete),
            edited = result.edited().len(),
            "Scan complete"
        );
        Ok(result)
    }

    /// Run [`scan`](Self::scan) on the blocking pool.
    pub async fn scan_async(&self, root: PathBuf) -> Result<ScanResult> {
        let scanner = self.clone();
        let task_root = root.clone();
        task::spawn_blocking(move || scanner.scan(&task_root))
            .await
            .map_err(|e| CullError::io(root, std::io::Error::other(e)))?
    }

    /// RAW files directly inside `dir`, with their sidecars.
    fn scan_folder(&self, dir: &Path, mark: Mark) -> Vec<ScannedFile> {
        let mut raws = Vec::new();
        // Lowercased file name -> sidecar path
        let mut sidecars = HashMap::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(?dir, error = %e, "Failed to read directory entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.config.is_supported(path) {
                raws.push(path.to_path_buf());
            } else if self.config.is_sidecar(path) {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                sidecars.insert(name, path.to_path_buf());
            }
        }

        debug!(?dir, raws = raws.len(), sidecars = sidecars.len(), "Scanned folder");

        let pairs = self.pair_sidecars(&raws, &mut sidecars);
        raws.into_iter()
            .zip(pairs)
            .map(|(path, sidecar)| ScannedFile {
                path,
                initial_mark: mark,
                sidecar,
            })
            .collect()
    }

    /// Give each sidecar to at most one RAW file. `IMG_1.CR2.xmp` always pairs
    /// with `IMG_1.CR2`; `IMG_1.xmp` pairs by stem only when a single RAW file
    /// in the folder has stem `IMG_1`.
    fn pair_sidecars(
        &self,
        raws: &[PathBuf],
        sidecars: &mut HashMap<String, PathBuf>,
    ) -> Vec<Option<PathBuf>> {
        let ext = self.config.sidecar_extension.to_lowercase();
        let lower = |s: Option<&std::ffi::OsStr>| {
            s.map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        };

        let mut stem_counts: HashMap<String, usize> = HashMap::new();
        for raw in raws {
            *stem_counts.entry(lower(raw.file_stem())).or_default() += 1;
        }

        let mut pairs: Vec<Option<PathBuf>> = raws
            .iter()
            .map(|raw| sidecars.remove(&format!("{}.{}", lower(raw.file_name()), ext)))
            .collect();

        for (raw, pair) in raws.iter().zip(pairs.iter_mut()) {
            if pair.is_some() {
                continue;
            }
            let stem = lower(raw.file_stem());
            let key = format!("{}.{}", stem, ext);
            if stem_counts.get(&stem).copied() == Some(1) {
                *pair = sidecars.remove(&key);
            } else if sidecars.contains_key(&key) {
                debug!(?raw, sidecar = %key, "Sidecar shared by several RAW files, leaving unpaired");
            }
        }
        pairs
    }
}
