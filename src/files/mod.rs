//! Dataset locator resolution.
//!
//! A sample's locator may be a local file, directory or glob, a remote
//! `root://` URL, a path on a mounted storage system (`/eos/...`,
//! `/store/...`), or a catalog dataset name
//! (`/Primary/Processed/TIER`). [`FileResolver`] turns any of these into an
//! ordered, duplicate-free list of [`FileLocation`]s.

pub mod catalog;

pub use catalog::{CatalogCache, CatalogClient, DasClient, DEFAULT_CACHE_DIR};

use crate::error::{AnalysisError, Result};
use glob::glob;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Protocol prefix of remote storage URLs.
pub const REMOTE_PREFIX: &str = "root://";

/// Global redirector used to open catalog files.
pub const GLOBAL_REDIRECTOR: &str = "root://cms-xrd-global.cern.ch/";

/// A resolved event file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileLocation {
    Local(PathBuf),
    Remote(String),
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileLocation::Local(p) => write!(f, "{}", p.display()),
            FileLocation::Remote(url) => f.write_str(url),
        }
    }
}

/// Storage-system layout: which path segments live on remote storage and
/// how to reach them.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `(path segment, remote prefix)`, checked in order.
    pub mounts: Vec<(String, String)>,
    pub redirector: String,
    /// Accepted file extensions for directory walks and globs.
    pub extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mounts: vec![
                ("/eos/".to_string(), "root://eoscms.cern.ch/".to_string()),
                ("/store/".to_string(), GLOBAL_REDIRECTOR.to_string()),
            ],
            redirector: GLOBAL_REDIRECTOR.to_string(),
            extensions: ["root", "ndjson", "jsonl"].map(String::from).to_vec(),
        }
    }
}

impl StorageConfig {
    /// Default layout reading catalog and `/store/` files through
    /// `redirector` instead of the global one.
    pub fn with_redirector(redirector: &str) -> Self {
        let mut config = Self::default();
        for (segment, prefix) in config.mounts.iter_mut() {
            if segment == "/store/" {
                *prefix = redirector.to_string();
            }
        }
        config.redirector = redirector.to_string();
        config
    }

    fn mount_prefix(&self, locator: &str) -> Option<&str> {
        if !locator.starts_with('/') {
            return None;
        }
        self.mounts
            .iter()
            .find(|(segment, _)| locator.contains(segment.as_str()))
            .map(|(_, prefix)| prefix.as_str())
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|a| a == ext))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorKind {
    Remote,
    Mounted { prefix: String },
    Catalog,
    Glob,
    Local,
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

impl LocatorKind {
    pub fn classify(locator: &str, storage: &StorageConfig) -> LocatorKind {
        if locator.starts_with(REMOTE_PREFIX) {
            return LocatorKind::Remote;
        }
        if let Some(prefix) = storage.mount_prefix(locator) {
            return LocatorKind::Mounted {
                prefix: prefix.to_string(),
            };
        }
        if locator.starts_with('/')
            && locator.matches('/').count() >= 3
            && !has_wildcard(locator)
            && !Path::new(locator).exists()
        {
            return LocatorKind::Catalog;
        }
        if has_wildcard(locator) {
            return LocatorKind::Glob;
        }
        LocatorKind::Local
    }
}

/// Resolves locators to file lists.
pub struct FileResolver {
    storage: StorageConfig,
    cache: CatalogCache,
    catalog: Box<dyn CatalogClient>,
}

impl FileResolver {
    /// Resolver backed by the `dasgoclient` catalog client.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_catalog(cache_dir, Box::new(DasClient::default()))
    }

    pub fn with_catalog(cache_dir: impl Into<PathBuf>, catalog: Box<dyn CatalogClient>) -> Self {
        Self {
            storage: StorageConfig::default(),
            cache: CatalogCache::new(cache_dir),
            catalog,
        }
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Resolve `locator` into at most `limit` files (`0` = unlimited).
    pub fn resolve(&self, locator: &str, limit: usize) -> Result<Vec<FileLocation>> {
        let kind = LocatorKind::classify(locator, &self.storage);
        debug!(locator, ?kind, "resolving");

        let mut files = match &kind {
            LocatorKind::Catalog => {
                catalog::dataset_files(&*self.catalog, &self.cache, locator, &self.storage.redirector)?
                    .into_iter()
                    .map(FileLocation::Remote)
                    .collect()
            }
            LocatorKind::Remote => self.remote(locator, REMOTE_PREFIX, true, limit)?,
            LocatorKind::Mounted { prefix } => self.remote(locator, prefix, false, limit)?,
            LocatorKind::Glob => self
                .expand_glob(locator, limit)?
                .into_iter()
                .map(FileLocation::Local)
                .collect(),
            LocatorKind::Local => self
                .local(Path::new(locator), limit)?
                .into_iter()
                .map(FileLocation::Local)
                .collect(),
        };

        dedup_in_order(&mut files);
        if limit > 0 {
            files.truncate(limit);
        }
        if files.is_empty() {
            return Err(AnalysisError::NoFilesFound {
                locator: locator.to_string(),
            });
        }
        debug!(locator, files = files.len(), "resolved");
        Ok(files)
    }

    /// Remote URLs and mounted storage paths. Wildcards and directories are
    /// expanded against the local mount of the storage system.
    fn remote(&self, locator: &str, prefix: &str, is_url: bool, limit: usize) -> Result<Vec<FileLocation>> {
        let mount_path = if is_url { strip_url(locator) } else { locator.to_string() };
        let wrap = |p: PathBuf| FileLocation::Remote(to_url(prefix, &p.to_string_lossy()));

        if has_wildcard(&mount_path) {
            return Ok(self.expand_glob(&mount_path, limit)?.into_iter().map(wrap).collect());
        }
        let path = Path::new(&mount_path);
        if path.is_dir() {
            return Ok(self.walk(path, limit).into_iter().map(wrap).collect());
        }
        if is_url {
            Ok(vec![FileLocation::Remote(locator.to_string())])
        } else {
            Ok(vec![FileLocation::Remote(to_url(prefix, &mount_path))])
        }
    }

    fn expand_glob(&self, pattern: &str, limit: usize) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in glob(pattern)? {
            match entry {
                Ok(path) if path.is_file() && self.storage.accepts(&path) => out.push(path),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable glob match: {}", e),
            }
            if limit > 0 && out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn walk(&self, dir: &Path, limit: usize) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if self.storage.accepts(entry.path()) {
                out.push(entry.path().to_path_buf());
                if limit > 0 && out.len() >= limit {
                    break;
                }
            }
        }
        out
    }

    fn local(&self, path: &Path, limit: usize) -> Result<Vec<PathBuf>> {
        if path.is_dir() {
            Ok(self.walk(path, limit))
        } else if path.is_file() {
            Ok(vec![path.to_path_buf()])
        } else {
            Ok(Vec::new())
        }
    }
}

/// `root://host//eos/a.root` -> `/eos/a.root`
fn strip_url(url: &str) -> String {
    let rest = url.strip_prefix(REMOTE_PREFIX).unwrap_or(url);
    match rest.find('/') {
        Some(i) => format!("/{}", rest[i..].trim_start_matches('/')),
        None => String::new(),
    }
}

/// `root://host/` + `/eos/a.root` -> `root://host//eos/a.root`
fn to_url(prefix: &str, path: &str) -> String {
    let host = prefix.trim_end_matches('/');
    format!("{}//{}", host, path.trim_start_matches('/'))
}

fn dedup_in_order(files: &mut Vec<FileLocation>) {
    let mut seen = HashSet::new();
    files.retain(|f| seen.insert(f.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    struct NoCatalog;

    impl CatalogClient for NoCatalog {
        fn query(&self, _dataset: &str) -> Result<Vec<String>> {
            Ok(vec!["/store/mc/x/1.root".into(), "/store/mc/x/1.root".into(), "/store/mc/x/2.root".into()])
        }
    }

    fn resolver(dir: &Path) -> FileResolver {
        FileResolver::with_catalog(dir.join("cache"), Box::new(NoCatalog))
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&p, "{}\n").unwrap();
        p
    }

    #[test]
    fn classification_order() {
        let s = StorageConfig::default();
        assert_eq!(LocatorKind::classify("root://host//store/a.root", &s), LocatorKind::Remote);
        assert_eq!(
            LocatorKind::classify("/eos/cms/store/user/a.root", &s),
            LocatorKind::Mounted {
                prefix: "root://eoscms.cern.ch/".to_string()
            }
        );
        assert_eq!(
            LocatorKind::classify("/store/mc/Run3/a.root", &s),
            LocatorKind::Mounted {
                prefix: GLOBAL_REDIRECTOR.to_string()
            }
        );
        assert_eq!(
            LocatorKind::classify("/DoubleMuon/Run2016B-NanoAOD/NANOAOD", &s),
            LocatorKind::Catalog
        );
        assert_eq!(LocatorKind::classify("/tmp/*/x.root", &s), LocatorKind::Glob);
        assert_eq!(LocatorKind::classify("data/*.ndjson", &s), LocatorKind::Glob);
        assert_eq!(LocatorKind::classify("data/a.ndjson", &s), LocatorKind::Local);
    }

    #[test]
    fn existing_absolute_paths_are_local() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let s = StorageConfig::default();
        assert_eq!(LocatorKind::classify(nested.to_str().unwrap(), &s), LocatorKind::Local);
    }

    #[test]
    fn directory_walk_filters_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "s/a.ndjson");
        let b = touch(dir.path(), "s/sub/b.root");
        touch(dir.path(), "s/notes.txt");
        let r = resolver(dir.path());

        let all = r.resolve(dir.path().join("s").to_str().unwrap(), 0).unwrap();
        assert_eq!(all, vec![FileLocation::Local(a.clone()), FileLocation::Local(b)]);

        let one = r.resolve(dir.path().join("s").to_str().unwrap(), 1).unwrap();
        assert_eq!(one, vec![FileLocation::Local(a)]);
    }

    #[test]
    fn glob_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "x_1.ndjson");
        let b = touch(dir.path(), "x_2.ndjson");
        touch(dir.path(), "y_1.ndjson");
        let r = resolver(dir.path());
        let pattern = format!("{}/x_*.ndjson", dir.path().display());
        assert_eq!(
            r.resolve(&pattern, 0).unwrap(),
            vec![FileLocation::Local(a), FileLocation::Local(b)]
        );
    }

    #[test]
    fn catalog_results_are_deduplicated_and_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        let files = r.resolve("/DoubleMuon/Run2016B-NanoAOD/NANOAOD", 0).unwrap();
        assert_eq!(
            files,
            vec![
                FileLocation::Remote("root://cms-xrd-global.cern.ch//store/mc/x/1.root".into()),
                FileLocation::Remote("root://cms-xrd-global.cern.ch//store/mc/x/2.root".into()),
            ]
        );
        assert_eq!(r.resolve("/DoubleMuon/Run2016B-NanoAOD/NANOAOD", 1).unwrap().len(), 1);
    }

    #[test]
    fn custom_redirector() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path()).with_storage(StorageConfig::with_redirector("root://xrootd-cms.infn.it/"));
        assert_eq!(
            r.resolve("/DoubleMuon/Run2016B-NanoAOD/NANOAOD", 1).unwrap(),
            vec![FileLocation::Remote("root://xrootd-cms.infn.it//store/mc/x/1.root".into())]
        );
        assert_eq!(
            r.resolve("/store/data/Run2016B/nano.root", 0).unwrap(),
            vec![FileLocation::Remote("root://xrootd-cms.infn.it//store/data/Run2016B/nano.root".into())]
        );
    }

    #[test]
    fn plain_remote_and_mounted_locators() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        assert_eq!(
            r.resolve("root://eosuser.cern.ch//eos/user/a/nano.root", 0).unwrap(),
            vec![FileLocation::Remote("root://eosuser.cern.ch//eos/user/a/nano.root".into())]
        );
        assert_eq!(
            r.resolve("/store/data/Run2016B/nano.root", 0).unwrap(),
            vec![FileLocation::Remote(
                "root://cms-xrd-global.cern.ch//store/data/Run2016B/nano.root".into()
            )]
        );
    }

    #[test]
    fn nothing_found_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        let pattern = format!("{}/nope_*.ndjson", dir.path().display());
        let err = r.resolve(&pattern, 0).unwrap_err();
        assert!(matches!(err, AnalysisError::NoFilesFound { .. }));

        let err = r.resolve("missing/nope.ndjson", 0).unwrap_err();
        assert!(matches!(err, AnalysisError::NoFilesFound { .. }));
    }

    #[test]
    fn url_helpers() {
        assert_eq!(strip_url("root://host//eos/a.root"), "/eos/a.root");
        assert_eq!(to_url("root://host/", "/eos/a.root"), "root://host//eos/a.root");
    }
}
