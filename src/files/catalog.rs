//! Dataset catalog queries and their on-disk cache.

use crate::error::{AnalysisError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Default cache directory for catalog answers.
pub const DEFAULT_CACHE_DIR: &str = ".das_cache";

/// Answers "which files make up this dataset".
pub trait CatalogClient {
    /// Logical file names of `dataset`, in catalog order.
    fn query(&self, dataset: &str) -> Result<Vec<String>>;
}

/// Shells out to the CMS data aggregation system client.
#[derive(Debug, Clone)]
pub struct DasClient {
    executable: String,
}

impl DasClient {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl Default for DasClient {
    fn default() -> Self {
        Self::new("dasgoclient")
    }
}

impl CatalogClient for DasClient {
    fn query(&self, dataset: &str) -> Result<Vec<String>> {
        debug!(dataset, client = %self.executable, "querying catalog");
        let output = match Command::new(&self.executable)
            .arg("--query")
            .arg(format!("file dataset={}", dataset))
            .output()
        {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AnalysisError::CatalogUnavailable {
                    client: self.executable.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::CatalogQueryFailed {
                dataset: dataset.to_string(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// One text file per dataset, named by the SHA-256 of the dataset name.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
}

impl CatalogCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(dataset: &str) -> String {
        hex_encode(&Sha256::digest(dataset.as_bytes()))
    }

    pub fn path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", Self::key(dataset)))
    }

    /// Cached file list, `None` on a cache miss.
    pub fn load(&self, dataset: &str) -> Result<Option<Vec<String>>> {
        let text = match fs::read_to_string(self.path(dataset)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    /// Replace the cache entry for `dataset`. Readers never see a partial file.
    pub fn store(&self, dataset: &str, files: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path(dataset);
        let tmp = target.with_extension(format!("txt.tmp.{}", std::process::id()));
        let mut body = files.join("\n");
        body.push('\n');
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Files of a catalog dataset as redirector URLs, served from the cache when
/// possible. A failed query degrades to an empty list; a missing client does
/// not.
pub fn dataset_files(
    client: &dyn CatalogClient,
    cache: &CatalogCache,
    dataset: &str,
    redirector: &str,
) -> Result<Vec<String>> {
    if let Some(files) = cache.load(dataset)? {
        debug!(dataset, files = files.len(), "catalog cache hit");
        return Ok(files);
    }

    let files: Vec<String> = match client.query(dataset) {
        Ok(files) => files
            .into_iter()
            .map(|lfn| format!("{}{}", redirector, lfn))
            .collect(),
        Err(e @ AnalysisError::CatalogQueryFailed { .. }) => {
            warn!("{}", e);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    if !files.is_empty() {
        if let Err(e) = cache.store(dataset, &files) {
            warn!(dataset, "cannot write catalog cache: {}", e);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    const DATASET: &str = "/DYJetsToLL_M-50/RunIISummer20UL18NanoAODv9/NANOAODSIM";
    const REDIRECTOR: &str = "root://cms-xrd-global.cern.ch/";

    struct FakeCatalog {
        answer: std::result::Result<Vec<&'static str>, &'static str>,
        calls: Cell<usize>,
    }

    impl CatalogClient for FakeCatalog {
        fn query(&self, dataset: &str) -> Result<Vec<String>> {
            self.calls.set(self.calls.get() + 1);
            match &self.answer {
                Ok(files) => Ok(files.iter().map(|f| f.to_string()).collect()),
                Err(reason) => Err(AnalysisError::CatalogQueryFailed {
                    dataset: dataset.to_string(),
                    reason: reason.to_string(),
                }),
            }
        }
    }

    #[test]
    fn cache_key_is_sha256_hex() {
        assert_eq!(
            CatalogCache::key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn second_lookup_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CatalogCache::new(dir.path().join("cache"));
        let client = FakeCatalog {
            answer: Ok(vec!["/store/mc/a.root", "/store/mc/b.root"]),
            calls: Cell::new(0),
        };

        let first = dataset_files(&client, &cache, DATASET, REDIRECTOR).unwrap();
        let second = dataset_files(&client, &cache, DATASET, REDIRECTOR).unwrap();
        assert_eq!(
            first,
            vec![
                "root://cms-xrd-global.cern.ch//store/mc/a.root".to_string(),
                "root://cms-xrd-global.cern.ch//store/mc/b.root".to_string(),
            ]
        );
        assert_eq!(first, second);
        assert_eq!(client.calls.get(), 1);
        assert!(cache.path(DATASET).is_file());
    }

    #[test]
    fn failed_query_degrades_and_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CatalogCache::new(dir.path());
        let client = FakeCatalog {
            answer: Err("proxy expired"),
            calls: Cell::new(0),
        };
        let files = dataset_files(&client, &cache, DATASET, REDIRECTOR).unwrap();
        assert!(files.is_empty());
        assert!(!cache.path(DATASET).exists());
    }

    #[test]
    fn missing_client_is_fatal() {
        let client = DasClient::new("definitely-not-a-catalog-client-binary");
        let err = client.query(DATASET).unwrap_err();
        assert!(matches!(err, AnalysisError::CatalogUnavailable { .. }));
    }
}
