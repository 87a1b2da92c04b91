//! Manifest trust store
//!
//! Records which manifest sources the operator has accepted, bound to the
//! SHA-256 of the exact bytes that were accepted. The file is replaced
//! atomically on every write so concurrent invocations never observe a torn
//! store.

use crate::error::{Result, VulnPkgError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Trust store file name inside the data directory
pub const TRUST_STORE_FILE: &str = "trusted_manifests.json";

/// Fingerprint of raw manifest bytes
pub fn fingerprint(raw: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(raw))
}

/// An accepted manifest source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub source_url: String,
    pub content_fingerprint: String,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
    #[serde(default)]
    records: BTreeMap<String, TrustRecord>,
}

/// Persistent trust-on-first-use store
pub struct TrustStore {
    path: PathBuf,
    records: BTreeMap<String, TrustRecord>,
}

impl TrustStore {
    /// Open the store at `path`, treating a missing file as empty
    pub fn open(path: PathBuf) -> Result<Self> {
        let records = Self::read_records(&path)?;
        tracing::debug!("Loaded {} trust record(s) from {}", records.len(), path.display());
        Ok(Self { path, records })
    }

    /// Open the store in its default location under `data_dir`
    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(TRUST_STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup(&self, source_url: &str) -> Option<&TrustRecord> {
        self.records.get(source_url)
    }

    /// True only if `source_url` was accepted with exactly this fingerprint
    pub fn is_trusted(&self, source_url: &str, fingerprint: &str) -> bool {
        self.lookup(source_url)
            .is_some_and(|record| record.content_fingerprint == fingerprint)
    }

    /// All records, ordered by URL
    pub fn records(&self) -> impl Iterator<Item = &TrustRecord> {
        self.records.values()
    }

    /// Record acceptance, replacing any earlier fingerprint for the URL
    pub fn accept(&mut self, source_url: &str, fingerprint: &str) -> Result<TrustRecord> {
        // Pick up records other processes wrote since we loaded
        self.records = Self::read_records(&self.path)?;

        let record = TrustRecord {
            source_url: source_url.to_string(),
            content_fingerprint: fingerprint.to_string(),
            accepted_at: Utc::now(),
        };
        self.records.insert(source_url.to_string(), record.clone());
        self.persist()?;

        tracing::info!("Accepted manifest {} ({})", source_url, fingerprint);
        Ok(record)
    }

    /// Remove the record for `source_url`; returns whether one existed
    pub fn forget(&mut self, source_url: &str) -> Result<bool> {
        self.records = Self::read_records(&self.path)?;

        if self.records.remove(source_url).is_none() {
            tracing::debug!("No trust record for {}", source_url);
            return Ok(false);
        }
        self.persist()?;

        tracing::info!("Forgot manifest {}", source_url);
        Ok(true)
    }

    fn read_records(path: &Path) -> Result<BTreeMap<String, TrustRecord>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        let file: TrustFile = serde_json::from_str(&content).map_err(|e| {
            VulnPkgError::TrustStore(format!("{} is corrupt: {}", path.display(), e))
        })?;
        Ok(file.records)
    }

    fn persist(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let file = TrustFile {
            records: self.records.clone(),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, &file)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| VulnPkgError::TrustStore(format!("failed to replace store: {}", e)))?;

        Ok(())
    }
}
