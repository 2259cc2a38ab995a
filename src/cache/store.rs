//! Persistent response cache.
//!
//! # Layout
//! ```text
//! <root>/
//!   <hash>/               one directory per entry, see CacheKey
//!     meta                status code, expiry, full request
//!     responseHeaders     every origin response header
//!     responseBody        raw body bytes
//!   .staging-<uuid>/      entry being written
//!   .retired-<uuid>/      replaced entry awaiting removal
//! ```
//!
//! # Concurrency
//! Entries are written into a staging directory and published by `rename`.
//! A striped lock table keyed by [`CacheKey`] gives `store` the write side
//! and `lookup` the read side, so a reader sees the complete old entry, the
//! complete new one, or a miss.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use axum::body::Bytes;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::cache::key::CacheKey;
use crate::cache::record::{
    decode_headers, decode_meta, encode_headers, encode_meta, Meta, BODY_FILE, HEADERS_FILE,
    META_FILE,
};
use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::proxy::headers::HeaderSet;
use crate::proxy::request::NormalizedRequest;

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// Outcome of an expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub remaining: usize,
}

pub struct ResponseCache {
    root: PathBuf,
    default_ttl: Duration,
    stripes: Vec<RwLock<()>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let stripes = (0..config.lock_stripes.max(1))
            .map(|_| RwLock::new(()))
            .collect();
        Self {
            root: PathBuf::from(&config.root),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            stripes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make the root usable and drop whatever already expired.
    ///
    /// A plain file in place of the root is replaced by a directory. Staging
    /// and retired directories left by an interrupted run are removed.
    pub async fn prepare(&self) -> Result<SweepReport, CacheError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if !meta.is_dir() => {
                tracing::warn!(root = %self.root.display(), "Cache root is not a directory, replacing it");
                fs::remove_file(&self.root)
                    .await
                    .map_err(CacheError::io(&self.root))?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(CacheError::io(&self.root))?;

        self.remove_leftovers().await?;
        self.sweep_expired().await
    }

    /// Fetch the live entry stored for `request`.
    ///
    /// Expired entries are removed and reported as a miss. An entry stored
    /// for a different request under the same hash is a miss and is left
    /// alone.
    pub async fn lookup(
        &self,
        request: &NormalizedRequest,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = CacheKey::for_request(request);
        let dir = self.entry_dir(key);
        let now = SystemTime::now();

        {
            let _guard = self.stripe(key).read().await;
            let meta = match read_meta(&dir).await {
                Ok(meta) => meta,
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            };

            if meta.request.as_deref() != Some(request.as_str()) {
                tracing::debug!(%key, request = %request, stored = ?meta.request, "Cache key collision");
                return Ok(None);
            }

            if meta.expiry.is_valid_at(now) {
                let entry = read_entry(&dir, meta).await?;
                return Ok(Some(entry));
            }
        }

        tracing::debug!(%key, request = %request, "Cached entry expired");
        self.reclaim(key, now).await?;
        Ok(None)
    }

    /// Persist a response for `request`, replacing any previous entry.
    ///
    /// Every origin header is kept; the relay allow-list applies when the
    /// entry is served. The expiry comes from the response's `Expires`
    /// header or defaults to the configured lifetime.
    pub async fn store(
        &self,
        request: &NormalizedRequest,
        code: u16,
        headers: &HeaderSet,
        body: Bytes,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry::from_response(
            code,
            headers.clone(),
            body,
            SystemTime::now(),
            self.default_ttl,
        );

        let key = CacheKey::for_request(request);
        let staging = self.root.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        if let Err(e) = write_entry(&staging, request, &entry).await {
            discard(&staging).await;
            return Err(e);
        }

        let retired = self.root.join(format!("{}{}", RETIRED_PREFIX, Uuid::new_v4()));
        let published = {
            let _guard = self.stripe(key).write().await;
            self.publish(key, &staging, &retired).await
        };
        match published {
            Ok(replaced) => {
                if replaced {
                    discard(&retired).await;
                }
                tracing::debug!(%key, request = %request, code, bytes = entry.body.len(), replaced, "Stored response");
                Ok(entry)
            }
            Err(e) => {
                discard(&staging).await;
                Err(e)
            }
        }
    }

    /// Remove every entry whose expiry has passed.
    ///
    /// Entries whose metadata cannot be read are logged and left in place.
    pub async fn sweep_expired(&self) -> Result<SweepReport, CacheError> {
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(CacheError::io(&self.root))?;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(CacheError::io(&self.root))?
        {
            let name = item.file_name();
            let Some(key) = name.to_str().and_then(CacheKey::from_dir_name) else {
                continue;
            };
            report.scanned += 1;

            let path = item.path();
            let _guard = self.stripe(key).write().await;
            match read_meta(&path).await {
                Ok(meta) if !meta.expiry.is_valid_at(now) => match remove_entry(&path).await {
                    Ok(()) => report.removed += 1,
                    Err(e) => tracing::warn!(%key, error = %e, "Could not remove expired entry"),
                },
                Ok(_) => {}
                Err(e) => tracing::warn!(%key, error = %e, "Could not read cached entry, skipping"),
            }
        }

        report.remaining = report.scanned - report.removed;
        metrics::record_cache_size(report.remaining);
        Ok(report)
    }

    fn entry_dir(&self, key: CacheKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    fn stripe(&self, key: CacheKey) -> &RwLock<()> {
        &self.stripes[key.stripe(self.stripes.len())]
    }

    /// Swap the staged entry into place. Caller holds the stripe write lock.
    async fn publish(
        &self,
        key: CacheKey,
        staging: &Path,
        retired: &Path,
    ) -> Result<bool, CacheError> {
        let dir = self.entry_dir(key);
        let replaced = match fs::rename(&dir, retired).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => return Err(CacheError::Io { path: dir, source }),
        };
        if let Err(source) = fs::rename(staging, &dir).await {
            if replaced {
                let _ = fs::rename(retired, &dir).await;
            }
            return Err(CacheError::Io { path: dir, source });
        }
        Ok(replaced)
    }

    /// Remove an entry found expired, unless a store replaced it meanwhile.
    async fn reclaim(&self, key: CacheKey, now: SystemTime) -> Result<(), CacheError> {
        let _guard = self.stripe(key).write().await;
        let dir = self.entry_dir(key);
        match read_meta(&dir).await {
            Ok(meta) if !meta.expiry.is_valid_at(now) => {
                remove_entry(&dir).await?;
                metrics::record_cache_event("reclaimed");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn remove_leftovers(&self) -> Result<(), CacheError> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(CacheError::io(&self.root))?;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(CacheError::io(&self.root))?
        {
            let name = item.file_name();
            let leftover = name
                .to_str()
                .map(|n| n.starts_with(STAGING_PREFIX) || n.starts_with(RETIRED_PREFIX))
                .unwrap_or(false);
            if leftover {
                tracing::debug!(path = %item.path().display(), "Removing interrupted cache write");
                discard(&item.path()).await;
            }
        }
        Ok(())
    }
}

async fn read_meta(dir: &Path) -> Result<Meta, CacheError> {
    let path = dir.join(META_FILE);
    let text = fs::read_to_string(&path)
        .await
        .map_err(CacheError::io(path))?;
    decode_meta(&text)
}

async fn read_entry(dir: &Path, meta: Meta) -> Result<CacheEntry, CacheError> {
    let headers_path = dir.join(HEADERS_FILE);
    let headers = fs::read_to_string(&headers_path)
        .await
        .map_err(CacheError::io(headers_path))?;
    let body_path = dir.join(BODY_FILE);
    let body = fs::read(&body_path)
        .await
        .map_err(CacheError::io(body_path))?;

    Ok(CacheEntry {
        code: meta.code,
        expiry: meta.expiry,
        headers: decode_headers(&headers)?,
        body: Bytes::from(body),
    })
}

async fn write_entry(
    dir: &Path,
    request: &NormalizedRequest,
    entry: &CacheEntry,
) -> Result<(), CacheError> {
    fs::create_dir(dir).await.map_err(CacheError::io(dir))?;

    let records = [
        (HEADERS_FILE, encode_headers(&entry.headers).into_bytes()),
        (BODY_FILE, entry.body.to_vec()),
        (
            META_FILE,
            encode_meta(entry.code, &entry.expiry, request.as_str()).into_bytes(),
        ),
    ];
    for (name, contents) in records {
        let path = dir.join(name);
        fs::write(&path, contents)
            .await
            .map_err(CacheError::io(path))?;
    }
    Ok(())
}

async fn remove_entry(dir: &Path) -> Result<(), CacheError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Io {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

async fn discard(dir: &Path) {
    if let Err(e) = remove_entry(dir).await {
        tracing::warn!(error = %e, "Could not clean up cache directory");
    }
}
