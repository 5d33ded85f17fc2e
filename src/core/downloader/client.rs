use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
}

impl DownloadEntry {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            sha1: None,
        }
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1;
        self
    }
}

/// Streams remote artifacts to disk.
///
/// Writes go to `<dest>.part` first and are renamed into place once the body
/// is complete, so an interrupted transfer never leaves a truncated file under
/// the final name (the "skip if already present" checks rely on that).
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    /// Idle limit between body chunks and the whole-request limit for small documents.
    timeout: Duration,
}

impl Downloader {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            concurrency: 4,
            timeout,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Single file download ────────────────────────────

    /// Download a single file to `dest`, optionally validating SHA-1.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| timed_out(url, self.timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let partial = partial_path(dest);
        let mut hasher = Sha1::new();
        let mut written: u64 = 0;

        {
            let mut file = tokio::fs::File::create(&partial)
                .await
                .map_err(|e| LauncherError::io(&partial, e))?;
            let mut body = response.bytes_stream();

            loop {
                let next = match tokio::time::timeout(self.timeout, body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        drop(file);
                        discard(&partial).await;
                        return Err(timed_out(url, self.timeout));
                    }
                };
                let Some(chunk) = next else { break };
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        drop(file);
                        discard(&partial).await;
                        return Err(e.into());
                    }
                };
                hasher.update(&chunk);
                written += chunk.len() as u64;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(&partial, e))?;
            }

            file.flush()
                .await
                .map_err(|e| LauncherError::io(&partial, e))?;
            // handle dropped before the rename, required on Windows
        }

        if let Some(expected) = sha1_expected {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                discard(&partial).await;
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| LauncherError::io(dest, e))?;

        debug!(url, dest = %dest.display(), bytes = written, "downloaded");
        Ok(())
    }

    /// GET a small JSON document with a whole-request timeout.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<T> {
        let raw = self.fetch_text(url).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// GET a small text document with a whole-request timeout.
    pub async fn fetch_text(&self, url: &str) -> LauncherResult<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    ///
    /// Returns the entries that failed together with their error; callers
    /// decide how loudly to report them. Every entry targets a distinct path.
    pub async fn download_batch(
        &self,
        entries: Vec<DownloadEntry>,
    ) -> Vec<(DownloadEntry, LauncherError)> {
        if entries.is_empty() {
            return Vec::new();
        }

        info!(
            files = entries.len(),
            concurrency = self.concurrency,
            "starting batch download"
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| async move {
                let result = self
                    .download_file(&entry.url, &entry.dest, entry.sha1.as_deref())
                    .await;
                (entry, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(entry, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    debug!(url = %entry.url, error = %e, "batch entry failed");
                    Some((entry, e))
                }
            })
            .collect()
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        debug!(path = %partial.display(), error = %e, "could not remove partial download");
    }
}

fn timed_out(url: &str, limit: Duration) -> LauncherError {
    LauncherError::ArtifactDownloadFailed {
        url: url.to_string(),
        reason: format!("timed out after {} ms", limit.as_millis()),
    }
}
