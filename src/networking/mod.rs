use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::catalog::CatalogEntry;
use crate::env;
use crate::error::LauncherError;
use crate::util::{cancel_requested, format_speed, progress_percent};

/// How a finished transfer ended. Cancellation is a normal outcome the
/// caller reacts to, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed,
    Cancelled,
}

/// Streams remote artifacts to disk. Guarantees that a failed or cancelled
/// transfer never leaves a partial file at the destination, so a later
/// retry cannot mistake a truncated download for a complete one.
#[derive(Clone)]
pub struct ArtifactFetcher {
    client: Client,
}

impl ArtifactFetcher {
    pub fn new() -> Self {
        // Game archives can be large; the generous timeout bounds the whole
        // request, not individual reads.
        let client = Client::builder()
            .timeout(Duration::from_secs(30 * 60))
            .build()
            .unwrap_or_else(|err| {
                warn!("fetcher: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    /// Download `url` to `dest`, reporting percent and speed through
    /// `progress`. Percent is 0 while the total size is unknown.
    pub async fn fetch<F>(
        &self,
        url: &str,
        dest: &Path,
        cancel: Option<Arc<AtomicBool>>,
        mut progress: F,
    ) -> Result<FetchOutcome, LauncherError>
    where
        F: FnMut(f32, &str),
    {
        if cancel_requested(&cancel) {
            return Ok(FetchOutcome::Cancelled);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LauncherError::DownloadFailed(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| LauncherError::DownloadFailed(format!("status error: {e}")))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::DownloadFailed(format!("unable to create download dir: {e}")))?;
        }
        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::DownloadFailed(format!("unable to create file: {e}")))?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_tick = Instant::now();
        let mut last_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            if cancel_requested(&cancel) {
                drop(file);
                let _ = fs::remove_file(dest).await;
                info!("fetcher: transfer of {url} cancelled");
                return Ok(FetchOutcome::Cancelled);
            }
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(self
                        .abort_partial(dest, format!("stream error: {e}"))
                        .await);
                }
            };
            if let Err(e) = file.write_all(&chunk).await {
                return Err(self.abort_partial(dest, format!("write error: {e}")).await);
            }
            downloaded += chunk.len() as u64;

            // Coalesce progress so the UI never drowns in updates.
            let since = last_tick.elapsed().as_secs_f32();
            if since > 0.2 {
                let speed = (downloaded - last_bytes) as f32 / since;
                progress(progress_percent(downloaded, total), &format_speed(speed));
                last_tick = Instant::now();
                last_bytes = downloaded;
            }
        }

        if let Err(e) = file.flush().await {
            return Err(self.abort_partial(dest, format!("flush error: {e}")).await);
        }
        drop(file);

        if let Some(total) = total
            && downloaded < total
        {
            return Err(self
                .abort_partial(
                    dest,
                    format!("incomplete: received {downloaded} of {total} bytes"),
                )
                .await);
        }

        progress(100.0, "0 B/s");
        debug!("fetcher: {url} -> {} ({downloaded} bytes)", dest.display());
        Ok(FetchOutcome::Completed)
    }

    async fn abort_partial(&self, dest: &Path, reason: String) -> LauncherError {
        if let Err(e) = fs::remove_file(dest).await {
            warn!("fetcher: unable to remove partial file {}: {e}", dest.display());
        }
        LauncherError::DownloadFailed(reason)
    }

    /// Fetch a game's icon into the icon cache once; subsequent calls
    /// return the cached path without touching the network.
    pub async fn ensure_icon(&self, entry: &CatalogEntry) -> Result<PathBuf, LauncherError> {
        let ext = entry
            .icon_url
            .rsplit('.')
            .next()
            .filter(|ext| ext.len() <= 4 && !ext.contains('/'))
            .unwrap_or("png");
        let path = env::icons_dir().join(format!("{}.{ext}", entry.id));
        if path.exists() {
            return Ok(path);
        }
        if entry.icon_url.is_empty() {
            return Err(LauncherError::NetworkUnavailable("no icon URL".into()));
        }

        let bytes = self
            .client
            .get(&entry.icon_url)
            .send()
            .await
            .map_err(|e| LauncherError::NetworkUnavailable(format!("icon request failed: {e}")))?
            .error_for_status()
            .map_err(|e| LauncherError::NetworkUnavailable(format!("icon status error: {e}")))?
            .bytes()
            .await
            .map_err(|e| LauncherError::NetworkUnavailable(format!("icon body error: {e}")))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::NetworkUnavailable(format!("icon dir error: {e}")))?;
        }
        fs::write(&path, &bytes)
            .await
            .map_err(|e| LauncherError::NetworkUnavailable(format!("icon write error: {e}")))?;
        debug!("fetcher: cached icon for {} at {}", entry.id, path.display());
        Ok(path)
    }

    /// Pass-through fetch of a game's update feed; rendering is up to the
    /// presentation layer.
    pub async fn fetch_feed(&self, url: &str) -> Result<String, LauncherError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| LauncherError::NetworkUnavailable(format!("feed request failed: {e}")))?
            .error_for_status()
            .map_err(|e| LauncherError::NetworkUnavailable(format!("feed status error: {e}")))?
            .text()
            .await
            .map_err(|e| LauncherError::NetworkUnavailable(format!("feed body error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::Ordering;

    // One-shot HTTP server answering with a 100-byte content length and a
    // body delivered as `chunks` writes of 10 bytes, `pause` apart. Fewer
    // than 10 chunks means the connection drops mid-body.
    fn serve_body_chunks(chunks: usize, pause: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n");
                for _ in 0..chunks {
                    if stream.write_all(b"0123456789").is_err() {
                        break;
                    }
                    let _ = stream.flush();
                    std::thread::sleep(pause);
                }
            }
        });
        format!("http://{addr}/artifact.zip")
    }

    #[tokio::test]
    async fn failed_fetch_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.zip");
        let fetcher = ArtifactFetcher::new();

        let err = fetcher
            .fetch("http://127.0.0.1:9/artifact.zip", &dest, None, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn dropped_transfer_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.zip");
        let url = serve_body_chunks(1, Duration::ZERO);

        let fetcher = ArtifactFetcher::new();
        let err = fetcher
            .fetch(&url, &dest, None, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn cancel_mid_transfer_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.zip");
        // Slow chunks so the coalesced progress callback fires between
        // them; the callback raises the flag, the next chunk sees it.
        let url = serve_body_chunks(10, Duration::from_millis(300));

        let flag = Arc::new(AtomicBool::new(false));
        let progress_flag = flag.clone();
        let fetcher = ArtifactFetcher::new();
        let outcome = fetcher
            .fetch(&url, &dest, Some(flag), move |_, _| {
                progress_flag.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn pre_raised_cancel_flag_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.zip");
        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::SeqCst);

        let fetcher = ArtifactFetcher::new();
        let outcome = fetcher
            .fetch(
                "http://127.0.0.1:9/artifact.zip",
                &dest,
                Some(flag),
                |_, _| {},
            )
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert!(!dest.exists());
    }
}
