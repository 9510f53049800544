use crate::crawler::Transport;
use crate::storage::StorageSink;
use crate::url::complete_url;
use crate::HarvestError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

/// Attempts made for one file before giving up
const MAX_ATTEMPTS: u32 = 3;

/// Extension guesses for common content types
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/bmp", "bmp"),
    ("image/x-icon", "ico"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/json", "json"),
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/css", "css"),
];

/// Downloads binary resources referenced by a page into its storage location
#[derive(Clone)]
pub struct FileDownloader {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn StorageSink>,
}

impl FileDownloader {
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn StorageSink>) -> Self {
        Self { transport, sink }
    }

    /// Downloads `url` (resolved against `page_url`) into `location`
    ///
    /// Connection failures are retried, up to three attempts in total. On
    /// success returns the file name, which is unique per source URL.
    pub async fn download_file(
        &self,
        page_url: &Url,
        location: &str,
        url: &str,
    ) -> Result<String, HarvestError> {
        let resolved = complete_url(page_url, url.trim()).ok_or_else(|| HarvestError::Download {
            url: url.to_string(),
            message: "cannot resolve URL".to_string(),
        })?;

        let mut attempt = 1;
        let response = loop {
            match self.transport.get(&resolved).await {
                Ok(response) if response.is_success() => break response,
                Ok(response) => {
                    return Err(HarvestError::Download {
                        url: resolved,
                        message: format!("HTTP {}", response.status_code),
                    })
                }
                Err(e) if e.is_connection_failure() && attempt < MAX_ATTEMPTS => {
                    tracing::info!(
                        "Retrying download of {} ({}/{}): {}",
                        resolved,
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let file_name = file_name_for(&resolved, response.content_type.as_deref());
        self.sink
            .write(&format!("{}/{}", location, file_name), &response.body)?;
        tracing::debug!("Downloaded {} as {}", resolved, file_name);
        Ok(file_name)
    }
}

/// Derives the stored file name of a resource
///
/// The name is the first 32 hex characters of the SHA-256 of the URL,
/// followed by an extension taken from the URL path or, failing that, from
/// the content type.
///
/// # Examples
///
/// ```
/// use sumi_harvest::document::file_name_for;
///
/// let name = file_name_for("https://e.com/img/photo.JPG?size=2", None);
/// assert!(name.ends_with(".jpg"));
/// assert_eq!(name.len(), 32 + 4);
/// ```
pub fn file_name_for(url: &str, content_type: Option<&str>) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let hash = &digest[..32];
    match extension_from_url(url).or_else(|| content_type.and_then(extension_from_content_type)) {
        Some(ext) => format!("{}.{}", hash, ext),
        None => hash.to_string(),
    }
}

fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (_, ext) = last.rsplit_once('.')?;
    let valid = (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

fn extension_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FetchError, FetchResponse};
    use crate::storage::FsStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails with a connection error `failures` times, then serves the file
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Connect("refused".into()));
            }
            Ok(FetchResponse {
                final_url: url.to_string(),
                status_code: 200,
                content_type: Some("image/png".to_string()),
                body: b"PNG".to_vec(),
            })
        }
    }

    fn setup(failures: usize) -> (TempDir, Arc<FlakyTransport>, FileDownloader) {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FlakyTransport {
            failures,
            calls: AtomicUsize::new(0),
        });
        let downloader = FileDownloader::new(transport.clone(), Arc::new(FsStorage::new(dir.path())));
        (dir, transport, downloader)
    }

    fn page() -> Url {
        Url::parse("https://e.com/posts/1").unwrap()
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://e.com/a/b.PNG"), Some("png".into()));
        assert_eq!(extension_from_url("https://e.com/a/b.tar.gz"), Some("gz".into()));
        assert_eq!(extension_from_url("https://e.com/a/b.toolong"), None);
        assert_eq!(extension_from_url("https://e.com/a/b"), None);
    }

    #[test]
    fn test_file_name_falls_back_to_content_type() {
        let name = file_name_for("https://e.com/image?id=3", Some("image/jpeg; charset=binary"));
        assert!(name.ends_with(".jpg"));
        let bare = file_name_for("https://e.com/image?id=3", Some("application/x-unknown"));
        assert_eq!(bare.len(), 32);
    }

    #[test]
    fn test_file_name_is_stable_per_url() {
        assert_eq!(
            file_name_for("https://e.com/a.png", None),
            file_name_for("https://e.com/a.png", None)
        );
        assert_ne!(
            file_name_for("https://e.com/a.png", None),
            file_name_for("https://e.com/b.png", None)
        );
    }

    #[tokio::test]
    async fn test_download_resolves_relative_url() {
        let (dir, _, downloader) = setup(0);

        let name = downloader.download_file(&page(), "loc", "/img/a.png").await.unwrap();

        assert_eq!(name, file_name_for("https://e.com/img/a.png", None));
        assert_eq!(std::fs::read(dir.path().join("loc").join(&name)).unwrap(), b"PNG");
    }

    #[tokio::test]
    async fn test_download_retries_connection_failures() {
        let (_dir, transport, downloader) = setup(2);

        let result = downloader.download_file(&page(), "loc", "a.png").await;

        assert!(result.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_download_gives_up_after_three_attempts() {
        let (_dir, transport, downloader) = setup(5);

        let result = downloader.download_file(&page(), "loc", "a.png").await;

        assert!(result.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }
}
