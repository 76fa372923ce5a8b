//! Image fetching for delivery.
//!
//! References starting with `http://` or `https://` are downloaded; anything
//! else is read as a local file path.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{ImageData, ImageFetcher};

/// Upload limit for photos on the broadcast destination
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<ImageData> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download image: {}", url))?
            .error_for_status()
            .with_context(|| format!("Image request rejected: {}", url))?;

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        if let Some(mime) = mime.as_deref() {
            if !mime.starts_with("image/") {
                anyhow::bail!("Not an image ({}): {}", mime, url);
            }
        }

        if let Some(declared) = response.content_length() {
            ensure_within_limit(declared, MAX_IMAGE_BYTES)?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.context("Failed to read image body")? {
            append_capped(&mut bytes, &chunk, MAX_IMAGE_BYTES)?;
        }

        Ok(ImageData {
            bytes,
            file_name: file_name_from(url),
            mime,
        })
    }

    async fn read_local(&self, path: &str) -> Result<ImageData> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to read image file: {}", path))?;
        ensure_within_limit(metadata.len(), MAX_IMAGE_BYTES)?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image file: {}", path))?;

        Ok(ImageData {
            bytes,
            file_name: file_name_from(path),
            mime: mime_from_extension(path).map(str::to_string),
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, reference: &str) -> Result<ImageData> {
        let reference = reference.trim();
        let image = if is_remote(reference) {
            self.download(reference).await?
        } else {
            self.read_local(reference).await?
        };

        if image.bytes.is_empty() {
            anyhow::bail!("Image is empty: {}", reference);
        }

        debug!(reference, bytes = image.bytes.len(), "Image fetched");
        Ok(image)
    }
}

fn ensure_within_limit(len: u64, limit: usize) -> Result<()> {
    if len > limit as u64 {
        anyhow::bail!("Image too large: {} bytes (limit {})", len, limit);
    }
    Ok(())
}

/// Append a downloaded chunk, failing as soon as the body exceeds `limit`
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<()> {
    ensure_within_limit((buf.len() + chunk.len()) as u64, limit)?;
    buf.extend_from_slice(chunk);
    Ok(())
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Last path segment without query string, or a generic name
fn file_name_from(reference: &str) -> String {
    let without_query = reference.split(['?', '#']).next().unwrap_or(reference);
    Path::new(without_query)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("image.jpg")
        .to_string()
}

fn mime_from_extension(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from("https://example.com/a/photo.png?size=large"), "photo.png");
        assert_eq!(file_name_from("https://example.com/"), "example.com");
        assert_eq!(file_name_from("/tmp/pic.jpg"), "pic.jpg");
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("x.JPG"), Some("image/jpeg"));
        assert_eq!(mime_from_extension("x.txt"), None);
        assert_eq!(mime_from_extension("noext"), None);
    }

    #[tokio::test]
    async fn test_reads_local_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cover.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let image = fetcher.fetch(path.to_str().unwrap()).await.unwrap();

        assert_eq!(image.bytes.len(), 4);
        assert_eq!(image.file_name, "cover.png");
        assert_eq!(image.mime.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_missing_or_empty_file_fails() {
        let temp = TempDir::new().unwrap();
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();

        let missing = temp.path().join("missing.jpg");
        assert!(fetcher.fetch(missing.to_str().unwrap()).await.is_err());

        let empty = temp.path().join("empty.jpg");
        std::fs::write(&empty, b"").unwrap();
        assert!(fetcher.fetch(empty.to_str().unwrap()).await.is_err());
    }

    #[test]
    fn test_declared_size_over_limit_rejected() {
        assert!(ensure_within_limit(MAX_IMAGE_BYTES as u64, MAX_IMAGE_BYTES).is_ok());
        let err = ensure_within_limit(MAX_IMAGE_BYTES as u64 + 1, MAX_IMAGE_BYTES).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_chunks_stop_at_limit() {
        let mut buf = Vec::new();
        append_capped(&mut buf, &[1; 6], 10).unwrap();
        assert!(append_capped(&mut buf, &[2; 5], 10).is_err());
        // The chunk that crossed the limit was not buffered
        assert_eq!(buf.len(), 6);
        append_capped(&mut buf, &[3; 4], 10).unwrap();
        assert_eq!(buf.len(), 10);
    }

    #[tokio::test]
    async fn test_oversized_local_file_rejected_before_reading() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("huge.jpg");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_IMAGE_BYTES as u64 + 1).unwrap();

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(path.to_str().unwrap()).await.unwrap_err();

        assert!(err.to_string().contains("too large"));
    }
}
