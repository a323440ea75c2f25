use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tokio_util::io::ReaderStream;

/// An original on local disk with a known length, opened only when the
/// upload actually streams it.
#[derive(Debug, Clone)]
pub struct AssetPayload {
    path: PathBuf,
    file_name: String,
    size: u64,
}

/// Device-asset id Immich uses to recognise an asset coming from the same
/// "device": `<basename>-<size>` with every whitespace character removed.
pub fn device_asset_id(file_name: &str, size: u64) -> String {
    format!("{}-{}", file_name, size)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

impl AssetPayload {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            size,
        }
    }

    /// Stat the original and capture its size. Anything but a regular file
    /// is rejected.
    pub async fn stat(path: PathBuf) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok(Self::new(path, metadata.len()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn device_asset_id(&self) -> String {
        device_asset_id(&self.file_name, self.size)
    }

    /// Open the file as a streaming request body.
    pub async fn open(&self) -> std::io::Result<reqwest::Body> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(reqwest::Body::wrap_stream(ReaderStream::new(file)))
    }

    /// Hex SHA-1 of the file contents, the fingerprint Immich deduplicates on.
    pub async fn sha1_hex(&self) -> std::io::Result<String> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            let mut hasher = Sha1::new();
            std::io::copy(&mut file, &mut hasher)?;
            let hash = hasher.finalize();
            Ok(hash.iter().map(|b| format!("{:02x}", b)).collect())
        })
        .await
        .map_err(std::io::Error::other)?
    }
}
