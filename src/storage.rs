// storage.rs
// Slip image storage on the local filesystem, addressed by public URL.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use uuid::Uuid;

use crate::{
    models::SlipImage,
    slip::{DecodedSlip, sniff_image_type},
};

#[derive(Clone)]
pub struct SlipStorage {
    root: PathBuf,
    public_base_url: String,
}

impl SlipStorage {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn save(&self, slip: &DecodedSlip) -> Result<SlipImage> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating slip directory {}", self.root.display()))?;

        let file_name = format!("{}.{}", Uuid::new_v4(), slip.extension());
        let path = self.root.join(&file_name);
        fs::write(&path, &slip.bytes)
            .await
            .with_context(|| format!("writing slip {}", path.display()))?;

        Ok(SlipImage {
            url: format!("{}/slips/{}", self.public_base_url, file_name),
            size: slip.bytes.len() as i64,
            content_type: slip.content_type.to_string(),
        })
    }

    /// Reads a stored slip back by file name. Names that could escape the root are misses.
    pub async fn load(&self, file_name: &str) -> Result<Option<DecodedSlip>> {
        if !is_stored_name(file_name) {
            return Ok(None);
        }
        let path = self.root.join(file_name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading slip {}", path.display())),
        };
        Ok(sniff_image_type(&bytes).map(|content_type| DecodedSlip {
            bytes,
            content_type,
        }))
    }

    /// Deletes the file behind a stored slip. Already-missing files are fine.
    pub async fn remove(&self, slip: &SlipImage) -> Result<()> {
        let Some(file_name) = slip.url.rsplit('/').next().filter(|n| is_stored_name(n)) else {
            return Ok(());
        };
        let path = self.root.join(file_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing slip {}", path.display())),
        }
    }
}

fn is_stored_name(file_name: &str) -> bool {
    !file_name.is_empty()
        && !file_name.starts_with('.')
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_slip_and_returns_public_url() {
        let root = std::env::temp_dir().join(format!("dk_slips_{}", Uuid::new_v4()));
        let storage = SlipStorage::new(root.clone(), "http://example.test/");
        let slip = DecodedSlip {
            bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2],
            content_type: "image/png",
        };

        let stored = storage.save(&slip).await.unwrap();
        assert!(stored.url.starts_with("http://example.test/slips/"));
        assert!(stored.url.ends_with(".png"));
        assert_eq!(stored.size, 10);
        assert_eq!(stored.content_type, "image/png");

        let file_name = stored.url.rsplit('/').next().unwrap();
        let on_disk = fs::read(root.join(file_name)).await.unwrap();
        assert_eq!(on_disk, slip.bytes);

        let loaded = storage.load(file_name).await.unwrap().unwrap();
        assert_eq!(loaded.content_type, "image/png");
        assert!(storage.load("../etc/passwd").await.unwrap().is_none());
        assert!(storage.load("missing.png").await.unwrap().is_none());

        storage.remove(&stored).await.unwrap();
        assert!(storage.load(file_name).await.unwrap().is_none());
        // a second remove is a no-op
        storage.remove(&stored).await.unwrap();
        let _ = fs::remove_dir_all(root).await;
    }
}
