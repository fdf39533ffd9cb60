//! Uploaded image storage
//!
//! Keys look like `product_image/<uuid>.png` and are what the database
//! stores; `public_url` turns a key into the link served under
//! `/public/storage`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{EcommerceError, Result};

pub const PRODUCT_IMAGES: &str = "product_image";
pub const CATEGORY_IMAGES: &str = "category_image";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "svg"];
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Writes the bytes under `folder` and returns the new key.
    async fn save(&self, folder: &str, original_name: &str, bytes: &[u8]) -> Result<String>;

    /// Best effort; a missing file is not an error.
    async fn delete(&self, key: &str);
}

pub fn public_url(app_url: &str, key: &str) -> String {
    format!("{}/public/storage/{key}", app_url.trim_end_matches('/'))
}

fn extension_of(original_name: &str) -> Result<String> {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| EcommerceError::validation("Image file needs an extension"))?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(EcommerceError::validation(format!("Unsupported image type: {ext}")));
    }
    Ok(ext)
}

/// Rejects keys that would escape the storage root.
fn safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
}

#[derive(Clone, Debug)]
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, folder: &str, original_name: &str, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(EcommerceError::validation("Image file is empty"));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(EcommerceError::validation("Image file is too large"));
        }
        let ext = extension_of(original_name)?;
        let key = format!("{folder}/{}.{ext}", Uuid::new_v4());
        let path = self.root.join(&key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| EcommerceError::Storage(format!("{}: {e}", dir.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EcommerceError::Storage(format!("{}: {e}", path.display())))?;
        tracing::debug!(key, size = bytes.len(), "image stored");
        Ok(key)
    }

    async fn delete(&self, key: &str) {
        if !safe_key(key) {
            tracing::warn!(key, "refusing to delete image outside storage root");
            return;
        }
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => tracing::debug!(key, "image deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key, error = %e, "failed to delete image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_rules() {
        assert_eq!(extension_of("photo.JPG").unwrap(), "jpg");
        assert!(extension_of("script.sh").is_err());
        assert!(extension_of("noext").is_err());
    }

    #[test]
    fn test_safe_key() {
        assert!(safe_key("product_image/a.png"));
        assert!(!safe_key("../etc/passwd"));
        assert!(!safe_key("/abs.png"));
        assert!(!safe_key("product_image//a.png"));
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let root = std::env::temp_dir().join(format!("storefront-images-{}", Uuid::new_v4()));
        let store = LocalImageStore::new(&root);
        let key = store.save(PRODUCT_IMAGES, "a.png", b"png-bytes").await.unwrap();
        assert!(key.starts_with("product_image/"));
        assert!(root.join(&key).exists());
        store.delete(&key).await;
        assert!(!root.join(&key).exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            public_url("http://localhost:8083/", "product_image/a.png"),
            "http://localhost:8083/public/storage/product_image/a.png"
        );
    }
}
