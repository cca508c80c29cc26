//! Product image lookup by index.
//!
//! Two policies are available. [`ImageIndex`] wraps any index around the
//! sorted image list. [`CachedImageResolver`] rejects out-of-range indices,
//! loads the asset with retries and memoizes the resulting URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use skiphire_http::{retry_with_backoff, BackoffPolicy, Retryable};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::BoundedCache;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "svg"];
pub const PUBLIC_IMAGE_PREFIX: &str = "/images/products";
pub const IMAGE_URL_CACHE_CAPACITY: u64 = 100;

#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, index: i64) -> Option<String>;
}

fn has_image_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Lists image file names in `dir`, sorted lexicographically.
pub fn scan_image_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut files = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| has_image_extension(name))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

// A missing or empty directory degrades to "no images".
fn scan_or_warn(dir: &Path) -> Vec<String> {
    match scan_image_files(dir) {
        Ok(files) => {
            if files.is_empty() {
                warn!(dir = %dir.display(), "no product images found");
            } else {
                info!(dir = %dir.display(), count = files.len(), "loaded product images");
            }
            files
        }
        Err(err) => {
            error!(
                dir = %dir.display(),
                error = %err,
                "could not read product images directory"
            );
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    paths: Vec<String>,
}

impl ImageIndex {
    pub fn new(mut paths: Vec<String>) -> Self {
        paths.sort();
        Self { paths }
    }

    pub fn load(dir: &Path) -> Self {
        let paths = scan_or_warn(dir)
            .into_iter()
            .map(|file| format!("{PUBLIC_IMAGE_PREFIX}/{file}"))
            .collect();
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn image_url_by_index(&self, index: i64) -> Option<&str> {
        if self.paths.is_empty() {
            return None;
        }
        let slot = index.rem_euclid(self.paths.len() as i64) as usize;
        self.paths.get(slot).map(String::as_str)
    }
}

#[async_trait]
impl ImageResolver for ImageIndex {
    async fn resolve(&self, index: i64) -> Option<String> {
        self.image_url_by_index(index).map(str::to_string)
    }
}

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("image {path} unavailable: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown image {0}")]
    Unknown(String),
}

impl Retryable for ImageLoadError {
    fn is_retryable(&self) -> bool {
        matches!(self, ImageLoadError::Io { .. })
    }
}

/// Turns an image file name into a servable URL.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, file_name: &str) -> Result<String, ImageLoadError>;
}

/// Reads images from disk and returns fingerprinted public URLs.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    root: PathBuf,
    public_prefix: String,
}

impl FsImageLoader {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn fingerprint(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(8);
        digest
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, file_name: &str) -> Result<String, ImageLoadError> {
        if file_name.contains(['/', '\\']) || file_name == ".." || !has_image_extension(file_name) {
            return Err(ImageLoadError::Unknown(file_name.to_string()));
        }
        let bytes = tokio::fs::read(self.root.join(file_name))
            .await
            .map_err(|source| ImageLoadError::Io {
                path: file_name.to_string(),
                source,
            })?;
        Ok(format!(
            "{}/{}?v={}",
            self.public_prefix.trim_end_matches('/'),
            file_name,
            Self::fingerprint(&bytes)
        ))
    }
}

pub fn image_load_backoff() -> BackoffPolicy {
    BackoffPolicy::new(3, Duration::from_millis(300))
}

pub struct CachedImageResolver<L> {
    files: Vec<String>,
    loader: L,
    cache: BoundedCache<String, String>,
    backoff: BackoffPolicy,
}

impl CachedImageResolver<FsImageLoader> {
    pub fn from_dir(dir: &Path) -> Self {
        Self::new(
            scan_or_warn(dir),
            FsImageLoader::new(dir, PUBLIC_IMAGE_PREFIX),
        )
    }
}

impl<L: ImageLoader> CachedImageResolver<L> {
    pub fn new(mut files: Vec<String>, loader: L) -> Self {
        files.sort();
        Self {
            files,
            loader,
            cache: BoundedCache::new(IMAGE_URL_CACHE_CAPACITY, None),
            backoff: image_load_backoff(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn image_url_by_index(&self, index: i64) -> Option<String> {
        let file = usize::try_from(index).ok().and_then(|i| self.files.get(i))?;

        if let Some(url) = self.cache.get(file).await {
            return Some(url);
        }

        match retry_with_backoff(self.backoff, file, || self.loader.load(file)).await {
            Ok(url) => {
                self.cache.insert(file.clone(), url.clone()).await;
                Some(url)
            }
            Err(err) => {
                error!(index, file = %file, error = %err, "failed to load product image");
                None
            }
        }
    }
}

#[async_trait]
impl<L: ImageLoader> ImageResolver for CachedImageResolver<L> {
    async fn resolve(&self, index: i64) -> Option<String> {
        self.image_url_by_index(index).await
    }
}
