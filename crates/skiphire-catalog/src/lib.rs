//! Product catalog: configuration, image assignment, page caching and the
//! paginated retrieval pipeline over the upstream skip-hire API.

pub mod cache;
pub mod config;
pub mod images;
pub mod service;

pub use cache::BoundedCache;
pub use config::{
    CatalogConfig, ImageResolverKind, DEFAULT_EXTERNAL_API_ENDPOINT, FALLBACK_CACHE_MAX_AGE_MS,
};
pub use images::{
    CachedImageResolver, FsImageLoader, ImageIndex, ImageLoadError, ImageLoader, ImageResolver,
};
pub use service::CatalogService;
