use std::path::PathBuf;
use std::time::Duration;

use skiphire_http::{BackoffPolicy, HttpClientConfig};

pub const DEFAULT_EXTERNAL_API_ENDPOINT: &str =
    "https://app.wewantwaste.co.uk/api/skips/by-location?postcode=NR32&area=Lowestoft";

/// Capacity used when `CACHE_MAX_ITEMS` is zero.
pub const FALLBACK_CACHE_MAX_ITEMS: u64 = 100;

/// Page TTL used when `CACHE_MAX_AGE_MS` is zero.
pub const FALLBACK_CACHE_MAX_AGE_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageResolverKind {
    /// Modulo wrap-around over the sorted image list.
    Wrap,
    /// Bounds-checked lookup with retried loads and a memoized URL cache.
    Indexed,
}

impl ImageResolverKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wrap" => Some(Self::Wrap),
            "indexed" => Some(Self::Indexed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub port: u16,
    pub external_api_endpoint: String,
    pub products_per_page: u32,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub cache_max_items: u64,
    pub cache_max_age_ms: u64,
    pub images_dir: PathBuf,
    pub image_resolver: ImageResolverKind,
    pub request_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            external_api_endpoint: DEFAULT_EXTERNAL_API_ENDPOINT.to_string(),
            products_per_page: 20,
            retry_count: 3,
            retry_delay_ms: 1000,
            cache_max_items: 1,
            cache_max_age_ms: FALLBACK_CACHE_MAX_AGE_MS,
            images_dir: PathBuf::from("./public/images/products"),
            image_resolver: ImageResolverKind::Wrap,
            request_timeout_ms: 10_000,
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; unset or unparsable values
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            external_api_endpoint: lookup("EXTERNAL_API_ENDPOINT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.external_api_endpoint),
            products_per_page: parsed("PRODUCTS_PER_PAGE")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.products_per_page),
            retry_count: parsed("RETRY_COUNT")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.retry_count),
            retry_delay_ms: parsed("RETRY_DELAY_MS").unwrap_or(defaults.retry_delay_ms),
            cache_max_items: parsed("CACHE_MAX_ITEMS").unwrap_or(defaults.cache_max_items),
            cache_max_age_ms: parsed("CACHE_MAX_AGE_MS").unwrap_or(defaults.cache_max_age_ms),
            images_dir: lookup("IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
            image_resolver: lookup("IMAGE_RESOLVER")
                .and_then(|v| ImageResolverKind::parse(&v))
                .unwrap_or(defaults.image_resolver),
            request_timeout_ms: parsed("REQUEST_TIMEOUT_MS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.request_timeout_ms),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.retry_count, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_millis(self.request_timeout_ms),
            backoff: self.backoff(),
            ..HttpClientConfig::default()
        }
    }

    pub fn cache_capacity(&self) -> u64 {
        if self.cache_max_items == 0 {
            FALLBACK_CACHE_MAX_ITEMS
        } else {
            self.cache_max_items
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        match self.cache_max_age_ms {
            0 => Duration::from_millis(FALLBACK_CACHE_MAX_AGE_MS),
            ms => Duration::from_millis(ms),
        }
    }
}
