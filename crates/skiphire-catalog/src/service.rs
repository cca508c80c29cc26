use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::Value as JsonValue;
use skiphire_core::{transform_product, PaginatedProductsResponse, Product, RawProduct};
use skiphire_http::{ApiError, HttpFetcher};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::BoundedCache;
use crate::config::{CatalogConfig, ImageResolverKind};
use crate::images::{CachedImageResolver, ImageIndex, ImageResolver};

/// Catalog facade over the upstream skip-hire API: pages, lookups, images
/// and the page cache. Construct once and share behind an `Arc`.
pub struct CatalogService {
    config: CatalogConfig,
    endpoint: Url,
    fetcher: HttpFetcher,
    images: Arc<dyn ImageResolver>,
    page_cache: BoundedCache<u32, PaginatedProductsResponse>,
}

impl CatalogService {
    pub fn new(
        config: CatalogConfig,
        fetcher: HttpFetcher,
        images: Arc<dyn ImageResolver>,
    ) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&config.external_api_endpoint).with_context(|| {
            format!("parsing EXTERNAL_API_ENDPOINT {}", config.external_api_endpoint)
        })?;
        if endpoint.cannot_be_a_base() {
            bail!("EXTERNAL_API_ENDPOINT must be an http(s) URL: {endpoint}");
        }
        let page_cache = BoundedCache::new(config.cache_capacity(), Some(config.cache_ttl()));

        Ok(Self {
            config,
            endpoint,
            fetcher,
            images,
            page_cache,
        })
    }

    pub fn from_config(config: CatalogConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(config.http_client_config())?;
        let images: Arc<dyn ImageResolver> = match config.image_resolver {
            ImageResolverKind::Wrap => Arc::new(ImageIndex::load(&config.images_dir)),
            ImageResolverKind::Indexed => {
                Arc::new(CachedImageResolver::from_dir(&config.images_dir))
            }
        };
        info!(
            endpoint = %config.external_api_endpoint,
            per_page = config.products_per_page,
            resolver = ?config.image_resolver,
            "catalog service configured"
        );
        Self::new(config, fetcher, images)
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Upstream URL for `page`, keeping any query the endpoint already has.
    pub fn page_url(&self, page: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.config.products_per_page.to_string());
        url
    }

    pub fn product_url(&self, id: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        url
    }

    /// Fetches one page of products. `next_page` is set only when upstream
    /// returned a full page.
    pub async fn fetch_page(&self, page: u32) -> Result<PaginatedProductsResponse, ApiError> {
        let page = page.max(1);
        if let Some(cached) = self.page_cache.get(&page).await {
            debug!(page, "page cache hit");
            return Ok(cached);
        }

        let url = self.page_url(page);
        let body: JsonValue = self.fetcher.get_json(url.as_str()).await?;
        if !body.is_array() {
            return Err(ApiError::InvalidShape(
                "API response does not contain a valid product array".to_string(),
            ));
        }
        let raw_products: Vec<RawProduct> = serde_json::from_value(body)
            .map_err(|source| ApiError::Malformed {
                url: url.to_string(),
                source,
            })?;

        let mut products = Vec::with_capacity(raw_products.len());
        for raw in &raw_products {
            products.push(self.assemble(raw).await);
        }

        let full_page = raw_products.len() == self.config.products_per_page as usize;
        let response = PaginatedProductsResponse {
            products,
            next_page: page.checked_add(1).filter(|_| full_page),
        };
        self.page_cache.insert(page, response.clone()).await;
        Ok(response)
    }

    /// Looks up one product. Every failure, including a true 404, reads as
    /// `None`; the distinction only shows in the logs.
    pub async fn product_by_id(&self, id: &str) -> Option<Product> {
        let url = self.product_url(id);
        match self.fetcher.get_json::<Option<RawProduct>>(url.as_str()).await {
            Ok(Some(raw)) => Some(self.assemble(&raw).await),
            Ok(None) => None,
            Err(err) if err.status_code() == Some(404) => {
                warn!(id, "product not found upstream");
                None
            }
            Err(err) => {
                error!(id, error = %err, "failed to fetch product");
                None
            }
        }
    }

    async fn assemble(&self, raw: &RawProduct) -> Product {
        let mut product = transform_product(raw);
        product.image_url = self.images.resolve(raw.id).await;
        product
    }
}
