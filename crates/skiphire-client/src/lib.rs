//! Catalog API client and the page-by-page loader that drives infinite
//! scrolling on top of it.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use skiphire_core::{PaginatedProductsResponse, Product};
use skiphire_http::{ApiError, HttpClientConfig, HttpFetcher};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const PRODUCTS_API_PATH: &str = "/api/products";
pub const NETWORK_ERROR_MESSAGE: &str =
    "Could not load products. Please check your network connection.";

/// Displayable failure for a page load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchProductsError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl From<ApiError> for FetchProductsError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::HttpStatus {
                status, message, ..
            } => Self {
                message,
                status_code: Some(status),
            },
            _ => Self {
                message: NETWORK_ERROR_MESSAGE.to_string(),
                status_code: None,
            },
        }
    }
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<PaginatedProductsResponse, FetchProductsError>;
}

#[derive(Debug, Clone)]
pub struct ProductsClient {
    fetcher: HttpFetcher,
    products_url: Url,
}

impl ProductsClient {
    pub fn new(base_url: &str, config: HttpClientConfig) -> anyhow::Result<Self> {
        let products_url = Url::parse(base_url)
            .and_then(|base| base.join(PRODUCTS_API_PATH))
            .with_context(|| format!("parsing catalog base url {base_url}"))?;
        Ok(Self {
            fetcher: HttpFetcher::new(config)?,
            products_url,
        })
    }

    pub fn page_url(&self, page: u32) -> Url {
        let mut url = self.products_url.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    pub async fn fetch_products(
        &self,
        page: u32,
    ) -> Result<PaginatedProductsResponse, FetchProductsError> {
        self.fetcher
            .get_json(self.page_url(page).as_str())
            .await
            .map_err(|err| {
                error!(page, error = %err, "fetch products error");
                FetchProductsError::from(err)
            })
    }
}

#[async_trait]
impl PageSource for ProductsClient {
    async fn fetch_page(&self, page: u32) -> Result<PaginatedProductsResponse, FetchProductsError> {
        self.fetch_products(page).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsState {
    pub products: Vec<Product>,
    pub status: LoadStatus,
    pub error: Option<String>,
    /// Last page loaded successfully; 0 before the first load.
    pub page: u32,
    pub has_next_page: bool,
    pub is_fetching_next_page: bool,
}

impl Default for ProductsState {
    fn default() -> Self {
        Self {
            products: Vec::new(),
            status: LoadStatus::Idle,
            error: None,
            page: 0,
            has_next_page: true,
            is_fetching_next_page: false,
        }
    }
}

/// Loads pages strictly in order, one at a time, starting at page 1.
pub struct InfinitePager<S> {
    source: S,
    state: ProductsState,
    pending_page: Option<u32>,
}

impl<S: PageSource> InfinitePager<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: ProductsState::default(),
            pending_page: Some(1),
        }
    }

    pub fn state(&self) -> &ProductsState {
        &self.state
    }

    pub fn products(&self) -> &[Product] {
        &self.state.products
    }

    pub fn has_next_page(&self) -> bool {
        self.pending_page.is_some()
    }

    /// Loads the next page if there is one. Returns `true` when a page was
    /// appended. A failure leaves the page pending for [`Self::retry`].
    pub async fn fetch_next_page(&mut self) -> bool {
        let Some(page) = self.pending_page else {
            return false;
        };

        self.state.status = LoadStatus::Loading;
        self.state.is_fetching_next_page = page > 1;

        let outcome = self.source.fetch_page(page).await;
        self.state.is_fetching_next_page = false;

        match outcome {
            Ok(resp) => {
                debug!(page, count = resp.products.len(), next = ?resp.next_page, "page loaded");
                self.state.products.extend(resp.products);
                self.state.page = page;
                self.state.status = LoadStatus::Succeeded;
                self.state.error = None;
                self.pending_page = resp.next_page;
                self.state.has_next_page = self.pending_page.is_some();
                true
            }
            Err(err) => {
                self.state.status = LoadStatus::Failed;
                self.state.error = Some(err.message);
                false
            }
        }
    }

    /// Re-issues the page that last failed.
    pub async fn retry(&mut self) -> bool {
        if self.state.status != LoadStatus::Failed {
            return false;
        }
        self.fetch_next_page().await
    }

    /// Loads up to `max_pages` pages, stopping at the end of the catalog or
    /// the first failure. Returns the number of pages appended.
    pub async fn fetch_pages(&mut self, max_pages: usize) -> usize {
        let mut loaded = 0;
        while loaded < max_pages && self.fetch_next_page().await {
            loaded += 1;
        }
        loaded
    }

    pub fn into_state(self) -> ProductsState {
        self.state
    }
}

#[async_trait]
impl<'a, S: PageSource> PageSource for &'a S {
    async fn fetch_page(&self, page: u32) -> Result<PaginatedProductsResponse, FetchProductsError> {
        (**self).fetch_page(page).await
    }
}
