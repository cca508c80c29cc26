//! Core catalog model and the raw-to-view-model product transform.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub const CURRENCY_SYMBOL: &str = "£";

/// Products created less than this long ago are flagged as new.
pub const NEW_PRODUCT_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Upstream skip record as returned by the skip-hire API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    pub id: i64,
    pub size: u32,
    pub hire_period_days: u32,
    pub transport_cost: Option<f64>,
    pub per_tonne_cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price_before_vat: Option<f64>,
    #[serde(default)]
    pub vat: f64,
    pub postcode: String,
    #[serde(default)]
    pub area: String,
    pub forbidden: bool,
    pub created_at: String,
    pub updated_at: String,
    pub allowed_on_road: bool,
    pub allows_heavy_waste: bool,
}

/// Slim product view model served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub allowed_on_road: bool,
    pub size: u32,
    pub hire_period_days: u32,
    pub postcode: String,
    #[serde(rename = "isNew")]
    pub is_new: bool,
    pub rating: u8,
    #[serde(rename = "reviewCount")]
    pub review_count: u32,
}

/// One page of products. `next_page` is present only when the page was full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedProductsResponse {
    pub products: Vec<Product>,
    #[serde(rename = "nextPage", default, skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u32>,
}

/// JSON error body exchanged between server and client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(rename = "statusCode", default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ApiErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

// Upstream occasionally sends prices as strings or nulls.
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    let parsed = match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()))
}

/// Formats a VAT-inclusive price with two decimals, e.g. `£333.60`.
pub fn format_price(price_before_vat: Option<f64>, vat: f64) -> String {
    let Some(price) = price_before_vat.filter(|p| p.is_finite()) else {
        return format!("{CURRENCY_SYMBOL}0.00");
    };
    let total = price * (1.0 + vat / 100.0);
    format!("{CURRENCY_SYMBOL}{total:.2}")
}

/// Deterministic value in `[0, 1)` derived from `seed`.
pub fn seeded_random(seed: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    x - x.floor()
}

/// Mock star rating in `2..=5`, stable per product id.
pub fn mock_rating(id: i64) -> u8 {
    (seeded_random(id as f64 + 1.0) * 4.0).floor() as u8 + 2
}

/// Mock review count in `0..200`, stable per product id.
pub fn mock_review_count(id: i64) -> u32 {
    (seeded_random(id as f64 + 2.0) * 200.0).floor() as u32
}

/// Parses RFC 3339 timestamps, falling back to naive ISO-8601 read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

pub fn is_new_at(created_at: &str, now: DateTime<Utc>) -> bool {
    match parse_timestamp(created_at) {
        Some(created) => now - created < Duration::milliseconds(NEW_PRODUCT_WINDOW_MS),
        None => false,
    }
}

/// Transforms an upstream record into the view model. `image_url` is left
/// unset; the catalog assigns it afterwards.
pub fn transform_product(raw: &RawProduct) -> Product {
    transform_product_at(raw, Utc::now())
}

pub fn transform_product_at(raw: &RawProduct, now: DateTime<Utc>) -> Product {
    Product {
        id: raw.id,
        title: format!("{} Yard Skip", raw.size),
        description: format!("{}-day hire period.", raw.hire_period_days),
        price: format_price(raw.price_before_vat, raw.vat),
        image_url: None,
        allowed_on_road: raw.allowed_on_road,
        size: raw.size,
        hire_period_days: raw.hire_period_days,
        postcode: raw.postcode.clone(),
        is_new: is_new_at(&raw.created_at, now),
        rating: mock_rating(raw.id),
        review_count: mock_review_count(raw.id),
    }
}
