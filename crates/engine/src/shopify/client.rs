//! REST Admin API client.
//!
//! Collection walks use `GET /admin/api/{version}/{family}.json` and
//! `GET /admin/api/{version}/{family}/count.json`. Cursor pagination is
//! advertised through the `Link` response header; once a `page_info` cursor is
//! sent, the platform rejects every filter except `limit`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use secrecy::ExposeSecret;
use serde_json::Value;
use shopsync_core::SyncFamily;
use tracing::{debug, instrument};
use url::Url;

use super::{CollectionQuery, CommerceApi, PageSelector, RemotePage, RemoteRecord, ShopifyError};
use crate::config::ShopifyApiConfig;
use crate::models::{Store, StoreCount};

const MAX_ERROR_BODY: usize = 512;
const DEFAULT_RETRY_AFTER: u64 = 2;

/// Shopify REST Admin API client.
///
/// Cheap to clone; every store shares one connection pool and the access
/// token is taken from the [`Store`] on each call.
#[derive(Clone)]
pub struct ShopifyClient {
    inner: Arc<ShopifyClientInner>,
}

struct ShopifyClientInner {
    client: reqwest::Client,
    api_version: String,
}

impl ShopifyClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShopifyApiConfig) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("shopsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ShopifyClientInner {
                client,
                api_version: config.api_version.clone(),
            }),
        })
    }

    fn endpoint(&self, store: &Store, path: &str) -> Result<Url, ShopifyError> {
        Ok(Url::parse(&format!(
            "https://{}/admin/api/{}/{path}",
            store.shop_domain, self.inner.api_version
        ))?)
    }

    async fn get(&self, store: &Store, url: Url) -> Result<(HeaderMap, Value), ShopifyError> {
        let response = self
            .inner
            .client
            .get(url)
            .header("X-Shopify-Access-Token", store.access_token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<f64>().ok())
                .map_or(DEFAULT_RETRY_AFTER, seconds_ceil);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_send_error)?;
        Ok((headers, serde_json::from_slice(&body)?))
    }
}

#[async_trait]
impl CommerceApi for ShopifyClient {
    #[instrument(skip(self, store, query), fields(shop = %store.shop_domain))]
    async fn count(
        &self,
        store: &Store,
        family: SyncFamily,
        query: &CollectionQuery,
    ) -> Result<u64, ShopifyError> {
        let mut url = self.endpoint(store, &format!("{family}/count.json"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("created_at_min", &format_time(query));
            if let Some(status) = &query.status {
                pairs.append_pair("status", status);
            }
        }

        let (_, body) = self.get(store, url).await?;
        count_of(&body)
    }

    #[instrument(skip(self, store, query), fields(shop = %store.shop_domain, limit = query.limit))]
    async fn fetch_page(
        &self,
        store: &Store,
        family: SyncFamily,
        query: &CollectionQuery,
        page: &PageSelector,
    ) -> Result<RemotePage, ShopifyError> {
        let mut url = self.endpoint(store, &format!("{family}.json"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit.to_string());
            match page {
                PageSelector::Cursor(page_info) => {
                    pairs.append_pair("page_info", page_info);
                }
                PageSelector::Number(number) => {
                    pairs.append_pair("page", &number.to_string());
                    pairs.append_pair("order", &query.order);
                    pairs.append_pair("created_at_min", &format_time(query));
                    if let Some(status) = &query.status {
                        pairs.append_pair("status", status);
                    }
                }
            }
        }

        let (headers, body) = self.get(store, url).await?;
        let records: Vec<RemoteRecord> = page_records(body, family)?;

        let next_cursor = headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_info);

        debug!(records = %records.len(), has_next = next_cursor.is_some(), "Fetched page");
        Ok(RemotePage {
            records,
            next_cursor,
        })
    }

    #[instrument(skip(self, store), fields(shop = %store.shop_domain))]
    async fn shop(&self, store: &Store) -> Result<RemoteRecord, ShopifyError> {
        let url = self.endpoint(store, "shop.json")?;
        let (_, mut body) = self.get(store, url).await?;
        match body.get_mut("shop").map(Value::take) {
            Some(shop @ Value::Object(_)) => Ok(RemoteRecord::new(shop)),
            _ => Err(ShopifyError::UnexpectedPayload(
                "response has no 'shop' object".to_string(),
            )),
        }
    }

    #[instrument(skip(self, store), fields(shop = %store.shop_domain))]
    async fn resource_count(&self, store: &Store, count: StoreCount) -> Result<u64, ShopifyError> {
        let url = self.endpoint(store, &format!("{count}/count.json"))?;
        let (_, body) = self.get(store, url).await?;
        count_of(&body)
    }
}

fn count_of(body: &Value) -> Result<u64, ShopifyError> {
    body.get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| ShopifyError::UnexpectedPayload("missing count".to_string()))
}

/// Take the `{family}` array out of a collection response.
fn page_records(mut body: Value, family: SyncFamily) -> Result<Vec<RemoteRecord>, ShopifyError> {
    match body.get_mut(family.as_str()).map(Value::take) {
        Some(Value::Array(items)) => Ok(items.into_iter().map(RemoteRecord::new).collect()),
        _ => Err(ShopifyError::UnexpectedPayload(format!(
            "response has no '{family}' array"
        ))),
    }
}

/// Extract the `page_info` of the `rel="next"` entry of a `Link` header.
#[must_use]
pub fn next_page_info(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page_info")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    })
}

fn format_time(query: &CollectionQuery) -> String {
    query.created_at_min.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn map_send_error(error: reqwest::Error) -> ShopifyError {
    if error.is_timeout() {
        ShopifyError::Timeout
    } else {
        ShopifyError::Http(error)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_ceil(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.ceil() as u64
    } else {
        DEFAULT_RETRY_AFTER
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_next_page_info_with_previous_and_next() {
        let header = "<https://acme.myshopify.com/admin/api/2024-01/orders.json?limit=50&page_info=prevToken>; rel=\"previous\", \
                      <https://acme.myshopify.com/admin/api/2024-01/orders.json?limit=50&page_info=nextToken>; rel=\"next\"";
        assert_eq!(next_page_info(header).as_deref(), Some("nextToken"));
    }

    #[test]
    fn test_next_page_info_only_previous() {
        let header = "<https://acme.myshopify.com/admin/api/2024-01/orders.json?page_info=prev>; rel=\"previous\"";
        assert_eq!(next_page_info(header), None);
    }

    #[test]
    fn test_next_page_info_garbage() {
        assert_eq!(next_page_info(""), None);
        assert_eq!(next_page_info("not a link header"), None);
    }

    #[test]
    fn test_page_records() {
        let body = serde_json::json!({ "orders": [{ "id": 1 }, { "id": 2 }] });
        let records = page_records(body, SyncFamily::Orders).unwrap();
        let ids: Vec<_> = records.iter().filter_map(RemoteRecord::id).collect();
        assert_eq!(ids, vec![shopsync_core::RemoteId::new(1), shopsync_core::RemoteId::new(2)]);

        let wrong_family = serde_json::json!({ "orders": [] });
        assert!(matches!(
            page_records(wrong_family, SyncFamily::Products),
            Err(ShopifyError::UnexpectedPayload(_))
        ));
        let not_an_array = serde_json::json!({ "products": {} });
        assert!(page_records(not_an_array, SyncFamily::Products).is_err());
    }

    #[test]
    fn test_count_of() {
        assert_eq!(count_of(&serde_json::json!({"count": 42})).unwrap(), 42);
        assert!(matches!(
            count_of(&serde_json::json!({"errors": "Not Found"})),
            Err(ShopifyError::UnexpectedPayload(_))
        ));
    }

    #[test]
    fn test_seconds_ceil() {
        assert_eq!(seconds_ceil(2.0), 2);
        assert_eq!(seconds_ceil(0.4), 1);
        assert_eq!(seconds_ceil(-1.0), DEFAULT_RETRY_AFTER);
        assert_eq!(seconds_ceil(f64::NAN), DEFAULT_RETRY_AFTER);
    }
}
