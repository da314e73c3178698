use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::api::auth::TokenManager;
use crate::api::retry::RetryHandler;
use crate::api::types::{CatalogItem, Performance, ScanPage, SearchPage, UserMe, UserProduct};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Tag MercadoLibre puts on listings penalized for missing technical specs.
pub const PENALIZED_TAG: &str = "incomplete_technical_specs";

/// Typed MercadoLibre endpoints. Cheap to clone; clones share the rate
/// limiter and the token manager.
#[derive(Debug, Clone)]
pub struct MeliClient {
    retry: RetryHandler,
    tokens: Arc<TokenManager>,
    api_base: String,
}

impl MeliClient {
    pub fn new(retry: RetryHandler, tokens: Arc<TokenManager>, api: &ApiConfig) -> Self {
        Self {
            retry,
            tokens,
            api_base: api.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Token that interrupts this client's retry backoffs.
    pub fn cancellation(&self) -> &CancellationToken {
        self.retry.cancellation()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .retry
            .send_authorized(&self.tokens, |http, token| {
                http.get(&url).query(query).bearer_auth(token)
            })
            .await?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            log::debug!("GET {path} failed: {err}");
            return Err(err);
        }
        Ok(response.json().await?)
    }

    /// Numeric id of the authenticated seller.
    pub async fn user_id(&self) -> Result<String> {
        let me: UserMe = self.get_json("/users/me", &[]).await?;
        me.id_string()
            .ok_or_else(|| Error::Other("/users/me returned no id".into()))
    }

    /// One scan page of the seller's item ids; pass the previous page's
    /// `scroll_id` to continue.
    pub async fn scan_page(&self, user_id: &str, scroll_id: Option<&str>) -> Result<ScanPage> {
        let mut query = vec![("search_type", "scan".to_string())];
        if let Some(scroll) = scroll_id {
            query.push(("scroll_id", scroll.to_string()));
        }
        self.get_json(&format!("/users/{user_id}/items/search"), &query)
            .await
    }

    pub async fn item(&self, item_id: &str) -> Result<CatalogItem> {
        self.get_json(&format!("/items/{item_id}"), &[]).await
    }

    pub async fn user_product(&self, user_product_id: &str) -> Result<UserProduct> {
        self.get_json(&format!("/user-products/{user_product_id}"), &[])
            .await
    }

    pub async fn performance(&self, item_id: &str) -> Result<Performance> {
        self.get_json(&format!("/item/{item_id}/performance"), &[])
            .await
    }

    /// One page of items carrying `tag`.
    pub async fn tagged_page(
        &self,
        user_id: &str,
        tag: &str,
        offset: u64,
        limit: u64,
    ) -> Result<SearchPage> {
        let query = [
            ("tags", tag.to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        self.get_json(&format!("/users/{user_id}/items/search"), &query)
            .await
    }

    /// Every item id flagged with missing technical specs.
    pub async fn penalized_item_ids(&self, user_id: &str) -> Result<Vec<String>> {
        const PAGE: u64 = 50;
        let mut ids = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.tagged_page(user_id, PENALIZED_TAG, offset, PAGE).await?;
            if page.results.is_empty() {
                break;
            }
            offset += page.results.len() as u64;
            ids.extend(page.results);
            if offset >= page.paging.total {
                break;
            }
        }
        log::info!("{} penalized items", ids.len());
        Ok(ids)
    }
}
