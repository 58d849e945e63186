use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::FetchError;
use crate::model::{
    Category, CategoryDraft, ListQuery, Order, OrderStatus, Payout, PayoutStatus, Product,
    ProductScope, Report, ReportRequest, Resource, Tag, TagDraft,
};

pub mod model;

use model::{decode_entity, decode_list, error_message, StatusUpdate};

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: String,
    tenant: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: Url, token: String, tenant: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("storefront-admin/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token,
            tenant,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = cfg.base_url()?;
        Self::new(
            base_url,
            cfg.api.token.clone(),
            cfg.api.tenant.clone(),
            cfg.app.request_timeout(),
        )
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, FetchError> {
        self.request_to(method, self.endpoint(path)?, query, body)
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Network(format!("invalid endpoint '{}': {}", path, e)))
    }

    /// URL of a single entity: `{collection}/{id}` with an optional trailing segment.
    ///
    /// The id is pushed as one percent-encoded segment, so `/`, `?` and `#` stay inside it.
    pub fn entity_url(&self, collection: &str, id: &str, action: Option<&str>) -> Result<Url, FetchError> {
        if id.trim().is_empty() || id == "." || id == ".." {
            return Err(FetchError::InvalidId(id.to_string()));
        }
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FetchError::Network(format!("base url cannot carry a path: {}", self.base_url)))?;
            segments.pop_if_empty().push(collection).push(id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    fn request_to(
        &self,
        method: Method,
        endpoint: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, FetchError> {
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-Tenant-Id", &self.tenant)
            .header("Accept", "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Send a request and return the status and raw body of a 2xx response.
    ///
    /// With a token, the exchange races the token and yields `Cancelled` as soon as it fires.
    async fn execute(
        &self,
        request: reqwest::Request,
        cancel: Option<&CancellationToken>,
    ) -> Result<(StatusCode, String), FetchError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %url, "admin api request");

        let exchange = async {
            let res = self.http.execute(request).await?;
            let status = res.status();
            let body = res.text().await?;
            Ok::<_, FetchError>((status, body))
        };

        let (status, body) = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(%method, url = %url, "admin api request cancelled");
                    return Err(FetchError::Cancelled);
                }
                res = exchange => res?,
            },
            None => exchange.await?,
        };

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
            });
            warn!(%method, url = %url, status = status.as_u16(), %message, "admin api error");
            return Err(FetchError::Application {
                status: status.as_u16(),
                message,
            });
        }
        Ok((status, body))
    }

    #[instrument(skip_all, fields(resource = resource.path(), query = %query))]
    pub async fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, FetchError> {
        let request = self.build_request(Method::GET, resource.path(), &query.to_pairs(), None)?;
        let (status, body) = self.execute(request, Some(cancel)).await?;
        let items: Vec<T> = decode_list(resource.list_key(), status.as_u16(), &body)?;
        debug!(count = items.len(), "list loaded");
        Ok(items)
    }

    pub async fn list_orders(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Vec<Order>, FetchError> {
        self.list(Resource::Orders, query, cancel).await
    }

    pub async fn list_payouts(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Vec<Payout>, FetchError> {
        self.list(Resource::Payouts, query, cancel).await
    }

    pub async fn list_categories(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Vec<Category>, FetchError> {
        self.list(Resource::Categories, query, cancel).await
    }

    pub async fn list_tags(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Vec<Tag>, FetchError> {
        self.list(Resource::Tags, query, cancel).await
    }

    pub async fn list_reports(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Vec<Report>, FetchError> {
        self.list(Resource::Reports, query, cancel).await
    }

    pub async fn list_products(
        &self,
        scope: ProductScope,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, FetchError> {
        self.list(Resource::Products(scope), query, cancel).await
    }

    async fn send_entity<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: Url,
        key: &str,
        body: &Value,
    ) -> Result<T, FetchError> {
        let request = self.request_to(method, endpoint, &[], Some(body))?;
        let (status, text) = self.execute(request, None).await?;
        decode_entity(key, status.as_u16(), &text)
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Order, FetchError> {
        let body = serde_json::to_value(StatusUpdate { status: status.as_str() })?;
        let endpoint = self.entity_url("orders", id, Some("status"))?;
        self.send_entity(Method::PUT, endpoint, "order", &body).await
    }

    #[instrument(skip(self))]
    pub async fn update_payout_status(&self, id: &str, status: PayoutStatus) -> Result<Payout, FetchError> {
        let body = serde_json::to_value(StatusUpdate { status: status.as_str() })?;
        let endpoint = self.entity_url("payouts", id, None)?;
        self.send_entity(Method::PUT, endpoint, "payout", &body).await
    }

    #[instrument(skip_all, fields(slug = %draft.slug))]
    pub async fn create_category(&self, draft: &CategoryDraft) -> Result<Category, FetchError> {
        let body = serde_json::to_value(draft)?;
        let endpoint = self.endpoint("categories")?;
        self.send_entity(Method::POST, endpoint, "category", &body).await
    }

    #[instrument(skip(self, draft))]
    pub async fn update_category(&self, id: &str, draft: &CategoryDraft) -> Result<Category, FetchError> {
        let body = serde_json::to_value(draft)?;
        let endpoint = self.entity_url("categories", id, None)?;
        self.send_entity(Method::PUT, endpoint, "category", &body).await
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: &str) -> Result<(), FetchError> {
        let endpoint = self.entity_url("categories", id, None)?;
        let request = self.request_to(Method::DELETE, endpoint, &[], None)?;
        self.execute(request, None).await.map(|_| ())
    }

    #[instrument(skip_all, fields(slug = %draft.slug))]
    pub async fn create_tag(&self, draft: &TagDraft) -> Result<Tag, FetchError> {
        let body = serde_json::to_value(draft)?;
        let endpoint = self.endpoint("tags")?;
        self.send_entity(Method::POST, endpoint, "tag", &body).await
    }

    #[instrument(skip(self, draft))]
    pub async fn update_tag(&self, id: &str, draft: &TagDraft) -> Result<Tag, FetchError> {
        let body = serde_json::to_value(draft)?;
        let endpoint = self.entity_url("tags", id, None)?;
        self.send_entity(Method::PUT, endpoint, "tag", &body).await
    }

    #[instrument(skip(self))]
    pub async fn delete_tag(&self, id: &str) -> Result<(), FetchError> {
        let endpoint = self.entity_url("tags", id, None)?;
        let request = self.request_to(Method::DELETE, endpoint, &[], None)?;
        self.execute(request, None).await.map(|_| ())
    }

    /// Ask the server to generate a report. Each call carries a fresh idempotency key.
    #[instrument(skip_all, fields(kind = %request.kind))]
    pub async fn generate_report(&self, request: &ReportRequest) -> Result<Report, FetchError> {
        let body = serde_json::to_value(request)?;
        let mut http_request = self.build_request(Method::POST, "reports", &[], Some(&body))?;
        let key = Uuid::new_v4().to_string();
        http_request.headers_mut().insert(
            "Idempotency-Key",
            key.parse()
                .map_err(|_| FetchError::Network("invalid idempotency key".to_string()))?,
        );
        let (status, text) = self.execute(http_request, None).await?;
        decode_entity("report", status.as_u16(), &text)
    }
}
