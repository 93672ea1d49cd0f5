//! REST implementation of the cart gateway.
//!
//! Uses `reqwest` with a fixed client-side deadline and no retries.

use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::{CartSnapshot, LineId, SubjectId};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, instrument};
use url::{Position, Url};

use super::wire::{self, CartLineRecord};
use super::{AddLine, CartGateway, CheckoutReceipt};
use crate::config::GatewayConfig;
use crate::error::{CartError, ResponseBody, truncate_for_log};

// =============================================================================
// HttpCartGateway
// =============================================================================

/// Cart gateway backed by the REST API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpCartGateway {
    inner: Arc<HttpCartGatewayInner>,
}

struct HttpCartGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

impl std::fmt::Debug for HttpCartGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartGateway")
            .field("base_url", &self.inner.base_url.as_str())
            .field("api_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SubjectBody {
    subject: SubjectId,
}

impl HttpCartGateway {
    /// Create a gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the base URL
    /// cannot carry path segments.
    pub fn new(config: &GatewayConfig) -> Result<Self, CartError> {
        if config.base_url.cannot_be_a_base() {
            return Err(CartError::InvalidUrl(config.base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCartGatewayInner {
                client,
                base_url: config.base_url.clone(),
                api_token: config.api_token.clone(),
            }),
        })
    }

    /// API root requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build an endpoint URL. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CartError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CartError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a request with the shared headers.
    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .inner
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");

        match &self.inner.api_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and return the body of a 2xx response.
    ///
    /// `prepare` attaches the request body, if any.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        prepare: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send,
    ) -> Result<String, CartError> {
        let path = url[Position::BeforePath..].to_string();
        let response = prepare(self.request(method.clone(), url)).send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let text = response.text().await?;

        if !status.is_success() {
            let body = ResponseBody::parse(&text);
            let message = body.message().map(String::from);
            error!(
                status = %status,
                method = %method,
                path = %path,
                body = %truncate_for_log(&text),
                "Cart API returned non-success status"
            );
            return Err(CartError::Rejected {
                status: status.as_u16(),
                method: method.to_string(),
                path,
                message,
                body,
            });
        }

        debug!(status = %status, method = %method, path = %path, "Cart API call succeeded");
        Ok(text)
    }
}

// =============================================================================
// CartGateway
// =============================================================================

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[instrument(skip(self), fields(subject = %subject))]
    async fn fetch(&self, subject: SubjectId) -> Result<CartSnapshot, CartError> {
        let mut url = self.endpoint(&["cart"])?;
        url.query_pairs_mut()
            .append_pair("subject", &subject.to_string());
        let path = url[Position::BeforePath..].to_string();

        let text = self.execute(Method::GET, url, |req| req).await?;

        let records: Vec<CartLineRecord> = serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                body = %truncate_for_log(&text),
                "Failed to parse cart response"
            );
            CartError::InvalidPayload {
                path: path.clone(),
                source: e,
            }
        })?;

        wire::into_snapshot(records).map_err(|e| CartError::InvalidRecord {
            path,
            reason: e.to_string(),
        })
    }

    #[instrument(skip(self, request), fields(subject = %request.subject, target = %request.target_id, source = %request.source_kind))]
    async fn add(&self, request: &AddLine) -> Result<(), CartError> {
        let url = self.endpoint(&["cart", "add"])?;
        self.execute(Method::POST, url, |req| req.json(request)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(line = %line_id))]
    async fn change_quantity(&self, line_id: &LineId, delta: i32) -> Result<(), CartError> {
        let mut url = self.endpoint(&["cart", line_id.as_str(), "quantity"])?;
        url.query_pairs_mut()
            .append_pair("delta", &delta.to_string());
        self.execute(Method::PATCH, url, |req| req).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(line = %line_id))]
    async fn remove(&self, line_id: &LineId) -> Result<(), CartError> {
        let url = self.endpoint(&["cart", line_id.as_str()])?;
        self.execute(Method::DELETE, url, |req| req).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(subject = %subject))]
    async fn clear(&self, subject: SubjectId) -> Result<(), CartError> {
        let mut url = self.endpoint(&["cart", "clear"])?;
        url.query_pairs_mut()
            .append_pair("subject", &subject.to_string());
        self.execute(Method::DELETE, url, |req| req).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(subject = %subject))]
    async fn checkout(&self, subject: SubjectId) -> Result<CheckoutReceipt, CartError> {
        let url = self.endpoint(&["checkout"])?;
        let path = url[Position::BeforePath..].to_string();
        let text = self
            .execute(Method::POST, url, |req| req.json(&SubjectBody { subject }))
            .await?;

        serde_json::from_str(&text).map_err(|e| CartError::InvalidPayload { path, source: e })
    }
}
