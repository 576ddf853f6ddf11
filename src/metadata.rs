//! # Instance metadata client.
//!
//! One [`MetadataClient`] is shared by every provider. It wraps a single
//! `reqwest::Client` whose timeout is the configured
//! `provider.request_timeout`, so no metadata call can outlive it.
//!
//! ## Auth dance
//! The link-local metadata services disagree on authentication:
//! - Tencent wants nothing,
//! - GCP wants a static `Metadata-Flavor: Google` header,
//! - AWS (IMDSv2), AliCloud and Huawei want a session token obtained by a
//!   PUT to a token endpoint, passed back in a provider-specific header.
//!
//! [`MetadataAuth`] captures the three shapes. Token TTL is fixed at 60
//! seconds and tokens are fetched fresh before every GET; at a polling
//! cadence of seconds the extra request is noise and the simplicity wins.
//!
//! ## Rules
//! - A status other than 200 is an error carrying the status code, so
//!   callers can tell "no notice yet" (404 on spot endpoints) apart from
//!   real failures.
//! - The client never retries; the polling loop owns that decision.

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{MetadataError, SetupError};

/// Fixed token TTL requested from token-auth metadata services.
const TOKEN_TTL_SECONDS: &str = "60";

/// Token-based auth: PUT `token_url` with `ttl_header: 60`, then send the
/// returned token back in `token_header` on the actual GET.
#[derive(Debug, Clone)]
pub struct TokenAuth {
    /// Token endpoint (PUT).
    pub token_url: String,
    /// Header naming the requested TTL on the token PUT.
    pub ttl_header: &'static str,
    /// Header carrying the token on the subsequent GET.
    pub token_header: &'static str,
}

/// How a provider's metadata service authenticates requests.
#[derive(Debug, Clone)]
pub enum MetadataAuth {
    /// No authentication (Tencent).
    None,
    /// Fixed header on every request (GCP).
    Header {
        name: &'static str,
        value: &'static str,
    },
    /// Per-request token dance (AWS IMDSv2, AliCloud, Huawei).
    Token(TokenAuth),
}

/// HTTP client for link-local metadata endpoints.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
}

impl MetadataClient {
    /// Builds the shared client with the per-request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self, SetupError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(SetupError::MetadataClient)?;
        Ok(Self { http })
    }

    /// Fetches `url` as text, applying the provider's auth scheme.
    ///
    /// 200 yields the body; anything else is [`MetadataError::Status`].
    pub async fn fetch(&self, url: &str, auth: &MetadataAuth) -> Result<String, MetadataError> {
        let mut req = self.http.get(url);
        match auth {
            MetadataAuth::None => {}
            MetadataAuth::Header { name, value } => {
                req = req.header(*name, *value);
            }
            MetadataAuth::Token(token_auth) => {
                let token = self.fetch_token(token_auth).await?;
                req = req.header(token_auth.token_header, token);
            }
        }

        let res = req.send().await?;
        let status = res.status();
        if status != StatusCode::OK {
            return Err(MetadataError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(res.text().await?)
    }

    /// Best-effort variant used when assembling the termination event:
    /// failures are logged and substituted with
    /// [`UNKNOWN_FIELD`](crate::event::UNKNOWN_FIELD).
    pub async fn fetch_or_unknown(
        &self,
        url: &str,
        auth: &MetadataAuth,
        field: &'static str,
    ) -> String {
        match self.fetch(url, auth).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(field, error = %e, "failed to fetch instance metadata");
                crate::event::UNKNOWN_FIELD.to_string()
            }
        }
    }

    async fn fetch_token(&self, auth: &TokenAuth) -> Result<String, MetadataError> {
        let res = self
            .http
            .put(&auth.token_url)
            .header(auth.ttl_header, TOKEN_TTL_SECONDS)
            .send()
            .await?;
        let status = res.status();
        if status != StatusCode::OK {
            return Err(MetadataError::Status {
                status,
                url: auth.token_url.clone(),
            });
        }
        Ok(res.text().await?)
    }
}
