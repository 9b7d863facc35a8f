use async_trait::async_trait;
use chrono::SecondsFormat;
use log::debug;
use reqwest::StatusCode;
use url::Url;

use crate::scraper::DelegationFeed;
use crate::tzkt::{DelegationsRequest, TzktDelegation};

/// Page size used when a request leaves `limit` at zero.
pub const DEFAULT_LIMIT: u64 = 100;

const DELEGATIONS_PATH: &str = "/v1/operations/delegations";

/// Only the fields the scraper persists, to keep payloads small
const SELECT_FIELDS: &str = "id,timestamp,amount,sender,level";

/// Classified failures of a TzKT request.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("malformed request: {0}")]
    MalformedRequest(#[from] url::ParseError),

    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("unexpected HTTP status code: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("malformed response body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

/// HTTP client for the TzKT indexer API.
///
/// Timeouts, proxies and connection pooling are whatever the injected
/// `reqwest::Client` was built with. No retries happen here.
#[derive(Clone)]
pub struct TzktClient {
    http: reqwest::Client,
    base_url: String,
}

impl TzktClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn get_delegations(
        &self,
        request: &DelegationsRequest,
    ) -> Result<Vec<TzktDelegation>, FeedError> {
        let url = self.delegations_url(request)?;
        debug!("GET {}", url);

        let response = self.http.get(url).send().await.map_err(FeedError::Http)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FeedError::UnexpectedStatus(status));
        }

        // Read the whole body before decoding so transport errors stay
        // distinguishable from JSON errors
        let body = response.bytes().await.map_err(FeedError::Http)?;

        serde_json::from_slice(&body).map_err(FeedError::MalformedBody)
    }

    /// Build the full request URL for a delegations query.
    pub fn delegations_url(&self, request: &DelegationsRequest) -> Result<Url, FeedError> {
        let mut url = Url::parse(&format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            DELEGATIONS_PATH
        ))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &effective_limit(request.limit).to_string());
            query.append_pair("select", SELECT_FIELDS);

            if let Some(id) = request.id_greater_than {
                query.append_pair("id.gt", &id.to_string());
            }
            if let Some(timestamp) = request.timestamp_ge {
                query.append_pair(
                    "timestamp.ge",
                    &timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            if request.offset > 0 {
                query.append_pair("offset", &request.offset.to_string());
            }
        }

        Ok(url)
    }
}

fn effective_limit(limit: u64) -> u64 {
    if limit == 0 {
        DEFAULT_LIMIT
    } else {
        limit
    }
}

#[async_trait]
impl DelegationFeed for TzktClient {
    async fn get_delegations(
        &self,
        request: DelegationsRequest,
    ) -> Result<Vec<TzktDelegation>, FeedError> {
        TzktClient::get_delegations(self, &request).await
    }
}
