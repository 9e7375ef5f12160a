//! `HttpLogApi`: a [`crate::LogApi`]/[`crate::WitnessApi`] implementation
//! over `reqwest`, speaking the ASCII wire grammar.
//!
//! Grounded on `crates/client/src/api.rs`'s `Client`: a thin struct
//! wrapping a base URL and a `reqwest::Client`, one method per endpoint,
//! `tracing::debug!` before each call, and a shared `into_result`-style
//! dispatch on the response status — adapted here to ASCII request/
//! response bodies and an explicit 200/202 [`crate::Outcome`] rather than
//! JSON content negotiation.

use reqwest::{Response, StatusCode};
use url::Url;

use async_trait::async_trait;
use sigsum_crypto::Hash;
use sigsum_merkle::{ConsistencyProof, InclusionProof};
use sigsum_proto::{leaves_from_ascii, CosignedTreeHead, Cosignature, Leaf, LeafRequest};

use crate::add_tree_head::WitnessAddTreeHead;
use crate::error::ApiError;
use crate::outcome::Outcome;
use crate::{LogApi, WitnessApi};

/// A log or witness client speaking the sigsum ASCII protocol over HTTP.
pub struct HttpLogApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpLogApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn join(&self, path: &str) -> Url {
        self.base_url.join(path).expect("path is a valid relative URL")
    }

    async fn error_for_status(response: Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::BAD_REQUEST => ApiError::BadRequest(body),
            StatusCode::FORBIDDEN => ApiError::Forbidden(body),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            StatusCode::UNPROCESSABLE_ENTITY => ApiError::UnprocessableEntity(body),
            StatusCode::CONFLICT => body
                .trim()
                .parse::<u64>()
                .map(|current_size| ApiError::Conflict { current_size })
                .unwrap_or(ApiError::Malformed),
            other => ApiError::UnexpectedStatus {
                status: other.as_u16(),
                body,
            },
        }
    }
}

#[async_trait]
impl LogApi for HttpLogApi {
    async fn get_tree_head(&self) -> Result<CosignedTreeHead, ApiError> {
        let url = self.join("get-tree-head");
        tracing::debug!("getting tree head at `{url}`");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }
        let body = response.text().await?;
        CosignedTreeHead::from_ascii(&body).map_err(|_| ApiError::Malformed)
    }

    async fn get_inclusion_proof(&self, size: u64, leaf_hash: Hash) -> Result<InclusionProof, ApiError> {
        let url = self.join(&format!("get-inclusion-proof/{size}/{}", leaf_hash.to_hex()));
        tracing::debug!("getting inclusion proof at `{url}`");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }
        let body = response.text().await?;
        sigsum_proto::inclusion_proof_from_ascii(&body).map_err(|_| ApiError::Malformed)
    }

    async fn get_consistency_proof(&self, old_size: u64, new_size: u64) -> Result<ConsistencyProof, ApiError> {
        let url = self.join(&format!("get-consistency-proof/{old_size}/{new_size}"));
        tracing::debug!("getting consistency proof at `{url}`");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }
        let body = response.text().await?;
        let path = sigsum_proto::consistency_proof_from_ascii(&body).map_err(|_| ApiError::Malformed)?;
        Ok(ConsistencyProof { path })
    }

    async fn get_leaves(&self, start: u64, end: u64) -> Result<Vec<Leaf>, ApiError> {
        let url = self.join(&format!("get-leaves/{start}/{end}"));
        tracing::debug!("getting leaves [{start}, {end}) at `{url}`");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }
        let body = response.text().await?;
        leaves_from_ascii(&body).map_err(|_| ApiError::Malformed)
    }

    async fn add_leaf(&self, request: &LeafRequest, token: Option<(&str, &str)>) -> Result<Outcome, ApiError> {
        let url = self.join("add-leaf");
        tracing::debug!("adding leaf at `{url}`");
        let mut builder = self.client.post(url).body(request.to_ascii());
        if let Some((domain, hex_token)) = token {
            builder = builder.header("Sigsum-Token", format!("{domain} {hex_token}"));
        }
        let response = builder.send().await?;
        match response.status() {
            StatusCode::OK => Ok(Outcome::Persisted),
            StatusCode::ACCEPTED => Ok(Outcome::Accepted),
            _ => Err(Self::error_for_status(response).await),
        }
    }
}

#[async_trait]
impl WitnessApi for HttpLogApi {
    async fn add_tree_head(&self, request: &WitnessAddTreeHead) -> Result<Cosignature, ApiError> {
        let url = self.join("add-tree-head");
        tracing::debug!("adding tree head at `{url}`");
        let response = self.client.post(url).body(request.to_ascii()).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }
        let body = response.text().await?;
        let line = body.strip_suffix('\n').ok_or(ApiError::Malformed)?;
        let (key, value) = line.split_once('=').ok_or(ApiError::Malformed)?;
        if key != "cosignature" {
            return Err(ApiError::Malformed);
        }
        let mut parts = value.split(' ');
        let timestamp = parts.next().ok_or(ApiError::Malformed)?.parse().map_err(|_| ApiError::Malformed)?;
        let signature = parts
            .next()
            .ok_or(ApiError::Malformed)?
            .parse()
            .map_err(|_| ApiError::Malformed)?;
        Ok(Cosignature { timestamp, signature })
    }
}
