use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use linkcart_crypto::RootKey;
use linkcart_model::Principal;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use super::{CallChannel, CallResponse, RejectResponse};

const CBOR: &str = "application/cbor";

/// Body of a synchronous call answer, and of a v2 rejection.
#[derive(Deserialize, Debug)]
struct SyncCallBody {
    status: Option<String>,
    #[serde(default, with = "serde_bytes")]
    certificate: Option<Vec<u8>>,
    reject_code: Option<u64>,
    reject_message: Option<String>,
    error_code: Option<String>,
}

impl From<SyncCallBody> for CallResponse {
    fn from(body: SyncCallBody) -> Self {
        let reject = body.reject_code.map(|reject_code| RejectResponse {
            reject_code,
            reject_message: body.reject_message.unwrap_or_default(),
            error_code: body.error_code,
        });
        CallResponse {
            certificate: body.certificate,
            reject,
        }
    }
}

#[derive(Deserialize)]
struct ReadStateBody {
    #[serde(with = "serde_bytes")]
    certificate: Vec<u8>,
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(default, with = "serde_bytes")]
    root_key: Option<Vec<u8>>,
}

/// [`CallChannel`] over the HTTP API of a boundary node or replica.
#[derive(Clone)]
pub struct HttpAgent {
    pub url: Url,
    pub reqwest_client: reqwest::Client,
}

impl HttpAgent {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url).context(format!("parsing network url {url}"))?,
            reqwest_client: reqwest::Client::new(),
        })
    }

    async fn post_cbor(&self, endpoint: &str, envelope: Vec<u8>) -> Result<(StatusCode, Vec<u8>)> {
        let response = self
            .reqwest_client
            .post(format!("{}{}", self.url, endpoint))
            .header("Content-Type", CBOR)
            .body(envelope)
            .send()
            .await
            .context(format!("posting to {endpoint}"))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .context(format!("reading response of {endpoint}"))?;
        Ok((status, body.to_vec()))
    }

    pub async fn call(&self, canister: &Principal, envelope: Vec<u8>) -> Result<CallResponse> {
        let endpoint = format!("api/v3/canister/{canister}/call");
        let (status, body) = self.post_cbor(&endpoint, envelope.clone()).await?;
        match status {
            StatusCode::ACCEPTED => Ok(CallResponse::accepted()),
            StatusCode::OK => parse_sync_body(&body),
            StatusCode::NOT_FOUND => {
                debug!("Synchronous call endpoint not available, falling back to v2");
                self.call_v2(canister, envelope).await
            }
            other => bail!(
                "Call to {canister} failed with status {other}: {}",
                String::from_utf8_lossy(&body)
            ),
        }
    }

    async fn call_v2(&self, canister: &Principal, envelope: Vec<u8>) -> Result<CallResponse> {
        let endpoint = format!("api/v2/canister/{canister}/call");
        let (status, body) = self.post_cbor(&endpoint, envelope).await?;
        match status {
            StatusCode::ACCEPTED => Ok(CallResponse::accepted()),
            StatusCode::OK => parse_sync_body(&body),
            other => bail!(
                "Call to {canister} failed with status {other}: {}",
                String::from_utf8_lossy(&body)
            ),
        }
    }

    pub async fn read_state_raw(&self, canister: &Principal, envelope: Vec<u8>) -> Result<Vec<u8>> {
        let endpoint = format!("api/v2/canister/{canister}/read_state");
        let (status, body) = self.post_cbor(&endpoint, envelope).await?;
        if !status.is_success() {
            bail!(
                "read_state on {canister} failed with status {status}: {}",
                String::from_utf8_lossy(&body)
            );
        }
        let body: ReadStateBody =
            serde_cbor::from_slice(&body).context("decoding read_state response")?;
        Ok(body.certificate)
    }

    /// Only for local replicas: a root key fetched over the wire is as trustworthy as the
    /// connection it came from.
    pub async fn fetch_root_key(&self) -> Result<RootKey> {
        info!("Fetching root key from {}", self.url);
        let body = self
            .reqwest_client
            .get(format!("{}api/v2/status", self.url))
            .send()
            .await
            .context("getting replica status")?
            .error_for_status()
            .context("getting replica status")?
            .bytes()
            .await
            .context("reading replica status")?;
        let status: StatusBody =
            serde_cbor::from_slice(&body).context("decoding replica status")?;
        let Some(der) = status.root_key else {
            bail!("Replica status carries no root key");
        };
        RootKey::from_der(&der)
    }
}

fn parse_sync_body(body: &[u8]) -> Result<CallResponse> {
    let body: SyncCallBody = serde_cbor::from_slice(body).context("decoding call response")?;
    debug!("Synchronous call answered with status {:?}", body.status);
    Ok(body.into())
}

impl CallChannel for HttpAgent {
    fn submit_call(
        &self,
        canister: Principal,
        envelope: Vec<u8>,
    ) -> BoxFuture<'_, Result<CallResponse>> {
        async move { self.call(&canister, envelope).await }.boxed()
    }

    fn read_state(&self, canister: Principal, envelope: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>>> {
        async move { self.read_state_raw(&canister, envelope).await }.boxed()
    }
}
