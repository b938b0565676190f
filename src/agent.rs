//! Transport to the network: signed envelopes and the channel they travel on.

use anyhow::Result;
use futures::future::BoxFuture;
use linkcart_model::Principal;

pub mod envelope;
pub mod http;

pub use http::HttpAgent;

/// Synchronous rejection returned by the transport, before anything got certified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectResponse {
    pub reject_code: u64,
    pub reject_message: String,
    pub error_code: Option<String>,
}

/// Answer to a call submission. Both fields empty means the call was accepted and its status
/// has to be polled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResponse {
    /// Certificate returned inline by synchronous endpoints. Wins over `reject` when both are
    /// present.
    pub certificate: Option<Vec<u8>>,
    pub reject: Option<RejectResponse>,
}

impl CallResponse {
    pub fn accepted() -> Self {
        CallResponse::default()
    }

    pub fn certified(certificate: Vec<u8>) -> Self {
        CallResponse {
            certificate: Some(certificate),
            reject: None,
        }
    }

    pub fn rejected(reject: RejectResponse) -> Self {
        CallResponse {
            certificate: None,
            reject: Some(reject),
        }
    }
}

/// Where signed envelopes are sent. Implemented over HTTP by [`HttpAgent`], and by in-memory
/// fakes in tests.
pub trait CallChannel: Send + Sync {
    fn submit_call(&self, canister: Principal, envelope: Vec<u8>)
        -> BoxFuture<'_, Result<CallResponse>>;

    /// Returns the raw certificate answering a read_state envelope.
    fn read_state(&self, canister: Principal, envelope: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>>>;
}
