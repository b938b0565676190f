use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use linkcart_crypto::{request_id, HashValue, Identity, RequestId};
use linkcart_model::{Principal, RemoteCallRequest};
use rand::RngCore;
use serde::Serialize;
use serde_bytes::ByteBuf;
use serde_cbor::ser::IoWrite;

/// Expiry for a request sent now, in nanoseconds since the epoch.
pub fn ingress_expiry_ns(validity: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + validity).as_nanos() as u64
}

#[derive(Serialize, Debug, Clone)]
pub struct CallContent {
    request_type: &'static str,
    #[serde(with = "serde_bytes")]
    pub canister_id: Vec<u8>,
    pub method_name: String,
    #[serde(with = "serde_bytes")]
    pub arg: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub sender: Vec<u8>,
    pub ingress_expiry: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<ByteBuf>,
}

impl CallContent {
    pub fn new(request: &RemoteCallRequest, sender: &Principal, ingress_expiry: u64) -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        CallContent {
            request_type: "call",
            canister_id: request.module_id.as_slice().to_vec(),
            method_name: request.method.clone(),
            arg: request.arg.clone(),
            sender: sender.as_slice().to_vec(),
            ingress_expiry,
            nonce: Some(ByteBuf::from(nonce.to_vec())),
        }
    }

    pub fn without_nonce(mut self) -> Self {
        self.nonce = None;
        self
    }

    pub fn request_id(&self) -> RequestId {
        let mut fields = vec![
            ("request_type", HashValue::Text(self.request_type)),
            ("canister_id", HashValue::Blob(&self.canister_id)),
            ("method_name", HashValue::Text(&self.method_name)),
            ("arg", HashValue::Blob(&self.arg)),
            ("sender", HashValue::Blob(&self.sender)),
            ("ingress_expiry", HashValue::Nat(self.ingress_expiry)),
        ];
        if let Some(nonce) = &self.nonce {
            fields.push(("nonce", HashValue::Blob(nonce)));
        }
        request_id(&fields)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ReadStateContent {
    request_type: &'static str,
    pub paths: Vec<Vec<ByteBuf>>,
    #[serde(with = "serde_bytes")]
    pub sender: Vec<u8>,
    pub ingress_expiry: u64,
}

impl ReadStateContent {
    /// Asks for everything certified under `request_status/<request_id>`.
    pub fn request_status(request_id: &RequestId, sender: &Principal, ingress_expiry: u64) -> Self {
        ReadStateContent {
            request_type: "read_state",
            paths: vec![vec![
                ByteBuf::from(b"request_status".to_vec()),
                ByteBuf::from(request_id.as_bytes().to_vec()),
            ]],
            sender: sender.as_slice().to_vec(),
            ingress_expiry,
        }
    }

    pub fn request_id(&self) -> RequestId {
        let paths = self
            .paths
            .iter()
            .map(|path| {
                HashValue::Array(path.iter().map(|label| HashValue::Blob(label)).collect())
            })
            .collect();
        request_id(&[
            ("request_type", HashValue::Text(self.request_type)),
            ("paths", HashValue::Array(paths)),
            ("sender", HashValue::Blob(&self.sender)),
            ("ingress_expiry", HashValue::Nat(self.ingress_expiry)),
        ])
    }
}

#[derive(Serialize)]
struct Envelope<'a, C> {
    content: &'a C,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_pubkey: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_sig: Option<ByteBuf>,
}

/// Signs `content` and encodes the whole envelope as self-described CBOR.
pub fn sign_envelope<C: Serialize>(
    content: &C,
    request_id: &RequestId,
    identity: &dyn Identity,
) -> Result<Vec<u8>> {
    let signature = identity
        .sign(request_id)
        .context(format!("signing request {request_id}"))?;
    let envelope = Envelope {
        content,
        sender_pubkey: signature.public_key.map(ByteBuf::from),
        sender_sig: signature.signature.map(ByteBuf::from),
    };

    let mut out = Vec::new();
    let mut serializer = serde_cbor::Serializer::new(IoWrite::new(&mut out));
    serializer.self_describe()?;
    envelope
        .serialize(&mut serializer)
        .context(format!("encoding envelope of request {request_id}"))?;
    Ok(out)
}
