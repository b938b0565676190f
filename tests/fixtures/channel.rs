use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use linkcart::agent::{CallChannel, CallResponse, RejectResponse};
use linkcart::network::{NetworkContext, SharedNetwork};
use linkcart_crypto::test_utils::{now_ns, CertificateBuilder};
use linkcart_crypto::{request_id, HashValue, RequestId, RootKey};
use linkcart_model::Principal;
use serde_cbor::Value;
use tokio::time::Instant;

pub const ROOT_SEED: u8 = 42;
pub const REPLY: &[u8] = b"DIDL\x00\x01\x7d\x01";

/// How the fake network answers calls to a given method.
#[derive(Clone, Debug)]
pub enum Script {
    /// Certified reply returned with the submission.
    ReplyInline,
    /// Accepted, then `n` polls see the request processing before the reply is certified.
    ReplyAfterPolls(usize),
    RejectCertified {
        code: u64,
        message: &'static str,
        error_code: Option<&'static str>,
    },
    /// Rejected synchronously, without a certificate.
    RejectTransport { code: u64, message: &'static str },
    /// A certified reply and rejection fields in the same answer.
    ReplyWithRejectFields,
    /// Certificate signed by a key the client does not trust.
    WrongKey,
    Stale,
    NeverCertified,
    SubmitFails,
    /// Accepted, then `n` polls fail on the wire before the reply is certified.
    PollFailsThenReply(usize),
    Done,
    /// Certified by a subnet whose key the root delegated for canisters `lo..=hi`.
    Delegated { lo: u8, hi: u8 },
    /// Accepted, then the first poll returns a certificate signed by an untrusted key.
    AcceptedThenWrongKey,
    /// Accepted, then the first poll returns a certified rejection.
    AcceptedThenRejected {
        code: u64,
        message: &'static str,
        error_code: Option<&'static str>,
    },
}

fn range_bound(n: u8) -> Principal {
    Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, n, 1, 1])
}

#[derive(Default)]
struct ChannelState {
    polls: HashMap<RequestId, usize>,
    methods: HashMap<RequestId, String>,
    submissions: Vec<(String, Instant)>,
    read_states: usize,
}

pub struct MockChannel {
    root: CertificateBuilder,
    scripts: HashMap<String, Script>,
    state: Mutex<ChannelState>,
}

fn content_of(envelope: &[u8]) -> BTreeMap<Value, Value> {
    let bytes = envelope.strip_prefix(&[0xd9, 0xd9, 0xf7]).unwrap_or(envelope);
    let Value::Map(mut envelope) = serde_cbor::from_slice::<Value>(bytes).unwrap() else {
        panic!("envelope is not a map");
    };
    match envelope.remove(&Value::Text("content".into())) {
        Some(Value::Map(content)) => content,
        other => panic!("unexpected content {other:?}"),
    }
}

fn hash_value(value: &Value) -> HashValue<'_> {
    match value {
        Value::Text(text) => HashValue::Text(text),
        Value::Bytes(bytes) => HashValue::Blob(bytes),
        Value::Integer(n) => HashValue::Nat(*n as u64),
        Value::Array(items) => HashValue::Array(items.iter().map(hash_value).collect()),
        other => panic!("unexpected value in content: {other:?}"),
    }
}

/// Recomputes the request id the way a replica does, from the content as it went on the wire.
pub fn request_id_of(envelope: &[u8]) -> RequestId {
    let content = content_of(envelope);
    let fields: Vec<(&str, HashValue)> = content
        .iter()
        .map(|(key, value)| match key {
            Value::Text(key) => (key.as_str(), hash_value(value)),
            other => panic!("unexpected key {other:?}"),
        })
        .collect();
    request_id(&fields)
}

fn text_field(content: &BTreeMap<Value, Value>, key: &str) -> String {
    match content.get(&Value::Text(key.into())) {
        Some(Value::Text(text)) => text.clone(),
        other => panic!("unexpected {key}: {other:?}"),
    }
}

impl MockChannel {
    pub fn new() -> Self {
        MockChannel {
            root: CertificateBuilder::new(ROOT_SEED),
            scripts: HashMap::new(),
            state: Mutex::new(ChannelState::default()),
        }
    }

    pub fn with_script(mut self, method: &str, script: Script) -> Self {
        self.scripts.insert(method.into(), script);
        self
    }

    pub fn root_key(&self) -> RootKey {
        self.root.root_key()
    }

    pub fn network(&self) -> SharedNetwork {
        Arc::new(NetworkContext::new(self.root_key(), Duration::from_secs(300)))
    }

    pub fn submitted_methods(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.submissions.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn submissions(&self) -> Vec<(String, Instant)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn read_state_count(&self) -> usize {
        self.state.lock().unwrap().read_states
    }

    fn script(&self, method: &str) -> Script {
        self.scripts.get(method).cloned().unwrap_or(Script::ReplyInline)
    }

    fn replied(&self, rid: &RequestId) -> Vec<u8> {
        self.root
            .clone()
            .with_request_status(rid, "replied", Some(REPLY))
            .build()
    }

    fn answer_call(&self, envelope: &[u8]) -> Result<CallResponse> {
        let content = content_of(envelope);
        let method = text_field(&content, "method_name");
        let rid = request_id_of(envelope);
        {
            let mut state = self.state.lock().unwrap();
            state.submissions.push((method.clone(), Instant::now()));
            state.methods.insert(rid, method.clone());
        }

        Ok(match self.script(&method) {
            Script::ReplyInline => CallResponse::certified(self.replied(&rid)),
            Script::ReplyAfterPolls(_)
            | Script::PollFailsThenReply(_)
            | Script::NeverCertified
            | Script::AcceptedThenWrongKey
            | Script::AcceptedThenRejected { .. } => CallResponse::accepted(),
            Script::RejectCertified {
                code,
                message,
                error_code,
            } => CallResponse::certified(
                self.root
                    .clone()
                    .with_rejection(&rid, code, message, error_code)
                    .build(),
            ),
            Script::RejectTransport { code, message } => CallResponse::rejected(RejectResponse {
                reject_code: code,
                reject_message: message.into(),
                error_code: None,
            }),
            Script::ReplyWithRejectFields => CallResponse {
                certificate: Some(self.replied(&rid)),
                reject: Some(RejectResponse {
                    reject_code: 5,
                    reject_message: "should be ignored".into(),
                    error_code: None,
                }),
            },
            Script::WrongKey => CallResponse::certified(
                CertificateBuilder::new(ROOT_SEED + 1)
                    .with_request_status(&rid, "replied", Some(REPLY))
                    .build(),
            ),
            Script::Stale => CallResponse::certified(
                self.root
                    .clone()
                    .with_time(now_ns() - 3_600_000_000_000)
                    .with_request_status(&rid, "replied", Some(REPLY))
                    .build(),
            ),
            Script::SubmitFails => return Err(anyhow!("connection refused")),
            Script::Done => CallResponse::certified(
                self.root
                    .clone()
                    .with_request_status(&rid, "done", None)
                    .build(),
            ),
            Script::Delegated { lo, hi } => CallResponse::certified(
                CertificateBuilder::new(ROOT_SEED + 2)
                    .with_request_status(&rid, "replied", Some(REPLY))
                    .delegated_by(&self.root, b"subnet-1", &[(range_bound(lo), range_bound(hi))])
                    .build(),
            ),
        })
    }

    fn answer_read_state(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        let content = content_of(envelope);
        let rid = match content.get(&Value::Text("paths".into())) {
            Some(Value::Array(paths)) => match paths.first() {
                Some(Value::Array(path)) => match path.get(1) {
                    Some(Value::Bytes(rid)) => RequestId(rid.as_slice().try_into().unwrap()),
                    other => panic!("unexpected path label {other:?}"),
                },
                other => panic!("unexpected path {other:?}"),
            },
            other => panic!("unexpected paths {other:?}"),
        };
        let (polls, method) = {
            let mut state = self.state.lock().unwrap();
            state.read_states += 1;
            let polls = state.polls.entry(rid).or_default();
            *polls += 1;
            let polls = *polls;
            (polls, state.methods.get(&rid).cloned().unwrap_or_default())
        };

        match self.script(&method) {
            Script::ReplyAfterPolls(n) if polls <= n => Ok(self
                .root
                .clone()
                .with_request_status(&rid, "processing", None)
                .build()),
            Script::PollFailsThenReply(n) if polls <= n => Err(anyhow!("503 service unavailable")),
            Script::NeverCertified => Ok(self.root.build()),
            Script::AcceptedThenWrongKey => Ok(CertificateBuilder::new(ROOT_SEED + 1)
                .with_request_status(&rid, "replied", Some(REPLY))
                .build()),
            Script::AcceptedThenRejected {
                code,
                message,
                error_code,
            } => Ok(self
                .root
                .clone()
                .with_rejection(&rid, code, message, error_code)
                .build()),
            _ => Ok(self.replied(&rid)),
        }
    }
}

impl CallChannel for MockChannel {
    fn submit_call(
        &self,
        _canister: Principal,
        envelope: Vec<u8>,
    ) -> BoxFuture<'_, Result<CallResponse>> {
        futures::future::ready(self.answer_call(&envelope)).boxed()
    }

    fn read_state(
        &self,
        _canister: Principal,
        envelope: Vec<u8>,
    ) -> BoxFuture<'_, Result<Vec<u8>>> {
        futures::future::ready(self.answer_read_state(&envelope)).boxed()
    }
}
