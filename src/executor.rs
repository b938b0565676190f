//! Executes one remote call and proves it ran.
//!
//! A call is only successful once a certificate signed by the network (directly, or through a
//! subnet delegation) says its request id was `replied`. Acceptance by a node proves nothing.
//! Every outcome is returned as a value: transport failures, rejections, timeouts and
//! certificates that do not verify all end up in a [`CallError`].

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use futures::FutureExt;
use linkcart_crypto::{
    lookup_request_status, Certificate, CertificateError, Identity, RequestId, RequestStatus,
};
use linkcart_model::{
    AttestedCallResult, CallError, CallOutcome, Principal, RejectCode, RemoteCallRequest,
};
use tracing::{debug, info, warn};

use crate::agent::envelope::{ingress_expiry_ns, sign_envelope, CallContent, ReadStateContent};
use crate::agent::{CallChannel, CallResponse};
use crate::network::SharedNetwork;

pub mod polling;

pub use polling::{ExponentialBackoff, PollSession, PollingStrategy};

/// Runs a single call to completion.
pub trait CallExecutor: Send + Sync {
    fn execute(&self, request: RemoteCallRequest) -> BoxFuture<'_, CallOutcome>;
}

pub struct CertifiedCallExecutor {
    identity: Arc<dyn Identity>,
    channel: Arc<dyn CallChannel>,
    network: SharedNetwork,
    polling: Arc<dyn PollingStrategy>,
    ingress_expiry: Duration,
}

/// Where a certificate leaves a call.
enum Verdict {
    Final(CallOutcome),
    Pending,
}

fn now_ns() -> u64 {
    ingress_expiry_ns(Duration::ZERO)
}

impl CertifiedCallExecutor {
    pub fn new(
        identity: Arc<dyn Identity>,
        channel: Arc<dyn CallChannel>,
        network: SharedNetwork,
        polling: Arc<dyn PollingStrategy>,
        ingress_expiry: Duration,
    ) -> Self {
        CertifiedCallExecutor {
            identity,
            channel,
            network,
            polling,
            ingress_expiry,
        }
    }

    async fn run(&self, request: RemoteCallRequest) -> CallOutcome {
        let sender = self.identity.sender();
        let content = CallContent::new(&request, &sender, ingress_expiry_ns(self.ingress_expiry));
        let rid = content.request_id();
        let envelope = sign_envelope(&content, &rid, self.identity.as_ref())
            .map_err(|e| CallError::transport(format!("{:#}", e)))?;

        info!(
            "📤 Submitting call {} ({}::{}) as request {}",
            request.id, request.module_id, request.method, rid
        );
        let response = self
            .channel
            .submit_call(request.module_id, envelope.clone())
            .await
            .map_err(|e| {
                warn!("Call {} could not be submitted: {:#}", request.id, e);
                CallError::transport(format!("{:#}", e))
            })?;

        match response {
            CallResponse {
                certificate: Some(certificate),
                reject,
            } => {
                if reject.is_some() {
                    debug!(
                        "Call {} answered with both a certificate and a rejection, keeping the certificate",
                        request.id
                    );
                }
                match self.judge(&request.module_id, &rid, certificate, &envelope) {
                    Verdict::Final(outcome) => return outcome,
                    Verdict::Pending => {}
                }
            }
            CallResponse {
                certificate: None,
                reject: Some(reject),
            } => {
                info!(
                    "Call {} rejected by the transport: {}",
                    request.id, reject.reject_message
                );
                return Err(CallError::rejected(
                    u32::try_from(reject.reject_code).unwrap_or(u32::MAX),
                    reject.reject_message,
                    reject.error_code,
                ));
            }
            CallResponse {
                certificate: None,
                reject: None,
            } => debug!("Call {} accepted, polling its status", request.id),
        }

        self.poll(&request, &rid, &envelope).await
    }

    async fn poll(
        &self,
        request: &RemoteCallRequest,
        rid: &RequestId,
        envelope: &[u8],
    ) -> CallOutcome {
        let mut session = self.polling.start();
        let mut attempts = 0u32;
        loop {
            let Some(delay) = session.next_delay() else {
                warn!(
                    "Call {} has no certified status after {} polls",
                    request.id, attempts
                );
                return Err(CallError::timeout(format!(
                    "request {rid} has no certified status after {attempts} polls"
                )));
            };
            tokio::time::sleep(delay).await;
            attempts += 1;

            let read = self
                .read_state_envelope(rid)
                .map_err(|e| CallError::transport(format!("{:#}", e)))?;
            let certificate = match self
                .channel
                .read_state(request.module_id, read)
                .await
            {
                Ok(certificate) => certificate,
                Err(e) => {
                    warn!("Polling call {} failed, will retry: {:#}", request.id, e);
                    continue;
                }
            };
            match self.judge(&request.module_id, rid, certificate, envelope) {
                Verdict::Final(outcome) => return outcome,
                Verdict::Pending => {
                    debug!("Call {} still pending after {} polls", request.id, attempts)
                }
            }
        }
    }

    fn read_state_envelope(&self, rid: &RequestId) -> anyhow::Result<Vec<u8>> {
        let content = ReadStateContent::request_status(
            rid,
            &self.identity.sender(),
            ingress_expiry_ns(self.ingress_expiry),
        );
        sign_envelope(&content, &content.request_id(), self.identity.as_ref())
    }

    fn judge(
        &self,
        canister: &Principal,
        rid: &RequestId,
        certificate: Vec<u8>,
        envelope: &[u8],
    ) -> Verdict {
        match self.check(canister, rid, &certificate) {
            Ok(RequestStatus::Pending) => Verdict::Pending,
            Ok(RequestStatus::Replied(_)) => {
                info!("✅ Request {} replied", rid);
                Verdict::Final(Ok(AttestedCallResult {
                    certificate,
                    request_envelope: envelope.to_vec(),
                }))
            }
            Ok(RequestStatus::Rejected {
                reject_code,
                reject_message,
                error_code,
            }) => {
                info!(
                    "Request {} rejected with code {}: {}",
                    rid, reject_code, reject_message
                );
                Verdict::Final(Err(CallError::rejected(
                    reject_code.into(),
                    reject_message,
                    error_code,
                )))
            }
            Ok(RequestStatus::Done) => Verdict::Final(Err(CallError::rejected(
                RejectCode::SysUnknown as u32,
                format!("request {rid} is done and its reply was pruned"),
                None,
            ))),
            Err(e) => {
                warn!("Certificate for request {} rejected: {}", rid, e);
                Verdict::Final(Err(CallError::verification_failed(e)))
            }
        }
    }

    fn check(
        &self,
        canister: &Principal,
        rid: &RequestId,
        certificate: &[u8],
    ) -> Result<RequestStatus, CertificateError> {
        let cert = Certificate::from_cbor(certificate)?;
        cert.verify(canister, &self.network.root_key)?;
        cert.check_freshness(now_ns(), self.network.max_certificate_age)?;
        lookup_request_status(&cert, rid)
    }
}

impl CallExecutor for CertifiedCallExecutor {
    fn execute(&self, request: RemoteCallRequest) -> BoxFuture<'_, CallOutcome> {
        self.run(request).boxed()
    }
}
