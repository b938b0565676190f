use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use linkcart::executor::CallExecutor;
use linkcart_model::{AttestedCallResult, CallError, CallId, CallOutcome, RemoteCallRequest};
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed { after: Duration },
    Fail { after: Duration, code: u32 },
    /// Panics while the future is being built.
    PanicEagerly,
    /// Panics the first time the future is polled.
    PanicWhenPolled,
}

#[derive(Clone, Debug)]
pub struct Span {
    pub call: CallId,
    pub started: Instant,
    pub finished: Instant,
}

/// Executor that plays a scripted behavior per call id and records when each call ran.
#[derive(Default)]
pub struct MockExecutor {
    behaviors: HashMap<CallId, Behavior>,
    spans: Mutex<Vec<Span>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(id.into(), behavior);
        self
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }

    pub fn span(&self, id: &str) -> Span {
        self.spans()
            .into_iter()
            .find(|s| s.call == CallId::from(id))
            .unwrap_or_else(|| panic!("call {id} never finished"))
    }

    pub fn executed(&self) -> usize {
        self.spans.lock().unwrap().len()
    }
}

pub fn attested(id: &CallId) -> AttestedCallResult {
    AttestedCallResult {
        certificate: format!("certificate of {id}").into_bytes(),
        request_envelope: format!("envelope of {id}").into_bytes(),
    }
}

impl CallExecutor for MockExecutor {
    fn execute(&self, request: RemoteCallRequest) -> BoxFuture<'_, CallOutcome> {
        let behavior = self
            .behaviors
            .get(&request.id)
            .cloned()
            .unwrap_or(Behavior::Succeed {
                after: Duration::from_millis(10),
            });
        if let Behavior::PanicEagerly = behavior {
            panic!("executor exploded on {}", request.id);
        }
        async move {
            let started = Instant::now();
            let outcome = match behavior {
                Behavior::Succeed { after } => {
                    tokio::time::sleep(after).await;
                    Ok(attested(&request.id))
                }
                Behavior::Fail { after, code } => {
                    tokio::time::sleep(after).await;
                    Err(CallError::rejected(code, format!("{} failed", request.id), None))
                }
                Behavior::PanicWhenPolled => panic!("call {} exploded", request.id),
                Behavior::PanicEagerly => unreachable!(),
            };
            self.spans.lock().unwrap().push(Span {
                call: request.id.clone(),
                started,
                finished: Instant::now(),
            });
            outcome
        }
        .boxed()
    }
}
