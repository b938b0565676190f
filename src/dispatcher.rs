use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use linkcart_model::{BatchResult, CallError, CallId, CallOutcome, RemoteCallRequest};
use tracing::{error, info, warn};

use crate::executor::CallExecutor;

/// Runs batches of calls: strictly one batch after the other, the calls of a batch
/// concurrently on the current task.
#[derive(Clone)]
pub struct BatchDispatcher {
    executor: Arc<dyn CallExecutor>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl BatchDispatcher {
    pub fn new(executor: Arc<dyn CallExecutor>) -> Self {
        BatchDispatcher { executor }
    }

    /// Never fails: one result per batch, one outcome per distinct call id.
    pub async fn run(&self, batches: &[Vec<RemoteCallRequest>]) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(batches.len());
        for (index, batch) in batches.iter().enumerate() {
            info!("Running batch {}/{} ({} calls)", index + 1, batches.len(), batch.len());
            let result = self.run_batch(index, batch).await;
            let failed = result.values().filter(|outcome| outcome.is_err()).count();
            info!(
                "Batch {}/{} done: {} succeeded, {} failed",
                index + 1,
                batches.len(),
                result.len() - failed,
                failed
            );
            results.push(result);
        }
        results
    }

    async fn run_batch(&self, index: usize, batch: &[RemoteCallRequest]) -> BatchResult {
        let mut seen = BTreeSet::new();
        let mut calls = Vec::with_capacity(batch.len());
        for request in batch {
            if !seen.insert(request.id.clone()) {
                warn!(
                    "Skipping call {} in batch {}: its id was already used in this batch",
                    request.id, index
                );
                continue;
            }
            calls.push(self.run_call(request.clone()));
        }
        join_all(calls).await.into_iter().collect()
    }

    async fn run_call(&self, request: RemoteCallRequest) -> (CallId, CallOutcome) {
        let id = request.id.clone();
        let future =
            match std::panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(request))) {
                Ok(future) => future,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Call {} panicked before starting: {}", id, message);
                    return (id, Err(CallError::captured(message)));
                }
            };
        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Call {} panicked: {}", id, message);
                Err(CallError::captured(message))
            }
        };
        if let Err(e) = &outcome {
            warn!("Call {} failed: {}", id, e);
        }
        (id, outcome)
    }
}
