//! Top-level facade: runs the calls of an action, lets the backend process it, and brings the
//! local intents in line with what the backend recorded.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use linkcart_crypto::Identity;
use linkcart_model::{
    compute_amount_and_fee, Action, ActionState, ActionValidationError, AmountAndFee, BatchResult,
    CallError, CallId, FeeError, IntentId, IntentTask, Principal, TransitionError,
};
use strum_macros::Display;
use thiserror::Error;
use tracing::{info, warn};

use crate::agent::HttpAgent;
use crate::backend::{ActionApiHttpClient, ActionService, BackendError};
use crate::dispatcher::BatchDispatcher;
use crate::executor::{CertifiedCallExecutor, ExponentialBackoff};
use crate::network::NetworkContext;
use crate::utils::conf::Conf;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("an anonymous identity cannot execute actions")]
    Unauthenticated,
    #[error("invalid action: {0}")]
    InvalidAction(#[from] ActionValidationError),
    #[error("call {call_id} of batch {batch} failed: {error}")]
    Call {
        batch: usize,
        call_id: CallId,
        error: CallError,
    },
    #[error("backend could not process the action: {0}")]
    Backend(#[source] BackendError),
    #[error("intent {intent} could not follow the backend state")]
    StateSync {
        intent: IntentId,
        #[source]
        source: TransitionError,
    },
    #[error("no ledger fee known for asset {0}")]
    MissingLedgerFee(Principal),
    #[error(transparent)]
    Fee(#[from] FeeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CartStage {
    NotStarted,
    BatchesRunning,
    Processing,
    Done,
}

#[derive(Debug)]
pub struct ProcessActionResult {
    /// Snapshot after syncing with the backend, or the submitted action if that failed.
    pub action: Action,
    pub is_success: bool,
    pub errors: Vec<CartError>,
    pub batch_results: Vec<BatchResult>,
    pub stages: Vec<CartStage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentQuote {
    pub intent: IntentId,
    pub task: IntentTask,
    pub asset: Principal,
    pub amount_and_fee: AmountAndFee,
    pub fee_label: Option<&'static str>,
}

pub struct TransactionCart {
    identity: Arc<dyn Identity>,
    dispatcher: BatchDispatcher,
    backend: Arc<dyn ActionService>,
}

struct StageTracker<'a> {
    action: &'a Action,
    stages: Vec<CartStage>,
}

impl<'a> StageTracker<'a> {
    fn new(action: &'a Action) -> Self {
        StageTracker {
            action,
            stages: vec![CartStage::NotStarted],
        }
    }

    fn advance(&mut self, next: CartStage) {
        let previous = self.stages.last().copied().unwrap_or(CartStage::NotStarted);
        info!("🛒 Action {}: {} -> {}", self.action.id, previous, next);
        self.stages.push(next);
    }
}

impl TransactionCart {
    pub fn new(
        identity: Arc<dyn Identity>,
        dispatcher: BatchDispatcher,
        backend: Arc<dyn ActionService>,
    ) -> Self {
        TransactionCart {
            identity,
            dispatcher,
            backend,
        }
    }

    /// Wires the HTTP agent, certified executor and backend client described by `conf`.
    pub async fn connect(conf: &Conf, identity: Arc<dyn Identity>) -> Result<Self> {
        let agent = HttpAgent::new(&conf.network.url)?;
        let network = NetworkContext::from_conf(&conf.network, &agent).await?;
        let executor = CertifiedCallExecutor::new(
            identity.clone(),
            Arc::new(agent),
            network,
            Arc::new(ExponentialBackoff::from(&conf.polling)),
            conf.network.ingress_expiry(),
        );
        let backend = ActionApiHttpClient::new(&conf.backend.url)?;
        Ok(TransactionCart::new(
            identity,
            BatchDispatcher::new(Arc::new(executor)),
            Arc::new(backend),
        ))
    }

    /// Only preconditions are returned as `Err`. Everything that goes wrong once the action is
    /// under way is collected in [`ProcessActionResult::errors`].
    pub async fn execute(&self, action: Action) -> Result<ProcessActionResult, CartError> {
        if !self.identity.is_authenticated() {
            return Err(CartError::Unauthenticated);
        }
        action.validate()?;

        let mut tracker = StageTracker::new(&action);
        let mut errors = vec![];

        tracker.advance(CartStage::BatchesRunning);
        let batches = action.call_batches.clone().unwrap_or_default();
        let batch_results = self.dispatcher.run(&batches).await;
        for (batch, result) in batch_results.iter().enumerate() {
            for (call_id, outcome) in result {
                if let Err(error) = outcome {
                    errors.push(CartError::Call {
                        batch,
                        call_id: call_id.clone(),
                        error: error.clone(),
                    });
                }
            }
        }

        tracker.advance(CartStage::Processing);
        let processed = self.backend.process_action(&action.id).await;

        tracker.advance(CartStage::Done);
        let stages = tracker.stages;

        let (action, is_success) = match processed {
            Ok(remote) => {
                let mut local = action;
                sync_with_backend(&mut local, &remote, &mut errors);
                let is_success = local.state == ActionState::Success;
                (local, is_success)
            }
            Err(e) => {
                warn!("Backend could not process action {}: {}", action.id, e);
                errors.push(CartError::Backend(e));
                (action, false)
            }
        };

        info!(
            "Action {} finished in state {} with {} errors",
            action.id,
            action.state,
            errors.len()
        );
        Ok(ProcessActionResult {
            action,
            is_success,
            errors,
            batch_results,
            stages,
        })
    }

    /// Amount and fee of every intent, using the ledger fee of its asset.
    pub fn quote(
        action: &Action,
        ledger_fees: &BTreeMap<Principal, u128>,
    ) -> Result<Vec<IntentQuote>, CartError> {
        action
            .intents
            .iter()
            .map(|intent| {
                let asset = intent.payload.asset().module_id;
                let ledger_fee = *ledger_fees
                    .get(&asset)
                    .ok_or_else(|| CartError::MissingLedgerFee(asset))?;
                Ok(IntentQuote {
                    intent: intent.id.clone(),
                    task: intent.task,
                    asset,
                    amount_and_fee: compute_amount_and_fee(intent, ledger_fee, action.action_type)?,
                    fee_label: intent.task.fee_label(),
                })
            })
            .collect()
    }
}

fn sync_with_backend(local: &mut Action, remote: &Action, errors: &mut Vec<CartError>) {
    for intent in local.intents.iter_mut() {
        let Some(remote_intent) = remote.intent(&intent.id) else {
            warn!(
                "Intent {} of action {} is unknown to the backend, keeping its local state",
                intent.id, local.id
            );
            continue;
        };
        if let Err(source) = intent.transition(remote_intent.state) {
            warn!("Could not sync intent {}: {}", intent.id, source);
            errors.push(CartError::StateSync {
                intent: intent.id.clone(),
                source,
            });
        }
    }
    local.state = remote.state;
    let derived = local.derived_state();
    if derived != local.state {
        warn!(
            "Backend reports action {} as {} but its intents add up to {}",
            local.id, local.state, derived
        );
    }
}
