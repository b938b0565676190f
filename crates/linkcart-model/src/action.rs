use std::collections::BTreeSet;

use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter};
use thiserror::Error;

use crate::{CallId, Intent, IntentId, IntentState, IntentTask, Principal, RemoteCallRequest};

#[derive(
    Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Display,
)]
pub struct ActionId(pub String);

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        ActionId(s.into())
    }
}

#[derive(
    Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Display,
)]
pub struct LinkId(pub String);

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        LinkId(s.into())
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, StrumDisplay,
)]
pub enum ActionType {
    CreateLink,
    Withdraw,
    Send,
    Receive,
}

impl ActionType {
    /// Tasks an intent may carry inside an action of this type.
    pub fn allowed_tasks(&self) -> &'static [IntentTask] {
        match self {
            ActionType::CreateLink => &[
                IntentTask::TransferWalletToTreasury,
                IntentTask::TransferWalletToLink,
            ],
            ActionType::Withdraw => &[IntentTask::TransferLinkToWallet],
            ActionType::Send => &[IntentTask::TransferWalletToLink],
            ActionType::Receive => &[IntentTask::TransferLinkToWallet],
        }
    }

    pub fn allows(&self, task: IntentTask) -> bool {
        self.allowed_tasks().contains(&task)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, StrumDisplay,
)]
pub enum ActionState {
    Created,
    Processing,
    Success,
    Fail,
}

impl ActionState {
    /// Derives the state of an action from the states of its intents.
    ///
    /// Any failed intent fails the action. Otherwise the action succeeds once every intent
    /// succeeded, and stays `Created` while nothing has started.
    pub fn aggregate<'a>(states: impl IntoIterator<Item = &'a IntentState>) -> ActionState {
        let mut all_success = true;
        let mut all_created = true;
        let mut any = false;
        for state in states {
            any = true;
            match state {
                IntentState::Fail => return ActionState::Fail,
                IntentState::Success => all_created = false,
                IntentState::Processing => {
                    all_success = false;
                    all_created = false;
                }
                IntentState::Created => all_success = false,
            }
        }
        if !any || all_created {
            ActionState::Created
        } else if all_success {
            ActionState::Success
        } else {
            ActionState::Processing
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ActionState::Success | ActionState::Fail => true,
            ActionState::Created | ActionState::Processing => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionValidationError {
    #[error("action {0} has no intents")]
    NoIntents(ActionId),
    #[error("intent {intent} has task {task} which is not allowed in a {action_type} action")]
    TaskNotAllowed {
        intent: IntentId,
        task: IntentTask,
        action_type: ActionType,
    },
    #[error("call id {call} appears twice in batch {batch}")]
    DuplicateCallId { batch: usize, call: CallId },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    pub creator: Principal,
    pub action_type: ActionType,
    pub state: ActionState,
    pub intents: Vec<Intent>,
    /// Calls the user must sign, grouped in batches that run one after the other.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_batches: Option<Vec<Vec<RemoteCallRequest>>>,
}

impl Action {
    pub fn validate(&self) -> Result<(), ActionValidationError> {
        if self.intents.is_empty() {
            return Err(ActionValidationError::NoIntents(self.id.clone()));
        }
        for intent in &self.intents {
            if !self.action_type.allows(intent.task) {
                return Err(ActionValidationError::TaskNotAllowed {
                    intent: intent.id.clone(),
                    task: intent.task,
                    action_type: self.action_type,
                });
            }
        }
        for (batch, calls) in self.call_batches.iter().flatten().enumerate() {
            let mut seen = BTreeSet::new();
            for call in calls {
                if !seen.insert(&call.id) {
                    return Err(ActionValidationError::DuplicateCallId {
                        batch,
                        call: call.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// State implied by the intents, as opposed to the one reported by the backend.
    pub fn derived_state(&self) -> ActionState {
        ActionState::aggregate(self.intents.iter().map(|i| &i.state))
    }

    pub fn intent(&self, id: &IntentId) -> Option<&Intent> {
        self.intents.iter().find(|i| &i.id == id)
    }

    pub fn has_call_batches(&self) -> bool {
        self.call_batches
            .as_ref()
            .is_some_and(|batches| batches.iter().any(|b| !b.is_empty()))
    }
}
