use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use strum_macros::{Display as StrumDisplay, EnumIter};
use thiserror::Error;

use crate::Principal;

#[derive(
    Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Display,
)]
pub struct IntentId(pub String);

impl From<&str> for IntentId {
    fn from(s: &str) -> Self {
        IntentId(s.into())
    }
}

/// A fungible token ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Asset {
    pub module_id: Principal,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub principal: Principal,
    #[serde_as(as = "Option<Hex>")]
    pub subaccount: Option<[u8; 32]>,
}

impl Wallet {
    pub fn new(principal: Principal) -> Self {
        Wallet {
            principal,
            subaccount: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, StrumDisplay)]
pub enum IntentTask {
    TransferWalletToTreasury,
    TransferWalletToLink,
    TransferLinkToWallet,
}

impl IntentTask {
    /// Label shown next to the fee of an intent, if any.
    pub fn fee_label(&self) -> Option<&'static str> {
        match self {
            IntentTask::TransferWalletToTreasury => Some("Link creation fee"),
            IntentTask::TransferWalletToLink => None,
            IntentTask::TransferLinkToWallet => None,
        }
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferPayload {
    pub from: Wallet,
    pub to: Wallet,
    pub asset: Asset,
    /// Smallest token unit. Carried as a decimal string so no JSON consumer rounds it.
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u128,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntentPayload {
    Transfer(TransferPayload),
}

impl IntentPayload {
    pub fn amount(&self) -> u128 {
        match self {
            IntentPayload::Transfer(transfer) => transfer.amount,
        }
    }

    pub fn asset(&self) -> &Asset {
        match self {
            IntentPayload::Transfer(transfer) => &transfer.asset,
        }
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, StrumDisplay,
)]
pub enum IntentState {
    Created,
    Processing,
    Success,
    Fail,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid state transition from {from} to {to}")]
pub struct TransitionError {
    pub from: IntentState,
    pub to: IntentState,
}

impl IntentState {
    pub fn is_terminal(&self) -> bool {
        match self {
            IntentState::Success | IntentState::Fail => true,
            IntentState::Created | IntentState::Processing => false,
        }
    }

    /// Staying put is always allowed; terminal states never move.
    pub fn can_transition_to(&self, to: IntentState) -> bool {
        if *self == to {
            return true;
        }
        match self {
            IntentState::Created => true,
            IntentState::Processing => to.is_terminal(),
            IntentState::Success | IntentState::Fail => false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub id: IntentId,
    pub task: IntentTask,
    pub payload: IntentPayload,
    pub created_at_ns: u64,
    pub state: IntentState,
}

impl Intent {
    pub fn transition(&mut self, to: IntentState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
