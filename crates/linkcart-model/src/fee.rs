//! Amount and network fee attached to an intent, in the smallest token unit.
//!
//! Everything here is checked integer arithmetic. Display conversions (decimals, fiat) live
//! elsewhere and never feed back into these values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ActionType, Intent, IntentId, IntentTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountAndFee {
    pub amount: u128,
    pub fee: Option<u128>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("amount of intent {0} overflows")]
    Overflow(IntentId),
    #[error("ledger fee {fee} exceeds amount {amount} of intent {intent}")]
    FeeExceedsAmount {
        intent: IntentId,
        amount: u128,
        fee: u128,
    },
}

pub fn compute_amount_and_fee(
    intent: &Intent,
    ledger_fee: u128,
    action_type: ActionType,
) -> Result<AmountAndFee, FeeError> {
    let amount = intent.payload.amount();
    let overflow = || FeeError::Overflow(intent.id.clone());

    match action_type {
        ActionType::CreateLink => match intent.task {
            // Covers the escrow deposit and the forwarding out of the treasury.
            IntentTask::TransferWalletToTreasury => {
                let total = ledger_fee
                    .checked_mul(2)
                    .and_then(|fees| amount.checked_add(fees))
                    .ok_or_else(overflow)?;
                Ok(AmountAndFee {
                    amount: total,
                    fee: Some(total),
                })
            }
            IntentTask::TransferWalletToLink | IntentTask::TransferLinkToWallet => {
                Ok(AmountAndFee {
                    amount: amount.checked_add(ledger_fee).ok_or_else(overflow)?,
                    fee: Some(ledger_fee),
                })
            }
        },
        ActionType::Withdraw => Ok(AmountAndFee {
            amount: amount
                .checked_sub(ledger_fee)
                .ok_or_else(|| FeeError::FeeExceedsAmount {
                    intent: intent.id.clone(),
                    amount,
                    fee: ledger_fee,
                })?,
            fee: Some(ledger_fee),
        }),
        ActionType::Send => Ok(AmountAndFee {
            amount: amount.checked_add(ledger_fee).ok_or_else(overflow)?,
            fee: Some(ledger_fee),
        }),
        ActionType::Receive => Ok(AmountAndFee { amount, fee: None }),
    }
}
