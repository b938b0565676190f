//! Data model of the link cart: principals, intents, actions, remote calls and fees.

mod action;
mod call;
pub mod fee;
mod intent;

pub use action::*;
pub use call::*;
pub use fee::{compute_amount_and_fee, AmountAndFee, FeeError};
pub use intent::*;
/// Principals are the IC's own type, shared with every other IC crate.
pub use candid::Principal;
