//! # linkcart
//!
//! *Client side of payment links: turns a user-approved action into remote calls that are
//! proven executed, then lets the backend settle it.*
//!
//! An [`Action`](linkcart_model::Action) is an ordered set of token-transfer intents, plus the
//! call batches the user has to sign. The [`TransactionCart`](cart::TransactionCart) runs those
//! batches through the [`BatchDispatcher`](dispatcher::BatchDispatcher), one batch after the
//! other, and every call through a [`CertifiedCallExecutor`](executor::CertifiedCallExecutor),
//! which only reports success when a certificate signed by the network says so. The backend is
//! then asked to process the action and stays the system of record for intent states.
//!
//! ## Layout
//!
//! * `linkcart-model`: intents, actions, call outcomes and fee computation.
//! * `linkcart-crypto`: hash trees, certificates, request ids and identities.
//! * this crate: transport, execution, dispatch, backend client and the cart.

pub mod agent;
pub mod backend;
pub mod cart;
pub mod dispatcher;
pub mod executor;
pub mod network;
pub mod utils;

pub use cart::{CartError, CartStage, IntentQuote, ProcessActionResult, TransactionCart};
