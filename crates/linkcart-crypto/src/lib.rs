//! # linkcart-crypto
//!
//! Everything needed to trust a response from the network without trusting the node that
//! served it:
//!
//! - [`HashTree`] digests and path lookups over certified state,
//! - [`Certificate`] parsing and BLS signature checks against a [`RootKey`], with one level of
//!   subnet delegation,
//! - [`request_id`] hashing of request contents, which is what identities sign,
//! - [`Identity`] implementations for anonymous and secp256k1 senders.
//!
//! With the `test-utils` feature, [`test_utils::CertificateBuilder`] signs certificates with
//! throwaway keys so that dependent crates can exercise verification end to end.

mod certificate;
pub mod hash_tree;
mod identity;
pub mod leb128;
mod request_id;
mod request_status;
mod root_key;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use certificate::{Certificate, CertificateError, Delegation};
pub use hash_tree::{HashTree, LookupResult};
pub use identity::{AnonymousIdentity, Identity, Secp256k1Identity, Signature};
pub use request_id::{request_id, HashValue, RequestId};
pub use request_status::{lookup_request_status, RequestStatus};
pub use root_key::RootKey;
