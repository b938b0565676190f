//! Representation-independent hash of a request content map.

use sha2::{Digest, Sha256};

use crate::hash_tree::domain_sep;
use crate::leb128;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Bytes an identity signs for this request.
    pub fn signable(&self) -> Vec<u8> {
        [domain_sep("ic-request"), self.0.to_vec()].concat()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestId({})", hex::encode(self.0))
    }
}

pub enum HashValue<'a> {
    Text(&'a str),
    Blob(&'a [u8]),
    Nat(u64),
    Array(Vec<HashValue<'a>>),
}

impl HashValue<'_> {
    fn hash(&self) -> [u8; 32] {
        match self {
            HashValue::Text(text) => Sha256::digest(text.as_bytes()).into(),
            HashValue::Blob(blob) => Sha256::digest(blob).into(),
            HashValue::Nat(n) => Sha256::digest(leb128::encode_u64(*n)).into(),
            HashValue::Array(items) => {
                let mut hasher = Sha256::new();
                for item in items {
                    hasher.update(item.hash());
                }
                hasher.finalize().into()
            }
        }
    }
}

pub fn request_id(fields: &[(&str, HashValue<'_>)]) -> RequestId {
    let mut pairs: Vec<[u8; 64]> = fields
        .iter()
        .map(|(key, value)| {
            let mut pair = [0u8; 64];
            pair[..32].copy_from_slice(&Sha256::digest(key.as_bytes()));
            pair[32..].copy_from_slice(&value.hash());
            pair
        })
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for pair in &pairs {
        hasher.update(pair);
    }
    RequestId(hasher.finalize().into())
}
