use std::collections::BTreeMap;
use std::time::Duration;

use linkcart_model::Principal;
use serde_cbor::Value;
use thiserror::Error;
use tracing::debug;

use crate::hash_tree::{domain_sep, HashTree, LookupResult};
use crate::{leb128, RootKey};

pub(crate) const SELF_DESCRIBE_TAG: [u8; 3] = [0xd9, 0xd9, 0xf7];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("malformed certificate: {0}")]
    Malformed(String),
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("certificate signature does not verify")]
    BadSignature,
    #[error("delegation certificates cannot be delegated themselves")]
    NestedDelegation,
    #[error("canister {0} is outside the ranges of the delegated subnet")]
    CanisterOutOfRange(Principal),
    #[error("certificate is {age:?} old, more than the allowed {max_age:?}")]
    Stale { age: Duration, max_age: Duration },
    #[error("certificate has no leaf at {0}")]
    MissingLeaf(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub subnet_id: Vec<u8>,
    /// Raw CBOR of the certificate signed by the root key.
    pub certificate: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub tree: HashTree,
    pub signature: Vec<u8>,
    pub delegation: Option<Delegation>,
}

fn take_bytes(map: &mut BTreeMap<Value, Value>, key: &str) -> Result<Vec<u8>, CertificateError> {
    match map.remove(&Value::Text(key.to_owned())) {
        Some(Value::Bytes(bytes)) => Ok(bytes),
        Some(_) => Err(CertificateError::Malformed(format!("{key} is not a byte string"))),
        None => Err(CertificateError::Malformed(format!("missing {key}"))),
    }
}

fn into_map(value: Value, what: &str) -> Result<BTreeMap<Value, Value>, CertificateError> {
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(CertificateError::Malformed(format!("{what} is not a map"))),
    }
}

impl Certificate {
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CertificateError> {
        let bytes = bytes.strip_prefix(SELF_DESCRIBE_TAG.as_slice()).unwrap_or(bytes);
        let value: Value = serde_cbor::from_slice(bytes)
            .map_err(|e| CertificateError::Malformed(e.to_string()))?;
        let mut map = into_map(value, "certificate")?;

        let tree = map
            .remove(&Value::Text("tree".to_owned()))
            .ok_or_else(|| CertificateError::Malformed("missing tree".into()))?;
        let tree = HashTree::try_from(tree)?;
        let signature = take_bytes(&mut map, "signature")?;
        let delegation = match map.remove(&Value::Text("delegation".to_owned())) {
            Some(value) => {
                let mut delegation = into_map(value, "delegation")?;
                Some(Delegation {
                    subnet_id: take_bytes(&mut delegation, "subnet_id")?,
                    certificate: take_bytes(&mut delegation, "certificate")?,
                })
            }
            None => None,
        };

        Ok(Certificate {
            tree,
            signature,
            delegation,
        })
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut map = BTreeMap::new();
        map.insert(Value::Text("tree".into()), self.tree.to_cbor_value());
        map.insert(
            Value::Text("signature".into()),
            Value::Bytes(self.signature.clone()),
        );
        if let Some(delegation) = &self.delegation {
            let mut inner = BTreeMap::new();
            inner.insert(
                Value::Text("subnet_id".into()),
                Value::Bytes(delegation.subnet_id.clone()),
            );
            inner.insert(
                Value::Text("certificate".into()),
                Value::Bytes(delegation.certificate.clone()),
            );
            map.insert(Value::Text("delegation".into()), Value::Map(inner));
        }
        let mut out = SELF_DESCRIBE_TAG.to_vec();
        // Writing a Value into a Vec cannot fail.
        out.extend(serde_cbor::to_vec(&Value::Map(map)).unwrap_or_default());
        out
    }

    /// Checks the signature, walking through the delegation if there is one. `canister` is the
    /// canister the certificate is supposed to speak for.
    pub fn verify(&self, canister: &Principal, root_key: &RootKey) -> Result<(), CertificateError> {
        let key = match &self.delegation {
            None => root_key.clone(),
            Some(delegation) => delegation.subnet_key(canister, root_key)?,
        };
        self.verify_signature(&key)
    }

    fn verify_signature(&self, key: &RootKey) -> Result<(), CertificateError> {
        let msg = [domain_sep("ic-state-root"), self.tree.digest().to_vec()].concat();
        match key.verify(&msg, &self.signature) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CertificateError::BadSignature),
            Err(e) => {
                debug!("Signature could not be checked: {:#}", e);
                Err(CertificateError::BadSignature)
            }
        }
    }

    pub fn lookup<P: AsRef<[u8]>>(&self, path: &[P]) -> LookupResult<'_> {
        self.tree.lookup_path(path)
    }

    /// Time the state was certified at, in nanoseconds since the epoch.
    pub fn time_ns(&self) -> Result<u64, CertificateError> {
        match self.lookup(&["time"]) {
            LookupResult::Found(bytes) => leb128::decode_u64(bytes)
                .map_err(|e| CertificateError::Malformed(format!("time: {e}"))),
            LookupResult::Absent | LookupResult::Unknown | LookupResult::Error => {
                Err(CertificateError::MissingLeaf("time".into()))
            }
        }
    }

    pub fn check_freshness(&self, now_ns: u64, max_age: Duration) -> Result<(), CertificateError> {
        let age = Duration::from_nanos(now_ns.saturating_sub(self.time_ns()?));
        if age > max_age {
            return Err(CertificateError::Stale { age, max_age });
        }
        Ok(())
    }
}

impl Delegation {
    fn subnet_key(
        &self,
        canister: &Principal,
        root_key: &RootKey,
    ) -> Result<RootKey, CertificateError> {
        let cert = Certificate::from_cbor(&self.certificate)?;
        if cert.delegation.is_some() {
            return Err(CertificateError::NestedDelegation);
        }
        cert.verify_signature(root_key)?;

        let ranges_path: [&[u8]; 3] = [b"subnet", &self.subnet_id, b"canister_ranges"];
        let ranges = match cert.lookup(&ranges_path) {
            LookupResult::Found(bytes) => parse_canister_ranges(bytes)?,
            LookupResult::Absent | LookupResult::Unknown | LookupResult::Error => {
                return Err(CertificateError::MissingLeaf("canister_ranges".into()))
            }
        };
        let id = canister.as_slice();
        if !ranges
            .iter()
            .any(|(low, high)| low.as_slice() <= id && id <= high.as_slice())
        {
            return Err(CertificateError::CanisterOutOfRange(*canister));
        }

        let key_path: [&[u8]; 3] = [b"subnet", &self.subnet_id, b"public_key"];
        match cert.lookup(&key_path) {
            LookupResult::Found(der) => {
                RootKey::from_der(der).map_err(|e| CertificateError::InvalidKey(e.to_string()))
            }
            LookupResult::Absent | LookupResult::Unknown | LookupResult::Error => {
                Err(CertificateError::MissingLeaf("public_key".into()))
            }
        }
    }
}

fn parse_canister_ranges(bytes: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CertificateError> {
    let malformed = || CertificateError::Malformed("canister_ranges".into());
    let ranges: Vec<(serde_bytes::ByteBuf, serde_bytes::ByteBuf)> =
        serde_cbor::from_slice(bytes).map_err(|_| malformed())?;
    Ok(ranges
        .into_iter()
        .map(|(low, high)| (low.into_vec(), high.into_vec()))
        .collect())
}
