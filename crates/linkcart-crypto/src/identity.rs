use anyhow::{anyhow, Context, Result};
use k256::ecdsa::{signature::Signer, Signature as EcdsaSignature, SigningKey};
use linkcart_model::Principal;

use crate::RequestId;

/// SubjectPublicKeyInfo prefix of an uncompressed secp256k1 point.
const SECP256K1_DER_PREFIX: [u8; 23] = [
    0x30, 0x56, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05, 0x2b,
    0x81, 0x04, 0x00, 0x0a, 0x03, 0x42, 0x00,
];

/// What goes into the envelope next to the content. Both are absent for anonymous calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub public_key: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

pub trait Identity: Send + Sync {
    fn sender(&self) -> Principal;

    /// DER-encoded public key.
    fn public_key(&self) -> Option<Vec<u8>>;

    fn sign(&self, request_id: &RequestId) -> Result<Signature>;

    fn is_authenticated(&self) -> bool {
        self.sender() != Principal::anonymous()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn sender(&self) -> Principal {
        Principal::anonymous()
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        None
    }

    fn sign(&self, _request_id: &RequestId) -> Result<Signature> {
        Ok(Signature::default())
    }
}

#[derive(Clone)]
pub struct Secp256k1Identity {
    key: SigningKey,
    der_public_key: Vec<u8>,
    principal: Principal,
}

impl Secp256k1Identity {
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| anyhow!("Invalid secp256k1 secret key: {e}"))?;
        Ok(Self::from_signing_key(key))
    }

    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim()).context("Secret key is not valid hex")?;
        Self::from_secret_bytes(&bytes)
    }

    /// For testing purpose only
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        let der_public_key = [SECP256K1_DER_PREFIX.as_slice(), point.as_bytes()].concat();
        let principal = Principal::self_authenticating(&der_public_key);
        Secp256k1Identity {
            key,
            der_public_key,
            principal,
        }
    }
}

impl std::fmt::Debug for Secp256k1Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1Identity")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl Identity for Secp256k1Identity {
    fn sender(&self) -> Principal {
        self.principal
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        Some(self.der_public_key.clone())
    }

    fn sign(&self, request_id: &RequestId) -> Result<Signature> {
        let signature: EcdsaSignature = self
            .key
            .try_sign(&request_id.signable())
            .map_err(|e| anyhow!("Could not sign request {request_id}: {e}"))?;
        Ok(Signature {
            public_key: Some(self.der_public_key.clone()),
            signature: Some(signature.to_bytes().to_vec()),
        })
    }
}
