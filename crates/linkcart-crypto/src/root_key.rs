use anyhow::{anyhow, bail, Context, Result};
use blst::min_sig::{PublicKey, Signature};
use blst::BLST_ERROR;

/// DER prefix of a BLS12-381 G2 public key, as served by the network.
const DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05,
    0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05, 0x03,
    0x02, 0x01, 0x03, 0x61, 0x00,
];
pub const KEY_SIZE: usize = 96;
pub const SIG_SIZE: usize = 48;

pub(crate) const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Public key a certificate signature is checked against: the network root key, or a subnet
/// key taken from a delegation.
#[derive(Clone, PartialEq, Eq)]
pub struct RootKey([u8; KEY_SIZE]);

impl RootKey {
    pub fn from_raw(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| anyhow!("BLS public key must be {KEY_SIZE} bytes, got {}", bytes.len()))?;
        PublicKey::key_validate(&raw).map_err(|e| anyhow!("Invalid BLS public key: {:?}", e))?;
        Ok(RootKey(raw))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let Some(raw) = der.strip_prefix(DER_PREFIX.as_slice()) else {
            bail!("DER key does not carry the BLS12-381 G2 prefix");
        };
        Self::from_raw(raw)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let der = hex::decode(s.trim()).context("Root key is not valid hex")?;
        Self::from_der(&der)
    }

    pub fn to_der(&self) -> Vec<u8> {
        [DER_PREFIX.as_slice(), self.0.as_slice()].concat()
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> Result<bool> {
        let pk = PublicKey::from_bytes(&self.0)
            .map_err(|e| anyhow!("Could not parse PublicKey: {:?}", e))?;
        let sig = Signature::from_bytes(signature)
            .map_err(|e| anyhow!("Could not parse Signature: {:?}", e))?;
        Ok(sig.verify(true, msg, DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS)
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootKey({})", hex::encode(&self.0[..8]))
    }
}
