//! Merkle hash tree carried by certificates.

use serde_cbor::Value;
use sha2::{Digest as _, Sha256};

use crate::CertificateError;

pub type Digest = [u8; 32];

#[derive(Clone, PartialEq, Eq)]
pub enum HashTree {
    Empty,
    Fork(Box<HashTree>, Box<HashTree>),
    Labeled(Vec<u8>, Box<HashTree>),
    Leaf(Vec<u8>),
    Pruned(Digest),
}

#[derive(Debug, PartialEq, Eq)]
pub enum LookupResult<'a> {
    Found(&'a [u8]),
    /// Provably not in the tree.
    Absent,
    /// Pruned away, the tree cannot tell.
    Unknown,
    /// The path leads to a node that is not a leaf.
    Error,
}

enum LabelLookup<'a> {
    Found(&'a HashTree),
    Absent,
    Unknown,
}

pub(crate) fn domain_sep(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 1);
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn fork(left: HashTree, right: HashTree) -> HashTree {
    HashTree::Fork(Box::new(left), Box::new(right))
}

pub fn labeled(label: impl Into<Vec<u8>>, subtree: HashTree) -> HashTree {
    HashTree::Labeled(label.into(), Box::new(subtree))
}

pub fn leaf(value: impl Into<Vec<u8>>) -> HashTree {
    HashTree::Leaf(value.into())
}

impl HashTree {
    pub fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        match self {
            HashTree::Empty => hasher.update(domain_sep("ic-hashtree-empty")),
            HashTree::Fork(left, right) => {
                hasher.update(domain_sep("ic-hashtree-fork"));
                hasher.update(left.digest());
                hasher.update(right.digest());
            }
            HashTree::Labeled(label, subtree) => {
                hasher.update(domain_sep("ic-hashtree-labeled"));
                hasher.update(label);
                hasher.update(subtree.digest());
            }
            HashTree::Leaf(value) => {
                hasher.update(domain_sep("ic-hashtree-leaf"));
                hasher.update(value);
            }
            HashTree::Pruned(digest) => return *digest,
        }
        hasher.finalize().into()
    }

    pub fn lookup_path<P: AsRef<[u8]>>(&self, path: &[P]) -> LookupResult<'_> {
        let Some((label, rest)) = path.split_first() else {
            return match self {
                HashTree::Leaf(value) => LookupResult::Found(value),
                HashTree::Pruned(_) => LookupResult::Unknown,
                HashTree::Empty | HashTree::Fork(..) | HashTree::Labeled(..) => {
                    LookupResult::Error
                }
            };
        };
        if let HashTree::Leaf(_) = self {
            return LookupResult::Error;
        }
        match self.find_label(label.as_ref()) {
            LabelLookup::Found(subtree) => subtree.lookup_path(rest),
            LabelLookup::Absent => LookupResult::Absent,
            LabelLookup::Unknown => LookupResult::Unknown,
        }
    }

    /// Children are sorted by label, so a label is provably absent when its would-be
    /// neighbours are both visible labeled nodes (or the ends of the list).
    fn find_label(&self, label: &[u8]) -> LabelLookup<'_> {
        let mut children = Vec::new();
        self.flatten_forks(&mut children);

        let mut previous_is_visible = true;
        for child in children {
            match child {
                HashTree::Labeled(child_label, subtree) => {
                    if child_label.as_slice() == label {
                        return LabelLookup::Found(subtree);
                    }
                    if label < child_label.as_slice() {
                        return if previous_is_visible {
                            LabelLookup::Absent
                        } else {
                            LabelLookup::Unknown
                        };
                    }
                    previous_is_visible = true;
                }
                HashTree::Pruned(_) | HashTree::Leaf(_) | HashTree::Empty | HashTree::Fork(..) => {
                    previous_is_visible = false
                }
            }
        }
        if previous_is_visible {
            LabelLookup::Absent
        } else {
            LabelLookup::Unknown
        }
    }

    fn flatten_forks<'a>(&'a self, out: &mut Vec<&'a HashTree>) {
        match self {
            HashTree::Empty => {}
            HashTree::Fork(left, right) => {
                left.flatten_forks(out);
                right.flatten_forks(out);
            }
            HashTree::Labeled(..) | HashTree::Leaf(_) | HashTree::Pruned(_) => out.push(self),
        }
    }

    pub fn to_cbor_value(&self) -> Value {
        let tag = |t: i128| Value::Integer(t);
        Value::Array(match self {
            HashTree::Empty => vec![tag(0)],
            HashTree::Fork(left, right) => {
                vec![tag(1), left.to_cbor_value(), right.to_cbor_value()]
            }
            HashTree::Labeled(label, subtree) => {
                vec![tag(2), Value::Bytes(label.clone()), subtree.to_cbor_value()]
            }
            HashTree::Leaf(value) => vec![tag(3), Value::Bytes(value.clone())],
            HashTree::Pruned(digest) => vec![tag(4), Value::Bytes(digest.to_vec())],
        })
    }
}

impl TryFrom<Value> for HashTree {
    type Error = CertificateError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let malformed = |what: &str| CertificateError::Malformed(format!("hash tree: {what}"));
        let Value::Array(items) = value else {
            return Err(malformed("node is not an array"));
        };
        let mut items = items.into_iter();
        let Some(Value::Integer(tag)) = items.next() else {
            return Err(malformed("node has no tag"));
        };
        let mut next = || items.next().ok_or_else(|| malformed("node is too short"));
        let bytes = |value: Value| match value {
            Value::Bytes(b) => Ok(b),
            _ => Err(malformed("expected bytes")),
        };
        let tree = match tag {
            0 => HashTree::Empty,
            1 => {
                let left = HashTree::try_from(next()?)?;
                let right = HashTree::try_from(next()?)?;
                fork(left, right)
            }
            2 => {
                let label = bytes(next()?)?;
                labeled(label, HashTree::try_from(next()?)?)
            }
            3 => HashTree::Leaf(bytes(next()?)?),
            4 => {
                let digest: Digest = bytes(next()?)?
                    .try_into()
                    .map_err(|_| malformed("pruned digest is not 32 bytes"))?;
                HashTree::Pruned(digest)
            }
            other => return Err(malformed(&format!("unknown tag {other}"))),
        };
        Ok(tree)
    }
}

impl std::fmt::Debug for HashTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashTree::Empty => write!(f, "Empty"),
            HashTree::Fork(left, right) => f.debug_tuple("Fork").field(left).field(right).finish(),
            HashTree::Labeled(label, subtree) => match std::str::from_utf8(label) {
                Ok(text) => f.debug_tuple("Labeled").field(&text).field(subtree).finish(),
                Err(_) => f
                    .debug_tuple("Labeled")
                    .field(&hex::encode(label))
                    .field(subtree)
                    .finish(),
            },
            HashTree::Leaf(value) => write!(f, "Leaf({})", hex::encode(value)),
            HashTree::Pruned(digest) => write!(f, "Pruned({})", hex::encode(digest)),
        }
    }
}
