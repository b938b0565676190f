//! Certificates signed with throwaway BLS keys, for tests.
#![allow(clippy::expect_used, reason = "test helpers")]

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use blst::min_sig::SecretKey;
use linkcart_model::Principal;
use serde_bytes::ByteBuf;

use crate::certificate::{Certificate, Delegation};
use crate::hash_tree::{domain_sep, fork, labeled, HashTree};
use crate::root_key::DST;
use crate::{leb128, RequestId, RootKey};

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

enum Node {
    Leaf(Vec<u8>),
    Branch(BTreeMap<Vec<u8>, Node>),
}

impl Node {
    fn insert(&mut self, path: &[Vec<u8>], value: Vec<u8>) {
        let Some((label, rest)) = path.split_first() else {
            *self = Node::Leaf(value);
            return;
        };
        if let Node::Leaf(_) = self {
            *self = Node::Branch(BTreeMap::new());
        }
        if let Node::Branch(children) = self {
            children
                .entry(label.clone())
                .or_insert_with(|| Node::Branch(BTreeMap::new()))
                .insert(rest, value);
        }
    }

    fn to_tree(&self) -> HashTree {
        match self {
            Node::Leaf(value) => HashTree::Leaf(value.clone()),
            Node::Branch(children) => children
                .iter()
                .map(|(label, child)| labeled(label.clone(), child.to_tree()))
                .reduce(fork)
                .unwrap_or(HashTree::Empty),
        }
    }
}

#[derive(Clone)]
pub struct CertificateBuilder {
    sk: SecretKey,
    leaves: Vec<(Vec<Vec<u8>>, Vec<u8>)>,
    time_ns: Option<u64>,
    delegation: Option<Delegation>,
}

impl CertificateBuilder {
    pub fn new(seed: u8) -> Self {
        let sk = SecretKey::key_gen(&[seed; 32], &[]).expect("32 bytes of key material");
        CertificateBuilder {
            sk,
            leaves: vec![],
            time_ns: None,
            delegation: None,
        }
    }

    pub fn root_key(&self) -> RootKey {
        RootKey::from_raw(&self.sk.sk_to_pk().compress()).expect("generated key is valid")
    }

    pub fn with_leaf<P: AsRef<[u8]>>(mut self, path: &[P], value: impl Into<Vec<u8>>) -> Self {
        let path = path.iter().map(|p| p.as_ref().to_vec()).collect();
        self.leaves.push((path, value.into()));
        self
    }

    /// Certified time. Defaults to the wall clock when the certificate is built.
    pub fn with_time(mut self, time_ns: u64) -> Self {
        self.time_ns = Some(time_ns);
        self
    }

    pub fn with_request_status(self, rid: &RequestId, status: &str, reply: Option<&[u8]>) -> Self {
        let builder = self.with_leaf(&request_status_path(rid, "status"), status);
        match reply {
            Some(reply) => builder.with_leaf(&request_status_path(rid, "reply"), reply),
            None => builder,
        }
    }

    pub fn with_rejection(
        self,
        rid: &RequestId,
        reject_code: u64,
        message: &str,
        error_code: Option<&str>,
    ) -> Self {
        let builder = self
            .with_request_status(rid, "rejected", None)
            .with_leaf(
                &request_status_path(rid, "reject_code"),
                leb128::encode_u64(reject_code),
            )
            .with_leaf(&request_status_path(rid, "reject_message"), message);
        match error_code {
            Some(code) => builder.with_leaf(&request_status_path(rid, "error_code"), code),
            None => builder,
        }
    }

    /// Makes this builder a subnet whose key is vouched for by `root` for the given
    /// canister ranges.
    pub fn delegated_by(
        mut self,
        root: &CertificateBuilder,
        subnet_id: &[u8],
        ranges: &[(Principal, Principal)],
    ) -> Self {
        let ranges: Vec<(ByteBuf, ByteBuf)> = ranges
            .iter()
            .map(|(low, high)| {
                (
                    ByteBuf::from(low.as_slice().to_vec()),
                    ByteBuf::from(high.as_slice().to_vec()),
                )
            })
            .collect();
        let ranges = serde_cbor::to_vec(&ranges).expect("ranges encode");
        let delegation_cert = root
            .clone()
            .with_leaf(
                &[b"subnet".as_slice(), subnet_id, b"public_key".as_slice()],
                self.root_key().to_der(),
            )
            .with_leaf(&[b"subnet".as_slice(), subnet_id, b"canister_ranges".as_slice()], ranges)
            .build();
        self.delegation = Some(Delegation {
            subnet_id: subnet_id.to_vec(),
            certificate: delegation_cert,
        });
        self
    }

    pub fn tree(&self) -> HashTree {
        let mut root = Node::Branch(BTreeMap::new());
        let time = self.time_ns.unwrap_or_else(now_ns);
        root.insert(&[b"time".to_vec()], leb128::encode_u64(time));
        for (path, value) in &self.leaves {
            root.insert(path, value.clone());
        }
        root.to_tree()
    }

    pub fn certificate(&self) -> Certificate {
        let tree = self.tree();
        let msg = [domain_sep("ic-state-root"), tree.digest().to_vec()].concat();
        Certificate {
            tree,
            signature: self.sk.sign(&msg, DST, &[]).compress().to_vec(),
            delegation: self.delegation.clone(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        self.certificate().to_cbor()
    }
}

fn request_status_path(rid: &RequestId, leaf: &str) -> [Vec<u8>; 3] {
    [
        b"request_status".to_vec(),
        rid.as_bytes().to_vec(),
        leaf.as_bytes().to_vec(),
    ]
}
