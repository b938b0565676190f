use std::collections::BTreeMap;

use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use strum_macros::{Display as StrumDisplay, EnumIter};
use thiserror::Error;

use crate::Principal;

/// Caller-assigned id, only used to correlate a response with its request.
#[derive(
    Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Display,
)]
pub struct CallId(pub String);

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        CallId(s.into())
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteCallRequest {
    pub id: CallId,
    pub module_id: Principal,
    pub method: String,
    #[serde_as(as = "Base64")]
    pub arg: Vec<u8>,
}

/// Relayable proof that a call was executed: the certificate holding its reply, and the
/// signed envelope a third party needs to recompute the request id.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttestedCallResult {
    #[serde_as(as = "Base64")]
    pub certificate: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub request_envelope: Vec<u8>,
}

/// Reject codes as defined by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, StrumDisplay)]
pub enum RejectCode {
    SysFatal = 1,
    SysTransient = 2,
    DestinationInvalid = 3,
    CanisterReject = 4,
    CanisterError = 5,
    SysUnknown = 6,
}

impl TryFrom<u32> for RejectCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RejectCode::SysFatal),
            2 => Ok(RejectCode::SysTransient),
            3 => Ok(RejectCode::DestinationInvalid),
            4 => Ok(RejectCode::CanisterReject),
            5 => Ok(RejectCode::CanisterError),
            6 => Ok(RejectCode::SysUnknown),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallErrorKind {
    /// The network rejected the call.
    Rejection(Option<RejectCode>),
    /// The certificate could not be validated. Never retried.
    Verification,
    /// Polling bound exceeded.
    Timeout,
    /// The call never reached a certified state because of the connection.
    Transport,
    /// The call panicked and was captured by the dispatcher.
    Captured,
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("call failed with code {code}: {message}")]
pub struct CallError {
    pub code: u32,
    pub message: String,
    pub network_code: Option<String>,
}

impl CallError {
    /// Codes from here on are raised by the client and never come from the network.
    pub const FIRST_LOCAL_CODE: u32 = 1000;
    pub const VERIFICATION_FAILED: u32 = 1000;
    pub const TIMEOUT: u32 = 1001;
    pub const TRANSPORT: u32 = 1002;
    pub const CAPTURED: u32 = 1003;

    /// Rejection reported by the network. A code inside the local range is recorded as
    /// `SysUnknown`, with the code kept in the message.
    pub fn rejected(code: u32, message: impl Into<String>, network_code: Option<String>) -> Self {
        if code >= Self::FIRST_LOCAL_CODE {
            return CallError {
                code: RejectCode::SysUnknown as u32,
                message: format!("reject code {code}: {}", message.into()),
                network_code,
            };
        }
        CallError {
            code,
            message: message.into(),
            network_code,
        }
    }

    pub fn verification_failed(message: impl std::fmt::Display) -> Self {
        Self::local(Self::VERIFICATION_FAILED, message)
    }

    pub fn timeout(message: impl std::fmt::Display) -> Self {
        Self::local(Self::TIMEOUT, message)
    }

    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::local(Self::TRANSPORT, message)
    }

    pub fn captured(message: impl std::fmt::Display) -> Self {
        Self::local(Self::CAPTURED, message)
    }

    fn local(code: u32, message: impl std::fmt::Display) -> Self {
        CallError {
            code,
            message: message.to_string(),
            network_code: None,
        }
    }

    pub fn kind(&self) -> CallErrorKind {
        match self.code {
            Self::VERIFICATION_FAILED => CallErrorKind::Verification,
            Self::TIMEOUT => CallErrorKind::Timeout,
            Self::TRANSPORT => CallErrorKind::Transport,
            Self::CAPTURED => CallErrorKind::Captured,
            code => CallErrorKind::Rejection(RejectCode::try_from(code).ok()),
        }
    }

    /// Whether resubmitting the very same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            CallErrorKind::Timeout | CallErrorKind::Transport => true,
            CallErrorKind::Rejection(code) => code == Some(RejectCode::SysTransient),
            CallErrorKind::Verification | CallErrorKind::Captured => false,
        }
    }
}

pub type CallOutcome = Result<AttestedCallResult, CallError>;

/// One outcome per distinct request id of a batch.
pub type BatchResult = BTreeMap<CallId, CallOutcome>;
