use crate::{leb128, Certificate, CertificateError, LookupResult, RequestId};

/// What a certificate says about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Not certified yet, or still `received`/`processing`.
    Pending,
    Replied(Vec<u8>),
    Rejected {
        reject_code: u8,
        reject_message: String,
        error_code: Option<String>,
    },
    /// Executed, but the reply has since been pruned from the state.
    Done,
}

fn path<'a>(rid: &'a RequestId, leaf: &'a str) -> [&'a [u8]; 3] {
    [b"request_status", rid.as_bytes(), leaf.as_bytes()]
}

fn required<'a>(
    cert: &'a Certificate,
    rid: &RequestId,
    leaf: &str,
) -> Result<&'a [u8], CertificateError> {
    match cert.lookup(&path(rid, leaf)) {
        LookupResult::Found(bytes) => Ok(bytes),
        LookupResult::Absent | LookupResult::Unknown | LookupResult::Error => {
            Err(CertificateError::MissingLeaf(format!("request_status/{rid}/{leaf}")))
        }
    }
}

fn text(bytes: &[u8], leaf: &str) -> Result<String, CertificateError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CertificateError::Malformed(format!("{leaf} is not UTF-8")))
}

pub fn lookup_request_status(
    cert: &Certificate,
    rid: &RequestId,
) -> Result<RequestStatus, CertificateError> {
    let status = match cert.lookup(&path(rid, "status")) {
        LookupResult::Found(bytes) => text(bytes, "status")?,
        LookupResult::Absent | LookupResult::Unknown => return Ok(RequestStatus::Pending),
        LookupResult::Error => {
            return Err(CertificateError::Malformed("status is not a leaf".into()))
        }
    };

    match status.as_str() {
        "received" | "processing" => Ok(RequestStatus::Pending),
        "replied" => Ok(RequestStatus::Replied(
            required(cert, rid, "reply")?.to_vec(),
        )),
        "rejected" => {
            let code = leb128::decode_u64(required(cert, rid, "reject_code")?)
                .map_err(|e| CertificateError::Malformed(format!("reject_code: {e}")))?;
            let reject_code = u8::try_from(code)
                .map_err(|_| CertificateError::Malformed(format!("reject_code {code} too large")))?;
            let reject_message = text(required(cert, rid, "reject_message")?, "reject_message")?;
            let error_code = match cert.lookup(&path(rid, "error_code")) {
                LookupResult::Found(bytes) => Some(text(bytes, "error_code")?),
                LookupResult::Absent | LookupResult::Unknown | LookupResult::Error => None,
            };
            Ok(RequestStatus::Rejected {
                reject_code,
                reject_message,
                error_code,
            })
        }
        "done" => Ok(RequestStatus::Done),
        other => Err(CertificateError::Malformed(format!(
            "unknown request status {other}"
        ))),
    }
}
