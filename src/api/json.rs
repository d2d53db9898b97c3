//! JSON body encoding and response decoding

use super::error::{ApiFault, PartnerError, PartnerResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn to_body<T: Serialize + ?Sized>(value: &T) -> PartnerResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PartnerError::InvalidRequest(format!("Could not serialize request body: {}", e)))
}

/// Decode a response body. An empty body decodes as JSON `null`, so `()` and
/// `Option<T>` can be read from `204 No Content` responses.
pub fn from_body<T: DeserializeOwned>(uri: &str, body: &[u8]) -> PartnerResult<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) { b"null".as_slice() } else { body };

    serde_json::from_slice(body).map_err(|source| PartnerError::InvalidResponse {
        uri: uri.to_string(),
        body: String::from_utf8_lossy(body).into_owned(),
        source,
    })
}

/// Decode a service error payload, if the body holds one
pub fn parse_fault(body: &[u8]) -> Option<ApiFault> {
    let fault: ApiFault = serde_json::from_slice(body).ok()?;
    if fault.code.is_none() && fault.description.is_none() {
        return None;
    }
    Some(fault)
}
