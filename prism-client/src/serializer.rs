//! Request encoding and response parsing.
//!
//! The request body is the canonical JSON form of
//! `{"query", "operationName", "variables"}`; its SHA-256 is the request
//! signature, so two calls of the same operation with the same variables
//! share one transport cache entry.

use prism_core::{
    canonical_json, compute_signature, JsonObject, Operation, ParseError, ResponseError,
};
use serde_json::{json, Value};

/// Encoded request body and its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    pub body: Vec<u8>,
    pub signature: String,
}

/// Encode `operation` into a request body.
pub fn encode_request<O: Operation + ?Sized>(operation: &O) -> EncodedRequest {
    let payload = json!({
        "query": operation.document(),
        "operationName": operation.name(),
        "variables": Value::Object(operation.variables()),
    });
    let body = canonical_json(&payload).into_bytes();
    let signature = compute_signature(&body);
    EncodedRequest { body, signature }
}

/// A parsed response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub data: Option<JsonObject>,
    pub errors: Vec<ResponseError>,
}

/// Parse response bytes into a generic tree.
pub fn parse_response(bytes: &[u8]) -> Result<ParsedResponse, ParseError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed {
        reason: e.to_string(),
    })?;
    let Value::Object(mut envelope) = value else {
        return Err(ParseError::Malformed {
            reason: "response is not a JSON object".to_string(),
        });
    };

    let data = match envelope.remove("data") {
        None | Some(Value::Null) => None,
        Some(Value::Object(data)) => Some(data),
        Some(other) => {
            return Err(ParseError::Malformed {
                reason: format!("data is a {}", prism_core::type_name_of(&other)),
            })
        }
    };
    let errors = match envelope.remove("errors") {
        None | Some(Value::Null) => Vec::new(),
        Some(errors) => serde_json::from_value(errors).map_err(|e| ParseError::Malformed {
            reason: format!("invalid errors array: {}", e),
        })?,
    };

    if data.is_none() && errors.is_empty() {
        return Err(ParseError::MissingData);
    }
    Ok(ParsedResponse { data, errors })
}
