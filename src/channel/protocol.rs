//! Messages exchanged across the isolation boundary
//!
//! A request is `{"task": "links"|"content", "markup": "..."}` and a response
//! is `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.
//! Both realisations of the parsing context answer through
//! [`handle_request`], so they behave identically.

use crate::extract::{extract, ContentRecord, ExtractTask, Extracted};
use crate::{ChannelError, ExtractError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A parse request sent to the isolated context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRequest {
    pub task: ExtractTask,
    pub markup: String,
}

/// The isolated context's answer to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Runs one extraction and packages the outcome as a response
///
/// Extractor errors and panics both become failure payloads.
pub fn handle_request(request: &ParseRequest) -> ParseResponse {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        extract(&request.markup, request.task)
    }));

    match outcome {
        Ok(Ok(extracted)) => match encode(extracted) {
            Ok(data) => ParseResponse::ok(data),
            Err(e) => ParseResponse::failure(format!("Failed to encode result: {}", e)),
        },
        Ok(Err(e)) => {
            tracing::error!("Extraction failed: {}", e);
            ParseResponse::failure(e.to_string())
        }
        Err(payload) => {
            let error = ExtractError::Panicked(panic_message(payload.as_ref()));
            tracing::error!("{}", error);
            ParseResponse::failure(error.to_string())
        }
    }
}

fn encode(extracted: Extracted) -> serde_json::Result<Value> {
    match extracted {
        Extracted::Links(links) => serde_json::to_value(links),
        Extracted::Content(record) => serde_json::to_value(record),
    }
}

/// Turns a response back into a typed extraction result
pub fn decode_response(task: ExtractTask, response: ParseResponse) -> Result<Extracted, ChannelError> {
    if !response.success {
        return Err(ChannelError::Remote(
            response.error.unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }

    match task {
        ExtractTask::Links => {
            let Some(Value::Array(items)) = response.data else {
                return Err(ChannelError::Malformed(
                    "expected an array of links".to_string(),
                ));
            };

            let mut links = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(link) => links.push(link),
                    other => tracing::warn!("Invalid link entry {} dropped", other),
                }
            }
            Ok(Extracted::Links(links))
        }
        ExtractTask::Content => match response.data {
            None | Some(Value::Null) => Ok(Extracted::Content(None)),
            Some(data) => serde_json::from_value::<ContentRecord>(data)
                .map(|record| Extracted::Content(Some(record)))
                .map_err(|e| ChannelError::Malformed(e.to_string())),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
