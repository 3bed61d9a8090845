//! Line protocol spoken with the UI shell.
//!
//! Requests: `{"id": <any>, "op": "<operation>", "args": {...}}`
//! Responses: `{"id": <same>, "result": <value>}`
//! Events: `{"event": "stream-...", "payload": {...}}`

use jarules_bridge::{rejection, Request};
use jarules_core::BridgeEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    #[serde(default)]
    id: Value,
    op: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    pub result: Value,
}

/// Outcome of reading one request line.
#[derive(Debug)]
pub enum Incoming {
    Request { id: Value, request: Request },
    /// The line could not be turned into a request; answer with `response`.
    Rejected(Response),
}

/// Decode one request line. Never fails: bad input becomes a rejection
/// carrying whatever id could be recovered.
pub fn parse_request(line: &str) -> Incoming {
    let raw: Value = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            return Incoming::Rejected(Response {
                id: Value::Null,
                result: rejection("Malformed request line", Some(e.to_string())),
            });
        }
    };

    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let envelope: RequestEnvelope = match serde_json::from_value(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Incoming::Rejected(Response {
                id,
                result: rejection("Malformed request", Some(e.to_string())),
            });
        }
    };

    match Request::parse(&envelope.op, envelope.args) {
        Ok(request) => Incoming::Request {
            id: envelope.id,
            request,
        },
        Err(e) => Incoming::Rejected(Response {
            id: envelope.id,
            result: rejection(
                format!("Unsupported or invalid operation '{}'", envelope.op),
                Some(e.to_string()),
            ),
        }),
    }
}

pub fn encode_response(response: &Response) -> Result<String, serde_json::Error> {
    serde_json::to_string(response)
}

pub fn encode_event(event: &BridgeEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
