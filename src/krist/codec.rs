use crate::core::errors::KristError;
use crate::core::kernel::codec::WsCodec;
use crate::krist::types::{Block, KristRequest, Name, ServerStatus, Transaction};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

/// Inbound messages, classified by their `type` discriminator
#[derive(Debug, Clone, PartialEq)]
pub enum KristWsMessage {
    /// Handshake, once per connection
    Hello(Box<ServerStatus>),
    Keepalive {
        server_time: Option<DateTime<Utc>>,
    },
    Event(KristEvent),
    /// A reply correlated to a request by `id`
    Response {
        id: u64,
        ok: bool,
        body: Value,
    },
    /// A frame without a usable discriminator or payload
    Invalid {
        reason: String,
        raw: String,
    },
    /// A well-formed message of a type this client does not know
    Unknown {
        kind: String,
        body: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KristEvent {
    Block {
        block: Block,
        new_work: Option<u64>,
    },
    Transaction(Transaction),
    Name(Name),
    Other {
        event: String,
        body: Value,
    },
}

/// Krist WebSocket codec
#[derive(Debug, Clone, Copy, Default)]
pub struct KristCodec;

impl KristCodec {
    pub fn new() -> Self {
        Self
    }

    /// Classify a text frame
    pub fn classify(&self, text: &str) -> KristWsMessage {
        let invalid = |reason: &str| KristWsMessage::Invalid {
            reason: reason.to_string(),
            raw: text.to_string(),
        };

        let object = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return invalid("message is not a JSON object"),
            Err(_) => return invalid("message is not valid JSON"),
        };

        let Some(kind) = object.get("type").and_then(Value::as_str).map(str::to_string) else {
            return invalid("message has no type");
        };
        let id = object.get("id").and_then(Value::as_u64);

        match (kind.as_str(), id) {
            ("hello", _) => match payload::<ServerStatus>(&object) {
                Ok(status) => KristWsMessage::Hello(Box::new(status)),
                Err(e) => invalid(&format!("malformed hello: {}", e)),
            },
            ("keepalive", _) => KristWsMessage::Keepalive {
                server_time: object
                    .get("server_time")
                    .and_then(Value::as_str)
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc)),
            },
            ("event", _) => match classify_event(&object) {
                Ok(event) => KristWsMessage::Event(event),
                Err(e) => invalid(&format!("malformed event: {}", e)),
            },
            (_, Some(id)) => KristWsMessage::Response {
                id,
                ok: object.get("ok").and_then(Value::as_bool).unwrap_or(false),
                body: Value::Object(object),
            },
            ("response" | "error", None) => invalid("response has no id"),
            (_, None) => KristWsMessage::Unknown {
                kind: kind.clone(),
                body: Value::Object(object),
            },
        }
    }
}

fn payload<T: DeserializeOwned>(object: &Map<String, Value>) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(object.clone()))
}

fn field<T: DeserializeOwned>(
    object: &Map<String, Value>,
    name: &str,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(object.get(name).cloned().unwrap_or(Value::Null))
}

fn classify_event(object: &Map<String, Value>) -> Result<KristEvent, serde_json::Error> {
    let event = object
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(match event {
        "block" => KristEvent::Block {
            block: field(object, "block")?,
            new_work: object.get("new_work").and_then(Value::as_u64),
        },
        "transaction" => KristEvent::Transaction(field(object, "transaction")?),
        "name" => KristEvent::Name(field(object, "name")?),
        other => KristEvent::Other {
            event: other.to_string(),
            body: Value::Object(object.clone()),
        },
    })
}

impl WsCodec for KristCodec {
    type Request = KristRequest;
    type Message = KristWsMessage;

    fn encode_request(&self, id: u64, request: &KristRequest) -> Result<Message, KristError> {
        let mut value = serde_json::to_value(request)?;
        match value.as_object_mut() {
            Some(object) => {
                object.insert("id".to_string(), Value::from(id));
            }
            None => {
                return Err(KristError::SerializationError(format!(
                    "Request {} did not serialize to an object",
                    request.kind()
                )))
            }
        }
        Ok(Message::Text(serde_json::to_string(&value)?))
    }

    fn decode_message(&self, message: Message) -> Result<Option<KristWsMessage>, KristError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping non-UTF-8 binary frame");
                    return Ok(Some(KristWsMessage::Invalid {
                        reason: "binary frame is not UTF-8".to_string(),
                        raw: String::new(),
                    }));
                }
            },
            _ => return Ok(None),
        };

        Ok(Some(self.classify(&text)))
    }
}
