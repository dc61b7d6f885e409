use crate::core::errors::KristError;
use crate::krist::types::Response;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::trace;

const FIRST_ID: u64 = 1;

pub type Reply = oneshot::Sender<Result<Response, KristError>>;

/// Outcome of matching an inbound response against the pending table
#[derive(Debug)]
pub enum Resolution {
    Resolved,
    /// No request with this id is pending
    Unexpected { id: u64, body: Value },
}

/// Matches responses to the requests of the current connection attempt
#[derive(Debug)]
pub struct MessageCorrelator {
    next_id: u64,
    pending: HashMap<u64, Reply>,
}

impl Default for MessageCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_ID,
            pending: HashMap::new(),
        }
    }

    /// Start a new attempt: ids restart and leftovers are rejected
    pub fn reset(&mut self) {
        self.reject_all(|| KristError::ConnectionClosed);
        self.next_id = FIRST_ID;
    }

    /// Allocate the next id and park the reply until its response arrives
    pub fn register(&mut self, reply: Reply) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, reply);
        id
    }

    pub fn resolve(&mut self, id: u64, ok: bool, body: Value) -> Resolution {
        let Some(reply) = self.pending.remove(&id) else {
            return Resolution::Unexpected { id, body };
        };

        let result = if ok {
            Ok(Response {
                id,
                ok,
                responding_to_type: body
                    .get("responding_to_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                body,
            })
        } else {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            Err(KristError::server(code, message))
        };

        if reply.send(result).is_err() {
            trace!(id, "requester went away before its response arrived");
        }
        Resolution::Resolved
    }

    pub fn reject_all<E>(&mut self, error: E)
    where
        E: Fn() -> KristError,
    {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(error()));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The id the next registered request will get
    pub const fn peek_next_id(&self) -> u64 {
        self.next_id
    }
}
