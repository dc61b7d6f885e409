use crate::core::types::ConnectionState;
use crate::krist::codec::{KristEvent, KristWsMessage};
use crate::krist::correlator::{MessageCorrelator, Resolution};
use crate::krist::types::{Block, Name, ServerStatus, Transaction};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Everything observers of a client can see
#[derive(Debug, Clone)]
pub enum WsEvent {
    StateChanged(ConnectionState),
    /// Handshake and subscription sync finished; carries the `hello` status
    Ready(Box<ServerStatus>),
    Keepalive {
        server_time: Option<DateTime<Utc>>,
    },
    Block {
        block: Block,
        new_work: Option<u64>,
    },
    Transaction(Transaction),
    Name(Name),
    /// A frame without a usable `type`, dropped
    InvalidMessage {
        reason: String,
        raw: String,
    },
    /// A response whose id matches no pending request
    UnexpectedResponse {
        id: u64,
        body: Value,
    },
    /// A reconnect has been scheduled after `delay`
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
}

/// What the connection manager has to act on itself
#[derive(Debug)]
pub enum Routed {
    Handled,
    Hello(Box<ServerStatus>),
}

/// Routes classified inbound messages to observers or to the correlator
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    events: broadcast::Sender<WsEvent>,
}

impl EventDispatcher {
    pub fn new(events: broadcast::Sender<WsEvent>) -> Self {
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.events.subscribe()
    }

    /// Publish to whoever is listening; no listeners is fine
    pub fn emit(&self, event: WsEvent) {
        if self.events.send(event).is_err() {
            trace!("no event listeners");
        }
    }

    pub fn dispatch(&self, message: KristWsMessage, correlator: &mut MessageCorrelator) -> Routed {
        match message {
            KristWsMessage::Hello(status) => return Routed::Hello(status),
            KristWsMessage::Keepalive { server_time } => {
                self.emit(WsEvent::Keepalive { server_time });
            }
            KristWsMessage::Event(event) => self.dispatch_event(event),
            KristWsMessage::Response { id, ok, body } => {
                if let Resolution::Unexpected { id, body } = correlator.resolve(id, ok, body) {
                    warn!(id, "response for unknown request id");
                    self.emit(WsEvent::UnexpectedResponse { id, body });
                }
            }
            KristWsMessage::Invalid { reason, raw } => {
                warn!(%reason, "dropping invalid message");
                self.emit(WsEvent::InvalidMessage { reason, raw });
            }
            KristWsMessage::Unknown { kind, .. } => {
                debug!(%kind, "ignoring message of unknown type");
            }
        }
        Routed::Handled
    }

    fn dispatch_event(&self, event: KristEvent) {
        match event {
            KristEvent::Block { block, new_work } => {
                trace!(height = block.height, "block event");
                self.emit(WsEvent::Block { block, new_work });
            }
            KristEvent::Transaction(transaction) => {
                trace!(id = transaction.id, "transaction event");
                self.emit(WsEvent::Transaction(transaction));
            }
            KristEvent::Name(name) => self.emit(WsEvent::Name(name)),
            KristEvent::Other { event, .. } => {
                debug!(%event, "ignoring event of unknown kind");
            }
        }
    }
}
