//! The connection manager: one actor task per client.
//!
//! The actor owns the transport, the correlator, the backoff and the reconnect
//! deadline. Commands from client handles, internal completions, inbound frames
//! and the reconnect timer are all processed in a single `select!` loop, so no
//! state is shared across tasks. Opening a transport and synchronizing
//! subscriptions run in short-lived tasks that report back tagged with the
//! attempt that spawned them; completions from an older attempt are dropped.

use crate::core::config::{duration_millis, Credentials, KristConfig};
use crate::core::errors::KristError;
use crate::core::kernel::{Backoff, RateLimiter, WsSession, WsSessionFactory};
use crate::core::traits::WsStarter;
use crate::core::types::{ConnectionState, PrivateKey};
use crate::krist::address::derive_address;
use crate::krist::codec::{KristCodec, KristWsMessage};
use crate::krist::correlator::{MessageCorrelator, Reply};
use crate::krist::dispatcher::{EventDispatcher, Routed, WsEvent};
use crate::krist::subscriptions::{SubscriptionApi, SubscriptionSynchronizer};
use crate::krist::types::{
    KristRequest, Response, ServerStatus, SubscriptionLevelResponse,
};
use crate::krist::wallet::resolve_credentials;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug)]
pub enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), KristError>>,
    },
    Request {
        request: KristRequest,
        reply: Reply,
    },
    /// Replace the key used by future attempts; `None` means guest
    SetKey {
        key: Option<PrivateKey>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

enum Internal<S> {
    Opened {
        attempt: u64,
        result: Result<S, KristError>,
    },
    Synced {
        attempt: u64,
        result: Result<(), KristError>,
    },
}

/// Rate-limited request path into the actor
#[derive(Debug, Clone)]
pub struct RequestSender {
    commands: mpsc::UnboundedSender<Command>,
    limiter: RateLimiter,
}

impl RequestSender {
    pub fn new(commands: mpsc::UnboundedSender<Command>, limiter: RateLimiter) -> Self {
        Self { commands, limiter }
    }

    pub fn command(&self, command: Command) -> Result<(), KristError> {
        self.commands
            .send(command)
            .map_err(|_| KristError::ClientClosed)
    }

    pub async fn send(&self, request: KristRequest) -> Result<Response, KristError> {
        self.limiter.acquire().await;
        let (reply, response) = oneshot::channel();
        self.command(Command::Request { request, reply })?;
        response.await.map_err(|_| KristError::ClientClosed)?
    }

    pub async fn send_typed<T: DeserializeOwned>(
        &self,
        request: KristRequest,
    ) -> Result<T, KristError> {
        let kind = request.kind();
        let response = self.send(request).await?;
        serde_json::from_value(response.body).map_err(|e| {
            KristError::DeserializationError(format!("Malformed {} response: {}", kind, e))
        })
    }
}

#[async_trait]
impl SubscriptionApi for RequestSender {
    async fn subscription_level(&self) -> Result<Vec<String>, KristError> {
        let response: SubscriptionLevelResponse =
            self.send_typed(KristRequest::GetSubscriptionLevel).await?;
        Ok(response.subscription_level)
    }

    async fn subscribe(&self, level: &str) -> Result<(), KristError> {
        self.send(KristRequest::Subscribe {
            event: level.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn unsubscribe(&self, level: &str) -> Result<(), KristError> {
        self.send(KristRequest::Unsubscribe {
            event: level.to_string(),
        })
        .await
        .map(|_| ())
    }
}

/// Channel ends a client handle keeps to talk to its actor
pub struct Handles {
    pub commands: mpsc::UnboundedSender<Command>,
    pub state: watch::Receiver<ConnectionState>,
    pub identity: watch::Receiver<Option<String>>,
}

pub struct ConnectionManager<F, S>
where
    F: WsSessionFactory<KristCodec>,
    S: WsStarter,
{
    factory: Arc<F>,
    starter: Arc<S>,
    commands: mpsc::UnboundedReceiver<Command>,
    // sync requests; kept apart so dropping every client handle ends the actor
    loopback_tx: mpsc::UnboundedSender<Command>,
    loopback: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal<F::Session>>,
    internal: mpsc::UnboundedReceiver<Internal<F::Session>>,
    session: Option<F::Session>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    identity: watch::Sender<Option<String>>,
    dispatcher: EventDispatcher,
    correlator: MessageCorrelator,
    synchronizer: Arc<SubscriptionSynchronizer>,
    backoff: Backoff,
    limiter: RateLimiter,
    reconnect_at: Option<Instant>,
    attempt: u64,
    hello: Option<Box<ServerStatus>>,
    credentials: Credentials,
    key: Option<PrivateKey>,
    key_fixed: bool,
    prefix: String,
}

impl<F, S> ConnectionManager<F, S>
where
    F: WsSessionFactory<KristCodec>,
    S: WsStarter,
{
    pub fn new(
        factory: F,
        starter: S,
        config: &KristConfig,
        limiter: RateLimiter,
        dispatcher: EventDispatcher,
    ) -> (Self, Handles) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (loopback_tx, loopback) = mpsc::unbounded_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (identity, identity_rx) = watch::channel(None);

        let manager = Self {
            factory: Arc::new(factory),
            starter: Arc::new(starter),
            commands,
            loopback_tx,
            loopback,
            internal_tx,
            internal,
            session: None,
            state: ConnectionState::Disconnected,
            state_tx,
            identity,
            dispatcher,
            correlator: MessageCorrelator::new(),
            synchronizer: Arc::new(SubscriptionSynchronizer::new(config.subscriptions.clone())),
            backoff: Backoff::new(config.reconnect_initial_delay, config.reconnect_max_delay),
            limiter,
            reconnect_at: None,
            attempt: 0,
            hello: None,
            credentials: config.credentials.clone(),
            key: None,
            key_fixed: false,
            prefix: config.address_prefix.clone(),
        };

        let handles = Handles {
            commands: commands_tx,
            state: state_rx,
            identity: identity_rx,
        };
        (manager, handles)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("all client handles dropped, shutting down");
                        self.close().await;
                        break;
                    }
                },
                Some(command) = self.loopback.recv() => {
                    let _ = self.handle_command(command).await;
                }
                Some(internal) = self.internal.recv() => self.handle_internal(internal).await,
                frame = next_frame(&mut self.session), if self.session.is_some() => {
                    self.handle_frame(frame).await;
                }
                () = sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.start_attempt();
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect { reply } => {
                let _ = reply.send(self.connect());
            }
            Command::Request { request, reply } => self.send_request(request, reply).await,
            Command::SetKey { key } => {
                if let Err(e) = self.fix_key(key) {
                    warn!(error = %e, "could not fix the private key");
                }
            }
            Command::Close { done } => {
                self.close().await;
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn connect(&mut self) -> Result<(), KristError> {
        if !self.key_fixed {
            let key = resolve_credentials(&self.credentials)?;
            self.fix_key(key)?;
        }

        if self.state == ConnectionState::Disconnected {
            // an explicit connect supersedes a pending reconnect
            self.reconnect_at = None;
            self.start_attempt();
        } else {
            debug!(state = %self.state, "connect ignored, already active");
        }
        Ok(())
    }

    fn fix_key(&mut self, key: Option<PrivateKey>) -> Result<(), KristError> {
        let address = key
            .as_ref()
            .map(|key| derive_address(key.expose_secret(), &self.prefix))
            .transpose()?;
        info!(address = address.as_deref().unwrap_or("guest"), "identity fixed");
        self.key = key;
        self.key_fixed = true;
        self.identity.send_replace(address);
        Ok(())
    }

    fn start_attempt(&mut self) {
        self.attempt += 1;
        self.correlator.reset();
        self.hello = None;
        self.set_state(ConnectionState::Connecting);

        let attempt = self.attempt;
        let factory = Arc::clone(&self.factory);
        let starter = Arc::clone(&self.starter);
        let key = self.key.clone();
        let tx = self.internal_tx.clone();
        debug!(attempt, "opening connection");

        tokio::spawn(async move {
            let result = open_session(&*starter, &*factory, key.as_ref()).await;
            let _ = tx.send(Internal::Opened { attempt, result });
        });
    }

    async fn handle_internal(&mut self, internal: Internal<F::Session>) {
        match internal {
            Internal::Opened { attempt, result } if attempt == self.attempt => match result {
                Ok(session) => {
                    debug!(attempt, "transport open, waiting for hello");
                    self.session = Some(session);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "connection attempt failed");
                    self.set_state(ConnectionState::Disconnected);
                    self.schedule_reconnect();
                }
            },
            Internal::Synced { attempt, result }
                if attempt == self.attempt && self.session.is_some() =>
            {
                match result {
                    Ok(()) => {
                        self.set_state(ConnectionState::Connected);
                        if let Some(status) = self.hello.clone() {
                            self.dispatcher.emit(WsEvent::Ready(status));
                        }
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "subscription sync failed");
                        self.drop_transport().await;
                    }
                }
            }
            Internal::Opened {
                result: Ok(mut session),
                ..
            } => {
                trace!("closing transport of a superseded attempt");
                let _ = session.close().await;
            }
            Internal::Opened { .. } | Internal::Synced { .. } => {
                trace!("dropping stale completion");
            }
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<KristWsMessage, KristError>>) {
        match frame {
            Some(Ok(message)) => {
                if let Routed::Hello(status) = self.dispatcher.dispatch(message, &mut self.correlator)
                {
                    self.on_hello(status);
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "transport error");
                self.drop_transport().await;
            }
            None => {
                info!("connection closed by server");
                self.drop_transport().await;
            }
        }
    }

    fn on_hello(&mut self, status: Box<ServerStatus>) {
        if self.hello.is_some() {
            warn!("ignoring repeated hello on the same connection");
            return;
        }

        info!(motd = %status.motd, "handshake received");
        self.backoff.reset();
        self.hello = Some(status);

        let attempt = self.attempt;
        let synchronizer = Arc::clone(&self.synchronizer);
        let api = RequestSender::new(self.loopback_tx.clone(), self.limiter.clone());
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = synchronizer.synchronize(&api).await.map(|_| ());
            let _ = tx.send(Internal::Synced { attempt, result });
        });
    }

    #[instrument(skip(self, request, reply), fields(kind = request.kind()))]
    async fn send_request(&mut self, request: KristRequest, reply: Reply) {
        let Some(session) = self.session.as_mut() else {
            let _ = reply.send(Err(KristError::NotConnected));
            return;
        };

        let id = self.correlator.register(reply);
        trace!(id, "sending request");
        let sent = session.send_request(id, &request).await;
        if let Err(e) = sent {
            warn!(id, error = %e, "send failed, dropping transport");
            self.drop_transport().await;
        }
    }

    /// Transport lost: fail pending requests and schedule the next attempt
    async fn drop_transport(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.close().await;
        }
        self.correlator.reject_all(|| KristError::ConnectionClosed);
        self.hello = None;
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        let attempt = self.backoff.failures();
        self.reconnect_at = Some(Instant::now() + delay);
        info!(attempt, delay_ms = duration_millis(delay), "reconnect scheduled");
        self.dispatcher
            .emit(WsEvent::Reconnecting { attempt, delay });
    }

    async fn close(&mut self) {
        info!("closing client");
        self.reconnect_at = None;
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "error while closing transport");
            }
        }
        self.correlator.reject_all(|| KristError::ConnectionClosed);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "connection state changed");
        self.state = state;
        self.state_tx.send_replace(state);
        self.dispatcher.emit(WsEvent::StateChanged(state));
    }
}

async fn open_session<F, S>(
    starter: &S,
    factory: &F,
    key: Option<&PrivateKey>,
) -> Result<F::Session, KristError>
where
    F: WsSessionFactory<KristCodec>,
    S: WsStarter,
{
    let url = starter.start_ws(key).await?;
    let mut session = factory.create(&url);
    session.connect().await?;
    Ok(session)
}

async fn next_frame<T: WsSession<KristCodec>>(
    session: &mut Option<T>,
) -> Option<Result<KristWsMessage, KristError>> {
    match session {
        Some(session) => session.next_message().await,
        None => std::future::pending().await,
    }
}
