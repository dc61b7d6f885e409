use crate::core::config::KristConfig;
use crate::core::errors::KristError;
use crate::core::kernel::{RateLimiter, WsSessionFactory};
use crate::core::traits::WsStarter;
use crate::core::types::{ConnectionState, PrivateKey, SubscriptionLevel};
use crate::krist::codec::KristCodec;
use crate::krist::connection::{Command, ConnectionManager, RequestSender};
use crate::krist::dispatcher::{EventDispatcher, WsEvent};
use crate::krist::types::{
    AddressResponse, KristAddress, KristRequest, MeResponse, Response, SubscriptionLevelResponse,
    Transaction, TransactionResponse, ValidSubscriptionLevelsResponse, WorkResponse,
};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{info, instrument};

const EVENT_CAPACITY: usize = 256;

/// Handle to a Krist WebSocket connection
///
/// Cheap to clone; every clone drives the same connection. The connection
/// task stops after [`force_close`](Self::force_close) or once every handle
/// has been dropped.
#[derive(Debug, Clone)]
pub struct KristWsClient {
    requests: RequestSender,
    events: broadcast::Sender<WsEvent>,
    state: watch::Receiver<ConnectionState>,
    identity: watch::Receiver<Option<String>>,
}

impl KristWsClient {
    /// Spawn the connection task; must be called within a Tokio runtime
    pub fn spawn<F, S>(factory: F, starter: S, config: &KristConfig, limiter: RateLimiter) -> Self
    where
        F: WsSessionFactory<KristCodec>,
        S: WsStarter,
    {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let dispatcher = EventDispatcher::new(events.clone());
        let (manager, handles) =
            ConnectionManager::new(factory, starter, config, limiter.clone(), dispatcher);
        tokio::spawn(manager.run());

        Self {
            requests: RequestSender::new(handles.commands, limiter),
            events,
            state: handles.state,
            identity: handles.identity,
        }
    }

    /// Start connecting; resolves once the first attempt is under way
    ///
    /// Wallet credentials are turned into a private key on the first call.
    /// Use [`wait_ready`](Self::wait_ready) to wait for the handshake.
    pub async fn connect(&self) -> Result<(), KristError> {
        let (reply, result) = oneshot::channel();
        self.requests.command(Command::Connect { reply })?;
        result.await.map_err(|_| KristError::ClientClosed)?
    }

    /// Close the connection for good; no reconnect follows
    pub async fn force_close(&self) {
        let (done, closed) = oneshot::channel();
        if self.requests.command(Command::Close { done }).is_ok() {
            let _ = closed.await;
        }
    }

    /// Wait until the handshake and subscription sync have finished
    pub async fn wait_ready(&self) -> Result<(), KristError> {
        let mut state = self.state.clone();
        state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| KristError::ClientClosed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<WsEvent> {
        self.events.subscribe()
    }

    /// The address of the fixed private key; `None` for a guest or before connecting
    pub fn own_address(&self) -> Option<String> {
        self.identity.borrow().clone()
    }

    /// Send a raw request and wait for its response
    pub async fn request(&self, request: KristRequest) -> Result<Response, KristError> {
        self.requests.send(request).await
    }

    pub async fn me(&self) -> Result<MeResponse, KristError> {
        self.requests.send_typed(KristRequest::Me).await
    }

    pub async fn address(
        &self,
        address: &str,
        fetch_names: bool,
    ) -> Result<KristAddress, KristError> {
        let response: AddressResponse = self
            .requests
            .send_typed(KristRequest::Address {
                address: address.to_string(),
                fetch_names: fetch_names.then_some(true),
            })
            .await?;
        Ok(response.address)
    }

    /// Authenticate this connection; the key is also used for future reconnects
    #[instrument(skip(self, private_key))]
    pub async fn login(&self, private_key: PrivateKey) -> Result<MeResponse, KristError> {
        let me: MeResponse = self
            .requests
            .send_typed(KristRequest::Login {
                privatekey: private_key.clone(),
            })
            .await?;
        if !me.is_guest {
            info!("logged in");
            self.requests.command(Command::SetKey {
                key: Some(private_key),
            })?;
        }
        Ok(me)
    }

    /// Drop back to a guest connection, now and for future reconnects
    pub async fn logout(&self) -> Result<MeResponse, KristError> {
        let me = self.requests.send_typed(KristRequest::Logout).await?;
        self.requests.command(Command::SetKey { key: None })?;
        Ok(me)
    }

    /// Subscribe this connection to a level; returns the resulting set
    pub async fn subscribe(&self, level: SubscriptionLevel) -> Result<Vec<String>, KristError> {
        let response: SubscriptionLevelResponse = self
            .requests
            .send_typed(KristRequest::Subscribe {
                event: level.as_str().to_string(),
            })
            .await?;
        Ok(response.subscription_level)
    }

    pub async fn unsubscribe(&self, level: SubscriptionLevel) -> Result<Vec<String>, KristError> {
        let response: SubscriptionLevelResponse = self
            .requests
            .send_typed(KristRequest::Unsubscribe {
                event: level.as_str().to_string(),
            })
            .await?;
        Ok(response.subscription_level)
    }

    pub async fn subscription_level(&self) -> Result<Vec<String>, KristError> {
        let response: SubscriptionLevelResponse = self
            .requests
            .send_typed(KristRequest::GetSubscriptionLevel)
            .await?;
        Ok(response.subscription_level)
    }

    pub async fn valid_subscription_levels(&self) -> Result<Vec<String>, KristError> {
        let response: ValidSubscriptionLevelsResponse = self
            .requests
            .send_typed(KristRequest::GetValidSubscriptionLevels)
            .await?;
        Ok(response.valid_subscription_levels)
    }

    #[instrument(skip(self, metadata))]
    pub async fn make_transaction(
        &self,
        to: &str,
        amount: u64,
        metadata: Option<&str>,
    ) -> Result<Transaction, KristError> {
        if amount == 0 {
            return Err(KristError::InvalidArgument(
                "Transaction amount must be positive".to_string(),
            ));
        }
        let response: TransactionResponse = self
            .requests
            .send_typed(KristRequest::MakeTransaction {
                to: to.to_string(),
                amount,
                metadata: metadata.map(str::to_string),
            })
            .await?;
        Ok(response.transaction)
    }

    /// Current mining difficulty
    pub async fn work(&self) -> Result<u64, KristError> {
        let response: WorkResponse = self.requests.send_typed(KristRequest::Work).await?;
        Ok(response.work)
    }
}
