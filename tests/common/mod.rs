#![allow(dead_code)]

use async_trait::async_trait;
use kristlink::core::kernel::{RateLimiter, WsCodec, WsSession, WsSessionFactory};
use kristlink::krist::KristCodec;
use kristlink::{build_client_with, KristConfig, KristError, KristWsClient, PrivateKey, WsEvent, WsStarter};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct NetState {
    fail_starts: usize,
    refuse_connects: usize,
    started_keys: Vec<Option<String>>,
    accepted: Option<mpsc::UnboundedSender<MockConnection>>,
}

/// In-process stand-in for both `/ws/start` and the WebSocket endpoint
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetState>>,
}

impl MockNetwork {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockConnection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let network = Self::default();
        network.state.lock().unwrap().accepted = Some(tx);
        (network, rx)
    }

    /// Make the next `n` calls to `/ws/start` fail
    pub fn fail_starts(&self, n: usize) {
        self.state.lock().unwrap().fail_starts = n;
    }

    /// Make the next `n` transport opens fail
    pub fn refuse_connects(&self, n: usize) {
        self.state.lock().unwrap().refuse_connects = n;
    }

    /// Keys passed to `/ws/start`, one entry per attempt
    pub fn started_keys(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().started_keys.clone()
    }
}

#[async_trait]
impl WsStarter for MockNetwork {
    async fn start_ws(&self, private_key: Option<&PrivateKey>) -> Result<String, KristError> {
        let mut state = self.state.lock().unwrap();
        state
            .started_keys
            .push(private_key.map(|k| k.expose_secret().to_string()));
        if state.fail_starts > 0 {
            state.fail_starts -= 1;
            return Err(KristError::NetworkError("ws/start refused".to_string()));
        }
        Ok(format!("ws://mock/{}", state.started_keys.len()))
    }
}

impl WsSessionFactory<KristCodec> for MockNetwork {
    type Session = MockSession;

    fn create(&self, url: &str) -> MockSession {
        MockSession {
            url: url.to_string(),
            network: self.clone(),
            inbound: None,
            outbound: None,
            connected: false,
            codec: KristCodec::new(),
        }
    }
}

pub struct MockSession {
    url: String,
    network: MockNetwork,
    inbound: Option<mpsc::UnboundedReceiver<Message>>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    connected: bool,
    codec: KristCodec,
}

#[async_trait]
impl WsSession<KristCodec> for MockSession {
    async fn connect(&mut self) -> Result<(), KristError> {
        let mut state = self.network.state.lock().unwrap();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(KristError::NetworkError("connection refused".to_string()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let connection = MockConnection {
            url: self.url.clone(),
            to_client: Some(to_client),
            from_client,
        };
        if let Some(accepted) = &state.accepted {
            let _ = accepted.send(connection);
        }
        self.inbound = Some(inbound);
        self.outbound = Some(outbound);
        self.connected = true;
        Ok(())
    }

    async fn send_raw(&mut self, msg: Message) -> Result<(), KristError> {
        if !self.connected {
            return Err(KristError::NotConnected);
        }
        let outbound = self.outbound.as_ref().ok_or(KristError::NotConnected)?;
        outbound.send(msg).map_err(|_| {
            self.connected = false;
            KristError::NetworkError("peer went away".to_string())
        })
    }

    async fn send_request(
        &mut self,
        id: u64,
        request: &<KristCodec as WsCodec>::Request,
    ) -> Result<(), KristError> {
        let message = self.codec.encode_request(id, request)?;
        self.send_raw(message).await
    }

    async fn next_raw(&mut self) -> Option<Result<Message, KristError>> {
        let inbound = self.inbound.as_mut()?;
        match inbound.recv().await {
            Some(Message::Close(frame)) => {
                self.connected = false;
                Some(Ok(Message::Close(frame)))
            }
            Some(message) => Some(Ok(message)),
            None => {
                self.connected = false;
                None
            }
        }
    }

    async fn next_message(
        &mut self,
    ) -> Option<Result<<KristCodec as WsCodec>::Message, KristError>> {
        loop {
            match self.next_raw().await? {
                Ok(Message::Close(_)) => return None,
                Ok(message) => match self.codec.decode_message(message) {
                    Ok(Some(decoded)) => return Some(Ok(decoded)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), KristError> {
        self.connected = false;
        self.inbound = None;
        self.outbound = None;
        Ok(())
    }
}

/// The server side of one accepted connection
pub struct MockConnection {
    pub url: String,
    to_client: Option<mpsc::UnboundedSender<Message>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl MockConnection {
    pub fn push(&self, value: Value) {
        self.push_raw(&value.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(to_client) = &self.to_client {
            let _ = to_client.send(Message::Text(text.to_string()));
        }
    }

    /// Next request from the client, `None` once the client closed the transport
    pub async fn next_request(&mut self) -> Option<Value> {
        loop {
            if let Message::Text(text) = self.from_client.recv().await? {
                return serde_json::from_str(&text).ok();
            }
        }
    }

    pub async fn expect_request(&mut self, kind: &str) -> Value {
        let request = tokio::time::timeout(Duration::from_secs(30), self.next_request())
            .await
            .expect("timed out waiting for a request")
            .expect("transport closed while waiting for a request");
        assert_eq!(request["type"], kind, "unexpected request {}", request);
        request
    }

    pub fn reply(&self, request: &Value, body: Value) {
        let mut message = json!({
            "ok": true,
            "id": request["id"],
            "type": "response",
            "responding_to_type": request["type"],
        });
        if let (Some(target), Value::Object(extra)) = (message.as_object_mut(), body) {
            target.extend(extra);
        }
        self.push(message);
    }

    pub fn reply_error(&self, request: &Value, error: &str) {
        self.push(json!({
            "ok": false,
            "id": request["id"],
            "type": "error",
            "error": error,
        }));
    }

    pub fn hello(&self) {
        self.push(hello_json());
    }

    /// Send `hello` and serve the subscription sync the client runs after it
    pub async fn handshake(&mut self, actual: &[&str], desired: &[&str]) {
        self.hello();
        let mut levels: BTreeSet<String> = actual.iter().map(|s| (*s).to_string()).collect();
        let wanted: BTreeSet<String> = desired.iter().map(|s| (*s).to_string()).collect();
        let mutations = levels.symmetric_difference(&wanted).count();

        let request = self.expect_request("get_subscription_level").await;
        self.reply(&request, json!({ "subscription_level": levels }));

        for _ in 0..mutations {
            let request = tokio::time::timeout(Duration::from_secs(30), self.next_request())
                .await
                .expect("timed out waiting for a subscription change")
                .expect("transport closed during sync");
            let event = request["event"].as_str().unwrap_or_default().to_string();
            match request["type"].as_str() {
                Some("subscribe") => {
                    levels.insert(event);
                }
                Some("unsubscribe") => {
                    levels.remove(&event);
                }
                other => panic!("unexpected request during sync: {:?}", other),
            }
            self.reply(&request, json!({ "subscription_level": levels }));
        }
    }

    /// Drop the server side; the client sees the transport end
    pub fn disconnect(&mut self) {
        self.to_client = None;
        self.from_client.close();
    }
}

pub fn hello_json() -> Value {
    json!({
        "ok": true,
        "type": "hello",
        "server_time": "2024-05-01T12:00:00.000Z",
        "motd": "Welcome to Krist!",
        "set": "2024-04-01T00:00:00.000Z",
        "motd_set": "2024-04-01T00:00:00.000Z",
        "public_url": "krist.dev",
        "public_ws_url": "ws.krist.dev",
        "mining_enabled": false,
        "transactions_enabled": true,
        "debug_mode": false,
        "work": 100000,
        "currency": {"address_prefix": "k", "name_suffix": "kst", "currency_name": "Krist", "currency_symbol": "KST"}
    })
}

/// Route client logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> KristConfig {
    init_tracing();
    KristConfig::new()
        .sync_node("http://mock.invalid")
        .reconnect_delays(Duration::from_secs(1), Duration::from_secs(16))
}

pub fn spawn_client(network: &MockNetwork, config: KristConfig) -> KristWsClient {
    build_client_with(config, RateLimiter::unlimited(), network.clone(), network.clone())
        .expect("valid test configuration")
}

pub async fn accept(connections: &mut mpsc::UnboundedReceiver<MockConnection>) -> MockConnection {
    tokio::time::timeout(Duration::from_secs(120), connections.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("network dropped")
}

/// Wait for the first event matching `pred`, skipping others
pub async fn wait_event<P>(events: &mut broadcast::Receiver<WsEvent>, mut pred: P) -> WsEvent
where
    P: FnMut(&WsEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}
