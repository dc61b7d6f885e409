use crate::core::errors::KristError;
use crate::core::kernel::RestClient;
use crate::core::traits::WsStarter;
use crate::core::types::PrivateKey;
use crate::krist::types::{AddressResponse, KristAddress, LoginResponse, ServerStatus, WsStartResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};

/// Typed wrapper over the few HTTP endpoints the client needs
#[derive(Debug, Clone)]
pub struct KristRest<R: RestClient> {
    rest: R,
}

impl<R: RestClient> KristRest<R> {
    pub fn new(rest: R) -> Self {
        Self { rest }
    }

    /// `POST /ws/start`: exchange an optional private key for a one-time URL
    #[instrument(skip_all, fields(guest = private_key.is_none()))]
    pub async fn ws_start(
        &self,
        private_key: Option<&PrivateKey>,
    ) -> Result<WsStartResponse, KristError> {
        let body = private_key.map_or_else(
            || json!({}),
            |key| json!({ "privatekey": key.expose_secret() }),
        );
        let response: WsStartResponse = self.rest.post_json("/ws/start", &body).await?;
        debug!(expires = ?response.expires, "websocket url issued");
        Ok(response)
    }

    /// `GET /motd`: the server status snapshot
    pub async fn motd(&self) -> Result<ServerStatus, KristError> {
        self.rest.get_json("/motd", &[]).await
    }

    #[instrument(skip(self))]
    pub async fn get_address(
        &self,
        address: &str,
        fetch_names: bool,
    ) -> Result<KristAddress, KristError> {
        if address.is_empty() {
            return Err(KristError::InvalidArgument(
                "Address cannot be empty".to_string(),
            ));
        }
        let endpoint = format!("/addresses/{}", address);
        let query: &[(&str, &str)] = if fetch_names {
            &[("fetchNames", "true")]
        } else {
            &[]
        };
        let response: AddressResponse = self.rest.get_json(&endpoint, query).await?;
        Ok(response.address)
    }

    /// `POST /login`: check a private key without opening a socket
    #[instrument(skip_all)]
    pub async fn login(&self, private_key: &PrivateKey) -> Result<LoginResponse, KristError> {
        let body: Value = json!({ "privatekey": private_key.expose_secret() });
        self.rest.post_json("/login", &body).await
    }
}

#[async_trait]
impl<R: RestClient + 'static> WsStarter for KristRest<R> {
    async fn start_ws(&self, private_key: Option<&PrivateKey>) -> Result<String, KristError> {
        Ok(self.ws_start(private_key).await?.url)
    }
}
