use serde_json::{json, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::event::{normalize_delta, normalize_prime};
use crate::{Error, Result};

/// Thin orchestrator over the portal's REST surface.
///
/// Owns login and the prime snapshot; realtime delta payloads arrive from an
/// external Socket.IO transport and are handed in raw via [`handle_delta`].
/// Consumers must subscribe to the bus *before* calling [`prime`]: the bus
/// never replays, and the snapshot itself is re-published through it as
/// synthetic updates.
///
/// [`handle_delta`]: PortalGateway::handle_delta
/// [`prime`]: PortalGateway::prime
pub struct PortalGateway {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    client_id: String,
    token: Option<String>,
    bus: EventBus,
}

pub struct PortalGatewayBuilder {
    base_url: String,
    email: String,
    password: String,
    client_id: Option<String>,
    bus: Option<EventBus>,
}

impl PortalGatewayBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            email: String::new(),
            password: String::new(),
            client_id: None,
            bus: None,
        }
    }

    pub fn credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.email = email.into();
        self.password = password.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Share an existing bus so consumers can subscribe before the gateway
    /// starts publishing.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> PortalGateway {
        let http = reqwest::Client::builder()
            .build()
            .expect("failed to build HTTP client");
        PortalGateway {
            http,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            email: self.email,
            password: self.password,
            client_id: self.client_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            token: None,
            bus: self.bus.unwrap_or_default(),
        }
    }
}

impl PortalGateway {
    pub fn builder(base_url: impl Into<String>) -> PortalGatewayBuilder {
        PortalGatewayBuilder::new(base_url)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub async fn login(&mut self) -> Result<()> {
        let url = format!("{}/api/auth/login", self.base_url);
        debug!(url = %url, client_id = %self.client_id, "logging in to portal");

        let body = json!({
            "email": self.email,
            "password": self.password,
            "clientId": self.client_id,
        });
        let resp: Value = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let token = resp
            .get("token")
            .or_else(|| resp.get("accessToken"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("login response carried no token".to_string()))?;
        self.token = Some(token.to_string());
        Ok(())
    }

    pub fn logout(&mut self) {
        self.token = None;
    }

    /// Fetch the full REST snapshot and re-publish it through the bus as
    /// normalized updates. Mandatory at startup and after every reconnect:
    /// the realtime transport never replays history. Returns the number of
    /// updates published.
    pub async fn prime(&mut self) -> Result<usize> {
        let token = self.token.as_ref().ok_or(Error::NotAuthenticated)?;
        let url = format!("{}/api/devices/state", self.base_url);
        debug!(url = %url, "fetching prime snapshot");

        let payload: Value = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let updates = normalize_prime(unwrap_devices(&payload));
        let count = updates.len();
        for update in updates {
            self.bus.publish(update);
        }
        debug!(count, "prime snapshot published");
        Ok(count)
    }

    /// Ingest one raw realtime delta payload as delivered by the external
    /// Socket.IO transport. Returns the number of updates published; a
    /// malformed payload publishes nothing and is not an error.
    pub fn handle_delta(&self, payload: &Value) -> usize {
        let updates = normalize_delta(unwrap_devices(payload));
        let count = updates.len();
        for update in updates {
            self.bus.publish(update);
        }
        trace!(count, "delta published");
        count
    }
}

/// Both snapshot and delta payloads may wrap the device map in a `devices`
/// envelope; accept either shape.
fn unwrap_devices(payload: &Value) -> &Value {
    match payload.get("devices") {
        Some(inner @ Value::Object(_)) => inner,
        _ => payload,
    }
}
