//! Outbound channel delivery.
//!
//! The engine decides *what* to send and *to whom*; how a message
//! physically reaches a device belongs to an external gateway. Sends are
//! fire-and-confirm with a short timeout — a failed or timed-out send is
//! recorded on the intervention record, never thrown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::model::ContactChannel;

/// Ceiling on how long a single send may block the dispatch path.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one send attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub delivered: bool,
    pub detail: String,
}

impl DeliveryResult {
    fn ok(detail: &str) -> Self {
        Self { delivered: true, detail: detail.to_string() }
    }

    fn failed(detail: &str) -> Self {
        Self { delivered: false, detail: detail.to_string() }
    }
}

/// One message handed to the delivery layer. Retained by the simulated
/// backend for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub channel: ContactChannel,
    pub recipient: String,
    pub message: String,
}

/// Client for an external message-dispatch gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POST one message to the gateway's send endpoint.
    async fn send(&self, message: &OutboundMessage) -> DeliveryResult {
        let url = format!("{}/send", self.base_url);

        let request = self.client.post(&url).json(message).send();
        match tokio::time::timeout(SEND_TIMEOUT, request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                DeliveryResult::ok("accepted by gateway")
            }
            Ok(Ok(response)) => {
                DeliveryResult::failed(&format!("gateway returned {}", response.status()))
            }
            Ok(Err(e)) => DeliveryResult::failed(&format!("gateway error: {e}")),
            Err(_) => DeliveryResult::failed("gateway timed out"),
        }
    }
}

/// In-memory delivery backend.
///
/// Records every send and reports success (or, in failing mode, failure).
/// Used as the default when no gateway is configured and as the test
/// double for dispatch behavior.
#[derive(Clone, Default)]
pub struct SimulatedDelivery {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    fail_all: bool,
}

impl SimulatedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend where every send fails, for exercising failure recording.
    pub fn failing() -> Self {
        Self { sent: Arc::default(), fail_all: true }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("delivery log lock poisoned").clone()
    }

    fn send(&self, message: OutboundMessage) -> DeliveryResult {
        self.sent
            .lock()
            .expect("delivery log lock poisoned")
            .push(message);

        if self.fail_all {
            DeliveryResult::failed("simulated delivery failure")
        } else {
            DeliveryResult::ok("simulated delivery")
        }
    }
}

/// The delivery backend the engine was constructed with.
#[derive(Clone)]
pub enum Delivery {
    Http(GatewayClient),
    Simulated(SimulatedDelivery),
}

impl Delivery {
    /// Send one message. Never errors; failure comes back in the result.
    pub async fn send(
        &self,
        channel: ContactChannel,
        recipient: &str,
        message: &str,
    ) -> DeliveryResult {
        let outbound = OutboundMessage {
            channel,
            recipient: recipient.to_string(),
            message: message.to_string(),
        };

        let result = match self {
            Delivery::Http(gateway) => gateway.send(&outbound).await,
            Delivery::Simulated(simulated) => simulated.send(outbound),
        };

        if !result.delivered {
            warn!(
                channel = channel.label(),
                detail = %result.detail,
                "Outbound delivery failed"
            );
        }

        result
    }
}
