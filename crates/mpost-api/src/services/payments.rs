//! Payment processor integration.
//!
//! Checkout sessions are created through the processor's form-encoded REST
//! API. Webhook deliveries are authenticated with the `Stripe-Signature`
//! header: `t=<unix>,v1=<hex hmac>` where the HMAC-SHA256 covers
//! `"{t}.{raw body}"` under the endpoint's signing secret.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info};

use mpost_models::CreditPack;

use crate::config::PaymentsConfig;

type HmacSha256 = Hmac<Sha256>;

/// Event type that credits a purchase.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payments are not configured")]
    NotConfigured,

    #[error("Pack has no price reference: {0}")]
    NoPrice(String),

    #[error("Payment processor error: {0}")]
    Processor(String),

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Malformed signature header")]
    MalformedSignature,

    #[error("Signature timestamp outside tolerance: {0}s")]
    TimestampOutOfTolerance(u64),

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl PaymentError {
    /// Whether the error is a rejected webhook delivery.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            PaymentError::MissingSignature
                | PaymentError::MalformedSignature
                | PaymentError::TimestampOutOfTolerance(_)
                | PaymentError::SignatureMismatch
        )
    }
}

// =============================================================================
// Webhook verification
// =============================================================================

/// Verify a webhook signature header against the raw request body.
///
/// `now` is the current unix time in seconds. Any `v1` entry may match,
/// which covers secret rotation.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), PaymentError> {
    if header.trim().is_empty() {
        return Err(PaymentError::MissingSignature);
    }

    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(PaymentError::MalformedSignature);
    }

    let skew = now.abs_diff(timestamp);
    if skew > tolerance.as_secs() {
        return Err(PaymentError::TimestampOutOfTolerance(skew));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::MalformedSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let matched = signatures
        .iter()
        .any(|sig| bool::from(expected.as_slice().ct_eq(sig.as_slice())));
    if matched {
        Ok(())
    } else {
        Err(PaymentError::SignatureMismatch)
    }
}

/// The parts of a webhook event this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutObject,
}

/// Checkout session object carried by checkout events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PaymentError> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))
    }

    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_COMPLETED
    }
}

impl CheckoutObject {
    /// Buyer id from metadata, falling back to the client reference.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("user_id")
            .map(String::as_str)
            .or(self.client_reference_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn pack_type(&self) -> Option<&str> {
        self.metadata.get("pack_type").map(String::as_str)
    }

    /// Whether the processor reports the session as paid. Missing means paid.
    pub fn is_paid(&self) -> bool {
        self.payment_status
            .as_deref()
            .map_or(true, |s| s == "paid" || s == "no_payment_required")
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// A created checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorBody {
    error: ProcessorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorDetail {
    message: String,
}

/// Client for the payment processor's REST API.
pub struct PaymentsClient {
    http: Client,
    secret_key: String,
    api_base: String,
}

impl PaymentsClient {
    /// Create a client. Fails when no secret key is configured.
    pub fn new(config: &PaymentsConfig) -> Result<Self, PaymentError> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or(PaymentError::NotConfigured)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("mpost-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            secret_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create a one-off payment session for a credit pack.
    pub async fn create_checkout_session(
        &self,
        pack: &CreditPack,
        user_id: &str,
        email: Option<&str>,
        frontend_url: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let price_id = pack
            .price_id
            .as_deref()
            .ok_or_else(|| PaymentError::NoPrice(pack.pack_type.as_str().to_string()))?;

        let mut form: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", frontend_url),
            ),
            ("cancel_url", format!("{}/pricing?canceled=true", frontend_url)),
            ("client_reference_id", user_id.to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[pack_type]", pack.pack_type.as_str().to_string()),
            ("metadata[credits]", pack.credits.to_string()),
        ];
        if let Some(email) = email {
            form.push(("customer_email", email.to_string()));
        }

        debug!(pack = %pack.pack_type, user_id = %user_id, "Creating checkout session");

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProcessorErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(PaymentError::Processor(format!("{}: {}", status, message)));
        }

        let session: CheckoutSession = response.json().await?;
        info!(session_id = %session.id, pack = %pack.pack_type, user_id = %user_id, "Checkout session created");
        Ok(session)
    }
}
