//! Credit purchase handlers: checkout creation and the processor webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mpost_ledger::purchase_credits;
use mpost_models::PackType;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::{sanitize_string, MAX_FIELD_LENGTH};
use crate::services::{verify_webhook_signature, WebhookEvent};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub pack_type: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Start a hosted checkout for a credit pack.
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let pack_type: PackType = sanitize_string(&request.pack_type, MAX_FIELD_LENGTH).parse()?;

    let pack = state
        .pack(pack_type)
        .filter(|p| p.purchasable)
        .ok_or_else(|| ApiError::bad_request(format!("The {} pack cannot be purchased", pack_type)))?;

    let payments = state
        .payments
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Payments are not configured".to_string()))?;

    let session = payments
        .create_checkout_session(
            pack,
            &user.uid,
            user.email.as_deref(),
            &state.config.frontend_url,
        )
        .await?;

    metrics::record_checkout_created(pack_type.as_str());

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_added: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl WebhookResponse {
    fn ignored() -> Self {
        Self {
            status: "ignored",
            credits_added: None,
            credits_total: None,
            code: None,
        }
    }
}

/// Payment processor webhook.
///
/// Only `checkout.session.completed` credits anything. The credited amount
/// comes from the pack catalog, not from event metadata. Ledger failures
/// answer 502 so the processor redelivers.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let secret = state
        .config
        .payments
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Webhook secret is not configured".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Err(e) = verify_webhook_signature(
        &body,
        signature,
        secret,
        state.config.payments.webhook_tolerance,
        Utc::now().timestamp(),
    ) {
        warn!(error = %e, "Rejected webhook delivery");
        metrics::record_webhook_event("unknown", "rejected");
        return Err(e.into());
    }

    let event = WebhookEvent::parse(&body)?;

    if !event.is_checkout_completed() {
        info!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
        metrics::record_webhook_event(&event.event_type, "ignored");
        return Ok(Json(WebhookResponse::ignored()));
    }

    let session = &event.data.object;
    if !session.is_paid() {
        info!(event_id = %event.id, session_id = %session.id, "Checkout not paid yet");
        metrics::record_webhook_event(&event.event_type, "ignored");
        return Ok(Json(WebhookResponse::ignored()));
    }

    let user_id = session
        .user_id()
        .ok_or_else(|| ApiError::bad_request("Checkout session has no user_id"))?;
    let pack_type: PackType = session
        .pack_type()
        .ok_or_else(|| ApiError::bad_request("Checkout session has no pack_type"))?
        .parse()?;
    let pack = state
        .pack(pack_type)
        .filter(|p| p.purchasable)
        .ok_or_else(|| ApiError::bad_request(format!("Pack {} is not purchasable", pack_type)))?;

    let receipt = match purchase_credits(state.ledger.as_ref(), user_id, pack, &session.id).await {
        Ok(receipt) => receipt,
        Err(e) => {
            metrics::record_webhook_event(&event.event_type, "ledger_error");
            return Err(e.into());
        }
    };

    metrics::record_webhook_event(&event.event_type, "credited");
    info!(
        event_id = %event.id,
        session_id = %session.id,
        user_id = %user_id,
        pack = %pack_type,
        credits = receipt.credits,
        "Purchase credited"
    );

    Ok(Json(WebhookResponse {
        status: "success",
        credits_added: Some(receipt.credits),
        credits_total: Some(receipt.credits_total),
        code: Some(receipt.code),
    }))
}
