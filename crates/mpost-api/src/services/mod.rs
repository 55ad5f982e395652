//! External service integrations.

pub mod payments;

pub use payments::{
    verify_webhook_signature, CheckoutSession, PaymentError, PaymentsClient, WebhookEvent,
};
