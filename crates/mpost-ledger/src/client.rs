//! Ledger REST client.
//!
//! The ledger is a managed Postgres exposing stored procedures over
//! PostgREST (`POST /rest/v1/rpc/{function}`). Procedures return a JSON
//! array with a single row. History is a plain table select.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use reqwest::header::CONTENT_RANGE;
use reqwest::Response;
use tracing::{debug, info_span, Instrument};

use mpost_models::CreditTransaction;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{
    AddCreditsReceipt, CreditBalance, Ledger, TransactionPage, TransactionRecord, UseCreditsReceipt,
};
use crate::metrics::record_request;

// =============================================================================
// Configuration
// =============================================================================

/// Ledger client configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the managed database project
    pub url: String,
    /// Service role key used for both `apikey` and bearer auth
    pub service_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> LedgerResult<Self> {
        let url = std::env::var("SUPABASE_URL").unwrap_or_default();
        if url.is_empty() {
            return Err(LedgerError::NotConfigured(
                "SUPABASE_URL must be set to reach the credit ledger".to_string(),
            ));
        }

        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default();
        if service_key.is_empty() {
            return Err(LedgerError::NotConfigured(
                "SUPABASE_SERVICE_ROLE_KEY must be set to reach the credit ledger".to_string(),
            ));
        }

        let timeout_secs: u64 = std::env::var("LEDGER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            ..Self::new(url, service_key)
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// REST client for the ledger's stored procedures.
#[derive(Clone)]
pub struct LedgerClient {
    http: Client,
    config: LedgerConfig,
}

impl LedgerClient {
    /// Create a new ledger client.
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("mpost-ledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LedgerError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> LedgerResult<Self> {
        Self::new(LedgerConfig::from_env()?)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.config.url, function)
    }

    /// Call a stored procedure and decode its first row.
    async fn call_rpc<T: DeserializeOwned>(&self, function: &str, params: Value) -> LedgerResult<Option<T>> {
        let url = self.rpc_url(function);
        let span = info_span!("ledger_rpc", function = %function);

        let start = Instant::now();
        let result = async {
            debug!("Calling ledger procedure {}", function);
            let response = self
                .http
                .post(&url)
                .header("apikey", &self.config.service_key)
                .bearer_auth(&self.config.service_key)
                .json(&params)
                .send()
                .await?;

            let response = check_status(function, response).await?;
            let value: Value = response.json().await?;
            first_row(value)
        }
        .instrument(span)
        .await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(function, status, start.elapsed().as_millis() as f64);

        result
    }
}

/// Turn a non-2xx answer into `LedgerError::Rpc`.
async fn check_status(function: &str, response: Response) -> LedgerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LedgerError::Rpc {
        function: function.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Total from a PostgREST `Content-Range` such as `0-49/123`.
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}

/// Procedures answer with a row array; a bare object or null is tolerated.
fn first_row<T: DeserializeOwned>(value: Value) -> LedgerResult<Option<T>> {
    let row = match value {
        Value::Array(rows) => rows.into_iter().next(),
        Value::Null => None,
        other => Some(other),
    };
    match row {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn get_balance(&self, user_id: &str) -> LedgerResult<CreditBalance> {
        let row: Option<CreditBalance> = self
            .call_rpc("get_user_credits", json!({ "p_user_id": user_id }))
            .await?;

        Ok(row.unwrap_or(CreditBalance {
            credits: 0,
            updated_at: None,
        }))
    }

    async fn use_credits(&self, tx: &CreditTransaction) -> LedgerResult<UseCreditsReceipt> {
        let params = json!({
            "p_user_id": tx.user_id,
            "p_credits": tx.credits(),
            "p_transaction_type": tx.transaction_type.tag(),
            "p_description": tx.description,
        });

        let receipt: UseCreditsReceipt = self
            .call_rpc("use_credits", params)
            .await?
            .ok_or_else(|| LedgerError::invalid_response("use_credits returned no rows"))?;

        if !receipt.success {
            return Err(LedgerError::rejected(
                receipt
                    .message
                    .unwrap_or_else(|| "use_credits refused the debit".to_string()),
            ));
        }
        Ok(receipt)
    }

    async fn add_credits(&self, tx: &CreditTransaction) -> LedgerResult<AddCreditsReceipt> {
        let params = json!({
            "p_user_id": tx.user_id,
            "p_credits": tx.credits(),
            "p_transaction_type": tx.transaction_type.tag(),
            "p_description": tx.description,
            "p_metadata": tx.metadata.clone().unwrap_or_default(),
        });

        let receipt: AddCreditsReceipt = self
            .call_rpc("add_credits", params)
            .await?
            .ok_or_else(|| LedgerError::invalid_response("add_credits returned no rows"))?;

        if !receipt.success {
            return Err(LedgerError::rejected(
                receipt
                    .message
                    .unwrap_or_else(|| "add_credits refused the credit".to_string()),
            ));
        }
        Ok(receipt)
    }

    async fn transaction_history(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> LedgerResult<TransactionPage> {
        let span = info_span!("ledger_select", table = TRANSACTIONS_TABLE);
        let start = Instant::now();
        let result = self
            .select_transactions(user_id, limit, offset)
            .instrument(span)
            .await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(TRANSACTIONS_TABLE, status, start.elapsed().as_millis() as f64);

        result
    }
}

// =============================================================================
// History
// =============================================================================

const TRANSACTIONS_TABLE: &str = "transactions";

impl LedgerClient {
    async fn select_transactions(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> LedgerResult<TransactionPage> {
        let url = format!("{}/rest/v1/{}", self.config.url, TRANSACTIONS_TABLE);
        let user_filter = format!("eq.{}", user_id);
        let limit_param = limit.to_string();
        let offset_param = offset.to_string();

        debug!(user_id = %user_id, limit, offset, "Selecting transaction history");
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .header("Prefer", "count=exact")
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "created_at.desc"),
                ("limit", limit_param.as_str()),
                ("offset", offset_param.as_str()),
            ])
            .send()
            .await?;
        let response = check_status(TRANSACTIONS_TABLE, response).await?;

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range);
        let transactions: Vec<TransactionRecord> = response.json().await?;
        let total = total.unwrap_or(u64::from(offset) + transactions.len() as u64);

        Ok(TransactionPage {
            transactions,
            total,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
