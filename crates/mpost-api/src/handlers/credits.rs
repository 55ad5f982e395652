//! Credit balance and history handlers.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mpost_ledger::TransactionPage;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub credits: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Current ledger balance of the caller.
pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.ledger.get_balance(&user.uid).await?;

    Ok(Json(BalanceResponse {
        user_id: user.uid,
        credits: balance.credits,
        updated_at: balance.updated_at,
    }))
}

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HistoryQuery {
    fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// The caller's purchases, usage and refunds, newest first.
pub async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<TransactionPage>> {
    let page = state
        .ledger
        .transaction_history(&user.uid, query.limit(), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(page))
}
