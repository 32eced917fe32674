use crate::{
    api::{
        error::ApiError,
        response::{accepted, ApiResponse},
        stream::{stream_blocks, stream_history},
    },
    models::{RamPrice, SendTxResponse, TrackedUser, WatchAddress},
    state::AppState,
    validation::{validate_account_name, validate_contract, validate_symbol},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

// POST /resync body
#[derive(Deserialize)]
pub struct ResyncRequest {
    pub address: String,
}

// POST /sync-state body
#[derive(Deserialize)]
pub struct SyncStateRequest {
    pub head_block_num: u32,
}

// GET /balances query parameters
#[derive(Deserialize)]
pub struct BalanceQuery {
    pub account: String,
    pub symbol: String,
    #[serde(default)]
    pub code: String,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/service-info", get(service_info))
        .route("/tracked", post(add_new_address).put(initial_add))
        .route("/resync", post(resync_address))
        .route("/sync-state", post(sync_state))
        .route("/block-height", get(block_height))
        .route("/chain-state", get(chain_state))
        .route("/accounts/{name}", get(account_check))
        .route("/accounts/{name}/balance", get(address_balance))
        .route("/balances", get(token_balance))
        .route("/ram-price", get(ram_price))
        .route("/transactions", post(send_raw_tx))
        .route("/stream/blocks", get(stream_blocks))
        .route("/stream/history", get(stream_history))
        .with_state(app_state)
}

async fn service_info(State(state): State<Arc<AppState>>) -> Response {
    ApiResponse::new(state.service.service_info()).into_response()
}

// PUT /tracked replaces the whole tracked set
async fn initial_add(
    State(state): State<Arc<AppState>>,
    Json(users): Json<HashMap<String, TrackedUser>>,
) -> Result<Response, ApiError> {
    for account in users.keys() {
        validate_account_name(account)?;
    }

    let count = users.len();
    state.service.initial_add(users).await;
    Ok(ApiResponse::new(json!({ "tracked": count })).into_response())
}

async fn add_new_address(
    State(state): State<Arc<AppState>>,
    Json(watch): Json<WatchAddress>,
) -> Result<Response, ApiError> {
    validate_account_name(&watch.address)?;

    state.service.add_new_address(&watch).await;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(watch))).into_response())
}

async fn resync_address(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResyncRequest>,
) -> Result<Response, ApiError> {
    validate_account_name(&request.address)?;

    info!("Processing resync request for address: {}", request.address);
    state.service.resync_address(&request.address).await?;
    Ok(accepted(json!({ "address": request.address })))
}

async fn sync_state(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncStateRequest>,
) -> Response {
    state.service.sync_state(request.head_block_num);
    ApiResponse::new(json!({ "start_block": request.head_block_num })).into_response()
}

async fn block_height(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let height = state.service.block_height().await?;
    Ok(ApiResponse::new(height).into_response())
}

async fn chain_state(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let chain = state.service.chain_state().await?;
    Ok(ApiResponse::new(chain).into_response())
}

async fn account_check(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    validate_account_name(&name)?;

    let account = state.service.account_check(&name).await;
    Ok(ApiResponse::new(account).into_response())
}

async fn address_balance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    validate_account_name(&name)?;

    let balance = state.service.address_balance(&name).await?;
    Ok(ApiResponse::new(balance).into_response())
}

async fn token_balance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BalanceQuery>,
) -> Result<Response, ApiError> {
    validate_account_name(&params.account)?;
    validate_symbol(&params.symbol)?;
    validate_contract(&params.code)?;

    let balances = state
        .service
        .token_balance(&params.account, &params.symbol, &params.code)
        .await?;
    Ok(ApiResponse::new(balances).into_response())
}

async fn ram_price(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let price = state.service.ram_price().await?;
    Ok(ApiResponse::new(RamPrice { price }).into_response())
}

async fn send_raw_tx(
    State(state): State<Arc<AppState>>,
    Json(transaction): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    if !transaction.is_object() {
        return Err(ApiError::BadRequest("transaction must be a JSON object".to_string()));
    }

    let transaction_id = state.service.send_raw_tx(&transaction).await?;
    Ok(ApiResponse::new(SendTxResponse { transaction_id }).into_response())
}
