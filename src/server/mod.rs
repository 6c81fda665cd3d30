//! HTTP JSON API driving the supervisor.
//!
//! Thin transport layer: every route maps onto one core operation and
//! translates its error taxonomy to a status code. No authentication
//! and no HTML; this is an internal control surface.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::account::{AccountSnapshot, AccountStore};
use crate::error::AccountError;
use crate::supervisor::{StartOutcome, TaskSupervisor};

/// Shared state for the API.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<AccountStore>,
    pub supervisor: Arc<TaskSupervisor>,
}

#[derive(Debug, Deserialize)]
pub struct AddAccountRequest {
    pub uid: String,
    pub token: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub target_level: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OkResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            ok: true,
            message: None,
        })
    }

    fn with_message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            ok: true,
            message: Some(message.into()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountSnapshot>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: AccountError) -> ApiError {
    let status = match e {
        AccountError::NotFound { .. } => StatusCode::NOT_FOUND,
        AccountError::InvalidTargetLevel { .. }
        | AccountError::AlreadyExists { .. }
        | AccountError::AccountLimit { .. } => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: e.to_string(),
        }),
    )
}

/// The control API server.
pub struct ApiServer;

impl ApiServer {
    /// Build the axum router.
    pub fn router(state: ApiState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/accounts", get(list_accounts).post(add_account))
            .route("/accounts/{uid}", delete(remove_account))
            .route("/accounts/{uid}/start", post(start_account))
            .route("/accounts/{uid}/stop", post(stop_account))
            .route("/accounts/{uid}/reset_today", post(reset_today))
            .with_state(state)
    }

    /// Serve the API on the given address until the process exits.
    pub async fn start(state: ApiState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
        let router = Self::router(state);
        tracing::info!("Control API listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn list_accounts(State(state): State<ApiState>) -> Json<AccountsResponse> {
    Json(AccountsResponse {
        accounts: state.supervisor.list().await,
    })
}

async fn add_account(
    State(state): State<ApiState>,
    Json(req): Json<AddAccountRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .store
        .add(&req.uid, SecretString::from(req.token), &req.display_name)
        .await
        .map_err(api_error)?;
    Ok(OkResponse::ok())
}

async fn remove_account(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .supervisor
        .remove_account(&uid)
        .await
        .map_err(api_error)?;
    Ok(OkResponse::ok())
}

async fn start_account(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<OkResponse>, ApiError> {
    let target_level = body.and_then(|Json(req)| req.target_level);
    let outcome = state
        .supervisor
        .start(&uid, target_level)
        .await
        .map_err(api_error)?;
    Ok(match outcome {
        StartOutcome::Started => OkResponse::ok(),
        StartOutcome::AlreadyRunning => OkResponse::with_message("already running"),
    })
}

async fn stop_account(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state.supervisor.stop(&uid).await.map_err(api_error)?;
    Ok(OkResponse::ok())
}

async fn reset_today(
    State(state): State<ApiState>,
    Path(uid): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .supervisor
        .reset_today(&uid)
        .await
        .map_err(api_error)?;
    Ok(OkResponse::ok())
}
