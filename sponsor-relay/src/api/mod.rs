//! REST API server module
//!
//! Routes:
//! - `GET  /health` liveness check
//! - `GET  /sponsor` fee payer public key
//! - `POST /sponsor` validate and relay a base64 transaction
//! - `GET  /accounts/{owner}` token accounts with close/burn eligibility
//! - `POST /build` unsigned close or burn transaction for an owner

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Reply};

use crate::accounts::AssessedAccount;
use crate::builder::{BuildError, BuildMode};
use crate::config::Config;
use crate::service::SponsorService;

/// Upper bound for request bodies; a maximum-size transaction is 1232 bytes
const MAX_BODY_BYTES: u64 = 16 * 1024;

// ============================================================================
// REQUEST AND RESPONSE TYPES
// ============================================================================

/// Body of `POST /sponsor`
#[derive(Debug, Deserialize)]
pub struct SponsorRequest {
    pub transaction: Option<String>,
}

/// Error body returned by every failing route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of `GET /sponsor`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePayerResponse {
    pub fee_payer: String,
}

/// Body of `POST /build`
#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub owner: String,
    pub mode: BuildMode,
}

/// Body of `GET /accounts/{owner}`
#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub owner: String,
    pub accounts: Vec<AssessedAccount>,
}

// ============================================================================
// SERVER
// ============================================================================

/// REST API server
pub struct ApiServer {
    config: Config,
    service: Arc<SponsorService>,
}

impl ApiServer {
    pub fn new(config: Config, service: SponsorService) -> Self {
        Self {
            config,
            service: Arc::new(service),
        }
    }

    /// Builds the service from configuration and wraps it in a server
    pub fn from_config(config: Config) -> Result<Self> {
        let service = SponsorService::new(&config)?;
        Ok(Self::new(config, service))
    }

    /// All API routes
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
        let service = self.service.clone();
        let with_service = warp::any().map(move || service.clone());

        let health = warp::path!("health")
            .and(warp::get())
            .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

        let fee_payer = warp::path!("sponsor")
            .and(warp::get())
            .and(with_service.clone())
            .map(|service: Arc<SponsorService>| {
                warp::reply::json(&FeePayerResponse {
                    fee_payer: service.fee_payer().to_string(),
                })
            });

        let sponsor = warp::path!("sponsor")
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::bytes())
            .and(with_service.clone())
            .and_then(handle_sponsor);

        let accounts = warp::path!("accounts" / String)
            .and(warp::get())
            .and(with_service.clone())
            .and_then(handle_accounts);

        let build = warp::path!("build")
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::bytes())
            .and(with_service)
            .and_then(handle_build);

        health.or(fee_payer).or(sponsor).or(accounts).or(build)
    }

    /// Routes for `warp::test` requests
    pub fn test_routes(
        &self,
    ) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
        self.routes()
    }

    /// Serves the API until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.api.host, self.config.api.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid API address {}:{}",
                    self.config.api.host, self.config.api.port
                )
            })?;

        let routes = self.routes().with(warp::trace::request());
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("Failed to bind API server to {}", addr))?;

        info!("API server listening on {}", bound);
        server.await;
        info!("API server stopped");
        Ok(())
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn error_reply(status: StatusCode, message: impl Into<String>) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse {
            error: message.into(),
        }),
        status,
    )
}

async fn handle_sponsor(
    body: Bytes,
    service: Arc<SponsorService>,
) -> Result<JsonReply, Infallible> {
    let request: SponsorRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed sponsor request: {}", e);
            return Ok(error_reply(StatusCode::BAD_REQUEST, "Invalid JSON body"));
        }
    };

    let transaction = match request.transaction.as_deref().map(str::trim) {
        Some(transaction) if !transaction.is_empty() => transaction,
        _ => return Ok(error_reply(StatusCode::BAD_REQUEST, "Transaction is required")),
    };

    match service.sponsor(transaction).await {
        Ok(outcome) => Ok(warp::reply::with_status(
            warp::reply::json(&outcome),
            StatusCode::OK,
        )),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!("Sponsor request failed: {}", e);
            }
            Ok(error_reply(status, e.to_string()))
        }
    }
}

async fn handle_accounts(
    owner: String,
    service: Arc<SponsorService>,
) -> Result<JsonReply, Infallible> {
    let owner_key = match Pubkey::from_str(&owner) {
        Ok(owner_key) => owner_key,
        Err(_) => {
            return Ok(error_reply(
                StatusCode::BAD_REQUEST,
                format!("Invalid owner address: {}", owner),
            ))
        }
    };

    match service.scan_accounts(&owner_key).await {
        Ok(accounts) => Ok(warp::reply::with_status(
            warp::reply::json(&AccountsResponse { owner, accounts }),
            StatusCode::OK,
        )),
        Err(e) => {
            error!("Account scan for {} failed: {:#}", owner, e);
            Ok(error_reply(StatusCode::BAD_GATEWAY, format!("{:#}", e)))
        }
    }
}

async fn handle_build(body: Bytes, service: Arc<SponsorService>) -> Result<JsonReply, Infallible> {
    let request: BuildRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed build request: {}", e);
            return Ok(error_reply(StatusCode::BAD_REQUEST, "Invalid JSON body"));
        }
    };

    let owner = match Pubkey::from_str(&request.owner) {
        Ok(owner) => owner,
        Err(_) => {
            return Ok(error_reply(
                StatusCode::BAD_REQUEST,
                format!("Invalid owner address: {}", request.owner),
            ))
        }
    };

    match service.build_transaction(&owner, request.mode).await {
        Ok(built) => Ok(warp::reply::with_status(
            warp::reply::json(&built),
            StatusCode::OK,
        )),
        Err(e) => match e.downcast_ref::<BuildError>() {
            Some(build_error @ BuildError::NoEligibleAccounts { .. }) => {
                Ok(error_reply(StatusCode::BAD_REQUEST, build_error.to_string()))
            }
            _ => {
                error!("Building transaction for {} failed: {:#}", owner, e);
                Ok(error_reply(StatusCode::BAD_GATEWAY, format!("{:#}", e)))
            }
        },
    }
}
