use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use planetflare_sdk::settlement::PendingSettlementsResponse;
use planetflare_sdk::token::TokensResponse;
use planetflare_sdk::{FuturePayment, PublisherInfo, RedeemRequest, SettleRequest, SettleResponse};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::PublisherConfig;
use crate::error::{PublisherError, Result};
use crate::issuer::TokenIssuer;
use crate::ledger::{FuturePaymentLedger, PaymentSigner};
use crate::payments::PaymentService;
use crate::redemption::RedemptionService;
use crate::settlement::SettlementQueue;
use crate::token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Everything a request handler needs, built once at startup
pub struct AppState {
    pub config: PublisherConfig,
    pub token_store: Arc<dyn TokenStore>,
    pub issuer: Arc<TokenIssuer>,
    pub ledger: Arc<FuturePaymentLedger>,
    pub payment_service: Arc<PaymentService>,
    pub settlement_queue: Arc<SettlementQueue>,
}

impl AppState {
    pub fn new(config: PublisherConfig) -> anyhow::Result<Self> {
        let token_store: Arc<dyn TokenStore> = match &config.token_store_path {
            Some(path) => Arc::new(FileTokenStore::load(path.clone())),
            None => {
                info!("TOKEN_STORE_PATH is empty, keeping outstanding tokens in memory only");
                Arc::new(MemoryTokenStore::new())
            }
        };
        let signer = Arc::new(PaymentSigner::from_config(&config)?);

        Ok(Self::with_parts(config, token_store, signer))
    }

    pub fn with_parts(
        config: PublisherConfig,
        token_store: Arc<dyn TokenStore>,
        signer: Arc<PaymentSigner>,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::new(
            token_store.clone(),
            config.max_tokens_per_request,
        ));
        let redemption = Arc::new(RedemptionService::new(token_store.clone()));
        let ledger = Arc::new(FuturePaymentLedger::new(signer));
        let settlement_queue = Arc::new(SettlementQueue::new());
        let payment_service = Arc::new(PaymentService::new(
            redemption,
            ledger.clone(),
            settlement_queue.clone(),
        ));

        Self {
            config,
            token_store,
            issuer,
            ledger,
            payment_service,
            settlement_queue,
        }
    }
}

/// All routes with tracing, CORS, body limit and a per-request panic boundary.
/// Rate limiting is added by [`run`] since it needs the peer address.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(get_info))
        // Token issuance for clients
        .route("/get_tokens", get(get_tokens))
        // Token redemption for providers
        .route("/verify_payment", post(verify_payment))
        // Settlement hand-off
        .route("/settle_payment", post(settle_payment))
        .route("/settlements/pending", get(get_pending_settlements))
        // Settler takes ownership of everything queued so far
        .route("/settlements/drain", post(drain_settlements))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(state.config.rate_limit_per_second)
        .burst_size(state.config.rate_limit_burst)
        .key_extractor(tower_governor::key_extractor::SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;

    let app = router(state.clone()).layer(GovernorLayer {
        config: Arc::new(governor_conf),
    });

    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Publisher listening on {} (rate limited: {} req/s per IP)",
        addr, state.config.rate_limit_per_second
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Publisher stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub outstanding_tokens: usize,
}

#[derive(Deserialize)]
struct TokensQuery {
    num: Option<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        outstanding_tokens: state.token_store.len(),
    })
}

async fn get_info(State(state): State<Arc<AppState>>) -> Json<PublisherInfo> {
    let signer = state.ledger.signer();
    Json(PublisherInfo {
        pub_key_n: hex::encode(signer.public_key().n().to_bytes_be()),
        pub_key_e: hex::encode(signer.public_key().e().to_bytes_be()),
        max_tokens_per_request: state.issuer.max_batch(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_tokens(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokensQuery>,
) -> Result<Json<TokensResponse>> {
    let count: u32 = query
        .num
        .as_deref()
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or_else(|| PublisherError::InvalidRequest("num parameter invalid".into()))?;
    info!("Received request to fetch {} tokens", count);

    let issuer = state.issuer.clone();
    let tokens = blocking(move || issuer.issue(count)).await?;
    Ok(Json(TokensResponse { tokens }))
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Json<FuturePayment>> {
    let Json(request) =
        payload.map_err(|rejection| PublisherError::InvalidRequest(rejection.body_text()))?;

    let service = state.payment_service.clone();
    let payment = blocking(move || service.redeem(request)).await?;
    Ok(Json(payment))
}

async fn settle_payment(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SettleRequest>, JsonRejection>,
) -> Result<Json<SettleResponse>> {
    let Json(request) =
        payload.map_err(|rejection| PublisherError::InvalidRequest(rejection.body_text()))?;

    let response = state
        .payment_service
        .settle(request.future_payment)
        .await?;
    Ok(Json(response))
}

async fn get_pending_settlements(
    State(state): State<Arc<AppState>>,
) -> Json<PendingSettlementsResponse> {
    Json(PendingSettlementsResponse {
        pending: state.settlement_queue.pending(),
    })
}

async fn drain_settlements(
    State(state): State<Arc<AppState>>,
) -> Json<PendingSettlementsResponse> {
    let drained = state.settlement_queue.drain();
    info!("Handed {} payments to the settler", drained.len());
    Json(PendingSettlementsResponse { pending: drained })
}

/// Token store writes and RSA signing are synchronous; keep them off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PublisherError::Internal(format!("Worker task failed: {}", e)))?
}
