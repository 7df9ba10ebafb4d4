use crate::analysis::AnalysisService;
use crate::cli::Args;
use crate::error::ApiError;
use crate::models::api::{
    AnalyzeResponse,
    ChatRequest,
    ChatResponse,
    ConversationDetailResponse,
    ConversationListResponse,
    DeleteResponse,
    HealthResponse,
    StartResponse,
};
use crate::session::SessionService;

use axum::{
    extract::{ rejection::JsonRejection, Path, State },
    routing::{ get, post },
    Json,
    Router,
};
use chrono::Utc;
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use log::{ info, warn, error };
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

pub type ChatRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Global token bucket for `POST /chat`; `None` when `per_second` is 0.
pub fn chat_rate_limiter(per_second: u32) -> Option<Arc<ChatRateLimiter>> {
    NonZeroU32::new(per_second).map(|n| Arc::new(RateLimiter::direct(Quota::per_second(n))))
}

#[derive(Clone)]
pub struct AppState {
    pub session: SessionService,
    pub analysis: AnalysisService,
    pub limiter: Option<Arc<ChatRateLimiter>>,
    pub auto_analyze: bool,
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_handler))
        .route("/chat", post(chat_handler))
        .route("/conversations", get(list_handler))
        .route("/conversations/{id}", get(get_handler).delete(delete_handler))
        .route("/conversations/{id}/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .method_not_allowed_fallback(method_not_allowed_handler)
}

/// Every route is served at the root and again under `/api`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .fallback(not_found_handler)
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: SocketAddr,
    state: AppState,
    args: &Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = router(state);

    match (args.enable_tls, &args.tls_cert_path, &args.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;
            info!("HTTPS server listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        }
        (true, _, _) => {
            return Err("TLS enabled but --tls-cert-path and --tls-key-path are not both set".into());
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}

async fn start_handler(State(state): State<AppState>) -> Json<StartResponse> {
    let started = state.session.start().await;
    Json(StartResponse {
        conversation_id: started.id,
        message: "Conversation started successfully".to_string(),
        timestamp: Utc::now(),
    })
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ApiError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Chat rate limit exceeded");
            return Err(ApiError::RateLimited);
        }
    }

    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let (Some(message), Some(session_id)) = (required(req.message), required(req.session_id)) else {
        return Err(ApiError::Validation("Message and sessionId are required".to_string()));
    };

    let response = state.session.append_turn(&session_id, &message).await;

    if state.auto_analyze && state.analysis.webhook_configured() {
        let analysis = state.analysis.clone();
        tokio::spawn(async move {
            if let Err(e) = analysis.auto_analyze(&session_id).await {
                warn!("Auto-analysis of {} failed: {}", session_id, e);
            }
        });
    }

    Ok(Json(ChatResponse { response }))
}

async fn list_handler(State(state): State<AppState>) -> Result<Json<ConversationListResponse>, ApiError> {
    let conversations = state.session.list().await?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let record = state.session
        .get(&id).await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    Ok(
        Json(ConversationDetailResponse {
            conversation_id: record.id.clone(),
            messages: record.display_messages(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            analysis: record.lead_analysis,
        })
    )
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<DeleteResponse>, ApiError> {
    state.session.delete(&id).await?;
    Ok(
        Json(DeleteResponse {
            success: true,
            message: "Conversation deleted successfully".to_string(),
        })
    )
}

async fn analyze_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let outcome = state.analysis.analyze(&id).await?;
    Ok(
        Json(AnalyzeResponse {
            analysis: outcome.analysis,
            webhook_processed: outcome.webhook_processed,
            webhook_data: outcome.webhook_data,
        })
    )
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.session.store();
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        store: store.backend().to_string(),
        store_connected: store.ping().await,
        completion_configured: state.session.completion_configured(),
    })
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}

async fn method_not_allowed_handler() -> ApiError {
    ApiError::MethodNotAllowed
}
