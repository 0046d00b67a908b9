use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;

use pagewatch_core::models::Target;
use pagewatch_core::notify::ChannelSender;
use pagewatch_core::proxy_pool::ProxyEntry;
use pagewatch_core::traits::{PageFetcher, Storage};

use crate::auth::require_api_key;
use crate::dto::{
    CheckResponse, HealthResponse, NotificationTestRequest, NotificationTestResponse,
    ProxyRequest, SchedulerAction, SchedulerActionResponse, SchedulerRequest,
};
use crate::error::ApiError;
use crate::state::AppState;

type SharedState<F, S, C> = State<Arc<AppState<F, S, C>>>;

/// Build the full router: public `/health` plus the bearer-protected `/v1` API.
pub fn router<F, S, C>(state: Arc<AppState<F, S, C>>) -> Router
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    let api = Router::new()
        .route(
            "/v1/scheduler",
            get(scheduler_status::<F, S, C>).post(scheduler_action::<F, S, C>),
        )
        .route(
            "/v1/proxies",
            get(proxy_status::<F, S, C>).post(proxy_action::<F, S, C>),
        )
        .route(
            "/v1/notifications",
            get(notification_status::<F, S, C>).post(notification_test::<F, S, C>),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<F, S, C>,
        ));

    let public = Router::new().route("/health", get(health::<F, S, C>));

    public.merge(api).with_state(state)
}

pub async fn health<F, S, C>(State(state): SharedState<F, S, C>) -> impl IntoResponse
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    let storage_ok = match state.scheduler.storage().health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            false
        }
    };
    health_response(storage_ok, state.scheduler.is_running())
}

fn health_response(storage_ok: bool, scheduler_running: bool) -> (StatusCode, axum::Json<HealthResponse>) {
    let (status, label, storage) = if storage_ok {
        (StatusCode::OK, "healthy", "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "error")
    };
    let response = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: storage.to_string(),
        scheduler_running,
    };
    (status, axum::Json(response))
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub async fn scheduler_status<F, S, C>(State(state): SharedState<F, S, C>) -> impl IntoResponse
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    axum::Json(state.scheduler.status())
}

pub async fn scheduler_action<F, S, C>(
    State(state): SharedState<F, S, C>,
    axum::Json(body): axum::Json<SchedulerRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    let scheduler = &state.scheduler;
    let target_id = || {
        body.target_id
            .ok_or_else(|| ApiError::BadRequest("target_id is required for this action".into()))
    };

    let response = match body.action {
        SchedulerAction::Start => SchedulerActionResponse {
            action: "start".into(),
            scheduled: Some(scheduler.start().await?),
            ..Default::default()
        },
        SchedulerAction::Stop => {
            scheduler.stop();
            SchedulerActionResponse {
                action: "stop".into(),
                ..Default::default()
            }
        }
        SchedulerAction::Check => {
            let outcome = scheduler.check_target(target_id()?).await;
            SchedulerActionResponse {
                action: "check".into(),
                check: Some(CheckResponse::from(outcome)),
                ..Default::default()
            }
        }
        SchedulerAction::CheckAll => SchedulerActionResponse {
            action: "check_all".into(),
            checked: Some(scheduler.check_all().await?),
            ..Default::default()
        },
        SchedulerAction::Reschedule => {
            let scheduled = scheduler.reschedule(target_id()?).await?;
            SchedulerActionResponse {
                action: "reschedule".into(),
                target_scheduled: Some(scheduled),
                ..Default::default()
            }
        }
    };

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// Proxies
// ---------------------------------------------------------------------------

pub async fn proxy_status<F, S, C>(State(state): SharedState<F, S, C>) -> impl IntoResponse
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    axum::Json(state.proxies.status())
}

pub async fn proxy_action<F, S, C>(
    State(state): SharedState<F, S, C>,
    axum::Json(body): axum::Json<ProxyRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    match body {
        ProxyRequest::Add { url, label } => {
            if url.trim().is_empty() {
                return Err(ApiError::BadRequest("url must not be empty".into()));
            }
            let entry = match label {
                Some(label) => ProxyEntry::labelled(url, label),
                None => ProxyEntry::new(url),
            };
            state.proxies.add_proxy(entry);
        }
        ProxyRequest::Set { proxies } => state.proxies.set_proxies(proxies),
        ProxyRequest::Reset => state.proxies.reset_failures(),
    }

    Ok(axum::Json(state.proxies.status()))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub async fn notification_status<F, S, C>(State(state): SharedState<F, S, C>) -> impl IntoResponse
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    axum::Json(state.notifications().status())
}

pub async fn notification_test<F, S, C>(
    State(state): SharedState<F, S, C>,
    axum::Json(body): axum::Json<NotificationTestRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    let target = match body.target {
        Some(id) => state
            .scheduler
            .storage()
            .get_target(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Target {id} not found")))?,
        None => Target::new("https://example.com", "Pagewatch test"),
    };

    state
        .notifications()
        .send_test(body.channel, &target)
        .await?;

    Ok(axum::Json(NotificationTestResponse {
        channel: body.channel,
        sent: true,
    }))
}
