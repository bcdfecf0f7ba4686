//! REST API handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use clusterlet_core::{
    display_timestamp, ClusterSummary, ClusterletError, Node, NodeStatus, Pod, PodStatus,
};
use clusterlet_scheduler::Scheduler;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// Create the API router
pub fn create_router(scheduler: Arc<Scheduler>) -> Router {
    let state = Arc::new(AppState { scheduler });

    Router::new()
        .route("/nodes", post(add_node).get(list_nodes))
        .route("/nodes/:id", get(get_node))
        .route("/nodes/:id/heartbeat", post(heartbeat))
        .route("/nodes/:id/stop", post(stop_node))
        .route("/nodes/:id/resume", post(resume_node))
        .route("/nodes/:id/recover", post(recover_node))
        .route("/pods", post(launch_pod).get(list_pods))
        .route("/pods/:id", get(get_pod))
        .route("/status", get(get_status))
        .fallback(endpoint_not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn now_string() -> String {
    display_timestamp(Utc::now())
}

/// Error body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub timestamp: String,
}

/// Scheduler error rendered as an HTTP response
pub struct ApiError(ClusterletError);

impl From<ClusterletError> for ApiError {
    fn from(err: ClusterletError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ClusterletError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClusterletError::NodeNotFound(_) | ClusterletError::PodNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ClusterletError::InsufficientCapacity(_) => StatusCode::CONFLICT,
            ClusterletError::ResourceProvisioning(_) => StatusCode::BAD_GATEWAY,
            other => {
                error!(error = %other, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.0.to_string(),
            timestamp: now_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Extract a positive integer CPU count from a JSON body field
fn cpu_field(body: Result<Json<Value>, JsonRejection>, field: &str) -> Result<u32, ApiError> {
    let missing = || ClusterletError::InvalidInput(format!("Missing '{}' in request", field));

    let Json(body) = body.map_err(|_| missing())?;
    let value = body.get(field).ok_or_else(missing)?;

    value
        .as_u64()
        .filter(|&cpu| cpu > 0)
        .and_then(|cpu| u32::try_from(cpu).ok())
        .ok_or_else(|| {
            ApiError(ClusterletError::InvalidInput(format!(
                "Invalid {} (must be positive integer)",
                field
            )))
        })
}

/// Node as rendered by the API
#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub id: String,
    pub cpu_cores: u32,
    pub available_cpu: u32,
    pub status: NodeStatus,
    pub pods: Vec<String>,
    pub created_at: String,
    pub last_heartbeat: String,
    pub recovery_requested: bool,
}

impl From<Node> for NodeResponse {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            cpu_cores: node.total_cpu,
            available_cpu: node.available_cpu,
            status: node.status,
            pods: node.pods,
            created_at: display_timestamp(node.created_at),
            last_heartbeat: display_timestamp(node.last_heartbeat),
            recovery_requested: node.recovery_requested,
        }
    }
}

/// Pod as rendered by the API
#[derive(Debug, Serialize)]
pub struct PodResponse {
    pub id: String,
    pub node_id: Option<String>,
    pub cpu_required: u32,
    pub status: PodStatus,
    pub created_at: String,
}

impl From<Pod> for PodResponse {
    fn from(pod: Pod) -> Self {
        Self {
            id: pod.id,
            node_id: pod.node_id,
            cpu_required: pod.cpu_required,
            status: pod.status,
            created_at: display_timestamp(pod.created_at),
        }
    }
}

/// Response after registering a node
#[derive(Debug, Serialize)]
pub struct AddNodeResponse {
    pub node_id: String,
    pub message: String,
    pub available_cpu: u32,
    pub timestamp: String,
}

/// Register a new node
async fn add_node(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<AddNodeResponse>), ApiError> {
    let cpu_cores = cpu_field(body, "cpu_cores")?;
    info!(cpu_cores, "Registering node");

    let node_id = state.scheduler.register_node(cpu_cores).await?;

    Ok((
        StatusCode::CREATED,
        Json(AddNodeResponse {
            message: format!("Node {} added successfully", node_id),
            node_id,
            available_cpu: cpu_cores,
            timestamp: now_string(),
        }),
    ))
}

/// Node listing
#[derive(Debug, Serialize)]
pub struct NodeListResponse {
    pub nodes: Vec<NodeResponse>,
    pub total_nodes: usize,
    pub last_updated: String,
}

/// List all nodes
async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<NodeListResponse> {
    let nodes: Vec<NodeResponse> = state
        .scheduler
        .list_nodes()
        .await
        .into_iter()
        .map(NodeResponse::from)
        .collect();

    Json(NodeListResponse {
        total_nodes: nodes.len(),
        nodes,
        last_updated: now_string(),
    })
}

/// Get a specific node
async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state.scheduler.get_node(&id).await?;
    Ok(Json(node.into()))
}

/// Record a heartbeat
async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    state.scheduler.record_heartbeat(&id).await?;
    Ok(Json(state.scheduler.get_node(&id).await?.into()))
}

/// Stop a node and drain its pods
async fn stop_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    info!(node_id = %id, "Stopping node");
    state.scheduler.stop_node(&id).await?;
    Ok(Json(state.scheduler.get_node(&id).await?.into()))
}

/// Resume a node
async fn resume_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    info!(node_id = %id, "Resuming node");
    state.scheduler.resume_node(&id).await?;
    Ok(Json(state.scheduler.get_node(&id).await?.into()))
}

/// Mark a failed node recovered
async fn recover_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    state.scheduler.mark_recovered(&id).await?;
    Ok(Json(state.scheduler.get_node(&id).await?.into()))
}

/// Response after launching a pod
#[derive(Debug, Serialize)]
pub struct LaunchPodResponse {
    pub pod_id: String,
    pub node_id: Option<String>,
    pub cpu_required: u32,
    pub message: String,
    pub timestamp: String,
}

/// Launch a pod
async fn launch_pod(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<LaunchPodResponse>), ApiError> {
    let cpu_required = cpu_field(body, "cpu_required")?;

    let pod_id = state.scheduler.launch_pod(cpu_required).await?;
    let pod = state.scheduler.get_pod(&pod_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(LaunchPodResponse {
            message: format!(
                "Pod {} launched on {}",
                pod_id,
                pod.node_id.as_deref().unwrap_or("-")
            ),
            pod_id,
            node_id: pod.node_id,
            cpu_required,
            timestamp: now_string(),
        }),
    ))
}

/// Pod listing
#[derive(Debug, Serialize)]
pub struct PodListResponse {
    pub pods: Vec<PodResponse>,
    pub total_pods: usize,
    pub last_updated: String,
}

/// List all pods
async fn list_pods(State(state): State<Arc<AppState>>) -> Json<PodListResponse> {
    let pods: Vec<PodResponse> = state
        .scheduler
        .list_pods()
        .await
        .into_iter()
        .map(PodResponse::from)
        .collect();

    Json(PodListResponse {
        total_pods: pods.len(),
        pods,
        last_updated: now_string(),
    })
}

/// Get a specific pod
async fn get_pod(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PodResponse>, ApiError> {
    let pod = state.scheduler.get_pod(&id).await?;
    Ok(Json(pod.into()))
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub backend: String,
    #[serde(flatten)]
    pub summary: ClusterSummary,
}

/// Get system status
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.scheduler.port().name().to_string(),
        summary: state.scheduler.summary().await,
    })
}

async fn endpoint_not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Endpoint not found".to_string(),
            timestamp: now_string(),
        }),
    )
}
