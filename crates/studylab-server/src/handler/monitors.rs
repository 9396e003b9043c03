//! Server health monitoring and status handlers.

use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use studylab_core::ServiceStatus;
use studylab_rig::ChatService;

use crate::extract::Json;
use crate::handler::response::{ApiIndex, Features, MonitorStatus, ServerInfo};
use crate::middleware::DEFAULT_SCALAR_UI;
use crate::service::{ServiceConfig, ServiceState};

/// Tracing target for monitor operations.
const TRACING_TARGET: &str = "studylab_server::handler::monitors";

/// Describes the API.
async fn index(State(config): State<Arc<ServiceConfig>>) -> Json<ApiIndex> {
    Json(ApiIndex {
        name: config.app_name.clone(),
        version: config.app_version.clone(),
        description: "LC-StudyLab 智能学习 & 研究助手 API".to_owned(),
        docs: DEFAULT_SCALAR_UI.to_owned(),
        health: "/health".to_owned(),
    })
}

fn index_docs(op: TransformOperation) -> TransformOperation {
    op.summary("API index")
        .description("Returns the application name and links to the docs and health check.")
        .response::<200, Json<ApiIndex>>()
}

#[tracing::instrument(skip_all)]
async fn health_status(State(config): State<Arc<ServiceConfig>>) -> Json<MonitorStatus> {
    tracing::debug!(target: TRACING_TARGET, "Health status check requested");

    Json(MonitorStatus {
        status: ServiceStatus::Healthy,
        version: config.app_version.clone(),
        debug: config.debug,
    })
}

fn health_status_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Health check")
        .description("Used by load balancers and monitors to check that the server is up.")
        .response::<200, Json<MonitorStatus>>()
}

async fn server_info(
    State(config): State<Arc<ServiceConfig>>,
    State(chat): State<ChatService>,
) -> Json<ServerInfo> {
    tracing::debug!(
        target: TRACING_TARGET,
        model = chat.model_id(),
        "Server info requested"
    );

    Json(ServerInfo {
        name: config.app_name.clone(),
        version: config.app_version.clone(),
        model: chat.model_id().to_owned(),
        features: Features {
            streaming: true,
            tools: true,
            advanced_tools: chat.has_advanced_tools(),
            modes: chat
                .modes()
                .into_iter()
                .map(|(mode, _)| mode.to_string())
                .collect(),
        },
    })
}

fn server_info_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Server info")
        .description("Returns the configured model and the available chat features.")
        .response::<200, Json<ServerInfo>>()
}

/// Returns a [`Router`] with all health monitoring routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/", get_with(index, index_docs))
        .api_route("/health", get_with(health_status, health_status_docs))
        .api_route("/info", get_with(server_info, server_info_docs))
        .with_path_items(|item| item.tag("Monitors"))
}
