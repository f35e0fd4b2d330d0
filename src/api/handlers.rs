use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use crate::api::ws::bind_socket;
use crate::docker::{ContainerRecord, ImageRecord};
use crate::error::DockhandError;
use crate::fleet::{CommandExecutor, MachineSnapshot};

pub type SharedExecutor = Arc<CommandExecutor>;

/// Request failure mapped onto an HTTP status with an `{"err": ...}` body,
/// the same shape the streaming endpoints use for error frames.
pub struct ApiError(DockhandError);

impl From<DockhandError> for ApiError {
    fn from(err: DockhandError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DockhandError::UnknownMachine { .. } => StatusCode::NOT_FOUND,
            DockhandError::Config(_)
            | DockhandError::ConfigInvalid { .. }
            | DockhandError::Yaml(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.0.to_string();
        warn!(status = %status, error = %message, "Request failed");
        (status, Json(serde_json::json!({ "err": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct MachineQuery {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct ContainerQuery {
    pub ip: String,
    #[serde(rename = "containerID")]
    pub container_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub ip: String,
    #[serde(rename = "containerID")]
    pub container_id: String,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub ip: String,
    #[serde(rename = "imageID")]
    pub image_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateContainerPayload {
    pub ip: String,
    pub image: String,
    #[serde(default)]
    pub args: String,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn list_machines(State(executor): State<SharedExecutor>) -> Json<Vec<MachineSnapshot>> {
    Json(executor.list_machines())
}

pub async fn list_containers(
    State(executor): State<SharedExecutor>,
    Query(query): Query<MachineQuery>,
) -> Result<Json<Vec<ContainerRecord>>, ApiError> {
    Ok(Json(executor.list_containers(&query.ip).await?))
}

pub async fn list_images(
    State(executor): State<SharedExecutor>,
    Query(query): Query<MachineQuery>,
) -> Result<Json<Vec<ImageRecord>>, ApiError> {
    Ok(Json(executor.list_images(&query.ip).await?))
}

pub async fn container_action(
    State(executor): State<SharedExecutor>,
    Query(query): Query<ActionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let output = executor
        .perform_action(&query.ip, &query.container_id, &query.action)
        .await?;
    Ok(Json(serde_json::json!({ "output": output })))
}

pub async fn create_container(
    State(executor): State<SharedExecutor>,
    Json(payload): Json<CreateContainerPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let output = executor
        .create_container(&payload.ip, &payload.image, &payload.args)
        .await?;
    Ok(Json(serde_json::json!({ "output": output })))
}

pub async fn get_config(State(executor): State<SharedExecutor>) -> Result<String, ApiError> {
    Ok(executor.raw_config()?)
}

pub async fn update_config(
    State(executor): State<SharedExecutor>,
    body: String,
) -> Result<StatusCode, ApiError> {
    executor.update_config(body.as_bytes()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reload_config(State(executor): State<SharedExecutor>) -> Result<StatusCode, ApiError> {
    executor.reload_config().await?;
    Ok(StatusCode::NO_CONTENT)
}

// The streaming endpoints upgrade first and report failures as error
// frames; a rejected lookup still yields a well-formed socket session.

pub async fn container_stream(
    State(executor): State<SharedExecutor>,
    Query(query): Query<ContainerQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = bind_socket(socket);
        let sink = channel.sink();
        if let Err(e) = executor
            .stream_container(&query.ip, &query.container_id, channel)
            .await
        {
            sink.send_error(&e.to_string()).await;
        }
    })
}

pub async fn image_stream(
    State(executor): State<SharedExecutor>,
    Query(query): Query<ImageQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = bind_socket(socket);
        let sink = channel.sink();
        if let Err(e) = executor
            .stream_image(&query.ip, &query.image_id, channel)
            .await
        {
            sink.send_error(&e.to_string()).await;
        }
    })
}

pub async fn machine_exec(
    State(executor): State<SharedExecutor>,
    Query(query): Query<MachineQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = bind_socket(socket);
        let sink = channel.sink();
        if let Err(e) = executor.exec_into_machine(&query.ip, channel).await {
            sink.send_error(&e.to_string()).await;
        }
    })
}

pub async fn container_exec(
    State(executor): State<SharedExecutor>,
    Query(query): Query<ContainerQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = bind_socket(socket);
        let sink = channel.sink();
        if let Err(e) = executor
            .exec_into_container(&query.ip, &query.container_id, channel)
            .await
        {
            sink.send_error(&e.to_string()).await;
        }
    })
}

pub async fn container_log(
    State(executor): State<SharedExecutor>,
    Query(query): Query<ContainerQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = bind_socket(socket);
        let sink = channel.sink();
        if let Err(e) = executor
            .stream_container_logs(&query.ip, &query.container_id, channel)
            .await
        {
            sink.send_error(&e.to_string()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== Query Shapes ==============

    #[test]
    fn test_container_query_uses_upper_id_key() {
        let query: ContainerQuery =
            serde_urlencoded::from_str("ip=10.0.0.5&containerID=abc123").unwrap();
        assert_eq!(query.ip, "10.0.0.5");
        assert_eq!(query.container_id, "abc123");
    }

    #[test]
    fn test_action_query_parses_all_fields() {
        let query: ActionQuery =
            serde_urlencoded::from_str("ip=10.0.0.5&containerID=abc&action=restart").unwrap();
        assert_eq!(query.action, "restart");
    }

    #[test]
    fn test_image_query_uses_upper_id_key() {
        let query: ImageQuery =
            serde_urlencoded::from_str("ip=10.0.0.5&imageID=sha256:abc").unwrap();
        assert_eq!(query.image_id, "sha256:abc");
    }

    #[test]
    fn test_create_payload_args_default_empty() {
        let payload: CreateContainerPayload =
            serde_json::from_str(r#"{"ip":"10.0.0.5","image":"nginx:latest"}"#).unwrap();
        assert_eq!(payload.args, "");
    }

    // ============== Error Mapping ==============

    #[test]
    fn test_unknown_machine_maps_to_not_found() {
        let err = ApiError(DockhandError::UnknownMachine {
            address: "10.0.0.9".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_transport_failure_maps_to_server_error() {
        let err = ApiError(DockhandError::SshConnection {
            host: "10.0.0.5".to_string(),
            reason: "timed out".to_string(),
        });
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
