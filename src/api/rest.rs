use crate::api::error::{ApiError, ApiResult};
use crate::node::http::{API_BASE_PATH, AUTH_HEADER};
use crate::node::types::{
    OpenChannelRequest, OpenChannelResponse, PopMessageRequest, SendMessageRequest,
};
use crate::node::{NodeApi, NodeError, Protocol, Session, SessionOpenRequest};
use crate::simulation::SimNode;
use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

struct ApiState {
    node: SimNode,
    token: Option<String>,
}

/// v3 REST surface of a simulated node, the same shape `HttpNodeApi` talks to.
pub struct RestApi {
    state: Arc<ApiState>,
}

impl RestApi {
    pub fn new(node: SimNode, token: Option<String>) -> Self {
        Self {
            state: Arc::new(ApiState { node, token }),
        }
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/messages", post(send_message))
            .route("/messages/pop", post(pop_message))
            .route("/channels", post(open_channel))
            .route("/channels/:channel_id", delete(close_channel))
            .route("/session/:protocol", post(open_session).get(list_sessions))
            .route("/session/:protocol/:ip/:port", delete(close_session))
            .route("/node/metrics", get(node_metrics))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_token,
            ))
            .with_state(self.state.clone());

        Router::new()
            .route("/health", get(health_check))
            .nest(API_BASE_PATH, api)
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn require_token(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.token {
        let presented = request
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

fn parse_protocol(protocol: &str) -> ApiResult<Protocol> {
    protocol
        .parse()
        .map_err(|e: NodeError| ApiError::InvalidRequest(e.to_string()))
}

async fn send_message(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let accepted = state
        .node
        .send_message(&request.peer_id, &request.body, &request.path, request.tag)
        .await?;

    if accepted {
        Ok((StatusCode::ACCEPTED, Json(json!({ "tag": request.tag }))))
    } else {
        Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "status": "MESSAGE_REFUSED", "tag": request.tag })),
        ))
    }
}

async fn pop_message(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PopMessageRequest>,
) -> ApiResult<Response> {
    match state.node.pop_message(request.tag).await? {
        Some(message) => Ok((StatusCode::OK, Json(message)).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "NO_MESSAGE", "tag": request.tag })),
        )
            .into_response()),
    }
}

async fn open_channel(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<OpenChannelRequest>,
) -> ApiResult<(StatusCode, Json<OpenChannelResponse>)> {
    let amount: u128 = request
        .amount
        .parse()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid amount {}", request.amount)))?;

    let channel_id = state
        .node
        .open_channel(&request.peer_address, amount)
        .await?;

    Ok((StatusCode::CREATED, Json(OpenChannelResponse { channel_id })))
}

async fn close_channel(
    State(state): State<Arc<ApiState>>,
    Path(channel_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.node.close_channel(&channel_id).await? {
        return Err(NodeError::UnknownChannel(channel_id).into());
    }
    Ok(Json(json!({ "channelStatus": "Closed", "channelId": channel_id })))
}

async fn open_session(
    State(state): State<Arc<ApiState>>,
    Path(protocol): Path<String>,
    Json(request): Json<SessionOpenRequest>,
) -> ApiResult<Json<Session>> {
    let protocol = parse_protocol(&protocol)?;
    let session = state.node.session_open(protocol, &request).await?;
    Ok(Json(session))
}

async fn list_sessions(
    State(state): State<Arc<ApiState>>,
    Path(protocol): Path<String>,
) -> ApiResult<Json<Vec<Session>>> {
    let protocol = parse_protocol(&protocol)?;
    Ok(Json(state.node.session_list(protocol).await?))
}

async fn close_session(
    State(state): State<Arc<ApiState>>,
    Path((protocol, ip, port)): Path<(String, String, u16)>,
) -> ApiResult<StatusCode> {
    let session = Session {
        ip,
        port,
        protocol: parse_protocol(&protocol)?,
        target: String::new(),
    };

    if state.node.session_close(&session).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        debug!(port, "close requested for unknown session");
        Ok(StatusCode::NOT_FOUND)
    }
}

async fn node_metrics(State(state): State<Arc<ApiState>>) -> ApiResult<Response> {
    let body = state.node.metrics().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::DelayConfig;
    use crate::simulation::{local_nodes, SimulatedCluster, SimulationConfig};
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn cluster() -> SimulatedCluster {
        SimulatedCluster::new(
            SimulationConfig::default(),
            &local_nodes(3, &[DelayConfig::new(0, 0)]),
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), Some("secret".into())).router();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/v3/node/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["status"], "UNAUTHORIZED");

        let response = app
            .oneshot(
                Request::get("/api/v3/node/metrics")
                    .header(AUTH_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), Some("secret".into())).router();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_channel_lifecycle() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), None).router();
        let counterparty = cluster.nodes()[1].address.clone();

        let open = serde_json::to_vec(&OpenChannelRequest {
            peer_address: counterparty.clone(),
            amount: "1000".into(),
        })
        .unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v3/channels")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(open.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let channel_id = body_json(response).await["channelId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v3/channels")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(open))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/v3/channels/{channel_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::delete(format!("/api/v3/channels/{channel_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_amount_is_a_bad_request() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), None).router();

        let response = app
            .oneshot(
                Request::post("/api/v3/channels")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"peerAddress":"0x00","amount":"lots"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reserved_tag_is_unprocessable() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), None).router();
        let request = SendMessageRequest {
            tag: 7,
            body: "hello".into(),
            peer_id: cluster.nodes()[1].peer_id.clone(),
            path: vec![],
        };

        let response = app
            .oneshot(
                Request::post("/api/v3/messages")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&request).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_empty_inbox_pops_not_found() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), None).router();

        let response = app
            .oneshot(
                Request::post("/api/v3/messages/pop")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"tag":2048}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_protocol_and_session() {
        let cluster = cluster();
        let app = RestApi::new(cluster.sim_nodes()[0].clone(), None).router();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/v3/session/quic")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::delete("/api/v3/session/tcp/127.0.0.1/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
