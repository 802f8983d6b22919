//! In-process fake node serving the control API commands the sweep uses.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Filestore contents and pins of the fake node.
#[derive(Default)]
pub struct NodeState {
    /// (status, cid) in verify order.
    pub entries: Vec<(i32, String)>,
    /// Pins protecting each block, outermost first.
    pub pins: HashMap<String, Vec<String>>,
    /// Pins whose removal the node refuses.
    pub stuck_pins: Vec<String>,
    /// Split the verify body into chunks of this many bytes.
    pub chunk_size: Option<usize>,
    pub removed: Vec<String>,
    pub calls: Vec<String>,
}

pub type SharedNode = Arc<Mutex<NodeState>>;

pub fn node(entries: &[(i32, &str)]) -> SharedNode {
    Arc::new(Mutex::new(NodeState {
        entries: entries
            .iter()
            .map(|(status, cid)| (*status, cid.to_string()))
            .collect(),
        ..NodeState::default()
    }))
}

pub fn calls(node: &SharedNode) -> Vec<String> {
    node.lock().unwrap().calls.clone()
}

fn arg(params: &HashMap<String, String>) -> String {
    params.get("arg").cloned().unwrap_or_default()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"Message": message, "Code": 0, "Type": "error"})),
    )
        .into_response()
}

async fn version(State(node): State<SharedNode>) -> Json<serde_json::Value> {
    node.lock().unwrap().calls.push("version".to_string());
    Json(json!({"Version": "0.8.0", "Commit": "", "Repo": "10", "System": "amd64/linux"}))
}

async fn verify(State(node): State<SharedNode>) -> Response {
    let (body, chunk_size) = {
        let mut node = node.lock().unwrap();
        node.calls.push("filestore/verify".to_string());
        let body: String = node
            .entries
            .iter()
            .map(|(status, cid)| {
                format!(
                    "{}\n",
                    json!({
                        "Status": status,
                        "ErrorMsg": "",
                        "Key": {"/": cid},
                        "FilePath": format!("/data/{}.bin", cid),
                        "Offset": 0,
                        "Size": 262144
                    })
                )
            })
            .collect();
        (body.into_bytes(), node.chunk_size)
    };

    let chunks: Vec<Result<Bytes, std::io::Error>> = match chunk_size {
        Some(size) => body
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect(),
        None => vec![Ok(Bytes::from(body))],
    };
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn block_rm(
    State(node): State<SharedNode>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let cid = arg(&params);
    let mut node = node.lock().unwrap();
    node.calls.push(format!("block/rm?arg={}", cid));

    if let Some(pin) = node.pins.get(&cid).and_then(|pins| pins.first()).cloned() {
        return error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("pinned via {}", pin),
        );
    }
    if !node.entries.iter().any(|(_, c)| *c == cid) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "blockstore: block not found");
    }
    node.entries.retain(|(_, c)| *c != cid);
    node.removed.push(cid.clone());
    Json(json!({"Hash": cid})).into_response()
}

async fn pin_rm(
    State(node): State<SharedNode>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let pin = arg(&params);
    let mut node = node.lock().unwrap();
    node.calls.push(format!("pin/rm?arg={}", pin));

    if node.stuck_pins.contains(&pin) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "not pinned or pinned indirectly");
    }
    for pins in node.pins.values_mut() {
        pins.retain(|p| *p != pin);
    }
    Json(json!({"Pins": [pin]})).into_response()
}

async fn error_with_ok_status() -> Response {
    error_body(StatusCode::OK, "this command is not enabled")
}

async fn slow() -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

/// Starts the fake node on an ephemeral port and returns its endpoint.
pub async fn spawn_node(node: SharedNode) -> String {
    let app = Router::new()
        .route("/api/v0/version", post(version))
        .route("/api/v0/filestore/verify", post(verify))
        .route("/api/v0/block/rm", post(block_rm))
        .route("/api/v0/pin/rm", post(pin_rm))
        .route("/api/v0/disabled", post(error_with_ok_status))
        .route("/api/v0/slow", post(slow))
        .with_state(node);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Starts a server whose verify command fails outright.
pub async fn spawn_broken_verify() -> String {
    let app = Router::new().route(
        "/api/v0/filestore/verify",
        post(|| async {
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "filestore is not enabled, see https://git.io/vNItf",
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
