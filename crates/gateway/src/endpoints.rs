//! # REST エンドポイント
//!
//! Gatewayが自分で処理する薄いエンドポイント層。これ以外のパスは
//! すべてプロキシ転送（[`crate::proxy`]）に落ちる。

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::Json;
use serde_json::json;

use sepidar_types::{RegisterAndLoginResponse, RegisterDeviceGatewayRequest};

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::service;

/// POST /gateway/v1/api/Devices/Register
///
/// 操作者がブートストラップ時に1回呼ぶ。Register → Login → セッション保存を
/// 編成し、両応答の合成JSONを返す。
pub async fn register_device(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<RegisterDeviceGatewayRequest>,
) -> Result<Json<RegisterAndLoginResponse>, GatewayError> {
    let response = service::register_and_login(&state, &request.serial).await?;
    Ok(Json(response))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Json(json!({ "status": "ok", "timestamp": timestamp }))
}
