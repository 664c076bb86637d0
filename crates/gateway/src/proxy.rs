//! # 署名付きプロキシ転送
//!
//! ルートにマッチしなかったすべてのリクエストをアップストリームへの
//! 呼び出しとして扱う。転送前に署名インターセプタを通し、署名ヘッダを
//! 呼び出し元の値に関係なく上書きする。応答のステータスと本文は
//! そのまま呼び出し元へ中継する。

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;

use crate::config::GatewayState;
use crate::curl;
use crate::error::GatewayError;
use crate::signer;

/// 転送時に読み取るリクエスト本文の上限（バイト）
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// 転送しないhop-by-hopヘッダ
const DROPPED_HEADERS: [&str; 2] = ["host", "content-length"];

/// フォールバックハンドラ。署名してからアップストリームへ転送する。
pub async fn handle_proxy(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    // 署名はトランスポート到達前に解決する。失敗したら転送しない。
    let signed = signer::sign_outgoing(&state, &path).await?;

    let mut headers: Vec<(String, String)> = Vec::new();
    for (name, value) in request.headers() {
        let name = name.as_str();
        if DROPPED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    if let Some(signed) = &signed {
        // 呼び出し元が何を送っていても署名ヘッダは無条件に上書きする
        let overwritten = [
            sepidar_types::SignedHeaders::GENERATION_VERSION,
            sepidar_types::SignedHeaders::INTEGRATION_ID,
            sepidar_types::SignedHeaders::ARBITRARY_CODE,
            sepidar_types::SignedHeaders::ENC_ARBITRARY_CODE,
            sepidar_types::SignedHeaders::AUTHORIZATION,
        ];
        headers.retain(|(name, _)| !overwritten.iter().any(|h| h.eq_ignore_ascii_case(name)));
        headers.push((
            sepidar_types::SignedHeaders::GENERATION_VERSION.to_string(),
            signed.generation_version.to_string(),
        ));
        headers.push((
            sepidar_types::SignedHeaders::INTEGRATION_ID.to_string(),
            signed.integration_id.to_string(),
        ));
        headers.push((
            sepidar_types::SignedHeaders::ARBITRARY_CODE.to_string(),
            signed.arbitrary_code.clone(),
        ));
        headers.push((
            sepidar_types::SignedHeaders::ENC_ARBITRARY_CODE.to_string(),
            signed.enc_arbitrary_code.clone(),
        ));
        if let Some(authorization) = &signed.authorization {
            headers.push((
                sepidar_types::SignedHeaders::AUTHORIZATION.to_string(),
                authorization.clone(),
            ));
        }
    }

    let body_bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::Validation(format!("リクエスト本文を読めません: {e}")))?;
    let body = if body_bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&body_bytes).into_owned())
    };

    let url = state.config.combine_url(&path_and_query);
    if tracing::enabled!(tracing::Level::DEBUG) {
        tracing::debug!(
            "{}",
            curl::render_curl(&method, &url, &headers, body.as_deref())
        );
    }

    let (status, text) = state.http.send(&method, &url, body, &headers).await?;
    tracing::info!(%method, path = %path_and_query, status, "アップストリーム呼び出しを中継しました");

    let status = StatusCode::from_u16(status)
        .map_err(|_| GatewayError::Protocol(format!("不正なステータスコード: {status}")))?;
    Response::builder()
        .status(status)
        .body(Body::from(text))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}
