//! # Sepidar Gateway
//!
//! Sepidar ERP（アップストリーム）に対してデバイスとして認証し、
//! 以後のすべての中継リクエストへ署名ヘッダを注入するゲートウェイ。
//!
//! ## API エンドポイント
//! - `POST /gateway/v1/api/Devices/Register` — デバイス登録 + ログインの編成
//! - `GET /health` — ヘルスチェック
//! - それ以外のすべてのパス — 署名付きプロキシ転送

use std::sync::Arc;

mod config;
mod curl;
mod endpoints;
mod error;
mod http;
mod login;
mod proxy;
mod pubkey;
mod register;
mod service;
mod session;
mod signer;

use config::{GatewayConfig, GatewayState};
use http::ReqwestExecutor;
use session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    let cache_key = config::resolve_cache_key();
    let executor = ReqwestExecutor::new(config.upstream_timeout)?;

    let register_route = format!(
        "/gateway/v1/{}",
        config.register_endpoint.trim_matches('/')
    );
    let listen_addr = config.listen_addr.clone();
    let session_ttl = config.session_ttl;

    let state = Arc::new(GatewayState {
        config,
        http: Arc::new(executor),
        sessions: SessionStore::new(cache_key, session_ttl),
    });

    let app = axum::Router::new()
        .route(
            &register_route,
            axum::routing::post(endpoints::register_device),
        )
        .route("/health", axum::routing::get(endpoints::health))
        .fallback(proxy::handle_proxy)
        .with_state(state);

    tracing::info!("Gatewayを {} で起動します", listen_addr);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
