//! # ハンドシェイク編成
//!
//! デバイス登録とログインをひとつの操作として編成し、両方が成功した
//! 場合にだけセッションを保存する。部分的なセッション（公開鍵だけ、
//! トークンなし等）が観測されることはない。

use std::time::{SystemTime, UNIX_EPOCH};

use sepidar_types::{RegisterAndLoginResponse, Session};

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::login;
use crate::register;

/// Register → Login → Session保存を実行する。
pub async fn register_and_login(
    state: &GatewayState,
    serial: &str,
) -> Result<RegisterAndLoginResponse, GatewayError> {
    let serial = serial.trim();
    let register_result = register::register(&state.config, state.http.as_ref(), serial).await?;
    let login_result = login::login(&state.config, state.http.as_ref(), serial, &register_result)
        .await?
        .ok_or_else(|| GatewayError::Protocol("ログイン応答が空です".to_string()))?;

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let session = Session {
        serial: serial.to_string(),
        integration_id: register_result.integration_id,
        generation_version: state.config.generation_version,
        public_key_xml: if register_result.public_key_xml.is_empty() {
            None
        } else {
            Some(register_result.public_key_xml.clone())
        },
        rsa_modulus_b64: register_result
            .public_key
            .as_ref()
            .map(|k| k.modulus_b64.clone()),
        rsa_exponent_b64: register_result
            .public_key
            .as_ref()
            .map(|k| k.exponent_b64.clone()),
        authorization: login_result.authorization.clone(),
        created_at,
    };
    state.sessions.put(&session).await?;
    tracing::info!(
        serial,
        integration_id = register_result.integration_id,
        strategy = %register_result.derivation_strategy,
        "ハンドシェイクが完了し、セッションを保存しました"
    );

    Ok(RegisterAndLoginResponse {
        register: register_result.raw,
        login: login_result.raw,
        integration_id: register_result.integration_id,
        generation_version: state.config.generation_version,
    })
}
