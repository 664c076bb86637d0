//! # リクエスト署名（プロキシインターセプタ）
//!
//! 転送されるすべてのリクエストに対し、セッションのRSA公開鍵で
//! 鮮度証明ヘッダを生成する。許可リスト上のパスは署名なしで素通しする。
//! セッションがない場合はトランスポートへ到達させない。

use base64::Engine;
use uuid::Uuid;

use sepidar_types::SignedHeaders;

use crate::config::{normalize_path, GatewayState};
use crate::error::GatewayError;
use crate::pubkey;

/// 外向きリクエストの署名ヘッダを構築する。
///
/// - 許可リスト上のパス: `Ok(None)`（ヘッダ無改変で転送してよい）
/// - セッションなし: `Err(SessionMissing)`（転送してはならない）
/// - キャッシュ済み公開鍵が使えない: `Err(UpstreamUnavailable)`（転送してはならない）
/// - それ以外: リクエストごとに新規生成したArbitraryCodeを含むヘッダ群
pub async fn sign_outgoing(
    state: &GatewayState,
    path: &str,
) -> Result<Option<SignedHeaders>, GatewayError> {
    let normalized = normalize_path(path);
    if state.config.no_session_paths.contains(&normalized) {
        tracing::debug!(path, "セッション不要パスのため署名をスキップします");
        return Ok(None);
    }

    let session = state
        .sessions
        .get()
        .await
        .ok_or(GatewayError::SessionMissing)?;

    // スナップショットしたセッションの不変データだけで署名する
    let (modulus, exponent) = pubkey::rsa_params_from_session(&session)
        .ok()
        .flatten()
        .ok_or_else(|| {
            GatewayError::UpstreamUnavailable(
                "キャッシュ済みRSA公開鍵からパラメータを構築できません".to_string(),
            )
        })?;

    let arbitrary_code = Uuid::new_v4();
    let wire = sepidar_crypto::guid_to_wire_bytes(&arbitrary_code);
    let encrypted = sepidar_crypto::rsa_encrypt_pkcs1(&modulus, &exponent, &wire)
        .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))?;

    Ok(Some(SignedHeaders {
        generation_version: session.generation_version,
        integration_id: session.integration_id,
        arbitrary_code: arbitrary_code.to_string(),
        enc_arbitrary_code: base64::engine::general_purpose::STANDARD.encode(encrypted),
        authorization: session.authorization.clone(),
    }))
}

/// ログ・デバッグ出力用にAuthorizationの値を伏せる。
/// スキーム（`Bearer` 等）だけを残し、トークン本体は長さに関係なく出さない。
pub fn mask_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) if !scheme.is_empty() => format!("{scheme} ***"),
        _ => "***".to_string(),
    }
}
