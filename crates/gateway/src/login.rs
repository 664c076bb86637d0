//! # ユーザーログインフロー
//!
//! レジスタで回収したRSA公開鍵を使い、鮮度証明（ArbitraryCode）付きで
//! アップストリームへログインする。パスワードはアップストリーム仕様に従い
//! MD5ダイジェスト（小文字16進）で送る。

use base64::Engine;
use serde_json::Value;
use uuid::Uuid;

use sepidar_types::{LoginResult, RegisterResult};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::HttpExecutor;
use crate::pubkey;

/// ログインを実行する。
///
/// 応答本文が空の場合はソフトに`None`を返す（致命性の判断は呼び出し側）。
pub async fn login(
    config: &GatewayConfig,
    http: &dyn HttpExecutor,
    serial: &str,
    register_result: &RegisterResult,
) -> Result<Option<LoginResult>, GatewayError> {
    let (modulus, exponent) = pubkey::rsa_params_from_register(register_result)?
        .ok_or_else(|| {
            GatewayError::Protocol("レジスタ結果に使用可能なRSA公開鍵がありません".to_string())
        })?;

    // レジスタとは独立に再抽出する（再現可能であることが前提）
    let integration_id =
        sepidar_crypto::keys::extract_integration_id(serial, config.integration_id_length)
            .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let (username, password) = config.credentials()?;

    let arbitrary_code = Uuid::new_v4();
    let wire = sepidar_crypto::guid_to_wire_bytes(&arbitrary_code);
    let encrypted = sepidar_crypto::rsa_encrypt_pkcs1(&modulus, &exponent, &wire)
        .map_err(|e| GatewayError::Protocol(e.to_string()))?;
    let enc_arbitrary_code = base64::engine::general_purpose::STANDARD.encode(encrypted);

    let headers = vec![
        (
            "GenerationVersion".to_string(),
            config.generation_version.to_string(),
        ),
        ("IntegrationID".to_string(), integration_id.to_string()),
        ("ArbitraryCode".to_string(), arbitrary_code.to_string()),
        ("EncArbitraryCode".to_string(), enc_arbitrary_code),
    ];
    let body = serde_json::json!({
        "UserName": username,
        "PasswordHash": sepidar_crypto::md5_hex(password.as_bytes()),
    })
    .to_string();

    let url = config.combine_url(&config.login_endpoint);
    tracing::info!(serial, integration_id, %url, "ログインを開始します");
    let (status, text) = http.send("POST", &url, Some(body), &headers).await?;
    if !(200..300).contains(&status) {
        return Err(GatewayError::Protocol(format!(
            "ログインがHTTP {status}で失敗しました"
        )));
    }

    if text.trim().is_empty() {
        tracing::warn!("ログイン応答の本文が空です");
        return Ok(None);
    }
    let raw: Value = serde_json::from_str(&text)
        .map_err(|_| GatewayError::Protocol("ログイン応答がJSONではありません".to_string()))?;

    let authorization = raw
        .get("Authorization")
        .and_then(Value::as_str)
        .map(str::to_string);
    if authorization.is_none() {
        tracing::warn!("ログイン応答にAuthorizationが含まれていません");
    }

    Ok(Some(LoginResult { authorization, raw }))
}
