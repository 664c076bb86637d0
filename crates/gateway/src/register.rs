//! # デバイス登録フロー
//!
//! アップストリームのデバイス登録交換を実行し、RSA公開鍵を回収する。
//! 応答の封筒位置と鍵導出規則はどちらも非公開のため、封筒は段階的探索、
//! 鍵は候補の全数試行で発見する。

use serde_json::Value;

use sepidar_types::{RegisterDeviceUpstreamRequest, RegisterResult};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::HttpExecutor;
use crate::pubkey;

/// デバイス登録を実行する。
///
/// 1. シリアル検証とIntegrationID抽出
/// 2. 一次鍵（シリアル2連結）でIntegrationIDのASCII十進表現を封筒化
/// 3. アップストリームへPOST
/// 4. 応答から封筒を探索し、候補鍵を順に試行して公開鍵XMLを復号
/// 5. 応答JSONに復号結果を注釈して返す
pub async fn register(
    config: &GatewayConfig,
    http: &dyn HttpExecutor,
    serial: &str,
) -> Result<RegisterResult, GatewayError> {
    let serial = serial.trim();
    if serial.is_empty() {
        return Err(GatewayError::Validation("シリアルが空です".to_string()));
    }

    let integration_id =
        sepidar_crypto::keys::extract_integration_id(serial, config.integration_id_length)
            .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let primary = sepidar_crypto::keys::primary_key(serial)
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    let (cypher, iv) = sepidar_crypto::aes_cbc_encrypt(&primary, integration_id.to_string().as_bytes())
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let request = RegisterDeviceUpstreamRequest {
        cypher,
        iv,
        integration_id,
    };
    let body = serde_json::to_string(&request)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let url = config.combine_url(&config.register_endpoint);
    tracing::info!(serial, integration_id, %url, "デバイス登録を開始します");
    let (status, text) = http.send("POST", &url, Some(body), &[]).await?;
    if !(200..300).contains(&status) {
        return Err(GatewayError::Protocol(format!(
            "デバイス登録がHTTP {status}で失敗しました"
        )));
    }

    let mut root: Value = serde_json::from_str(&text)
        .map_err(|_| GatewayError::Protocol("デバイス登録応答がJSONではありません".to_string()))?;

    let (cypher, iv) = locate_envelope(&root).ok_or_else(|| {
        GatewayError::Protocol("応答に封筒（Cypher/IV）が見つかりません".to_string())
    })?;

    // 候補鍵の全数試行。復号失敗はすべて「候補外れ」として次へ進む。
    let candidates = sepidar_crypto::keys::candidate_keys(serial)
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    let mut tried = Vec::with_capacity(candidates.len());
    let mut accepted: Option<(String, &'static str)> = None;
    for (key, name) in candidates {
        tried.push(name.to_string());
        if let Ok(bytes) = sepidar_crypto::aes_cbc_decrypt(&key, &cypher, &iv) {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if pubkey::looks_like_rsa_xml(&text) {
                accepted = Some((text, name));
                break;
            }
        }
    }
    let Some((public_key_xml, strategy)) = accepted else {
        return Err(GatewayError::KeyDerivation { tried });
    };
    tracing::info!(strategy, "公開鍵XMLの復号に成功しました");

    // XML解析はソフト失敗（鍵ペアなし）。呼び出し側が致命性を判断する。
    let public_key = pubkey::parse_rsa_xml(&public_key_xml);

    if let Some(object) = root.as_object_mut() {
        object.insert("PublicKeyXml".to_string(), Value::from(public_key_xml.clone()));
        object.insert("PublicKeyDerivation".to_string(), Value::from(strategy));
        if let Some(key) = &public_key {
            object.insert(
                "PublicKey".to_string(),
                serde_json::json!({
                    "Modulus": key.modulus_b64,
                    "Exponent": key.exponent_b64,
                }),
            );
        }
    }

    Ok(RegisterResult {
        integration_id,
        public_key,
        public_key_xml,
        derivation_strategy: strategy.to_string(),
        raw: root,
    })
}

/// JSONオブジェクトから大文字小文字を無視してキーの文字列値を取り出す。
fn get_string_ci(value: &Value, key: &str) -> Option<String> {
    let object = value.as_object()?;
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string)
}

/// 封筒（Cypher/IVの文字列ペア）をこの順で探索する:
/// ルート直下 → ラッパーキー（Data/data/Result/result） →
/// ルート直下の全オブジェクト値の走査。最初に見つかったペアを採用する。
fn locate_envelope(root: &Value) -> Option<(String, String)> {
    fn pair(value: &Value) -> Option<(String, String)> {
        let cypher = get_string_ci(value, "Cypher")?;
        let iv = get_string_ci(value, "IV")?;
        Some((cypher, iv))
    }

    if let Some(found) = pair(root) {
        return Some(found);
    }
    for wrapper in ["Data", "data", "Result", "result"] {
        if let Some(found) = root.get(wrapper).and_then(pair) {
            return Some(found);
        }
    }
    root.as_object()?
        .values()
        .filter(|v| v.is_object())
        .find_map(pair)
}
