//! # RSA公開鍵XMLの判定と解析
//!
//! アップストリームの公開鍵は.NET形式のXML
//! （`<RSAKeyValue><Modulus>…</Modulus><Exponent>…</Exponent></RSAKeyValue>`）で
//! 届く。スキーマが固定の小さな断片なので、XMLパーサを持ち込まず
//! タグ名の文字列走査で十分とする。

use base64::Engine;

use sepidar_types::RsaPublicKey;

use crate::error::GatewayError;

/// 復号結果がRSA公開鍵XMLに見えるかの判定オラクル。
/// 候補鍵試行の成否をこの判定だけで決める（大文字小文字は区別しない）。
pub fn looks_like_rsa_xml(text: &str) -> bool {
    text.to_ascii_lowercase().contains("<rsakeyvalue")
}

/// XML断片から指定タグの中身を取り出す（タグ名は大文字小文字を区別しない）。
/// ASCII小文字化は長さを変えないため、小文字化した文字列上の位置を
/// 元の文字列へそのまま適用できる。
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let lower = xml.to_ascii_lowercase();
    let open = format!("<{}>", tag.to_ascii_lowercase());
    let close = format!("</{}>", tag.to_ascii_lowercase());
    let start = lower.find(&open)? + open.len();
    let end = start + lower[start..].find(&close)?;
    Some(xml[start..end].trim().to_string())
}

/// 公開鍵XMLから法・指数（Base64）を取り出す。
/// どちらかのタグが欠けていれば`None`。
pub fn parse_rsa_xml(xml: &str) -> Option<RsaPublicKey> {
    let modulus_b64 = extract_tag(xml, "Modulus")?;
    let exponent_b64 = extract_tag(xml, "Exponent")?;
    if modulus_b64.is_empty() || exponent_b64.is_empty() {
        return None;
    }
    Some(RsaPublicKey {
        modulus_b64,
        exponent_b64,
    })
}

/// RSA公開鍵から法・指数の生バイト列を取り出す。
fn decode_params(key: &RsaPublicKey) -> Result<(Vec<u8>, Vec<u8>), GatewayError> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let modulus = b64
        .decode(key.modulus_b64.as_bytes())
        .map_err(|_| GatewayError::Protocol("RSA法のBase64が不正です".to_string()))?;
    let exponent = b64
        .decode(key.exponent_b64.as_bytes())
        .map_err(|_| GatewayError::Protocol("RSA指数のBase64が不正です".to_string()))?;
    Ok((modulus, exponent))
}

/// レジスタ結果からRSA暗号化パラメータを復元する。
/// 解析済みペアを優先し、なければ公開鍵XMLから再導出する。
pub fn rsa_params_from_register(
    result: &sepidar_types::RegisterResult,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, GatewayError> {
    let key = match &result.public_key {
        Some(key) => Some(key.clone()),
        None => parse_rsa_xml(&result.public_key_xml),
    };
    match key {
        Some(key) => decode_params(&key).map(Some),
        None => Ok(None),
    }
}

/// セッションからRSA暗号化パラメータ（法・指数の生バイト列）を復元する。
///
/// Base64の法・指数ペアを優先し、欠けていれば保持していた公開鍵XMLから
/// 再導出する。どちらも得られなければ`None`。
pub fn rsa_params_from_session(
    session: &sepidar_types::Session,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, GatewayError> {
    let key = match (&session.rsa_modulus_b64, &session.rsa_exponent_b64) {
        (Some(modulus), Some(exponent)) => Some(RsaPublicKey {
            modulus_b64: modulus.clone(),
            exponent_b64: exponent.clone(),
        }),
        _ => session
            .public_key_xml
            .as_deref()
            .and_then(parse_rsa_xml),
    };
    match key {
        Some(key) => decode_params(&key).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str =
        "<RSAKeyValue><Modulus>sXchQB1lsg==</Modulus><Exponent>AQAB</Exponent></RSAKeyValue>";

    /// 判定オラクルが大文字小文字を無視することを確認
    #[test]
    fn test_looks_like_rsa_xml() {
        assert!(looks_like_rsa_xml(SAMPLE_XML));
        assert!(looks_like_rsa_xml("<rsakeyvalue><modulus>x</modulus></rsakeyvalue>"));
        assert!(looks_like_rsa_xml("  \u{feff}<RSAKEYVALUE>"));
        assert!(!looks_like_rsa_xml("{\"Cypher\":\"...\"}"));
        assert!(!looks_like_rsa_xml(""));
    }

    /// 法・指数の抽出を確認
    #[test]
    fn test_parse_rsa_xml() {
        let key = parse_rsa_xml(SAMPLE_XML).unwrap();
        assert_eq!(key.modulus_b64, "sXchQB1lsg==");
        assert_eq!(key.exponent_b64, "AQAB");
    }

    /// タグ欠落でNoneになることを確認
    #[test]
    fn test_parse_rsa_xml_missing_tag() {
        assert!(parse_rsa_xml("<RSAKeyValue><Modulus>abc</Modulus></RSAKeyValue>").is_none());
        assert!(parse_rsa_xml("<RSAKeyValue></RSAKeyValue>").is_none());
    }

    /// 小文字タグのXMLも解析できることを確認
    #[test]
    fn test_parse_rsa_xml_lowercase() {
        let xml = "<rsakeyvalue><modulus>AAEC</modulus><exponent>AQAB</exponent></rsakeyvalue>";
        let key = parse_rsa_xml(xml).unwrap();
        assert_eq!(key.modulus_b64, "AAEC");
    }

    fn session_with(
        modulus: Option<&str>,
        exponent: Option<&str>,
        xml: Option<&str>,
    ) -> sepidar_types::Session {
        sepidar_types::Session {
            serial: "SN-1234".to_string(),
            integration_id: 1234,
            generation_version: 110,
            public_key_xml: xml.map(str::to_string),
            rsa_modulus_b64: modulus.map(str::to_string),
            rsa_exponent_b64: exponent.map(str::to_string),
            authorization: None,
            created_at: 0,
        }
    }

    /// Base64ペアが優先され、欠落時はXMLへフォールバックすることを確認
    #[test]
    fn test_rsa_params_from_session() {
        let session = session_with(Some("AAEC"), Some("AQAB"), None);
        let (modulus, _) = rsa_params_from_session(&session).unwrap().unwrap();
        assert_eq!(modulus, vec![0x00, 0x01, 0x02]);

        let session = session_with(None, None, Some(SAMPLE_XML));
        assert!(rsa_params_from_session(&session).unwrap().is_some());

        let session = session_with(None, None, None);
        assert!(rsa_params_from_session(&session).unwrap().is_none());
    }

    /// 不正Base64がProtocolエラーになることを確認
    #[test]
    fn test_rsa_params_invalid_base64() {
        let session = session_with(Some("%%%"), Some("AQAB"), None);
        assert!(matches!(
            rsa_params_from_session(&session),
            Err(GatewayError::Protocol(_))
        ));
    }
}
