//! # curlコマンドの描画（デバッグ補助）
//!
//! 外向きリクエストを再現可能なcurlコマンドライン1行として描画する。
//! Authorizationの値は伏せ字にするため、出力をそのまま実行しても
//! 認可付き呼び出しは再現されない（意図どおり）。

use crate::signer::mask_authorization;

/// shell単一引用符で値を包む（内部の `'` は `'\''` に展開）。
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// 外向きリクエストをcurlコマンドライン1行として描画する。
pub fn render_curl(
    method: &str,
    url: &str,
    headers: &[(String, String)],
    body: Option<&str>,
) -> String {
    let mut parts = vec![
        "curl".to_string(),
        "-X".to_string(),
        method.to_string(),
        quote(url),
    ];
    for (name, value) in headers {
        let value = if name.eq_ignore_ascii_case("authorization") {
            mask_authorization(value)
        } else {
            value.clone()
        };
        parts.push("-H".to_string());
        parts.push(quote(&format!("{name}: {value}")));
    }
    if let Some(body) = body {
        parts.push("--data".to_string());
        parts.push(quote(body));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// メソッド・URL・ヘッダ・本文が1行に並ぶことを確認
    #[test]
    fn test_render_basic() {
        let headers = vec![("IntegrationID".to_string(), "4477".to_string())];
        let rendered = render_curl(
            "POST",
            "http://upstream/api/users/login",
            &headers,
            Some(r#"{"UserName":"admin"}"#),
        );
        assert_eq!(
            rendered,
            r#"curl -X POST 'http://upstream/api/users/login' -H 'IntegrationID: 4477' --data '{"UserName":"admin"}'"#
        );
    }

    /// Authorizationが伏せ字になることを確認
    #[test]
    fn test_render_masks_authorization() {
        let headers = vec![(
            "Authorization".to_string(),
            "Bearer very-secret-token".to_string(),
        )];
        let rendered = render_curl("GET", "http://upstream/v1/api/Items", &headers, None);
        assert!(rendered.contains("Authorization: Bearer ***"));
        assert!(!rendered.contains("very-secret-token"));
    }

    /// 単一引用符を含む値がshell安全に展開されることを確認
    #[test]
    fn test_render_quotes_single_quote() {
        let rendered = render_curl("GET", "http://upstream/a'b", &[], None);
        assert!(rendered.contains(r"'http://upstream/a'\''b'"));
    }
}
