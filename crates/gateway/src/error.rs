//! # Gateway エラー型

use axum::http::StatusCode;
use axum::Json;

/// Gatewayエラー型。
///
/// どの種別もコア内部では再試行されない。鍵導出の候補ループは受信済み
/// データへの全数試行であって、失敗したネットワーク呼び出しの再試行ではない。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 不正な入力・設定不足（シリアル不正、認証情報未設定など）
    #[error("不正なリクエスト: {0}")]
    Validation(String),
    /// どの候補鍵でも公開鍵XMLを復号できなかった
    #[error("候補鍵のいずれでも公開鍵を復号できませんでした（試行済み戦略: {tried:?}）")]
    KeyDerivation { tried: Vec<String> },
    /// アップストリーム応答に期待フィールドがない（封筒・RSA鍵・認可トークン等）
    #[error("アップストリーム応答が不正です: {0}")]
    Protocol(String),
    /// アップストリームへの接続失敗
    #[error("アップストリームに接続できません: {0}")]
    UpstreamUnavailable(String),
    /// アップストリーム呼び出しの期限超過
    #[error("アップストリーム呼び出しがタイムアウトしました: {0}")]
    UpstreamTimeout(String),
    /// ハンドシェイク未完了（先にデバイス登録とログインが必要）
    #[error("セッションがありません。先にデバイス登録とログインを実行してください")]
    SessionMissing,
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::Validation(_) | GatewayError::SessionMissing => StatusCode::BAD_REQUEST,
            GatewayError::KeyDerivation { .. }
            | GatewayError::Protocol(_)
            | GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "message": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    /// エラー種別とHTTPステータスの対応を確認
    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                GatewayError::Validation("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (GatewayError::SessionMissing, StatusCode::BAD_REQUEST),
            (
                GatewayError::KeyDerivation { tried: vec![] },
                StatusCode::BAD_GATEWAY,
            ),
            (GatewayError::Protocol("x".into()), StatusCode::BAD_GATEWAY),
            (
                GatewayError::UpstreamUnavailable("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::UpstreamTimeout("x".into()),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GatewayError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    /// 鍵導出エラーが試行済み戦略名を含むことを確認
    #[test]
    fn test_key_derivation_lists_strategies() {
        let err = GatewayError::KeyDerivation {
            tried: vec!["Serial Left16".to_string()],
        };
        assert!(err.to_string().contains("Serial Left16"));
    }
}
