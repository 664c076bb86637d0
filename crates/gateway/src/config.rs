//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! キャッシュ暗号鍵の解決（Base64 / 16進 / パスフレーズ派生 / エフェメラル）も
//! ここで行う。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::GatewayError;
use crate::http::HttpExecutor;
use crate::session::SessionStore;

/// セッション不要パスの既定値（アップストリームの版数プローブ）
const DEFAULT_NO_SESSION_PATHS: &str = "/v1/api/General/GenerationVersion";

/// Gateway設定。環境変数から構築する。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// アップストリームのベースURL
    pub base_url: String,
    /// デバイス登録エンドポイントのパス
    pub register_endpoint: String,
    /// ユーザーログインエンドポイントのパス
    pub login_endpoint: String,
    /// IntegrationIDとして取り出す数字の桁数
    pub integration_id_length: usize,
    /// プロトコル世代番号（固定定数）
    pub generation_version: u32,
    /// ログイン用ユーザー名
    pub username: Option<String>,
    /// ログイン用パスワード（MD5ダイジェストで送信される）
    pub password: Option<String>,
    /// セッション不要パスの許可リスト（正規化・小文字化済み）
    pub no_session_paths: HashSet<String>,
    /// アップストリーム呼び出しのタイムアウト
    pub upstream_timeout: Duration,
    /// セッションの絶対有効期限（未設定なら無期限）
    pub session_ttl: Option<Duration>,
    /// リッスンアドレス
    pub listen_addr: String,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("SEPIDAR_BASE_URL")
            .map_err(|_| anyhow::anyhow!("SEPIDAR_BASE_URLが設定されていません"))?;

        let register_endpoint = std::env::var("SEPIDAR_REGISTER_ENDPOINT")
            .unwrap_or_else(|_| "/api/Devices/Register".to_string());
        let login_endpoint = std::env::var("SEPIDAR_LOGIN_ENDPOINT")
            .unwrap_or_else(|_| "/api/users/login".to_string());

        let integration_id_length = match std::env::var("SEPIDAR_INTEGRATION_ID_LENGTH") {
            Ok(v) => {
                let n: usize = v
                    .parse()
                    .map_err(|_| anyhow::anyhow!("SEPIDAR_INTEGRATION_ID_LENGTHが数値ではありません"))?;
                if n == 0 {
                    anyhow::bail!("SEPIDAR_INTEGRATION_ID_LENGTHは1以上である必要があります");
                }
                n
            }
            Err(_) => 4,
        };

        let generation_version = std::env::var("SEPIDAR_GENERATION_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(110);

        let no_session_paths = std::env::var("NO_SESSION_PATHS")
            .unwrap_or_else(|_| DEFAULT_NO_SESSION_PATHS.to_string())
            .split(',')
            .map(normalize_path)
            .filter(|p| !p.is_empty())
            .collect();

        let upstream_timeout = Duration::from_secs(
            std::env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        );

        let session_ttl = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs);

        Ok(Self {
            base_url,
            register_endpoint,
            login_endpoint,
            integration_id_length,
            generation_version,
            username: std::env::var("SEPIDAR_USERNAME").ok(),
            password: std::env::var("SEPIDAR_PASSWORD").ok(),
            no_session_paths,
            upstream_timeout,
            session_ttl,
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    /// ベースURLとエンドポイントパスを連結する。
    pub fn combine_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// ログイン認証情報を取り出す。未設定なら検証エラー。
    pub fn credentials(&self) -> Result<(&str, &str), GatewayError> {
        let username = self
            .username
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| GatewayError::Validation("SEPIDAR_USERNAMEが設定されていません".to_string()))?;
        let password = self
            .password
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| GatewayError::Validation("SEPIDAR_PASSWORDが設定されていません".to_string()))?;
        Ok((username, password))
    }
}

/// パスを許可リスト比較用に正規化する（末尾スラッシュ除去 + 小文字化）。
pub fn normalize_path(path: &str) -> String {
    path.trim().trim_end_matches('/').to_lowercase()
}

/// キャッシュ暗号鍵を環境変数 `CACHE_ENC_KEY` から解決する。
///
/// 解釈順: 32バイトBase64 → 32バイト16進 → 任意パスフレーズのSHA-256派生。
/// 未設定ならプロセスごとのランダム鍵を生成する（再起動でキャッシュ全体が
/// 無効化されるが、Register+Loginのやり直しが常に回復経路になる）。
pub fn resolve_cache_key() -> [u8; 32] {
    let b64 = base64::engine::general_purpose::STANDARD;
    match std::env::var("CACHE_ENC_KEY") {
        Ok(raw) if !raw.trim().is_empty() => {
            let raw = raw.trim();
            if let Ok(bytes) = b64.decode(raw) {
                if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
                    tracing::info!("キャッシュ暗号鍵をBase64から読み込みました");
                    return key;
                }
            }
            if let Ok(bytes) = hex::decode(raw) {
                if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
                    tracing::info!("キャッシュ暗号鍵を16進から読み込みました");
                    return key;
                }
            }
            tracing::info!("CACHE_ENC_KEYをパスフレーズとしてSHA-256派生します");
            Sha256::digest(raw.as_bytes()).into()
        }
        _ => {
            tracing::warn!(
                "CACHE_ENC_KEYが未設定です。エフェメラル鍵を生成します（再起動で全セッションが無効になります）"
            );
            let mut key = [0u8; 32];
            OsRng.fill_bytes(&mut key);
            key
        }
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// 設定
    pub config: GatewayConfig,
    /// アップストリームへのHTTP実行器（テストではモックに差し替える）
    pub http: Arc<dyn HttpExecutor>,
    /// 現在のセッションの暗号化ストア
    pub sessions: SessionStore,
}
