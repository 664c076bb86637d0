//! # Sepidar Gateway 共有型定義
//!
//! アップストリーム（Sepidar ERP）とのワイヤフォーマット、ハンドシェイク成果物、
//! キャッシュ表現をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base64: 暗号文・IV・ノンス・RSA法/指数（アップストリームのワイヤ形式に一致）
//! - フィールド名はアップストリームのPascalCase表記（`Cypher`, `IV`, `IntegrationID` 等）を
//!   serde renameでビット互換に保つ

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// アップストリーム ワイヤ形式
// ---------------------------------------------------------------------------

/// AES-CBC暗号文とIVの組。レジスタ往復の両方向で使われる封筒形式。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64エンコードされたAES-128-CBC暗号文
    #[serde(rename = "Cypher")]
    pub cypher: String,
    /// Base64エンコードされた16バイトIV
    #[serde(rename = "IV")]
    pub iv: String,
}

/// デバイス登録リクエストのボディ。
/// IntegrationIDはAES平文（ASCII十進文字列）と平文フィールドの両方で送られる。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceUpstreamRequest {
    /// Base64エンコードされたAES-128-CBC暗号文（IntegrationIDのASCII十進表現）
    #[serde(rename = "Cypher")]
    pub cypher: String,
    /// Base64エンコードされた16バイトIV
    #[serde(rename = "IV")]
    pub iv: String,
    /// シリアルから抽出した統合ID（平文）
    #[serde(rename = "IntegrationID")]
    pub integration_id: u32,
}

/// レジスタ応答から回収したRSA公開鍵（法・指数ともBase64）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsaPublicKey {
    /// Base64エンコードされた法（ビッグエンディアン）
    #[serde(rename = "Modulus")]
    pub modulus_b64: String,
    /// Base64エンコードされた公開指数
    #[serde(rename = "Exponent")]
    pub exponent_b64: String,
}

// ---------------------------------------------------------------------------
// ハンドシェイク成果物
// ---------------------------------------------------------------------------

/// デバイス登録交換の結果。セッション構築まで保持される一時成果物。
#[derive(Debug, Clone)]
pub struct RegisterResult {
    /// シリアルから抽出した統合ID
    pub integration_id: u32,
    /// 回収したRSA公開鍵（法・指数の両方が揃った場合のみ）
    pub public_key: Option<RsaPublicKey>,
    /// 復号されたRSA公開鍵XML（`<RSAKeyValue>…`）。復号失敗時は空
    pub public_key_xml: String,
    /// 復号に成功した鍵導出戦略の名前（診断・回帰固定用）
    pub derivation_strategy: String,
    /// アップストリーム応答の生JSON（公開鍵情報を注釈済み）
    pub raw: serde_json::Value,
}

/// ユーザーログイン交換の結果。
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// 応答に含まれていた認可トークン（以後の署名付き呼び出しで使用）
    pub authorization: Option<String>,
    /// アップストリーム応答の生JSON
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// セッション
// ---------------------------------------------------------------------------

/// Register+Login の成功ペアから構築される唯一の長命状態。
/// SessionStoreが暗号化して保持し、署名付き呼び出しごとに読み出される。
/// 常に丸ごと上書きされ、部分更新されることはない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// デバイスシリアル（トリム済み）
    #[serde(rename = "Serial")]
    pub serial: String,
    /// シリアルから抽出した統合ID
    #[serde(rename = "IntegrationID")]
    pub integration_id: u32,
    /// プロトコル世代番号（既定 110）
    #[serde(rename = "GenerationVersion")]
    pub generation_version: u32,
    /// 復号されたRSA公開鍵XML。法・指数ペアが欠けた場合の再導出元
    #[serde(rename = "PublicKeyXml", skip_serializing_if = "Option::is_none")]
    pub public_key_xml: Option<String>,
    /// Base64エンコードされたRSA法
    #[serde(rename = "RsaModulusB64", skip_serializing_if = "Option::is_none")]
    pub rsa_modulus_b64: Option<String>,
    /// Base64エンコードされたRSA公開指数
    #[serde(rename = "RsaExponentB64", skip_serializing_if = "Option::is_none")]
    pub rsa_exponent_b64: Option<String>,
    /// ログイン応答の認可トークン
    #[serde(rename = "Authorization", skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    /// セッション生成時刻（UNIX秒）
    #[serde(rename = "CreatedAt")]
    pub created_at: u64,
}

/// キャッシュ値の保存時表現。書き込みごとに新しい12バイトノンスで
/// AES-256-GCM暗号化される。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// 暗号アルゴリズム識別子
    #[serde(rename = "Alg")]
    pub alg: String,
    /// Base64エンコードされた12バイトノンス
    #[serde(rename = "NonceB64")]
    pub nonce_b64: String,
    /// Base64エンコードされた16バイト認証タグ
    #[serde(rename = "TagB64")]
    pub tag_b64: String,
    /// Base64エンコードされた暗号文
    #[serde(rename = "CipherB64")]
    pub cipher_b64: String,
}

// ---------------------------------------------------------------------------
// ゲートウェイ外向きAPI
// ---------------------------------------------------------------------------

/// POST /gateway/v1/… デバイス登録リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceGatewayRequest {
    /// デバイスシリアル
    #[serde(rename = "Serial")]
    pub serial: String,
}

/// デバイス登録+ログインの合成応答。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAndLoginResponse {
    /// レジスタ応答の生JSON（公開鍵情報を注釈済み）
    #[serde(rename = "Register")]
    pub register: serde_json::Value,
    /// ログイン応答の生JSON
    #[serde(rename = "Login")]
    pub login: serde_json::Value,
    /// 統合ID
    #[serde(rename = "IntegrationID")]
    pub integration_id: u32,
    /// 世代番号
    #[serde(rename = "GenerationVersion")]
    pub generation_version: u32,
}

/// 署名付き転送のためにプロキシ呼び出しへ無条件に上書き注入されるヘッダ群。
/// `ArbitraryCode` / `EncArbitraryCode` はリクエストごとに新規生成される。
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// 世代番号
    pub generation_version: u32,
    /// 統合ID
    pub integration_id: u32,
    /// 新規GUIDの正規文字列形式
    pub arbitrary_code: String,
    /// GUIDワイヤバイト列のRSA(PKCS1v1.5)暗号文（Base64）
    pub enc_arbitrary_code: String,
    /// セッションが保持していた認可トークン
    pub authorization: Option<String>,
}

impl SignedHeaders {
    /// 上書き対象のヘッダ名（認可を除く固定4つ）。
    pub const GENERATION_VERSION: &'static str = "GenerationVersion";
    pub const INTEGRATION_ID: &'static str = "IntegrationID";
    pub const ARBITRARY_CODE: &'static str = "ArbitraryCode";
    pub const ENC_ARBITRARY_CODE: &'static str = "EncArbitraryCode";
    pub const AUTHORIZATION: &'static str = "Authorization";
}
