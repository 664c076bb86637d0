//! # Sepidar Gateway 暗号処理
//!
//! アップストリーム（Sepidar ERP）ハンドシェイクが要求する暗号プリミティブを実装する。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | 封筒暗号（IntegrationID / 公開鍵XML） | AES-128-CBC + PKCS7 |
//! | リクエスト鮮度証明（ArbitraryCode） | RSA PKCS#1 v1.5 |
//! | パスワードダイジェスト | MD5（アップストリーム仕様） |
//! | キャッシュ保存時暗号 | AES-256-GCM |
//!
//! 鍵導出ヒューリスティクスは [`keys`] モジュールを参照。

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{BigUint, Pkcs1v15Encrypt};
use uuid::Uuid;

pub mod keys;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// シリアルが空（トリム後）
    #[error("シリアルが空です")]
    EmptySerial,
    /// シリアルの数字が不足
    #[error("シリアルには少なくとも{needed}桁の数字が必要です")]
    InsufficientDigits { needed: usize },
    /// IntegrationIDの数値変換エラー
    #[error("IntegrationIDを数値に変換できません")]
    IntegrationIdParse,
    /// AES鍵が16バイトでない
    #[error("AES鍵は16バイトである必要があります")]
    InvalidKeyLength,
    /// 対称暗号化エラー
    #[error("対称暗号化に失敗しました")]
    EncryptError,
    /// 対称復号エラー（鍵不一致・パディング不正・Base64不正を含む）
    #[error("対称復号に失敗しました")]
    DecryptError,
    /// RSA公開鍵の構築エラー
    #[error("RSA公開鍵の構築に失敗しました: {0}")]
    RsaKey(String),
    /// RSA暗号化エラー
    #[error("RSA暗号化に失敗しました: {0}")]
    RsaEncrypt(String),
}

/// 16バイトUTF-8鍵文字列を鍵バイト列に変換する。
fn key16_bytes(key16: &str) -> Result<[u8; 16], CryptoError> {
    key16
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)
}

/// AES-128-CBC（PKCS7パディング）による暗号化。
/// IVは呼び出しごとにランダム生成し、暗号文とともにBase64で返す。
pub fn aes_cbc_encrypt(key16: &str, plaintext: &[u8]) -> Result<(String, String), CryptoError> {
    let key = key16_bytes(key16)?;
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);

    let ciphertext =
        Aes128CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok((b64().encode(ciphertext), b64().encode(iv)))
}

/// AES-128-CBC（PKCS7パディング）による復号。
///
/// 鍵不一致はほぼ確実にパディング検査で検出されるため、呼び出し側は
/// `DecryptError` を「候補鍵が外れた」として次の候補へ進んでよい。
pub fn aes_cbc_decrypt(
    key16: &str,
    cipher_b64: &str,
    iv_b64: &str,
) -> Result<Vec<u8>, CryptoError> {
    let key = key16_bytes(key16)?;
    let ciphertext = b64()
        .decode(cipher_b64)
        .map_err(|_| CryptoError::DecryptError)?;
    let iv: [u8; 16] = b64()
        .decode(iv_b64)
        .map_err(|_| CryptoError::DecryptError)?
        .try_into()
        .map_err(|_| CryptoError::DecryptError)?;

    Aes128CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::DecryptError)
}

/// RSA PKCS#1 v1.5による暗号化。法・指数はビッグエンディアンのバイト列。
pub fn rsa_encrypt_pkcs1(
    modulus: &[u8],
    exponent: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let n = BigUint::from_bytes_be(modulus);
    let e = BigUint::from_bytes_be(exponent);
    let key = rsa::RsaPublicKey::new(n, e).map_err(|e| CryptoError::RsaKey(e.to_string()))?;
    key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| CryptoError::RsaEncrypt(e.to_string()))
}

/// MD5ダイジェストの小文字16進表現。
/// アップストリームのログインがこの形式のパスワードハッシュを要求する。
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// GUIDをアップストリームが期待するワイヤバイト順に並べ替える。
///
/// 先頭3フィールド（time_low / time_mid / time_hi_and_version）をフィールド内で
/// 反転し、残り8バイトはそのまま写す。純粋なバイト置換であり、
/// `00112233-4455-6677-8899-aabbccddeeff` は
/// `33 22 11 00 55 44 77 66 88 99 aa bb cc dd ee ff` になる。
/// この並びがRSA暗号化の平文そのものであり、文字列形式とは別物。
pub fn guid_to_wire_bytes(guid: &Uuid) -> [u8; 16] {
    let b = guid.as_bytes();
    let mut r = [0u8; 16];
    r[0] = b[3];
    r[1] = b[2];
    r[2] = b[1];
    r[3] = b[0];
    r[4] = b[5];
    r[5] = b[4];
    r[6] = b[7];
    r[7] = b[6];
    r[8..].copy_from_slice(&b[8..]);
    r
}

/// AES-256-GCMによる暗号化（キャッシュ保存時用）。
/// 戻り値は暗号文+認証タグ（末尾16バイト）の連結。
pub fn aes_gcm_encrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptError)?;
    let nonce = Nonce::from_slice(nonce);
    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptError)
}

/// AES-256-GCMによる復号（キャッシュ保存時用）。
/// 入力は暗号文+認証タグの連結。改ざんはタグ検証で検出される。
pub fn aes_gcm_decrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext_and_tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptError)?;
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext_and_tag)
        .map_err(|_| CryptoError::DecryptError)
}
