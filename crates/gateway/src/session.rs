//! # セッションストア
//!
//! 現在有効なセッションを1件だけ保持する。保存時はAES-256-GCMで暗号化し、
//! 平文のセッションをメモリ常駐の構造体として持たない。読み出しで復号・
//! 検証に失敗した場合は「セッションなし」として扱い、呼び出し側に
//! Register+Loginのやり直しを促す。

use std::time::{Duration, Instant};

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::RwLock;

use sepidar_types::{EncryptedRecord, Session};

use crate::error::GatewayError;

/// GCM認証タグの長さ（バイト）
const TAG_LEN: usize = 16;

/// 暗号化済みセッションとノンス・期限の組。
struct StoredRecord {
    record: EncryptedRecord,
    nonce: [u8; 12],
    expires_at: Option<Instant>,
}

/// 単一セッションの暗号化ストア。
pub struct SessionStore {
    key: [u8; 32],
    ttl: Option<Duration>,
    current: RwLock<Option<StoredRecord>>,
}

impl SessionStore {
    pub fn new(key: [u8; 32], ttl: Option<Duration>) -> Self {
        Self {
            key,
            ttl,
            current: RwLock::new(None),
        }
    }

    /// セッションを暗号化して保存する。既存のセッションは置き換える。
    pub async fn put(&self, session: &Session) -> Result<(), GatewayError> {
        let plaintext = serde_json::to_vec(session)
            .map_err(|e| GatewayError::Internal(format!("セッションの直列化に失敗しました: {e}")))?;

        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);

        let sealed = sepidar_crypto::aes_gcm_encrypt(&self.key, &nonce, &plaintext)
            .map_err(|e| GatewayError::Internal(format!("セッションの暗号化に失敗しました: {e}")))?;
        if sealed.len() < TAG_LEN {
            return Err(GatewayError::Internal(
                "セッション暗号文が短すぎます".to_string(),
            ));
        }
        let (cipher, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let b64 = base64::engine::general_purpose::STANDARD;
        let record = EncryptedRecord {
            alg: "AESGCM256".to_string(),
            nonce_b64: b64.encode(nonce),
            tag_b64: b64.encode(tag),
            cipher_b64: b64.encode(cipher),
        };

        let mut guard = self.current.write().await;
        *guard = Some(StoredRecord {
            record,
            nonce,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        });
        Ok(())
    }

    /// 現在のセッションを復号して返す。
    ///
    /// 未保存・期限切れ・復号失敗・逆直列化失敗はすべて`None`。
    /// 部分的に壊れたセッションを返すことはない。
    pub async fn get(&self) -> Option<Session> {
        let guard = self.current.read().await;
        let stored = guard.as_ref()?;

        if let Some(expires_at) = stored.expires_at {
            if Instant::now() >= expires_at {
                return None;
            }
        }

        let b64 = base64::engine::general_purpose::STANDARD;
        let cipher = b64.decode(&stored.record.cipher_b64).ok()?;
        let tag = b64.decode(&stored.record.tag_b64).ok()?;
        let mut sealed = cipher;
        sealed.extend_from_slice(&tag);

        let plaintext = sepidar_crypto::aes_gcm_decrypt(&self.key, &stored.nonce, &sealed).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }

}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sample_session() -> Session {
        Session {
            serial: "SN-4477889900".to_string(),
            integration_id: 4477,
            generation_version: 110,
            public_key_xml: None,
            rsa_modulus_b64: Some("AQAB".to_string()),
            rsa_exponent_b64: Some("AQAB".to_string()),
            authorization: Some("Bearer token-1".to_string()),
            created_at: 1_700_000_000,
        }
    }

    /// 保存と読み出しの往復を確認
    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SessionStore::new([7u8; 32], None);
        assert!(store.get().await.is_none());

        store.put(&sample_session()).await.unwrap();
        let loaded = store.get().await.unwrap();
        assert_eq!(loaded.serial, "SN-4477889900");
        assert_eq!(loaded.integration_id, 4477);
        assert_eq!(loaded.authorization.as_deref(), Some("Bearer token-1"));
    }

    /// 保存形式がアルゴリズム識別子つきの暗号化レコードであることを確認
    #[tokio::test]
    async fn test_stored_record_shape() {
        let store = SessionStore::new([7u8; 32], None);
        store.put(&sample_session()).await.unwrap();

        let guard = store.current.read().await;
        let stored = guard.as_ref().unwrap();
        assert_eq!(stored.record.alg, "AESGCM256");
        let b64 = base64::engine::general_purpose::STANDARD;
        assert_eq!(b64.decode(&stored.record.nonce_b64).unwrap().len(), 12);
        assert_eq!(b64.decode(&stored.record.tag_b64).unwrap().len(), 16);
        // 暗号文に平文のシリアルが現れない
        let cipher = b64.decode(&stored.record.cipher_b64).unwrap();
        assert!(!String::from_utf8_lossy(&cipher).contains("SN-4477889900"));
    }

    /// 鍵が違うストアでは読み出せないことを確認
    #[tokio::test]
    async fn test_wrong_key_yields_none() {
        let store = SessionStore::new([7u8; 32], None);
        store.put(&sample_session()).await.unwrap();

        let other = SessionStore::new([8u8; 32], None);
        {
            let guard = store.current.read().await;
            let stored = guard.as_ref().unwrap();
            let mut other_guard = other.current.write().await;
            *other_guard = Some(StoredRecord {
                record: stored.record.clone(),
                nonce: stored.nonce,
                expires_at: None,
            });
        }
        assert!(other.get().await.is_none());
    }

    /// TTL経過後に読み出しがNoneになることを確認
    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = SessionStore::new([7u8; 32], Some(Duration::from_millis(20)));
        store.put(&sample_session()).await.unwrap();
        assert!(store.get().await.is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get().await.is_none());
    }

    /// 並行put/getで壊れたセッションが観測されないことを確認
    #[tokio::test]
    async fn test_concurrent_put_get() {
        let store = Arc::new(SessionStore::new([7u8; 32], None));
        store.put(&sample_session()).await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..50u64 {
                    let mut session = sample_session();
                    session.created_at = i;
                    store.put(&session).await.unwrap();
                }
            })
        };
        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..50 {
                    // 常に完全なセッションが読めるか、Noneになるかのどちらか
                    if let Some(session) = store.get().await {
                        assert_eq!(session.serial, "SN-4477889900");
                        assert_eq!(session.integration_id, 4477);
                    }
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();
    }
}
