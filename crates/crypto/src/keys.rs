//! # シリアルからの鍵導出ヒューリスティクス
//!
//! アップストリームの真の鍵導出規則は公開されていない。そのため候補鍵を
//! 決まった順序で列挙し、受信済みデータに対して順に試す（ネットワーク再試行
//! ではなくオフラインの全数試行）。順序を変えると同じシリアルで報告される
//! 戦略名が変わるため、並びと名前は回帰テストで固定している。

use crate::CryptoError;

/// 候補鍵の長さ（AES-128鍵 = 16バイト）
const KEY_LEN: usize = 16;

/// シリアルから候補鍵を導出順に列挙する。
///
/// 戦略名はアップストリーム診断・回帰固定のためのプロトコル定数であり、
/// 応答にそのまま現れる。シリアルに数字が1つ以上あれば7件、なければ5件。
pub fn candidate_keys(serial: &str) -> Result<Vec<(String, &'static str)>, CryptoError> {
    let serial = serial.trim();
    let digits = digits_only(serial);

    let mut candidates = Vec::with_capacity(7);
    let doubled = format!("{serial}{serial}");
    candidates.push((cut_or_repeat(&doubled, KEY_LEN)?, "Serial+Serial Left16"));
    candidates.push((cut_or_repeat(serial, KEY_LEN)?, "Serial Left16"));
    if !digits.is_empty() {
        candidates.push((cut_or_repeat(&digits, KEY_LEN)?, "Digits Left/Repeat16"));
    }
    candidates.push((repeat_to_length(serial, KEY_LEN)?, "Serial RepeatTo16"));
    if !digits.is_empty() {
        candidates.push((repeat_to_length(&digits, KEY_LEN)?, "Digits RepeatTo16"));
    }
    let upper = serial.to_uppercase();
    let lower = serial.to_lowercase();
    let upper_doubled = format!("{upper}{upper}");
    let lower_doubled = format!("{lower}{lower}");
    candidates.push((
        cut_or_repeat(&upper_doubled, KEY_LEN)?,
        "Upper Serial+Serial Left16",
    ));
    candidates.push((
        cut_or_repeat(&lower_doubled, KEY_LEN)?,
        "Lower Serial+Serial Left16",
    ));

    Ok(candidates)
}

/// 送信側（レジスタ封筒）の一次鍵: シリアルを2連結して16文字に切り詰め/繰り返し。
/// 受信側の候補試行リストとは独立に、この規則だけを使う。
pub fn primary_key(serial: &str) -> Result<String, CryptoError> {
    let serial = serial.trim();
    if serial.is_empty() {
        return Err(CryptoError::EmptySerial);
    }
    let doubled = format!("{serial}{serial}");
    cut_or_repeat(&doubled, KEY_LEN)
}

/// シリアルの数字を出現順に`digit_count`文字取り出し、非負整数として解釈する。
pub fn extract_integration_id(serial: &str, digit_count: usize) -> Result<u32, CryptoError> {
    if digit_count == 0 {
        return Err(CryptoError::IntegrationIdParse);
    }
    let digits = digits_only(serial.trim());
    if digits.len() < digit_count {
        return Err(CryptoError::InsufficientDigits {
            needed: digit_count,
        });
    }
    digits[..digit_count]
        .parse::<u32>()
        .map_err(|_| CryptoError::IntegrationIdParse)
}

/// 長さ`len`以上なら先頭`len`文字、足りなければ巡回連結して`len`文字。
fn cut_or_repeat(s: &str, len: usize) -> Result<String, CryptoError> {
    if s.is_empty() {
        return Err(CryptoError::EmptySerial);
    }
    if s.chars().count() >= len {
        Ok(s.chars().take(len).collect())
    } else {
        repeat_to_length(s, len)
    }
}

/// 巡回連結して正確に`len`文字。種文字列が空ならエラー。
fn repeat_to_length(s: &str, len: usize) -> Result<String, CryptoError> {
    if s.is_empty() {
        return Err(CryptoError::EmptySerial);
    }
    Ok(s.chars().cycle().take(len).collect())
}

/// シリアルからASCII数字だけを出現順に取り出す。
fn digits_only(serial: &str) -> String {
    serial.chars().filter(|c| c.is_ascii_digit()).collect()
}
