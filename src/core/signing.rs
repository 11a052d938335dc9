//! HMAC-SHA256 request signatures for each supported exchange.
//!
//! All functions are pure: same inputs, same signature. Callers must reject
//! empty secrets before signing.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(secret: &str, message: &[&str]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    for part in message {
        mac.update(part.as_bytes());
    }
    mac.finalize().into_bytes().to_vec()
}

/// Bybit v5: `hex(HMAC(secret, timestamp + api_key + recv_window + query))`.
///
/// `query` must be byte-for-byte the query string sent on the wire.
pub fn sign_bybit(
    secret: &str,
    timestamp: &str,
    api_key: &str,
    recv_window: u64,
    query: &str,
) -> String {
    let recv_window = recv_window.to_string();
    hex::encode(hmac_sha256(
        secret,
        &[timestamp, api_key, &recv_window, query],
    ))
}

/// Binance: `hex(HMAC(secret, query))`, where `query` already carries `timestamp=<ms>`.
pub fn sign_binance(secret: &str, query: &str) -> String {
    hex::encode(hmac_sha256(secret, &[query]))
}

/// OKX v5: `base64(HMAC(secret, timestamp + method + path + body))`.
pub fn sign_okx(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> String {
    BASE64.encode(hmac_sha256(secret, &[timestamp, method, path, body]))
}

/// OKX wants ISO-8601 UTC with millisecond precision, e.g. `2020-12-08T09:08:57.715Z`.
pub fn okx_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_binance_known_signature() {
        // From Binance API docs example
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        assert_eq!(
            sign_binance(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_bybit_signature_concatenates_in_order() {
        let sig = sign_bybit(
            "bybit-secret",
            "1658384314791",
            "bybit-key",
            5000,
            "accountType=UNIFIED",
        );
        assert_eq!(
            sig,
            "20db9008bfe83b5f37ff353523d38b3f6044479a96edcc5d5c836259a5157096"
        );

        // Any change in the signed query changes the signature
        let other = sign_bybit(
            "bybit-secret",
            "1658384314791",
            "bybit-key",
            5000,
            "accountType=SPOT",
        );
        assert_ne!(sig, other);
    }

    #[test]
    fn test_okx_signature_is_base64() {
        let sig = sign_okx(
            "okx-secret",
            "2020-12-08T09:08:57.715Z",
            "GET",
            "/api/v5/account/balance",
            "",
        );
        assert_eq!(sig, "LCWCLwpqXxY1+A5RdBwNPh9ST9nuaMOpVq0ae4qwaAM=");
    }

    #[test]
    fn test_signatures_are_deterministic() {
        assert_eq!(sign_binance("s", "timestamp=1"), sign_binance("s", "timestamp=1"));
        assert_ne!(sign_binance("s", "timestamp=1"), sign_binance("t", "timestamp=1"));
    }

    #[test]
    fn test_okx_timestamp_has_millis() {
        let at = Utc
            .with_ymd_and_hms(2020, 12, 8, 9, 8, 57)
            .unwrap()
            + chrono::Duration::milliseconds(715);
        assert_eq!(okx_timestamp(at), "2020-12-08T09:08:57.715Z");

        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(okx_timestamp(whole), "2024-01-01T00:00:00.000Z");
    }
}
