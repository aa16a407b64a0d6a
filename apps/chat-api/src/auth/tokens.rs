//! Opaque bearer token management.
//!
//! Tokens are random, carry no claims, and resolve to a user ID through the
//! key-value store. Expiry is enforced by the store's TTL.

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Bearer token TTL in seconds (24 hours).
pub const TOKEN_TTL_SECS: u64 = 24 * 3600;

/// Data stored alongside a bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
}

/// Generate an opaque random bearer token.
pub fn generate_token() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = [0u8; 32];
    rand::thread_rng().fill(&mut buf[..]);
    format!(
        "{}_{}",
        chat_common::id::prefix::TOKEN,
        URL_SAFE_NO_PAD.encode(buf)
    )
}

fn key_for(token: &str) -> String {
    format!("chat:token:{token}")
}

pub async fn store_token(
    kv: &dyn KeyValueStore,
    token: &str,
    data: &TokenData,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(data).map_err(|_| ApiError::internal("serialization"))?;
    kv.set_ex(&key_for(token), &value, TOKEN_TTL_SECS).await
}

pub async fn lookup_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<TokenData>, ApiError> {
    match kv.get(&key_for(token)).await? {
        Some(v) => {
            let data: TokenData =
                serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt token data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

pub async fn revoke_token(kv: &dyn KeyValueStore, token: &str) -> Result<(), ApiError> {
    kv.del(&key_for(token)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryKv;

    #[tokio::test]
    async fn round_trip_and_revoke() {
        let kv = MemoryKv::new();
        let token = generate_token();
        assert!(token.starts_with("tok_"));

        store_token(
            &kv,
            &token,
            &TokenData {
                user_id: "usr_1".to_string(),
            },
        )
        .await
        .unwrap();

        let data = lookup_token(&kv, &token).await.unwrap().unwrap();
        assert_eq!(data.user_id, "usr_1");

        revoke_token(&kv, &token).await.unwrap();
        assert!(lookup_token(&kv, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_none() {
        let kv = MemoryKv::new();
        assert!(lookup_token(&kv, "tok_missing").await.unwrap().is_none());
    }
}
