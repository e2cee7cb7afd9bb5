use crate::config::TokenConfig;
use crate::error::{AppError, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Parsed accept/reject token: `t{actionIndex}-{itemId}-{createdAtMs}-{signature}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub action_index: usize,
    pub item_id: String,
    pub created_at_ms: i64,
    pub signature: String,
}

impl ActionToken {
    /// Item ids may contain `-`; the index ends at the first one and the
    /// timestamp and signature are the last two segments
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || AppError::InvalidToken("malformed token".to_string());

        let body = token.strip_prefix('t').ok_or_else(invalid)?;
        let (index, rest) = body.split_once('-').ok_or_else(invalid)?;
        let (rest, signature) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (item_id, created_at) = rest.rsplit_once('-').ok_or_else(invalid)?;

        if item_id.is_empty() || signature.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            action_index: index.parse().map_err(|_| invalid())?,
            item_id: item_id.to_string(),
            created_at_ms: created_at.parse().map_err(|_| invalid())?,
            signature: signature.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "t{}-{}-{}-{}",
            self.action_index, self.item_id, self.created_at_ms, self.signature
        )
    }
}

/// Signs and verifies tokens bound to topic, action index and item.
///
/// The signature is HMAC-SHA256 over `topic:index:item:createdAtMs`, hex encoded.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
    max_age_ms: Option<i64>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("max_age_ms", &self.max_age_ms)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, max_age_secs: Option<u64>) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| AppError::Configuration(format!("invalid token secret: {}", e)))?;
        Ok(Self {
            mac,
            max_age_ms: max_age_secs.map(|s| (s as i64).saturating_mul(1000)),
        })
    }

    pub fn from_config(config: &TokenConfig) -> Result<Self> {
        Self::new(&config.secret, config.max_age_secs)
    }

    fn signature(&self, topic_id: &Uuid, action_index: usize, item_id: &str, created_at_ms: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(
            format!("{}:{}:{}:{}", topic_id, action_index, item_id, created_at_ms).as_bytes(),
        );
        format!("{:x}", mac.finalize().into_bytes())
    }

    pub fn sign(&self, topic_id: &Uuid, action_index: usize, item_id: &str) -> String {
        self.sign_at(topic_id, action_index, item_id, Utc::now().timestamp_millis())
    }

    pub fn sign_at(
        &self,
        topic_id: &Uuid,
        action_index: usize,
        item_id: &str,
        created_at_ms: i64,
    ) -> String {
        ActionToken {
            action_index,
            item_id: item_id.to_string(),
            created_at_ms,
            signature: self.signature(topic_id, action_index, item_id, created_at_ms),
        }
        .encode()
    }

    /// Verify a token for `item_id` within `topic_id`, returning the bound action index
    pub fn verify(&self, token: &str, topic_id: &Uuid, item_id: &str) -> Result<usize> {
        self.verify_at(token, topic_id, item_id, Utc::now().timestamp_millis())
    }

    pub fn verify_at(&self, token: &str, topic_id: &Uuid, item_id: &str, now_ms: i64) -> Result<usize> {
        let parsed = ActionToken::parse(token)?;

        if parsed.item_id != item_id {
            return Err(AppError::InvalidToken("token is bound to another item".to_string()));
        }

        let expected = self.signature(topic_id, parsed.action_index, item_id, parsed.created_at_ms);
        if !constant_time_eq(expected.as_bytes(), parsed.signature.as_bytes()) {
            return Err(AppError::InvalidToken("signature mismatch".to_string()));
        }

        if let Some(max_age) = self.max_age_ms {
            if now_ms.saturating_sub(parsed.created_at_ms) > max_age {
                return Err(AppError::InvalidToken("token expired".to_string()));
            }
        }

        Ok(parsed.action_index)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
