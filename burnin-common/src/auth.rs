//! Session token signing and verification
//!
//! The sign-in gateway sets a `burnin_session` cookie whose value is
//! `base64url(claims_json) "." signature`, where the signature is the SHA-256
//! of the canonical claims JSON followed by the shared secret as a decimal
//! string. The shared secret lives in the `settings` table; the special value
//! 0 disables session checking.
//!
//! This module has no HTTP framework dependencies; the dashboard wraps it in
//! axum middleware.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "burnin_session";

/// `settings` key holding the shared secret
pub const SECRET_SETTING_KEY: &str = "session_shared_secret";

/// Authenticated user attached to each request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub email: String,
    pub name: String,
}

impl SessionUser {
    /// Identity used when session checking is disabled
    pub fn anonymous() -> Self {
        Self {
            email: "anonymous@localhost".to_string(),
            name: "Anonymous".to_string(),
        }
    }
}

/// Signed token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    pub name: String,
    /// Expiry as Unix seconds
    pub exp: i64,
}

/// Session validation failures
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Token is not `payload.signature` or the payload does not decode
    Malformed(String),

    /// Signature does not match the payload
    InvalidSignature,

    /// Token expiry is in the past
    Expired { exp: i64, now: i64 },

    /// Database error loading the shared secret
    DatabaseError(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Malformed(reason) => write!(f, "Malformed session token: {}", reason),
            SessionError::InvalidSignature => write!(f, "Invalid session signature"),
            SessionError::Expired { exp, now } => {
                write!(f, "Session expired {}s ago", now - exp)
            }
            SessionError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for SessionError {}

// ========================================
// Shared Secret Management
// ========================================

/// Load the shared secret, generating and storing one on first use
pub async fn load_session_secret(db: &SqlitePool) -> Result<i64, SessionError> {
    let result: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SECRET_SETTING_KEY)
        .fetch_optional(db)
        .await
        .map_err(|e| SessionError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| SessionError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_session_secret(db).await,
    }
}

/// Generate a random non-zero secret and store it
pub async fn initialize_session_secret(db: &SqlitePool) -> Result<i64, SessionError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    store_session_secret(db, secret).await?;
    Ok(secret)
}

/// Overwrite the shared secret (0 disables session checking)
pub async fn store_session_secret(db: &SqlitePool, secret: i64) -> Result<(), SessionError> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SECRET_SETTING_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| SessionError::DatabaseError(e.to_string()))?;
    Ok(())
}

// ========================================
// Signing
// ========================================

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// # Examples
///
/// ```
/// use burnin_common::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": 1}));
/// assert_eq!(canonical, "{\"a\":1,\"z\":3}");
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", json_string(k), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => json_string(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// JSON string literal with standard escaping (control characters included)
fn json_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// SHA-256 of canonical JSON + secret, as 64 hex characters
pub fn calculate_signature(payload: &Value, shared_secret: i64) -> String {
    let to_hash = format!("{}{}", to_canonical_json(payload), shared_secret);
    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Produce a cookie value for the given claims
pub fn issue_token(claims: &SessionClaims, shared_secret: i64) -> Result<String, SessionError> {
    let payload =
        serde_json::to_value(claims).map_err(|e| SessionError::Malformed(e.to_string()))?;
    let wire = serde_json::to_vec(&payload).map_err(|e| SessionError::Malformed(e.to_string()))?;
    let encoded = URL_SAFE_NO_PAD.encode(wire);
    Ok(format!(
        "{}.{}",
        encoded,
        calculate_signature(&payload, shared_secret)
    ))
}

/// Verify a cookie value and return the user it names
///
/// `now` is Unix seconds; tokens with `exp <= now` are rejected.
pub fn verify_token(token: &str, shared_secret: i64, now: i64) -> Result<SessionUser, SessionError> {
    let (encoded, signature) = token
        .split_once('.')
        .ok_or_else(|| SessionError::Malformed("missing signature".to_string()))?;

    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| SessionError::Malformed(format!("bad base64: {}", e)))?;
    let payload: Value = serde_json::from_slice(&raw)
        .map_err(|e| SessionError::Malformed(format!("bad JSON: {}", e)))?;

    let expected = calculate_signature(&payload, shared_secret);
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(SessionError::InvalidSignature);
    }

    let claims: SessionClaims = serde_json::from_value(payload)
        .map_err(|e| SessionError::Malformed(format!("missing claims: {}", e)))?;

    if claims.exp <= now {
        return Err(SessionError::Expired {
            exp: claims.exp,
            now,
        });
    }

    Ok(SessionUser {
        email: claims.email,
        name: claims.name,
    })
}

/// Expiry `hours` after `now` (Unix seconds); None on overflow
pub fn expiry_after_hours(now: i64, hours: i64) -> Option<i64> {
    hours.checked_mul(3600).and_then(|secs| now.checked_add(secs))
}

/// Byte comparison whose running time does not depend on where inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Current time as Unix seconds
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
