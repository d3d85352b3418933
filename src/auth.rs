//! Password login issuing expiring bearer tokens.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error_codes::CodedError;

const TOKEN_BYTES: usize = 32;

/// Lowercase hex of `len` random bytes from the thread RNG.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(len * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Accepts either a raw token or an `Authorization` header value.
pub fn bearer_token(header: &str) -> &str {
    let trimmed = header.trim();
    trimmed.strip_prefix("Bearer ").unwrap_or(trimmed).trim()
}

pub struct AuthGate {
    password_digest: Option<[u8; 32]>,
    ttl: Duration,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl AuthGate {
    /// An empty or missing password disables login.
    pub fn new(password: Option<&str>, ttl: Duration) -> Self {
        let password_digest = password
            .filter(|p| !p.is_empty())
            .map(|p| sha256(p.as_bytes()));
        Self {
            password_digest,
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn login_enabled(&self) -> bool {
        self.password_digest.is_some()
    }

    pub fn login(&self, password: &str) -> Result<String> {
        self.login_at(password, Instant::now())
    }

    pub fn login_at(&self, password: &str, now: Instant) -> Result<String> {
        let Some(expected) = self.password_digest else {
            return Err(anyhow!(CodedError::unauthorized(
                "LOGIN_DISABLED",
                "no admin password configured"
            )));
        };

        let provided = sha256(password.as_bytes());
        if !constant_time_eq(&expected, &provided) {
            tracing::info!("rejected login attempt");
            return Err(anyhow!(CodedError::unauthorized("WRONG_PASSWORD", "Wrong password")));
        }

        let token = random_hex(TOKEN_BYTES);
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| anyhow!("token store lock poisoned"))?;
        tokens.retain(|_, expires| *expires > now);
        tokens.insert(token.clone(), now + self.ttl);
        tracing::info!(active_tokens = tokens.len(), "issued admin token");
        Ok(token)
    }

    /// Validate a token or `Bearer` header.
    pub fn check(&self, credential: &str) -> Result<()> {
        self.check_at(credential, Instant::now())
    }

    pub fn check_at(&self, credential: &str, now: Instant) -> Result<()> {
        let token = bearer_token(credential);
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| anyhow!("token store lock poisoned"))?;

        match tokens.get(token).copied() {
            Some(expires) if expires > now => Ok(()),
            Some(_) => {
                tokens.remove(token);
                tracing::debug!("expired admin token rejected");
                Err(anyhow!(CodedError::unauthorized("TOKEN_EXPIRED", "Unauthorised")))
            }
            None => Err(anyhow!(CodedError::unauthorized("UNAUTHORISED", "Unauthorised"))),
        }
    }

    pub fn revoke(&self, credential: &str) -> bool {
        let token = bearer_token(credential);
        self.tokens
            .lock()
            .map(|mut tokens| tokens.remove(token).is_some())
            .unwrap_or(false)
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0_u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_codes::find_coded_error;

    fn gate() -> AuthGate {
        AuthGate::new(Some("letmein"), Duration::from_secs(60))
    }

    #[test]
    fn login_issues_64_hex_char_tokens() {
        let token = gate().login("letmein").unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let error = gate().login("nope").unwrap_err();
        let coded = find_coded_error(&error).unwrap();
        assert_eq!(coded.code, "WRONG_PASSWORD");
        assert_eq!(coded.kind.status(), 401);
    }

    #[test]
    fn bearer_header_and_raw_token_both_pass() {
        let gate = gate();
        let token = gate.login("letmein").unwrap();
        gate.check(&token).unwrap();
        gate.check(&format!("Bearer {token}")).unwrap();
        assert!(gate.check("Bearer deadbeef").is_err());
        assert!(gate.check("").is_err());
    }

    #[test]
    fn tokens_expire_after_ttl() {
        let gate = gate();
        let start = Instant::now();
        let token = gate.login_at("letmein", start).unwrap();
        gate.check_at(&token, start + Duration::from_secs(59)).unwrap();

        let error = gate
            .check_at(&token, start + Duration::from_secs(61))
            .unwrap_err();
        assert_eq!(find_coded_error(&error).unwrap().code, "TOKEN_EXPIRED");
        // pruned on first expired use
        let error = gate.check_at(&token, start).unwrap_err();
        assert_eq!(find_coded_error(&error).unwrap().code, "UNAUTHORISED");
    }

    #[test]
    fn revoked_tokens_stop_working() {
        let gate = gate();
        let token = gate.login("letmein").unwrap();
        assert!(gate.revoke(&format!("Bearer {token}")));
        assert!(gate.check(&token).is_err());
        assert!(!gate.revoke(&token));
    }

    #[test]
    fn empty_password_disables_login() {
        let gate = AuthGate::new(Some(""), Duration::from_secs(60));
        assert!(!gate.login_enabled());
        let error = gate.login("").unwrap_err();
        assert_eq!(find_coded_error(&error).unwrap().code, "LOGIN_DISABLED");
    }

    #[test]
    fn random_hex_has_requested_length() {
        assert_eq!(random_hex(8).len(), 16);
        assert_ne!(random_hex(16), random_hex(16));
    }
}
