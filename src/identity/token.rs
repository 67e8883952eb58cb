use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use base64::Engine;
use parking_lot::RwLock;

use crate::tprintln;

use super::principal::Principal;

pub type Token = String;

#[derive(Debug, Clone)]
struct TokenEntry {
    principal: Principal,
    expires_at: Instant,
}

/// Issues and verifies opaque, time-bounded tokens. Each token is bound to
/// exactly one principal and is never derivable from the account password.
/// All state is owned by the service instance; clones share the same maps.
#[derive(Clone)]
pub struct TokenService {
    ttl: Duration,
    tokens: Arc<RwLock<HashMap<Token, TokenEntry>>>,
    revoked: Arc<RwLock<HashSet<Token>>>,
}

fn gen_token() -> Result<Token> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl Default for TokenService {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl TokenService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Arc::new(RwLock::new(HashMap::new())),
            revoked: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token bound to the principal, valid for the fixed window.
    /// Fails only if the system RNG does; a token is never minted from a
    /// partially filled buffer.
    pub fn issue(&self, principal: Principal) -> Result<Token> {
        let token = gen_token()?;
        let entry = TokenEntry { principal: principal.clone(), expires_at: Instant::now() + self.ttl };
        self.tokens.write().insert(token.clone(), entry);
        tprintln!("token.issue user={} ttl_secs={}", principal.username, self.ttl.as_secs());
        Ok(token)
    }

    /// Resolve a token to its principal. Unknown, expired and revoked tokens
    /// all yield `None`; expired entries are dropped, never returned stale.
    pub fn verify(&self, token: &str) -> Option<Principal> {
        if self.revoked.read().contains(token) {
            return None;
        }
        let now = Instant::now();
        let mut drop_key: Option<Token> = None;
        let out = {
            let map = self.tokens.read();
            match map.get(token) {
                Some(entry) if entry.expires_at > now => Some(entry.principal.clone()),
                Some(_) => {
                    drop_key = Some(token.to_string());
                    None
                }
                None => None,
            }
        };
        if let Some(k) = drop_key {
            self.tokens.write().remove(&k);
        }
        out
    }

    pub fn revoke(&self, token: &str) -> bool {
        let removed = self.tokens.write().remove(token).is_some();
        if removed {
            self.revoked.write().insert(token.to_string());
            tprintln!("token.revoke");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    fn principal() -> Principal {
        Principal {
            user_id: 7,
            email: "john@example.com".into(),
            username: "john".into(),
            confirmed: true,
            role: Role::User,
        }
    }

    #[test]
    fn verify_is_idempotent_within_window() {
        let svc = TokenService::new(Duration::from_secs(60));
        let token = svc.issue(principal()).expect("issue");
        let first = svc.verify(&token).expect("valid");
        let second = svc.verify(&token).expect("still valid");
        assert_eq!(first, second);
        assert_eq!(first.user_id, 7);
    }

    #[test]
    fn unknown_and_tampered_tokens_fail() {
        let svc = TokenService::default();
        assert!(svc.verify("bad-token").is_none());
        let token = svc.issue(principal()).expect("issue");
        let tampered = format!("{}x", token);
        assert!(svc.verify(&tampered).is_none());
    }

    #[test]
    fn expired_tokens_never_resolve() {
        let svc = TokenService::new(Duration::ZERO);
        let token = svc.issue(principal()).expect("issue");
        assert!(svc.verify(&token).is_none());
        // Still gone on the second attempt; the entry was pruned.
        assert!(svc.verify(&token).is_none());
    }

    #[test]
    fn revoked_tokens_never_resolve() {
        let svc = TokenService::new(Duration::from_secs(60));
        let token = svc.issue(principal()).expect("issue");
        assert!(svc.revoke(&token));
        assert!(svc.verify(&token).is_none());
        assert!(!svc.revoke(&token));
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let svc = TokenService::default();
        let a = svc.issue(principal()).expect("issue");
        let b = svc.issue(principal()).expect("issue");
        assert_ne!(a, b);
    }
}
