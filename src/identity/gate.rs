//! The auth gate: resolves one (identifier, secret) credential pair per
//! request into exactly one [`AuthResult`]. No cross-request state is kept
//! here; accounts live in the store and tokens in the token service.

use crate::error::{AppError, AppResult};
use crate::storage::SharedStore;
use crate::{security, tprintln};

use super::principal::Principal;
use super::token::{Token, TokenService};

/// Why a credential pair failed to resolve. Confirmation gating is not a
/// rejection: an unconfirmed account still authenticates, and gated
/// operations refuse it afterwards with 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidCredentials,
}

/// Outcome of one authentication attempt. `Anonymous` is a valid successful
/// outcome for endpoints serving public data. `token_used` records which path
/// resolved the principal; token-authenticated callers may not mint further
/// tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Anonymous,
    Authenticated { principal: Principal, token_used: bool },
    Rejected(RejectReason),
}

pub struct AuthGate {
    store: SharedStore,
    tokens: TokenService,
}

impl AuthGate {
    pub fn new(store: SharedStore, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Resolve a credential pair.
    ///
    /// Both fields empty means the caller is an anonymous visitor. Otherwise
    /// the identifier is first tried as a token (the secret is ignored on
    /// that path), then as an email or username paired with a password.
    pub fn resolve(&self, identifier: &str, secret: &str) -> AuthResult {
        if identifier.is_empty() && secret.is_empty() {
            return AuthResult::Anonymous;
        }
        if let Some(principal) = self.tokens.verify(identifier) {
            tprintln!("gate.resolve token user={}", principal.username);
            return AuthResult::Authenticated { principal, token_used: true };
        }
        if let Some(user) = self.store.find_by_identifier(identifier) {
            if security::verify_password(&user.password_hash, secret) {
                tprintln!("gate.resolve password user={}", user.username);
                return AuthResult::Authenticated {
                    principal: Principal::from_user(&user),
                    token_used: false,
                };
            }
        }
        AuthResult::Rejected(RejectReason::InvalidCredentials)
    }

    /// Issue a token for an already-authenticated caller. Refused for
    /// anonymous callers, token-authenticated callers and unconfirmed
    /// accounts. Returns the token and its validity window in seconds.
    pub fn issue_token(&self, result: &AuthResult) -> AppResult<(Token, u64)> {
        match result {
            AuthResult::Authenticated { token_used: true, .. } => Err(AppError::auth(
                "token_for_token",
                "cannot request a token with a token",
            )),
            AuthResult::Authenticated { principal, .. } => {
                if !principal.confirmed {
                    return Err(AppError::forbidden("unconfirmed", "unconfirmed account"));
                }
                let token = self.tokens.issue(principal.clone())?;
                Ok((token, self.tokens.ttl().as_secs()))
            }
            AuthResult::Anonymous | AuthResult::Rejected(_) => {
                Err(AppError::auth("invalid_credentials", "invalid credentials"))
            }
        }
    }
}

/// Confirmation gating for protected operations: only an authenticated and
/// confirmed principal passes; anonymous callers get 401, authenticated but
/// unconfirmed callers get 403.
pub fn confirmed_principal(result: &AuthResult) -> AppResult<&Principal> {
    match result {
        AuthResult::Authenticated { principal, .. } if principal.confirmed => Ok(principal),
        AuthResult::Authenticated { .. } => {
            Err(AppError::forbidden("unconfirmed", "unconfirmed account"))
        }
        AuthResult::Anonymous => Err(AppError::auth("unauthenticated", "authentication required")),
        AuthResult::Rejected(RejectReason::InvalidCredentials) => {
            Err(AppError::auth("invalid_credentials", "invalid credentials"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate_with_users() -> (AuthGate, SharedStore) {
        let store = SharedStore::new(None);
        let tokens = TokenService::new(Duration::from_secs(60));
        store.register("john@example.com", "john", "cat").unwrap();
        (AuthGate::new(store.clone(), tokens), store)
    }

    fn confirm(store: &SharedStore, identifier: &str) {
        let u = store.find_by_identifier(identifier).unwrap();
        store.set_confirmed(u.id, true).unwrap();
    }

    #[test]
    fn empty_credentials_resolve_anonymous() {
        let (gate, _) = gate_with_users();
        assert_eq!(gate.resolve("", ""), AuthResult::Anonymous);
    }

    #[test]
    fn password_path_accepts_email_or_username() {
        let (gate, _) = gate_with_users();
        for identifier in ["john@example.com", "john"] {
            match gate.resolve(identifier, "cat") {
                AuthResult::Authenticated { principal, token_used } => {
                    assert_eq!(principal.username, "john");
                    assert!(!token_used);
                }
                other => panic!("expected authentication, got {:?}", other),
            }
        }
    }

    #[test]
    fn mistyped_secret_is_rejected() {
        let (gate, _) = gate_with_users();
        assert_eq!(
            gate.resolve("john@example.com", "dog"),
            AuthResult::Rejected(RejectReason::InvalidCredentials)
        );
        assert_eq!(
            gate.resolve("nobody@example.com", "cat"),
            AuthResult::Rejected(RejectReason::InvalidCredentials)
        );
    }

    #[test]
    fn token_path_resolves_and_ignores_secret() {
        let (gate, store) = gate_with_users();
        confirm(&store, "john");
        let auth = gate.resolve("john@example.com", "cat");
        let (token, _ttl) = gate.issue_token(&auth).unwrap();
        // Secret field is ignored on the token path.
        for secret in ["", "whatever"] {
            match gate.resolve(&token, secret) {
                AuthResult::Authenticated { principal, token_used } => {
                    assert_eq!(principal.username, "john");
                    assert!(token_used);
                }
                other => panic!("expected token authentication, got {:?}", other),
            }
        }
    }

    #[test]
    fn token_authenticated_caller_cannot_mint_tokens() {
        let (gate, store) = gate_with_users();
        confirm(&store, "john");
        let auth = gate.resolve("john@example.com", "cat");
        let (token, _) = gate.issue_token(&auth).unwrap();
        let via_token = gate.resolve(&token, "");
        let err = gate.issue_token(&via_token).unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn unconfirmed_principal_is_gated_not_rejected() {
        let (gate, _) = gate_with_users();
        let auth = gate.resolve("john@example.com", "cat");
        // Authentication itself succeeded.
        assert!(matches!(auth, AuthResult::Authenticated { .. }));
        // The gated operation refuses with 403.
        let err = confirmed_principal(&auth).unwrap_err();
        assert_eq!(err.http_status(), 403);
        // Token issuance is a gated operation too.
        let err = gate.issue_token(&auth).unwrap_err();
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn anonymous_fails_gated_operations_with_401() {
        let err = confirmed_principal(&AuthResult::Anonymous).unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn expired_token_falls_through_to_rejection() {
        let store = SharedStore::new(None);
        let tokens = TokenService::new(Duration::ZERO);
        store.register("john@example.com", "john", "cat").unwrap();
        let u = store.find_by_identifier("john").unwrap();
        store.set_confirmed(u.id, true).unwrap();
        let gate = AuthGate::new(store, tokens);
        let auth = gate.resolve("john", "cat");
        let (token, _) = gate.issue_token(&auth).unwrap();
        // Expired immediately: not a token, not a valid password either.
        assert_eq!(
            gate.resolve(&token, ""),
            AuthResult::Rejected(RejectReason::InvalidCredentials)
        );
    }
}
