//! Caller identity and the scope keys derived from it.
//!
//! Every admission decision is made per scope. A caller authenticated with an
//! API token is scoped by token (`t:<tokenId>`); a caller with only a user
//! session is scoped by user (`u:<userId>`). Callers with neither are
//! unscoped and bypass admission control entirely.

use std::fmt;

/// Prefix for burst-window storage keys.
pub const BURST_KEY_PREFIX: &str = "rc:burst:";

/// Prefix for concurrency-counter storage keys.
pub const CONCURRENCY_KEY_PREFIX: &str = "rc:conc:";

/// Identity of the caller as established by upstream authentication.
///
/// Upstream auth reports a missing id as `0`, so zero is treated the same as
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Id of the API token used for the request, if any
    pub token_id: Option<u64>,
    /// Id of the authenticated user, if any
    pub user_id: Option<u64>,
}

impl CallerIdentity {
    /// Identity of a request authenticated with an API token.
    pub fn token(token_id: u64, user_id: u64) -> Self {
        Self {
            token_id: Some(token_id),
            user_id: Some(user_id),
        }
    }

    /// Identity of a request authenticated by user session only.
    pub fn user(user_id: u64) -> Self {
        Self {
            token_id: None,
            user_id: Some(user_id),
        }
    }

    /// Identity of an unauthenticated request.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Resolve the scope key for this caller.
    ///
    /// Returns `None` when the caller has no usable identity.
    pub fn scope_key(&self) -> Option<ScopeKey> {
        ScopeKey::resolve(self)
    }
}

/// Per-caller key that admission state is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Derive the scope key from a caller identity.
    ///
    /// The token id wins over the user id.
    pub fn resolve(identity: &CallerIdentity) -> Option<Self> {
        match (nonzero(identity.token_id), nonzero(identity.user_id)) {
            (Some(token_id), _) => Some(Self(format!("t:{}", token_id))),
            (None, Some(user_id)) => Some(Self(format!("u:{}", user_id))),
            (None, None) => None,
        }
    }

    /// The scope key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for the burst window of this scope.
    pub fn burst_key(&self) -> String {
        format!("{}{}", BURST_KEY_PREFIX, self.0)
    }

    /// Storage key for the concurrency counter of this scope.
    pub fn concurrency_key(&self) -> String {
        format!("{}{}", CONCURRENCY_KEY_PREFIX, self.0)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn nonzero(id: Option<u64>) -> Option<u64> {
    id.filter(|&id| id != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_scope_wins() {
        let key = CallerIdentity::token(7, 42).scope_key().unwrap();
        assert_eq!(key.as_str(), "t:7");
        assert_eq!(key.burst_key(), "rc:burst:t:7");
        assert_eq!(key.concurrency_key(), "rc:conc:t:7");
    }

    #[test]
    fn test_user_scope() {
        let key = CallerIdentity::user(42).scope_key().unwrap();
        assert_eq!(key.to_string(), "u:42");
    }

    #[test]
    fn test_anonymous_is_unscoped() {
        assert_eq!(CallerIdentity::anonymous().scope_key(), None);
    }

    #[test]
    fn test_zero_ids_are_absent() {
        let identity = CallerIdentity {
            token_id: Some(0),
            user_id: Some(9),
        };
        assert_eq!(identity.scope_key().unwrap().as_str(), "u:9");

        let identity = CallerIdentity {
            token_id: Some(0),
            user_id: Some(0),
        };
        assert_eq!(identity.scope_key(), None);
    }
}
