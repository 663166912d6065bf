//! Bearer authentication for sync requests
//!
//! Every sync RPC carries `authorization: Bearer <token>` metadata. The server
//! resolves the token to a [`UserId`] and scopes every storage call to it;
//! nothing in the request body can claim a different owner. Token issuance
//! (login, registration, JWT signing) lives outside this crate behind
//! [`TokenResolver`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::{Request, Status};

/// Metadata key carrying the bearer credential
pub const AUTHORIZATION: &str = "authorization";

const BEARER_PREFIX: &str = "Bearer ";

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves a bearer token to the user it was issued to
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// `None` when the token is unknown, expired or revoked
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table, for tests and single-user deployments
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, UserId>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user
    pub fn with_token(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl TokenResolver for StaticTokens {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).cloned()
    }
}

/// Wrap a message in a request carrying the bearer token
pub fn with_bearer<T>(message: T, token: &str) -> Result<Request<T>, Status> {
    let value: MetadataValue<Ascii> = format!("{}{}", BEARER_PREFIX, token)
        .parse()
        .map_err(|_| Status::invalid_argument("token contains invalid characters"))?;

    let mut request = Request::new(message);
    request.metadata_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

/// Read the bearer token from request metadata.
///
/// Returns an owned token so the request need not be borrowed across the
/// resolver call.
pub fn bearer_token(metadata: &MetadataMap) -> Result<String, Status> {
    let header = metadata
        .get(AUTHORIZATION)
        .ok_or_else(|| Status::unauthenticated("missing authorization metadata"))?;

    header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Status::unauthenticated("malformed bearer credential"))
}

/// Resolve the caller presenting `token`, rejecting unknown tokens
pub async fn authenticate<A>(resolver: &A, token: &str) -> Result<UserId, Status>
where
    A: TokenResolver + ?Sized,
{
    resolver.resolve(token).await.ok_or_else(|| {
        tracing::warn!("Rejected sync request with unknown token");
        Status::unauthenticated("invalid or expired token")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Empty;

    fn tokens() -> StaticTokens {
        StaticTokens::new().with_token("t-alice", UserId::new("alice"))
    }

    #[tokio::test]
    async fn test_authenticate_valid_token() {
        let request = with_bearer(Empty {}, "t-alice").unwrap();
        let token = bearer_token(request.metadata()).unwrap();
        assert_eq!(token, "t-alice");
        let user = authenticate(&tokens(), &token).await.unwrap();
        assert_eq!(user, UserId::new("alice"));
    }

    #[test]
    fn test_missing_header() {
        let status = bearer_token(Request::new(Empty {}).metadata()).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let status = authenticate(&tokens(), "t-mallory").await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_non_bearer_scheme() {
        let mut request = Request::new(Empty {});
        request
            .metadata_mut()
            .insert(AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        let status = bearer_token(request.metadata()).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_invalid_token_characters() {
        assert!(with_bearer(Empty {}, "bad\ntoken").is_err());
    }
}
