use std::collections::HashSet;

use async_trait::async_trait;

use kiln_protocol::AuthMethod;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub anonymous: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".into(),
            anonymous: true,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            anonymous: false,
        }
    }
}

/// Credentials presented with a request, parsed from `Authorization`.
pub type Credentials = AuthMethod;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Read { stream: String },
    Write { stream: String },
}

impl Action {
    pub fn stream(&self) -> &str {
        match self {
            Self::Read { stream } | Self::Write { stream } => stream,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { stream } => write!(f, "read:{stream}"),
            Self::Write { stream } => write!(f, "write:{stream}"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

/// Accepts any credentials and permits every action.
pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => Ok(Identity::user(token_name(token))),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Accepts only a fixed set of bearer tokens.
///
/// Token holders may read and write every stream. Anonymous callers may
/// read when `allow_anonymous_read` is set and never write.
pub struct StaticTokenAuth {
    tokens: HashSet<String>,
    allow_anonymous_read: bool,
}

impl StaticTokenAuth {
    pub fn new<I, S>(tokens: I, allow_anonymous_read: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            allow_anonymous_read,
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) if self.tokens.contains(token) => {
                Ok(Identity::user(token_name(token)))
            }
            Credentials::Bearer(_) => Err(ServerError::AuthFailed("unknown token".into())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool> {
        Ok(match action {
            Action::Read { .. } => !identity.anonymous || self.allow_anonymous_read,
            Action::Write { .. } => !identity.anonymous,
        })
    }
}

/// Loggable name for a token: its first few characters only.
fn token_name(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("bearer:{prefix}")
}
