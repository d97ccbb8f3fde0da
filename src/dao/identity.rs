use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use uuid::Uuid;

/// Authenticated user behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
}

/// Resolves bearer tokens into users.
///
/// Token issuance lives outside this service; implementations only look tokens up.
pub trait IdentityProvider: Send + Sync {
    /// Return the user owning `token`, or `None` when the token is unknown.
    fn resolve(&self, token: String) -> BoxFuture<'static, Option<UserIdentity>>;
}

/// Fixed token table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenDirectory {
    users: Arc<HashMap<String, UserIdentity>>,
}

impl StaticTokenDirectory {
    /// Build the directory from `(token, identity)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (String, UserIdentity)>) -> Self {
        Self {
            users: Arc::new(entries.into_iter().collect()),
        }
    }
}

impl IdentityProvider for StaticTokenDirectory {
    fn resolve(&self, token: String) -> BoxFuture<'static, Option<UserIdentity>> {
        let users = self.users.clone();
        Box::pin(async move { users.get(token.trim()).cloned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let alice = UserIdentity {
            id: Uuid::new_v4(),
            name: "alice".into(),
        };
        let directory = StaticTokenDirectory::new([("secret".to_string(), alice.clone())]);

        assert_eq!(directory.resolve("secret".into()).await, Some(alice));
        assert_eq!(directory.resolve("other".into()).await, None);
    }
}
