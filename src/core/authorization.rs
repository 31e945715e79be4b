//! Capability checks composed around handlers.
//!
//! The tiers are strictly nested: a permission check first runs the
//! activation check, which first runs the authentication check. A handler
//! guarded by a permission is therefore never reachable by an anonymous or
//! deactivated identity, whatever the permission lookup would have said.
use serde::Serialize;

use crate::core::{
    error::{AppError, AppResult},
    identity::{Identity, User},
    models::Models,
};

/// Permission codes held by one user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|held| held == code)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Permissions(iter.into_iter().map(Into::into).collect())
    }
}

/// Tier 1: reject the anonymous identity.
pub fn require_authenticated(identity: &Identity) -> AppResult<&User> {
    identity.user().ok_or(AppError::AuthenticationRequired)
}

/// Tier 2: tier 1, then reject accounts that are not activated.
pub fn require_activated(identity: &Identity) -> AppResult<&User> {
    let user = require_authenticated(identity)?;
    if !user.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

/// Tier 3: tier 2, then look up the user's permissions and require `code`.
pub async fn require_permission<'a>(
    identity: &'a Identity,
    code: &str,
    models: &Models,
) -> AppResult<&'a User> {
    let user = require_activated(identity)?;
    let permissions = models
        .bounded(models.permissions.get_all_for_user(user.id))
        .await
        .map_err(AppError::internal)?;
    if !permissions.includes(code) {
        return Err(AppError::NotPermitted);
    }
    Ok(user)
}

/// A route guard, applied as middleware in front of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Authenticated,
    Activated,
    Permitted(&'static str),
}

impl Gate {
    pub async fn check<'a>(&self, identity: &'a Identity, models: &Models) -> AppResult<&'a User> {
        match self {
            Gate::Authenticated => require_authenticated(identity),
            Gate::Activated => require_activated(identity),
            Gate::Permitted(code) => require_permission(identity, code, models).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        adapters::InMemoryStore,
        ports::{PermissionStore, UserStore},
    };

    async fn fixture(activated: bool, codes: &[&str]) -> (Models, Identity) {
        let store = Arc::new(InMemoryStore::new());
        let mut user = User::draft("Cy".into(), "cy@example.com".into(), String::new());
        user.activated = activated;
        UserStore::insert(store.as_ref(), &mut user).await.unwrap();
        store.add_for_user(user.id, codes).await.unwrap();
        (
            Models::from_store(store, Duration::from_secs(1)),
            Identity::from(user),
        )
    }

    #[tokio::test]
    async fn test_anonymous_is_rejected_by_every_tier() {
        let (models, _) = fixture(true, &["movies:read"]).await;
        for gate in [
            Gate::Authenticated,
            Gate::Activated,
            Gate::Permitted("movies:read"),
        ] {
            assert!(matches!(
                gate.check(&Identity::Anonymous, &models).await,
                Err(AppError::AuthenticationRequired)
            ));
        }
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected_even_with_permission() {
        let (models, identity) = fixture(false, &["movies:write"]).await;
        assert!(Gate::Authenticated.check(&identity, &models).await.is_ok());
        assert!(matches!(
            Gate::Permitted("movies:write").check(&identity, &models).await,
            Err(AppError::InactiveAccount)
        ));
    }

    #[tokio::test]
    async fn test_activated_user_needs_the_specific_code() {
        let (models, identity) = fixture(true, &["movies:read"]).await;
        assert!(Gate::Permitted("movies:read").check(&identity, &models).await.is_ok());
        assert!(matches!(
            Gate::Permitted("movies:write").check(&identity, &models).await,
            Err(AppError::NotPermitted)
        ));
    }

    #[test]
    fn test_permissions_includes() {
        let permissions: Permissions = ["movies:read", "movies:write"].into_iter().collect();
        assert!(permissions.includes("movies:write"));
        assert!(!permissions.includes("movies:delete"));
    }
}
