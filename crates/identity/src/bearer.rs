//! Bearer-key authentication and the local-admin bootstrap (spec §4.6 items
//! 1 and 3), grounded on `examples/original_source/ollama_x/api/security.py`
//! (`authenticate`) and `api/helpers.py` (`admin_user`).

use std::sync::Arc;

use ollamax_core::{user::GUEST_USERNAME, Error, Result, User};
use ollamax_store::{filter, Repository};

/// The sentinel credential that, when anonymous access is enabled, is
/// synthesized into a transient guest user instead of looked up (spec §4.6
/// item 1).
const ANONYMOUS_SENTINEL: &str = "undefined";

/// The literal key the local-admin bootstrap recognizes (spec §4.6 item 3).
const LOCAL_ADMIN_KEY: &str = "admin";

pub struct BearerAuth {
    users: Arc<dyn Repository<User>>,
    anonymous_allowed: bool,
}

impl BearerAuth {
    pub fn new(users: Arc<dyn Repository<User>>, anonymous_allowed: bool) -> Self {
        Self {
            users,
            anonymous_allowed,
        }
    }

    /// Authenticate a plain bearer credential (spec §4.6 item 1): exact key
    /// match, or a transient guest when anonymous access is enabled and the
    /// credential is the sentinel `"undefined"`.
    pub async fn authenticate(&self, credential: &str) -> Result<User> {
        if self.anonymous_allowed && credential == ANONYMOUS_SENTINEL {
            return Ok(User::guest());
        }

        let key = credential.to_string();
        self.users
            .find_one(filter(move |u: &User| u.key == key))
            .await
            .map_err(|_| Error::AccessDenied)
    }

    /// Authenticate an admin-scoped bearer credential, including the
    /// local-admin bootstrap (spec §4.6 item 3): from a local peer, the
    /// literal key `"admin"` creates `{username:"admin", key:"admin",
    /// is_admin:true}` the first time it's seen if no admin exists yet. The
    /// same literal key from a non-local peer is denied even if such a user
    /// already exists.
    pub async fn authenticate_admin(&self, credential: &str, peer_is_local: bool) -> Result<User> {
        if peer_is_local && credential == LOCAL_ADMIN_KEY {
            let has_admin = self
                .users
                .iterate(filter(|u: &User| u.is_admin))
                .await?
                .into_iter()
                .next()
                .is_some();

            if !has_admin {
                let admin = User::new(LOCAL_ADMIN_KEY, Some(LOCAL_ADMIN_KEY.to_string()), true)?;
                return self.users.insert(admin).await;
            }
        }

        let key = credential.to_string();
        let user = self
            .users
            .find_one(filter(move |u: &User| u.key == key && u.is_admin))
            .await
            .map_err(|_| Error::AccessDenied)?;

        if !peer_is_local && user.key == LOCAL_ADMIN_KEY {
            return Err(Error::AccessDenied);
        }

        Ok(user)
    }
}

/// Guest users are recognized by the reserved `guest` username everywhere
/// downstream, not by a type-level marker (spec §3).
pub fn is_guest(user: &User) -> bool {
    user.username == GUEST_USERNAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollamax_store::InMemoryRepository;

    fn store() -> Arc<dyn Repository<User>> {
        Arc::new(InMemoryRepository::<User>::new("user"))
    }

    #[tokio::test]
    async fn anonymous_sentinel_synthesizes_a_guest_when_allowed() {
        let auth = BearerAuth::new(store(), true);
        let user = auth.authenticate("undefined").await.unwrap();
        assert!(is_guest(&user));
    }

    #[tokio::test]
    async fn anonymous_sentinel_is_rejected_when_disallowed() {
        let auth = BearerAuth::new(store(), false);
        assert!(matches!(
            auth.authenticate("undefined").await,
            Err(Error::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn unknown_key_is_denied() {
        let auth = BearerAuth::new(store(), false);
        assert!(matches!(
            auth.authenticate("nope").await,
            Err(Error::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn known_key_authenticates() {
        let users = store();
        let user = User::new("alice-user", Some("secret-key".into()), false).unwrap();
        users.insert(user.clone()).await.unwrap();

        let auth = BearerAuth::new(users, false);
        let found = auth.authenticate("secret-key").await.unwrap();
        assert_eq!(found.username, "alice-user");
    }

    #[tokio::test]
    async fn local_admin_bootstrap_creates_admin_once() {
        let users = store();
        let auth = BearerAuth::new(users.clone(), false);

        let admin = auth.authenticate_admin("admin", true).await.unwrap();
        assert!(admin.is_admin);

        // Second call: admin already exists, so the literal key must
        // resolve to the now-persisted admin rather than create another.
        let again = auth.authenticate_admin("admin", true).await.unwrap();
        assert_eq!(again.id, admin.id);
    }

    #[tokio::test]
    async fn local_admin_key_from_non_local_peer_is_denied_even_if_user_exists() {
        let users = store();
        let auth = BearerAuth::new(users.clone(), false);
        auth.authenticate_admin("admin", true).await.unwrap();

        assert!(matches!(
            auth.authenticate_admin("admin", false).await,
            Err(Error::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn non_admin_user_cannot_authenticate_as_admin() {
        let users = store();
        users
            .insert(User::new("regular-user", Some("regular-key".into()), false).unwrap())
            .await
            .unwrap();
        let auth = BearerAuth::new(users, false);
        assert!(matches!(
            auth.authenticate_admin("regular-key", false).await,
            Err(Error::AccessDenied)
        ));
    }
}
