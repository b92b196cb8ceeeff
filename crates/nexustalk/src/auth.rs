use std::sync::Arc;

use nexus_store::{Store, StoreResult, UserId, UserRecord};

pub const PLACEHOLDER_AVATAR: &str = "/placeholder.svg?height=80&width=80";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OauthProvider {
    Google,
    Github,
}

impl OauthProvider {
    fn stub_name(self) -> &'static str {
        match self {
            Self::Google => "Google User",
            Self::Github => "GitHub User",
        }
    }

    fn stub_email(self) -> &'static str {
        match self {
            Self::Google => "google@example.com",
            Self::Github => "github@example.com",
        }
    }
}

/// Simulated authentication. Identities are minted locally and persisted to
/// the user store; nothing is ever verified against a backend.
pub struct AuthService {
    store: Arc<dyn Store>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn login_with_email(&self, email: &str) -> StoreResult<UserRecord> {
        self.persist("Demo User", email)
    }

    pub fn sign_up(&self, name: &str, email: &str) -> StoreResult<UserRecord> {
        self.persist(name, email)
    }

    pub fn login_with_provider(&self, provider: OauthProvider) -> StoreResult<UserRecord> {
        self.persist(provider.stub_name(), provider.stub_email())
    }

    pub fn current_user(&self) -> StoreResult<Option<UserRecord>> {
        self.store.current_user()
    }

    pub fn is_authenticated(&self) -> StoreResult<bool> {
        Ok(self.store.current_user()?.is_some())
    }

    pub fn logout(&self) -> StoreResult<()> {
        self.store.clear_user()
    }

    fn persist(&self, name: &str, email: &str) -> StoreResult<UserRecord> {
        let user = UserRecord {
            id: UserId::new_v7(),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            avatar_url: Some(PLACEHOLDER_AVATAR.to_string()),
        };
        self.store.set_user(user.clone())?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_store::MemoryStore;

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn email_login_mints_a_demo_identity() {
        let auth = service();
        let user = auth.login_with_email("person@example.com").unwrap();

        assert_eq!(user.name.as_deref(), Some("Demo User"));
        assert_eq!(user.email.as_deref(), Some("person@example.com"));
        assert_eq!(user.avatar_url.as_deref(), Some(PLACEHOLDER_AVATAR));
        assert!(auth.is_authenticated().unwrap());
        assert_eq!(auth.current_user().unwrap(), Some(user));
    }

    #[test]
    fn provider_logins_use_canned_identities() {
        let auth = service();

        let google = auth.login_with_provider(OauthProvider::Google).unwrap();
        assert_eq!(google.name.as_deref(), Some("Google User"));
        assert_eq!(google.email.as_deref(), Some("google@example.com"));

        let github = auth.login_with_provider(OauthProvider::Github).unwrap();
        assert_eq!(github.name.as_deref(), Some("GitHub User"));
        // Each login mints a fresh identifier.
        assert_ne!(google.id, github.id);
    }

    #[test]
    fn logout_clears_the_user_record() {
        let auth = service();
        auth.sign_up("Ada", "ada@example.com").unwrap();
        assert!(auth.is_authenticated().unwrap());

        auth.logout().unwrap();
        assert!(!auth.is_authenticated().unwrap());
        assert_eq!(auth.current_user().unwrap(), None);
    }
}
