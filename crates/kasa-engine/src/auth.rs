//! # Authentication
//!
//! Username/password login against the `users` table. Passwords are stored
//! as argon2 PHC strings. Token issuing lives in the server; this module
//! only answers "who is this?".

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use kasa_core::time;
use kasa_core::validation::check_required;
use kasa_core::{AuditAction, User, UserProfile, UserRole, ValidationErrors};
use kasa_db::{Filter, Record, Store, Table};
use tracing::{info, warn};

use crate::audit::{Actor, AuditLog};
use crate::error::{EngineError, EngineResult};

/// Seeded into an empty users table: `(username, password, full name, role)`.
pub const DEFAULT_USERS: [(&str, &str, &str, UserRole); 3] = [
    ("admin", "admin123", "Sistem Yöneticisi", UserRole::Admin),
    ("kasiyer", "kasiyer123", "Kasiyer Kullanıcı", UserRole::Cashier),
    ("personel", "personel123", "Personel Kullanıcı", UserRole::User),
];

/// Hashes a password for storage.
pub fn hash_password(password: &str) -> EngineResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EngineError::Internal(format!("Failed to hash password: {}", e)))
}

/// Checks a password against a stored hash. An unparsable hash never
/// verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Store,
    audit: AuditLog,
}

impl Authenticator {
    pub fn new(store: Store, audit: AuditLog) -> Self {
        Authenticator { store, audit }
    }

    /// Verifies credentials, stamps `last_login` and audits the login.
    pub async fn login(&self, username: &str, password: &str, ip_address: Option<String>) -> EngineResult<UserProfile> {
        let mut errors = ValidationErrors::new();
        check_required(&mut errors, "username", username);
        check_required(&mut errors, "password", password);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let user: Option<User> = self
            .store
            .fetch_one(Table::Users, &Filter::eq("username", username.trim()))
            .await?;
        let (user, user_id) = match user {
            Some(user) if verify_password(password, &user.password_hash) => match user.id {
                Some(id) => (user, id),
                None => return Err(EngineError::Internal(format!("user {} has no id", user.username))),
            },
            _ => {
                warn!(username, ip = ?ip_address, "Failed login attempt");
                return Err(EngineError::InvalidCredentials);
            }
        };

        let stamp = Record::new().with("last_login", time::format_timestamp(&time::now()));
        if let Err(e) = self.store.update(Table::Users, &Filter::eq("id", user_id), stamp).await {
            warn!(user_id, error = %e, "Failed to update last_login");
        }

        let mut actor = Actor::new(user_id);
        actor.ip_address = ip_address;
        self.audit
            .record(&actor, AuditAction::Login, format!("{} logged in", user.username))
            .await;

        info!(user_id, username = %user.username, "User logged in");
        Ok(UserProfile {
            id: user_id,
            username: user.username,
            full_name: user.full_name,
            role: user.role,
        })
    }

    /// Seeds [`DEFAULT_USERS`] when the users table is empty. Returns how
    /// many were created.
    pub async fn ensure_default_users(&self) -> EngineResult<usize> {
        let existing: Option<User> = self.store.fetch_one(Table::Users, &Filter::all()).await?;
        if existing.is_some() {
            return Ok(0);
        }

        let mut created = 0;
        for (username, password, full_name, role) in DEFAULT_USERS {
            let user = User {
                id: None,
                username: username.to_string(),
                password_hash: hash_password(password)?,
                full_name: full_name.to_string(),
                role,
                last_login: None,
                created_at: time::now(),
            };
            match self.store.insert(Table::Users, &user).await {
                Ok(_) => created += 1,
                // another instance seeded it first
                Err(e) if e.is_unique_violation() => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(created, "Seeded default users");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasa_core::{AuditLogEntry, CoreError};
    use kasa_db::MemoryStore;
    use std::sync::Arc;

    fn authenticator(memory: &Arc<MemoryStore>) -> Authenticator {
        let store = Store::new(memory.clone());
        Authenticator::new(store.clone(), AuditLog::new(store))
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("kasiyer123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("kasiyer123", &hash));
        assert!(!verify_password("kasiyer124", &hash));
        assert!(!verify_password("kasiyer123", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_default_users_seeded_once() {
        let memory = Arc::new(MemoryStore::new());
        let auth = authenticator(&memory);

        assert_eq!(auth.ensure_default_users().await.unwrap(), 3);
        assert_eq!(auth.ensure_default_users().await.unwrap(), 0);
        assert_eq!(memory.count(Table::Users).await, 3);
    }

    #[tokio::test]
    async fn test_login_audits_with_ip() {
        let memory = Arc::new(MemoryStore::new());
        let auth = authenticator(&memory);
        auth.ensure_default_users().await.unwrap();

        let profile = auth
            .login("kasiyer", "kasiyer123", Some("192.168.1.20".to_string()))
            .await
            .unwrap();
        assert_eq!(profile.username, "kasiyer");
        assert_eq!(profile.role, UserRole::Cashier);

        let user: User = memory.dump(Table::Users).await[1].decode().unwrap();
        assert!(user.last_login.is_some());

        let entry: AuditLogEntry = memory.dump(Table::AuditLogs).await[0].decode().unwrap();
        assert_eq!(entry.action, AuditAction::Login);
        assert_eq!(entry.user_id, Some(profile.id));
        assert_eq!(entry.ip_address.as_deref(), Some("192.168.1.20"));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let memory = Arc::new(MemoryStore::new());
        let auth = authenticator(&memory);
        auth.ensure_default_users().await.unwrap();

        let err = auth.login("admin", "wrong", None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCredentials));
        let err = auth.login("nobody", "admin123", None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCredentials));
        let err = auth.login("", "", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

        assert_eq!(memory.count(Table::AuditLogs).await, 0);
    }
}
