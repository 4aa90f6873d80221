//! In-memory repositories for tests
//!
//! One store backs all three repository traits so that sessions can check
//! their owning user the way a foreign key would.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tibu_core::{
    now_epoch, NewPreRegisteredUser, NewUser, PreRegisteredUser, Session, User, UserFilter,
    UserUpdate,
};
use tokio::sync::RwLock;

use super::{PreRegisteredUserRepository, RepositoryError, SessionRepository, UserRepository};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    sessions: BTreeMap<i64, Session>,
    pre_registered_users: BTreeMap<i64, PreRegisteredUser>,
    last_user_id: i64,
    last_session_id: i64,
    last_pre_registered_id: i64,
}

/// Shared in-memory backing store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user without cascading to its sessions
    pub async fn remove_user(&self, id: i64) -> Option<User> {
        self.tables.write().await.users.remove(&id)
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::UniqueViolation(
                "users_email_key".to_string(),
            ));
        }

        tables.last_user_id += 1;
        let now = now_epoch();
        let created = User {
            id: tables.last_user_id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        user.updated_at = now_epoch();

        Ok(Some(user.clone()))
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError> {
        let tables = self.tables.read().await;
        let count = tables
            .users
            .values()
            .filter(|u| filter.email.as_deref().map_or(true, |e| u.email == e))
            .count();
        Ok(count as i64)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create(&self, user_id: i64) -> Result<Session, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(RepositoryError::ForeignKeyViolation(
                "sessions_user_id_fkey".to_string(),
            ));
        }

        tables.last_session_id += 1;
        let now = now_epoch();
        let session = Session {
            id: tables.last_session_id,
            user_id,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Session>, RepositoryError> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn delete_by_id(&self, id: i64) -> Result<u64, RepositoryError> {
        let removed = self.tables.write().await.sessions.remove(&id);
        Ok(u64::from(removed.is_some()))
    }
}

#[async_trait]
impl PreRegisteredUserRepository for InMemoryStore {
    async fn create(
        &self,
        entry: NewPreRegisteredUser,
    ) -> Result<PreRegisteredUser, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables
            .pre_registered_users
            .values()
            .any(|p| p.email == entry.email)
        {
            return Err(RepositoryError::UniqueViolation(
                "pre_registered_users_email_key".to_string(),
            ));
        }

        tables.last_pre_registered_id += 1;
        let now = now_epoch();
        let created = PreRegisteredUser {
            id: tables.last_pre_registered_id,
            email: entry.email,
            name: entry.name,
            created_at: now,
            updated_at: now,
        };
        tables.pre_registered_users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn list(&self) -> Result<Vec<PreRegisteredUser>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .pre_registered_users
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tibu_core::Role;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ana".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_exact_match() {
        let store = InMemoryStore::new();
        UserRepository::create(&store, new_user("ana@x.com"))
            .await
            .unwrap();

        let duplicate = UserRepository::create(&store, new_user("ana@x.com")).await;
        assert!(matches!(duplicate, Err(RepositoryError::UniqueViolation(_))));

        // Different casing is a different address
        assert!(UserRepository::create(&store, new_user("Ana@x.com"))
            .await
            .is_ok());
        assert_eq!(store.count(&UserFilter::by_email("ana@x.com")).await.unwrap(), 1);
        assert_eq!(store.count(&UserFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let store = InMemoryStore::new();
        let user = UserRepository::create(&store, new_user("ana@x.com"))
            .await
            .unwrap();

        let updated = store
            .update(
                user.id,
                UserUpdate {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.name, "Ana");
        assert!(store.update(999, UserUpdate::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = InMemoryStore::new();
        let user = UserRepository::create(&store, new_user("ana@x.com"))
            .await
            .unwrap();

        let first = SessionRepository::create(&store, user.id).await.unwrap();
        let second = SessionRepository::create(&store, user.id).await.unwrap();
        assert_ne!(first.id, second.id);

        assert!(SessionRepository::find_by_id(&store, first.id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.delete_by_id(first.id).await.unwrap(), 1);
        assert_eq!(store.delete_by_id(first.id).await.unwrap(), 0);
        assert!(SessionRepository::find_by_id(&store, first.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_session_requires_existing_user() {
        let store = InMemoryStore::new();
        let result = SessionRepository::create(&store, 42).await;
        assert!(matches!(result, Err(RepositoryError::ForeignKeyViolation(_))));
    }

    #[tokio::test]
    async fn test_pre_registered_email_is_unique() {
        let store = InMemoryStore::new();
        let entry = NewPreRegisteredUser {
            email: "bo@x.com".to_string(),
            name: "Bo".to_string(),
        };

        PreRegisteredUserRepository::create(&store, entry.clone())
            .await
            .unwrap();
        let duplicate = PreRegisteredUserRepository::create(&store, entry).await;
        assert!(matches!(duplicate, Err(RepositoryError::UniqueViolation(_))));
        assert_eq!(PreRegisteredUserRepository::list(&store).await.unwrap().len(), 1);
    }
}
