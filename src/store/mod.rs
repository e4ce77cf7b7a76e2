//!
//! # Persistence
//!
//! Storage is reached through narrow capability traits so that each handler
//! depends only on the operations it performs. `UserStore` and `TaskStore`
//! compose them for wiring; every type implementing all the parts gets the
//! composite for free.
//!
//! Session state lives next to the users and tasks behind [`SessionRecords`],
//! so a token that was renewed or logged out is gone for every copy of the
//! cookie that carried it.
//!
//! Two backends implement the traits: [`postgres::PgStore`] for deployments
//! and [`memory::MemoryStore`] for tests and local runs without a database.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Task, TaskInput, User};

/// Failures reported by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username exists")]
    DuplicateUsername,
    #[error("task exists")]
    DuplicateTask,
    #[error("record not found")]
    RecordNotFound,
    #[error("task is completed and can no longer be changed")]
    TaskCompleted,
    /// The targeted row was missing, foreign, or not in a state that allows the change.
    #[error("op failed")]
    OpFailed,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserCreator: Send + Sync {
    /// Fails with `DuplicateUsername` when the username is taken.
    async fn create(&self, user: &User) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserGetter: Send + Sync {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserExister: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;
}

pub trait UserStore: UserCreator + UserGetter + UserExister {}

impl<T> UserStore for T where T: UserCreator + UserGetter + UserExister {}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskCreator: Send + Sync {
    /// Fails with `DuplicateTask` when the owner already has a task with this title.
    async fn create(&self, task: &Task) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskLister: Send + Sync {
    /// All tasks of `user_id`, oldest first.
    async fn all(&self, user_id: &str) -> Result<Vec<Task>, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskGetter: Send + Sync {
    async fn get_by_id(&self, id: &str, user_id: &str) -> Result<Task, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskUpdater: Send + Sync {
    /// Replaces title and description of an active task.
    ///
    /// Fails with `RecordNotFound` for an unknown or foreign task,
    /// `TaskCompleted` for a completed one and `DuplicateTask` when the new
    /// title collides with another task of the same owner.
    async fn update(&self, id: &str, user_id: &str, input: &TaskInput) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskCompleter: Send + Sync {
    /// Fails with `OpFailed` unless exactly one active task of `user_id` changed.
    async fn complete(&self, id: &str, user_id: &str) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskDeleter: Send + Sync {
    async fn delete(&self, id: &str, user_id: &str) -> Result<(), StoreError>;
}

pub trait TaskStore:
    TaskCreator + TaskLister + TaskGetter + TaskUpdater + TaskCompleter + TaskDeleter
{
}

impl<T> TaskStore for T where
    T: TaskCreator + TaskLister + TaskGetter + TaskUpdater + TaskCompleter + TaskDeleter
{
}

/// Server-side session records keyed by the token held in the session cookie.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRecords: Send + Sync {
    /// The data stored under `token`, or `None` once it is missing or expired.
    async fn find(&self, token: &str) -> Result<Option<String>, StoreError>;
    /// Stores a record under a freshly issued `token`.
    async fn insert(&self, token: &str, data: &str, expiry: DateTime<Utc>)
        -> Result<(), StoreError>;
    /// Overwrites a live record. Returns `false` when `token` is missing or
    /// expired, in which case nothing is written.
    async fn replace(&self, token: &str, data: &str, expiry: DateTime<Utc>)
        -> Result<bool, StoreError>;
    /// Moves the expiry of an existing record. Unknown tokens are ignored.
    async fn extend(&self, token: &str, expiry: DateTime<Utc>) -> Result<(), StoreError>;
    /// Removes the record under `token`. Unknown tokens are ignored.
    async fn destroy(&self, token: &str) -> Result<(), StoreError>;
    /// Removes every expired record and returns how many went.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}
