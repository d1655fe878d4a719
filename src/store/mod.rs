//! Task and user storage.
//!
//! The rest of the crate sees storage only through the [`TaskStore`] and
//! [`UserStore`] traits: find / insert / field-level update / delete over
//! JSON-shaped documents. [`MemoryStore`] is the in-process document store the
//! binary runs with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::{Task, TaskId, TaskPatch, UserId};

pub mod memory;

pub use memory::MemoryStore;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Encoded salted hash, see [`crate::security::hash_password`].
    pub password_hash: String,
}

/// Selects task documents. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub owner: Option<UserId>,
    pub recurring: Option<bool>,
    pub has_due_date: Option<bool>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    /// Every recurring task.
    pub fn recurring() -> Self {
        Self {
            recurring: Some(true),
            ..Self::default()
        }
    }

    /// One-off tasks that carry a due date. Recurring tasks are excluded so a
    /// sweep never evaluates the same task under both branches.
    pub fn with_due_date() -> Self {
        Self {
            recurring: Some(false),
            has_due_date: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.owner.as_ref().is_none_or(|owner| &task.owner_id == owner)
            && self.recurring.is_none_or(|r| task.recurring == r)
            && self
                .has_due_date
                .is_none_or(|wanted| task.due_date.is_some() == wanted)
    }
}

/// Task Store Accessor: CRUD over task documents, no domain logic.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Matching tasks in insertion order.
    async fn find_all(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    async fn find_one(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    async fn insert(&self, task: Task) -> Result<TaskId, StoreError>;

    /// Applies `patch` to the stored document in one step, without a
    /// whole-record read-modify-write. Fails with `NotFound` if `id` is gone.
    async fn update_fields(&self, id: &TaskId, patch: TaskPatch) -> Result<(), StoreError>;

    async fn delete_one(&self, id: &TaskId) -> Result<(), StoreError>;

    /// Returns the number of deleted tasks.
    async fn delete_many(&self, filter: &TaskFilter) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Email lookup is case-insensitive.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with `Conflict` when the email is already registered.
    async fn insert_user(&self, user: User) -> Result<UserId, StoreError>;

    async fn delete_user(&self, id: &UserId) -> Result<(), StoreError>;
}
