use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, TaskFilter, TaskStore, User, UserStore};
use crate::tasks::{Task, TaskId, TaskPatch, UserId};

/// In-process document store.
///
/// Tasks are kept in insertion order. Every write takes the lock once, so a
/// field-level update from a request handler and the scheduler's
/// `lastNotifiedAt` stamp never overwrite each other's fields.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<Vec<Task>>,
    users: RwLock<Vec<User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_all(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().filter(|t| filter.matches(t)).cloned().collect())
    }

    async fn find_one(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|t| &t.id == id).cloned())
    }

    async fn insert(&self, task: Task) -> Result<TaskId, StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(StoreError::Conflict(format!("task {} already exists", task.id)));
        }
        let id = task.id.clone();
        tasks.push(task);
        Ok(id)
    }

    async fn update_fields(&self, id: &TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        patch.apply(task);
        Ok(())
    }

    async fn delete_one(&self, id: &TaskId) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| &t.id != id);
        if tasks.len() == before {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn delete_many(&self, filter: &TaskFilter) -> Result<usize, StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| !filter.matches(t));
        Ok(before - tasks.len())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<UserId, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        let id = user.id.clone();
        users.push(user);
        Ok(id)
    }

    async fn delete_user(&self, id: &UserId) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| &u.id != id);
        if users.len() == before {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn task(id: &str, owner: &str, recurring: bool, due: Option<&str>) -> Task {
        Task {
            id: TaskId::from(id),
            title: format!("task {id}"),
            details: String::new(),
            recurring,
            frequency: recurring.then(|| "Every Day".to_owned()),
            owner_id: UserId::from(owner),
            created_at: None,
            completed_dates: Vec::new(),
            due_date: due.map(str::to_owned),
            last_notified_at: None,
            updated_at: None,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(task("a", "u1", true, None)).await.unwrap();
        store.insert(task("b", "u1", false, Some("2024-06-01"))).await.unwrap();
        store.insert(task("c", "u2", false, None)).await.unwrap();
        store.insert(task("d", "u2", true, Some("2024-06-01"))).await.unwrap();
        store
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[tokio::test]
    async fn filters_select_sweep_classes() {
        let store = seeded().await;
        let recurring = store.find_all(&TaskFilter::recurring()).await.unwrap();
        assert_eq!(ids(&recurring), vec!["a", "d"]);
        let dated = store.find_all(&TaskFilter::with_due_date()).await.unwrap();
        assert_eq!(ids(&dated), vec!["b"]);
        let mine = store.find_all(&TaskFilter::owned_by("u2".into())).await.unwrap();
        assert_eq!(ids(&mine), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = seeded().await;
        let err = store.insert(task("a", "u9", false, None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_fields_is_field_level() {
        let store = seeded().await;
        let id = TaskId::from("b");

        let rename = TaskPatch {
            title: Some("renamed".into()),
            ..TaskPatch::default()
        };
        store.update_fields(&id, rename).await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        store.update_fields(&id, TaskPatch::notified_at(at)).await.unwrap();

        let stored = store.find_one(&id).await.unwrap().unwrap();
        assert_eq!(stored.title, "renamed");
        assert_eq!(stored.last_notified_at, Some(at));

        let missing = store
            .update_fields(&TaskId::from("zz"), TaskPatch::notified_at(at))
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_completions_all_land() {
        let store = Arc::new(seeded().await);
        let id = TaskId::from("a");
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();

        let writers: Vec<_> = (0..16u64)
            .map(|day| {
                let store = Arc::clone(&store);
                let id = id.clone();
                let date = start + chrono::Days::new(day % 8);
                tokio::spawn(async move {
                    store
                        .update_fields(&id, TaskPatch::completed_on(date, at))
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let mut dates = store.find_one(&id).await.unwrap().unwrap().completed_dates;
        dates.sort();
        let expected: Vec<_> = (0..8u64).map(|d| start + chrono::Days::new(d)).collect();
        assert_eq!(dates, expected);
    }

    #[tokio::test]
    async fn delete_many_cascades_by_owner() {
        let store = seeded().await;
        let removed = store.delete_many(&TaskFilter::owned_by("u1".into())).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ids(&store.find_all(&TaskFilter::all()).await.unwrap()), vec!["c", "d"]);
        assert!(store.delete_one(&TaskId::from("a")).await.is_err());
    }

    #[tokio::test]
    async fn users_are_unique_by_email() {
        let store = MemoryStore::new();
        let user = User {
            id: UserId::from("u1"),
            email: "Ada@example.com".into(),
            password_hash: "x".into(),
        };
        store.insert_user(user.clone()).await.unwrap();
        let dup = User {
            id: UserId::from("u2"),
            email: "ada@EXAMPLE.com".into(),
            ..user
        };
        assert!(matches!(store.insert_user(dup).await, Err(StoreError::Conflict(_))));
        let found = store.find_user_by_email("ADA@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(UserId::from("u1")));
    }
}
