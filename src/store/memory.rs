use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    SessionRecords, StoreError, TaskCompleter, TaskCreator, TaskDeleter, TaskGetter, TaskLister, TaskUpdater,
    UserCreator, UserExister, UserGetter,
};
use crate::models::{Task, TaskInput, User};

/// In-process store with the same contracts as the PostgreSQL backend.
///
/// Each operation holds the lock for its whole duration, which makes every
/// operation serializable with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    tasks: Vec<Task>,
    sessions: HashMap<String, SessionRecord>,
}

#[derive(Debug)]
struct SessionRecord {
    data: String,
    expiry: DateTime<Utc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn title_taken(&self, user_id: &str, title: &str, except: Option<&str>) -> bool {
        self.tasks.iter().any(|task| {
            task.user_id == user_id && task.title == title && Some(task.id.as_str()) != except
        })
    }

    fn owned_task_mut(&mut self, id: &str, user_id: &str) -> Option<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == id && task.user_id == user_id)
    }
}

#[async_trait]
impl UserCreator for MemoryStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::DuplicateUsername);
        }
        tables.users.push(user.clone());
        Ok(())
    }
}

#[async_trait]
impl UserGetter for MemoryStore {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        let tables = self.inner.lock().await;
        tables
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }
}

#[async_trait]
impl UserExister for MemoryStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.users.iter().any(|u| u.id == id))
    }
}

#[async_trait]
impl TaskCreator for MemoryStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.users.iter().any(|u| u.id == task.user_id) {
            return Err(StoreError::OpFailed);
        }
        if tables.title_taken(&task.user_id, &task.title, None) {
            return Err(StoreError::DuplicateTask);
        }
        tables.tasks.push(task.clone());
        Ok(())
    }
}

#[async_trait]
impl TaskLister for MemoryStore {
    async fn all(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .tasks
            .iter()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TaskGetter for MemoryStore {
    async fn get_by_id(&self, id: &str, user_id: &str) -> Result<Task, StoreError> {
        let tables = self.inner.lock().await;
        tables
            .tasks
            .iter()
            .find(|task| task.id == id && task.user_id == user_id)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }
}

#[async_trait]
impl TaskUpdater for MemoryStore {
    async fn update(&self, id: &str, user_id: &str, input: &TaskInput) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let completed = tables
            .owned_task_mut(id, user_id)
            .ok_or(StoreError::RecordNotFound)?
            .completed;
        if completed {
            return Err(StoreError::TaskCompleted);
        }
        if tables.title_taken(user_id, &input.title, Some(id)) {
            return Err(StoreError::DuplicateTask);
        }

        let task = tables
            .owned_task_mut(id, user_id)
            .ok_or(StoreError::RecordNotFound)?;
        task.title = input.title.clone();
        task.description = input.description.clone();
        Ok(())
    }
}

#[async_trait]
impl TaskCompleter for MemoryStore {
    async fn complete(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        match tables.owned_task_mut(id, user_id) {
            Some(task) if !task.completed => {
                task.completed = true;
                Ok(())
            }
            _ => Err(StoreError::OpFailed),
        }
    }
}

#[async_trait]
impl TaskDeleter for MemoryStore {
    async fn delete(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let before = tables.tasks.len();
        tables
            .tasks
            .retain(|task| !(task.id == id && task.user_id == user_id));
        if tables.tasks.len() == before {
            return Err(StoreError::OpFailed);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRecords for MemoryStore {
    async fn find(&self, token: &str) -> Result<Option<String>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .sessions
            .get(token)
            .filter(|record| record.expiry > Utc::now())
            .map(|record| record.data.clone()))
    }

    async fn insert(
        &self,
        token: &str,
        data: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.sessions.contains_key(token) {
            return Err(StoreError::OpFailed);
        }
        tables.sessions.insert(
            token.to_string(),
            SessionRecord {
                data: data.to_string(),
                expiry,
            },
        );
        Ok(())
    }

    async fn replace(
        &self,
        token: &str,
        data: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.inner.lock().await;
        match tables.sessions.get_mut(token) {
            Some(record) if record.expiry > Utc::now() => {
                record.data = data.to_string();
                record.expiry = expiry;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend(&self, token: &str, expiry: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if let Some(record) = tables.sessions.get_mut(token) {
            record.expiry = expiry;
        }
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        tables.sessions.remove(token);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut tables = self.inner.lock().await;
        let before = tables.sessions.len();
        let now = Utc::now();
        tables.sessions.retain(|_, record| record.expiry > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}
