use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use super::{
    SessionRecords, StoreError, TaskCompleter, TaskCreator, TaskDeleter, TaskGetter, TaskLister, TaskUpdater,
    UserCreator, UserExister, UserGetter,
};
use crate::models::{Task, TaskInput, User};

const USERNAME_KEY: &str = "users_username_key";
const TASK_TITLE_KEY: &str = "tasks_title_user_id_key";

const TASK_COLUMNS: &str = "id, user_id, title, description, completed";

/// PostgreSQL backend.
///
/// Every user and task operation runs in its own SERIALIZABLE transaction;
/// reads are also READ ONLY. A transaction dropped before `commit` rolls back.
/// Session records are single statements against the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `url` and applies pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| sqlx::Error::Migrate(Box::new(err)))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write_tx(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn read_tx(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

/// Maps a unique violation on `constraint` to `duplicate`.
fn unique_violation(err: sqlx::Error, constraint: &str, duplicate: StoreError) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some(constraint) => duplicate,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl UserCreator for PgStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.write_tx().await?;
        sqlx::query("INSERT INTO users (id, username, password) VALUES ($1, $2, $3)")
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.password)
            .execute(&mut *tx)
            .await
            .map_err(|err| unique_violation(err, USERNAME_KEY, StoreError::DuplicateUsername))?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl UserGetter for PgStore {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        let mut tx = self.read_tx().await?;
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        user.ok_or(StoreError::RecordNotFound)
    }
}

#[async_trait]
impl UserExister for PgStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.read_tx().await?;
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(exists)
    }
}

#[async_trait]
impl TaskCreator for PgStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let mut tx = self.write_tx().await?;
        sqlx::query(
            "INSERT INTO tasks (id, user_id, title, description, completed) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.completed)
        .execute(&mut *tx)
        .await
        .map_err(|err| unique_violation(err, TASK_TITLE_KEY, StoreError::DuplicateTask))?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TaskLister for PgStore {
    async fn all(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
        let mut tx = self.read_tx().await?;
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(tasks)
    }
}

#[async_trait]
impl TaskGetter for PgStore {
    async fn get_by_id(&self, id: &str, user_id: &str) -> Result<Task, StoreError> {
        let mut tx = self.read_tx().await?;
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        task.ok_or(StoreError::RecordNotFound)
    }
}

#[async_trait]
impl TaskUpdater for PgStore {
    async fn update(&self, id: &str, user_id: &str, input: &TaskInput) -> Result<(), StoreError> {
        let mut tx = self.write_tx().await?;
        let completed = sqlx::query_scalar::<_, bool>(
            "SELECT completed FROM tasks WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::RecordNotFound)?;
        if completed {
            return Err(StoreError::TaskCompleted);
        }

        sqlx::query(
            "UPDATE tasks SET title = $1, description = $2 WHERE id = $3 AND user_id = $4",
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| unique_violation(err, TASK_TITLE_KEY, StoreError::DuplicateTask))?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TaskCompleter for PgStore {
    async fn complete(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut tx = self.write_tx().await?;
        let result = sqlx::query(
            "UPDATE tasks SET completed = TRUE \
             WHERE id = $1 AND user_id = $2 AND completed = FALSE",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::OpFailed);
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TaskDeleter for PgStore {
    async fn delete(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut tx = self.write_tx().await?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::OpFailed);
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRecords for PgStore {
    async fn find(&self, token: &str) -> Result<Option<String>, StoreError> {
        let data = sqlx::query_scalar::<_, String>(
            "SELECT data FROM sessions WHERE token = $1 AND expiry > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(data)
    }

    async fn insert(
        &self,
        token: &str,
        data: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (token, data, expiry) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(data)
            .bind(expiry)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace(
        &self,
        token: &str,
        data: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET data = $1, expiry = $2 WHERE token = $3 AND expiry > NOW()",
        )
        .bind(data)
        .bind(expiry)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn extend(&self, token: &str, expiry: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET expiry = $1 WHERE token = $2")
            .bind(expiry)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
