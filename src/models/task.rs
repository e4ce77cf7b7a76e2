use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::envelope::null_as_empty;

/// A task owned by exactly one user.
///
/// Once `completed` is set the task can no longer be updated or completed
/// again; it can still be read and deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Task {
    /// Time-ordered UUIDv7 in its hyphenated text form.
    pub id: String,
    pub user_id: String,
    /// Unique among the tasks of one user.
    pub title: String,
    pub description: String,
    pub completed: bool,
}

/// Body of `POST /tasks/create` and `PATCH /tasks/{task_id}/update`.
///
/// Absent and `null` fields decode as empty strings.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct TaskInput {
    #[serde(deserialize_with = "null_as_empty")]
    #[validate(length(max = 200, message = "must not be more than 200 characters"))]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    #[validate(length(max = 1000, message = "must not be more than 1000 characters"))]
    pub description: String,
}

impl Task {
    /// Creates an active task for `user_id` with a fresh id.
    pub fn new(input: TaskInput, user_id: &str) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            title: input.title,
            description: input.description,
            completed: false,
        }
    }
}
