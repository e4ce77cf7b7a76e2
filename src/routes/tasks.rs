use actix_web::{http::StatusCode, web, HttpResponse};

use super::ensure_valid;
use crate::{
    auth::AuthenticatedUser,
    envelope::{self, sanitize, Envelope, StrictJson},
    error::AppError,
    models::{Task, TaskInput},
    store::{TaskCompleter, TaskCreator, TaskDeleter, TaskGetter, TaskLister, TaskUpdater},
    validation::{FieldValidator, REQUIRED},
};

fn clean(input: TaskInput) -> TaskInput {
    TaskInput {
        title: sanitize(&input.title),
        description: sanitize(&input.description),
    }
}

fn validate(input: &TaskInput) -> Result<(), AppError> {
    let mut v = FieldValidator::new();
    v.required_string(&input.title, "title", REQUIRED);
    v.required_string(&input.description, "description", REQUIRED);
    v.check(input);
    ensure_valid(v)
}

/// Creates a task for the caller.
///
/// `201` with the new task id; `409` when the caller already has a task with
/// the same title.
pub async fn create_task<S>(
    store: web::Data<S>,
    user: AuthenticatedUser,
    input: StrictJson<TaskInput>,
) -> Result<HttpResponse, AppError>
where
    S: TaskCreator + ?Sized + 'static,
{
    let input = clean(input.into_inner());
    validate(&input)?;

    let task = Task::new(input, user.id());
    store.create(&task).await?;

    Ok(envelope::write(StatusCode::CREATED, &Envelope::payload(&task.id))?)
}

/// Lists the caller's tasks, oldest first. No tasks is an empty array.
pub async fn list_tasks<S>(
    store: web::Data<S>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError>
where
    S: TaskLister + ?Sized + 'static,
{
    let tasks = store.all(user.id()).await?;
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(tasks))?)
}

/// Fetches one of the caller's tasks.
///
/// Responds `302 Found` with the task as payload; tasks of other users are
/// reported as missing.
pub async fn get_task<S>(
    store: web::Data<S>,
    user: AuthenticatedUser,
    task_id: web::Path<String>,
) -> Result<HttpResponse, AppError>
where
    S: TaskGetter + ?Sized + 'static,
{
    let task_id = sanitize(&task_id.into_inner());
    let task = store.get_by_id(&task_id, user.id()).await?;
    Ok(envelope::write(StatusCode::FOUND, &Envelope::payload(task))?)
}

/// Replaces the title and description of an active task.
///
/// Completed tasks are frozen and answer `409`.
pub async fn update_task<S>(
    store: web::Data<S>,
    user: AuthenticatedUser,
    task_id: web::Path<String>,
    input: StrictJson<TaskInput>,
) -> Result<HttpResponse, AppError>
where
    S: TaskUpdater + ?Sized + 'static,
{
    let task_id = sanitize(&task_id.into_inner());
    let input = clean(input.into_inner());
    validate(&input)?;

    store.update(&task_id, user.id(), &input).await?;
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(&task_id))?)
}

/// Marks an active task as completed.
///
/// A task that is missing, foreign or already completed cannot be told apart
/// here; all three are server errors.
pub async fn complete_task<S>(
    store: web::Data<S>,
    user: AuthenticatedUser,
    task_id: web::Path<String>,
) -> Result<HttpResponse, AppError>
where
    S: TaskCompleter + ?Sized + 'static,
{
    let task_id = sanitize(&task_id.into_inner());
    store.complete(&task_id, user.id()).await?;
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(&task_id))?)
}

pub async fn delete_task<S>(
    store: web::Data<S>,
    user: AuthenticatedUser,
    task_id: web::Path<String>,
) -> Result<HttpResponse, AppError>
where
    S: TaskDeleter + ?Sized + 'static,
{
    let task_id = sanitize(&task_id.into_inner());
    store.delete(&task_id, user.id()).await?;
    Ok(envelope::write(StatusCode::OK, &Envelope::payload(&task_id))?)
}
