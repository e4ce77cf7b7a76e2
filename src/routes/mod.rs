pub mod auth;
pub mod health;
pub mod tasks;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::{
    auth::RequireAuthenticatedUser,
    error::AppError,
    store::{TaskStore, UserStore},
    validation::FieldValidator,
};

/// Registers every endpoint.
///
/// Expects `web::Data<dyn UserStore>`, `web::Data<dyn TaskStore>`,
/// `web::Data<dyn HashService>` and `web::Data<IdentityKey>` as app data, and
/// the session middleware around the app. `gate` protects `/logout` and
/// everything under `/tasks`.
pub fn config(cfg: &mut web::ServiceConfig, gate: RequireAuthenticatedUser<dyn UserStore>) {
    cfg.service(health::health)
        .service(
            web::resource("/signup")
                .route(web::post().to(auth::signup::<dyn UserStore>))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/login")
                .route(web::post().to(auth::login::<dyn UserStore>))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/logout")
                .wrap(gate.clone())
                .route(web::post().to(auth::logout))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::scope("/tasks")
                .wrap(gate)
                .service(
                    web::resource("")
                        .route(web::get().to(tasks::list_tasks::<dyn TaskStore>))
                        .default_service(web::to(method_not_allowed)),
                )
                .service(
                    web::resource("/create")
                        .route(web::post().to(tasks::create_task::<dyn TaskStore>))
                        .default_service(web::to(method_not_allowed)),
                )
                .service(
                    web::resource("/{task_id}")
                        .route(web::get().to(tasks::get_task::<dyn TaskStore>))
                        .route(web::delete().to(tasks::delete_task::<dyn TaskStore>))
                        .default_service(web::to(method_not_allowed)),
                )
                .service(
                    web::resource("/{task_id}/update")
                        .route(web::patch().to(tasks::update_task::<dyn TaskStore>))
                        .default_service(web::to(method_not_allowed)),
                )
                .service(
                    web::resource("/{task_id}/complete")
                        .route(web::patch().to(tasks::complete_task::<dyn TaskStore>))
                        .default_service(web::to(method_not_allowed)),
                ),
        )
        .default_service(web::to(not_found));
}

/// Turns accumulated field errors into a 422.
pub(crate) fn ensure_valid(validator: FieldValidator) -> Result<(), AppError> {
    if validator.is_valid() {
        Ok(())
    } else {
        Err(AppError::Validation(validator.into_errors()))
    }
}

async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!(
        "{} is not a valid endpoint",
        req.path()
    )))
}

async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed(format!(
        "{} is not supported for {}",
        req.method(),
        req.path()
    )))
}
