use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{cookie::Key, http::header, middleware::Logger, HttpServer};
use tasktrack::{
    auth::{BcryptHasher, IdentityKey, SessionSettings},
    build_app,
    config::Config,
    envelope::DecodeConfig,
    middleware::RateLimit,
    store::{memory::MemoryStore, postgres::PgStore},
    AppState,
};

const MAX_DB_CONNECTIONS: u32 = 10;
const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

fn cors(allowed_origin: Option<&str>) -> Cors {
    match allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .supports_credentials()
            .max_age(3600),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let state = match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, MAX_DB_CONNECTIONS)
                .await
                .map_err(std::io::Error::other)?;
            log::info!("connected to database, migrations applied");
            AppState::new(Arc::new(store))
        }
        None => {
            log::warn!("DATABASE_URL is not set; using the in-process store, data is lost on exit");
            AppState::new(Arc::new(MemoryStore::new()))
        }
    }
    .with_hasher(Arc::new(BcryptHasher::new(config.bcrypt_cost)))
    .with_identity_key(IdentityKey::new(config.identity_key.clone()))
    .with_decode_config(DecodeConfig {
        max_bytes: config.max_body_bytes,
    })
    .with_session_settings(SessionSettings {
        key: config.session_key.clone().unwrap_or_else(|| {
            log::warn!("SESSION_KEY is not set; using a temporary key, sessions end on restart");
            Key::generate()
        }),
        cookie_secure: config.session_cookie_secure,
        ttl_hours: config.session_ttl_hours,
    })
    .with_rate_limit(RateLimit::per_minute(config.rate_limit_per_minute));

    let janitor = state.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(err) = janitor.purge_expired().await {
                log::error!("purging expired sessions: {err}");
            }
        }
    });

    let allowed_origin = config.cors_allowed_origin.clone();

    log::info!("starting tasktrack server at {}", config.server_url());
    HttpServer::new(move || {
        build_app(state.clone())
            .wrap(cors(allowed_origin.as_deref()))
            .wrap(Logger::default())
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
