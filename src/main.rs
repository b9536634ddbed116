// src/main.rs
use actix_web::{
    App, HttpResponse, HttpServer,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware::{Logger, NormalizePath},
    web,
};
use auth::TokenDenylist;
use config::Config;
use error::{ApiError, ApiResult};
use images::MediaStore;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod auth;
mod config;
mod db;
mod error;
#[cfg(test)]
mod fixtures;
mod guards;
mod images;
mod ingredients;
mod models;
mod pagination;
mod permissions;
mod recipes;
mod shopping_list;
mod tags;
mod users;
mod validation;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    tracing::info!("Starting recipe service");

    let config = Config::from_env().expect("Failed to load config from environment");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let denylist = TokenDenylist::new(chrono::Duration::hours(config.token_ttl_hours));
    let media = MediaStore::new(&config.media_root, &config.media_url);
    let bind = (config.bind_address.clone(), config.port);
    tracing::info!("Listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || app(pool.clone(), config.clone(), denylist.clone(), media.clone()))
        .bind(bind)?
        .run()
        .await
}

fn app(
    pool: PgPool,
    config: Config,
    denylist: TokenDenylist,
    media: MediaStore,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let json_limit = config.max_body_bytes;
    App::new()
        .app_data(web::Data::new(pool))
        .app_data(web::Data::new(config))
        .app_data(web::Data::new(denylist))
        .app_data(web::Data::new(media))
        .app_data(
            web::JsonConfig::default()
                .limit(json_limit)
                .error_handler(|err, _req| {
                    ApiError::validation("invalid_body", err.to_string()).into()
                }),
        )
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            ApiError::validation("invalid_query", err.to_string()).into()
        }))
        .app_data(
            web::PathConfig::default()
                .error_handler(|_err, _req| ApiError::NotFound("Not found".to_string()).into()),
        )
        .wrap(NormalizePath::trim())
        .wrap(Logger::default())
        .service(
            web::scope("/api")
                .configure(auth::init_routes)
                .configure(users::init_routes)
                .configure(recipes::init_routes)
                .configure(tags::init_routes)
                .configure(ingredients::init_routes),
        )
        .configure(images::init_routes)
        .default_service(web::to(not_found))
}

async fn not_found() -> ApiResult<HttpResponse> {
    Err(ApiError::NotFound("Not found".to_string()))
}

#[cfg(test)]
fn test_app_with(
    pool: PgPool,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    app(
        pool,
        auth::tests::test_config(),
        TokenDenylist::new(chrono::Duration::hours(1)),
        images::tests::temp_media(),
    )
}

/// The app over a pool that never connects unless a handler reaches the
/// database.
#[cfg(test)]
fn test_app() -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let pool = PgPoolOptions::new()
        .connect_lazy(&auth::tests::test_config().database_url)
        .expect("lazy pool");
    test_app_with(pool)
}
