// src/tags.rs
use crate::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::TagCreate;
use crate::permissions;
use actix_web::{HttpResponse, get, post, web};
use uuid::Uuid;
use validator::Validate;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_tags);
    cfg.service(create_tag);
    cfg.service(get_tag);
}

#[get("/tags")]
pub async fn list_tags(pool: web::Data<sqlx::PgPool>) -> ApiResult<HttpResponse> {
    let tags = db::list_tags(&pool).await?;
    Ok(HttpResponse::Ok().json(tags))
}

#[get("/tags/{id}")]
pub async fn get_tag(
    pool: web::Data<sqlx::PgPool>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let tag = db::get_tag(&pool, path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))?;
    Ok(HttpResponse::Ok().json(tag))
}

#[post("/tags")]
pub async fn create_tag(
    user: AuthUser,
    pool: web::Data<sqlx::PgPool>,
    payload: web::Json<TagCreate>,
) -> ApiResult<HttpResponse> {
    permissions::ensure_admin(&pool, &user).await?;
    payload.validate()?;

    let tag = db::create_tag(&pool, &payload).await?;
    tracing::info!(tag_id = %tag.id, slug = %tag.slug, "Tag created");
    Ok(HttpResponse::Created().json(tag))
}
