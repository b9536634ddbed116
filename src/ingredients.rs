// src/ingredients.rs
use crate::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::IngredientCreate;
use crate::permissions;
use actix_web::{HttpResponse, get, post, web};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_ingredients);
    cfg.service(create_ingredient);
    cfg.service(get_ingredient);
}

#[derive(Deserialize)]
pub struct IngredientSearch {
    pub name: Option<String>,
}

#[get("/ingredients")]
pub async fn list_ingredients(
    pool: web::Data<sqlx::PgPool>,
    query: web::Query<IngredientSearch>,
) -> ApiResult<HttpResponse> {
    let prefix = query.name.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let ingredients = db::list_ingredients(&pool, prefix).await?;
    Ok(HttpResponse::Ok().json(ingredients))
}

#[get("/ingredients/{id}")]
pub async fn get_ingredient(
    pool: web::Data<sqlx::PgPool>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let ingredient = db::get_ingredient(&pool, path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Ingredient"))?;
    Ok(HttpResponse::Ok().json(ingredient))
}

#[post("/ingredients")]
pub async fn create_ingredient(
    user: AuthUser,
    pool: web::Data<sqlx::PgPool>,
    payload: web::Json<IngredientCreate>,
) -> ApiResult<HttpResponse> {
    permissions::ensure_admin(&pool, &user).await?;
    payload.validate()?;

    let ingredient = db::create_ingredient(&pool, &payload).await?;
    tracing::info!(ingredient_id = %ingredient.id, "Ingredient created");
    Ok(HttpResponse::Created().json(ingredient))
}
