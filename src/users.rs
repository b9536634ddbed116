// src/users.rs
use crate::auth::{AuthUser, MaybeUser};
use crate::config::Config;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::guards;
use crate::images::MediaStore;
use crate::models::{
    RecipeShort, RegisterRequest, RegisteredUser, Role, SetPasswordRequest, SubscriptionView,
    User, UserView,
};
use crate::pagination::{Page, PageLink, PageParams};
use actix_web::{HttpRequest, HttpResponse, delete, get, post, web};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    // Fixed paths first so they are not captured by `/users/{id}`.
    cfg.service(me);
    cfg.service(subscriptions);
    cfg.service(set_password);
    cfg.service(list_users);
    cfg.service(register);
    cfg.service(get_user);
    cfg.service(subscribe);
    cfg.service(unsubscribe);
}

#[derive(Deserialize, Default)]
pub struct RecipesLimit {
    pub recipes_limit: Option<usize>,
}

#[get("/users")]
pub async fn list_users(
    viewer: MaybeUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
    req: HttpRequest,
) -> ApiResult<HttpResponse> {
    let page = params.resolve(config.page_size)?;
    let count = db::count_users(&pool).await?;
    page.ensure_in_range(count)?;

    let users = db::list_users(&pool, page.size, page.offset()).await?;
    let views = user_views(&pool, viewer.id(), &users).await?;

    Ok(HttpResponse::Ok().json(Page::new(views, count, page, &PageLink::from_request(&req))))
}

#[post("/users")]
pub async fn register(
    pool: web::Data<PgPool>,
    payload: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    if db::get_user_by_email(&pool, &payload.email).await?.is_some() {
        return Err(ApiError::validation(
            "email_taken",
            "A user with that email already exists",
        ));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)?;
    let payload = payload.into_inner();
    let user = User {
        id: Uuid::new_v4(),
        email: payload.email,
        username: payload.username,
        first_name: payload.first_name,
        last_name: payload.last_name,
        role: Role::User,
        password_hash,
        created_at: Utc::now(),
    };

    // A taken username surfaces through the unique constraint.
    db::create_user(&pool, &user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok(HttpResponse::Created().json(RegisteredUser {
        email: user.email,
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    }))
}

#[get("/users/me")]
pub async fn me(user: AuthUser, pool: web::Data<PgPool>) -> ApiResult<HttpResponse> {
    let current = db::get_user_by_id(&pool, user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(HttpResponse::Ok().json(UserView::new(&current, false)))
}

#[get("/users/{id}")]
pub async fn get_user(
    viewer: MaybeUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let user = db::get_user_by_id(&pool, path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let is_subscribed = match viewer.id() {
        Some(viewer_id) => db::is_following(&pool, viewer_id, user.id).await?,
        None => false,
    };
    Ok(HttpResponse::Ok().json(UserView::new(&user, is_subscribed)))
}

#[post("/users/set_password")]
pub async fn set_password(
    user: AuthUser,
    pool: web::Data<PgPool>,
    payload: web::Json<SetPasswordRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let current = db::get_user_by_id(&pool, user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !verify(&payload.current_password, &current.password_hash).unwrap_or(false) {
        return Err(ApiError::validation(
            "invalid_password",
            "Current password is incorrect",
        ));
    }

    let password_hash = hash(&payload.new_password, DEFAULT_COST)?;
    db::update_password(&pool, user.id, &password_hash).await?;
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(HttpResponse::NoContent().finish())
}

#[get("/users/subscriptions")]
pub async fn subscriptions(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
    limit: web::Query<RecipesLimit>,
    req: HttpRequest,
) -> ApiResult<HttpResponse> {
    let page = params.resolve(config.page_size)?;
    let count = db::count_subscriptions(&pool, user.id).await?;
    page.ensure_in_range(count)?;

    let authors = db::list_subscriptions(&pool, user.id, page.size, page.offset()).await?;
    let views = subscription_views(&pool, &media, authors, limit.recipes_limit).await?;

    Ok(HttpResponse::Ok().json(Page::new(views, count, page, &PageLink::from_request(&req))))
}

#[post("/users/{id}/subscribe")]
pub async fn subscribe(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    path: web::Path<Uuid>,
    limit: web::Query<RecipesLimit>,
) -> ApiResult<HttpResponse> {
    let author = db::get_user_by_id(&pool, path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let already_following = db::is_following(&pool, user.id, author.id).await?;
    guards::check_follow(user.id, author.id, already_following)?;
    db::create_follow(&pool, user.id, author.id).await?;
    tracing::info!(user_id = %user.id, author_id = %author.id, "Subscribed");

    let mut views = subscription_views(&pool, &media, vec![author], limit.recipes_limit).await?;
    let view = views
        .pop()
        .ok_or_else(|| ApiError::Internal("subscription view missing".to_string()))?;
    Ok(HttpResponse::Created().json(view))
}

#[delete("/users/{id}/subscribe")]
pub async fn unsubscribe(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let author = db::get_user_by_id(&pool, path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let removed = db::delete_follow(&pool, user.id, author.id).await?;
    guards::check_removed(removed, "Subscription")?;
    tracing::info!(user_id = %user.id, author_id = %author.id, "Unsubscribed");
    Ok(HttpResponse::NoContent().finish())
}

async fn user_views(
    pool: &PgPool,
    viewer: Option<Uuid>,
    users: &[User],
) -> Result<Vec<UserView>, sqlx::Error> {
    let followed = match viewer {
        Some(viewer_id) => {
            let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
            db::followed_among(pool, viewer_id, &ids).await?
        }
        None => Default::default(),
    };
    Ok(users
        .iter()
        .map(|u| UserView::new(u, followed.contains(&u.id)))
        .collect())
}

/// Builds the views for authors the caller follows, so `is_subscribed` is
/// always true.
async fn subscription_views(
    pool: &PgPool,
    media: &MediaStore,
    authors: Vec<User>,
    recipes_limit: Option<usize>,
) -> Result<Vec<SubscriptionView>, sqlx::Error> {
    let ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();
    let mut by_author: HashMap<Uuid, Vec<RecipeShort>> = HashMap::new();
    for recipe in db::recipes_by_authors(pool, &ids).await? {
        by_author.entry(recipe.author_id).or_default().push(RecipeShort {
            id: recipe.id,
            name: recipe.name,
            image: media.url(&recipe.image),
            cooking_time: recipe.cooking_time,
        });
    }

    Ok(authors
        .iter()
        .map(|author| {
            let recipes = by_author.remove(&author.id).unwrap_or_default();
            build_subscription_view(author, recipes, recipes_limit)
        })
        .collect())
}

fn build_subscription_view(
    author: &User,
    mut recipes: Vec<RecipeShort>,
    recipes_limit: Option<usize>,
) -> SubscriptionView {
    let recipes_count = recipes.len() as i64;
    if let Some(limit) = recipes_limit {
        recipes.truncate(limit);
    }
    SubscriptionView {
        author: UserView::new(author, true),
        recipes,
        recipes_count,
    }
}
