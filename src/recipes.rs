// src/recipes.rs
use crate::auth::{AuthUser, MaybeUser};
use crate::config::Config;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::guards::{self, RecipeList};
use crate::images::{self, MediaStore};
use crate::models::{
    IngredientAmount, RecipeFilter, RecipeRead, RecipeRow, RecipeShort, RecipeWrite, Tag,
    UserView,
};
use crate::pagination::{Page, PageLink, PageParams};
use crate::permissions;
use crate::shopping_list;
use crate::validation;
use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, web};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    // Must precede `/recipes/{id}`.
    cfg.service(download_shopping_cart);
    cfg.service(list_recipes);
    cfg.service(create_recipe);
    cfg.service(get_recipe);
    cfg.service(update_recipe);
    cfg.service(delete_recipe);
    cfg.service(add_favorite);
    cfg.service(remove_favorite);
    cfg.service(add_to_cart);
    cfg.service(remove_from_cart);
}

#[get("/recipes")]
pub async fn list_recipes(
    viewer: MaybeUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
    pairs: web::Query<Vec<(String, String)>>,
    req: HttpRequest,
) -> ApiResult<HttpResponse> {
    let filter = RecipeFilter::from_pairs(&pairs)
        .map_err(|message| ApiError::validation("invalid_filter", message))?;
    let page = params.resolve(config.page_size)?;

    let count = db::count_recipes(&pool, &filter, viewer.id()).await?;
    page.ensure_in_range(count)?;
    let rows = db::list_recipes(&pool, &filter, viewer.id(), page.size, page.offset()).await?;
    let recipes = hydrate(&pool, &media, rows, viewer.id()).await?;

    Ok(HttpResponse::Ok().json(Page::new(recipes, count, page, &PageLink::from_request(&req))))
}

#[get("/recipes/{id}")]
pub async fn get_recipe(
    viewer: MaybeUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let recipe = load_recipe(&pool, &media, path.into_inner(), viewer.id()).await?;
    Ok(HttpResponse::Ok().json(recipe))
}

#[post("/recipes")]
pub async fn create_recipe(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    payload: web::Json<RecipeWrite>,
) -> ApiResult<HttpResponse> {
    validation::validate_recipe(&payload)?;
    let image = payload
        .image
        .as_deref()
        .ok_or_else(|| ApiError::validation("image_required", "A recipe needs an image"))
        .and_then(images::decode_data_uri)?;
    ensure_references_exist(&pool, &payload).await?;

    let recipe_id = Uuid::new_v4();
    let image_key = media.save_recipe_image(&image).await?;
    if let Err(err) = insert_recipe(&pool, recipe_id, user.id, &payload, &image_key).await {
        media.delete(&image_key).await;
        return Err(err);
    }
    tracing::info!(recipe_id = %recipe_id, author_id = %user.id, "Recipe created");

    let recipe = load_recipe(&pool, &media, recipe_id, Some(user.id)).await?;
    Ok(HttpResponse::Created().json(recipe))
}

#[patch("/recipes/{id}")]
pub async fn update_recipe(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    path: web::Path<Uuid>,
    payload: web::Json<RecipeWrite>,
) -> ApiResult<HttpResponse> {
    let existing = find_recipe(&pool, path.into_inner()).await?;
    permissions::ensure_can_modify(&pool, &user, existing.author_id).await?;
    validation::validate_recipe(&payload)?;
    let image = payload
        .image
        .as_deref()
        .map(images::decode_data_uri)
        .transpose()?;
    ensure_references_exist(&pool, &payload).await?;

    let new_key = match &image {
        Some(image) => Some(media.save_recipe_image(image).await?),
        None => None,
    };
    if let Err(err) = update_recipe_rows(&pool, existing.id, &payload, new_key.as_deref()).await {
        if let Some(key) = &new_key {
            media.delete(key).await;
        }
        return Err(err);
    }
    if new_key.is_some() {
        media.delete(&existing.image).await;
    }
    tracing::info!(recipe_id = %existing.id, editor_id = %user.id, "Recipe updated");

    let recipe = load_recipe(&pool, &media, existing.id, Some(user.id)).await?;
    Ok(HttpResponse::Ok().json(recipe))
}

#[delete("/recipes/{id}")]
pub async fn delete_recipe(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let existing = find_recipe(&pool, path.into_inner()).await?;
    permissions::ensure_can_modify(&pool, &user, existing.author_id).await?;

    let removed = db::delete_recipe(&pool, existing.id).await?;
    guards::check_removed(removed, "Recipe")?;
    media.delete(&existing.image).await;
    tracing::info!(recipe_id = %existing.id, editor_id = %user.id, "Recipe deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[post("/recipes/{id}/favorite")]
pub async fn add_favorite(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    add_to_list(&pool, &media, RecipeList::Favourites, &user, path.into_inner()).await
}

#[delete("/recipes/{id}/favorite")]
pub async fn remove_favorite(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    remove_from_list(&pool, RecipeList::Favourites, &user, path.into_inner()).await
}

#[post("/recipes/{id}/shopping_cart")]
pub async fn add_to_cart(
    user: AuthUser,
    pool: web::Data<PgPool>,
    media: web::Data<MediaStore>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    add_to_list(&pool, &media, RecipeList::Cart, &user, path.into_inner()).await
}

#[delete("/recipes/{id}/shopping_cart")]
pub async fn remove_from_cart(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    remove_from_list(&pool, RecipeList::Cart, &user, path.into_inner()).await
}

#[get("/recipes/download_shopping_cart")]
pub async fn download_shopping_cart(
    user: AuthUser,
    pool: web::Data<PgPool>,
) -> ApiResult<HttpResponse> {
    let lines = db::cart_lines(&pool, user.id).await?;
    let items = shopping_list::aggregate(lines);
    tracing::info!(user_id = %user.id, items = items.len(), "Shopping list downloaded");
    Ok(shopping_list::download(&items))
}

async fn add_to_list(
    pool: &PgPool,
    media: &MediaStore,
    list: RecipeList,
    user: &AuthUser,
    recipe_id: Uuid,
) -> ApiResult<HttpResponse> {
    let recipe = find_recipe(pool, recipe_id).await?;

    let already_listed = db::is_listed(pool, list, user.id, recipe.id).await?;
    guards::check_add(list, already_listed)?;
    db::add_to_list(pool, list, user.id, recipe.id).await?;
    tracing::info!(user_id = %user.id, recipe_id = %recipe.id, list = list.table(), "Recipe listed");

    Ok(HttpResponse::Created().json(RecipeShort {
        id: recipe.id,
        image: media.url(&recipe.image),
        name: recipe.name,
        cooking_time: recipe.cooking_time,
    }))
}

async fn remove_from_list(
    pool: &PgPool,
    list: RecipeList,
    user: &AuthUser,
    recipe_id: Uuid,
) -> ApiResult<HttpResponse> {
    let recipe = find_recipe(pool, recipe_id).await?;

    let removed = db::remove_from_list(pool, list, user.id, recipe.id).await?;
    guards::check_removed(removed, list.label())?;
    tracing::info!(user_id = %user.id, recipe_id = %recipe.id, list = list.table(), "Recipe unlisted");
    Ok(HttpResponse::NoContent().finish())
}

async fn find_recipe(pool: &PgPool, recipe_id: Uuid) -> ApiResult<RecipeRow> {
    db::get_recipe(pool, recipe_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe"))
}

async fn load_recipe(
    pool: &PgPool,
    media: &MediaStore,
    recipe_id: Uuid,
    viewer: Option<Uuid>,
) -> ApiResult<RecipeRead> {
    let row = find_recipe(pool, recipe_id).await?;
    hydrate(pool, media, vec![row], viewer)
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("Recipe"))
}

async fn insert_recipe(
    pool: &PgPool,
    recipe_id: Uuid,
    author_id: Uuid,
    recipe: &RecipeWrite,
    image_key: &str,
) -> ApiResult<()> {
    let mut tx = pool.begin().await?;
    db::insert_recipe(&mut tx, recipe_id, author_id, recipe, image_key).await?;
    db::replace_recipe_relations(&mut tx, recipe_id, recipe).await?;
    tx.commit().await?;
    Ok(())
}

async fn update_recipe_rows(
    pool: &PgPool,
    recipe_id: Uuid,
    recipe: &RecipeWrite,
    image_key: Option<&str>,
) -> ApiResult<()> {
    let mut tx = pool.begin().await?;
    db::update_recipe(&mut tx, recipe_id, recipe, image_key).await?;
    db::replace_recipe_relations(&mut tx, recipe_id, recipe).await?;
    tx.commit().await?;
    Ok(())
}

async fn ensure_references_exist(pool: &PgPool, recipe: &RecipeWrite) -> ApiResult<()> {
    let tag_count = db::count_existing_tags(pool, &recipe.tags).await?;
    if tag_count != recipe.tags.len() as i64 {
        return Err(ApiError::validation("unknown_tag", "One or more tags do not exist"));
    }

    let ingredient_ids: Vec<Uuid> = recipe.ingredients.iter().map(|item| item.id).collect();
    let ingredient_count = db::count_existing_ingredients(pool, &ingredient_ids).await?;
    if ingredient_count != ingredient_ids.len() as i64 {
        return Err(ApiError::validation(
            "unknown_ingredient",
            "One or more ingredients do not exist",
        ));
    }
    Ok(())
}

/// Related rows for a batch of recipes, keyed by recipe or user id.
#[derive(Default)]
struct Relations {
    tags: HashMap<Uuid, Vec<Tag>>,
    ingredients: HashMap<Uuid, Vec<IngredientAmount>>,
    authors: HashMap<Uuid, UserView>,
    favourited: HashSet<Uuid>,
    in_cart: HashSet<Uuid>,
}

/// Loads tags, ingredients, authors and the viewer's flags for `rows`,
/// keeping the order of `rows`.
async fn hydrate(
    pool: &PgPool,
    media: &MediaStore,
    rows: Vec<RecipeRow>,
    viewer: Option<Uuid>,
) -> ApiResult<Vec<RecipeRead>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let recipe_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<Uuid> = rows.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut relations = Relations::default();

    for row in db::tags_for_recipes(pool, &recipe_ids).await? {
        relations.tags.entry(row.recipe_id).or_default().push(Tag {
            id: row.id,
            name: row.name,
            slug: row.slug,
            color: row.color,
        });
    }
    for row in db::ingredients_for_recipes(pool, &recipe_ids).await? {
        relations
            .ingredients
            .entry(row.recipe_id)
            .or_default()
            .push(IngredientAmount {
                id: row.id,
                name: row.name,
                measurement_unit: row.measurement_unit,
                amount: row.amount,
            });
    }

    let authors = db::get_users_by_ids(pool, &author_ids).await?;
    let followed = match viewer {
        Some(viewer_id) => db::followed_among(pool, viewer_id, &author_ids).await?,
        None => HashSet::new(),
    };
    relations.authors = authors
        .iter()
        .map(|author| (author.id, UserView::new(author, followed.contains(&author.id))))
        .collect();

    if let Some(viewer_id) = viewer {
        relations.favourited =
            db::listed_among(pool, RecipeList::Favourites, viewer_id, &recipe_ids).await?;
        relations.in_cart = db::listed_among(pool, RecipeList::Cart, viewer_id, &recipe_ids).await?;
    }

    rows.into_iter()
        .map(|row| assemble(row, &mut relations, media))
        .collect()
}

fn assemble(row: RecipeRow, relations: &mut Relations, media: &MediaStore) -> ApiResult<RecipeRead> {
    let author = relations
        .authors
        .get(&row.author_id)
        .cloned()
        .ok_or_else(|| ApiError::Internal(format!("author {} of recipe {} missing", row.author_id, row.id)))?;

    Ok(RecipeRead {
        id: row.id,
        tags: relations.tags.remove(&row.id).unwrap_or_default(),
        author,
        ingredients: relations.ingredients.remove(&row.id).unwrap_or_default(),
        is_favorited: relations.favourited.contains(&row.id),
        is_in_shopping_cart: relations.in_cart.contains(&row.id),
        name: row.name,
        image: media.url(&row.image),
        text: row.text,
        cooking_time: row.cooking_time,
        pub_date: row.pub_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::issue_token;
    use crate::auth::tests::{test_config, test_user};
    use crate::models::Role;
    use crate::test_app;
    use actix_web::{http::StatusCode, test as actix_test};
    use chrono::Utc;

    fn row(author_id: Uuid) -> RecipeRow {
        RecipeRow {
            id: Uuid::new_v4(),
            name: "Shakshuka".to_string(),
            cooking_time: 25,
            text: "Simmer eggs in tomato sauce.".to_string(),
            image: "recipes/shakshuka.png".to_string(),
            author_id,
            pub_date: Utc::now(),
        }
    }

    #[test]
    fn assemble_uses_viewer_flags() {
        let author = test_user(Role::User);
        let recipe = row(author.id);
        let mut relations = Relations::default();
        relations.authors.insert(author.id, UserView::new(&author, true));
        relations.favourited.insert(recipe.id);
        relations.tags.insert(
            recipe.id,
            vec![Tag {
                id: Uuid::new_v4(),
                name: "Breakfast".to_string(),
                slug: "breakfast".to_string(),
                color: "#E26C2D".to_string(),
            }],
        );

        let media = MediaStore::new("media", "/media");
        let read = assemble(recipe, &mut relations, &media).unwrap();
        assert_eq!(read.image, "/media/recipes/shakshuka.png");
        assert!(read.is_favorited);
        assert!(!read.is_in_shopping_cart);
        assert!(read.author.is_subscribed);
        assert_eq!(read.tags.len(), 1);
        assert!(read.ingredients.is_empty());
    }

    #[test]
    fn assemble_fails_without_author() {
        let mut relations = Relations::default();
        let media = MediaStore::new("media", "/media");
        assert!(assemble(row(Uuid::new_v4()), &mut relations, &media).is_err());
    }

    fn token(role: Role) -> String {
        issue_token(&test_config(), &test_user(role)).unwrap()
    }

    #[actix_web::test]
    async fn anonymous_cannot_create() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/recipes/")
            .set_json(serde_json::json!({
                "name": "Toast",
                "text": "Toast bread.",
                "cooking_time": 2,
                "tags": [Uuid::new_v4()],
                "ingredients": [{"id": Uuid::new_v4(), "amount": 1}],
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn create_rejects_zero_cooking_time() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/recipes")
            .insert_header(("Authorization", format!("Token {}", token(Role::User))))
            .set_json(serde_json::json!({
                "name": "Toast",
                "text": "Toast bread.",
                "cooking_time": 0,
                "tags": [Uuid::new_v4()],
                "ingredients": [{"id": Uuid::new_v4(), "amount": 1}],
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_cooking_time");
    }

    #[actix_web::test]
    async fn create_rejects_duplicate_ingredients() {
        let app = actix_test::init_service(test_app()).await;
        let ingredient = Uuid::new_v4();
        let req = actix_test::TestRequest::post()
            .uri("/api/recipes")
            .insert_header(("Authorization", format!("Token {}", token(Role::User))))
            .set_json(serde_json::json!({
                "name": "Toast",
                "text": "Toast bread.",
                "cooking_time": 2,
                "tags": [Uuid::new_v4()],
                "ingredients": [
                    {"id": ingredient, "amount": 1},
                    {"id": ingredient, "amount": 2},
                ],
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "duplicate_ingredients");
    }

    #[actix_web::test]
    async fn malformed_body_is_a_bad_request() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/recipes")
            .insert_header(("Authorization", format!("Token {}", token(Role::User))))
            .set_json(serde_json::json!({ "name": "Toast" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_body");
    }

    #[actix_web::test]
    async fn download_route_is_not_an_id() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::get()
            .uri("/api/recipes/download_shopping_cart/")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn favourite_and_cart_need_authentication() {
        let app = actix_test::init_service(test_app()).await;
        let id = Uuid::new_v4();
        for uri in [
            format!("/api/recipes/{id}/favorite"),
            format!("/api/recipes/{id}/shopping_cart"),
        ] {
            let req = actix_test::TestRequest::post().uri(&uri).to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

            let req = actix_test::TestRequest::delete().uri(&uri).to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[actix_web::test]
    async fn bad_filter_value_is_a_bad_request() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::get()
            .uri("/api/recipes?is_favorited=maybe")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn non_uuid_recipe_id_is_not_found() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::get().uri("/api/recipes/42").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    fn toast(image: Option<String>) -> serde_json::Value {
        serde_json::json!({
            "name": "Toast",
            "text": "Toast bread.",
            "cooking_time": 2,
            "tags": [Uuid::new_v4()],
            "ingredients": [{"id": Uuid::new_v4(), "amount": 1}],
            "image": image,
        })
    }

    #[actix_web::test]
    async fn create_requires_an_image() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/recipes")
            .insert_header(("Authorization", format!("Token {}", token(Role::User))))
            .set_json(toast(None))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "image_required");
    }

    #[actix_web::test]
    async fn create_rejects_undecodable_image() {
        let app = actix_test::init_service(test_app()).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/recipes")
            .insert_header(("Authorization", format!("Token {}", token(Role::User))))
            .set_json(toast(Some("data:image/png;base64,not base64!".to_string())))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_image");
    }

    mod with_database {
        use super::*;
        use crate::fixtures::{
            auth_header, recipe_body, seed_ingredient, seed_recipe, seed_tag, seed_user,
        };
        use crate::images::tests::{PNG_BYTES, png_data_uri};
        use crate::test_app_with;
        use actix_web::http::header;
        use sqlx::PgPool;

        #[sqlx::test]
        async fn created_recipe_serves_its_image(pool: PgPool) {
            let author = seed_user(&pool, Role::User).await;
            let tag = seed_tag(&pool, "breakfast").await;
            let bread = seed_ingredient(&pool, "Bread", "slice").await;
            let mut body = serde_json::to_value(recipe_body(&tag, &[(&bread, 2)])).unwrap();
            body["image"] = png_data_uri().into();
            let app = actix_test::init_service(test_app_with(pool)).await;

            let req = actix_test::TestRequest::post()
                .uri("/api/recipes")
                .insert_header(auth_header(&author))
                .set_json(body)
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let created: serde_json::Value = actix_test::read_body_json(resp).await;
            let image_url = created["image"].as_str().unwrap().to_string();
            assert!(image_url.starts_with("/media/recipes/"), "{image_url}");
            assert_eq!(created["ingredients"][0]["amount"], 2);

            let req = actix_test::TestRequest::get().uri(&image_url).to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(actix_test::read_body(resp).await, PNG_BYTES);
        }

        #[sqlx::test]
        async fn favourites_reject_duplicates_and_missing_removals(pool: PgPool) {
            let author = seed_user(&pool, Role::User).await;
            let viewer = seed_user(&pool, Role::User).await;
            let tag = seed_tag(&pool, "dinner").await;
            let beans = seed_ingredient(&pool, "Beans", "g").await;
            let recipe_id = seed_recipe(&pool, &author, &recipe_body(&tag, &[(&beans, 200)])).await;
            let app = actix_test::init_service(test_app_with(pool)).await;
            let uri = format!("/api/recipes/{recipe_id}/favorite");

            let req = actix_test::TestRequest::post()
                .uri(&uri)
                .insert_header(auth_header(&viewer))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let short: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(short["image"], "/media/recipes/seeded.png");

            let req = actix_test::TestRequest::post()
                .uri(&uri)
                .insert_header(auth_header(&viewer))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(body["error"], "already_favourited");

            for expected in [StatusCode::NO_CONTENT, StatusCode::NOT_FOUND] {
                let req = actix_test::TestRequest::delete()
                    .uri(&uri)
                    .insert_header(auth_header(&viewer))
                    .to_request();
                let resp = actix_test::call_service(&app, req).await;
                assert_eq!(resp.status(), expected);
            }
        }

        #[sqlx::test]
        async fn cart_rejects_duplicates_and_downloads_totals(pool: PgPool) {
            let author = seed_user(&pool, Role::User).await;
            let shopper = seed_user(&pool, Role::User).await;
            let tag = seed_tag(&pool, "soup").await;
            let salt = seed_ingredient(&pool, "Salt", "g").await;
            let first = seed_recipe(&pool, &author, &recipe_body(&tag, &[(&salt, 5)])).await;
            let second = seed_recipe(&pool, &author, &recipe_body(&tag, &[(&salt, 10)])).await;
            let app = actix_test::init_service(test_app_with(pool)).await;

            for recipe_id in [first, second] {
                let req = actix_test::TestRequest::post()
                    .uri(&format!("/api/recipes/{recipe_id}/shopping_cart"))
                    .insert_header(auth_header(&shopper))
                    .to_request();
                let resp = actix_test::call_service(&app, req).await;
                assert_eq!(resp.status(), StatusCode::CREATED);
            }

            let req = actix_test::TestRequest::post()
                .uri(&format!("/api/recipes/{first}/shopping_cart"))
                .insert_header(auth_header(&shopper))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(body["error"], "already_in_cart");

            let req = actix_test::TestRequest::get()
                .uri("/api/recipes/download_shopping_cart")
                .insert_header(auth_header(&shopper))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(
                resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
                "attachment; filename=shopping_cart.txt"
            );
            assert_eq!(actix_test::read_body(resp).await, "Salt 15 g\n");

            // The author never carted anything.
            let req = actix_test::TestRequest::delete()
                .uri(&format!("/api/recipes/{first}/shopping_cart"))
                .insert_header(auth_header(&author))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }

        #[sqlx::test]
        async fn demoted_admin_cannot_edit_others_recipes(pool: PgPool) {
            let author = seed_user(&pool, Role::User).await;
            let mut former_admin = seed_user(&pool, Role::User).await;
            let tag = seed_tag(&pool, "lunch").await;
            let rice = seed_ingredient(&pool, "Rice", "g").await;
            let recipe = recipe_body(&tag, &[(&rice, 100)]);
            let recipe_id = seed_recipe(&pool, &author, &recipe).await;
            former_admin.role = Role::Admin;
            let app = actix_test::init_service(test_app_with(pool)).await;

            let req = actix_test::TestRequest::patch()
                .uri(&format!("/api/recipes/{recipe_id}"))
                .insert_header(auth_header(&former_admin))
                .set_json(&recipe)
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }
    }
}
