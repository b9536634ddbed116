// src/fixtures.rs
//! Rows and tokens for tests that run against a migrated database.
use crate::auth::{
    issue_token,
    tests::{test_config, test_user},
};
use crate::db;
use crate::models::{
    Ingredient, IngredientAmountWrite, IngredientCreate, RecipeWrite, Role, Tag, TagCreate, User,
};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn seed_user(pool: &PgPool, role: Role) -> User {
    let mut user = test_user(role);
    let suffix = user.id.simple().to_string();
    user.username = format!("cook_{}", &suffix[..12]);
    user.email = format!("{}@example.com", user.username);
    db::create_user(pool, &user).await.unwrap();
    user
}

/// `Authorization` header for `user`.
pub fn auth_header(user: &User) -> (&'static str, String) {
    let token = issue_token(&test_config(), user).unwrap();
    ("Authorization", format!("Token {token}"))
}

pub async fn seed_tag(pool: &PgPool, slug: &str) -> Tag {
    let tag = TagCreate {
        name: slug.to_string(),
        slug: slug.to_string(),
        color: "#49B64E".to_string(),
    };
    db::create_tag(pool, &tag).await.unwrap()
}

pub async fn seed_ingredient(pool: &PgPool, name: &str, unit: &str) -> Ingredient {
    let ingredient = IngredientCreate {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
    };
    db::create_ingredient(pool, &ingredient).await.unwrap()
}

pub fn recipe_body(tag: &Tag, items: &[(&Ingredient, i32)]) -> RecipeWrite {
    RecipeWrite {
        name: "Stew".to_string(),
        text: "Simmer everything.".to_string(),
        cooking_time: 30,
        tags: vec![tag.id],
        ingredients: items
            .iter()
            .map(|(ingredient, amount)| IngredientAmountWrite {
                id: ingredient.id,
                amount: *amount,
            })
            .collect(),
        image: None,
    }
}

/// Inserts a recipe directly, pointing at an image key with no file behind it.
pub async fn seed_recipe(pool: &PgPool, author: &User, recipe: &RecipeWrite) -> Uuid {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    db::insert_recipe(&mut tx, id, author.id, recipe, "recipes/seeded.png")
        .await
        .unwrap();
    db::replace_recipe_relations(&mut tx, id, recipe).await.unwrap();
    tx.commit().await.unwrap();
    id
}
