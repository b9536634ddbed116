// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperUser,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperUser)
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A user as other users see them.
#[derive(Serialize, Clone, Debug)]
pub struct UserView {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: &User, is_subscribed: bool) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct RegisteredUser {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// An author in the caller's subscription list, with their recipes.
#[derive(Serialize, Clone, Debug)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub color: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow, PartialEq, Eq)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Clone, Debug, FromRow)]
pub struct RecipeRow {
    pub id: Uuid,
    pub name: String,
    pub cooking_time: i32,
    pub text: String,
    /// Media key of the picture.
    pub image: String,
    pub author_id: Uuid,
    pub pub_date: DateTime<Utc>,
}

#[derive(Clone, Debug, FromRow)]
pub struct RecipeTagRow {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub color: String,
}

#[derive(Clone, Debug, FromRow)]
pub struct RecipeIngredientRow {
    pub recipe_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Clone, Debug)]
pub struct RecipeRead {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<IngredientAmount>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RecipeShort {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(Clone, Debug, FromRow)]
pub struct AuthoredRecipe {
    pub author_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

/// One ingredient line of one recipe in a user's cart.
#[derive(Clone, Debug, FromRow)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    pub jti: String,
    pub exp: usize,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-');
    if username.chars().all(allowed) {
        Ok(())
    } else {
        Err(ValidationError::new("username")
            .with_message("Letters, digits and @/./+/-/_ only".into()))
    }
}

#[derive(Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 150), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 1, max = 150))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150))]
    pub last_name: String,
    #[validate(length(min = 8, max = 150))]
    pub password: String,
}

#[derive(Serialize, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(length(min = 8, max = 150))]
    pub new_password: String,
    pub current_password: String,
}

/// Recipe listing filters, parsed from raw query pairs so `tags` can repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

impl RecipeFilter {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, String> {
        let mut filter = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "author" => {
                    let author = Uuid::parse_str(value)
                        .map_err(|_| format!("author: '{value}' is not a valid id"))?;
                    filter.author = Some(author);
                }
                "tags" => filter
                    .tags
                    .extend(value.split(',').filter(|s| !s.is_empty()).map(str::to_string)),
                "is_favorited" => filter.is_favorited = Some(parse_flag(key, value)?),
                "is_in_shopping_cart" => filter.is_in_shopping_cart = Some(parse_flag(key, value)?),
                _ => {}
            }
        }
        Ok(filter)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, String> {
    match value {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        _ => Err(format!("{key}: expected 1 or 0, got '{value}'")),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IngredientAmountWrite {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RecipeWrite {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<IngredientAmountWrite>,
    /// Base64 data URI. Required on create, kept as is when absent on update.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Validate)]
pub struct TagCreate {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 50), custom(function = "validate_slug"))]
    pub slug: String,
    #[validate(length(min = 1, max = 256))]
    pub color: String,
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("slug"))
    }
}

#[derive(Serialize, Deserialize, Validate)]
pub struct IngredientCreate {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 10))]
    pub measurement_unit: String,
}
