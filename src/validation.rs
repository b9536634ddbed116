// src/validation.rs
use crate::error::ApiError;
use crate::models::RecipeWrite;
use std::collections::HashSet;
use thiserror::Error;

const MAX_NAME_CHARS: usize = 200;

/// The recipe write rules, each with its own error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecipeRule {
    #[error("Select at least one tag")]
    EmptyTags,
    #[error("Tags must be unique")]
    DuplicateTags,
    #[error("Add at least one ingredient")]
    EmptyIngredients,
    #[error("Ingredients must be unique")]
    DuplicateIngredients,
    #[error("Ingredient amount must be at least 1")]
    InvalidAmount,
    #[error("Cooking time must be at least 1 minute")]
    InvalidCookingTime,
    #[error("Recipe name must be 1 to 200 characters")]
    InvalidName,
    #[error("Recipe text must not be empty")]
    EmptyText,
}

impl RecipeRule {
    pub fn code(self) -> &'static str {
        match self {
            Self::EmptyTags => "empty_tags",
            Self::DuplicateTags => "duplicate_tags",
            Self::EmptyIngredients => "empty_ingredients",
            Self::DuplicateIngredients => "duplicate_ingredients",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidCookingTime => "invalid_cooking_time",
            Self::InvalidName => "invalid_name",
            Self::EmptyText => "empty_text",
        }
    }
}

impl From<RecipeRule> for ApiError {
    fn from(rule: RecipeRule) -> Self {
        ApiError::validation(rule.code(), rule.to_string())
    }
}

/// Checks a create or update payload, reporting the first rule it breaks.
pub fn check_recipe(recipe: &RecipeWrite) -> Result<(), RecipeRule> {
    let name_chars = recipe.name.trim().chars().count();
    if name_chars == 0 || recipe.name.chars().count() > MAX_NAME_CHARS {
        return Err(RecipeRule::InvalidName);
    }
    if recipe.text.trim().is_empty() {
        return Err(RecipeRule::EmptyText);
    }
    if recipe.cooking_time < 1 {
        return Err(RecipeRule::InvalidCookingTime);
    }

    if recipe.tags.is_empty() {
        return Err(RecipeRule::EmptyTags);
    }
    let unique_tags: HashSet<_> = recipe.tags.iter().collect();
    if unique_tags.len() != recipe.tags.len() {
        return Err(RecipeRule::DuplicateTags);
    }

    if recipe.ingredients.is_empty() {
        return Err(RecipeRule::EmptyIngredients);
    }
    if recipe.ingredients.iter().any(|item| item.amount < 1) {
        return Err(RecipeRule::InvalidAmount);
    }
    let unique_ingredients: HashSet<_> = recipe.ingredients.iter().map(|item| item.id).collect();
    if unique_ingredients.len() != recipe.ingredients.len() {
        return Err(RecipeRule::DuplicateIngredients);
    }

    Ok(())
}

pub fn validate_recipe(recipe: &RecipeWrite) -> Result<(), ApiError> {
    check_recipe(recipe).map_err(ApiError::from)
}
