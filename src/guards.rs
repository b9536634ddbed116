// src/guards.rs
//! At-most-one rules for the user/recipe and user/user relations.
//!
//! Handlers check for an existing row before inserting; the database
//! constraints named in [`Conflict::from_constraint`] catch the requests that
//! race past that check, and both paths report the same [`Conflict`].
use crate::error::ApiError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("already subscribed")]
    AlreadySubscribed,
    #[error("cannot follow self")]
    CannotFollowSelf,
    #[error("already in favourites")]
    AlreadyFavourited,
    #[error("already in cart")]
    AlreadyInCart,
}

impl Conflict {
    pub fn code(self) -> &'static str {
        match self {
            Self::AlreadySubscribed => "already_subscribed",
            Self::CannotFollowSelf => "cannot_follow_self",
            Self::AlreadyFavourited => "already_favourited",
            Self::AlreadyInCart => "already_in_cart",
        }
    }

    pub fn from_constraint(name: &str) -> Option<Self> {
        match name {
            "unique_user_author" => Some(Self::AlreadySubscribed),
            "users_cannot_follow_themselves" => Some(Self::CannotFollowSelf),
            "unique_favourite" => Some(Self::AlreadyFavourited),
            "unique_cart" => Some(Self::AlreadyInCart),
            _ => None,
        }
    }
}

/// Per-user recipe collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favourites,
    Cart,
}

impl RecipeList {
    pub fn table(self) -> &'static str {
        match self {
            Self::Favourites => "favourites",
            Self::Cart => "carts",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Favourites => "Favourite",
            Self::Cart => "Cart entry",
        }
    }

    fn conflict(self) -> Conflict {
        match self {
            Self::Favourites => Conflict::AlreadyFavourited,
            Self::Cart => Conflict::AlreadyInCart,
        }
    }
}

pub fn check_follow(user_id: Uuid, author_id: Uuid, already_following: bool) -> Result<(), Conflict> {
    if user_id == author_id {
        return Err(Conflict::CannotFollowSelf);
    }
    if already_following {
        return Err(Conflict::AlreadySubscribed);
    }
    Ok(())
}

pub fn check_add(list: RecipeList, already_listed: bool) -> Result<(), Conflict> {
    if already_listed {
        Err(list.conflict())
    } else {
        Ok(())
    }
}

/// Turns the row count of a relationship delete into not-found when nothing
/// was removed.
pub fn check_removed(rows_affected: u64, what: &str) -> Result<(), ApiError> {
    if rows_affected == 0 {
        Err(ApiError::not_found(what))
    } else {
        Ok(())
    }
}
