// src/permissions.rs
//! The role inside a token only gates the request. Administrator rights are
//! confirmed against the stored user, so a demotion applies to tokens that
//! are already out.
use crate::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use sqlx::PgPool;
use uuid::Uuid;

const AUTHOR_OR_ADMIN: &str = "Only the author or an administrator may change this recipe";
const ADMIN_ONLY: &str = "Administrator access required";

async fn confirm_admin(pool: &PgPool, user: &AuthUser, denial: &str) -> ApiResult<()> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden(denial.to_string()));
    }
    let stored = db::get_user_by_id(pool, user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if stored.role.is_admin() {
        Ok(())
    } else {
        tracing::info!(user_id = %user.id, "Admin token rejected for demoted user");
        Err(ApiError::Forbidden(denial.to_string()))
    }
}

/// Recipes may be changed by their author or by an administrator.
pub async fn ensure_can_modify(pool: &PgPool, user: &AuthUser, author_id: Uuid) -> ApiResult<()> {
    if user.id == author_id {
        return Ok(());
    }
    confirm_admin(pool, user, AUTHOR_OR_ADMIN).await
}

pub async fn ensure_admin(pool: &PgPool, user: &AuthUser) -> ApiResult<()> {
    confirm_admin(pool, user, ADMIN_ONLY).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seed_user;
    use crate::models::Role;
    use sqlx::postgres::PgPoolOptions;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
            jti: String::new(),
        }
    }

    // Paths that must decide without a query.
    fn offline_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/recipes_test")
            .unwrap()
    }

    #[actix_web::test]
    async fn author_may_modify_own_recipe() {
        let user = caller(Role::User);
        assert!(ensure_can_modify(&offline_pool(), &user, user.id).await.is_ok());
    }

    #[actix_web::test]
    async fn stranger_may_not_modify() {
        let user = caller(Role::User);
        assert!(matches!(
            ensure_can_modify(&offline_pool(), &user, Uuid::new_v4()).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[actix_web::test]
    async fn plain_users_are_refused_catalogue_writes() {
        assert!(matches!(
            ensure_admin(&offline_pool(), &caller(Role::User)).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[sqlx::test]
    async fn stored_admins_may_modify_anything(pool: PgPool) {
        for role in [Role::Admin, Role::SuperUser] {
            let admin = seed_user(&pool, role).await;
            let caller = AuthUser {
                id: admin.id,
                role,
                jti: String::new(),
            };
            assert!(ensure_can_modify(&pool, &caller, Uuid::new_v4()).await.is_ok());
            assert!(ensure_admin(&pool, &caller).await.is_ok());
        }
    }

    #[sqlx::test]
    async fn demoted_admin_token_is_refused(pool: PgPool) {
        let stored = seed_user(&pool, Role::User).await;
        let stale = AuthUser {
            id: stored.id,
            role: Role::Admin,
            jti: String::new(),
        };

        assert!(matches!(
            ensure_admin(&pool, &stale).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            ensure_can_modify(&pool, &stale, Uuid::new_v4()).await,
            Err(ApiError::Forbidden(_))
        ));
    }
}
