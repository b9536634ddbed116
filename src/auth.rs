// src/auth.rs
use crate::config::Config;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Claims, LoginRequest, Role, User};
use actix_web::{FromRequest, HttpRequest, HttpResponse, dev::Payload, http::header, post, web};
use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::future::Cache;
use serde_json::json;
use std::future::{Ready, ready};
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(login);
    cfg.service(logout);
}

/// Token ids revoked by logout, remembered until the token would have
/// expired on its own.
#[derive(Clone)]
pub struct TokenDenylist {
    revoked: Cache<String, ()>,
}

impl TokenDenylist {
    pub fn new(token_ttl: Duration) -> Self {
        let ttl = token_ttl.to_std().unwrap_or(std::time::Duration::from_secs(86_400));
        Self {
            revoked: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub async fn revoke(&self, jti: &str) {
        self.revoked.insert(jti.to_string(), ()).await;
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }
}

pub fn issue_token(config: &Config, user: &User) -> ApiResult<String> {
    let expiration = Utc::now() + Duration::hours(config.token_ttl_hours);
    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role,
        jti: Uuid::new_v4().to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(format!("token generation failed: {e}")))
}

pub fn decode_token(config: &Config, token: &str) -> ApiResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::Unauthorized
    })
}

/// Accepts both `Token <t>` and `Bearer <t>`.
fn token_from_request(req: &HttpRequest) -> Option<Result<&str, ApiError>> {
    let value = req.headers().get(header::AUTHORIZATION)?;
    let token = value.to_str().ok().and_then(|raw| {
        raw.strip_prefix("Token ")
            .or_else(|| raw.strip_prefix("Bearer "))
            .map(str::trim)
    });
    Some(token.filter(|t| !t.is_empty()).ok_or(ApiError::Unauthorized))
}

/// The authenticated caller. Extracting it fails with 401 when the request
/// carries no valid, unrevoked token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub jti: String,
}

impl AuthUser {
    fn from_token(req: &HttpRequest, token: &str) -> Result<Self, ApiError> {
        let config = req
            .app_data::<web::Data<Config>>()
            .ok_or_else(|| ApiError::Internal("configuration is not registered".to_string()))?;
        let claims = decode_token(config, token)?;

        if let Some(denylist) = req.app_data::<web::Data<TokenDenylist>>() {
            if denylist.is_revoked(&claims.jti) {
                return Err(ApiError::Unauthorized);
            }
        }

        let id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;
        Ok(Self {
            id,
            role: claims.role,
            jti: claims.jti,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match token_from_request(req) {
            Some(Ok(token)) => Self::from_token(req, token),
            Some(Err(e)) => Err(e),
            None => Err(ApiError::Unauthorized),
        };
        ready(result)
    }
}

/// The caller if a token was sent. A token that is present but invalid still
/// fails with 401.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|user| user.id)
    }
}

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match token_from_request(req) {
            Some(Ok(token)) => AuthUser::from_token(req, token).map(|user| Self(Some(user))),
            Some(Err(e)) => Err(e),
            None => Ok(Self(None)),
        };
        ready(result)
    }
}

#[post("/auth/token/login")]
pub async fn login(
    pool: web::Data<sqlx::PgPool>,
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let user = db::get_user_by_email(&pool, &req.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    match verify(&req.password, &user.password_hash) {
        Ok(true) => {
            let token = issue_token(&config, &user)?;
            tracing::info!(user_id = %user.id, "Issued auth token");
            Ok(HttpResponse::Ok().json(json!({ "auth_token": token })))
        }
        Ok(false) => Err(ApiError::Unauthorized),
        Err(e) => {
            tracing::warn!("Password verification error: {}", e);
            Err(ApiError::Unauthorized)
        }
    }
}

#[post("/auth/token/logout")]
pub async fn logout(
    user: AuthUser,
    denylist: web::Data<TokenDenylist>,
) -> ApiResult<HttpResponse> {
    denylist.revoke(&user.jti).await;
    tracing::info!(user_id = %user.id, "Revoked auth token");
    Ok(HttpResponse::NoContent().finish())
}
