use crate::{
    auth::{
        generate_token, hash_password, verify_password, AuthResponse, AuthenticatedUser,
        ChangePasswordRequest, LoginRequest, RegisterRequest,
    },
    config::Config,
    error::AppError,
    models::{user::USER_COLUMNS, User},
    response,
};
use actix_web::{get, post, put, web, Responder};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use validator::Validate;

/// Register a new user
///
/// Creates a new account and returns an authentication token. The account gets the
/// admin flag when its email matches `BOOTSTRAP_ADMIN_EMAIL`.
#[post("/register")]
pub async fn register(
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let email = register_data.email.trim().to_lowercase();

    let existing_user = sqlx::query_as::<_, (i32,)>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&**pool)
        .await?;

    if existing_user.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&register_data.password)?;
    let is_admin = config.is_bootstrap_admin(&email);

    let (user_id,) = sqlx::query_as::<_, (i32,)>(
        "INSERT INTO users (username, email, password_hash, is_admin) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(&register_data.username)
    .bind(&email)
    .bind(password_hash)
    .bind(is_admin)
    .fetch_one(&**pool)
    .await?;

    log::info!("Registered user {} (admin: {})", user_id, is_admin);
    let token = generate_token(user_id, is_admin)?;

    Ok(response::created(
        "Registration successful",
        AuthResponse {
            token,
            user_id,
            is_admin,
        },
    ))
}

/// Login user
///
/// Authenticates a user and returns an authentication token. Soft-deleted accounts
/// cannot log in.
#[post("/login")]
pub async fn login(
    pool: web::Data<PgPool>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;

    let user = sqlx::query_as::<_, (i32, String, bool, Option<DateTime<Utc>>)>(
        "SELECT id, password_hash, is_admin, deleted_at FROM users WHERE email = $1",
    )
    .bind(login_data.email.trim().to_lowercase())
    .fetch_optional(&**pool)
    .await?;

    match user {
        Some((user_id, password_hash, is_admin, None)) => {
            if !verify_password(&login_data.password, &password_hash)? {
                return Err(AppError::Unauthorized("Invalid credentials".into()));
            }
            let token = generate_token(user_id, is_admin)?;
            Ok(response::ok_with_message(
                "Login successful",
                AuthResponse {
                    token,
                    user_id,
                    is_admin,
                },
            ))
        }
        _ => Err(AppError::Unauthorized("Invalid credentials".into())),
    }
}

/// The authenticated user's own account.
#[get("/me")]
pub async fn me(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let account = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
        USER_COLUMNS
    ))
    .bind(user.id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(response::ok(account))
}

/// Change the authenticated user's password after checking the current one.
#[put("/password")]
pub async fn change_password(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    body: web::Json<ChangePasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;

    let (current_hash,) = sqlx::query_as::<_, (String,)>(
        "SELECT password_hash FROM users WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(user.id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !verify_password(&body.current_password, &current_hash)? {
        return Err(AppError::invalid_field(
            "current_password",
            "mismatch",
            "Current password is incorrect",
        ));
    }

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(hash_password(&body.new_password)?)
        .bind(user.id)
        .execute(&**pool)
        .await?;

    log::info!("User {} changed their password", user.id);
    Ok(response::ok_with_message("Password updated", serde_json::Value::Null))
}
