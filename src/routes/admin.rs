//! Back-office endpoints. Every handler takes an [`AdminUser`], so non-admins get
//! `403` before any query runs.
//!
//! User management only ever touches regular accounts: other admins are left out
//! of listings and answer `404` on show, update and delete.

use crate::{
    auth::{hash_password, AdminUser},
    error::AppError,
    models::{user::USER_COLUMNS, User, UserInput, UserUpdate},
    response::{self, Page, PageQuery},
    security::{contains_pattern, normalize_search},
    stats::{
        queries::{self, ActiveUser, ContentCounts, Scope, UserCounts},
        top_users_limit, Period, StatusBreakdown, TasksByDate, DEFAULT_TOP_USERS,
    },
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users: UserCounts,
    pub tasks: StatusBreakdown,
    pub content: ContentCounts,
    pub most_active_users: Vec<ActiveUser>,
    pub tasks_by_date: TasksByDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct MostActiveQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    /// Matches username or email.
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteUserQuery {
    /// Remove the row instead of setting `deleted_at`.
    #[serde(default)]
    pub hard: bool,
}

/// Loads a regular (non-admin) account, soft-deleted ones included.
async fn fetch_managed_user(pool: &PgPool, id: i32) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1 AND NOT is_admin",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))
}

fn duplicate_email(err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => AppError::Conflict("Email already registered".into()),
        other => other,
    }
}

/// Global numbers for the back office.
#[get("/dashboard")]
pub async fn dashboard(
    pool: web::Data<PgPool>,
    _admin: AdminUser,
) -> Result<impl Responder, AppError> {
    let now = Utc::now();

    let users = queries::user_counts(&pool).await?;
    let tasks = queries::status_breakdown(&pool, Scope::Global, now).await?;
    let content = queries::content_counts(&pool).await?;
    let most_active_users = queries::most_active_users(&pool, DEFAULT_TOP_USERS).await?;
    let tasks_by_date = queries::tasks_by_date(&pool, Scope::Global, Period::Week, now).await?;

    Ok(response::ok(AdminDashboard {
        users,
        tasks,
        content,
        most_active_users,
        tasks_by_date,
    }))
}

/// Top users by task count. `limit` defaults to 5 and is clamped to 1..=50.
#[get("/stats/most-active")]
pub async fn most_active(
    pool: web::Data<PgPool>,
    _admin: AdminUser,
    query: web::Query<MostActiveQuery>,
) -> Result<impl Responder, AppError> {
    let limit = top_users_limit(query.limit);
    Ok(response::ok(queries::most_active_users(&pool, limit).await?))
}

#[get("/users")]
pub async fn list_users(
    pool: web::Data<PgPool>,
    _admin: AdminUser,
    query: web::Query<UserQuery>,
    page: web::Query<PageQuery>,
) -> Result<impl Responder, AppError> {
    let search = normalize_search(query.search.as_deref()).map(|term| contains_pattern(&term));

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE NOT is_admin");
    push_user_search(&mut count, search.clone());
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(&**pool).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM users WHERE NOT is_admin",
        USER_COLUMNS
    ));
    push_user_search(&mut select, search);
    select
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let users = select.build_query_as::<User>().fetch_all(&**pool).await?;

    Ok(response::ok(Page::new(users, total, &page)))
}

fn push_user_search(qb: &mut QueryBuilder<'_, Postgres>, pattern: Option<String>) {
    if let Some(pattern) = pattern {
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[post("/users")]
pub async fn create_user(
    pool: web::Data<PgPool>,
    admin: AdminUser,
    user_data: web::Json<UserInput>,
) -> Result<impl Responder, AppError> {
    user_data.validate()?;
    let password_hash = hash_password(&user_data.password)?;

    let created = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password_hash, is_admin) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        USER_COLUMNS
    ))
    .bind(&user_data.username)
    .bind(user_data.email.trim().to_lowercase())
    .bind(password_hash)
    .bind(user_data.is_admin)
    .fetch_one(&**pool)
    .await
    .map_err(|e| duplicate_email(e.into()))?;

    log::info!("Admin {} created user {}", admin.0.id, created.id);
    Ok(response::created("User created", created))
}

#[get("/users/{id}")]
pub async fn get_user(
    pool: web::Data<PgPool>,
    _admin: AdminUser,
    user_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    Ok(response::ok(fetch_managed_user(&pool, user_id.into_inner()).await?))
}

#[put("/users/{id}")]
pub async fn update_user(
    pool: web::Data<PgPool>,
    admin: AdminUser,
    user_id: web::Path<i32>,
    user_data: web::Json<UserUpdate>,
) -> Result<impl Responder, AppError> {
    user_data.validate()?;
    let user = fetch_managed_user(&pool, user_id.into_inner()).await?;
    let update = user_data.into_inner();

    let password_hash = update.password.as_deref().map(hash_password).transpose()?;
    let updated = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET username = $2, email = $3, is_admin = $4, \
         password_hash = COALESCE($5, password_hash), updated_at = NOW() \
         WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user.id)
    .bind(update.username.unwrap_or(user.username))
    .bind(
        update
            .email
            .map(|email| email.trim().to_lowercase())
            .unwrap_or(user.email),
    )
    .bind(update.is_admin.unwrap_or(user.is_admin))
    .bind(password_hash)
    .fetch_one(&**pool)
    .await
    .map_err(|e| duplicate_email(e.into()))?;

    log::info!("Admin {} updated user {}", admin.0.id, updated.id);
    Ok(response::ok_with_message("User updated", updated))
}

/// Soft-deletes a user, or removes the row with `?hard=true`.
///
/// A hard delete is refused with `409 Conflict` while the user still owns
/// categories, tags, tasks or todos.
#[delete("/users/{id}")]
pub async fn delete_user(
    pool: web::Data<PgPool>,
    admin: AdminUser,
    user_id: web::Path<i32>,
    query: web::Query<DeleteUserQuery>,
) -> Result<impl Responder, AppError> {
    let user = fetch_managed_user(&pool, user_id.into_inner()).await?;

    if !query.hard {
        sqlx::query(
            "UPDATE users SET deleted_at = COALESCE(deleted_at, NOW()), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(user.id)
        .execute(&**pool)
        .await?;
        log::info!("Admin {} soft-deleted user {}", admin.0.id, user.id);
        return Ok(HttpResponse::NoContent().finish());
    }

    let mut tx = pool.begin().await?;
    // New rows referencing the user wait on this lock, so the count below stays true
    // until the delete commits.
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    let (owned,) = sqlx::query_as::<_, (i64,)>(
        "SELECT (SELECT COUNT(*) FROM categories WHERE user_id = $1) \
              + (SELECT COUNT(*) FROM tags WHERE user_id = $1) \
              + (SELECT COUNT(*) FROM tasks WHERE user_id = $1) \
              + (SELECT COUNT(*) FROM todos WHERE user_id = $1)",
    )
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    if owned > 0 {
        return Err(AppError::Conflict(format!(
            "User still owns {} record(s); delete them first or soft-delete the user",
            owned
        )));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log::warn!("Admin {} permanently deleted user {}", admin.0.id, user.id);
    Ok(HttpResponse::NoContent().finish())
}
