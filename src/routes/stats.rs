//! Per-user statistics. Admins may pass `user_id` to inspect another account.

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    policy::scoped_owner,
    response,
    stats::{
        queries::{self, Scope},
        CompletionSummary, Period, StatusBreakdown,
    },
};
use actix_web::{get, web, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub user_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksByDateQuery {
    /// `week` (default), `month` or `year`.
    pub period: Option<String>,
    pub user_id: Option<i32>,
}

#[derive(Debug, Serialize)]
struct Overview {
    tasks: StatusBreakdown,
    todos: CompletionSummary,
}

/// Task status breakdown and todo completion for one user.
#[get("/overview")]
pub async fn overview(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, AppError> {
    let scope = Scope::User(scoped_owner(&user, query.user_id)?);

    let tasks = queries::status_breakdown(&pool, scope, Utc::now()).await?;
    let todos = queries::todo_summary(&pool, scope).await?;
    Ok(response::ok(Overview { tasks, todos }))
}

/// Tasks created per day (week, month) or per month (year).
///
/// ## Responses:
/// - `200 OK`: zero-filled buckets, oldest first.
/// - `422 Unprocessable Entity`: unknown `period`.
#[get("/tasks-by-date")]
pub async fn tasks_by_date(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<TasksByDateQuery>,
) -> Result<impl Responder, AppError> {
    let period = Period::parse_param(query.period.as_deref())?;
    let scope = Scope::User(scoped_owner(&user, query.user_id)?);

    let series = queries::tasks_by_date(&pool, scope, period, Utc::now()).await?;
    Ok(response::ok(series))
}

#[get("/priority")]
pub async fn priority(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, AppError> {
    let scope = Scope::User(scoped_owner(&user, query.user_id)?);
    Ok(response::ok(queries::priority_distribution(&pool, scope).await?))
}

#[get("/tags")]
pub async fn tags(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, AppError> {
    let owner = scoped_owner(&user, query.user_id)?;
    Ok(response::ok(queries::tag_stats(&pool, owner).await?))
}

#[get("/categories")]
pub async fn categories(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, AppError> {
    let owner = scoped_owner(&user, query.user_id)?;
    Ok(response::ok(queries::category_stats(&pool, owner).await?))
}
