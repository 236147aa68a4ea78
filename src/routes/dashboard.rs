use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{task::TASK_COLUMNS, Task},
    response,
    stats::{
        queries::{self, Scope},
        CompletionSummary, Period, PriorityBucket, StatusBreakdown, TasksByDate,
    },
};
use actix_web::{get, web, Responder};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

/// Rows shown in the dashboard's "upcoming" and "recent" panels.
const PANEL_SIZE: i64 = 5;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub tasks: StatusBreakdown,
    pub priority: Vec<PriorityBucket>,
    pub tasks_by_date: TasksByDate,
    /// Pending tasks due from now on, soonest first.
    pub upcoming: Vec<Task>,
    pub recent: Vec<Task>,
    pub todos: CompletionSummary,
}

/// Everything the home screen needs for the authenticated user, in one response.
#[get("/dashboard")]
pub async fn dashboard(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let now = Utc::now();
    let scope = Scope::User(user.id);

    let tasks = queries::status_breakdown(&pool, scope, now).await?;
    let priority = queries::priority_distribution(&pool, scope).await?;
    let tasks_by_date = queries::tasks_by_date(&pool, scope, Period::Week, now).await?;
    let todos = queries::todo_summary(&pool, scope).await?;

    let upcoming = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks \
         WHERE user_id = $1 AND NOT completed AND due_date IS NOT NULL AND due_date >= $2 \
         ORDER BY due_date ASC, id LIMIT $3",
        TASK_COLUMNS
    ))
    .bind(user.id)
    .bind(now)
    .bind(PANEL_SIZE)
    .fetch_all(&**pool)
    .await?;

    let recent = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE user_id = $1 ORDER BY created_at DESC, id LIMIT $2",
        TASK_COLUMNS
    ))
    .bind(user.id)
    .bind(PANEL_SIZE)
    .fetch_all(&**pool)
    .await?;

    Ok(response::ok(Dashboard {
        tasks,
        priority,
        tasks_by_date,
        upcoming,
        recent,
        todos,
    }))
}
