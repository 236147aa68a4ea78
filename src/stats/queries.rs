//! Aggregate SQL behind the dashboards. Each function issues a fixed number of
//! grouped queries regardless of how many users, tags or categories exist.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    priority_buckets, time_series, CompletionSummary, GroupStats, Period, PriorityBucket,
    StatusBreakdown, TasksByDate,
};
use crate::{error::AppError, filters::overdue_condition};

/// Whose rows an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User(i32),
    Global,
}

impl Scope {
    fn user_id(self) -> Option<i32> {
        match self {
            Scope::User(id) => Some(id),
            Scope::Global => None,
        }
    }
}

pub async fn status_breakdown(
    pool: &PgPool,
    scope: Scope,
    now: DateTime<Utc>,
) -> Result<StatusBreakdown, AppError> {
    let (total, completed, overdue) = sqlx::query_as::<_, (i64, i64, i64)>(&format!(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE completed), \
                COUNT(*) FILTER (WHERE {}$2) \
         FROM tasks WHERE ($1::int IS NULL OR user_id = $1)",
        overdue_condition("tasks")
    ))
    .bind(scope.user_id())
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(StatusBreakdown::new(total, completed, overdue))
}

pub async fn priority_distribution(
    pool: &PgPool,
    scope: Scope,
) -> Result<Vec<PriorityBucket>, AppError> {
    let rows = sqlx::query_as::<_, (i16, i64)>(
        "SELECT priority, COUNT(*) FROM tasks \
         WHERE ($1::int IS NULL OR user_id = $1) \
         GROUP BY priority",
    )
    .bind(scope.user_id())
    .fetch_all(pool)
    .await?;

    Ok(priority_buckets(&rows))
}

/// Tasks created per bucket over the window selected by `period`.
pub async fn tasks_by_date(
    pool: &PgPool,
    scope: Scope,
    period: Period,
    now: DateTime<Utc>,
) -> Result<TasksByDate, AppError> {
    let today = now.date_naive();
    let start = period.start(today).and_time(NaiveTime::MIN).and_utc();

    let counts = sqlx::query_as::<_, (NaiveDate, i64)>(
        "SELECT date_trunc($2, created_at AT TIME ZONE 'UTC')::date AS bucket, COUNT(*) \
         FROM tasks \
         WHERE ($1::int IS NULL OR user_id = $1) AND created_at >= $3 AND created_at <= $4 \
         GROUP BY bucket",
    )
    .bind(scope.user_id())
    .bind(period.granularity().sql_unit())
    .bind(start)
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(TasksByDate::new(period, time_series(period, today, &counts)))
}

pub async fn todo_summary(pool: &PgPool, scope: Scope) -> Result<CompletionSummary, AppError> {
    let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE completed) FROM todos \
         WHERE ($1::int IS NULL OR user_id = $1)",
    )
    .bind(scope.user_id())
    .fetch_one(pool)
    .await?;

    Ok(CompletionSummary::new(total, completed))
}

/// Completion summary of the tasks nested under one todo.
pub async fn todo_tasks_summary(pool: &PgPool, todo_id: Uuid) -> Result<CompletionSummary, AppError> {
    let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE completed) FROM tasks WHERE todo_id = $1",
    )
    .bind(todo_id)
    .fetch_one(pool)
    .await?;

    Ok(CompletionSummary::new(total, completed))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagStats {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(FromRow)]
struct TagCountRow {
    id: Uuid,
    name: String,
    color: String,
    tasks_count: i64,
    completed_count: i64,
}

/// Per-tag task counters for one user's tags, in one grouped query.
pub async fn tag_stats(pool: &PgPool, user_id: i32) -> Result<Vec<TagStats>, AppError> {
    let rows = sqlx::query_as::<_, TagCountRow>(
        "SELECT tg.id, tg.name, tg.color, \
                COUNT(t.id) AS tasks_count, \
                COUNT(t.id) FILTER (WHERE t.completed) AS completed_count \
         FROM tags tg \
         LEFT JOIN task_tags tt ON tt.tag_id = tg.id \
         LEFT JOIN tasks t ON t.id = tt.task_id \
         WHERE tg.user_id = $1 \
         GROUP BY tg.id, tg.name, tg.color \
         ORDER BY tasks_count DESC, tg.name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TagStats {
            id: row.id,
            name: row.name,
            color: row.color,
            stats: GroupStats::new(row.tasks_count, row.completed_count),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryStats {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub categories: Vec<CategoryStats>,
    /// Tasks without a category.
    pub uncategorized: GroupStats,
}

#[derive(FromRow)]
struct CategoryCountRow {
    id: Uuid,
    name: String,
    tasks_count: i64,
    completed_count: i64,
}

pub async fn category_stats(pool: &PgPool, user_id: i32) -> Result<CategoryBreakdown, AppError> {
    let rows = sqlx::query_as::<_, CategoryCountRow>(
        "SELECT c.id, c.name, \
                COUNT(t.id) AS tasks_count, \
                COUNT(t.id) FILTER (WHERE t.completed) AS completed_count \
         FROM categories c \
         LEFT JOIN tasks t ON t.category_id = c.id \
         WHERE c.user_id = $1 \
         GROUP BY c.id, c.name \
         ORDER BY tasks_count DESC, c.name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let (uncategorized, uncategorized_done) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE completed) FROM tasks \
         WHERE user_id = $1 AND category_id IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(CategoryBreakdown {
        categories: rows
            .into_iter()
            .map(|row| CategoryStats {
                id: row.id,
                name: row.name,
                stats: GroupStats::new(row.tasks_count, row.completed_count),
            })
            .collect(),
        uncategorized: GroupStats::new(uncategorized, uncategorized_done),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveUser {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub task_count: i64,
    pub completed_count: i64,
    pub completion_rate: i64,
}

#[derive(FromRow)]
struct ActiveUserRow {
    user_id: i32,
    username: String,
    email: String,
    task_count: i64,
    completed_count: i64,
}

/// Top `limit` live users by number of tasks; ties go to the older account.
pub async fn most_active_users(pool: &PgPool, limit: i64) -> Result<Vec<ActiveUser>, AppError> {
    let rows = sqlx::query_as::<_, ActiveUserRow>(
        "SELECT u.id AS user_id, u.username, u.email, \
                COUNT(t.id) AS task_count, \
                COUNT(t.id) FILTER (WHERE t.completed) AS completed_count \
         FROM users u \
         LEFT JOIN tasks t ON t.user_id = u.id \
         WHERE u.deleted_at IS NULL \
         GROUP BY u.id, u.username, u.email \
         ORDER BY task_count DESC, u.id ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ActiveUser {
            completion_rate: super::completion_rate(row.completed_count, row.task_count),
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            task_count: row.task_count,
            completed_count: row.completed_count,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserCounts {
    pub active: i64,
    pub admins: i64,
    pub deleted: i64,
}

pub async fn user_counts(pool: &PgPool) -> Result<UserCounts, AppError> {
    let (active, admins, deleted) = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT COUNT(*) FILTER (WHERE deleted_at IS NULL), \
                COUNT(*) FILTER (WHERE is_admin AND deleted_at IS NULL), \
                COUNT(*) FILTER (WHERE deleted_at IS NOT NULL) \
         FROM users",
    )
    .fetch_one(pool)
    .await?;

    Ok(UserCounts {
        active,
        admins,
        deleted,
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContentCounts {
    pub categories: i64,
    pub tags: i64,
    pub todos: i64,
}

pub async fn content_counts(pool: &PgPool) -> Result<ContentCounts, AppError> {
    let (categories, tags, todos) = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT (SELECT COUNT(*) FROM categories), \
                (SELECT COUNT(*) FROM tags), \
                (SELECT COUNT(*) FROM todos)",
    )
    .fetch_one(pool)
    .await?;

    Ok(ContentCounts {
        categories,
        tags,
        todos,
    })
}
