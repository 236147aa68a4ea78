use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    filters::push_completion_filters,
    models::{
        task::TASK_COLUMNS, TagIdsInput, TagSummary, Task, TaskDetail, TaskInput, TaskQuery,
        TaskUpdate,
    },
    policy::{authorize, scoped_owner, Action},
    response::{self, Page, PageQuery},
    routes::{ensure_parent_owned, Parent},
};
use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

/// Loads a task by id, `404` when it does not exist.
async fn fetch_task(pool: &PgPool, id: Uuid) -> Result<Task, AppError> {
    sqlx::query_as::<_, Task>(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

async fn tags_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<TagSummary>, AppError> {
    let tags = sqlx::query_as::<_, TagSummary>(
        "SELECT tg.id, tg.name, tg.color FROM tags tg \
         JOIN task_tags tt ON tt.tag_id = tg.id \
         WHERE tt.task_id = $1 ORDER BY tg.name",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;
    Ok(tags)
}

async fn task_detail(pool: &PgPool, task: Task) -> Result<TaskDetail, AppError> {
    let tags = tags_for_task(pool, task.id).await?;
    let overdue = task.is_overdue(Utc::now());
    Ok(TaskDetail { task, tags, overdue })
}

async fn check_parents(pool: &PgPool, task: &Task) -> Result<(), AppError> {
    if let Some(category_id) = task.category_id {
        ensure_parent_owned(pool, Parent::Category, category_id, task.user_id).await?;
    }
    if let Some(todo_id) = task.todo_id {
        ensure_parent_owned(pool, Parent::Todo, todo_id, task.user_id).await?;
    }
    Ok(())
}

/// Writes every mutable column of `task` back and returns the stored row.
async fn save_task(conn: &mut PgConnection, task: &Task) -> Result<Task, AppError> {
    let saved = sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks SET category_id = $2, todo_id = $3, title = $4, description = $5, \
         priority = $6, due_date = $7, completed = $8, completed_at = $9, progress = $10, \
         updated_at = $11 WHERE id = $1 RETURNING {}",
        TASK_COLUMNS
    ))
    .bind(task.id)
    .bind(task.category_id)
    .bind(task.todo_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.priority)
    .bind(task.due_date)
    .bind(task.completed)
    .bind(task.completed_at)
    .bind(task.progress)
    .bind(task.updated_at)
    .fetch_one(conn)
    .await?;
    Ok(saved)
}

/// Links `tag_ids` to `task`, bumping `usage_count` for the links actually created.
///
/// Every tag must exist (`404`) and belong to the task's owner (`403`).
async fn link_tags(conn: &mut PgConnection, task: &Task, tag_ids: &[Uuid]) -> Result<u64, AppError> {
    let owners = sqlx::query_as::<_, (Uuid, i32)>("SELECT id, user_id FROM tags WHERE id = ANY($1)")
        .bind(tag_ids)
        .fetch_all(&mut *conn)
        .await?;

    if owners.len() != tag_ids.len() {
        return Err(AppError::NotFound("One or more tags not found".into()));
    }
    if owners.iter().any(|(_, owner)| *owner != task.user_id) {
        return Err(AppError::Forbidden(
            "Tags must belong to the owner of the task".into(),
        ));
    }

    let linked = sqlx::query_as::<_, (Uuid,)>(
        "INSERT INTO task_tags (task_id, tag_id) SELECT $1, UNNEST($2::uuid[]) \
         ON CONFLICT DO NOTHING RETURNING tag_id",
    )
    .bind(task.id)
    .bind(tag_ids)
    .fetch_all(&mut *conn)
    .await?;

    let linked: Vec<Uuid> = linked.into_iter().map(|(id,)| id).collect();
    if !linked.is_empty() {
        sqlx::query("UPDATE tags SET usage_count = usage_count + 1 WHERE id = ANY($1)")
            .bind(&linked[..])
            .execute(&mut *conn)
            .await?;
    }
    Ok(linked.len() as u64)
}

/// Removes the links between `task` and `tag_ids`, decrementing `usage_count`.
async fn unlink_tags(conn: &mut PgConnection, task_id: Uuid, tag_ids: &[Uuid]) -> Result<u64, AppError> {
    let unlinked = sqlx::query_as::<_, (Uuid,)>(
        "DELETE FROM task_tags WHERE task_id = $1 AND tag_id = ANY($2) RETURNING tag_id",
    )
    .bind(task_id)
    .bind(tag_ids)
    .fetch_all(&mut *conn)
    .await?;

    let unlinked: Vec<Uuid> = unlinked.into_iter().map(|(id,)| id).collect();
    if !unlinked.is_empty() {
        sqlx::query("UPDATE tags SET usage_count = GREATEST(usage_count - 1, 0) WHERE id = ANY($1)")
            .bind(&unlinked[..])
            .execute(&mut *conn)
            .await?;
    }
    Ok(unlinked.len() as u64)
}

/// Appends the `WHERE` conditions of a task list query (the owner condition comes first).
///
/// Fails with `422` when `due_to` is the last representable date.
pub(crate) fn push_task_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    query: &TaskQuery,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    push_completion_filters(
        qb,
        "tasks",
        query.search.as_deref(),
        query.status,
        query.priority,
        now,
    );
    if let Some(category_id) = query.category_id {
        qb.push(" AND tasks.category_id = ").push_bind(category_id);
    }
    if let Some(todo_id) = query.todo_id {
        qb.push(" AND tasks.todo_id = ").push_bind(todo_id);
    }
    if let Some(tag_id) = query.tag_id {
        qb.push(" AND EXISTS (SELECT 1 FROM task_tags tt WHERE tt.task_id = tasks.id AND tt.tag_id = ")
            .push_bind(tag_id)
            .push(")");
    }
    if let Some(from) = query.due_from {
        qb.push(" AND tasks.due_date >= ")
            .push_bind(from.and_time(NaiveTime::MIN).and_utc());
    }
    if let Some(to) = query.due_to {
        // Inclusive end date: everything before the next midnight.
        let next = to.succ_opt().ok_or_else(|| {
            AppError::invalid_field("due_to", "out_of_range", "Due date is out of range")
        })?;
        qb.push(" AND tasks.due_date < ")
            .push_bind(next.and_time(NaiveTime::MIN).and_utc());
    }
    Ok(())
}

/// Retrieves a page of tasks owned by the authenticated user.
///
/// ## Query Parameters:
/// - `search`, `status` (`completed`, `pending`, `overdue`), `priority`, `category_id`,
///   `todo_id`, `tag_id`, `due_from`, `due_to`
/// - `user_id` (admins only): list another user's tasks
/// - `page`, `per_page`
///
/// ## Responses:
/// - `200 OK`: a page of `Task` objects, newest first.
/// - `401 Unauthorized`, `403 Forbidden` (non-admin asking for another user's tasks).
#[get("")]
pub async fn get_tasks(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<TaskQuery>,
    page: web::Query<PageQuery>,
) -> Result<impl Responder, AppError> {
    let owner = scoped_owner(&user, query.user_id)?;
    let now = Utc::now();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks WHERE user_id = ");
    count.push_bind(owner);
    push_task_filters(&mut count, &query, now)?;
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(&**pool).await?;

    let mut select =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM tasks WHERE user_id = ", TASK_COLUMNS));
    select.push_bind(owner);
    push_task_filters(&mut select, &query, now)?;
    select
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let tasks = select.build_query_as::<Task>().fetch_all(&**pool).await?;

    Ok(response::ok(Page::new(tasks, total, &page)))
}

/// Creates a task owned by the authenticated user.
///
/// `category_id`, `todo_id` and `tag_ids` must reference rows owned by the same user.
/// `priority` and `progress` are clamped rather than rejected.
///
/// ## Responses:
/// - `201 Created`: the new task with its tags.
/// - `403 Forbidden`: a referenced category, todo or tag belongs to someone else.
/// - `404 Not Found`: a referenced category, todo or tag does not exist.
/// - `422 Unprocessable Entity`: validation failed.
#[post("")]
pub async fn create_task(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_data: web::Json<TaskInput>,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let mut input = task_data.into_inner();
    let tag_ids = TagIdsInput {
        tag_ids: input.tag_ids.take().unwrap_or_default(),
    }
    .unique_ids();
    let task = Task::new(input, user.id);
    check_parents(&pool, &task).await?;

    let mut tx = pool.begin().await?;
    let created = sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (id, user_id, category_id, todo_id, title, description, priority, \
         due_date, completed, completed_at, progress, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING {}",
        TASK_COLUMNS
    ))
    .bind(task.id)
    .bind(task.user_id)
    .bind(task.category_id)
    .bind(task.todo_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.priority)
    .bind(task.due_date)
    .bind(task.completed)
    .bind(task.completed_at)
    .bind(task.progress)
    .bind(task.created_at)
    .bind(task.updated_at)
    .fetch_one(&mut *tx)
    .await?;

    if !tag_ids.is_empty() {
        link_tags(&mut *tx, &created, &tag_ids).await?;
    }
    tx.commit().await?;

    log::info!("User {} created task {}", user.id, created.id);
    let detail = task_detail(&pool, created).await?;
    Ok(response::created("Task created", detail))
}

/// Retrieves a task with its tags.
///
/// ## Responses:
/// - `200 OK`, `403 Forbidden` (owned by someone else), `404 Not Found`.
#[get("/{id}")]
pub async fn get_task(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let task = fetch_task(&pool, task_id.into_inner()).await?;
    authorize(&user, &task, Action::View)?;

    Ok(response::ok(task_detail(&pool, task).await?))
}

/// Partially updates a task. Absent fields are untouched; `null` clears nullable ones.
///
/// ## Responses:
/// - `200 OK`, `403 Forbidden`, `404 Not Found`, `422 Unprocessable Entity`.
#[put("/{id}")]
pub async fn update_task(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    task_data: web::Json<TaskUpdate>,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;
    let mut task = fetch_task(&pool, task_id.into_inner()).await?;
    authorize(&user, &task, Action::Update)?;

    task.apply(task_data.into_inner(), Utc::now());
    check_parents(&pool, &task).await?;

    let mut conn = pool.acquire().await?;
    let saved = save_task(&mut conn, &task).await?;
    drop(conn);

    Ok(response::ok_with_message(
        "Task updated",
        task_detail(&pool, saved).await?,
    ))
}

/// Deletes a task and releases its tag usage counts.
///
/// ## Responses:
/// - `204 No Content`, `403 Forbidden`, `404 Not Found`.
#[delete("/{id}")]
pub async fn delete_task(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let task = fetch_task(&pool, task_id.into_inner()).await?;
    authorize(&user, &task, Action::Delete)?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE tags SET usage_count = GREATEST(usage_count - 1, 0) \
         WHERE id IN (SELECT tag_id FROM task_tags WHERE task_id = $1)",
    )
    .bind(task.id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log::info!("User {} deleted task {}", user.id, task.id);
    Ok(HttpResponse::NoContent().finish())
}

/// Flips the completion flag, setting or clearing `completed_at`.
#[patch("/{id}/toggle")]
pub async fn toggle_task(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let mut task = fetch_task(&pool, task_id.into_inner()).await?;
    authorize(&user, &task, Action::Update)?;

    task.toggle(Utc::now());
    let mut conn = pool.acquire().await?;
    let saved = save_task(&mut conn, &task).await?;

    let message = if saved.completed {
        "Task marked as completed"
    } else {
        "Task marked as pending"
    };
    Ok(response::ok_with_message(message, saved))
}

/// Attaches a batch of tags; already attached tags are skipped.
#[post("/{id}/tags")]
pub async fn attach_tags(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    body: web::Json<TagIdsInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let task = fetch_task(&pool, task_id.into_inner()).await?;
    authorize(&user, &task, Action::Update)?;

    let mut tx = pool.begin().await?;
    let attached = link_tags(&mut *tx, &task, &body.unique_ids()).await?;
    tx.commit().await?;

    log::debug!("Attached {} tags to task {}", attached, task.id);
    Ok(response::ok_with_message(
        &format!("{} tag(s) attached", attached),
        task_detail(&pool, task).await?,
    ))
}

/// Detaches a batch of tags; tags that were not attached are ignored.
#[delete("/{id}/tags")]
pub async fn detach_tags(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    body: web::Json<TagIdsInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let task = fetch_task(&pool, task_id.into_inner()).await?;
    authorize(&user, &task, Action::Update)?;

    let mut tx = pool.begin().await?;
    let detached = unlink_tags(&mut *tx, task.id, &body.unique_ids()).await?;
    tx.commit().await?;

    Ok(response::ok_with_message(
        &format!("{} tag(s) detached", detached),
        task_detail(&pool, task).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatusFilter;
    use actix_web::ResponseError;
    use chrono::NaiveDate;

    #[test]
    fn test_filters_render_expected_sql() {
        let query = TaskQuery {
            search: Some("  report ".to_string()),
            status: Some(StatusFilter::Overdue),
            priority: Some(9),
            tag_id: Some(Uuid::nil()),
            due_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            due_to: NaiveDate::from_ymd_opt(2024, 1, 31),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks WHERE user_id = ");
        qb.push_bind(1);
        push_task_filters(&mut qb, &query, Utc::now()).unwrap();

        let sql = qb.sql();
        assert!(sql.contains("(tasks.title ILIKE $2 OR tasks.description ILIKE $3)"));
        assert!(sql.contains("NOT tasks.completed AND tasks.due_date IS NOT NULL AND tasks.due_date < $4"));
        assert!(sql.contains("tasks.priority = $5"));
        assert!(sql.contains("tt.tag_id = $6"));
        assert!(sql.contains("tasks.due_date >= $7"));
        assert!(sql.contains("tasks.due_date < $8"));
    }

    #[test]
    fn test_blank_search_adds_no_condition() {
        let query = TaskQuery {
            search: Some("   ".to_string()),
            status: Some(StatusFilter::Completed),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM tasks WHERE user_id = ");
        qb.push_bind(1);
        push_task_filters(&mut qb, &query, Utc::now()).unwrap();

        assert_eq!(qb.sql(), "SELECT 1 FROM tasks WHERE user_id = $1 AND tasks.completed");
    }

    #[test]
    fn test_due_to_at_the_end_of_the_calendar_is_rejected() {
        let query = web::Query::<TaskQuery>::from_query("due_to=%2B262142-12-31")
            .unwrap()
            .into_inner();
        assert!(query.due_to.is_some());

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM tasks WHERE user_id = ");
        qb.push_bind(1);
        let err = push_task_filters(&mut qb, &query, Utc::now()).unwrap_err();
        assert_eq!(err.error_response().status(), 422);
    }
}
