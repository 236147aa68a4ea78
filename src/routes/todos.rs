use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    filters::push_completion_filters,
    models::{
        task::TASK_COLUMNS, todo::TODO_COLUMNS, Task, TaskQuery, Todo, TodoDetail, TodoInput,
        TodoQuery, TodoUpdate,
    },
    policy::{authorize, scoped_owner, Action},
    response::{self, Page, PageQuery},
    routes::tasks::push_task_filters,
    stats::queries::todo_tasks_summary,
};
use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

async fn fetch_todo(pool: &PgPool, id: Uuid) -> Result<Todo, AppError> {
    sqlx::query_as::<_, Todo>(&format!("SELECT {} FROM todos WHERE id = $1", TODO_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Todo not found".into()))
}

async fn save_todo(pool: &PgPool, todo: &Todo) -> Result<Todo, AppError> {
    let saved = sqlx::query_as::<_, Todo>(&format!(
        "UPDATE todos SET title = $2, description = $3, priority = $4, due_date = $5, \
         completed = $6, completed_at = $7, progress = $8, updated_at = $9 \
         WHERE id = $1 RETURNING {}",
        TODO_COLUMNS
    ))
    .bind(todo.id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.priority)
    .bind(todo.due_date)
    .bind(todo.completed)
    .bind(todo.completed_at)
    .bind(todo.progress)
    .bind(todo.updated_at)
    .fetch_one(pool)
    .await?;
    Ok(saved)
}

fn push_todo_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &TodoQuery, now: DateTime<Utc>) {
    push_completion_filters(
        qb,
        "todos",
        query.search.as_deref(),
        query.status,
        query.priority,
        now,
    );
}

/// Lists the authenticated user's todos, newest first.
///
/// Filters: `search`, `status`, `priority`, and `user_id` for admins.
#[get("")]
pub async fn get_todos(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<TodoQuery>,
    page: web::Query<PageQuery>,
) -> Result<impl Responder, AppError> {
    let owner = scoped_owner(&user, query.user_id)?;
    let now = Utc::now();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM todos WHERE user_id = ");
    count.push_bind(owner);
    push_todo_filters(&mut count, &query, now);
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(&**pool).await?;

    let mut select =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM todos WHERE user_id = ", TODO_COLUMNS));
    select.push_bind(owner);
    push_todo_filters(&mut select, &query, now);
    select
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let todos = select.build_query_as::<Todo>().fetch_all(&**pool).await?;

    Ok(response::ok(Page::new(todos, total, &page)))
}

#[post("")]
pub async fn create_todo(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    todo_data: web::Json<TodoInput>,
) -> Result<impl Responder, AppError> {
    todo_data.validate()?;
    let todo = Todo::new(todo_data.into_inner(), user.id);

    let created = sqlx::query_as::<_, Todo>(&format!(
        "INSERT INTO todos (id, user_id, title, description, priority, due_date, completed, \
         completed_at, progress, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
        TODO_COLUMNS
    ))
    .bind(todo.id)
    .bind(todo.user_id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.priority)
    .bind(todo.due_date)
    .bind(todo.completed)
    .bind(todo.completed_at)
    .bind(todo.progress)
    .bind(todo.created_at)
    .bind(todo.updated_at)
    .fetch_one(&**pool)
    .await?;

    log::info!("User {} created todo {}", user.id, created.id);
    Ok(response::created("Todo created", created))
}

/// A todo with the completion summary of the tasks nested under it.
#[get("/{id}")]
pub async fn get_todo(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let todo = fetch_todo(&pool, todo_id.into_inner()).await?;
    authorize(&user, &todo, Action::View)?;

    let tasks = todo_tasks_summary(&pool, todo.id).await?;
    Ok(response::ok(TodoDetail { todo, tasks }))
}

#[put("/{id}")]
pub async fn update_todo(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
    todo_data: web::Json<TodoUpdate>,
) -> Result<impl Responder, AppError> {
    todo_data.validate()?;
    let mut todo = fetch_todo(&pool, todo_id.into_inner()).await?;
    authorize(&user, &todo, Action::Update)?;

    todo.apply(todo_data.into_inner(), Utc::now());
    let saved = save_todo(&pool, &todo).await?;
    Ok(response::ok_with_message("Todo updated", saved))
}

/// Deletes a todo together with its nested tasks.
#[delete("/{id}")]
pub async fn delete_todo(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let todo = fetch_todo(&pool, todo_id.into_inner()).await?;
    authorize(&user, &todo, Action::Delete)?;

    let mut tx = pool.begin().await?;
    // Nested tasks go with the todo, so release their tag links first.
    sqlx::query(
        "UPDATE tags SET usage_count = GREATEST(tags.usage_count - links.n, 0) \
         FROM (SELECT tt.tag_id, COUNT(*) AS n FROM task_tags tt \
               JOIN tasks t ON t.id = tt.task_id \
               WHERE t.todo_id = $1 GROUP BY tt.tag_id) AS links \
         WHERE tags.id = links.tag_id",
    )
    .bind(todo.id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM todos WHERE id = $1")
        .bind(todo.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log::info!("User {} deleted todo {}", user.id, todo.id);
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/{id}/toggle")]
pub async fn toggle_todo(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let mut todo = fetch_todo(&pool, todo_id.into_inner()).await?;
    authorize(&user, &todo, Action::Update)?;

    todo.toggle(Utc::now());
    let saved = save_todo(&pool, &todo).await?;

    let message = if saved.completed {
        "Todo marked as completed"
    } else {
        "Todo marked as pending"
    };
    Ok(response::ok_with_message(message, saved))
}

/// Tasks nested under a todo. Accepts the task list filters (except `todo_id`
/// and `user_id`, which come from the todo) and pagination.
#[get("/{id}/tasks")]
pub async fn get_todo_tasks(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
    query: web::Query<TaskQuery>,
    page: web::Query<PageQuery>,
) -> Result<impl Responder, AppError> {
    let todo = fetch_todo(&pool, todo_id.into_inner()).await?;
    authorize(&user, &todo, Action::View)?;

    let mut query = query.into_inner();
    query.todo_id = Some(todo.id);
    query.user_id = None;
    let now = Utc::now();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks WHERE user_id = ");
    count.push_bind(todo.user_id);
    push_task_filters(&mut count, &query, now)?;
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(&**pool).await?;

    let mut select =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM tasks WHERE user_id = ", TASK_COLUMNS));
    select.push_bind(todo.user_id);
    push_task_filters(&mut select, &query, now)?;
    select
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let tasks = select.build_query_as::<Task>().fetch_all(&**pool).await?;

    Ok(response::ok(Page::new(tasks, total, &page)))
}
