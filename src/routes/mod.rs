pub mod admin;
pub mod auth;
pub mod categories;
pub mod dashboard;
pub mod health;
pub mod stats;
pub mod tags;
pub mod tasks;
pub mod todos;

use actix_web::web;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// Registers every `/api` route. Wrap the enclosing scope in `AuthMiddleware`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::login)
            .service(auth::register)
            .service(auth::me)
            .service(auth::change_password),
    )
    .service(
        web::scope("/tasks")
            .service(tasks::get_tasks)
            .service(tasks::create_task)
            .service(tasks::get_task)
            .service(tasks::update_task)
            .service(tasks::delete_task)
            .service(tasks::toggle_task)
            .service(tasks::attach_tags)
            .service(tasks::detach_tags),
    )
    .service(
        web::scope("/todos")
            .service(todos::get_todos)
            .service(todos::create_todo)
            .service(todos::get_todo)
            .service(todos::update_todo)
            .service(todos::delete_todo)
            .service(todos::toggle_todo)
            .service(todos::get_todo_tasks),
    )
    .service(
        web::scope("/categories")
            .service(categories::get_categories)
            .service(categories::create_category)
            .service(categories::get_category)
            .service(categories::update_category)
            .service(categories::delete_category),
    )
    .service(
        web::scope("/tags")
            .service(tags::get_tags)
            .service(tags::create_tag)
            .service(tags::get_tag)
            .service(tags::update_tag)
            .service(tags::delete_tag),
    )
    .service(dashboard::dashboard)
    .service(
        web::scope("/stats")
            .service(stats::overview)
            .service(stats::tasks_by_date)
            .service(stats::priority)
            .service(stats::tags)
            .service(stats::categories),
    )
    .service(
        web::scope("/admin")
            .service(admin::dashboard)
            .service(admin::most_active)
            .service(admin::list_users)
            .service(admin::create_user)
            .service(admin::get_user)
            .service(admin::update_user)
            .service(admin::delete_user),
    );
}

/// Rows a task may hang under.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Parent {
    Category,
    Todo,
}

impl Parent {
    fn lookup_sql(self) -> &'static str {
        match self {
            Parent::Category => "SELECT user_id FROM categories WHERE id = $1",
            Parent::Todo => "SELECT user_id FROM todos WHERE id = $1",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Parent::Category => "Category",
            Parent::Todo => "Todo",
        }
    }
}

/// Fails unless `id` exists and belongs to `owner`, the owner of the child row.
pub(crate) async fn ensure_parent_owned(
    pool: &PgPool,
    parent: Parent,
    id: Uuid,
    owner: i32,
) -> Result<(), AppError> {
    let row = sqlx::query_as::<_, (i32,)>(parent.lookup_sql())
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        None => Err(AppError::NotFound(format!("{} not found", parent.label()))),
        Some((parent_owner,)) if parent_owner != owner => Err(AppError::Forbidden(format!(
            "{} belongs to another user",
            parent.label()
        ))),
        Some(_) => Ok(()),
    }
}
