//! SQL conditions shared by the task and todo list queries and the statistics.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::{
    models::{StatusFilter, TaskPriority},
    security::{contains_pattern, normalize_search},
};

/// Overdue rows of `table`, up to the comparison operand which the caller appends.
pub fn overdue_condition(table: &str) -> String {
    format!(
        "NOT {t}.completed AND {t}.due_date IS NOT NULL AND {t}.due_date < ",
        t = table
    )
}

/// Search, status and priority conditions common to tasks and todos.
pub fn push_completion_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    search: Option<&str>,
    status: Option<StatusFilter>,
    priority: Option<i64>,
    now: DateTime<Utc>,
) {
    if let Some(search) = normalize_search(search) {
        let pattern = contains_pattern(&search);
        qb.push(format!(" AND ({}.title ILIKE ", table))
            .push_bind(pattern.clone())
            .push(format!(" OR {}.description ILIKE ", table))
            .push_bind(pattern)
            .push(")");
    }
    match status {
        Some(StatusFilter::Completed) => {
            qb.push(format!(" AND {}.completed", table));
        }
        Some(StatusFilter::Pending) => {
            qb.push(format!(" AND NOT {}.completed", table));
        }
        Some(StatusFilter::Overdue) => {
            qb.push(" AND ")
                .push(overdue_condition(table))
                .push_bind(now);
        }
        None => {}
    }
    if let Some(priority) = priority {
        qb.push(format!(" AND {}.priority = ", table))
            .push_bind(TaskPriority::from_level(priority).level());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overdue_condition_is_qualified() {
        assert_eq!(
            overdue_condition("t"),
            "NOT t.completed AND t.due_date IS NOT NULL AND t.due_date < "
        );
    }

    #[test]
    fn test_completion_filters() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM todos WHERE user_id = ");
        qb.push_bind(7);
        push_completion_filters(
            &mut qb,
            "todos",
            Some(" groceries "),
            Some(StatusFilter::Overdue),
            Some(2),
            Utc::now(),
        );
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM todos WHERE user_id = $1 \
             AND (todos.title ILIKE $2 OR todos.description ILIKE $3) \
             AND NOT todos.completed AND todos.due_date IS NOT NULL AND todos.due_date < $4 \
             AND todos.priority = $5"
        );
    }
}
