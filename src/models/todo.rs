use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{clamp_progress, completed_at_after, nullable, StatusFilter, TaskPriority};
use crate::policy::Owned;
use crate::stats::CompletionSummary;

pub const TODO_COLUMNS: &str = "id, user_id, title, description, priority, due_date, completed, \
     completed_at, progress, created_at, updated_at";

/// A todo: a top-level item that may group tasks underneath it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub priority: i16,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TodoInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub progress: Option<i64>,
    pub completed: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TodoUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 1000))]
    pub description: Option<Option<String>>,
    pub priority: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub progress: Option<i64>,
    pub completed: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TodoQuery {
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub priority: Option<i64>,
    pub user_id: Option<i32>,
}

/// A todo with the completion summary of its nested tasks.
#[derive(Debug, Serialize, Deserialize)]
pub struct TodoDetail {
    #[serde(flatten)]
    pub todo: Todo,
    pub tasks: CompletionSummary,
}

impl Owned for Todo {
    const KIND: &'static str = "todo";

    fn owner_id(&self) -> i32 {
        self.user_id
    }
}

impl Todo {
    pub fn new(input: TodoInput, user_id: i32) -> Self {
        let now = Utc::now();
        let completed = input.completed.unwrap_or(false);
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: input.title,
            description: input.description,
            priority: input
                .priority
                .map(TaskPriority::from_level)
                .unwrap_or_default()
                .level(),
            due_date: input.due_date,
            completed,
            completed_at: completed_at_after(false, None, completed, now),
            progress: clamp_progress(input.progress.unwrap_or(0)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: TodoUpdate, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(priority) = update.priority {
            self.priority = TaskPriority::from_level(priority).level();
        }
        if let Some(due_date) = update.due_date {
            self.due_date = due_date;
        }
        if let Some(progress) = update.progress {
            self.progress = clamp_progress(progress);
        }
        if let Some(completed) = update.completed {
            self.completed_at = completed_at_after(self.completed, self.completed_at, completed, now);
            self.completed = completed;
        }
        self.updated_at = now;
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) {
        let completed = !self.completed;
        self.completed_at = completed_at_after(self.completed, self.completed_at, completed, now);
        self.completed = completed;
        self.updated_at = now;
    }
}
