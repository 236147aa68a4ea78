use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{clamp_progress, completed_at_after, nullable, TagSummary};
use crate::policy::Owned;

/// Column list shared by every query returning a `Task`.
pub const TASK_COLUMNS: &str = "id, user_id, category_id, todo_id, title, description, priority, \
     due_date, completed, completed_at, progress, created_at, updated_at";

/// Priority levels, stored as a `SMALLINT` between 1 and 4.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Urgent,
    ];

    pub fn level(self) -> i16 {
        self as i16
    }

    /// Maps any integer onto the nearest valid level.
    pub fn from_level(raw: i64) -> Self {
        match raw {
            i64::MIN..=1 => TaskPriority::Low,
            2 => TaskPriority::Medium,
            3 => TaskPriority::High,
            _ => TaskPriority::Urgent,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

/// Status filter for list endpoints.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Completed,
    /// Not completed, regardless of due date.
    Pending,
    /// Not completed and past its due date.
    Overdue,
}

/// Input for creating a task.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    /// Any integer; clamped to a valid priority level.
    pub priority: Option<i64>,

    pub due_date: Option<DateTime<Utc>>,

    pub category_id: Option<Uuid>,

    /// Parent todo, for tasks nested under a todo.
    pub todo_id: Option<Uuid>,

    /// Any integer; clamped to 0..=100.
    pub progress: Option<i64>,

    pub completed: Option<bool>,

    #[validate(length(max = 50))]
    pub tag_ids: Option<Vec<Uuid>>,
}

/// Partial update; absent fields are left untouched, explicit `null` clears
/// nullable columns.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TaskUpdate {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 1000))]
    pub description: Option<Option<String>>,

    pub priority: Option<i64>,

    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<DateTime<Utc>>>,

    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "nullable")]
    pub todo_id: Option<Option<Uuid>>,

    pub progress: Option<i64>,

    pub completed: Option<bool>,
}

/// A task as stored in the database and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    /// Owning user.
    pub user_id: i32,
    pub category_id: Option<Uuid>,
    pub todo_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    /// 1 (low) to 4 (urgent).
    pub priority: i16,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Set exactly while `completed` is true.
    pub completed_at: Option<DateTime<Utc>>,
    /// 0 to 100.
    pub progress: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single task with its tags, returned by the show endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub tags: Vec<TagSummary>,
    pub overdue: bool,
}

/// Query parameters for listing tasks.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskQuery {
    /// Case-insensitive match against title and description.
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub priority: Option<i64>,
    pub category_id: Option<Uuid>,
    pub todo_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    /// Inclusive lower bound on the due date.
    pub due_from: Option<NaiveDate>,
    /// Inclusive upper bound on the due date.
    pub due_to: Option<NaiveDate>,
    /// Admins may list another user's tasks.
    pub user_id: Option<i32>,
}

impl Owned for Task {
    const KIND: &'static str = "task";

    fn owner_id(&self) -> i32 {
        self.user_id
    }
}

impl Task {
    /// Builds a new task owned by `user_id` from validated input.
    pub fn new(input: TaskInput, user_id: i32) -> Self {
        let now = Utc::now();
        let completed = input.completed.unwrap_or(false);
        Self {
            id: Uuid::new_v4(),
            user_id,
            category_id: input.category_id,
            todo_id: input.todo_id,
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

    /// Merges a partial update, keeping the completion and clamping invariants.
    pub fn apply(&mut self, update: TaskUpdate, now: DateTime<Utc>) {
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
        if let Some(category_id) = update.category_id {
            self.category_id = category_id;
        }
        if let Some(todo_id) = update.todo_id {
            self.todo_id = todo_id;
        }
        if let Some(progress) = update.progress {
            self.progress = clamp_progress(progress);
        }
        if let Some(completed) = update.completed {
            self.set_completed(completed, now);
        }
        self.updated_at = now;
    }

    /// Flips `completed`; two toggles restore the original state.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.set_completed(!self.completed, now);
        self.updated_at = now;
    }

    fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed_at = completed_at_after(self.completed, self.completed_at, completed, now);
        self.completed = completed;
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn input(title: &str) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            description: Some("Test Description".to_string()),
            priority: Some(3),
            due_date: Some(Utc::now()),
            category_id: None,
            todo_id: None,
            progress: None,
            completed: None,
            tag_ids: None,
        }
    }

    #[test]
    fn test_task_creation() {
        let task = Task::new(input("Test Task"), 1);
        assert_eq!(task.title, "Test Task");
        assert_eq!(task.user_id, 1);
        assert_eq!(task.priority, TaskPriority::High.level());
        assert!(!task.completed);
        assert!(task.completed_at.is_none());
        assert_eq!(task.progress, 0);
    }

    #[test]
    fn test_creation_clamps_priority_and_progress() {
        let mut raw = input("Clamped");
        raw.priority = Some(99);
        raw.progress = Some(-20);
        let task = Task::new(raw, 1);
        assert_eq!(task.priority, 4);
        assert_eq!(task.progress, 0);

        let mut raw = input("Clamped low");
        raw.priority = Some(-3);
        raw.progress = Some(140);
        let task = Task::new(raw, 1);
        assert_eq!(task.priority, 1);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn test_created_completed_task_has_timestamp() {
        let mut raw = input("Done already");
        raw.completed = Some(true);
        let task = Task::new(raw, 1);
        assert!(task.completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_task_validation() {
        assert!(input("Valid Task").validate().is_ok());
        assert!(input("").validate().is_err());
        assert!(input(&"a".repeat(201)).validate().is_err());

        let mut long_description = input("Valid title");
        long_description.description = Some("b".repeat(1001));
        assert!(long_description.validate().is_err());
    }

    #[test]
    fn test_double_toggle_restores_state() {
        let mut task = Task::new(input("Toggle me"), 1);
        let original_completed = task.completed;
        let original_completed_at = task.completed_at;

        let now = Utc::now();
        task.toggle(now);
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(now));

        task.toggle(now + Duration::seconds(5));
        assert_eq!(task.completed, original_completed);
        assert_eq!(task.completed_at, original_completed_at);
    }

    #[test]
    fn test_partial_update() {
        let mut task = Task::new(input("Original"), 1);
        let now = Utc::now();
        let update: TaskUpdate = serde_json::from_value(serde_json::json!({
            "description": null,
            "progress": 500,
            "completed": true
        }))
        .unwrap();
        task.apply(update, now);

        assert_eq!(task.title, "Original");
        assert_eq!(task.description, None);
        assert_eq!(task.progress, 100);
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(now));

        // Re-completing keeps the first completion time.
        let later = now + Duration::hours(1);
        task.apply(
            TaskUpdate {
                completed: Some(true),
                ..Default::default()
            },
            later,
        );
        assert_eq!(task.completed_at, Some(now));
        assert_eq!(task.updated_at, later);
    }

    #[test]
    fn test_absent_nullable_field_is_untouched() {
        let update: TaskUpdate =
            serde_json::from_value(serde_json::json!({ "title": "New" })).unwrap();
        assert!(update.description.is_none());
        assert!(update.due_date.is_none());

        let mut task = Task::new(input("Old"), 1);
        task.apply(update, Utc::now());
        assert_eq!(task.description.as_deref(), Some("Test Description"));
    }

    #[test]
    fn test_overdue() {
        let now = Utc::now();
        let mut task = Task::new(input("Late"), 1);
        task.due_date = Some(now - Duration::days(1));
        assert!(task.is_overdue(now));

        task.toggle(now);
        assert!(!task.is_overdue(now));

        task.toggle(now);
        task.due_date = None;
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn test_priority_levels() {
        assert_eq!(TaskPriority::from_level(2), TaskPriority::Medium);
        assert_eq!(TaskPriority::default().level(), 2);
        assert_eq!(TaskPriority::Urgent.label(), "urgent");
    }
}
