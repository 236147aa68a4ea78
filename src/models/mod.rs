pub mod category;
pub mod tag;
pub mod task;
pub mod todo;
pub mod user;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

pub use category::{Category, CategoryInput, CategoryQuery, CategoryType, CategoryUpdate};
pub use tag::{Tag, TagIdsInput, TagInput, TagQuery, TagSummary, TagUpdate};
pub use task::{
    StatusFilter, Task, TaskDetail, TaskInput, TaskPriority, TaskQuery, TaskUpdate,
};
pub use todo::{Todo, TodoDetail, TodoInput, TodoQuery, TodoUpdate};
pub use user::{User, UserInput, UserUpdate};

/// Lets a partial update tell "field absent" (`None`) from "set to null" (`Some(None)`).
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `completed_at` after a write that leaves the row with `completed`.
///
/// Set on a false→true transition, kept on true→true, cleared whenever the row is
/// not completed.
pub fn completed_at_after(
    was_completed: bool,
    previous: Option<DateTime<Utc>>,
    completed: bool,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (was_completed, completed) {
        (_, false) => None,
        (true, true) => previous.or(Some(now)),
        (false, true) => Some(now),
    }
}

/// Progress is a percentage; out-of-range input is clamped rather than rejected.
pub fn clamp_progress(raw: i64) -> i16 {
    raw.clamp(0, 100) as i16
}
