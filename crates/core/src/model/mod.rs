pub mod curriculum;
mod ids;
mod progress;
mod sync_status;
mod task;

pub use curriculum::{Curriculum, CurriculumError, DayPlan, TaskPlan, WeekPlan};
pub use ids::{ParseIdError, RecordId, TaskId, UserId};
pub use progress::{PendingQueue, PendingUpdate, ProgressRecord, remove_by_task, upsert_by_task};
pub use sync_status::{SyncBadge, SyncStatus};
pub use task::{Category, Task, UnknownCategory};
