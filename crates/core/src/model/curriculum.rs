use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::TaskId;
use crate::model::task::{Category, Task};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("task id cannot be empty (week {week}, day {day})")]
    EmptyTaskId { week: u32, day: u32 },

    #[error("task {0} appears more than once")]
    DuplicateTask(String),

    #[error("week {0} appears more than once")]
    DuplicateWeek(u32),

    #[error("task {0} must be worth at least one point")]
    ZeroPoints(String),

    #[error("invalid curriculum document: {0}")]
    Parse(String),
}

//
// ─── AUTHORED SHAPE ────────────────────────────────────────────────────────────
//

/// One week of the study plan as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub week: u32,
    #[serde(default)]
    pub title: String,
    pub days: Vec<DayPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    #[serde(default)]
    pub title: String,
    pub tasks: Vec<TaskPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub category: Category,
    pub points: u32,
}

//
// ─── LOOKUP ────────────────────────────────────────────────────────────────────
//

/// Read-only lookup over the static curriculum.
///
/// Built once from the authored weeks; every category/week question the
/// statistics ask is answered here by task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curriculum {
    tasks: HashMap<TaskId, Task>,
    category_totals: BTreeMap<Category, u32>,
    week_totals: BTreeMap<u32, u32>,
    total_points: u32,
}

impl Curriculum {
    /// Index the authored weeks.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` for blank or duplicate task ids, duplicate
    /// week numbers, or tasks worth zero points.
    pub fn new(weeks: Vec<WeekPlan>) -> Result<Self, CurriculumError> {
        let mut tasks = HashMap::new();
        let mut category_totals: BTreeMap<Category, u32> =
            Category::ALL.into_iter().map(|c| (c, 0)).collect();
        let mut week_totals = BTreeMap::new();
        let mut seen_weeks = BTreeSet::new();
        let mut total_points = 0_u32;

        for week in weeks {
            if !seen_weeks.insert(week.week) {
                return Err(CurriculumError::DuplicateWeek(week.week));
            }
            let week_total = week_totals.entry(week.week).or_insert(0_u32);

            for day in week.days {
                for plan in day.tasks {
                    let raw_id = plan.id.trim();
                    if raw_id.is_empty() {
                        return Err(CurriculumError::EmptyTaskId {
                            week: week.week,
                            day: day.day,
                        });
                    }
                    if plan.points == 0 {
                        return Err(CurriculumError::ZeroPoints(raw_id.to_owned()));
                    }

                    let id = TaskId::new(raw_id);
                    if tasks.contains_key(&id) {
                        return Err(CurriculumError::DuplicateTask(raw_id.to_owned()));
                    }

                    *week_total += 1;
                    *category_totals.entry(plan.category).or_insert(0) += 1;
                    total_points = total_points.saturating_add(plan.points);

                    tasks.insert(
                        id.clone(),
                        Task {
                            id,
                            title: plan.title,
                            category: plan.category,
                            points: plan.points,
                            week: week.week,
                            day: day.day,
                        },
                    );
                }
            }
        }

        Ok(Self {
            tasks,
            category_totals,
            week_totals,
            total_points,
        })
    }

    /// Parse a JSON array of weeks.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::Parse` for malformed JSON, or any
    /// validation error from [`Curriculum::new`].
    pub fn from_json(raw: &str) -> Result<Self, CurriculumError> {
        let weeks: Vec<WeekPlan> =
            serde_json::from_str(raw).map_err(|e| CurriculumError::Parse(e.to_string()))?;
        Self::new(weeks)
    }

    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    #[must_use]
    pub fn category_of(&self, id: &TaskId) -> Option<Category> {
        self.tasks.get(id).map(|t| t.category)
    }

    #[must_use]
    pub fn week_of(&self, id: &TaskId) -> Option<u32> {
        self.tasks.get(id).map(|t| t.week)
    }

    #[must_use]
    pub fn total_tasks(&self) -> u32 {
        u32::try_from(self.tasks.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    /// Number of tasks in the category (0 for categories with no tasks).
    #[must_use]
    pub fn category_total(&self, category: Category) -> u32 {
        self.category_totals.get(&category).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn week_total(&self, week: u32) -> u32 {
        self.week_totals.get(&week).copied().unwrap_or(0)
    }

    /// Week numbers in ascending order.
    pub fn weeks(&self) -> impl Iterator<Item = u32> + '_ {
        self.week_totals.keys().copied()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn task(id: &str, category: Category) -> TaskPlan {
        TaskPlan {
            id: id.to_owned(),
            title: String::new(),
            category,
            points: 10,
        }
    }

    pub(crate) fn week(week: u32, tasks: Vec<TaskPlan>) -> WeekPlan {
        WeekPlan {
            week,
            title: format!("Week {week}"),
            days: vec![DayPlan {
                day: 1,
                title: String::new(),
                tasks,
            }],
        }
    }
}
