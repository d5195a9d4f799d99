//! Aggregate statistics derived from progress records.
//!
//! Everything here is a pure function of the record set and the curriculum.
//! Records whose task is not in the curriculum are ignored.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::model::{Category, Curriculum, ProgressRecord, TaskId};

/// `round(completed / total * 100)`, clamped to `0..=100`; 0 when `total` is 0.
#[must_use]
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    // Half-up rounding in integer space.
    let pct = (completed * 200 + total) / (2 * total);
    u8::try_from(pct).unwrap_or(100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryProgress {
    pub completed: u32,
    pub total: u32,
    pub percentage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekProgress {
    pub completed: u32,
    pub total: u32,
    pub percentage: u8,
}

/// Records that resolve to a curriculum task, one per task id.
fn known_tasks<'a>(
    records: &'a [ProgressRecord],
    curriculum: &'a Curriculum,
) -> impl Iterator<Item = &'a TaskId> + 'a {
    let mut seen = HashSet::new();
    records
        .iter()
        .map(|r| &r.task_id)
        .filter(move |id| curriculum.contains(id) && seen.insert(*id))
}

/// Completed/total per category, for every category.
#[must_use]
pub fn category_breakdown(
    records: &[ProgressRecord],
    curriculum: &Curriculum,
) -> BTreeMap<Category, CategoryProgress> {
    let mut completed: BTreeMap<Category, u32> = BTreeMap::new();
    for task_id in known_tasks(records, curriculum) {
        if let Some(category) = curriculum.category_of(task_id) {
            *completed.entry(category).or_insert(0) += 1;
        }
    }

    Category::ALL
        .into_iter()
        .map(|category| {
            let done = completed.get(&category).copied().unwrap_or(0);
            let total = curriculum.category_total(category);
            (
                category,
                CategoryProgress {
                    completed: done,
                    total,
                    percentage: completion_percentage(done, total),
                },
            )
        })
        .collect()
}

/// Completed/total per curriculum week.
#[must_use]
pub fn week_breakdown(
    records: &[ProgressRecord],
    curriculum: &Curriculum,
) -> BTreeMap<u32, WeekProgress> {
    let mut completed: BTreeMap<u32, u32> = BTreeMap::new();
    for task_id in known_tasks(records, curriculum) {
        if let Some(week) = curriculum.week_of(task_id) {
            *completed.entry(week).or_insert(0) += 1;
        }
    }

    curriculum
        .weeks()
        .map(|week| {
            let done = completed.get(&week).copied().unwrap_or(0);
            let total = curriculum.week_total(week);
            (
                week,
                WeekProgress {
                    completed: done,
                    total,
                    percentage: completion_percentage(done, total),
                },
            )
        })
        .collect()
}

fn completion_days(records: &[ProgressRecord]) -> BTreeSet<NaiveDate> {
    records.iter().map(ProgressRecord::completion_day).collect()
}

/// Consecutive days with a completion, ending today or yesterday.
#[must_use]
pub fn current_streak(records: &[ProgressRecord], today: NaiveDate) -> u32 {
    let days = completion_days(records);
    let Some(&latest) = days.iter().next_back() else {
        return 0;
    };

    let yesterday = today - Duration::days(1);
    if latest != today && latest != yesterday {
        return 0;
    }

    let mut streak = 0_u32;
    let mut expected = latest;
    for &day in days.iter().rev() {
        if day != expected {
            break;
        }
        streak += 1;
        expected = day - Duration::days(1);
    }
    streak
}

/// Longest run of consecutive completion days anywhere in the history.
#[must_use]
pub fn longest_streak(records: &[ProgressRecord]) -> u32 {
    let mut longest = 0_u32;
    let mut run = 0_u32;
    let mut previous: Option<NaiveDate> = None;

    for day in completion_days(records) {
        run = match previous {
            Some(prev) if day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }
    longest
}

/// Read-only projection of a user's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProgress {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub completion_percentage: u8,
    pub points_earned: u32,
    pub total_points: u32,
    pub weeks: BTreeMap<u32, WeekProgress>,
    pub categories: BTreeMap<Category, CategoryProgress>,
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl UserProgress {
    /// Recompute everything from scratch.
    ///
    /// `previous_longest` carries the best streak seen so far, so removing a
    /// record never lowers the longest streak.
    #[must_use]
    pub fn compute(
        records: &[ProgressRecord],
        curriculum: &Curriculum,
        today: NaiveDate,
        previous_longest: u32,
    ) -> Self {
        let mut completed_tasks = 0_u32;
        let mut points_earned = 0_u32;
        for task_id in known_tasks(records, curriculum) {
            completed_tasks += 1;
            if let Some(task) = curriculum.task(task_id) {
                points_earned = points_earned.saturating_add(task.points);
            }
        }

        let known: Vec<ProgressRecord> = records
            .iter()
            .filter(|r| curriculum.contains(&r.task_id))
            .cloned()
            .collect();
        let total_tasks = curriculum.total_tasks();
        let current = current_streak(&known, today);

        Self {
            total_tasks,
            completed_tasks,
            completion_percentage: completion_percentage(completed_tasks, total_tasks),
            points_earned,
            total_points: curriculum.total_points(),
            weeks: week_breakdown(records, curriculum),
            categories: category_breakdown(records, curriculum),
            current_streak: current,
            longest_streak: current
                .max(longest_streak(&known))
                .max(previous_longest),
        }
    }

    /// Progress with nothing completed.
    #[must_use]
    pub fn empty(curriculum: &Curriculum) -> Self {
        Self::compute(&[], curriculum, NaiveDate::MIN, 0)
    }
}
