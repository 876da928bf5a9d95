//! Derived numbers for the stats and dashboard views.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::model::{CalendarItem, Todo, TodoStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TodoStats {
    pub pending: usize,
    pub completed: usize,
    pub total: usize,
    /// Percent, 0 when there are no todos.
    pub completion_rate: f64,
}

pub fn todo_stats(todos: &[Todo]) -> TodoStats {
    let pending = count_status(todos, TodoStatus::Pending);
    let completed = count_status(todos, TodoStatus::Completed);
    let total = todos.len();
    let completion_rate = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    };
    TodoStats {
        pending,
        completed,
        total,
        completion_rate,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusBreakdown {
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
}

pub fn status_breakdown(todos: &[Todo]) -> StatusBreakdown {
    StatusBreakdown {
        completed: count_status(todos, TodoStatus::Completed),
        in_progress: count_status(todos, TodoStatus::InProgress),
        not_started: count_status(todos, TodoStatus::NotStarted),
    }
}

fn count_status(todos: &[Todo], status: TodoStatus) -> usize {
    todos.iter().filter(|todo| todo.status == status).count()
}

/// Counts per non-empty category across todos and events, ordered by name.
pub fn category_distribution(todos: &[Todo], items: &[CalendarItem]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let categories = todos
        .iter()
        .map(|todo| todo.category.as_str())
        .chain(items.iter().map(|item| item.category.as_str()));
    for category in categories.filter(|c| !c.trim().is_empty()) {
        *counts.entry(category).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayActivity {
    pub date: NaiveDate,
    pub todos: usize,
    pub events: usize,
}

impl DayActivity {
    pub fn label(&self) -> String {
        self.date.format("%a").to_string()
    }
}

/// Seven buckets from the Sunday starting the current local week. Todos
/// count on their due day, events on their start day.
pub fn weekly_activity(
    todos: &[Todo],
    items: &[CalendarItem],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<DayActivity> {
    let week_start = now
        .with_timezone(tz)
        .date_naive()
        .week(Weekday::Sun)
        .first_day();
    let mut days: Vec<DayActivity> = (0..7)
        .filter_map(|offset| week_start.checked_add_days(Days::new(offset)))
        .map(|date| DayActivity {
            date,
            todos: 0,
            events: 0,
        })
        .collect();

    let bucket = |instant: DateTime<Utc>| -> Option<usize> {
        let offset = (instant.with_timezone(tz).date_naive() - week_start).num_days();
        usize::try_from(offset).ok().filter(|index| *index < 7)
    };

    for index in todos.iter().filter_map(|todo| todo.due_date).filter_map(bucket) {
        days[index].todos += 1;
    }
    for index in items.iter().map(|item| item.start).filter_map(bucket) {
        days[index].events += 1;
    }
    days
}

/// Half from the todo completion ratio, half from the share of events that
/// already ended. 0 to 100.
pub fn productivity_score(todos: &[Todo], items: &[CalendarItem], now: DateTime<Utc>) -> u32 {
    let task_score = if todos.is_empty() {
        0.0
    } else {
        count_status(todos, TodoStatus::Completed) as f64 / todos.len() as f64 * 50.0
    };
    let event_score = if items.is_empty() {
        0.0
    } else {
        let past = items.iter().filter(|item| item.end < now).count();
        past as f64 / items.len() as f64 * 50.0
    };
    (task_score + event_score).round() as u32
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub breakdown: StatusBreakdown,
    pub categories: Vec<(String, usize)>,
    pub week: Vec<DayActivity>,
    pub productivity: u32,
}

impl Dashboard {
    #[tracing::instrument(skip(todos, items, now, tz))]
    pub fn compute(todos: &[Todo], items: &[CalendarItem], now: DateTime<Utc>, tz: &Tz) -> Self {
        Self {
            breakdown: status_breakdown(todos),
            categories: category_distribution(todos, items),
            week: weekly_activity(todos, items, now, tz),
            productivity: productivity_score(todos, items, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn todo(status: TodoStatus, category: &str, due: Option<DateTime<Utc>>) -> Todo {
        let mut todo = Todo::new("t".into());
        todo.status = status;
        todo.category = category.into();
        todo.due_date = due;
        todo
    }

    fn event(category: &str, start: DateTime<Utc>) -> CalendarItem {
        let mut item = CalendarItem::new("e".into(), start, start + Duration::hours(1));
        item.category = category.into();
        item
    }

    #[test]
    fn stats_and_breakdown() {
        let todos = vec![
            todo(TodoStatus::Pending, "", None),
            todo(TodoStatus::Completed, "", None),
            todo(TodoStatus::Completed, "", None),
            todo(TodoStatus::InProgress, "", None),
        ];
        let stats = todo_stats(&todos);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.total, 4);
        assert!((stats.completion_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(todo_stats(&[]).completion_rate, 0.0);

        let breakdown = status_breakdown(&todos);
        assert_eq!(breakdown.completed, 2);
        assert_eq!(breakdown.in_progress, 1);
        assert_eq!(breakdown.not_started, 0);
    }

    #[test]
    fn categories_merge_todos_and_events() {
        let todos = vec![
            todo(TodoStatus::Pending, "Work", None),
            todo(TodoStatus::Pending, "", None),
        ];
        let items = vec![event("Work", at(2024, 1, 1, 9)), event("Health", at(2024, 1, 2, 9))];
        assert_eq!(
            category_distribution(&todos, &items),
            vec![("Health".to_string(), 1), ("Work".to_string(), 2)]
        );
    }

    #[test]
    fn weekly_activity_starts_on_sunday() {
        // Wednesday 2024-05-15.
        let now = at(2024, 5, 15, 12);
        let todos = vec![
            todo(TodoStatus::Pending, "", Some(at(2024, 5, 12, 10))),
            todo(TodoStatus::Pending, "", Some(at(2024, 5, 18, 10))),
            todo(TodoStatus::Pending, "", Some(at(2024, 5, 19, 10))),
            todo(TodoStatus::Pending, "", Some(at(2024, 5, 11, 10))),
        ];
        let items = vec![event("", at(2024, 5, 15, 9))];
        let days = weekly_activity(&todos, &items, now, &chrono_tz::UTC);

        assert_eq!(days.len(), 7);
        assert_eq!(days[0].label(), "Sun");
        assert_eq!(days[0].todos, 1);
        assert_eq!(days[6].todos, 1);
        assert_eq!(days[3].events, 1);
        assert_eq!(days.iter().map(|d| d.todos).sum::<usize>(), 2);
    }

    #[test]
    fn productivity_blends_tasks_and_events() {
        let now = at(2024, 5, 15, 12);
        let todos = vec![
            todo(TodoStatus::Completed, "", None),
            todo(TodoStatus::Pending, "", None),
            todo(TodoStatus::Pending, "", None),
        ];
        let items = vec![event("", at(2024, 5, 1, 9)), event("", at(2024, 6, 1, 9))];
        // 50/3 + 25 = 41.67
        assert_eq!(productivity_score(&todos, &items, now), 42);
        assert_eq!(productivity_score(&[], &[], now), 0);
    }
}
