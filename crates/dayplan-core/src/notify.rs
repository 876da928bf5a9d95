use std::fmt::Display;
use std::time::Duration as DisplayDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use crate::datetime::format_project_date;
use crate::model::{Todo, TodoStatus};

/// How long a transient notification stays up.
pub const TOAST_DURATION: DisplayDuration = DisplayDuration::from_secs(5);
pub const DEFAULT_DEADLINE_WINDOW_HOURS: i64 = 48;

/// Transient, fire-and-forget user notifications.
pub trait Notifier {
    fn notify(&self, message: &str, duration: DisplayDuration);
}

/// Prints a toast line to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str, _duration: DisplayDuration) {
        eprintln!("» {message}");
    }
}

/// Sends notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, duration: DisplayDuration) {
        info!(duration_ms = duration.as_millis() as u64, "{message}");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _message: &str, _duration: DisplayDuration) {}
}

/// Announces pending todos due within `window` after `now`. Returns how
/// many were announced.
#[tracing::instrument(skip(todos, notifier, now))]
pub fn check_upcoming_deadlines(
    todos: &[Todo],
    now: DateTime<Utc>,
    window: Duration,
    notifier: &dyn Notifier,
) -> usize {
    let limit = now + window;
    let mut announced = 0;
    for todo in todos {
        if todo.status != TodoStatus::Pending {
            continue;
        }
        let Some(due) = todo.due_date else {
            continue;
        };
        if due > now && due <= limit {
            notifier.notify(
                &format!(
                    "Upcoming deadline: \"{}\" is due on {}",
                    todo.title,
                    format_project_date(due)
                ),
                TOAST_DURATION,
            );
            announced += 1;
        }
    }
    announced
}

/// Logs a failed operation and shows it as a toast. The failure itself is
/// left to the caller.
pub fn report_failure(notifier: &dyn Notifier, context: &str, err: &dyn Display) {
    error!(context, error = %err, "operation failed");
    notifier.notify(&format!("{context}: {err}"), TOAST_DURATION);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::TimeZone;

    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl Notifier for Recorder {
        fn notify(&self, message: &str, duration: DisplayDuration) {
            assert_eq!(duration, TOAST_DURATION);
            self.0.borrow_mut().push(message.to_string());
        }
    }

    fn todo(title: &str, status: TodoStatus, due_in_hours: Option<i64>, now: DateTime<Utc>) -> Todo {
        let mut todo = Todo::new(title.to_string());
        todo.status = status;
        todo.due_date = due_in_hours.map(|h| now + Duration::hours(h));
        todo
    }

    #[test]
    fn only_pending_todos_inside_window_are_announced() {
        let now = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid now");
        let todos = vec![
            todo("soon", TodoStatus::Pending, Some(3), now),
            todo("edge", TodoStatus::Pending, Some(48), now),
            todo("late", TodoStatus::Pending, Some(49), now),
            todo("past", TodoStatus::Pending, Some(-1), now),
            todo("done", TodoStatus::Completed, Some(3), now),
            todo("moving", TodoStatus::InProgress, Some(3), now),
            todo("undated", TodoStatus::Pending, None, now),
        ];
        let recorder = Recorder::default();
        let count = check_upcoming_deadlines(
            &todos,
            now,
            Duration::hours(DEFAULT_DEADLINE_WINDOW_HOURS),
            &recorder,
        );
        assert_eq!(count, 2);
        let messages = recorder.0.borrow();
        assert!(messages[0].starts_with("Upcoming deadline: \"soon\" is due on "));
        assert!(messages[1].contains("\"edge\""));
    }

    #[test]
    fn failures_become_toasts() {
        let recorder = Recorder::default();
        report_failure(&recorder, "saving note", &"store offline");
        assert_eq!(recorder.0.borrow().as_slice(), ["saving note: store offline"]);
    }
}
