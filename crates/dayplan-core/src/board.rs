use std::cmp::Ordering;
use std::fmt;

use crate::model::{Todo, TodoStatus};

/// Kanban column a todo lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ToDo,
    InProgress,
    Done,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::ToDo, Column::InProgress, Column::Done];

    pub fn for_status(status: TodoStatus) -> Self {
        match status {
            TodoStatus::Pending | TodoStatus::NotStarted => Column::ToDo,
            TodoStatus::InProgress => Column::InProgress,
            TodoStatus::Completed => Column::Done,
        }
    }

    /// Status a card takes when dropped into this column.
    pub fn status(self) -> TodoStatus {
        match self {
            Column::ToDo => TodoStatus::NotStarted,
            Column::InProgress => TodoStatus::InProgress,
            Column::Done => TodoStatus::Completed,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Column::ToDo => "to-do",
            Column::InProgress => "in-progress",
            Column::Done => "done",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Column::ToDo => "To Do",
            Column::InProgress => "In Progress",
            Column::Done => "Done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "to-do" | "todo" | "not-started" | "pending" => Some(Column::ToDo),
            "in-progress" | "inprogress" | "doing" | "started" => Some(Column::InProgress),
            "done" | "completed" => Some(Column::Done),
            _ => None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Board<'a> {
    pub to_do: Vec<&'a Todo>,
    pub in_progress: Vec<&'a Todo>,
    pub done: Vec<&'a Todo>,
}

impl<'a> Board<'a> {
    pub fn build(todos: &'a [Todo]) -> Self {
        let mut board = Board::default();
        for todo in todos {
            board.column_mut(Column::for_status(todo.status)).push(todo);
        }
        for column in Column::ALL {
            board.column_mut(column).sort_by(|a, b| by_due_date(a, b));
        }
        board
    }

    pub fn column(&self, column: Column) -> &[&'a Todo] {
        match column {
            Column::ToDo => &self.to_do,
            Column::InProgress => &self.in_progress,
            Column::Done => &self.done,
        }
    }

    fn column_mut(&mut self, column: Column) -> &mut Vec<&'a Todo> {
        match column {
            Column::ToDo => &mut self.to_do,
            Column::InProgress => &mut self.in_progress,
            Column::Done => &mut self.done,
        }
    }
}

/// Undated cards go to the bottom.
fn by_due_date(a: &Todo, b: &Todo) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Returns `true` when the card actually changed column.
pub fn move_card(todo: &mut Todo, column: Column) -> bool {
    if Column::for_status(todo.status) == column {
        return false;
    }
    todo.status = column.status();
    true
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn todo(title: &str, status: TodoStatus, due_in_days: Option<i64>) -> Todo {
        let base = Utc
            .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
            .single()
            .expect("valid base");
        let mut todo = Todo::new(title.to_string());
        todo.status = status;
        todo.due_date = due_in_days.map(|d| base + Duration::days(d));
        todo
    }

    #[test]
    fn pending_and_not_started_share_the_first_column() {
        let todos = vec![
            todo("later", TodoStatus::NotStarted, Some(5)),
            todo("undated", TodoStatus::Pending, None),
            todo("sooner", TodoStatus::Pending, Some(1)),
            todo("working", TodoStatus::InProgress, Some(2)),
            todo("finished", TodoStatus::Completed, None),
        ];
        let board = Board::build(&todos);
        let titles: Vec<&str> = board.to_do.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["sooner", "later", "undated"]);
        assert_eq!(board.column(Column::InProgress).len(), 1);
        assert_eq!(board.column(Column::Done)[0].title, "finished");
    }

    #[test]
    fn moving_maps_column_back_to_status() {
        let mut card = todo("card", TodoStatus::Pending, None);
        assert!(!move_card(&mut card, Column::ToDo));
        assert_eq!(card.status, TodoStatus::Pending);

        assert!(move_card(&mut card, Column::Done));
        assert_eq!(card.status, TodoStatus::Completed);

        assert!(move_card(&mut card, Column::ToDo));
        assert_eq!(card.status, TodoStatus::NotStarted);
        assert_eq!(Column::parse("In-Progress"), Some(Column::InProgress));
    }
}
