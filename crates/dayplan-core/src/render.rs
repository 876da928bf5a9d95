use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::analytics::{Dashboard, TodoStats};
use crate::board::{Board, Column};
use crate::config::Config;
use crate::model::{CalendarItem, EventInstance, Note, Todo, TodoStatus};

const DATE: &str = "%Y-%m-%d";
const DATE_TIME: &str = "%Y-%m-%d %H:%M";

pub struct Renderer {
    color: bool,
    tz: Tz,
    out: Box<dyn Write>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("color", &self.color)
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color = parse_color(cfg)? && io::stdout().is_terminal();
        Ok(Self {
            color,
            tz,
            out: Box::new(io::stdout()),
        })
    }

    /// Plain output into any writer; colour is always off.
    pub fn with_writer(tz: Tz, out: Box<dyn Write>) -> Self {
        Self {
            color: false,
            tz,
            out,
        }
    }

    pub fn line(&mut self, text: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, directory))]
    pub fn print_note_directory(&mut self, directory: &[(String, Vec<&Note>)]) -> anyhow::Result<()> {
        if directory.is_empty() {
            return self.line("No notes.");
        }

        for (category, notes) in directory {
            let heading = if category.trim().is_empty() {
                "(uncategorized)"
            } else {
                category.as_str()
            };
            let heading = self.paint(heading, "1");
            writeln!(self.out, "{heading}")?;

            let rows = notes
                .iter()
                .map(|note| {
                    vec![
                        self.paint(&note.id, "33"),
                        note.title.clone(),
                        self.format_millis(note.last_edited),
                        if note.is_public { "public".into() } else { String::new() },
                    ]
                })
                .collect();
            write_table(
                &mut self.out,
                vec!["ID".into(), "Title".into(), "Edited".into(), "".into()],
                rows,
            )?;
            writeln!(self.out)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, note))]
    pub fn print_note(&mut self, note: &Note) -> anyhow::Result<()> {
        writeln!(self.out, "id        {}", note.id)?;
        writeln!(self.out, "title     {}", note.title)?;
        writeln!(self.out, "category  {}", note.category)?;
        writeln!(
            self.out,
            "visible   {}",
            if note.is_public { "public" } else { "private" }
        )?;
        writeln!(self.out, "edited    {}", self.format_millis(note.last_edited))?;
        if !note.content.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "{}", note.content)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, todos, stats, now))]
    pub fn print_todo_table(
        &mut self,
        todos: &[&Todo],
        stats: &TodoStats,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.write_stats(stats)?;
        writeln!(self.out)?;

        let mut rows = Vec::with_capacity(todos.len());
        for todo in todos {
            let due = self.format_opt(todo.due_date, DATE);
            let due = match todo.due_date {
                Some(at) if at < now && !todo.status.is_completed() => self.paint(&due, "31"),
                _ => due,
            };
            let subtasks = if todo.subtasks.is_empty() {
                String::new()
            } else {
                format!("{:.0}%", todo.subtask_progress())
            };
            rows.push(vec![
                self.paint(&todo.id, "33"),
                todo.status.as_str().to_string(),
                todo.importance.label().to_string(),
                due,
                todo.category.clone(),
                todo.title.clone(),
                subtasks,
            ]);
        }

        write_table(
            &mut self.out,
            vec![
                "ID".into(),
                "Status".into(),
                "Imp".into(),
                "Due".into(),
                "Category".into(),
                "Title".into(),
                "Subtasks".into(),
            ],
            rows,
        )
    }

    #[tracing::instrument(skip(self, todo))]
    pub fn print_todo(&mut self, todo: &Todo) -> anyhow::Result<()> {
        writeln!(self.out, "id          {}", todo.id)?;
        writeln!(self.out, "title       {}", todo.title)?;
        writeln!(self.out, "status      {}", todo.status.as_str())?;
        writeln!(self.out, "importance  {}", todo.importance.label())?;
        writeln!(self.out, "category    {}", todo.category)?;
        writeln!(self.out, "due         {}", self.format_opt(todo.due_date, DATE_TIME))?;
        if todo.start.is_some() || todo.end.is_some() {
            writeln!(self.out, "start       {}", self.format_opt(todo.start, DATE_TIME))?;
            writeln!(self.out, "end         {}", self.format_opt(todo.end, DATE_TIME))?;
        }
        writeln!(self.out, "edited      {}", self.format_millis(todo.last_edited))?;
        if !todo.content.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "{}", todo.content)?;
        }

        if !todo.subtasks.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "Subtasks ({:.0}% done)", todo.subtask_progress())?;
            let rows = todo
                .subtasks
                .iter()
                .map(|sub| {
                    let mark = if sub.status == TodoStatus::Completed { "x" } else { " " };
                    vec![
                        format!("[{mark}]"),
                        sub.id.clone(),
                        sub.importance.label().to_string(),
                        self.format_opt(sub.due_date, DATE),
                        sub.title.clone(),
                    ]
                })
                .collect();
            write_table(
                &mut self.out,
                vec!["".into(), "ID".into(), "Imp".into(), "Due".into(), "Title".into()],
                rows,
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, board))]
    pub fn print_board(&mut self, board: &Board<'_>) -> anyhow::Result<()> {
        for column in Column::ALL {
            let cards = board.column(column);
            let heading = self.paint(&format!("{} ({})", column.title(), cards.len()), "1");
            writeln!(self.out, "{heading}")?;
            for card in cards {
                let due = card
                    .due_date
                    .map(|at| format!("  due {}", at.with_timezone(&self.tz).format(DATE)))
                    .unwrap_or_default();
                writeln!(self.out, "  {}  {}{}", card.id, card.title, due)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, instances))]
    pub fn print_event_table(&mut self, instances: &[EventInstance]) -> anyhow::Result<()> {
        if instances.is_empty() {
            return self.line("No events in range.");
        }

        let rows = instances
            .iter()
            .map(|inst| {
                let when = if inst.item.all_day {
                    format!("{} (all day)", inst.occurrence_date.format(DATE))
                } else {
                    format!(
                        "{} - {}",
                        inst.start().with_timezone(&self.tz).format(DATE_TIME),
                        inst.end().with_timezone(&self.tz).format("%H:%M")
                    )
                };
                vec![
                    self.paint(inst.template_id(), "33"),
                    when,
                    inst.item.title.clone(),
                    inst.item.category.clone(),
                    inst.item.location.clone(),
                    if inst.recurring { "R".into() } else { String::new() },
                ]
            })
            .collect();
        write_table(
            &mut self.out,
            vec![
                "ID".into(),
                "When".into(),
                "Title".into(),
                "Category".into(),
                "Location".into(),
                "".into(),
            ],
            rows,
        )
    }

    #[tracing::instrument(skip(self, item, upcoming))]
    pub fn print_event(
        &mut self,
        item: &CalendarItem,
        summary: &str,
        upcoming: &[EventInstance],
    ) -> anyhow::Result<()> {
        writeln!(self.out, "id          {}", item.id)?;
        writeln!(self.out, "title       {}", item.title)?;
        writeln!(
            self.out,
            "start       {}",
            item.start.with_timezone(&self.tz).format(DATE_TIME)
        )?;
        writeln!(
            self.out,
            "end         {}",
            item.end.with_timezone(&self.tz).format(DATE_TIME)
        )?;
        if item.all_day {
            writeln!(self.out, "all day     yes")?;
        }
        writeln!(self.out, "category    {}", item.category)?;
        if !item.location.is_empty() {
            writeln!(self.out, "location    {}", item.location)?;
        }
        writeln!(self.out, "priority    {:?}", item.priority)?;
        writeln!(self.out, "status      {:?}", item.status)?;
        if let Some(minutes) = item.notification {
            writeln!(self.out, "reminder    {minutes} min before")?;
        }
        if !summary.is_empty() {
            writeln!(self.out, "repeats     {summary}")?;
        }
        if let Some(rule) = &item.recurrence
            && !rule.blackout_dates.is_empty()
        {
            let skipped: Vec<String> = rule
                .blackout_dates
                .iter()
                .map(|d| d.format(DATE).to_string())
                .collect();
            writeln!(self.out, "skipped     {}", skipped.join(", "))?;
        }
        if !item.description.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "{}", item.description)?;
        }

        if item.is_recurring() {
            writeln!(self.out)?;
            writeln!(self.out, "Next occurrences")?;
            self.print_event_table(upcoming)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, stats))]
    pub fn print_stats(&mut self, stats: &TodoStats) -> anyhow::Result<()> {
        self.write_stats(stats)
    }

    #[tracing::instrument(skip(self, dashboard))]
    pub fn print_dashboard(&mut self, dashboard: &Dashboard) -> anyhow::Result<()> {
        let heading = self.paint("Task completion", "1");
        writeln!(self.out, "{heading}")?;
        write_table(
            &mut self.out,
            vec!["Completed".into(), "In Progress".into(), "Not Started".into()],
            vec![vec![
                dashboard.breakdown.completed.to_string(),
                dashboard.breakdown.in_progress.to_string(),
                dashboard.breakdown.not_started.to_string(),
            ]],
        )?;

        writeln!(self.out)?;
        let heading = self.paint("Categories", "1");
        writeln!(self.out, "{heading}")?;
        if dashboard.categories.is_empty() {
            writeln!(self.out, "(none)")?;
        } else {
            let rows = dashboard
                .categories
                .iter()
                .map(|(name, count)| vec![name.clone(), count.to_string()])
                .collect();
            write_table(&mut self.out, vec!["Category".into(), "Items".into()], rows)?;
        }

        writeln!(self.out)?;
        let heading = self.paint("This week", "1");
        writeln!(self.out, "{heading}")?;
        let rows = dashboard
            .week
            .iter()
            .map(|day| {
                vec![
                    day.label(),
                    day.date.format(DATE).to_string(),
                    day.todos.to_string(),
                    day.events.to_string(),
                ]
            })
            .collect();
        write_table(
            &mut self.out,
            vec!["Day".into(), "Date".into(), "Todos".into(), "Events".into()],
            rows,
        )?;

        writeln!(self.out)?;
        writeln!(
            self.out,
            "Productivity score: {}% {}",
            dashboard.productivity,
            progress_bar(dashboard.productivity, 20)
        )?;
        Ok(())
    }

    fn write_stats(&mut self, stats: &TodoStats) -> anyhow::Result<()> {
        writeln!(
            self.out,
            "Pending: {}  Completed: {}  Completion rate: {:.2}%",
            stats.pending, stats.completed, stats.completion_rate
        )?;
        Ok(())
    }

    fn format_opt(&self, at: Option<DateTime<Utc>>, fmt: &str) -> String {
        at.map(|at| at.with_timezone(&self.tz).format(fmt).to_string())
            .unwrap_or_default()
    }

    fn format_millis(&self, millis: i64) -> String {
        if millis <= 0 {
            return String::new();
        }
        self.format_opt(DateTime::from_timestamp_millis(millis), DATE_TIME)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn parse_color(cfg: &Config) -> anyhow::Result<bool> {
    let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
    match color_cfg.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("invalid color setting: {other}")),
    }
}

fn progress_bar(percent: u32, width: usize) -> String {
    let filled = (percent.min(100) as usize * width) / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

fn write_table<W: Write + ?Sized>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:width$}"))
        .collect();
    writeln!(writer, "{}", header_line.join(" ").trim_end())?;

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(writer, "{}", rule.join(" ").trim_end())?;

    for row in rows {
        let mut line = String::new();
        for (idx, width) in widths.iter().enumerate() {
            let cell = row.get(idx).map(String::as_str).unwrap_or("");
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_columns_align_on_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".into(), "Title".into()],
            vec![
                vec!["\x1b[33mn1\x1b[0m".into(), "日本".into()],
                vec!["notes22".into(), "ok".into()],
            ],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID      Title");
        assert_eq!(lines[1], "------- -----");
        assert!(lines[2].ends_with("n1\x1b[0m      日本"));
        assert_eq!(lines[3], "notes22 ok");
    }

    #[test]
    fn progress_bar_is_bounded() {
        assert_eq!(progress_bar(50, 10), "[#####.....]");
        assert_eq!(progress_bar(250, 4), "[####]");
    }

    #[test]
    fn color_setting_must_be_boolean() {
        let mut cfg = Config::defaults();
        assert!(parse_color(&cfg).expect("default"));
        cfg.apply_overrides([("color".to_string(), "rainbow".to_string())]);
        assert!(parse_color(&cfg).is_err());
    }
}
