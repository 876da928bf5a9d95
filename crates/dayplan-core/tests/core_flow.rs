use std::cell::RefCell;
use std::ffi::OsString;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration as ToastDuration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use dayplan_core::cli::Invocation;
use dayplan_core::commands::{Session, dispatch};
use dayplan_core::config::Config;
use dayplan_core::datastore::FileStore;
use dayplan_core::model::{Frequency, TodoStatus};
use dayplan_core::notify::Notifier;
use dayplan_core::recurrence::{DateWindow, ExpansionContext, expand_all};
use dayplan_core::render::Renderer;
use dayplan_core::state::AppData;
use tempfile::tempdir;

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn take(&self) -> String {
        String::from_utf8(std::mem::take(&mut *self.0.borrow_mut())).expect("utf8 output")
    }
}

#[derive(Default)]
struct Toasts(RefCell<Vec<String>>);

impl Notifier for Toasts {
    fn notify(&self, message: &str, _duration: ToastDuration) {
        self.0.borrow_mut().push(message.to_string());
    }
}

fn now() -> DateTime<Utc> {
    // Monday.
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
        .single()
        .expect("valid now")
}

fn run(store: &mut FileStore, out: &Captured, toasts: &Toasts, words: &[&str]) -> anyhow::Result<String> {
    let cfg = Config::defaults();
    let mut renderer = Renderer::with_writer(chrono_tz::UTC, Box::new(out.clone()));
    let inv = Invocation::parse(&cfg, words.iter().map(OsString::from).collect())?;
    dispatch(
        Session {
            store,
            cfg: &cfg,
            renderer: &mut renderer,
            notifier: toasts,
            user: "alice".to_string(),
            tz: chrono_tz::UTC,
            now: now(),
        },
        inv,
    )?;
    Ok(out.take())
}

#[test]
fn todos_notes_and_events_through_the_command_layer() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    let out = Captured::default();
    let toasts = Toasts::default();

    let created = run(
        &mut store,
        &out,
        &toasts,
        &["todo-add", "File", "taxes", "due:2024-01-02T12:00", "imp:high", "cat:Admin"],
    )
    .expect("todo-add");
    let todo_id = format!("todos{}", now().timestamp_millis());
    assert_eq!(created.trim(), format!("Created todo {todo_id}."));

    let listing = run(&mut store, &out, &toasts, &["todos"]).expect("todos");
    assert!(listing.contains("File taxes"));
    assert!(listing.contains("Pending: 1"));
    assert_eq!(
        toasts.0.borrow().as_slice(),
        ["Upcoming deadline: \"File taxes\" is due on 2024-01-02"]
    );

    run(&mut store, &out, &toasts, &["move", todo_id.as_str(), "in-progress"]).expect("move");
    let board = run(&mut store, &out, &toasts, &["board"]).expect("board");
    assert!(board.contains("In Progress (1)"));

    run(&mut store, &out, &toasts, &["note-add", "Groceries", "cat:Home", "content:milk"])
        .expect("note-add");
    let missing = run(&mut store, &out, &toasts, &["note", "notes404"]).expect("fallback");
    assert!(missing.starts_with("No note with id notes404"));
    assert!(missing.contains("Groceries"));

    run(
        &mut store,
        &out,
        &toasts,
        &[
            "event-add",
            "Standup",
            "start:2024-01-01T09:00",
            "end:2024-01-01T09:15",
            "repeat:week",
            "on:Mon,Wed,Fri",
            "until:2024-01-12",
        ],
    )
    .expect("event-add");

    let data = AppData::load(&store, "alice").expect("reload");
    assert_eq!(data.todo(&todo_id).expect("todo").status, TodoStatus::InProgress);
    let event = data.calendar_items()[0].clone();
    assert_eq!(
        event.recurrence.as_ref().map(|r| r.frequency),
        Some(Frequency::Week)
    );

    run(&mut store, &out, &toasts, &["skip", event.id.as_str(), "2024-01-03"]).expect("skip");

    let data = AppData::load(&store, "alice").expect("reload");
    let window = DateWindow::days(
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
        14,
        &chrono_tz::UTC,
    );
    let ctx = ExpansionContext::new(chrono_tz::UTC, now());
    let days: Vec<String> = expand_all(data.calendar_items(), &window, &ctx)
        .iter()
        .map(|inst| inst.occurrence_date.to_string())
        .collect();
    assert_eq!(
        days,
        ["2024-01-01", "2024-01-05", "2024-01-08", "2024-01-10", "2024-01-12"]
    );

    let week = run(&mut store, &out, &toasts, &["events", "week"]).expect("events");
    assert_eq!(week.matches("Standup").count(), 2);
}

#[test]
fn unknown_ids_fall_back_and_bad_input_errors() {
    let temp = tempdir().expect("tempdir");
    let mut store = FileStore::open(temp.path()).expect("open store");
    let out = Captured::default();
    let toasts = Toasts::default();

    let shown = run(&mut store, &out, &toasts, &["done", "todos1"]).expect("fallback");
    assert!(shown.starts_with("No todo with id todos1"));

    assert!(run(&mut store, &out, &toasts, &["event-add", "No start"]).is_err());
    assert!(run(&mut store, &out, &toasts, &["todo-add", "x", "imp:urgent"]).is_err());
    out.take();

    let export = run(&mut store, &out, &toasts, &["export"]).expect("export");
    let value: serde_json::Value = serde_json::from_str(&export).expect("json");
    assert_eq!(value["todos"], serde_json::json!([]));
}
