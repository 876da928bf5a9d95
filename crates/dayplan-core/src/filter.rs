use std::cmp::Ordering;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::trace;

use crate::model::{
  Note,
  Todo,
  TodoStatus
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default
)]
pub enum StatusFilter {
  #[default]
  All,
  Pending,
  Completed
}

impl StatusFilter {
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Some(Self::All),
      | "pending" => {
        Some(Self::Pending)
      }
      | "completed" | "done" => {
        Some(Self::Completed)
      }
      | _ => None
    }
  }

  fn accepts(
    self,
    status: TodoStatus
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Pending => {
        status == TodoStatus::Pending
      }
      | Self::Completed => {
        status == TodoStatus::Completed
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default
)]
pub enum SortKey {
  #[default]
  Start,
  End,
  Title,
  Importance
}

impl SortKey {
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "start" => Some(Self::Start),
      | "end" => Some(Self::End),
      | "title" => Some(Self::Title),
      | "importance" => {
        Some(Self::Importance)
      }
      | _ => None
    }
  }
}

/// What the todo list shows and in
/// which order.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TodoQuery {
  pub status: StatusFilter,
  pub sort:   SortKey,
  pub search: Option<String>
}

impl TodoQuery {
  /// Reads `status:`, `sort:` and
  /// free words (title search).
  #[tracing::instrument]
  pub fn from_terms(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut query = Self::default();
    let mut words = Vec::new();

    for term in terms {
      if let Some(raw) = term
        .strip_prefix("status:")
        .or_else(|| {
          term.strip_prefix("filter:")
        })
      {
        query.status =
          StatusFilter::parse(raw)
            .ok_or_else(|| {
              anyhow!(
                "unknown status filter: \
                 {raw}"
              )
            })?;
      } else if let Some(raw) =
        term.strip_prefix("sort:")
      {
        query.sort = SortKey::parse(
          raw
        )
        .ok_or_else(|| {
          anyhow!("unknown sort key: {raw}")
        })?;
      } else {
        words.push(term.as_str());
      }
    }

    if !words.is_empty() {
      query.search =
        Some(words.join(" "));
    }
    trace!(?query, "parsed todo query");
    Ok(query)
  }

  pub fn matches(
    &self,
    todo: &Todo
  ) -> bool {
    if !self.status.accepts(todo.status)
    {
      return false;
    }
    match &self.search {
      | Some(needle) => {
        todo
          .title
          .to_lowercase()
          .contains(&needle.to_lowercase())
      }
      | None => true
    }
  }

  /// Filtered and sorted. Completed
  /// todos always come after open ones.
  pub fn apply<'a>(
    &self,
    todos: &'a [Todo]
  ) -> Vec<&'a Todo> {
    let mut out: Vec<&Todo> = todos
      .iter()
      .filter(|todo| self.matches(todo))
      .collect();
    out.sort_by(|a, b| {
      compare_todos(a, b, self.sort)
    });
    out
  }
}

fn compare_todos(
  a: &Todo,
  b: &Todo,
  sort: SortKey
) -> Ordering {
  let a_done = a.status.is_completed();
  let b_done = b.status.is_completed();
  if a_done != b_done {
    return a_done.cmp(&b_done);
  }

  match sort {
    | SortKey::Start => {
      compare_instants(a.start, b.start)
    }
    | SortKey::End => {
      compare_instants(a.end, b.end)
    }
    | SortKey::Title => {
      a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
    }
    | SortKey::Importance => {
      b.importance.cmp(&a.importance)
    }
  }
}

/// Missing instants sort last.
fn compare_instants(
  a: Option<DateTime<Utc>>,
  b: Option<DateTime<Utc>>
) -> Ordering {
  match (a, b) {
    | (Some(a), Some(b)) => a.cmp(&b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

/// Own private notes, plus public ones
/// when `show_public` is set. A note
/// without an owner belongs to whoever
/// loaded it.
pub fn visible_notes<'a>(
  notes: &'a [Note],
  user: &str,
  show_public: bool
) -> Vec<&'a Note> {
  notes
    .iter()
    .filter(|note| {
      if note.is_public {
        show_public
      } else {
        note
          .user_id
          .as_deref()
          .is_none_or(|owner| {
            owner == user
          })
      }
    })
    .collect()
}

/// Distinct categories in first-seen
/// order, each with its notes.
pub fn note_directory<'a>(
  notes: &[&'a Note]
) -> Vec<(String, Vec<&'a Note>)> {
  let mut groups: Vec<(
    String,
    Vec<&'a Note>
  )> = Vec::new();

  for note in notes {
    match groups.iter_mut().find(
      |(category, _)| {
        *category == note.category
      }
    ) {
      | Some((_, members)) => {
        members.push(note)
      }
      | None => groups.push((
        note.category.clone(),
        vec![*note]
      ))
    }
  }
  groups
}
