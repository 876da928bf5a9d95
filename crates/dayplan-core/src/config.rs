use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;

use crate::notify::{
  DEFAULT_DEADLINE_WINDOW_HOURS,
  LogNotifier,
  Notifier,
  SilentNotifier,
  StderrNotifier
};
use crate::recurrence::ExpansionContext;

const RC_ENV_VAR: &str = "DAYPLANRC";
const RC_FILE_NAME: &str = ".dayplanrc";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum NotifyMode {
  Stderr,
  Log,
  Off
}

impl NotifyMode {
  pub fn notifier(
    self
  ) -> Box<dyn Notifier> {
    match self {
      | Self::Stderr => {
        Box::new(StderrNotifier)
      }
      | Self::Log => Box::new(LogNotifier),
      | Self::Off => {
        Box::new(SilentNotifier)
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading dayplanrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no dayplanrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.dayplan"),
      ("user", "local"),
      ("default.command", "todos"),
      ("color", "on"),
      ("deadline.window.hours", "48"),
      ("notify", "stderr")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn user(&self) -> String {
    self
      .get("user")
      .map(|u| u.trim().to_string())
      .filter(|u| !u.is_empty())
      .unwrap_or_else(|| {
        "local".to_string()
      })
  }

  /// Days ahead an open-ended series
  /// is expanded. Unset means one
  /// calendar year.
  pub fn horizon_days(
    &self
  ) -> anyhow::Result<Option<i64>> {
    if self
      .get("calendar.horizon.days")
      .is_none_or(|raw| {
        raw.trim().is_empty()
      })
    {
      return Ok(None);
    }
    self
      .get_positive(
        "calendar.horizon.days",
        0
      )
      .map(Some)
  }

  pub fn expansion_context(
    &self,
    tz: Tz,
    now: DateTime<Utc>
  ) -> anyhow::Result<ExpansionContext>
  {
    let ctx =
      ExpansionContext::new(tz, now);
    Ok(match self.horizon_days()? {
      | Some(days) => {
        ctx.with_horizon_days(days)
      }
      | None => ctx
    })
  }

  pub fn deadline_window_hours(
    &self
  ) -> anyhow::Result<i64> {
    self.get_positive(
      "deadline.window.hours",
      DEFAULT_DEADLINE_WINDOW_HOURS
    )
  }

  pub fn notify_mode(
    &self
  ) -> anyhow::Result<NotifyMode> {
    let raw = self
      .get("notify")
      .unwrap_or_default();
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "stderr" | "on" => {
        Ok(NotifyMode::Stderr)
      }
      | "log" => Ok(NotifyMode::Log),
      | "off" | "none" => {
        Ok(NotifyMode::Off)
      }
      | other => {
        Err(anyhow!(
          "invalid notify mode: \
           {other}"
        ))
      }
    }
  }

  fn get_positive(
    &self,
    key: &str,
    fallback: i64
  ) -> anyhow::Result<i64> {
    let Some(raw) = self.get(key) else {
      return Ok(fallback);
    };
    let value: i64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid number for \
             {key}: {raw}"
          )
        }
      )?;
    if value <= 0 {
      return Err(anyhow!(
        "{key} must be positive, got \
         {value}"
      ));
    }
    Ok(value)
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".dayplan"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "deadline.window.hours = 24\n"
    )
    .expect("write include");
    let rc = temp.path().join("dayplanrc");
    fs::write(
      &rc,
      "# personal setup\nuser = \
       alice\ninclude extra.rc\nnotify \
       = log  # quiet\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load config");
    assert_eq!(cfg.user(), "alice");
    assert_eq!(
      cfg
        .deadline_window_hours()
        .expect("window"),
      24
    );
    assert_eq!(
      cfg.notify_mode().expect("mode"),
      NotifyMode::Log
    );
    assert_eq!(cfg.loaded_files.len(), 2);

    cfg.apply_overrides([(
      "rc.calendar.horizon.days"
        .to_string(),
      "30".to_string()
    )]);
    assert_eq!(
      cfg.horizon_days().expect("horizon"),
      Some(30)
    );
  }

  #[test]
  fn default_horizon_is_a_calendar_year()
  {
    use chrono::{
      NaiveDate,
      TimeZone
    };

    let now = Utc
      .with_ymd_and_hms(
        2024, 1, 1, 8, 0, 0
      )
      .single()
      .expect("valid now");
    let mut cfg = Config::defaults();
    let ctx = cfg
      .expansion_context(
        chrono_tz::UTC,
        now
      )
      .expect("context");
    assert_eq!(
      ctx.default_end_date(),
      NaiveDate::from_ymd_opt(2025, 1, 1)
        .expect("date")
    );

    cfg.apply_overrides([(
      "calendar.horizon.days"
        .to_string(),
      "365".to_string()
    )]);
    let ctx = cfg
      .expansion_context(
        chrono_tz::UTC,
        now
      )
      .expect("context");
    assert_eq!(
      ctx.default_end_date(),
      NaiveDate::from_ymd_opt(
        2024, 12, 31
      )
      .expect("date")
    );
  }

  #[test]
  fn defaults_and_invalid_values() {
    let mut cfg = Config::defaults();
    assert_eq!(cfg.user(), "local");
    assert_eq!(
      cfg.horizon_days().expect("horizon"),
      None
    );
    assert_eq!(cfg.get_bool("color"), Some(true));

    cfg.apply_overrides([
      (
        "deadline.window.hours".to_string(),
        "-3".to_string()
      ),
      ("notify".to_string(), "pager".to_string())
    ]);
    assert!(
      cfg.deadline_window_hours().is_err()
    );
    assert!(cfg.notify_mode().is_err());
  }

  #[test]
  fn malformed_line_is_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("dayplanrc");
    fs::write(&rc, "just words\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err("bad line");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }
}
