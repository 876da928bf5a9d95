//! Recurring calendar item expansion.
//!
//! Turns a stored [`CalendarItem`] and its [`Recurrence`] rule into the
//! concrete [`EventInstance`]s a calendar view renders. Expansion is a pure
//! function of the template and an [`ExpansionContext`]; nothing here reads
//! the wall clock.

use std::collections::BTreeSet;

use chrono::{
    DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::datetime::{local_to_utc, weekday_token};
use crate::model::{CalendarItem, EventInstance, Frequency, Recurrence};

/// Upper bound on candidate dates examined for a single template.
pub const MAX_CANDIDATES: u64 = 100_000;

/// Where and when an expansion runs.
#[derive(Debug, Clone)]
pub struct ExpansionContext {
    /// Zone in which calendar dates and times of day are evaluated.
    pub tz: Tz,
    /// Injected "now"; only used for the default end bound.
    pub now: DateTime<Utc>,
    /// Length of the default horizon in days. `None` means one calendar
    /// year from `now`.
    pub horizon_days: Option<i64>,
}

impl ExpansionContext {
    pub fn new(tz: Tz, now: DateTime<Utc>) -> Self {
        Self {
            tz,
            now,
            horizon_days: None,
        }
    }

    pub fn with_horizon_days(mut self, days: i64) -> Self {
        self.horizon_days = Some(days.max(0));
        self
    }

    /// Last local date expanded when a rule has no end date.
    pub fn default_end_date(&self) -> NaiveDate {
        let today = self.now.with_timezone(&self.tz).date_naive();
        let bound = match self.horizon_days {
            Some(days) => today.checked_add_days(Days::new(days.unsigned_abs())),
            None => today.checked_add_months(Months::new(12)),
        };
        bound.unwrap_or(NaiveDate::MAX)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }
}

/// A visible span of the calendar, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// `days` whole local days starting at midnight of `first`.
    pub fn days(first: NaiveDate, days: u64, tz: &Tz) -> Self {
        let last = first
            .checked_add_days(Days::new(days.max(1)))
            .unwrap_or(NaiveDate::MAX);
        Self {
            from: local_to_utc(tz, first.and_time(NaiveTime::MIN)),
            to: local_to_utc(tz, last.and_time(NaiveTime::MIN)) - Duration::milliseconds(1),
        }
    }

    /// The local calendar month containing `date`.
    pub fn month_of(date: NaiveDate, tz: &Tz) -> Self {
        let first = date.with_day(1).unwrap_or(date);
        let next = first
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);
        let days = (next - first).num_days().unsigned_abs();
        Self::days(first, days, tz)
    }

    /// The Sunday-to-Saturday local week containing `date`, the same week
    /// the dashboard buckets activity by.
    pub fn week_of(date: NaiveDate, tz: &Tz) -> Self {
        Self::days(date.week(Weekday::Sun).first_day(), 7, tz)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.to && end >= self.from
    }
}

/// Expands one template into its occurrences, ordered by start.
///
/// Templates without a recurrence (or with frequency `none`) yield exactly
/// one instance equal to themselves. A weekly rule with no weekdays yields
/// nothing. Non-positive intervals are treated as 1.
#[tracing::instrument(skip(template, ctx), fields(id = %template.id))]
pub fn expand(template: &CalendarItem, ctx: &ExpansionContext) -> Vec<EventInstance> {
    let Some(rule) = template.recurrence.as_ref().filter(|r| r.is_recurring()) else {
        return vec![EventInstance {
            item: template.clone(),
            occurrence_date: ctx.local_date(template.start),
            recurring: false,
        }];
    };

    let local_start = template.start.with_timezone(&ctx.tz);
    let anchor = local_start.date_naive();
    let time_of_day =
        NaiveTime::from_hms_opt(local_start.hour(), local_start.minute(), 0).unwrap_or(NaiveTime::MIN);
    let duration = template.end - template.start;

    let first_day = rule
        .start
        .map(|start| ctx.local_date(start).max(anchor))
        .unwrap_or(anchor);
    let last_day = rule
        .end_date
        .map(|end| ctx.local_date(end))
        .unwrap_or_else(|| ctx.default_end_date());

    if rule.interval < 1 {
        debug!(interval = rule.interval, "non-positive interval treated as 1");
    }
    let interval = rule.interval.max(1).unsigned_abs();
    let blackout: BTreeSet<NaiveDate> = rule.blackout_dates.iter().copied().collect();

    let mut out = Vec::new();
    let mut step = first_step(rule.frequency, anchor, first_day, interval);
    let mut examined: u64 = 0;
    loop {
        if examined >= MAX_CANDIDATES {
            warn!(
                limit = MAX_CANDIDATES,
                "recurrence expansion hit the candidate limit"
            );
            break;
        }
        let Some(candidate) = candidate_date(rule.frequency, anchor, interval, step) else {
            break;
        };
        step += 1;
        examined += 1;

        if candidate > last_day {
            break;
        }
        if candidate < first_day || blackout.contains(&candidate) {
            continue;
        }
        if !matches_rule(rule, anchor, candidate) {
            continue;
        }

        let start = local_to_utc(&ctx.tz, candidate.and_time(time_of_day));
        let mut item = template.clone();
        item.start = start;
        item.end = start + duration;
        out.push(EventInstance {
            item,
            occurrence_date: candidate,
            recurring: true,
        });
    }

    debug!(count = out.len(), "expanded recurring item");
    out
}

/// Occurrences of `template` overlapping `window`.
pub fn expand_in_window(
    template: &CalendarItem,
    window: &DateWindow,
    ctx: &ExpansionContext,
) -> Vec<EventInstance> {
    expand(template, ctx)
        .into_iter()
        .filter(|inst| window.overlaps(inst.start(), inst.end()))
        .collect()
}

/// Every occurrence of every template inside `window`, ordered by start.
pub fn expand_all(
    items: &[CalendarItem],
    window: &DateWindow,
    ctx: &ExpansionContext,
) -> Vec<EventInstance> {
    let mut out: Vec<EventInstance> = items
        .iter()
        .flat_map(|item| expand_in_window(item, window, ctx))
        .collect();
    out.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then_with(|| a.item.title.cmp(&b.item.title))
    });
    out
}

/// Suppresses the occurrence on `date` without touching the series.
///
/// Returns `None` for a non-recurring item; deleting it outright is the
/// only way to remove its single occurrence.
pub fn skip_occurrence(item: &CalendarItem, date: NaiveDate) -> Option<CalendarItem> {
    if !item.is_recurring() {
        return None;
    }
    let mut updated = item.clone();
    if let Some(rule) = updated.recurrence.as_mut()
        && !rule.blackout_dates.contains(&date)
    {
        rule.blackout_dates.push(date);
    }
    Some(updated)
}

impl Recurrence {
    /// Human-readable description, e.g. "Occurs every 2 weeks on Mon, Wed
    /// starting 01 Jan 2024 until 15 Jan 2024".
    pub fn summary(&self, template_start: DateTime<Utc>, tz: &Tz) -> String {
        if !self.is_recurring() {
            return String::new();
        }

        let mut summary = String::from("Occurs every ");
        if self.interval > 1 {
            summary.push_str(&format!("{} {}s", self.interval, self.frequency));
        } else {
            summary.push_str(self.frequency.as_str());
        }

        if self.frequency == Frequency::Week && !self.weekdays.is_empty() {
            let days: Vec<&str> = self.weekdays.iter().map(|d| weekday_token(*d)).collect();
            summary.push_str(&format!(" on {}", days.join(", ")));
        }

        summary.push_str(&format!(
            " starting {}",
            template_start.with_timezone(tz).format("%d %b %Y")
        ));
        if let Some(end) = self.end_date {
            summary.push_str(&format!(" until {}", end.with_timezone(tz).format("%d %b %Y")));
        }
        summary
    }
}

// Day-based rules can jump straight to the first candidate at or after
// `first_day`; month and year rules have few enough candidates to walk.
fn first_step(freq: Frequency, anchor: NaiveDate, first_day: NaiveDate, interval: u64) -> u64 {
    match freq {
        Frequency::Day | Frequency::Week => {
            let gap = (first_day - anchor).num_days().max(0).unsigned_abs();
            gap / interval
        }
        _ => 0,
    }
}

// Candidates are computed from the anchor rather than from the previous
// candidate, so a month clamped to its last day does not shift later ones.
fn candidate_date(freq: Frequency, anchor: NaiveDate, interval: u64, step: u64) -> Option<NaiveDate> {
    let units = step.checked_mul(interval)?;
    match freq {
        Frequency::None => None,
        Frequency::Day | Frequency::Week => anchor.checked_add_days(Days::new(units)),
        Frequency::Month => anchor.checked_add_months(Months::new(u32::try_from(units).ok()?)),
        Frequency::Year => {
            let months = units.checked_mul(12)?;
            anchor.checked_add_months(Months::new(u32::try_from(months).ok()?))
        }
    }
}

fn matches_rule(rule: &Recurrence, anchor: NaiveDate, candidate: NaiveDate) -> bool {
    match rule.frequency {
        Frequency::None => false,
        Frequency::Day => true,
        Frequency::Week => rule.weekdays.contains(&candidate.weekday()),
        Frequency::Month => candidate.day() == anchor.day(),
        Frequency::Year => candidate.month() == anchor.month() && candidate.day() == anchor.day(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Weekday};

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("valid instant")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn ctx() -> ExpansionContext {
        ExpansionContext::new(chrono_tz::UTC, utc(2024, 1, 1, 0, 0))
    }

    fn weekly_mon_wed() -> CalendarItem {
        let mut item = CalendarItem::new(
            "Gym".to_string(),
            utc(2024, 1, 1, 9, 0),
            utc(2024, 1, 1, 10, 0),
        );
        item.id = "calendarItems1".to_string();
        item.recurrence = Some(Recurrence {
            frequency: Frequency::Week,
            interval: 1,
            weekdays: vec![Weekday::Mon, Weekday::Wed],
            end_date: Some(utc(2024, 1, 15, 0, 0)),
            ..Recurrence::default()
        });
        item
    }

    fn dates(instances: &[EventInstance]) -> Vec<NaiveDate> {
        instances.iter().map(|i| i.occurrence_date).collect()
    }

    #[test]
    fn non_recurring_yields_itself() {
        let mut item = weekly_mon_wed();
        item.recurrence = None;
        let out = expand(&item, &ctx());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].item, item);
        assert!(!out[0].recurring);

        item.recurrence = Some(Recurrence::default());
        let out = expand(&item, &ctx());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start(), item.start);
        assert_eq!(out[0].end(), item.end);
    }

    #[test]
    fn weekly_mon_wed_until_jan_15() {
        let out = expand(&weekly_mon_wed(), &ctx());
        assert_eq!(
            dates(&out),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 3),
                date(2024, 1, 8),
                date(2024, 1, 10),
                date(2024, 1, 15),
            ]
        );
        for inst in &out {
            assert!(inst.recurring);
            assert_eq!(inst.start().format("%H:%M").to_string(), "09:00");
            assert_eq!(inst.end().format("%H:%M").to_string(), "10:00");
        }
    }

    #[test]
    fn blackout_date_is_omitted() {
        let mut item = weekly_mon_wed();
        if let Some(rule) = item.recurrence.as_mut() {
            rule.blackout_dates.push(date(2024, 1, 8));
        }
        let out = expand(&item, &ctx());
        assert_eq!(out.len(), 4);
        assert!(!dates(&out).contains(&date(2024, 1, 8)));
    }

    #[test]
    fn daily_count_matches_inclusive_day_span() {
        let mut item = weekly_mon_wed();
        item.recurrence = Some(Recurrence {
            frequency: Frequency::Day,
            interval: 1,
            start: Some(utc(2024, 1, 10, 0, 0)),
            end_date: Some(utc(2024, 2, 9, 0, 0)),
            ..Recurrence::default()
        });
        let out = expand(&item, &ctx());
        assert_eq!(out.len(), 31);
        assert_eq!(out[0].occurrence_date, date(2024, 1, 10));
        assert_eq!(out[30].occurrence_date, date(2024, 2, 9));
    }

    #[test]
    fn interval_steps_from_template_start() {
        let mut item = weekly_mon_wed();
        item.recurrence = Some(Recurrence {
            frequency: Frequency::Day,
            interval: 3,
            start: Some(utc(2024, 1, 5, 0, 0)),
            end_date: Some(utc(2024, 1, 14, 0, 0)),
            ..Recurrence::default()
        });
        let out = expand(&item, &ctx());
        assert_eq!(
            dates(&out),
            vec![date(2024, 1, 7), date(2024, 1, 10), date(2024, 1, 13)]
        );
    }

    #[test]
    fn non_positive_interval_is_clamped() {
        let mut item = weekly_mon_wed();
        if let Some(rule) = item.recurrence.as_mut() {
            rule.frequency = Frequency::Day;
            rule.interval = 0;
        }
        assert_eq!(expand(&item, &ctx()).len(), 15);

        if let Some(rule) = item.recurrence.as_mut() {
            rule.interval = -4;
        }
        assert_eq!(expand(&item, &ctx()).len(), 15);
    }

    #[test]
    fn weekly_without_weekdays_yields_nothing() {
        let mut item = weekly_mon_wed();
        if let Some(rule) = item.recurrence.as_mut() {
            rule.weekdays.clear();
        }
        assert!(expand(&item, &ctx()).is_empty());
    }

    #[test]
    fn weekly_instances_fall_on_listed_weekdays() {
        let mut item = weekly_mon_wed();
        if let Some(rule) = item.recurrence.as_mut() {
            rule.interval = 2;
            rule.weekdays = vec![Weekday::Tue, Weekday::Fri, Weekday::Sun];
            rule.end_date = Some(utc(2024, 3, 31, 0, 0));
        }
        let out = expand(&item, &ctx());
        assert!(!out.is_empty());
        for inst in &out {
            assert!(
                [Weekday::Tue, Weekday::Fri, Weekday::Sun]
                    .contains(&inst.occurrence_date.weekday())
            );
        }
    }

    #[test]
    fn monthly_on_31st_skips_short_months() {
        let mut item = CalendarItem::new(
            "Rent".to_string(),
            utc(2024, 1, 31, 8, 0),
            utc(2024, 1, 31, 8, 30),
        );
        item.recurrence = Some(Recurrence {
            frequency: Frequency::Month,
            interval: 1,
            end_date: Some(utc(2024, 7, 31, 0, 0)),
            ..Recurrence::default()
        });
        let out = expand(&item, &ctx());
        assert_eq!(
            dates(&out),
            vec![
                date(2024, 1, 31),
                date(2024, 3, 31),
                date(2024, 5, 31),
                date(2024, 7, 31),
            ]
        );
    }

    #[test]
    fn yearly_on_leap_day_only_hits_leap_years() {
        let mut item = CalendarItem::new(
            "Leap".to_string(),
            utc(2024, 2, 29, 12, 0),
            utc(2024, 2, 29, 13, 0),
        );
        item.recurrence = Some(Recurrence {
            frequency: Frequency::Year,
            interval: 1,
            end_date: Some(utc(2032, 12, 31, 0, 0)),
            ..Recurrence::default()
        });
        let out = expand(&item, &ctx());
        assert_eq!(
            dates(&out),
            vec![date(2024, 2, 29), date(2028, 2, 29), date(2032, 2, 29)]
        );
    }

    #[test]
    fn default_horizon_is_one_year_from_now() {
        let mut item = weekly_mon_wed();
        if let Some(rule) = item.recurrence.as_mut() {
            rule.frequency = Frequency::Day;
            rule.end_date = None;
        }
        let ctx = ExpansionContext::new(chrono_tz::UTC, utc(2024, 6, 1, 12, 0));
        let out = expand(&item, &ctx);
        assert_eq!(out.last().map(|i| i.occurrence_date), Some(date(2025, 6, 1)));

        let short = ctx.with_horizon_days(10);
        let out = expand(&item, &short);
        assert_eq!(out.last().map(|i| i.occurrence_date), Some(date(2024, 6, 11)));
    }

    #[test]
    fn duration_and_wall_clock_survive_dst() {
        let tz = chrono_tz::Europe::Berlin;
        let start = local_to_utc(&tz, date(2024, 3, 29).and_hms_opt(9, 0, 0).expect("time"));
        let mut item = CalendarItem::new("Sync".to_string(), start, start + Duration::minutes(90));
        item.recurrence = Some(Recurrence {
            frequency: Frequency::Day,
            interval: 1,
            end_date: Some(start + Duration::days(4)),
            ..Recurrence::default()
        });
        let ctx = ExpansionContext::new(tz, start);
        let out = expand(&item, &ctx);
        assert_eq!(out.len(), 5);
        for inst in &out {
            assert_eq!(inst.end() - inst.start(), Duration::minutes(90));
            assert_eq!(
                inst.start().with_timezone(&tz).format("%H:%M").to_string(),
                "09:00"
            );
        }
        assert_eq!(out[0].start().format("%H").to_string(), "08");
        assert_eq!(out[4].start().format("%H").to_string(), "07");
    }

    #[test]
    fn window_and_skip_occurrence() {
        let item = weekly_mon_wed();
        let window = DateWindow::week_of(date(2024, 1, 10), &chrono_tz::UTC);
        let out = expand_all(std::slice::from_ref(&item), &window, &ctx());
        assert_eq!(dates(&out), vec![date(2024, 1, 8), date(2024, 1, 10)]);

        let skipped = skip_occurrence(&item, date(2024, 1, 10)).expect("recurring");
        let again = skip_occurrence(&skipped, date(2024, 1, 10)).expect("recurring");
        assert_eq!(
            again.recurrence.as_ref().map(|r| r.blackout_dates.len()),
            Some(1)
        );
        let out = expand_all(&[again], &window, &ctx());
        assert_eq!(dates(&out), vec![date(2024, 1, 8)]);

        let mut single = item.clone();
        single.recurrence = None;
        assert!(skip_occurrence(&single, date(2024, 1, 1)).is_none());
    }

    #[test]
    fn weeks_run_sunday_to_saturday() {
        let tz = chrono_tz::UTC;
        let sunday = DateWindow::week_of(date(2024, 1, 7), &tz);
        let saturday = DateWindow::week_of(date(2024, 1, 13), &tz);
        assert_eq!(sunday, saturday);
        assert_eq!(sunday, DateWindow::days(date(2024, 1, 7), 7, &tz));
        assert_eq!(
            DateWindow::week_of(date(2024, 1, 14), &tz).from,
            DateWindow::days(date(2024, 1, 14), 1, &tz).from
        );

        let item = weekly_mon_wed();
        let out = expand_all(std::slice::from_ref(&item), &saturday, &ctx());
        assert_eq!(dates(&out), vec![date(2024, 1, 8), date(2024, 1, 10)]);
    }

    #[test]
    fn summary_reads_like_the_form() {
        let mut item = weekly_mon_wed();
        if let Some(rule) = item.recurrence.as_mut() {
            rule.interval = 2;
        }
        let rule = item.recurrence.as_ref().expect("rule");
        assert_eq!(
            rule.summary(item.start, &chrono_tz::UTC),
            "Occurs every 2 weeks on Mon, Wed starting 01 Jan 2024 until 15 Jan 2024"
        );
    }
}
