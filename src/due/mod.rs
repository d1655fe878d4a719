//! Due-task evaluation.
//!
//! Decides, for one task and one reference instant, whether a due
//! notification should go out now. Evaluation is pure: it reads the task and
//! the clock value it is given and nothing else. Recording `lastNotifiedAt`
//! after a successful send is the caller's job.
//!
//! The calendar frame is the time zone of `now`. The scheduler passes local
//! time; tests pin it to UTC or a fixed offset.
//!
//! Two classes of task are evaluated, see [`Schedule`]:
//!
//! - **Recurring**: stale once the latest completion (or the creation time)
//!   falls outside the cadence window. Daily means "not completed since local
//!   midnight"; weekly and monthly are fixed 7 × 24 h and 30 × 24 h offsets.
//! - **Deadline**: one-off task whose due date has passed with no completion
//!   dated on or after the due day.
//!
//! Either class is then held back while the last notification is younger than
//! the minimum re-notify gap.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

use crate::tasks::{Cadence, Task, parse_due_date};

/// Which evaluation branch applies to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule<'a> {
    Recurring { cadence: Cadence },
    Deadline { due_date: &'a str },
}

impl<'a> Schedule<'a> {
    /// Classifies a task. One-off tasks without a due date have no schedule.
    pub fn of(task: &'a Task) -> Option<Self> {
        if task.recurring {
            let cadence = task
                .frequency
                .as_deref()
                .map_or(Cadence::Daily, Cadence::from_label);
            return Some(Schedule::Recurring { cadence });
        }
        task.due_date
            .as_deref()
            .map(|due_date| Schedule::Deadline { due_date })
    }
}

/// Why a task could not be evaluated at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unschedulable {
    NoSchedule,
    InvalidDueDate(String),
}

/// Outcome of evaluating one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Due,
    /// Completed recently enough, or the due date is still ahead.
    NotDue,
    /// Would be due, but the last notification is younger than the gap.
    Suppressed { since_last: TimeDelta },
    Unschedulable(Unschedulable),
}

impl Verdict {
    pub fn is_due(&self) -> bool {
        matches!(self, Verdict::Due)
    }
}

/// Evaluates `task` at `now` with the given minimum re-notify gap.
pub fn evaluate<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>, min_gap: TimeDelta) -> Verdict {
    let stale = match Schedule::of(task) {
        Some(Schedule::Recurring { cadence }) => recurring_is_stale(task, cadence, now),
        Some(Schedule::Deadline { due_date }) => match parse_due_date(due_date, &now.timezone()) {
            Some(due) => deadline_has_passed(task, &due, now),
            None => {
                return Verdict::Unschedulable(Unschedulable::InvalidDueDate(
                    due_date.to_owned(),
                ));
            }
        },
        None => return Verdict::Unschedulable(Unschedulable::NoSchedule),
    };

    if !stale {
        return Verdict::NotDue;
    }

    if let Some(last) = task.last_notified_at {
        let since_last = now.clone().signed_duration_since(last);
        if since_last < min_gap {
            return Verdict::Suppressed { since_last };
        }
    }

    Verdict::Due
}

/// `true` when a notification for `task` should be sent at `now`.
pub fn evaluate_due<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>, min_gap: TimeDelta) -> bool {
    evaluate(task, now, min_gap).is_due()
}

fn recurring_is_stale<Tz: TimeZone>(task: &Task, cadence: Cadence, now: &DateTime<Tz>) -> bool {
    let tz = now.timezone();
    let reference = match task.completed_dates.iter().max() {
        Some(date) => Some(start_of_day(*date, &tz)),
        None => task.created_at.map(|created| created.with_timezone(&tz)),
    };

    // Nothing to measure from: notify rather than stay silent forever.
    let Some(reference) = reference else {
        return true;
    };

    match cadence {
        Cadence::Daily => reference.date_naive() < now.date_naive(),
        Cadence::Weekly => now.clone().signed_duration_since(reference) > TimeDelta::days(7),
        Cadence::Monthly => now.clone().signed_duration_since(reference) > TimeDelta::days(30),
    }
}

fn deadline_has_passed<Tz: TimeZone>(task: &Task, due: &DateTime<Tz>, now: &DateTime<Tz>) -> bool {
    if due > now {
        return false;
    }
    let due_day = due.date_naive();
    !task.completed_dates.iter().any(|done| *done >= due_day)
}

// Midnight of `date` in `tz`. When midnight does not exist locally (a DST jump
// at 00:00) the UTC midnight of that date is used instead.
fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).with_timezone(tz))
}
