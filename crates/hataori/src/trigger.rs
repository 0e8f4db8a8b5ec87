//! Recurring triggers used by scheduled tasks.

use chrono::Utc;
use cron::Schedule;
use futures::future::BoxFuture;
use hataori_core::WorkflowError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback invoked on every firing.
pub type TriggerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Something that invokes a callback repeatedly according to an expression.
pub trait Trigger: Send + Sync + fmt::Debug {
    /// Checks that `expression` is understood by this trigger.
    fn validate(&self, expression: &str) -> Result<(), WorkflowError>;

    /// Starts firing `callback` according to `expression` until the returned
    /// handle is stopped or dropped.
    fn arm(&self, expression: &str, callback: TriggerCallback)
        -> Result<TriggerHandle, WorkflowError>;
}

/// Keeps an armed trigger alive. Stopping or dropping it disarms the trigger.
pub struct TriggerHandle {
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for TriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerHandle")
            .field("armed", &self.on_stop.is_some())
            .finish()
    }
}

impl TriggerHandle {
    /// Creates a handle that runs `on_stop` when disarmed.
    pub fn new<F>(on_stop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            on_stop: Some(Box::new(on_stop)),
        }
    }

    /// Creates a handle that aborts `task` when disarmed.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    /// Disarms the trigger.
    pub fn stop(mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        if let Some(on_stop) = self.on_stop.take() {
            on_stop();
        }
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Parses a 5- or 6-field cron expression.
///
/// Five fields are `minute hour day-of-month month day-of-week`, with the
/// classic day-of-week numbering where 0 and 7 are Sunday. A sixth, leading
/// field adds seconds; six-field expressions are read as the `cron` crate
/// reads them, with Sunday as 1.
pub fn parse_schedule(expression: &str) -> Result<Schedule, WorkflowError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, day, month, weekday] => format!(
            "0 {} {} {} {} {}",
            minute,
            hour,
            day,
            month,
            classic_weekdays(expression, weekday)?
        ),
        [_, _, _, _, _, _] => fields.join(" "),
        other => {
            return Err(WorkflowError::Configuration(format!(
                "schedule '{}' has {} fields, expected 5 or 6",
                expression,
                other.len()
            )))
        }
    };
    Schedule::from_str(&normalized).map_err(|e| {
        WorkflowError::Configuration(format!("invalid schedule '{}': {}", expression, e))
    })
}

/// Rewrites a 0-7 (Sunday = 0 or 7) day-of-week field into the 1-7
/// (Sunday = 1) numbering of the `cron` crate. Named days pass through.
fn classic_weekdays(expression: &str, field: &str) -> Result<String, WorkflowError> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }
    let invalid = || {
        WorkflowError::Configuration(format!(
            "invalid day-of-week '{}' in schedule '{}'",
            field, expression
        ))
    };
    let number = |s: &str| -> Result<u32, WorkflowError> {
        match s.parse::<u32>() {
            Ok(n) if n <= 7 => Ok(n),
            _ => Err(invalid()),
        }
    };

    let mut named = Vec::new();
    let mut days = BTreeSet::new();
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(item.to_string());
            continue;
        }
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(number(step)?)),
            None => (item, None),
        };
        let (first, last) = match base.split_once('-') {
            _ if base == "*" => (0, 6),
            Some((from, to)) => (number(from)?, number(to)?),
            None if step.is_some() => (number(base)?, 6),
            None => {
                let day = number(base)?;
                (day, day)
            }
        };
        if first > last || step == Some(0) {
            return Err(invalid());
        }
        let step = step.unwrap_or(1) as usize;
        days.extend((first..=last).step_by(step).map(|day| day % 7));
    }

    let mut parts: Vec<String> = days.into_iter().map(|day| (day + 1).to_string()).collect();
    parts.extend(named);
    Ok(parts.join(","))
}

/// Fires on a cron schedule, on the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronTrigger;

impl CronTrigger {
    /// Creates a cron trigger.
    pub fn new() -> Self {
        Self
    }
}

impl Trigger for CronTrigger {
    fn validate(&self, expression: &str) -> Result<(), WorkflowError> {
        parse_schedule(expression).map(|_| ())
    }

    fn arm(
        &self,
        expression: &str,
        callback: TriggerCallback,
    ) -> Result<TriggerHandle, WorkflowError> {
        let schedule = parse_schedule(expression)?;
        let runtime = Handle::try_current().map_err(|e| {
            WorkflowError::Configuration(format!("cron trigger requires a tokio runtime: {}", e))
        })?;
        let expression = expression.to_string();

        let task = runtime.spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    debug!(schedule = %expression, "schedule has no further firings");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                debug!(schedule = %expression, "trigger fired");
                callback().await;
            }
        });

        Ok(TriggerHandle::from_task(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[test]
    fn test_parse_schedule_field_counts() {
        assert!(parse_schedule("*/5 * * * *").is_ok());
        assert!(parse_schedule("*/10 * * * * *").is_ok());
        assert!(matches!(
            parse_schedule("* * *"),
            Err(WorkflowError::Configuration(_))
        ));
        assert!(matches!(
            parse_schedule("61 * * * *"),
            Err(WorkflowError::Configuration(_))
        ));
    }

    fn weekdays(expression: &str) -> Vec<Weekday> {
        // Saturday noon.
        let start = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        parse_schedule(expression)
            .unwrap()
            .after(&start)
            .take(5)
            .map(|at| at.weekday())
            .collect()
    }

    #[test]
    fn test_five_field_weekdays_use_sunday_zero() {
        use Weekday::*;

        assert_eq!(weekdays("0 9 * * 1-5"), vec![Mon, Tue, Wed, Thu, Fri]);
        assert_eq!(weekdays("0 0 * * 0"), vec![Sun; 5]);
        assert_eq!(weekdays("0 0 * * 7"), vec![Sun; 5]);
        assert_eq!(weekdays("0 0 * * 5-7"), vec![Sun, Fri, Sat, Sun, Fri]);
        assert_eq!(weekdays("0 0 * * 0,3"), vec![Sun, Wed, Sun, Wed, Sun]);
        assert_eq!(weekdays("0 0 * * */3"), vec![Sun, Wed, Sat, Sun, Wed]);
        assert_eq!(weekdays("0 0 * * MON"), vec![Mon; 5]);
        assert_eq!(weekdays("0 0 * * *").len(), 5);
    }

    #[test]
    fn test_invalid_weekdays_rejected() {
        for expression in ["0 0 * * 8", "0 0 * * 5-2", "0 0 * * 1/0", "0 0 * * x-"] {
            assert!(
                matches!(
                    parse_schedule(expression),
                    Err(WorkflowError::Configuration(_))
                ),
                "{} accepted",
                expression
            );
        }
    }

    #[test]
    fn test_handle_runs_stop_once() {
        let stopped = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&stopped);
        let handle = TriggerHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.stop();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cron_trigger_fires_every_second() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let callback: TriggerCallback = Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        let handle = CronTrigger::new().arm("* * * * * *", callback).unwrap();
        tokio::time::sleep(Duration::from_millis(2200)).await;
        handle.stop();

        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 1, "fired {} times", count);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), count);
    }

    #[test]
    fn test_arm_outside_runtime_fails() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let callback: TriggerCallback = Arc::new(move || {
            flag.store(true, Ordering::SeqCst);
            async {}.boxed()
        });
        let result = CronTrigger::new().arm("* * * * *", callback);
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
        assert!(!called.load(Ordering::SeqCst));
    }
}
