use crate::config::ScheduleConfig;
use crate::error::{ConfigError, PipelineError};
use crate::http_client::Fetch;
use crate::pipeline::{Pipeline, RunReport};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use log::{error, info, warn};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// Result of one scheduled invocation, across all of its attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub mangas_added: usize,
    pub chapters_added: usize,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(schedule: &ScheduleConfig) -> Self {
        Self {
            max_attempts: schedule.max_attempts.max(1),
            delay: Duration::from_secs(schedule.retry_delay_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(300),
        }
    }
}

/// Run `job` until it succeeds or `policy.max_attempts` is spent, sleeping
/// `policy.delay` between attempts. The job receives the 1-based attempt number.
pub async fn run_with_retries<J, Fut>(policy: RetryPolicy, mut job: J) -> RunOutcome
where
    J: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<RunReport, PipelineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match job(attempt).await {
            Ok(report) => {
                let (mangas_added, chapters_added) = report.reconcile.added();
                info!(
                    "Scraping succeeded on attempt {}: {} mangas added, {} chapters added",
                    attempt, mangas_added, chapters_added
                );
                return RunOutcome {
                    success: true,
                    mangas_added,
                    chapters_added,
                    attempts: attempt,
                };
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Scraping attempt {}/{} failed: {}. Retrying in {} seconds",
                    attempt,
                    max_attempts,
                    e,
                    policy.delay.as_secs()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                error!("Scraping failed after {} attempts: {}", max_attempts, e);
            }
        }
    }
    RunOutcome {
        success: false,
        attempts: max_attempts,
        ..RunOutcome::default()
    }
}

/// One retried run against the configured store. Only the first attempt
/// honours `fresh`; later attempts resume from snapshots.
pub async fn run_once<F: Fetch>(pipeline: &Pipeline<F>, fresh: bool) -> RunOutcome {
    let policy = RetryPolicy::from_config(&pipeline.config().schedule);
    info!("Starting scraping run (up to {} attempts)", policy.max_attempts);
    run_with_retries(policy, move |attempt| pipeline.run_persisted(fresh && attempt == 1)).await
}

pub fn parse_daily_at(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::InvalidSchedule(value.to_string()))
}

/// First occurrence of `at` strictly after `now`, skipping times that do not
/// exist in `now`'s time zone.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = date.and_time(at).and_local_timezone(tz.clone()).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    now.clone() + chrono::Duration::days(1)
}

/// Run daily at `schedule.daily_at` local time, forever. Unless
/// `skip_initial`, a first run starts immediately.
pub async fn run_daily<F: Fetch>(pipeline: &Pipeline<F>, skip_initial: bool) -> Result<(), ConfigError> {
    let at = parse_daily_at(&pipeline.config().schedule.daily_at)?;

    if skip_initial {
        info!("Skipping initial run");
    } else {
        info!("Running initial scraping job");
        let outcome = run_once(pipeline, false).await;
        info!("Initial run finished: {:?}", outcome);
    }

    loop {
        let now = Local::now();
        let next = next_run_after(&now, at);
        info!("Next scheduled run at {}", next.format("%Y-%m-%d %H:%M"));
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        let outcome = run_once(pipeline, false).await;
        if outcome.success {
            info!("Scheduled run finished: {:?}", outcome);
        } else {
            error!("Scheduled run failed after {} attempts", outcome.attempts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let at = parse_daily_at("00:00").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        assert_eq!(next_run_after(&now, at), Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        let at = parse_daily_at("18:05").unwrap();
        assert_eq!(next_run_after(&now, at), Utc.with_ymd_and_hms(2024, 3, 10, 18, 5, 0).unwrap());
    }

    #[test]
    fn exact_time_schedules_next_day() {
        let at = parse_daily_at("15:30").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        assert_eq!(next_run_after(&now, at), Utc.with_ymd_and_hms(2024, 3, 11, 15, 30, 0).unwrap());
    }

    #[test]
    fn rejects_bad_schedule() {
        assert!(matches!(parse_daily_at("25:99"), Err(ConfigError::InvalidSchedule(_))));
        assert!(parse_daily_at(" 07:45 ").is_ok());
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        let policy = RetryPolicy::from_config(&ScheduleConfig {
            daily_at: "00:00".to_string(),
            max_attempts: 0,
            retry_delay_secs: 1,
        });
        assert_eq!(policy.max_attempts, 1);
    }
}
