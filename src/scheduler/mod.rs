use crate::config::Config;
use anyhow::{Context, Result, bail};
use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, Local, LocalResult, NaiveDate, NaiveTime,
    TimeZone, Timelike, Weekday,
};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

const RESCHEDULE_POLL_SECONDS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    pub time: NaiveTime,
    /// `None` fires every day.
    pub weekday: Option<Weekday>,
}

/// Builds `"<minute> <hour> * * <dow>"` with Sunday as day 0, or `*` for a
/// daily digest.
pub fn cron_from_config(config: &Config) -> Result<String> {
    let time = config.parse_report_time()?;
    let day_of_week = config
        .parse_report_day()?
        .map_or_else(|| "*".to_string(), |day| day.num_days_from_sunday().to_string());

    Ok(format!("{} {} * * {day_of_week}", time.minute(), time.hour()))
}

pub async fn run_cron_scheduler<S, F, Fut>(mut schedule_provider: S, mut task: F) -> Result<()>
where
    S: FnMut() -> Result<String>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_logged_cron = String::new();

    loop {
        let cron_expr = match schedule_provider() {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, "failed to load report schedule");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        let delay = match seconds_until_next_run(&cron_expr) {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, cron = %cron_expr, "invalid report cron expression");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        if cron_expr != last_logged_cron {
            info!(seconds = delay.as_secs(), cron = %cron_expr, "next report schedule set");
            last_logged_cron = cron_expr.clone();
        }

        if delay > Duration::from_secs(RESCHEDULE_POLL_SECONDS) {
            sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
            continue;
        }

        sleep(delay).await;

        let date = Local::now().date_naive();
        let result = task(date).await;

        if let Err(error) = result {
            error!(error = %error, date = %date, "scheduled report generation failed");
        }

        sleep(Duration::from_secs(1)).await;
    }
}

fn seconds_until_next_run(cron_expr: &str) -> Result<Duration> {
    let schedule = parse_cron_schedule(cron_expr)?;
    let now = Local::now();
    let next_run = next_run_after(&schedule, &now)?;

    (next_run - now)
        .to_std()
        .context("Failed to compute next execution delay")
}

/// First matching wall-clock time strictly after `now`. Local times that do
/// not exist (DST gaps) are skipped; ambiguous ones use the earlier instant.
pub fn next_run_after<Tz: TimeZone>(
    schedule: &CronSchedule,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>> {
    let timezone = now.timezone();
    let today = now.date_naive();

    (0..=8)
        .map(|offset| today + ChronoDuration::days(offset))
        .filter(|day| {
            schedule
                .weekday
                .is_none_or(|weekday| day.weekday() == weekday)
        })
        .filter_map(
            |day| match timezone.from_local_datetime(&day.and_time(schedule.time)) {
                LocalResult::Single(datetime) => Some(datetime),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                LocalResult::None => None,
            },
        )
        .find(|candidate| candidate > now)
        .context("Failed to compute next execution time")
}

pub fn parse_cron_schedule(cron_expr: &str) -> Result<CronSchedule> {
    let fields = cron_expr.split_whitespace().collect::<Vec<_>>();

    if fields.len() != 5 {
        bail!(
            "Invalid cron expression: {cron_expr}. Expected format: '<minute> <hour> * * <day-of-week>'"
        );
    }

    if fields[2] != "*" || fields[3] != "*" {
        bail!(
            "Unsupported cron expression: {cron_expr}. Day-of-month and month must be '*'"
        );
    }

    let minute = fields[0]
        .parse::<u32>()
        .with_context(|| format!("Invalid cron minute: {}", fields[0]))?;
    let hour = fields[1]
        .parse::<u32>()
        .with_context(|| format!("Invalid cron hour: {}", fields[1]))?;

    let weekday = match fields[4] {
        "*" => None,
        raw => {
            let day = raw
                .parse::<u8>()
                .with_context(|| format!("Invalid cron day-of-week: {raw}"))?;
            Some(weekday_from_cron(day)?)
        }
    };

    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .with_context(|| format!("Invalid cron time values: hour={hour}, minute={minute}"))?;

    Ok(CronSchedule { time, weekday })
}

fn weekday_from_cron(day: u8) -> Result<Weekday> {
    match day {
        0 | 7 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        _ => bail!("Invalid cron day-of-week: {day}. Expected 0-7"),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CronSchedule, cron_from_config, next_run_after, parse_cron_schedule,
        seconds_until_next_run,
    };
    use crate::config::Config;
    use chrono::{NaiveTime, TimeZone, Utc, Weekday};

    #[test]
    fn cron_conversion_from_weekly_schedule() {
        let mut config = Config::default();
        let expr = cron_from_config(&config).expect("cron expression");
        assert_eq!(expr, "0 21 * * 0");

        config.set_value("report.time", "07:45").expect("time");
        config.set_value("report.weekday", "Fri").expect("weekday");
        let expr = cron_from_config(&config).expect("cron expression");
        assert_eq!(expr, "45 7 * * 5");

        config.set_value("report.weekday", "daily").expect("daily");
        assert_eq!(cron_from_config(&config).expect("cron expression"), "45 7 * * *");
    }

    #[test]
    fn parses_weekly_and_daily_expressions() {
        let weekly = parse_cron_schedule("0 21 * * 0").expect("weekly");
        assert_eq!(
            weekly,
            CronSchedule {
                time: NaiveTime::from_hms_opt(21, 0, 0).expect("time"),
                weekday: Some(Weekday::Sun),
            }
        );

        let daily = parse_cron_schedule("30 23 * * *").expect("daily");
        assert_eq!(daily.weekday, None);
    }

    #[test]
    fn next_weekly_run_lands_on_the_configured_day() {
        let schedule = parse_cron_schedule("0 21 * * 0").expect("schedule");

        // 2026-03-11 is a Wednesday.
        let now = Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
        let next = next_run_after(&schedule, &now).expect("next");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 15, 21, 0, 0).unwrap());

        // Exactly at the run time rolls over to the following week.
        let at_run = Utc.with_ymd_and_hms(2026, 3, 15, 21, 0, 0).unwrap();
        let next = next_run_after(&schedule, &at_run).expect("next");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 22, 21, 0, 0).unwrap());
    }

    #[test]
    fn schedule_delay_is_positive() {
        let delay = seconds_until_next_run("0 21 * * 0").expect("delay computed");
        assert!(delay.as_secs() > 0);
    }

    #[test]
    fn rejects_unsupported_cron_expressions() {
        assert!(parse_cron_schedule("*/5 * * * *").is_err());
        assert!(parse_cron_schedule("0 21 1 * 0").is_err());
        assert!(parse_cron_schedule("0 21 * * 9").is_err());
        assert!(parse_cron_schedule("0 21 * *").is_err());
    }
}
