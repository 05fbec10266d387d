use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::time::Duration;
use tokio::time::sleep;

/// Schedules the daily reset at local midnight
pub struct MidnightScheduler;

impl MidnightScheduler {
    /// Sleep until the next local midnight
    pub async fn sleep_until_midnight() {
        let sleep_duration = Self::duration_until_midnight(Local::now());
        tracing::debug!(
            "Sleeping for {} seconds until midnight reset",
            sleep_duration.as_secs()
        );
        sleep(sleep_duration).await;
    }

    /// Time from `now` until the start of the next local day
    pub fn duration_until_midnight(now: DateTime<Local>) -> Duration {
        let next = Self::next_midnight(now);
        (next - now).to_std().unwrap_or(Duration::from_secs(1))
    }

    /// Start of the day after `now`.
    ///
    /// On days where midnight does not exist (DST gaps) the earliest valid
    /// instant of that day is used.
    pub fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
        let tomorrow = now
            .date_naive()
            .checked_add_days(Days::new(1))
            .unwrap_or(now.date_naive());

        let mut time = NaiveTime::MIN;
        for _ in 0..24 {
            if let Some(instant) = Local.from_local_datetime(&tomorrow.and_time(time)).earliest() {
                return instant;
            }
            time += chrono::Duration::hours(1);
        }

        now + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_next_midnight_is_start_of_tomorrow() {
        let now = Local::now();
        let next = MidnightScheduler::next_midnight(now);

        assert!(next > now);
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_duration_until_midnight_is_within_a_day() {
        let duration = MidnightScheduler::duration_until_midnight(Local::now());

        assert!(duration > Duration::ZERO);
        assert!(duration <= Duration::from_secs(25 * 3600));
    }

    #[test]
    fn test_just_before_midnight_is_short() {
        let late = Local::now()
            .date_naive()
            .and_hms_opt(23, 59, 30)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest());

        // Skip on the rare zone where this instant does not exist
        if let Some(late) = late {
            let duration = MidnightScheduler::duration_until_midnight(late);
            assert!(duration <= Duration::from_secs(3600 + 30));
            assert!(duration >= Duration::from_secs(30));
        }
    }
}
