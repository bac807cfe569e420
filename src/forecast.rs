use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::weather::ForecastEntry;

pub const FORECAST_DAYS: usize = 5;

fn calendar_date(entry: &ForecastEntry) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(entry.dt, 0).map(|t| t.date_naive())
}

/// Reduce fine-grained samples to the first sample of each calendar day (UTC),
/// keeping at most [`FORECAST_DAYS`] days in input order.
pub fn daily_forecast(list: &[ForecastEntry]) -> Vec<&ForecastEntry> {
    let mut seen = HashSet::new();
    let mut days = Vec::with_capacity(FORECAST_DAYS);

    for entry in list {
        if days.len() == FORECAST_DAYS {
            break;
        }
        let Some(date) = calendar_date(entry) else {
            continue;
        };
        if seen.insert(date) {
            days.push(entry);
        }
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::parse_forecast;
    use crate::weather::testing::{forecast_json, DAY, JAN_1};

    #[test]
    fn test_five_days_from_three_hourly_samples() {
        // 6 full days of 3-hourly samples, starting mid-day
        let forecast = parse_forecast(&forecast_json(JAN_1 + 12 * 3600, 48)).unwrap();
        let days = daily_forecast(&forecast.list);

        assert_eq!(days.len(), 5);
        // first day starts at 12:00, following days at midnight
        assert_eq!(days[0].dt, JAN_1 + 12 * 3600);
        for (i, day) in days.iter().enumerate().skip(1) {
            assert_eq!(day.dt, JAN_1 + i as i64 * DAY);
        }

        let dates: HashSet<_> = days.iter().filter_map(|d| calendar_date(d)).collect();
        assert_eq!(dates.len(), 5);
    }

    #[test]
    fn test_fewer_dates_than_limit() {
        let forecast = parse_forecast(&forecast_json(JAN_1, 12)).unwrap();
        let days = daily_forecast(&forecast.list);

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].dt, JAN_1);
        assert_eq!(days[1].dt, JAN_1 + DAY);
    }

    #[test]
    fn test_keeps_first_seen_sample_not_aggregate() {
        let forecast = parse_forecast(&forecast_json(JAN_1, 8)).unwrap();
        let days = daily_forecast(&forecast.list);

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].main.temp, 0.0);
        assert_eq!(days[0].main.temp_max, 1.0);
    }

    #[test]
    fn test_empty_list() {
        assert!(daily_forecast(&[]).is_empty());
    }
}
