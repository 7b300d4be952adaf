//! Locates the horizon-bucket forecast inside each provider's payload.
//!
//! Both extractors fail closed: any missing path, a missing value, or a time
//! index without an exact match yields `None`.

use chrono_tz::Tz;

use crate::services::upstream::{ProviderAPayload, ProviderBPayload};
use crate::time::Bucket;

/// Provider A indexes hours by epoch seconds. Runs and their hours are
/// scanned in payload order; the first exact timestamp match wins.
pub fn align_provider_a(payload: &ProviderAPayload, target: Bucket) -> Option<f64> {
    let target_ts = target.epoch_seconds();
    let hour = payload
        .forecasts
        .iter()
        .flat_map(|run| run.hours.iter())
        .find(|hour| hour.hour_ts == Some(target_ts))?;
    hour.temp.filter(|value| value.is_finite())
}

/// Provider B indexes hours by `YYYY-MM-DDTHH:00` strings in `tz`.
pub fn align_provider_b(payload: &ProviderBPayload, target: Bucket, tz: Tz) -> Option<f64> {
    let hourly = payload.hourly.as_ref()?;
    if let Some(declared) = payload.timezone.as_deref() {
        if declared != tz.name() {
            tracing::warn!(
                declared,
                expected = tz.name(),
                "provider B payload timezone differs from configured timezone"
            );
        }
    }
    let key = target.local_hour_key(tz);
    let idx = hourly.time.iter().position(|time| time == &key)?;
    hourly
        .temperature_2m
        .get(idx)
        .copied()
        .flatten()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::upstream::{ProviderAHour, ProviderARun, ProviderBHourly};
    use chrono::{TimeZone, Utc};

    fn target() -> Bucket {
        Bucket::floor(
            Utc.with_ymd_and_hms(2025, 10, 3, 6, 0, 0)
                .single()
                .expect("utc"),
        )
    }

    fn hour(ts: i64, temp: f64) -> ProviderAHour {
        ProviderAHour {
            hour_ts: Some(ts),
            temp: Some(temp),
        }
    }

    #[test]
    fn provider_a_matches_exact_epoch_across_runs() {
        let ts = target().epoch_seconds();
        let payload = ProviderAPayload {
            forecasts: vec![
                ProviderARun {
                    date: Some("2025-10-02".to_string()),
                    hours: vec![hour(ts - 7200, 1.0), hour(ts - 3600, 2.0)],
                },
                ProviderARun {
                    date: Some("2025-10-03".to_string()),
                    hours: vec![hour(ts, 7.5), hour(ts + 3600, 8.0)],
                },
            ],
        };
        assert_eq!(align_provider_a(&payload, target()), Some(7.5));
    }

    #[test]
    fn provider_a_first_match_wins() {
        let ts = target().epoch_seconds();
        let payload = ProviderAPayload {
            forecasts: vec![
                ProviderARun {
                    date: None,
                    hours: vec![hour(ts, 3.0)],
                },
                ProviderARun {
                    date: None,
                    hours: vec![hour(ts, 4.0)],
                },
            ],
        };
        assert_eq!(align_provider_a(&payload, target()), Some(3.0));
    }

    #[test]
    fn provider_a_never_returns_a_neighbouring_hour() {
        let ts = target().epoch_seconds();
        let payload = ProviderAPayload {
            forecasts: vec![ProviderARun {
                date: None,
                hours: vec![hour(ts - 3600, 5.0), hour(ts + 3600, 6.0), hour(ts + 1, 9.0)],
            }],
        };
        assert_eq!(align_provider_a(&payload, target()), None);
        assert_eq!(align_provider_a(&ProviderAPayload::default(), target()), None);
    }

    #[test]
    fn provider_a_match_without_temperature_is_null() {
        let payload = ProviderAPayload {
            forecasts: vec![ProviderARun {
                date: None,
                hours: vec![ProviderAHour {
                    hour_ts: Some(target().epoch_seconds()),
                    temp: None,
                }],
            }],
        };
        assert_eq!(align_provider_a(&payload, target()), None);
    }

    fn provider_b(times: &[&str], temps: &[Option<f64>]) -> ProviderBPayload {
        ProviderBPayload {
            timezone: Some("Asia/Tokyo".to_string()),
            hourly: Some(ProviderBHourly {
                time: times.iter().map(|t| t.to_string()).collect(),
                temperature_2m: temps.to_vec(),
            }),
        }
    }

    #[test]
    fn provider_b_matches_local_hour_string() {
        // 06:00 UTC is 15:00 in Tokyo.
        let payload = provider_b(
            &["2025-10-03T14:00", "2025-10-03T15:00", "2025-10-03T16:00"],
            &[Some(20.0), Some(21.5), Some(22.0)],
        );
        assert_eq!(
            align_provider_b(&payload, target(), chrono_tz::Asia::Tokyo),
            Some(21.5)
        );
    }

    #[test]
    fn provider_b_utc_rendered_key_does_not_match_local_index() {
        let payload = provider_b(&["2025-10-03T06:00"], &[Some(11.0)]);
        assert_eq!(
            align_provider_b(&payload, target(), chrono_tz::Asia::Tokyo),
            None
        );
    }

    #[test]
    fn provider_b_fails_closed_on_short_or_null_values() {
        let payload = provider_b(&["2025-10-03T14:00", "2025-10-03T15:00"], &[Some(1.0)]);
        assert_eq!(
            align_provider_b(&payload, target(), chrono_tz::Asia::Tokyo),
            None
        );

        let payload = provider_b(&["2025-10-03T15:00"], &[None]);
        assert_eq!(
            align_provider_b(&payload, target(), chrono_tz::Asia::Tokyo),
            None
        );

        assert_eq!(
            align_provider_b(
                &ProviderBPayload::default(),
                target(),
                chrono_tz::Asia::Tokyo
            ),
            None
        );
    }
}
