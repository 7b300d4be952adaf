use serde::Serialize;

use crate::store::{ReadingField, ReadingRecord};

fn valid(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Mean absolute error of `field` against `actual` over records where both
/// are present and finite. `None` when no record qualifies.
pub fn compute_mae(records: &[ReadingRecord], field: ReadingField) -> Option<f64> {
    let (sum, count) = records
        .iter()
        .filter_map(|record| {
            let actual = valid(record.actual)?;
            let forecast = valid(field.get(record))?;
            Some((forecast - actual).abs())
        })
        .fold((0.0, 0usize), |(sum, count), err| (sum + err, count + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn paired_samples(records: &[ReadingRecord], field: ReadingField) -> usize {
    records
        .iter()
        .filter(|record| valid(record.actual).is_some() && valid(field.get(record)).is_some())
        .count()
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SourceAccuracy {
    pub source: String,
    pub mae: Option<f64>,
    pub samples: usize,
}

pub fn summarize(records: &[ReadingRecord]) -> Vec<SourceAccuracy> {
    [ReadingField::ForecastA, ReadingField::ForecastB]
        .into_iter()
        .map(|field| SourceAccuracy {
            source: field.label().to_string(),
            mae: compute_mae(records, field),
            samples: paired_samples(records, field),
        })
        .collect()
}

/// Returns a copy of `series` with interior gaps in `field` linearly
/// interpolated between the nearest valid neighbours. Leading and trailing
/// gaps are left as they are.
pub fn interpolate_gaps(series: &[ReadingRecord], field: ReadingField) -> Vec<ReadingRecord> {
    let values: Vec<Option<f64>> = series.iter().map(|r| valid(field.get(r))).collect();
    let mut result = series.to_vec();

    for (idx, record) in result.iter_mut().enumerate() {
        if values[idx].is_some() {
            continue;
        }
        let before = values[..idx]
            .iter()
            .rposition(Option::is_some)
            .and_then(|pos| values[pos].map(|v| (pos, v)));
        let after = values[idx + 1..]
            .iter()
            .position(Option::is_some)
            .and_then(|offset| values[idx + 1 + offset].map(|v| (idx + 1 + offset, v)));

        if let (Some((prev_idx, prev)), Some((next_idx, next))) = (before, after) {
            let span = (next_idx - prev_idx) as f64;
            let offset = (idx - prev_idx) as f64;
            field.set(record, Some(prev + (next - prev) * offset / span));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Bucket;
    use chrono::{TimeZone, Utc};

    fn records(pairs: &[(Option<f64>, Option<f64>)]) -> Vec<ReadingRecord> {
        let start = Bucket::floor(
            Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0)
                .single()
                .expect("utc"),
        );
        pairs
            .iter()
            .enumerate()
            .map(|(idx, (actual, forecast_a))| {
                let mut record = ReadingRecord::empty(start.offset_hours(idx as i64));
                record.actual = *actual;
                record.forecast_a = *forecast_a;
                record
            })
            .collect()
    }

    fn actuals(series: &[ReadingRecord]) -> Vec<Option<f64>> {
        series.iter().map(|r| r.actual).collect()
    }

    #[test]
    fn mae_averages_absolute_errors() {
        let data = records(&[(Some(10.0), Some(11.0)), (Some(12.0), Some(10.0))]);
        assert_eq!(compute_mae(&data, ReadingField::ForecastA), Some(1.5));
        assert_eq!(paired_samples(&data, ReadingField::ForecastA), 2);
    }

    #[test]
    fn mae_skips_incomplete_and_non_finite_pairs() {
        let data = records(&[
            (Some(10.0), Some(12.0)),
            (None, Some(3.0)),
            (Some(4.0), None),
            (Some(f64::NAN), Some(1.0)),
            (Some(1.0), Some(f64::INFINITY)),
        ]);
        assert_eq!(compute_mae(&data, ReadingField::ForecastA), Some(2.0));
        assert_eq!(paired_samples(&data, ReadingField::ForecastA), 1);
    }

    #[test]
    fn mae_without_pairs_is_none() {
        let data = records(&[(Some(1.0), None), (None, Some(2.0))]);
        assert_eq!(compute_mae(&data, ReadingField::ForecastA), None);
        assert_eq!(compute_mae(&[], ReadingField::ForecastB), None);
    }

    #[test]
    fn summary_reports_both_sources() {
        let mut data = records(&[(Some(10.0), Some(11.0))]);
        data[0].forecast_b = Some(7.0);
        let summary = summarize(&data);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].source, "forecast_A");
        assert_eq!(summary[0].mae, Some(1.0));
        assert_eq!(summary[1].source, "forecast_B");
        assert_eq!(summary[1].mae, Some(3.0));
    }

    #[test]
    fn fills_wide_interior_gap() {
        let data = records(&[(Some(1.0), None), (None, None), (None, None), (Some(4.0), None)]);
        let filled = interpolate_gaps(&data, ReadingField::Actual);
        assert_eq!(actuals(&filled), vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        assert_eq!(actuals(&data)[1], None);
    }

    #[test]
    fn leaves_leading_and_trailing_gaps() {
        let data = records(&[(None, None), (Some(2.0), None), (Some(3.0), None)]);
        let filled = interpolate_gaps(&data, ReadingField::Actual);
        assert_eq!(actuals(&filled), vec![None, Some(2.0), Some(3.0)]);

        let data = records(&[(Some(2.0), None), (None, None)]);
        let filled = interpolate_gaps(&data, ReadingField::Actual);
        assert_eq!(actuals(&filled), vec![Some(2.0), None]);
    }

    #[test]
    fn non_finite_values_are_gaps() {
        let data = records(&[(Some(0.0), None), (Some(f64::NAN), None), (Some(10.0), None)]);
        let filled = interpolate_gaps(&data, ReadingField::Actual);
        assert_eq!(actuals(&filled), vec![Some(0.0), Some(5.0), Some(10.0)]);
    }

    #[test]
    fn interpolation_is_per_field() {
        let data = records(&[
            (Some(1.0), Some(10.0)),
            (None, None),
            (Some(3.0), Some(30.0)),
        ]);
        let filled = interpolate_gaps(&data, ReadingField::ForecastA);
        assert_eq!(filled[1].forecast_a, Some(20.0));
        assert_eq!(filled[1].actual, None);
    }
}
