use crate::columns::is_non_negative_metric;
use crate::error::{ForecastBuilderError, Result};
use crate::normalize::MetricSeries;
use chrono::{Datelike, Duration, NaiveDate};
use log::{error, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Minimum observations required before a metric is forecast at all.
pub const MIN_OBSERVATIONS: usize = 5;

/// Weekly seasonality needs at least two full weeks of data.
const WEEKLY_MIN_OBSERVATIONS: usize = 14;

/// Yearly seasonality needs at least a year of observed span.
const YEARLY_MIN_SPAN_DAYS: i64 = 365;

/// Distinct budget values below which the regression is flagged as
/// low-confidence. The fit still runs on the real data; no observations are
/// synthesized.
const MIN_DISTINCT_BUDGET_VALUES: usize = 3;

/// z-score for the ~95% uncertainty band.
const BOUND_Z: f64 = 1.96;

/// Counterfactual baseline magnitudes below this produce a neutral default
/// instead of a near-zero division.
const ELASTICITY_EPSILON: f64 = 1e-9;

/// Coefficients inside this band are reported as having no clear direction.
const NEUTRAL_ELASTICITY: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
    Neutral,
}

/// Budget sensitivity of one metric: the ratio of percentage metric change
/// to percentage budget change, estimated by counterfactual re-prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Elasticity {
    pub coefficient: f64,
    pub baseline_average: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonPoint {
    pub date: NaiveDate,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub metric_name: String,
    pub horizon_points: Vec<HorizonPoint>,
    pub elasticity: Option<Elasticity>,
}

/// One metric's forecast inputs: the historical series, an optional spend
/// regressor aligned by date, the horizon, and an optional projected daily
/// budget for the future periods.
#[derive(Debug, Clone)]
pub struct ForecastRequest<'a> {
    pub series: &'a MetricSeries,
    pub budget: Option<&'a MetricSeries>,
    pub horizon: usize,
    pub projected_daily_budget: Option<f64>,
}

/// Additive model fit over the cleaned series: intercept + linear trend +
/// optional day-of-week dummies + optional yearly Fourier harmonics +
/// optional centered budget-ratio regressor.
struct SeasonalRegression {
    origin: NaiveDate,
    weekly: bool,
    yearly: bool,
    with_budget: bool,
    coefficients: DVector<f64>,
    residual_std: f64,
}

impl SeasonalRegression {
    fn feature_count(weekly: bool, yearly: bool, with_budget: bool) -> usize {
        2 + if weekly { 6 } else { 0 } + if yearly { 4 } else { 0 } + if with_budget { 1 } else { 0 }
    }

    fn features(
        origin: NaiveDate,
        weekly: bool,
        yearly: bool,
        with_budget: bool,
        date: NaiveDate,
        budget_centered: f64,
    ) -> Vec<f64> {
        let mut row = Vec::with_capacity(Self::feature_count(weekly, yearly, with_budget));
        row.push(1.0);
        row.push((date - origin).num_days() as f64);

        if weekly {
            // Six dummies, Sunday as the baseline.
            let weekday = date.weekday().num_days_from_monday() as usize;
            for slot in 0..6 {
                row.push(if weekday == slot { 1.0 } else { 0.0 });
            }
        }

        if yearly {
            let angle = 2.0 * PI * date.ordinal() as f64 / 365.25;
            for k in 1..=2 {
                row.push((k as f64 * angle).sin());
                row.push((k as f64 * angle).cos());
            }
        }

        if with_budget {
            row.push(budget_centered);
        }

        row
    }

    fn fit(
        dates: &[NaiveDate],
        values: &[f64],
        budget_centered: Option<&[f64]>,
    ) -> Option<Self> {
        let n = dates.len();
        let origin = *dates.first()?;
        let span_days = (*dates.last()? - origin).num_days();

        let weekly = n >= WEEKLY_MIN_OBSERVATIONS;
        let yearly = span_days >= YEARLY_MIN_SPAN_DAYS;
        let with_budget = budget_centered.is_some();
        let p = Self::feature_count(weekly, yearly, with_budget);

        let mut design = DMatrix::<f64>::zeros(n, p);
        for (i, date) in dates.iter().enumerate() {
            let b = budget_centered.map(|b| b[i]).unwrap_or(0.0);
            let row = Self::features(origin, weekly, yearly, with_budget, *date, b);
            for (j, value) in row.into_iter().enumerate() {
                design[(i, j)] = value;
            }
        }
        let y = DVector::from_column_slice(values);

        let coefficients = solve_least_squares(&design, &y)?;

        let residuals = &y - &design * &coefficients;
        let dof = n.saturating_sub(p).max(1);
        let residual_std = (residuals.norm_squared() / dof as f64).sqrt();

        Some(Self {
            origin,
            weekly,
            yearly,
            with_budget,
            coefficients,
            residual_std,
        })
    }

    fn predict(&self, date: NaiveDate, budget_centered: f64) -> f64 {
        let row = Self::features(
            self.origin,
            self.weekly,
            self.yearly,
            self.with_budget,
            date,
            budget_centered,
        );
        row.iter()
            .zip(self.coefficients.iter())
            .map(|(x, beta)| x * beta)
            .sum()
    }

    fn budget_coefficient_index(&self) -> Option<usize> {
        if self.with_budget {
            Some(self.coefficients.len() - 1)
        } else {
            None
        }
    }

    /// Clamp the budget coefficient so the implied effect of a +100% budget
    /// move never exceeds the metric's historical baseline average. Low
    /// budget variance otherwise produces implausible extrapolations.
    fn cap_budget_coefficient(&mut self, baseline_average: f64) {
        if let Some(idx) = self.budget_coefficient_index() {
            let cap = baseline_average.abs();
            let beta = self.coefficients[idx];
            if beta.abs() > cap {
                warn!(
                    "Capping budget coefficient {:.4} to +/-{:.4}",
                    beta, cap
                );
                self.coefficients[idx] = cap * beta.signum();
            }
        }
    }
}

/// SVD least-squares solve with a ladder of tolerances for near-singular
/// design matrices (collinear dummies, constant regressors).
fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }
    None
}

/// Join the metric series against the budget regressor by date, dropping
/// zero-spend rows: auction systems record zero-spend days that would
/// corrupt the regression.
fn join_budget(
    series: &MetricSeries,
    budget: &MetricSeries,
) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
    let by_date: BTreeMap<NaiveDate, f64> = budget
        .dates
        .iter()
        .copied()
        .zip(budget.values.iter().copied())
        .collect();

    let mut dates = Vec::new();
    let mut values = Vec::new();
    let mut spend = Vec::new();
    for (date, value) in series.dates.iter().zip(series.values.iter()) {
        match by_date.get(date) {
            Some(b) if *b != 0.0 => {
                dates.push(*date);
                values.push(*value);
                spend.push(*b);
            }
            _ => {}
        }
    }
    (dates, values, spend)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    sorted.len()
}

fn direction_of(coefficient: f64) -> Direction {
    if coefficient > NEUTRAL_ELASTICITY {
        Direction::Positive
    } else if coefficient < -NEUTRAL_ELASTICITY {
        Direction::Negative
    } else {
        Direction::Neutral
    }
}

/// Forecast a single metric. Returns `Ok(None)` for the normal
/// insufficient-data outcome; `Err` only for fitting failures, which the
/// batch API downgrades to a logged skip.
pub fn forecast_metric(request: &ForecastRequest<'_>) -> Result<Option<ForecastResult>> {
    let series = request.series;

    // Null rows were already dropped when the series was projected.
    let (dates, values, spend) = match request.budget {
        Some(budget) => {
            let (dates, values, spend) = join_budget(series, budget);
            (dates, values, Some(spend))
        }
        None => (series.dates.clone(), series.values.clone(), None),
    };

    if dates.len() < MIN_OBSERVATIONS {
        warn!(
            "Skipping metric {}: {} usable observations (minimum {})",
            series.name,
            dates.len(),
            MIN_OBSERVATIONS
        );
        return Ok(None);
    }

    let baseline_average = mean(&values);

    let (budget_centered, budget_mean) = match &spend {
        Some(spend) => {
            if distinct_count(spend) < MIN_DISTINCT_BUDGET_VALUES {
                warn!(
                    "Budget history for {} has fewer than {} distinct values; \
                     elasticity estimate will be low-confidence",
                    series.name, MIN_DISTINCT_BUDGET_VALUES
                );
            }
            let budget_mean = mean(spend);
            let centered: Vec<f64> = spend.iter().map(|b| b / budget_mean - 1.0).collect();
            (Some(centered), budget_mean)
        }
        None => (None, 0.0),
    };

    let mut model = SeasonalRegression::fit(&dates, &values, budget_centered.as_deref())
        .ok_or_else(|| ForecastBuilderError::FittingError {
            metric: series.name.clone(),
            details: "least-squares solve failed".to_string(),
        })?;

    model.cap_budget_coefficient(baseline_average);

    // Future regressor value: the projected budget as a centered ratio of
    // the historical mean, or the historical mean itself (ratio 1.0).
    let future_budget_centered = match (&spend, request.projected_daily_budget) {
        (Some(_), Some(projected)) if budget_mean != 0.0 => projected / budget_mean - 1.0,
        _ => 0.0,
    };

    let last_date = *dates.last().expect("non-empty series");
    let clamp = is_non_negative_metric(&series.name);

    let mut horizon_points = Vec::with_capacity(request.horizon);
    for step in 1..=request.horizon as i64 {
        let date = last_date + Duration::days(step);
        let estimate = model.predict(date, future_budget_centered);
        let lower = estimate - BOUND_Z * model.residual_std;
        let upper = estimate + BOUND_Z * model.residual_std;
        let (estimate, lower) = if clamp {
            (estimate.max(0.0), lower.max(0.0))
        } else {
            (estimate, lower)
        };
        horizon_points.push(HorizonPoint {
            date,
            estimate,
            lower,
            upper,
        });
    }

    let elasticity = spend.as_ref().map(|_| {
        let probe_date = last_date + Duration::days(1);
        let baseline = model.predict(probe_date, 0.0);
        let increased = model.predict(probe_date, 0.1);

        if baseline.abs() < ELASTICITY_EPSILON {
            Elasticity {
                coefficient: 1.0,
                baseline_average,
                direction: Direction::Neutral,
            }
        } else {
            let coefficient = ((increased - baseline) / baseline) / 0.1;
            Elasticity {
                coefficient,
                baseline_average,
                direction: direction_of(coefficient),
            }
        }
    });

    Ok(Some(ForecastResult {
        metric_name: series.name.clone(),
        horizon_points,
        elasticity,
    }))
}

/// Forecast a batch of metrics. One metric's failure never aborts the
/// batch: fitting errors are logged and that metric is omitted.
pub fn forecast_metrics(
    series: &[MetricSeries],
    budget: Option<&MetricSeries>,
    horizon: usize,
    projected_daily_budget: Option<f64>,
) -> Vec<ForecastResult> {
    let mut results = Vec::new();
    for metric in series {
        let request = ForecastRequest {
            series: metric,
            budget,
            horizon,
            projected_daily_budget,
        };
        match forecast_metric(&request) {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => error!("Error forecasting {}: {}", metric.name, e),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series_from(name: &str, start: NaiveDate, values: &[f64]) -> MetricSeries {
        MetricSeries {
            name: name.to_string(),
            dates: (0..values.len() as i64)
                .map(|i| start + Duration::days(i))
                .collect(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_short_series_produces_no_result() {
        let series = series_from("Clicks", date(2024, 1, 1), &[1.0, 2.0, 3.0, 4.0]);
        let request = ForecastRequest {
            series: &series,
            budget: None,
            horizon: 7,
            projected_daily_budget: None,
        };
        assert!(forecast_metric(&request).unwrap().is_none());
    }

    #[test]
    fn test_trend_is_projected_forward() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + 3.0 * i as f64).collect();
        let series = series_from("Clicks", date(2024, 1, 1), &values);
        let request = ForecastRequest {
            series: &series,
            budget: None,
            horizon: 7,
            projected_daily_budget: None,
        };
        let result = forecast_metric(&request).unwrap().unwrap();
        assert_eq!(result.horizon_points.len(), 7);

        // Dates continue past the last observation, one day at a time.
        assert_eq!(result.horizon_points[0].date, date(2024, 1, 31));
        assert_eq!(result.horizon_points[6].date, date(2024, 2, 6));

        // A clean linear trend extrapolates almost exactly.
        let first = &result.horizon_points[0];
        assert!((first.estimate - 190.0).abs() < 1.0);
        assert!(first.lower <= first.estimate && first.estimate <= first.upper);

        // No budget regressor, no elasticity.
        assert!(result.elasticity.is_none());
    }

    // Spend pattern with period 10 so it is not collinear with the weekly
    // dummies or the trend column.
    fn varied_budget(n: usize) -> Vec<f64> {
        const PATTERN: [f64; 10] = [
            55.0, 120.0, 80.0, 150.0, 60.0, 130.0, 90.0, 140.0, 70.0, 110.0,
        ];
        (0..n).map(|i| PATTERN[i % PATTERN.len()]).collect()
    }

    #[test]
    fn test_positive_elasticity_for_budget_driven_metric() {
        // Metric is 2x budget plus small noise: elasticity must be positive.
        let start = date(2024, 1, 1);
        let budget_values = varied_budget(40);
        let metric_values: Vec<f64> = budget_values
            .iter()
            .enumerate()
            .map(|(i, b)| 2.0 * b + if i % 2 == 0 { 1.5 } else { -1.5 })
            .collect();
        let budget = series_from("Cost", start, &budget_values);
        let series = series_from("Conversions", start, &metric_values);

        let request = ForecastRequest {
            series: &series,
            budget: Some(&budget),
            horizon: 5,
            projected_daily_budget: None,
        };
        let result = forecast_metric(&request).unwrap().unwrap();
        let elasticity = result.elasticity.unwrap();
        assert!(elasticity.coefficient > 0.0, "got {}", elasticity.coefficient);
        assert_eq!(elasticity.direction, Direction::Positive);
    }

    #[test]
    fn test_negative_elasticity_for_inverse_relationship() {
        let start = date(2024, 1, 1);
        let budget_values = varied_budget(40);
        let metric_values: Vec<f64> = budget_values.iter().map(|b| 500.0 - b).collect();
        let budget = series_from("Cost", start, &budget_values);
        let series = series_from("CPA", start, &metric_values);

        let request = ForecastRequest {
            series: &series,
            budget: Some(&budget),
            horizon: 5,
            projected_daily_budget: None,
        };
        let result = forecast_metric(&request).unwrap().unwrap();
        let elasticity = result.elasticity.unwrap();
        assert!(elasticity.coefficient < 0.0, "got {}", elasticity.coefficient);
        assert_eq!(elasticity.direction, Direction::Negative);
    }

    #[test]
    fn test_flat_budget_yields_neutral_elasticity() {
        let start = date(2024, 1, 1);
        let budget_values = vec![100.0; 40];
        let metric_values: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let budget = series_from("Cost", start, &budget_values);
        let series = series_from("Clicks", start, &metric_values);

        let request = ForecastRequest {
            series: &series,
            budget: Some(&budget),
            horizon: 14,
            projected_daily_budget: None,
        };
        let result = forecast_metric(&request).unwrap().unwrap();
        assert_eq!(result.horizon_points.len(), 14);
        let elasticity = result.elasticity.unwrap();
        assert_eq!(elasticity.direction, Direction::Neutral);
        assert!(elasticity.coefficient.abs() < NEUTRAL_ELASTICITY);
    }

    #[test]
    fn test_zero_budget_days_are_dropped() {
        let start = date(2024, 1, 1);
        let mut budget_values: Vec<f64> =
            (0..20).map(|i| 50.0 + 10.0 * (i % 5) as f64).collect();
        budget_values[3] = 0.0;
        budget_values[11] = 0.0;
        let metric_values: Vec<f64> = (0..20).map(|i| 30.0 + i as f64).collect();
        let budget = series_from("Cost", start, &budget_values);
        let series = series_from("Clicks", start, &metric_values);

        let (dates, values, spend) = join_budget(&series, &budget);
        assert_eq!(dates.len(), 18);
        assert_eq!(values.len(), 18);
        assert!(spend.iter().all(|b| *b != 0.0));
    }

    #[test]
    fn test_non_negative_metric_is_clamped() {
        // Steep downward trend would cross zero inside the horizon.
        let values: Vec<f64> = (0..20).map(|i| 40.0 - 4.0 * i as f64).collect();
        let series = series_from("Website purchases", date(2024, 1, 1), &values);
        let request = ForecastRequest {
            series: &series,
            budget: None,
            horizon: 10,
            projected_daily_budget: None,
        };
        let result = forecast_metric(&request).unwrap().unwrap();
        for point in &result.horizon_points {
            assert!(point.estimate >= 0.0);
            assert!(point.lower >= 0.0);
        }
    }

    #[test]
    fn test_batch_skips_failures_without_aborting() {
        let good = series_from(
            "Clicks",
            date(2024, 1, 1),
            &(0..20).map(|i| 10.0 + i as f64).collect::<Vec<_>>(),
        );
        let short = series_from("Conversions", date(2024, 1, 1), &[1.0, 2.0]);
        let results = forecast_metrics(&[good, short], None, 5, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metric_name, "Clicks");
    }

    #[test]
    fn test_budget_coefficient_cap() {
        let mut model = SeasonalRegression {
            origin: date(2024, 1, 1),
            weekly: false,
            yearly: false,
            with_budget: true,
            coefficients: DVector::from_column_slice(&[10.0, 0.5, 800.0]),
            residual_std: 1.0,
        };
        model.cap_budget_coefficient(120.0);
        assert_eq!(model.coefficients[2], 120.0);

        model.coefficients[2] = -800.0;
        model.cap_budget_coefficient(120.0);
        assert_eq!(model.coefficients[2], -120.0);
    }
}
