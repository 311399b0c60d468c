use crate::analyzer::category::Category;
use crate::analyzer::metrics::round_to;
use crate::db::ActivityRow;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

pub const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPoint {
    pub date: NaiveDate,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSlice {
    pub category: Category,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrend {
    pub current_week: f64,
    pub previous_week: f64,
    pub older_total: f64,
    pub trend_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub heatmap: Vec<HeatmapPoint>,
    pub distribution: Vec<DistributionSlice>,
    pub trends: WeeklyTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekBucket {
    Current,
    Previous,
    Older,
}

/// Cutoffs are `today - 7` and `today - 14`; a date equal to a cutoff falls on
/// the more recent side.
pub fn week_bucket(date: NaiveDate, today: NaiveDate) -> WeekBucket {
    let current_from = today - Duration::days(WEEK_DAYS);
    let previous_from = today - Duration::days(WEEK_DAYS * 2);

    if date >= current_from {
        WeekBucket::Current
    } else if date >= previous_from {
        WeekBucket::Previous
    } else {
        WeekBucket::Older
    }
}

/// Percentage change from the previous week, 0 when the previous week is empty.
pub fn trend_percent(current_week: f64, previous_week: f64) -> f64 {
    if previous_week > 0.0 {
        (current_week - previous_week) / previous_week * 100.0
    } else {
        0.0
    }
}

#[derive(Default)]
struct Accumulator {
    by_date: BTreeMap<NaiveDate, f64>,
    by_category: BTreeMap<Category, f64>,
    current_week: f64,
    previous_week: f64,
    older_total: f64,
}

/// Heatmap, category distribution and week-over-week trend over the whole
/// history, computed in a single pass.
pub fn analyze(activities: &[ActivityRow], today: NaiveDate) -> Analytics {
    let totals = activities
        .iter()
        .fold(Accumulator::default(), |mut acc, activity| {
            *acc.by_date.entry(activity.date).or_insert(0.0) += activity.actual_time;
            *acc.by_category.entry(activity.category).or_insert(0.0) += activity.actual_time;

            match week_bucket(activity.date, today) {
                WeekBucket::Current => acc.current_week += activity.actual_time,
                WeekBucket::Previous => acc.previous_week += activity.actual_time,
                WeekBucket::Older => acc.older_total += activity.actual_time,
            }

            acc
        });

    let heatmap = totals
        .by_date
        .into_iter()
        .map(|(date, hours)| HeatmapPoint { date, hours })
        .collect::<Vec<_>>();
    let distribution = totals
        .by_category
        .into_iter()
        .map(|(category, hours)| DistributionSlice { category, hours })
        .collect::<Vec<_>>();

    Analytics {
        heatmap,
        distribution,
        trends: WeeklyTrend {
            current_week: totals.current_week,
            previous_week: totals.previous_week,
            older_total: totals.older_total,
            trend_percent: round_to(trend_percent(totals.current_week, totals.previous_week), 1),
        },
    }
}
