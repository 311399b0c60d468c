pub mod category;
pub mod metrics;
pub mod report;
pub mod trends;

use crate::analyzer::category::Category;
use crate::analyzer::metrics::InsightsReport;
use crate::analyzer::trends::{Analytics, WEEK_DAYS};
use crate::db::{Database, GoalRow};
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

pub fn insights_for_user(
    database: &Database,
    user_id: i64,
    date: Option<NaiveDate>,
) -> Result<InsightsReport> {
    let activities = database.activities_for_user(user_id, date)?;
    Ok(metrics::summarize(&activities))
}

pub fn analytics_for_user(database: &Database, user_id: i64, today: NaiveDate) -> Result<Analytics> {
    let activities = database.activities_for_user(user_id, None)?;
    Ok(trends::analyze(&activities, today))
}

/// First day of the trailing week shared by the digest and goal progress.
pub fn trailing_week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(WEEK_DAYS)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub category: Category,
    pub target_hours: f64,
    pub actual_hours: f64,
    pub percent: f64,
}

pub fn goal_progress(goals: &[GoalRow], recent_hours: &HashMap<Category, f64>) -> Vec<GoalProgress> {
    goals
        .iter()
        .map(|goal| {
            let actual_hours = recent_hours.get(&goal.category).copied().unwrap_or_default();
            let percent = if goal.target_hours > 0.0 {
                (actual_hours / goal.target_hours * 100.0).min(100.0).round()
            } else {
                0.0
            };

            GoalProgress {
                category: goal.category,
                target_hours: goal.target_hours,
                actual_hours,
                percent,
            }
        })
        .collect()
}

pub fn goal_progress_for_user(
    database: &Database,
    user_id: i64,
    today: NaiveDate,
) -> Result<Vec<GoalProgress>> {
    let goals = database.goals_for_user(user_id)?;
    let recent_hours = database
        .activities_since(user_id, trailing_week_start(today))?
        .into_iter()
        .fold(HashMap::new(), |mut acc, activity| {
            *acc.entry(activity.category).or_insert(0.0) += activity.actual_time;
            acc
        });

    Ok(goal_progress(&goals, &recent_hours))
}
