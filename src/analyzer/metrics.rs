use crate::analyzer::category::Category;
use crate::db::ActivityRow;
use serde::Serialize;
use std::collections::BTreeMap;

const OVER_EXTENDED_ABOVE: f64 = 110.0;
const UNDER_PRODUCTIVE_BELOW: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EfficiencyStatus {
    #[serde(rename = "Over-extended")]
    OverExtended,
    #[serde(rename = "Under-productive")]
    UnderProductive,
    #[serde(rename = "On-target")]
    OnTarget,
}

impl EfficiencyStatus {
    /// Both band edges (90 and 110) count as on target.
    pub fn classify(efficiency: f64) -> Self {
        if efficiency > OVER_EXTENDED_ABOVE {
            EfficiencyStatus::OverExtended
        } else if efficiency < UNDER_PRODUCTIVE_BELOW {
            EfficiencyStatus::UnderProductive
        } else {
            EfficiencyStatus::OnTarget
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub category: Category,
    pub expected: f64,
    pub actual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_expected: f64,
    pub total_actual: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub totals: Totals,
    pub status: EfficiencyStatus,
    pub category_stats: Vec<CategoryStat>,
}

/// Serialized as `{ "message": ..., "totals": null }` when nothing matched so
/// callers can tell "no activity" apart from "no deviation".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsightsReport {
    Data(Insights),
    Empty {
        message: &'static str,
        totals: Option<Totals>,
    },
}

impl InsightsReport {
    fn empty() -> Self {
        InsightsReport::Empty {
            message: "No activities found",
            totals: None,
        }
    }
}

/// Actual over expected as a percentage, 0 when nothing was planned.
///
/// Multiplying before dividing keeps exact ratios such as 110/100 at exactly
/// 110.0, which matters for the inclusive band edges.
pub fn efficiency_percent(total_actual: f64, total_expected: f64) -> f64 {
    if total_expected > 0.0 {
        total_actual * 100.0 / total_expected
    } else {
        0.0
    }
}

pub fn summarize(activities: &[ActivityRow]) -> InsightsReport {
    if activities.is_empty() {
        return InsightsReport::empty();
    }

    let by_category = activities
        .iter()
        .fold(BTreeMap::new(), |mut acc, activity| {
            let entry = acc.entry(activity.category).or_insert((0.0_f64, 0.0_f64));
            entry.0 += activity.expected_time;
            entry.1 += activity.actual_time;
            acc
        });

    let category_stats = by_category
        .into_iter()
        .map(|(category, (expected, actual))| CategoryStat {
            category,
            expected,
            actual,
        })
        .collect::<Vec<_>>();

    // Totals are folded from the partition so the two always agree exactly.
    let total_expected = category_stats.iter().map(|stat| stat.expected).sum::<f64>();
    let total_actual = category_stats.iter().map(|stat| stat.actual).sum::<f64>();
    let efficiency = efficiency_percent(total_actual, total_expected);

    InsightsReport::Data(Insights {
        totals: Totals {
            total_expected,
            total_actual,
            efficiency: round_to(efficiency, 2),
        },
        status: EfficiencyStatus::classify(efficiency),
        category_stats,
    })
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
