use crate::analyzer::category::Category;
use crate::analyzer::metrics::{efficiency_percent, round_to};
use crate::db::ActivityRow;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub activity_count: usize,
    pub total_actual: f64,
    pub total_expected: f64,
    pub efficiency: f64,
    pub categories: BTreeMap<Category, f64>,
}

/// Returns `None` when nothing was logged in the window; such users get no digest.
pub fn build_weekly_summary(
    activities: &[ActivityRow],
    from: NaiveDate,
    to: NaiveDate,
) -> Option<WeeklySummary> {
    if activities.is_empty() {
        return None;
    }

    let total_actual = activities
        .iter()
        .map(|activity| activity.actual_time)
        .sum::<f64>();
    let total_expected = activities
        .iter()
        .map(|activity| activity.expected_time)
        .sum::<f64>();

    let categories = activities.iter().fold(BTreeMap::new(), |mut acc, activity| {
        *acc.entry(activity.category).or_insert(0.0) += activity.actual_time;
        acc
    });

    Some(WeeklySummary {
        from,
        to,
        activity_count: activities.len(),
        total_actual,
        total_expected,
        efficiency: round_to(efficiency_percent(total_actual, total_expected), 1),
        categories,
    })
}

pub fn render_html(user_name: &str, summary: &WeeklySummary) -> String {
    let category_rows = summary
        .categories
        .iter()
        .map(|(category, hours)| {
            format!(
                "<li><strong>{}:</strong> {}</li>",
                escape_html(category.as_str()),
                format_hours(*hours)
            )
        })
        .collect::<Vec<_>>()
        .join("");

    format!(
        r#"<div style="font-family: sans-serif; color: #333; max-width: 600px; margin: auto; border: 1px solid #eee; padding: 20px; border-radius: 10px;">
  <h2 style="color: #6366f1;">DeepFocus Weekly Summary</h2>
  <p>Hi {name},</p>
  <p>Here is your productivity breakdown for {from} to {to}:</p>
  <div style="background: #f8fafc; padding: 15px; border-radius: 8px; margin: 20px 0;">
    <h3 style="margin-top: 0;">Overall Stats</h3>
    <p>Activities logged: <strong>{count}</strong></p>
    <p>Total Time Focused: <strong>{actual}</strong></p>
    <p>Time Planned: <strong>{expected}</strong></p>
    <p>Planning Efficiency: <strong>{efficiency:.1}%</strong></p>
  </div>
  <h3>Focus Distribution</h3>
  <ul>{category_rows}</ul>
  <p>Keep up the great work! Measuring your time is the first step toward mastering it.</p>
  <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
  <small style="color: #999;">Sent automatically by your DeepFocus Dashboard.</small>
</div>
"#,
        name = escape_html(user_name),
        from = summary.from.format("%Y-%m-%d"),
        to = summary.to.format("%Y-%m-%d"),
        count = summary.activity_count,
        actual = format_hours(summary.total_actual),
        expected = format_hours(summary.total_expected),
        efficiency = summary.efficiency,
        category_rows = category_rows,
    )
}

pub fn escape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#x27;"),
            _ => output.push(ch),
        }
    }
    output
}

fn format_hours(hours: f64) -> String {
    let total_minutes = (hours.max(0.0) * 60.0).round() as u64;
    let whole_hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if whole_hours > 0 {
        if minutes == 0 {
            format!("{whole_hours}h")
        } else {
            format!("{whole_hours}h {minutes}m")
        }
    } else {
        format!("{minutes}m")
    }
}
