pub mod queries;

use crate::analyzer::category::Category;
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub category: Category,
    pub expected_time: f64,
    pub actual_time: f64,
    pub date: NaiveDate,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRow {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_id: i64,
    pub category: Category,
    pub target_hours: f64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub title: String,
    pub category: Category,
    pub expected_time: f64,
    pub actual_time: f64,
    pub date: NaiveDate,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub expected_time: Option<f64>,
    pub actual_time: Option<f64>,
    pub date: Option<NaiveDate>,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite DB")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let database = Self {
            conn: Mutex::new(conn),
        };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                conn.execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?
            .close()
            .map_err(|(_, error)| error)
            .context("Failed to close SQLite DB")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    pub fn insert_user(&self, name: &str, email: &str, password_hash: &str) -> Result<UserRow> {
        let created_at = Utc::now().timestamp();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, email, password_hash, created_at],
        )
        .context("Failed to insert user")?;

        Ok(UserRow {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    /// True when `error` comes from a UNIQUE or other constraint failure,
    /// e.g. a second `insert_user` for an email that already exists.
    pub fn is_constraint_violation(error: &anyhow::Error) -> bool {
        matches!(
            error.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation
        )
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.conn()?
            .query_row(
                "SELECT id, name, email, password_hash, created_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by email")
    }

    pub fn user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.conn()?
            .query_row(
                "SELECT id, name, email, password_hash, created_at FROM users WHERE id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by id")
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT id, name, email, password_hash, created_at FROM users ORDER BY id ASC",
        )?;

        let rows = statement
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list users")?;

        Ok(rows)
    }

    pub fn insert_activity(&self, user_id: i64, activity: &NewActivity) -> Result<ActivityRow> {
        let created_at = Utc::now().timestamp();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO activities (user_id, title, category, expected_time, actual_time, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                &activity.title,
                activity.category.as_str(),
                activity.expected_time,
                activity.actual_time,
                activity.date,
                created_at
            ],
        )
        .context("Failed to insert activity")?;

        Ok(ActivityRow {
            id: conn.last_insert_rowid(),
            user_id,
            title: activity.title.clone(),
            category: activity.category,
            expected_time: activity.expected_time,
            actual_time: activity.actual_time,
            date: activity.date,
            created_at,
        })
    }

    /// All activities of a user, optionally restricted to one calendar day.
    pub fn activities_for_user(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<ActivityRow>> {
        let conn = self.conn()?;

        let rows = match date {
            Some(date) => {
                let mut statement = conn.prepare(&format!(
                    "{} WHERE user_id = ?1 AND date = ?2 ORDER BY date ASC, id ASC",
                    queries::SELECT_ACTIVITY_COLUMNS
                ))?;
                let rows = statement
                    .query_map(params![user_id, date], activity_from_row)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }
            None => {
                let mut statement = conn.prepare(&format!(
                    "{} WHERE user_id = ?1 ORDER BY date ASC, id ASC",
                    queries::SELECT_ACTIVITY_COLUMNS
                ))?;
                let rows = statement
                    .query_map(params![user_id], activity_from_row)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }
        }
        .context("Failed to query activities")?;

        Ok(rows)
    }

    /// Activities dated on or after `from`. Dates are stored as `YYYY-MM-DD`
    /// text so the string comparison is chronological.
    pub fn activities_since(&self, user_id: i64, from: NaiveDate) -> Result<Vec<ActivityRow>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "{} WHERE user_id = ?1 AND date >= ?2 ORDER BY date ASC, id ASC",
            queries::SELECT_ACTIVITY_COLUMNS
        ))?;

        let rows = statement
            .query_map(params![user_id, from], activity_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query recent activities")?;

        Ok(rows)
    }

    /// Returns false when the activity does not exist or belongs to another user.
    pub fn update_activity(&self, user_id: i64, id: i64, patch: &ActivityPatch) -> Result<bool> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE activities SET
                   title = COALESCE(?3, title),
                   category = COALESCE(?4, category),
                   expected_time = COALESCE(?5, expected_time),
                   actual_time = COALESCE(?6, actual_time),
                   date = COALESCE(?7, date)
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    id,
                    user_id,
                    patch.title.as_deref(),
                    patch.category.map(Category::as_str),
                    patch.expected_time,
                    patch.actual_time,
                    patch.date
                ],
            )
            .context("Failed to update activity")?;

        Ok(updated > 0)
    }

    pub fn delete_activity(&self, user_id: i64, id: i64) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM activities WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .context("Failed to delete activity")?;

        Ok(deleted > 0)
    }

    pub fn upsert_goal(&self, user_id: i64, category: Category, target_hours: f64) -> Result<GoalRow> {
        let updated_at = Utc::now().timestamp();
        self.conn()?
            .query_row(
                "INSERT INTO goals (user_id, category, target_hours, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, category)
                 DO UPDATE SET target_hours=excluded.target_hours, updated_at=excluded.updated_at
                 RETURNING id, user_id, category, target_hours, updated_at",
                params![user_id, category.as_str(), target_hours, updated_at],
                goal_from_row,
            )
            .context("Failed to upsert goal")
    }

    pub fn goals_for_user(&self, user_id: i64) -> Result<Vec<GoalRow>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT id, user_id, category, target_hours, updated_at
             FROM goals
             WHERE user_id = ?1
             ORDER BY category ASC",
        )?;

        let rows = statement
            .query_map(params![user_id], goal_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query goals")?;

        Ok(rows)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityRow> {
    Ok(ActivityRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        category: category_column(row, 3)?,
        expected_time: row.get(4)?,
        actual_time: row.get(5)?,
        date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<GoalRow> {
    Ok(GoalRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: category_column(row, 2)?,
        target_hours: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn category_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Category> {
    row.get::<_, String>(index)?
        .parse::<Category>()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error.into()))
}
