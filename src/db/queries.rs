pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  name          TEXT NOT NULL,
  email         TEXT NOT NULL,
  password_hash TEXT NOT NULL,
  created_at    INTEGER NOT NULL
);
"#;

pub const CREATE_ACTIVITIES: &str = r#"
CREATE TABLE IF NOT EXISTS activities (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id       INTEGER NOT NULL REFERENCES users(id),
  title         TEXT NOT NULL,
  category      TEXT NOT NULL,
  expected_time REAL NOT NULL,
  actual_time   REAL NOT NULL,
  date          TEXT NOT NULL,
  created_at    INTEGER NOT NULL
);
"#;

pub const CREATE_GOALS: &str = r#"
CREATE TABLE IF NOT EXISTS goals (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id      INTEGER NOT NULL REFERENCES users(id),
  category     TEXT NOT NULL,
  target_hours REAL NOT NULL,
  updated_at   INTEGER NOT NULL
);
"#;

pub const INDEX_USERS_EMAIL: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email);";

pub const INDEX_ACTIVITIES_USER_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_activities_user_date ON activities(user_id, date);";

pub const INDEX_GOALS_USER_CATEGORY: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_goals_user_category ON goals(user_id, category);";

pub const SELECT_ACTIVITY_COLUMNS: &str =
    "SELECT id, user_id, title, category, expected_time, actual_time, date, created_at FROM activities";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_USERS,
        CREATE_ACTIVITIES,
        CREATE_GOALS,
        INDEX_USERS_EMAIL,
        INDEX_ACTIVITIES_USER_DATE,
        INDEX_GOALS_USER_CATEGORY,
    ]
}
