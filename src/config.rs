use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveTime, Weekday};
use dirs::home_dir;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use url::Url;

const APP_DIR: &str = ".DeepFocus";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_REPORT_TIME: &str = "21:00";
const DEFAULT_REPORT_WEEKDAY: &str = "sun";
const JWT_SECRET_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub jwt_secret: Option<String>,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub reports_enabled: bool,
    pub report_weekday: String,
    pub report_time: String,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("deepfocus.db"),
            api_host: "127.0.0.1".to_string(),
            api_port: 5000,
            jwt_secret: None,
            token_ttl_days: 30,
            bcrypt_cost: 10,
            reports_enabled: true,
            report_weekday: DEFAULT_REPORT_WEEKDAY.to_string(),
            report_time: DEFAULT_REPORT_TIME.to_string(),
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "DeepFocus Weekly <noreply@deepfocus.com>".to_string(),
            admin_token: None,
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    /// Creates the data directories and fills in a signing secret on first run.
    /// Returns true when the config changed and should be persisted.
    pub fn ensure_bootstrap_files(&mut self) -> Result<bool> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        if self
            .jwt_secret
            .as_deref()
            .is_some_and(|secret| !secret.trim().is_empty())
        {
            return Ok(false);
        }

        self.jwt_secret = Some(generate_secret());
        Ok(true)
    }

    pub fn jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .filter(|secret| !secret.trim().is_empty())
            .context("jwt_secret is not configured")
    }

    pub fn parse_report_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.report_time)
    }

    /// `None` means the digest goes out every day.
    pub fn parse_report_day(&self) -> Result<Option<Weekday>> {
        parse_report_day(&self.report_weekday)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "api_host" => {
                let host = value.trim();
                if host.is_empty() {
                    bail!("api_host must not be empty");
                }
                self.api_host = host.to_string();
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "jwt_secret" => {
                if value.trim().len() < 32 {
                    bail!("jwt_secret must be at least 32 characters");
                }
                self.jwt_secret = Some(value.trim().to_string());
            }
            "token_ttl_days" => {
                let days = value
                    .parse::<i64>()
                    .map_err(|_| anyhow!("token_ttl_days must be a number"))?;
                if days <= 0 {
                    bail!("token_ttl_days must be positive");
                }
                self.token_ttl_days = days;
            }
            "bcrypt_cost" => {
                let cost = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("bcrypt_cost must be a number"))?;
                if !(4..=31).contains(&cost) {
                    bail!("bcrypt_cost must be between 4 and 31");
                }
                self.bcrypt_cost = cost;
            }
            "reports_enabled" => {
                self.reports_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("reports_enabled must be true/false"))?;
            }
            "report_weekday" => {
                parse_report_day(value)?;
                self.report_weekday = value.trim().to_lowercase();
            }
            "report_time" => {
                parse_hhmm(value)?;
                self.report_time = value.to_string();
            }
            "mail_api_url" => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    self.mail_api_url = None;
                } else {
                    Url::parse(trimmed)
                        .with_context(|| format!("Invalid mail_api_url: {trimmed}"))?;
                    self.mail_api_url = Some(trimmed.to_string());
                }
            }
            "mail_api_key" => {
                self.mail_api_key = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "mail_from" => {
                if value.trim().is_empty() {
                    bail!("mail_from must not be empty");
                }
                self.mail_from = value.trim().to_string();
            }
            "admin_token" => {
                self.admin_token = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, api_host|api.host, api_port|api.port, jwt_secret|auth.jwt_secret, token_ttl_days|auth.token_ttl_days, bcrypt_cost|auth.bcrypt_cost, reports_enabled|report.enabled, report_weekday|report.weekday, report_time|report.time, mail_api_url|mail.api_url, mail_api_key|mail.api_key, mail_from|mail.from, admin_token|admin.token"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "api_host" => Some(self.api_host.clone()),
            "api_port" => Some(self.api_port.to_string()),
            "jwt_secret" => Some(mask_secret(self.jwt_secret.as_ref())),
            "token_ttl_days" => Some(self.token_ttl_days.to_string()),
            "bcrypt_cost" => Some(self.bcrypt_cost.to_string()),
            "reports_enabled" => Some(self.reports_enabled.to_string()),
            "report_weekday" => Some(self.report_weekday.clone()),
            "report_time" => Some(self.report_time.clone()),
            "mail_api_url" => Some(
                self.mail_api_url
                    .clone()
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "mail_api_key" => Some(mask_secret(self.mail_api_key.as_ref())),
            "mail_from" => Some(self.mail_from.clone()),
            "admin_token" => Some(mask_secret(self.admin_token.as_ref())),
            _ => None,
        }
    }

    pub fn is_secret_key(key: &str) -> bool {
        matches!(
            normalize_config_key(key),
            "jwt_secret" | "mail_api_key" | "admin_token"
        )
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "api_host" | "api.host" => "api_host",
        "api_port" | "api.port" => "api_port",
        "jwt_secret" | "auth.jwt_secret" => "jwt_secret",
        "token_ttl_days" | "auth.token_ttl_days" => "token_ttl_days",
        "bcrypt_cost" | "auth.bcrypt_cost" => "bcrypt_cost",
        "reports_enabled" | "report.enabled" => "reports_enabled",
        "report_weekday" | "report.weekday" => "report_weekday",
        "report_time" | "report.time" => "report_time",
        "mail_api_url" | "mail.api_url" => "mail_api_url",
        "mail_api_key" | "mail.api_key" => "mail_api_key",
        "mail_from" | "mail.from" => "mail_from",
        "admin_token" | "admin.token" => "admin_token",
        _ => key,
    }
}

fn mask_secret(value: Option<&String>) -> String {
    value
        .map(|_| "***set***".to_string())
        .unwrap_or_else(|| "not_set".to_string())
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 21:00 (24-hour format)",))
}

pub fn parse_report_day(value: &str) -> Result<Option<Weekday>> {
    match value.trim() {
        "*" | "daily" => Ok(None),
        day => day
            .parse::<Weekday>()
            .map(Some)
            .map_err(|_| anyhow!("Invalid weekday: {value}. Example: sun, mon, ... sat, or daily")),
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JWT_SECRET_LEN)
        .map(char::from)
        .collect()
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Config;
    use chrono::Weekday;

    #[test]
    fn bootstrap_generates_secret_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config {
            db_path: dir.path().join("db").join("deepfocus.db"),
            ..Config::default()
        };

        assert!(config.ensure_bootstrap_files().expect("bootstrap"));
        let secret = config.jwt_secret().expect("secret").to_string();
        assert_eq!(secret.len(), 64);
        assert!(dir.path().join("db").is_dir());

        assert!(!config.ensure_bootstrap_files().expect("second bootstrap"));
        assert_eq!(config.jwt_secret().expect("secret"), secret);
    }

    #[test]
    fn save_and_load_round_trip_keeps_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.set_value("api.port", "8080").expect("port");
        config.set_value("report.weekday", "Mon").expect("weekday");
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.api_port, 8080);
        assert_eq!(loaded.parse_report_day().expect("weekday"), Some(Weekday::Mon));
    }

    #[test]
    fn daily_reports_have_no_weekday() {
        let mut config = Config::default();
        config.set_value("report.weekday", "daily").expect("daily");

        assert_eq!(config.parse_report_day().expect("day"), None);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = Config::default();

        assert!(config.set_value("report.time", "25:99").is_err());
        assert!(config.set_value("report.weekday", "someday").is_err());
        assert!(config.set_value("mail.api_url", "not a url").is_err());
        assert!(config.set_value("auth.bcrypt_cost", "2").is_err());
        assert!(config.set_value("unknown", "x").is_err());
    }

    #[test]
    fn secrets_are_masked() {
        let mut config = Config::default();
        config.set_value("mail.api_key", "key-123").expect("key");

        assert_eq!(config.get_value("mail.api_key").as_deref(), Some("***set***"));
        assert_eq!(config.get_value("admin.token").as_deref(), Some("not_set"));
        assert!(Config::is_secret_key("auth.jwt_secret"));
    }
}
