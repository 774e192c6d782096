//! Runtime configuration from `STUDIO_*` environment variables.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::limits::MAX_SERVICES;
use crate::model::{Admin, Platform, Service};

#[derive(Debug)]
pub enum ConfigError {
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    Catalog(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => write!(f, "{var}={value:?}: {reason}"),
            ConfigError::Catalog(e) => write!(f, "service catalog: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tz: Tz,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub step_minutes: u32,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub admin_ids_tg: Vec<i64>,
    pub admin_ids_vk: Vec<i64>,
    pub catalog: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Europe::Moscow,
            work_start: NaiveTime::MIN + chrono::Duration::hours(9),
            work_end: NaiveTime::MIN + chrono::Duration::hours(21),
            step_minutes: 60,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            admin_ids_tg: Vec::new(),
            admin_ids_vk: Vec::new(),
            catalog: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(v) = get("STUDIO_TIMEZONE") {
            config.tz = v.parse().map_err(|_| invalid("STUDIO_TIMEZONE", &v, "unknown IANA zone"))?;
        }
        if let Some(v) = get("STUDIO_WORK_START") {
            config.work_start = parse_time("STUDIO_WORK_START", &v)?;
        }
        if let Some(v) = get("STUDIO_WORK_END") {
            config.work_end = parse_time("STUDIO_WORK_END", &v)?;
        }
        if config.work_end <= config.work_start {
            return Err(invalid(
                "STUDIO_WORK_END",
                &config.work_end.format("%H:%M").to_string(),
                "must be after STUDIO_WORK_START",
            ));
        }
        if let Some(v) = get("STUDIO_STEP_MINUTES") {
            config.step_minutes = match v.parse() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("STUDIO_STEP_MINUTES", &v, "expected a positive integer")),
            };
        }
        if let Some(v) = get("STUDIO_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("STUDIO_METRICS_PORT") {
            config.metrics_port =
                Some(v.parse().map_err(|_| invalid("STUDIO_METRICS_PORT", &v, "expected a port number"))?);
        }
        if let Some(v) = get("STUDIO_ADMIN_IDS_TG") {
            config.admin_ids_tg = parse_ids("STUDIO_ADMIN_IDS_TG", &v)?;
        }
        if let Some(v) = get("STUDIO_ADMIN_IDS_VK") {
            config.admin_ids_vk = parse_ids("STUDIO_ADMIN_IDS_VK", &v)?;
        }
        config.catalog = get("STUDIO_CATALOG").map(PathBuf::from);
        Ok(config)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("studio.log")
    }

    pub fn is_listed_admin(&self, platform: Platform, user_id: i64) -> bool {
        match platform {
            Platform::Telegram => self.admin_ids_tg.contains(&user_id),
            Platform::Vk => self.admin_ids_vk.contains(&user_id),
        }
    }

    /// Allowlisted admins as store rows.
    pub fn listed_admins(&self) -> Vec<Admin> {
        let tg = self.admin_ids_tg.iter().map(|&id| Admin {
            telegram_id: Some(id),
            vk_id: None,
            is_active: true,
        });
        let vk = self.admin_ids_vk.iter().map(|&id| Admin {
            telegram_id: None,
            vk_id: Some(id),
            is_active: true,
        });
        tg.chain(vk).collect()
    }
}

/// Read a JSON array of services.
pub fn load_catalog(path: &Path) -> Result<Vec<Service>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Catalog(format!("{}: {e}", path.display())))?;
    parse_catalog(&raw)
}

pub fn parse_catalog(raw: &str) -> Result<Vec<Service>, ConfigError> {
    let services: Vec<Service> = serde_json::from_str(raw).map_err(|e| ConfigError::Catalog(e.to_string()))?;
    if services.len() > MAX_SERVICES {
        return Err(ConfigError::Catalog(format!("more than {MAX_SERVICES} services")));
    }
    for s in &services {
        if s.duration_step_minutes == 0 || s.min_duration_minutes == 0 {
            return Err(ConfigError::Catalog(format!("service {}: durations must be positive", s.id)));
        }
        if let Some(pre) = s.occupancy.pre_window
            && (pre.capacity == 0 || pre.lead_minutes == 0)
        {
            return Err(ConfigError::Catalog(format!(
                "service {}: pre-window on {} needs a positive lead and capacity",
                s.id, pre.resource
            )));
        }
        if let (Some(extra), Some(pre)) = (s.linked_extra, s.occupancy.pre_window)
            && extra != pre.resource
        {
            return Err(ConfigError::Catalog(format!(
                "service {}: linked extra {extra} differs from pre-window resource {}",
                s.id, pre.resource
            )));
        }
    }
    Ok(services)
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason,
    }
}

fn parse_time(var: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| invalid(var, value, "expected HH:MM"))
}

fn parse_ids(var: &'static str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| invalid(var, value, "expected comma-separated integers")))
        .collect()
}
