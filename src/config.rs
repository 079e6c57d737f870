use std::env;

/// Thresholds, in days, that decide when and how loudly a nudge fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeConfig {
    /// Deadlines further out than this stay quiet.
    pub deadline_window_days: i64,
    pub urgent_within_days: i64,
    pub soon_within_days: i64,
    pub stalled_after_days: i64,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            deadline_window_days: 60,
            urgent_within_days: 7,
            soon_within_days: 21,
            stalled_after_days: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nudges: NudgeConfig,
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative whole number of days (found '{value}')")]
    InvalidDays { name: &'static str, value: String },
    #[error("NUDGES_URGENT_DAYS ({urgent}) must not exceed NUDGES_SOON_DAYS ({soon})")]
    UrgentAfterSoon { urgent: i64, soon: i64 },
    #[error("NUDGES_SOON_DAYS ({soon}) must not exceed NUDGES_DEADLINE_WINDOW_DAYS ({window})")]
    InvalidTiers { soon: i64, window: i64 },
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = NudgeConfig::default();
        let nudges = NudgeConfig {
            deadline_window_days: days_var(
                "NUDGES_DEADLINE_WINDOW_DAYS",
                defaults.deadline_window_days,
            )?,
            urgent_within_days: days_var("NUDGES_URGENT_DAYS", defaults.urgent_within_days)?,
            soon_within_days: days_var("NUDGES_SOON_DAYS", defaults.soon_within_days)?,
            stalled_after_days: days_var("NUDGES_STALLED_DAYS", defaults.stalled_after_days)?,
        };

        if nudges.urgent_within_days > nudges.soon_within_days {
            return Err(ConfigError::UrgentAfterSoon {
                urgent: nudges.urgent_within_days,
                soon: nudges.soon_within_days,
            });
        }

        if nudges.soon_within_days > nudges.deadline_window_days {
            return Err(ConfigError::InvalidTiers {
                soon: nudges.soon_within_days,
                window: nudges.deadline_window_days,
            });
        }

        let log_level = env::var("NUDGES_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self { nudges, log_level })
    }
}

fn days_var(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|days| *days >= 0)
            .ok_or(ConfigError::InvalidDays { name, value: raw }),
        Err(_) => Ok(default),
    }
}
