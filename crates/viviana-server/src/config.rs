use std::path::PathBuf;

use thiserror::Error;

use viviana_core::Settings;

/// Placeholder JWT secrets that must not be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VIVIANA_JWT_SECRET is unset or still a placeholder")]
    InsecureJwtSecret,

    #[error("VIVIANA_ADMIN_PASSWORD must be set")]
    MissingAdminPassword,

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub admin_username: String,
    pub admin_password: String,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("VIVIANA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::InsecureJwtSecret);
        }

        let admin_password = get("VIVIANA_ADMIN_PASSWORD").unwrap_or_default();
        if admin_password.is_empty() {
            return Err(ConfigError::MissingAdminPassword);
        }

        let defaults = Settings::default();
        Ok(Self {
            host: var("VIVIANA_HOST", "0.0.0.0"),
            port: parse(&get, "VIVIANA_PORT", 3000)?,
            db_path: var("VIVIANA_DB_PATH", "viviana.db").into(),
            jwt_secret,
            admin_username: var("VIVIANA_ADMIN_USERNAME", "admin"),
            admin_password,
            settings: Settings {
                initial_credits: parse(&get, "VIVIANA_INITIAL_CREDITS", defaults.initial_credits)?,
                message_cost: parse(&get, "VIVIANA_MESSAGE_COST", defaults.message_cost)?,
            },
        })
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
