use crate::error::ServiceError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub tenancy: TenancyConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret for signing/verifying access tokens.
    pub access_token_secret: String,
    /// Secret for signing/verifying refresh tokens. Must differ from the
    /// access secret so an access-secret compromise does not grant
    /// long-lived access.
    pub refresh_token_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Slug of the tenant used when no context or hint resolves one.
    pub default_tenant_slug: String,
    /// Live refresh tokens kept per (user, tenant) after pruning.
    pub refresh_token_retention: i64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(ServiceError::Config)?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            jwt: JwtConfig {
                access_token_secret: get_env(
                    "AUTH_ACCESS_TOKEN_SECRET",
                    Some("dev-access-token-secret"),
                    is_prod,
                )?,
                refresh_token_secret: get_env(
                    "AUTH_REFRESH_TOKEN_SECRET",
                    Some("dev-refresh-token-secret"),
                    is_prod,
                )?,
                access_token_expiry_minutes: parse_env(
                    "AUTH_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "AUTH_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
            },
            tenancy: TenancyConfig {
                default_tenant_slug: get_env("AUTH_DEFAULT_TENANT_SLUG", Some("default"), is_prod)?,
                refresh_token_retention: parse_env(
                    "AUTH_REFRESH_TOKEN_RETENTION",
                    Some("5"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.jwt.access_token_secret.is_empty() || self.jwt.refresh_token_secret.is_empty() {
            return Err(ServiceError::Config(
                "JWT secrets must not be empty".to_string(),
            ));
        }

        if self.jwt.access_token_secret == self.jwt.refresh_token_secret {
            return Err(ServiceError::Config(
                "AUTH_ACCESS_TOKEN_SECRET and AUTH_REFRESH_TOKEN_SECRET must differ".to_string(),
            ));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(ServiceError::Config(
                "AUTH_ACCESS_TOKEN_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(ServiceError::Config(
                "AUTH_REFRESH_TOKEN_EXPIRY_DAYS must be positive".to_string(),
            ));
        }

        if self.tenancy.refresh_token_retention < 1 {
            return Err(ServiceError::Config(
                "AUTH_REFRESH_TOKEN_RETENTION must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ServiceError::Config(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ServiceError::Config(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| ServiceError::Config(format!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AuthConfig {
        AuthConfig {
            environment: Environment::Dev,
            log_level: "info".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/admin_auth".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            jwt: JwtConfig {
                access_token_secret: "access-secret".to_string(),
                refresh_token_secret: "refresh-secret".to_string(),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_days: 7,
            },
            tenancy: TenancyConfig {
                default_tenant_slug: "default".to_string(),
                refresh_token_retention: 5,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn identical_secrets_rejected() {
        let mut config = base_config();
        config.jwt.refresh_token_secret = config.jwt.access_token_secret.clone();
        assert!(matches!(
            config.validate(),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn non_positive_expiry_rejected() {
        let mut config = base_config();
        config.jwt.access_token_expiry_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.jwt.refresh_token_expiry_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_below_one_rejected() {
        let mut config = base_config();
        config.tenancy.refresh_token_retention = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_parses() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }
}
