use config::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Token signing settings. Access and refresh tokens are signed with
/// different secrets and have independent lifetimes.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

impl JwtSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, secret) in [
            ("jwt.access_secret", &self.access_secret),
            ("jwt.refresh_secret", &self.refresh_secret),
        ] {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::Message(format!(
                    "{} must be at least {} bytes long",
                    name, MIN_SECRET_LENGTH
                )));
            }
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::Message(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::Message(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Message("jwt.issuer is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    pub bcrypt_cost: u32,
}

impl AuthSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.bcrypt_cost
            )));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct LogSettings {
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;
        self.auth.validate()
    }
}

/// Loads `configuration.yaml` (optional) and `APP__SECTION__KEY` environment
/// overrides, then validates the result. The returned value is never mutated.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_secret: "a".repeat(32),
            refresh_secret: "r".repeat(32),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "session-guard".to_string(),
        }
    }

    #[test]
    fn test_valid_jwt_settings() {
        assert!(jwt_settings().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut settings = jwt_settings();
        settings.access_secret = "short".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_shared_secret_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_secret = settings.access_secret.clone();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_non_positive_lifetime_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_token_expiry = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        assert!(AuthSettings { bcrypt_cost: 14 }.validate().is_ok());
        assert!(AuthSettings { bcrypt_cost: 3 }.validate().is_err());
        assert!(AuthSettings { bcrypt_cost: 32 }.validate().is_err());
    }
}
