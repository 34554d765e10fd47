//! Runtime settings from environment variables (with .env support).

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub entity_config_dir: String,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub jwt_refresh_expires_in: Duration,
    /// Origins for CORS; `*` means any.
    pub allowed_origins: Vec<String>,
    pub env: String,
}

impl Settings {
    /// Read settings from the process environment. `JWT_SECRET` is required
    /// outside development.
    pub fn from_env() -> Result<Self, String> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ if env == "development" => "dev-only-insecure-secret".into(),
            _ => return Err("JWT_SECRET must be set".into()),
        };
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://orgflow.db".into());
        let entity_config_dir =
            std::env::var("ENTITY_CONFIG_DIR").unwrap_or_else(|_| "entities".into());
        let jwt_expires_in = std::env::var("JWT_EXPIRES_IN")
            .ok()
            .and_then(|s| parse_duration(&s))
            .unwrap_or(Duration::from_secs(15 * 60));
        let jwt_refresh_expires_in = std::env::var("JWT_REFRESH_EXPIRES_IN")
            .ok()
            .and_then(|s| parse_duration(&s))
            .unwrap_or(Duration::from_secs(7 * 24 * 3600));
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Settings {
            port,
            database_url,
            entity_config_dir,
            jwt_secret,
            jwt_expires_in,
            jwt_refresh_expires_in,
            allowed_origins,
            env,
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Parse `90`, `30s`, `15m`, `12h`, `7d` into a Duration.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (num, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => (&s[..i], &s[i..]),
        None => (s, ""),
    };
    let n: u64 = num.parse().ok()?;
    let secs = match unit {
        "" | "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_suffixes() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("12h"), Some(Duration::from_secs(43_200)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration("7w"), None);
        assert_eq!(parse_duration(""), None);
    }
}
