// Environment-driven configuration with local-development fallbacks.

use std::net::SocketAddr;

const DEV_JWT_SECRET: &str = "coedit_local_development_jwt_secret_32_chars!";

/// Runtime settings for the collaboration server, read once at startup.
///
/// | Variable | Default |
/// |---|---|
/// | `COEDIT_HOST` | `0.0.0.0` |
/// | `COEDIT_PORT` | `8080` |
/// | `COEDIT_JWT_SECRET` | dev-only placeholder |
/// | `COEDIT_DATABASE_URL` | *(none, memory stores)* |
/// | `COEDIT_CORS_ORIGINS` | *(none, permissive dev default)* |
/// | `COEDIT_LOG_FILTER` | `info` |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// HS256 signing secret for access tokens.
    pub jwt_secret: String,
    /// PostgreSQL connection string; memory-backed stores when absent.
    pub database_url: Option<String>,
    /// Comma-separated allowed CORS origins, or `"*"`.
    pub cors_origins: Option<String>,
    /// Tracing filter directive such as `info` or `coedit_server=debug`.
    pub log_filter: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key).ok())
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: env("COEDIT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: env("COEDIT_PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            jwt_secret: env("COEDIT_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.into()),
            database_url: env("COEDIT_DATABASE_URL"),
            cors_origins: env("COEDIT_CORS_ORIGINS"),
            log_filter: env("COEDIT_LOG_FILTER").unwrap_or_else(|| "info".into()),
        }
    }

    /// Socket address to bind, falling back to all interfaces when the
    /// configured host does not parse.
    pub fn listen_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], self.port)))
    }

    /// True when the placeholder development secret is still in use.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(vars: &'static [(&'static str, &'static str)]) -> ServerConfig {
        ServerConfig::from_env_fn(move |key| {
            vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn empty_environment_gives_dev_defaults() {
        let cfg = config_with(&[]);
        assert_eq!(cfg.listen_addr().to_string(), "0.0.0.0:8080");
        assert!(cfg.is_dev_jwt_secret());
        assert!(cfg.database_url.is_none() && cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn host_and_port_compose_the_listen_addr() {
        let cfg = config_with(&[("COEDIT_HOST", "127.0.0.1"), ("COEDIT_PORT", "3000")]);
        assert_eq!(cfg.listen_addr().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn unparseable_host_falls_back_to_all_interfaces() {
        let cfg = config_with(&[("COEDIT_HOST", "not a host"), ("COEDIT_PORT", "9999")]);
        assert_eq!(cfg.listen_addr().to_string(), "0.0.0.0:9999");
    }

    #[test]
    fn unparseable_port_keeps_the_default() {
        let cfg = config_with(&[("COEDIT_PORT", "not_a_number")]);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn overriding_the_secret_clears_the_dev_flag() {
        let cfg = config_with(&[("COEDIT_JWT_SECRET", "production_secret_at_least_32_chars!!")]);
        assert!(!cfg.is_dev_jwt_secret());
    }

    #[test]
    fn database_and_filter_pass_through() {
        let cfg = config_with(&[
            ("COEDIT_DATABASE_URL", "postgres://u:p@host/db"),
            ("COEDIT_LOG_FILTER", "debug,tower_http=trace"),
        ]);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://u:p@host/db"));
        assert_eq!(cfg.log_filter, "debug,tower_http=trace");
    }
}
