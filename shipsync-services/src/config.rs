use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Docker,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "docker" => Ok(Environment::Docker),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid("ENVIRONMENT", other.to_string())),
        }
    }
}

/// Sibling service endpoints for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    pub order_service_url: String,
}

impl Environment {
    pub fn service_urls(self) -> ServiceUrls {
        let orders = match self {
            Environment::Development => "http://localhost:8003/api/orders/",
            Environment::Docker => "http://order_service:8000/api/orders/",
            Environment::Production => "http://orders.mycompany.com/api/orders/",
        };
        ServiceUrls {
            order_service_url: orders.to_string(),
        }
    }

    /// Internal hosts expect `Host: localhost` everywhere except production.
    pub fn needs_host_override(self) -> bool {
        self != Environment::Production
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct RabbitConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Queue this process consumes.
    pub queue: String,
    /// Queues this process publishes to; one per consuming service.
    pub publish_queues: Vec<String>,
}

/// Process configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub urls: ServiceUrls,
    pub rabbitmq: RabbitConfig,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub http_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let environment: Environment = get("ENVIRONMENT", "docker").parse()?;

        let queue = get("RABBITMQ_QUEUE", "shipping_events");
        let publish_queues = lookup("RABBITMQ_PUBLISH_QUEUES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|queues| !queues.is_empty())
            .unwrap_or_else(|| vec![queue.clone()]);

        let jwt_secret = lookup("JWT_SECRET_KEY")
            .or_else(|| lookup("DJANGO_SECRET_KEY"))
            .unwrap_or_else(|| "secret".to_string());

        let http_timeout = get("HTTP_TIMEOUT_SECS", "5")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid("HTTP_TIMEOUT_SECS", e.to_string()))?;

        Ok(Self {
            environment,
            urls: environment.service_urls(),
            rabbitmq: RabbitConfig {
                host: get("RABBITMQ_HOST", "rabbitmq"),
                user: get("RABBITMQ_USER", "guest"),
                password: get("RABBITMQ_PASSWORD", "guest"),
                queue,
                publish_queues,
            },
            database_url: lookup("DATABASE_URL"),
            jwt_secret,
            http_timeout,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}
