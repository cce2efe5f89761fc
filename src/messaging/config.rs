//! Messaging client configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;

/// NATS client and circuit breaker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Broker endpoints, tried in order
    pub servers: Vec<String>,

    /// Client name reported to the broker and used in breaker names
    pub client_name: String,

    /// Path to a NATS credentials file, if the broker requires auth
    pub credentials_path: Option<PathBuf>,

    /// Plain username/password auth (credentials file takes precedence)
    pub username: Option<String>,
    pub password: Option<String>,

    /// Token auth; wins over username/password when both are set
    pub token: Option<String>,

    /// Require a TLS connection to the broker
    pub use_tls: bool,

    /// Extra root certificate (PEM) to trust for the broker's TLS cert
    pub tls_ca_path: Option<PathBuf>,

    /// Client certificate and key (PEM) for mutual TLS
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,

    /// Per-attempt connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Bounded initial-connection retry budget
    pub max_connect_attempts: u32,

    /// Default request timeout in seconds
    pub request_timeout_secs: u64,

    /// Grace period for draining in-flight messages on close
    pub drain_timeout_secs: u64,

    /// Breaker tuning shared by the publish and request breakers
    pub breaker: BreakerConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            client_name: "chimera-store".to_string(),
            credentials_path: None,
            username: None,
            password: None,
            token: None,
            use_tls: false,
            tls_ca_path: None,
            tls_cert_path: None,
            tls_key_path: None,
            connect_timeout_secs: 5,
            max_connect_attempts: 5,
            request_timeout_secs: 5,
            drain_timeout_secs: 5,
            breaker: BreakerConfig::default(),
        }
    }
}

impl MessagingConfig {
    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_user_and_password(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_tls(mut self, ca_path: Option<PathBuf>) -> Self {
        self.use_tls = true;
        self.tls_ca_path = ca_path;
        self
    }

    pub fn with_client_certificate(mut self, cert: PathBuf, key: PathBuf) -> Self {
        self.tls_cert_path = Some(cert);
        self.tls_key_path = Some(key);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
