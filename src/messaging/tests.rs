// ============================================================================
// Messaging client tests (no broker required)
// ============================================================================

use crate::breaker::{BreakerConfig, BreakerError};
use crate::core::error::{ErrorRecovery, RecoveryAction};
use crate::metrics::StoreMetrics;

use super::*;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[test]
fn default_config_points_at_local_broker() {
    let config = MessagingConfig::default();
    assert_eq!(config.servers, vec!["nats://localhost:4222".to_string()]);
    assert_eq!(config.max_connect_attempts, 5);
    assert_eq!(config.request_timeout().as_secs(), 5);
    assert!(!config.use_tls);
    assert!(config.username.is_none());
    assert!(config.token.is_none());
}

#[test]
fn config_captures_auth_and_tls() {
    let config = MessagingConfig::default()
        .with_user_and_password("svc", "hunter2")
        .with_tls(Some(std::path::PathBuf::from("/etc/nats/ca.pem")))
        .with_client_certificate(
            std::path::PathBuf::from("/etc/nats/client.pem"),
            std::path::PathBuf::from("/etc/nats/client.key"),
        );

    assert!(config.use_tls);
    assert_eq!(config.username.as_deref(), Some("svc"));
    assert_eq!(config.password.as_deref(), Some("hunter2"));
    assert_eq!(
        config.tls_ca_path.as_deref(),
        Some(std::path::Path::new("/etc/nats/ca.pem"))
    );
    assert!(config.tls_cert_path.is_some() && config.tls_key_path.is_some());

    let config = MessagingConfig::default().with_token("s3cr3t");
    assert_eq!(config.token.as_deref(), Some("s3cr3t"));
    assert!(!config.use_tls);
}

#[test]
fn config_builders_chain() {
    let config = MessagingConfig::default()
        .with_servers(vec!["nats://a:4222".to_string(), "nats://b:4222".to_string()])
        .with_client_name("ingest-worker")
        .with_max_connect_attempts(2)
        .with_breaker(BreakerConfig::default().with_fail_max(3));

    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.client_name, "ingest-worker");
    assert_eq!(config.breaker.fail_max, 3);
}

// ----------------------------------------------------------------------------
// Error mapping
// ----------------------------------------------------------------------------

#[test]
fn breaker_open_maps_to_circuit_open() {
    let err: MessagingError = BreakerError::<MessagingError>::Open {
        name: "chimera-store_publish".to_string(),
    }
    .into();
    assert!(matches!(err, MessagingError::CircuitOpen { ref name } if name == "chimera-store_publish"));
}

#[test]
fn breaker_inner_error_passes_through() {
    let err: MessagingError = BreakerError::Inner(MessagingError::Timeout {
        subject: "content.vectorized.article".to_string(),
        timeout_ms: 5000,
    })
    .into();
    assert!(matches!(err, MessagingError::Timeout { .. }));
}

#[test]
fn timeout_and_circuit_open_are_distinguishable() {
    let timeout = MessagingError::Timeout {
        subject: "x".to_string(),
        timeout_ms: 100,
    };
    let open = MessagingError::CircuitOpen {
        name: "x".to_string(),
    };

    // A slow call is worth retrying; an open circuit is not.
    assert!(timeout.is_retryable());
    assert!(!open.is_retryable());
    assert_eq!(open.recovery_action(), RecoveryAction::Fallback);
}

#[test]
fn exhausted_connect_budget_aborts() {
    let err = MessagingError::ConnectBudgetExhausted {
        attempts: 5,
        reason: "connection refused".to_string(),
    };
    assert!(!err.is_retryable());
    assert_eq!(err.recovery_action(), RecoveryAction::Abort);
}

// ----------------------------------------------------------------------------
// Subscription options
// ----------------------------------------------------------------------------

#[test]
fn subscribe_options_capture_durable_binding() {
    let options = SubscribeOptions::new("nlp.enriched.*")
        .with_queue_group("personalization-engine-processors")
        .with_durable("CHIMERA_ENRICHED", "chimera-store-ingest");

    assert_eq!(options.subject, "nlp.enriched.*");
    assert_eq!(
        options.queue_group.as_deref(),
        Some("personalization-engine-processors")
    );
    assert_eq!(options.stream.as_deref(), Some("CHIMERA_ENRICHED"));
    assert_eq!(options.durable_name.as_deref(), Some("chimera-store-ingest"));
}

// ----------------------------------------------------------------------------
// Connection budget
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn connect_gives_up_after_bounded_attempts() {
    // Port 1 refuses connections immediately; the paused clock makes the
    // backoff sleeps instantaneous.
    let config = MessagingConfig::default()
        .with_servers(vec!["nats://127.0.0.1:1".to_string()])
        .with_max_connect_attempts(2);
    let metrics = StoreMetrics::new();

    let result = MessagingClient::connect(config, &metrics).await;
    assert!(matches!(
        result,
        Err(MessagingError::ConnectBudgetExhausted { attempts: 2, .. })
    ));
}
