//! Circuit-breaker-protected NATS client
//!
//! Every remote call runs through a named breaker, one per operation
//! class (publish, request). While the connection is down, calls fail
//! fast instead of queueing, so callers keep control of their own
//! buffering. The underlying `async-nats` client reconnects with backoff
//! on its own and re-establishes core subscriptions; durable JetStream
//! consumers resume server-side from their last acknowledged position.
//! The registry records every subscription so health reporting can say
//! what this client is supposed to be consuming.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::core::retry::calculate_retry_delay;
use crate::metrics::StoreMetrics;

use super::config::MessagingConfig;
use super::error::{MessagingError, MessagingResult};

/// How a subscription should be established
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub subject: String,
    /// Messages load-balance across subscribers sharing a queue group
    pub queue_group: Option<String>,
    /// Durable JetStream consumer name; requires `stream`
    pub durable_name: Option<String>,
    /// JetStream stream the durable consumer binds to (streams are
    /// provisioned externally)
    pub stream: Option<String>,
}

impl SubscribeOptions {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn with_queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    pub fn with_durable(mut self, stream: impl Into<String>, durable: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self.durable_name = Some(durable.into());
        self
    }
}

pub struct MessagingClient {
    config: MessagingConfig,
    client: async_nats::Client,
    publish_breaker: Arc<CircuitBreaker>,
    request_breaker: Arc<CircuitBreaker>,
    registry: Mutex<Vec<SubscribeOptions>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MessagingClient {
    /// Connect to the broker with a bounded retry budget
    ///
    /// Each attempt gets its own connection timeout; failed attempts back
    /// off exponentially with jitter. Exhausting the budget is fatal to
    /// the caller, not silently retried forever.
    pub async fn connect(
        config: MessagingConfig,
        metrics: &StoreMetrics,
    ) -> MessagingResult<Self> {
        let budget = config.max_connect_attempts.max(1);
        let servers = config.servers.join(",");
        let mut attempt = 0u32;

        let client = loop {
            match Self::try_connect(&config, &servers).await {
                Ok(client) => break client,
                Err(err) => {
                    attempt += 1;
                    if attempt >= budget {
                        return Err(MessagingError::ConnectBudgetExhausted {
                            attempts: attempt,
                            reason: err.to_string(),
                        });
                    }
                    let delay = calculate_retry_delay(attempt - 1);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "broker connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };
        info!(servers = %servers, client_name = %config.client_name, "connected to broker");

        let publish_breaker = Arc::new(CircuitBreaker::new(
            format!("{}_publish", config.client_name),
            "publish",
            config.breaker.clone(),
        ));
        let request_breaker = Arc::new(CircuitBreaker::new(
            format!("{}_request", config.client_name),
            "request",
            config.breaker.clone(),
        ));
        metrics.register_breaker(publish_breaker.metrics());
        metrics.register_breaker(request_breaker.metrics());

        Ok(Self {
            config,
            client,
            publish_breaker,
            request_breaker,
            registry: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    async fn try_connect(
        config: &MessagingConfig,
        servers: &str,
    ) -> MessagingResult<async_nats::Client> {
        let mut options = async_nats::ConnectOptions::new()
            .name(config.client_name.clone())
            .connection_timeout(config.connect_timeout());

        if config.use_tls {
            options = options.require_tls(true);
        }
        if let Some(ca) = &config.tls_ca_path {
            options = options.add_root_certificates(ca.clone());
        }
        if let (Some(cert), Some(key)) = (&config.tls_cert_path, &config.tls_key_path) {
            options = options.add_client_certificate(cert.clone(), key.clone());
        }

        if let Some(path) = &config.credentials_path {
            options = options.credentials_file(path).await.map_err(|e| {
                MessagingError::ConnectFailed {
                    reason: format!("credentials file unreadable: {e}"),
                }
            })?;
        } else if let Some(token) = &config.token {
            options = options.token(token.clone());
        } else if let (Some(user), Some(password)) = (&config.username, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }

        options
            .connect(servers)
            .await
            .map_err(|e| MessagingError::ConnectFailed {
                reason: e.to_string(),
            })
    }

    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    fn ensure_connected(&self) -> MessagingResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MessagingError::NotConnected)
        }
    }

    /// Publish a serializable payload through the publish breaker
    pub async fn publish<T: Serialize>(&self, subject: &str, payload: &T) -> MessagingResult<()> {
        let bytes = serde_json::to_vec(payload).map_err(|e| MessagingError::Serialization {
            reason: e.to_string(),
        })?;
        self.publish_raw(subject, Bytes::from(bytes)).await
    }

    /// Publish raw bytes through the publish breaker
    pub async fn publish_raw(&self, subject: &str, payload: Bytes) -> MessagingResult<()> {
        self.ensure_connected()?;
        let subject = subject.to_string();
        self.publish_breaker
            .call(|| async {
                self.client
                    .publish(subject.clone(), payload)
                    .await
                    .map_err(|e| MessagingError::Publish {
                        reason: e.to_string(),
                    })?;
                // Flush so a broker-side failure surfaces to this call
                // instead of a later unrelated one.
                self.client
                    .flush()
                    .await
                    .map_err(|e| MessagingError::Publish {
                        reason: e.to_string(),
                    })
            })
            .await
            .map_err(MessagingError::from)?;
        debug!(subject = %subject, "published");
        Ok(())
    }

    /// Request/reply through the request breaker
    ///
    /// The timeout is enforced inside the breaker-wrapped future, so a
    /// slow call counts as a breaker failure but reaches the caller as
    /// `Timeout`, distinct from `CircuitOpen`.
    pub async fn request<T: Serialize>(
        &self,
        subject: &str,
        payload: &T,
        timeout: Option<std::time::Duration>,
    ) -> MessagingResult<Bytes> {
        self.ensure_connected()?;
        let bytes = serde_json::to_vec(payload).map_err(|e| MessagingError::Serialization {
            reason: e.to_string(),
        })?;
        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        let subject = subject.to_string();

        let response = self
            .request_breaker
            .call(|| async {
                match tokio::time::timeout(
                    timeout,
                    self.client.request(subject.clone(), Bytes::from(bytes)),
                )
                .await
                {
                    Err(_) => Err(MessagingError::Timeout {
                        subject: subject.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                    Ok(Err(e)) => Err(MessagingError::Request {
                        reason: e.to_string(),
                    }),
                    Ok(Ok(message)) => Ok(message.payload),
                }
            })
            .await
            .map_err(MessagingError::from)?;
        Ok(response)
    }

    /// Subscribe and run `handler` for every message
    ///
    /// With `durable_name` set, the subscription binds a durable JetStream
    /// consumer on the named stream and acknowledges each message after
    /// the handler returns; otherwise it is a core (queue) subscription.
    pub async fn subscribe<F, Fut>(
        &self,
        options: SubscribeOptions,
        handler: F,
    ) -> MessagingResult<()>
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = match &options.durable_name {
            Some(durable) => {
                let stream_name =
                    options
                        .stream
                        .as_deref()
                        .ok_or_else(|| MessagingError::Subscribe {
                            reason: format!(
                                "durable consumer '{durable}' requires a stream name"
                            ),
                        })?;
                self.subscribe_durable(&options.subject, stream_name, durable, handler)
                    .await?
            }
            None => self.subscribe_core(&options.subject, options.queue_group.as_deref(), handler)
                .await?,
        };

        info!(
            subject = %options.subject,
            queue_group = options.queue_group.as_deref().unwrap_or(""),
            durable = options.durable_name.as_deref().unwrap_or(""),
            "subscription established"
        );
        self.registry.lock().push(options);
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn subscribe_core<F, Fut>(
        &self,
        subject: &str,
        queue_group: Option<&str>,
        handler: F,
    ) -> MessagingResult<JoinHandle<()>>
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut subscriber = match queue_group {
            Some(group) => {
                self.client
                    .queue_subscribe(subject.to_string(), group.to_string())
                    .await
            }
            None => self.client.subscribe(subject.to_string()).await,
        }
        .map_err(|e| MessagingError::Subscribe {
            reason: e.to_string(),
        })?;

        Ok(tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                handler(message.subject.to_string(), message.payload).await;
            }
        }))
    }

    async fn subscribe_durable<F, Fut>(
        &self,
        subject: &str,
        stream_name: &str,
        durable: &str,
        handler: F,
    ) -> MessagingResult<JoinHandle<()>>
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let jetstream = async_nats::jetstream::new(self.client.clone());
        let stream =
            jetstream
                .get_stream(stream_name)
                .await
                .map_err(|e| MessagingError::Subscribe {
                    reason: format!("stream '{stream_name}' unavailable: {e}"),
                })?;
        let consumer = stream
            .get_or_create_consumer(
                durable,
                async_nats::jetstream::consumer::pull::Config {
                    durable_name: Some(durable.to_string()),
                    filter_subject: subject.to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| MessagingError::Subscribe {
                reason: e.to_string(),
            })?;
        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| MessagingError::Subscribe {
                reason: e.to_string(),
            })?;

        Ok(tokio::spawn(async move {
            while let Some(next) = messages.next().await {
                match next {
                    Ok(message) => {
                        let subject = message.subject.to_string();
                        let payload = message.payload.clone();
                        handler(subject, payload).await;
                        if let Err(err) = message.ack().await {
                            warn!(error = %err, "failed to acknowledge message");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "durable consumer pull failed");
                    }
                }
            }
        }))
    }

    /// Subjects this client is supposed to be consuming
    pub fn subscriptions(&self) -> Vec<SubscribeOptions> {
        self.registry.lock().clone()
    }

    /// Graceful shutdown: drain in-flight traffic within the grace
    /// period, then stop the subscription tasks
    pub async fn close(&self) -> MessagingResult<()> {
        let drain = tokio::time::timeout(self.config.drain_timeout(), self.client.drain()).await;
        match drain {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(MessagingError::Drain {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(MessagingError::Drain {
                    reason: format!(
                        "drain did not complete within {}s",
                        self.config.drain_timeout_secs
                    ),
                })
            }
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("messaging client closed");
        Ok(())
    }
}
