//! NATS messaging with per-operation circuit breakers

pub mod client;
pub mod config;
pub mod error;

pub use client::{MessagingClient, SubscribeOptions};
pub use config::MessagingConfig;
pub use error::{MessagingError, MessagingResult};

#[cfg(test)]
mod tests;
