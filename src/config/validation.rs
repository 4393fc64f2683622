//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (thresholds > 0, multipliers >= 1)
//! - Check operations: unique keys, unique candidate names, usable URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{CandidateKind, DispatchConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("retries.multiplier must be >= 1.0")]
    Multiplier,

    #[error("retries.jitter_ratio must be within [0, 1]")]
    JitterRatio,

    #[error("operation key must not be empty")]
    EmptyOperationKey,

    #[error("duplicate operation '{0}'")]
    DuplicateOperation(String),

    #[error("operation '{operation}': duplicate candidate '{candidate}'")]
    DuplicateCandidate { operation: String, candidate: String },

    #[error("operation '{operation}': candidate '{candidate}' has invalid url '{url}'")]
    InvalidUrl { operation: String, candidate: String, url: String },

    #[error("operation '{operation}': static candidate '{candidate}' has no response")]
    MissingStaticResponse { operation: String, candidate: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::NotPositive { field: "circuit_breaker.failure_threshold" });
    }
    if config.retries.max_retries == 0 {
        errors.push(ValidationError::NotPositive { field: "retries.max_retries" });
    }
    if config.retries.multiplier.is_nan() || config.retries.multiplier < 1.0 {
        errors.push(ValidationError::Multiplier);
    }
    if !(0.0..=1.0).contains(&config.retries.jitter_ratio) {
        errors.push(ValidationError::JitterRatio);
    }
    if config.ledger.capacity == 0 {
        errors.push(ValidationError::NotPositive { field: "ledger.capacity" });
    }
    if config.timeouts.call_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "timeouts.call_secs" });
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "health_check.interval_secs" });
    }

    let mut keys = HashSet::new();
    for op in &config.operations {
        if op.key.trim().is_empty() {
            errors.push(ValidationError::EmptyOperationKey);
        } else if !keys.insert(op.key.as_str()) {
            errors.push(ValidationError::DuplicateOperation(op.key.clone()));
        }

        let mut names = HashSet::new();
        for candidate in &op.candidates {
            if !names.insert(candidate.name.as_str()) {
                errors.push(ValidationError::DuplicateCandidate {
                    operation: op.key.clone(),
                    candidate: candidate.name.clone(),
                });
            }

            match candidate.kind {
                CandidateKind::Static => {
                    if candidate.response.is_none() {
                        errors.push(ValidationError::MissingStaticResponse {
                            operation: op.key.clone(),
                            candidate: candidate.name.clone(),
                        });
                    }
                }
                CandidateKind::Webhook | CandidateKind::DirectApi => {
                    // An empty URL means "not configured yet" and is skipped at dispatch time.
                    if candidate.url.trim().is_empty() {
                        continue;
                    }
                    let usable = Url::parse(&candidate.url)
                        .map(|u| u.scheme() == "http" || u.scheme() == "https")
                        .unwrap_or(false);
                    if !usable {
                        errors.push(ValidationError::InvalidUrl {
                            operation: op.key.clone(),
                            candidate: candidate.name.clone(),
                            url: candidate.url.clone(),
                        });
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
