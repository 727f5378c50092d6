use std::{env::var, num::ParseIntError, time::Duration};

use thiserror::Error;

pub const RESYNC_SECS_VAR: &str = "NETOP_RESYNC_SECS";
pub const READINESS_INTERVAL_SECS_VAR: &str = "NETOP_READINESS_INTERVAL_SECS";
pub const READINESS_TIMEOUT_SECS_VAR: &str = "NETOP_READINESS_TIMEOUT_SECS";
pub const SWEEP_NAMESPACE_VAR: &str = "NETOP_SWEEP_NAMESPACE";
pub const SWEEP_FINALIZER_VAR: &str = "NETOP_SWEEP_FINALIZER";
pub const SWEEP_RESYNC_SECS_VAR: &str = "NETOP_SWEEP_RESYNC_SECS";
pub const SWEEP_GRACE_SECS_VAR: &str = "NETOP_SWEEP_GRACE_SECS";

const DEFAULT_RESYNC_SECS: u64 = 60 * 5;
const DEFAULT_READINESS_INTERVAL_SECS: u64 = 1;
const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SWEEP_FINALIZER: &str = "kubernetes";
const DEFAULT_SWEEP_RESYNC_SECS: u64 = 1;
const DEFAULT_SWEEP_GRACE_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum FromError {
    #[error("Env var {} is not a valid number of seconds: {}", .0, .1)]
    InvalidSeconds(&'static str, ParseIntError),
    #[error("Env var {} must not be empty!", .0)]
    Empty(&'static str),
    #[error("Env var {} must be at least one second!", .0)]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSettings {
    /// the sweeper stays idle without a namespace
    pub namespace: Option<String>,
    pub finalizer: String,
    pub resync_period: Duration,
    pub grace_period: Duration,
}

/// Tunables of the control loops, every one has a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSettings {
    pub resync_period: Duration,
    pub readiness_interval: Duration,
    pub readiness_timeout: Duration,
    pub sweep: SweepSettings,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            resync_period: Duration::from_secs(DEFAULT_RESYNC_SECS),
            readiness_interval: Duration::from_secs(DEFAULT_READINESS_INTERVAL_SECS),
            readiness_timeout: Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS),
            sweep: SweepSettings {
                namespace: None,
                finalizer: DEFAULT_SWEEP_FINALIZER.to_owned(),
                resync_period: Duration::from_secs(DEFAULT_SWEEP_RESYNC_SECS),
                grace_period: Duration::from_secs(DEFAULT_SWEEP_GRACE_SECS),
            },
        }
    }
}

fn seconds_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, FromError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|error| FromError::InvalidSeconds(name, error)),
        None => Ok(Duration::from_secs(default)),
    }
}

/// Same as [`seconds_or`] for periods that pace a loop.
fn period_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, FromError> {
    match seconds_or(lookup, name, default)? {
        period if period.is_zero() => Err(FromError::Zero(name)),
        period => Ok(period),
    }
}

impl OperatorSettings {
    pub fn from_env() -> Result<Self, FromError> {
        Self::from_lookup(|name| var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FromError> {
        let finalizer = match lookup(SWEEP_FINALIZER_VAR) {
            Some(finalizer) if finalizer.trim().is_empty() => {
                return Err(FromError::Empty(SWEEP_FINALIZER_VAR))
            }
            Some(finalizer) => finalizer.trim().to_owned(),
            None => DEFAULT_SWEEP_FINALIZER.to_owned(),
        };

        Ok(Self {
            resync_period: period_or(&lookup, RESYNC_SECS_VAR, DEFAULT_RESYNC_SECS)?,
            readiness_interval: period_or(
                &lookup,
                READINESS_INTERVAL_SECS_VAR,
                DEFAULT_READINESS_INTERVAL_SECS,
            )?,
            readiness_timeout: seconds_or(
                &lookup,
                READINESS_TIMEOUT_SECS_VAR,
                DEFAULT_READINESS_TIMEOUT_SECS,
            )?,
            sweep: SweepSettings {
                namespace: lookup(SWEEP_NAMESPACE_VAR)
                    .map(|namespace| namespace.trim().to_owned())
                    .filter(|namespace| !namespace.is_empty()),
                finalizer,
                resync_period: period_or(
                    &lookup,
                    SWEEP_RESYNC_SECS_VAR,
                    DEFAULT_SWEEP_RESYNC_SECS,
                )?,
                grace_period: seconds_or(&lookup, SWEEP_GRACE_SECS_VAR, DEFAULT_SWEEP_GRACE_SECS)?,
            },
        })
    }
}
