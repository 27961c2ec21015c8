//! Per-request options.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::OperationControl;
use crate::config::StratusConfig;
use crate::location::LocationMode;
use crate::retry::RetryStrategy;

/// Options applied to one operation. Anything unset falls back to the
/// command's own setting or the engine default.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Server-side timeout sent with each request; capped by the remaining budget.
    pub server_timeout: Option<Duration>,
    /// Client-side budget for the whole operation, retries included.
    pub maximum_execution_time: Option<Duration>,
    pub location_mode: Option<LocationMode>,
    /// `None` runs `RetryStrategy::default()`.
    pub retry: Option<RetryStrategy>,
    pub disable_content_md5_validation: bool,
    /// Registry the in-flight attempts are registered with, if any.
    pub operation_control: Option<Arc<OperationControl>>,
}

impl RequestOptions {
    pub fn from_config(cfg: &StratusConfig) -> Self {
        Self {
            server_timeout: cfg.server_timeout_secs.map(Duration::from_secs),
            maximum_execution_time: cfg.max_execution_time_secs.map(Duration::from_secs),
            location_mode: Some(cfg.location_mode),
            retry: cfg.retry.as_ref().map(|r| r.strategy()),
            disable_content_md5_validation: cfg.disable_content_md5_validation,
            operation_control: None,
        }
    }

    pub fn with_operation_control(mut self, control: Arc<OperationControl>) -> Self {
        self.operation_control = Some(control);
        self
    }

    /// Fresh per-invocation copy of the configured strategy.
    pub(crate) fn retry_strategy(&self) -> RetryStrategy {
        match &self.retry {
            Some(strategy) => strategy.fresh(),
            None => RetryStrategy::default(),
        }
    }
}
