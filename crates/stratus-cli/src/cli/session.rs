//! Shared setup for the commands that talk to the service: endpoints, options,
//! credentials and Ctrl-C handling.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use stratus_core::cancel::OperationControl;
use stratus_core::config::StratusConfig;
use stratus_core::credentials::{Anonymous, Credentials, SasCredentials};
use stratus_core::result::RequestResult;
use stratus_core::{Executor, OperationContext, RequestOptions, StorageCommand, StorageUri};

use super::Cli;

pub struct Session {
    executor: Executor,
    endpoints: StorageUri,
    options: RequestOptions,
    credentials: Arc<dyn Credentials>,
    control: Arc<OperationControl>,
    verbose: bool,
}

impl Session {
    /// Flags win over config.toml.
    pub fn new(cli: &Cli, cfg: &StratusConfig) -> Result<Self> {
        let primary = cli
            .primary
            .as_deref()
            .or(cfg.primary_endpoint.as_deref())
            .ok_or_else(|| {
                anyhow!("no primary endpoint: pass --primary or set primary_endpoint in config.toml")
            })?;
        let secondary = cli
            .secondary
            .as_deref()
            .or(cfg.secondary_endpoint.as_deref())
            .map(parse_endpoint)
            .transpose()?;
        let endpoints = StorageUri::new(parse_endpoint(primary)?, secondary);

        let control = Arc::new(OperationControl::new());
        let mut options = RequestOptions::from_config(cfg).with_operation_control(Arc::clone(&control));
        if let Some(mode) = cli.mode {
            options.location_mode = Some(mode.into());
        }
        if let Some(secs) = cli.max_time {
            options.maximum_execution_time = Some(Duration::from_secs(secs));
        }

        let credentials: Arc<dyn Credentials> = match cfg.sas_token.as_deref() {
            Some(token) => Arc::new(SasCredentials::new(token).context("sas_token in config.toml")?),
            None => Arc::new(Anonymous),
        };

        Ok(Self {
            executor: Executor::default(),
            endpoints,
            options,
            credentials,
            control,
            verbose: cli.verbose,
        })
    }

    /// Endpoints for `path` (e.g. `container/blob`) on both locations.
    pub fn resource(&self, path: &str) -> Result<StorageUri> {
        self.endpoints
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid resource path {}", path))
    }

    pub fn credentials(&self) -> Arc<dyn Credentials> {
        Arc::clone(&self.credentials)
    }

    /// Runs `cmd` on the engine. Ctrl-C cancels it through the operation registry.
    pub async fn execute<T: Send + 'static>(
        &self,
        what: &str,
        cmd: &mut StorageCommand<T>,
    ) -> Result<T> {
        let ctx = OperationContext::new();
        tracing::info!(client_request_id = ctx.client_request_id(), "{}", what);

        let control = Arc::clone(&self.control);
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let cancelled = control.cancel_all();
                tracing::warn!(cancelled, "interrupted");
            }
        });
        let outcome = self.executor.execute_async(cmd, &self.options, &ctx).await;
        interrupt.abort();

        if self.verbose {
            print_results(cmd.results())?;
        }
        outcome.with_context(|| what.to_string())
    }
}

/// Endpoint URLs act as directories, so resource paths join below them.
fn parse_endpoint(s: &str) -> Result<Url> {
    let mut url = Url::parse(s).with_context(|| format!("invalid endpoint URL {}", s))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn print_results(results: &[RequestResult]) -> Result<()> {
    for (attempt, result) in results.iter().enumerate() {
        let record = serde_json::to_string(result)?;
        eprintln!("attempt {}: {}", attempt, record);
    }
    Ok(())
}
