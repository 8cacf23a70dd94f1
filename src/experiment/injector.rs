//! Chaos injection collaborators.

use crate::abort::RevertAction;
use crate::config::InjectionConfig;
use crate::error::Result;
use crate::exec::{CommandSink, ShellSink};
use std::sync::Arc;
use tracing::{debug, info};

/// Injects and reverts the chaos of an experiment.
#[async_trait::async_trait]
pub trait ChaosInjector: Send + Sync {
    /// Inject one iteration of chaos. Iterations count from 1.
    async fn inject(&self, iteration: u32) -> Result<()>;

    /// Undo everything injected so far. Called on normal completion and abort.
    async fn revert(&self) -> Result<()>;
}

/// Injector that does nothing; probes run against an undisturbed target.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInjector;

#[async_trait::async_trait]
impl ChaosInjector for NoopInjector {
    async fn inject(&self, iteration: u32) -> Result<()> {
        debug!(iteration = iteration, "No injection configured");
        Ok(())
    }

    async fn revert(&self) -> Result<()> {
        Ok(())
    }
}

/// Injector running shell commands through a [`CommandSink`].
pub struct ShellInjector {
    sink: Arc<dyn CommandSink>,
    config: InjectionConfig,
}

impl ShellInjector {
    pub fn new(config: InjectionConfig) -> Self {
        Self::with_sink(config, Arc::new(ShellSink::new()))
    }

    pub fn with_sink(config: InjectionConfig, sink: Arc<dyn CommandSink>) -> Self {
        Self { sink, config }
    }
}

#[async_trait::async_trait]
impl ChaosInjector for ShellInjector {
    async fn inject(&self, iteration: u32) -> Result<()> {
        let output = self
            .sink
            .execute(&self.config.inject_command, &self.config.target)
            .await?;
        info!(
            iteration = iteration,
            output = %output.trim(),
            "[Chaos]: Injection command completed"
        );
        Ok(())
    }

    async fn revert(&self) -> Result<()> {
        let Some(command) = &self.config.revert_command else {
            debug!("No revert command configured");
            return Ok(());
        };
        self.sink.execute(command, &self.config.target).await?;
        info!("[Chaos]: Revert command completed");
        Ok(())
    }
}

/// Exposes an injector's revert as an abort [`RevertAction`].
pub(crate) struct InjectorRevert {
    injector: Arc<dyn ChaosInjector>,
}

impl InjectorRevert {
    pub(crate) fn new(injector: Arc<dyn ChaosInjector>) -> Self {
        Self { injector }
    }
}

#[async_trait::async_trait]
impl RevertAction for InjectorRevert {
    fn name(&self) -> &str {
        "chaos-revert"
    }

    async fn revert(&self) -> Result<()> {
        self.injector.revert().await
    }
}
