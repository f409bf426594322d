use std::sync::Arc;

use crate::config::Config;
use crate::context::Ctx;
use crate::device::DeviceRegistry;
use crate::ledger::{FileLedger, Ledger};
use crate::replay::{Action, LocalManager, Manager, ReplayError, ReplayWorker};
use crate::stash::{FileStash, Stash};

/// Shared state of the RPC server.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    manager: Arc<LocalManager>,
    stash: Arc<dyn Stash>,
}

impl AppState {
    pub fn new(config: Config, manager: Arc<LocalManager>, stash: Arc<dyn Stash>) -> Self {
        Self {
            config: Arc::new(config),
            manager,
            stash,
        }
    }

    /// Open the on-disk stash and ledger under the data directory and
    /// rebuild the manager from the ledger.
    pub async fn open(ctx: &Ctx, config: Config) -> anyhow::Result<Self> {
        let stash = FileStash::open(config.stash_dir()).await?;
        let ledger: Arc<dyn Ledger<Action>> = Arc::new(FileLedger::with_max_frame_size(
            config.ledger_path(),
            config.pipeline.max_frame_size,
        )?);
        let manager = LocalManager::restore(ctx, ledger, Arc::new(DeviceRegistry::new()))?;
        Ok(Self::new(config, manager, Arc::new(stash)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<LocalManager> {
        &self.manager
    }

    pub fn stash(&self) -> &Arc<dyn Stash> {
        &self.stash
    }

    pub fn devices(&self) -> &Arc<DeviceRegistry> {
        self.manager.devices()
    }

    /// Register an in-process worker for the configured device, so actions
    /// targeting this machine run without a separate device process.
    pub async fn register_local_worker(&self, ctx: &Ctx) -> Result<(), ReplayError> {
        let device = self.config.device.instance();
        let worker = ReplayWorker::new(
            &self.manager,
            self.stash.clone(),
            device.clone(),
            self.config.pipeline,
        );
        self.manager
            .register(ctx, device.clone(), device, Arc::new(worker))
            .await
    }
}
