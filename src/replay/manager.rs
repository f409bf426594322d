use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::{Action, ActionId, ActionStatus, Query, ReplayError, ReplayInput, ReplayOutput, Task};
use crate::context::Ctx;
use crate::device::{DeviceInstance, DeviceRegistry};
use crate::ledger::Ledger;

/// Receives search results one at a time.
#[async_trait]
pub trait ActionSink: Send {
    async fn accept(&mut self, ctx: &Ctx, action: Action) -> Result<(), ReplayError>;
}

#[async_trait]
impl ActionSink for Vec<Action> {
    async fn accept(&mut self, _ctx: &Ctx, action: Action) -> Result<(), ReplayError> {
        self.push(action);
        Ok(())
    }
}

#[async_trait]
impl ActionSink for mpsc::Sender<Action> {
    async fn accept(&mut self, _ctx: &Ctx, action: Action) -> Result<(), ReplayError> {
        self.send(action)
            .await
            .map_err(|_| ReplayError::Sink("receiver dropped".to_string()))
    }
}

/// Executes tasks for one registered (host, target) pair.
///
/// A handler reports progress and the final status through
/// [`Manager::update`]. Returning an error marks the action failed with the
/// error message as output. A handler that neither returns an error nor
/// reports a terminal status leaves its action `Running`; the manager has
/// no way to cancel or time out a task. The same holds for a handler that
/// accepts a task into a buffer its consumer never drains, such as the
/// stream of a device that disconnects.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &Ctx, task: Task) -> Result<(), ReplayError>;
}

#[async_trait]
pub trait Manager: Send + Sync {
    /// Feed every action matching `query` to `sink`, oldest first. A sink
    /// error stops the search and is returned.
    async fn search(
        &self,
        ctx: &Ctx,
        query: &Query,
        sink: &mut dyn ActionSink,
    ) -> Result<(), ReplayError>;

    /// Bind `handler` to the pair (`host`, `target`). Registering a pair
    /// that is already registered is rejected.
    async fn register(
        &self,
        ctx: &Ctx,
        host: DeviceInstance,
        target: DeviceInstance,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), ReplayError>;

    /// Create a pending action for `device` and return its id without
    /// waiting for it to run. Tasks for a device nobody has registered wait
    /// in an unbounded queue until it registers.
    async fn do_action(
        &self,
        ctx: &Ctx,
        device: &str,
        input: ReplayInput,
    ) -> Result<ActionId, ReplayError>;

    async fn update(
        &self,
        ctx: &Ctx,
        action: &ActionId,
        status: ActionStatus,
        output: Option<ReplayOutput>,
    ) -> Result<(), ReplayError>;
}

#[derive(Default)]
struct ActionTable {
    order: Vec<ActionId>,
    by_id: HashMap<ActionId, Arc<Mutex<Action>>>,
}

impl ActionTable {
    fn insert(&mut self, action: Action) {
        let id = action.id.clone();
        if self
            .by_id
            .insert(id.clone(), Arc::new(Mutex::new(action)))
            .is_none()
        {
            self.order.push(id);
        }
    }
}

struct Registration {
    host: String,
    target: String,
    tasks: mpsc::UnboundedSender<Task>,
}

#[derive(Default)]
struct Dispatch {
    registrations: Vec<Registration>,
    /// Tasks for targets nobody has registered yet, in submission order.
    backlog: HashMap<String, VecDeque<Task>>,
}

impl Dispatch {
    /// Hand `task` to the first live registration for `target`, or queue it.
    fn route(&mut self, target: &str, task: Task) {
        let mut task = task;
        for registration in self.registrations.iter().filter(|r| r.target == target) {
            match registration.tasks.send(task) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => task = returned,
            }
        }
        tracing::debug!(device = %target, action = %task.action, "no device registered; task queued");
        self.backlog.entry(target.to_string()).or_default().push_back(task);
    }
}

/// In-process [`Manager`].
///
/// Each registration gets its own worker task, so devices run their tasks
/// concurrently while tasks for one registration run in order. Status
/// changes of one action are serialized by that action's lock; different
/// actions never contend. Every created action and every accepted
/// transition is appended to the ledger.
pub struct LocalManager {
    this: Weak<LocalManager>,
    actions: RwLock<ActionTable>,
    dispatch: Mutex<Dispatch>,
    ledger: Arc<dyn Ledger<Action>>,
    devices: Arc<DeviceRegistry>,
}

impl LocalManager {
    pub fn new(ledger: Arc<dyn Ledger<Action>>, devices: Arc<DeviceRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            actions: RwLock::new(ActionTable::default()),
            dispatch: Mutex::new(Dispatch::default()),
            ledger,
            devices,
        })
    }

    /// Rebuild a manager from the records in `ledger`. The last record of
    /// each action wins. Pending actions are queued again for their target;
    /// running ones stay running until their device reports.
    pub fn restore(
        ctx: &Ctx,
        ledger: Arc<dyn Ledger<Action>>,
        devices: Arc<DeviceRegistry>,
    ) -> Result<Arc<Self>, ReplayError> {
        let _enter = ctx.span().enter();
        let mut table = ActionTable::default();
        ledger.read(&mut |action| {
            table.insert(action);
            Ok(())
        })?;

        let manager = Self::new(ledger, devices);
        {
            let mut dispatch = manager.dispatch.lock();
            for id in &table.order {
                let action = table.by_id[id].lock();
                if action.status == ActionStatus::Pending {
                    dispatch.route(&action.device, action.task());
                }
            }
        }
        tracing::info!(actions = table.order.len(), "restored actions from ledger");
        *manager.actions.write() = table;
        Ok(manager)
    }

    pub fn devices(&self) -> &Arc<DeviceRegistry> {
        &self.devices
    }

    /// Remove the registration for (`host`, `target`). Tasks already handed
    /// to its worker still run; later tasks go elsewhere or wait.
    pub fn unregister(&self, ctx: &Ctx, host: &str, target: &str) -> bool {
        let mut dispatch = self.dispatch.lock();
        let before = dispatch.registrations.len();
        dispatch
            .registrations
            .retain(|r| !(r.host == host && r.target == target));
        let removed = dispatch.registrations.len() != before;
        if removed {
            tracing::info!(parent: ctx.span(), host = %host, device = %target, "device unregistered");
        }
        removed
    }

    /// Copy of one action.
    pub fn action(&self, id: &ActionId) -> Option<Action> {
        let entry = self.actions.read().by_id.get(id).cloned()?;
        let action = entry.lock().clone();
        Some(action)
    }

    fn transition(
        &self,
        id: &ActionId,
        status: ActionStatus,
        output: Option<ReplayOutput>,
    ) -> Result<(), ReplayError> {
        let entry = self
            .actions
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownAction(id.clone()))?;
        let mut action = entry.lock();
        let next = action.transitioned(status, output)?;
        self.ledger.append(&next)?;
        *action = next;
        tracing::info!(action = %id, %status, "action updated");
        Ok(())
    }

    async fn run_task(&self, ctx: &Ctx, handler: &dyn TaskHandler, task: Task) {
        let action = task.action.clone();
        match self.transition(&action, ActionStatus::Running, None) {
            Ok(()) => {}
            Err(ReplayError::IllegalTransition { from, .. }) => {
                tracing::debug!(parent: ctx.span(), %action, %from, "skipping task");
                return;
            }
            Err(e) => {
                tracing::warn!(parent: ctx.span(), %action, error = %e, "could not start task");
                return;
            }
        }

        if let Err(e) = handler.handle(ctx, task).await {
            tracing::warn!(parent: ctx.span(), %action, error = %e, "task failed");
            let output = ReplayOutput::failed(e.to_string());
            if let Err(e) = self.transition(&action, ActionStatus::Failed, Some(output)) {
                tracing::warn!(parent: ctx.span(), %action, error = %e, "could not record failure");
            }
        }
    }
}

#[async_trait]
impl Manager for LocalManager {
    async fn search(
        &self,
        ctx: &Ctx,
        query: &Query,
        sink: &mut dyn ActionSink,
    ) -> Result<(), ReplayError> {
        let entries: Vec<Arc<Mutex<Action>>> = {
            let table = self.actions.read();
            match &query.id {
                Some(id) => table.by_id.get(id).cloned().into_iter().collect(),
                None => table
                    .order
                    .iter()
                    .filter_map(|id| table.by_id.get(id).cloned())
                    .collect(),
            }
        };
        for entry in entries {
            let action = entry.lock().clone();
            if query.matches(&action) {
                sink.accept(ctx, action).await?;
            }
        }
        Ok(())
    }

    async fn register(
        &self,
        ctx: &Ctx,
        host: DeviceInstance,
        target: DeviceInstance,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), ReplayError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        {
            let mut dispatch = self.dispatch.lock();
            if dispatch
                .registrations
                .iter()
                .any(|r| r.host == host.id && r.target == target.id)
            {
                return Err(ReplayError::AlreadyRegistered {
                    host: host.id,
                    target: target.id,
                });
            }
            if let Some(queued) = dispatch.backlog.remove(&target.id) {
                for task in queued {
                    // The receiver is alive until this function returns.
                    let _ = tx.send(task);
                }
            }
            dispatch.registrations.push(Registration {
                host: host.id.clone(),
                target: target.id.clone(),
                tasks: tx,
            });
        }
        tracing::info!(parent: ctx.span(), host = %host.id, device = %target.id, "device registered");

        let worker_ctx = ctx.child("worker");
        let manager = self.this.clone();
        self.devices.add_device(host);
        self.devices.add_device(target);
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let ctx = worker_ctx.child("task");
                manager.run_task(&ctx, handler.as_ref(), task).await;
            }
        });
        Ok(())
    }

    async fn do_action(
        &self,
        ctx: &Ctx,
        device: &str,
        input: ReplayInput,
    ) -> Result<ActionId, ReplayError> {
        let action = Action::new(device, input);
        self.ledger.append(&action)?;
        let id = action.id.clone();
        let task = action.task();
        self.actions.write().insert(action);
        tracing::info!(parent: ctx.span(), action = %id, device, "action created");
        self.dispatch.lock().route(device, task);
        Ok(id)
    }

    async fn update(
        &self,
        ctx: &Ctx,
        action: &ActionId,
        status: ActionStatus,
        output: Option<ReplayOutput>,
    ) -> Result<(), ReplayError> {
        tracing::debug!(parent: ctx.span(), %action, %status, "update requested");
        self.transition(action, status, output)
    }
}
