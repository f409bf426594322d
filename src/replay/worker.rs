use std::sync::{Arc, Weak};

use async_trait::async_trait;

use super::{ActionStatus, Manager, ReplayError, ReplayInput, ReplayOutput, Task, TaskHandler};
use crate::capture::{CaptureReader, CaptureWriter};
use crate::config::PipelineConfig;
use crate::context::Ctx;
use crate::device::DeviceInstance;
use crate::stash::Stash;
use crate::transform::{Pass, Transform};

/// Run one replay: fetch the capture from the stash, push it through the
/// requested transforms and store the rewritten stream.
pub async fn execute(
    ctx: &Ctx,
    input: &ReplayInput,
    stash: &dyn Stash,
    device: &DeviceInstance,
    limits: PipelineConfig,
) -> Result<ReplayOutput, ReplayError> {
    let capture = stash.get(ctx, &input.capture).await?;
    let transforms: Vec<Box<dyn Transform>> =
        input.transforms.iter().map(|spec| spec.build(device)).collect();
    let pass_ctx = ctx.child("pass");

    let (bytes, emitted) = tokio::task::spawn_blocking(move || {
        let reader = CaptureReader::with_max_frame_size(capture.as_slice(), limits.max_frame_size);
        let mut writer = CaptureWriter::with_max_frame_size(Vec::new(), limits.max_frame_size);
        let outcome = Pass::new(transforms)
            .with_max_probes(limits.max_allocation_probes)
            .try_run(&pass_ctx, reader, &mut writer)?;
        let bytes = writer.finish()?;
        Ok::<_, ReplayError>((bytes, outcome.emitted))
    })
    .await
    .map_err(|e| ReplayError::Handler(format!("pass aborted: {e}")))??;

    let result = stash.put(ctx, bytes).await?;
    tracing::info!(parent: ctx.span(), %result, atoms = emitted, "replay finished");
    Ok(ReplayOutput {
        result: Some(result),
        atoms: emitted,
        error: None,
    })
}

/// Task handler that executes replays on this machine and reports the
/// outcome back to the manager it was registered with.
pub struct ReplayWorker {
    manager: Weak<dyn Manager>,
    stash: Arc<dyn Stash>,
    device: DeviceInstance,
    limits: PipelineConfig,
}

impl ReplayWorker {
    pub fn new<M: Manager + 'static>(
        manager: &Arc<M>,
        stash: Arc<dyn Stash>,
        device: DeviceInstance,
        limits: PipelineConfig,
    ) -> Self {
        let manager: Arc<dyn Manager> = manager.clone();
        Self {
            manager: Arc::downgrade(&manager),
            stash,
            device,
            limits,
        }
    }
}

#[async_trait]
impl TaskHandler for ReplayWorker {
    async fn handle(&self, ctx: &Ctx, task: Task) -> Result<(), ReplayError> {
        let manager = self.manager.upgrade().ok_or(ReplayError::Shutdown)?;
        tracing::debug!(parent: ctx.span(), action = %task.action, capture = %task.input.capture, "replay started");
        let output = execute(ctx, &task.input, self.stash.as_ref(), &self.device, self.limits).await?;
        manager
            .update(ctx, &task.action, ActionStatus::Succeeded, Some(output))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::atom::{Atom, AtomFlags, AtomId, AtomOp, ContextId, SurfaceId};
    use crate::capture::{decode_atoms, encode_atoms, DEFAULT_MAX_FRAME_SIZE};
    use crate::device::{DeviceRegistry, GlVersion};
    use crate::ledger::NullLedger;
    use crate::replay::{Action, ActionId, LocalManager};
    use crate::stash::{MemoryStash, StashKey};
    use crate::transform::TransformSpec;

    fn device() -> DeviceInstance {
        DeviceInstance::new("phone", GlVersion::new(3, 0))
    }

    fn capture() -> Vec<(AtomId, Atom)> {
        [
            AtomOp::CreateContext {
                context: ContextId(1),
                preserve_buffers_on_swap: false,
            },
            AtomOp::MakeCurrent {
                context: ContextId(1),
                draw: SurfaceId(1),
            },
            AtomOp::SwapBuffers {
                surface: SurfaceId(1),
            },
            AtomOp::Opaque {
                name: "glFinish".to_string(),
                params: serde_json::Value::Null,
            },
        ]
        .into_iter()
        .enumerate()
        .map(|(i, op)| (AtomId(i as u64), Atom::new(op)))
        .collect()
    }

    async fn settled(manager: &LocalManager, id: &ActionId) -> Action {
        for _ in 0..400 {
            if let Some(action) = manager.action(id) {
                if action.status.is_terminal() {
                    return action;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("action {id} never finished");
    }

    async fn setup() -> (Ctx, Arc<LocalManager>, Arc<MemoryStash>) {
        let ctx = Ctx::new("test");
        let manager = LocalManager::new(Arc::new(NullLedger), Arc::new(DeviceRegistry::new()));
        let stash = Arc::new(MemoryStash::new());
        let worker = ReplayWorker::new(&manager, stash.clone(), device(), PipelineConfig::default());
        manager
            .register(&ctx, device(), device(), Arc::new(worker))
            .await
            .unwrap();
        (ctx, manager, stash)
    }

    #[tokio::test]
    async fn execute_stores_rewritten_stream() {
        let ctx = Ctx::new("test");
        let stash = MemoryStash::new();
        let key = stash
            .put(&ctx, encode_atoms(&capture()).unwrap())
            .await
            .unwrap();
        let input = ReplayInput {
            capture: key,
            transforms: vec![TransformSpec::EarlyTerminator { last: AtomId(1) }],
        };

        let output = execute(&ctx, &input, &stash, &device(), PipelineConfig::default())
            .await
            .unwrap();
        assert_eq!(output.atoms, 2);
        let bytes = stash.get(&ctx, &output.result.unwrap()).await.unwrap();
        let atoms = decode_atoms(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(atoms, capture()[..2].to_vec());
    }

    #[tokio::test]
    async fn successful_replay_reports_output() {
        let (ctx, manager, stash) = setup().await;
        let key = stash
            .put(&ctx, encode_atoms(&capture()).unwrap())
            .await
            .unwrap();
        let id = manager
            .do_action(
                &ctx,
                "phone",
                ReplayInput {
                    capture: key,
                    transforms: vec![TransformSpec::UndefinedFramebuffer],
                },
            )
            .await
            .unwrap();

        let action = settled(&manager, &id).await;
        assert_eq!(action.status, ActionStatus::Succeeded);
        let output = action.output.unwrap();
        assert!(output.error.is_none());
        // New surface and discarding swap each add a full pattern.
        assert!(output.atoms > 4);
        let bytes = stash.get(&ctx, &output.result.unwrap()).await.unwrap();
        let atoms = decode_atoms(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap();
        let draws = atoms
            .iter()
            .filter(|(_, a)| a.flags().contains(AtomFlags::DRAW_CALL))
            .count();
        assert_eq!(draws, 2);
    }

    #[tokio::test]
    async fn handler_error_marks_action_failed() {
        let (ctx, manager, _stash) = setup().await;
        let missing = StashKey::of(b"never stored");
        let id = manager
            .do_action(
                &ctx,
                "phone",
                ReplayInput {
                    capture: missing.clone(),
                    transforms: Vec::new(),
                },
            )
            .await
            .unwrap();

        let action = settled(&manager, &id).await;
        assert_eq!(action.status, ActionStatus::Failed);
        let error = action.output.and_then(|o| o.error).unwrap();
        assert!(error.contains(missing.as_str()), "{error}");
    }

    #[tokio::test]
    async fn corrupt_capture_fails_the_action() {
        let (ctx, manager, stash) = setup().await;
        let key = stash.put(&ctx, vec![9, 0, 0, 0, b'{']).await.unwrap();
        let id = manager
            .do_action(
                &ctx,
                "phone",
                ReplayInput {
                    capture: key,
                    transforms: Vec::new(),
                },
            )
            .await
            .unwrap();

        let action = settled(&manager, &id).await;
        assert_eq!(action.status, ActionStatus::Failed);
    }
}
