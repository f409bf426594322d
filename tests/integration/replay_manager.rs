//! Integration tests for the replay manager
//!
//! Tests submission, dispatch to registered workers, status reporting and
//! recovery from the action ledger.

use super::common::fixtures::{capture_bytes, frame_capture, test_config, wait_terminal};
use async_trait::async_trait;
use gfxreplay::capture::{decode_atoms, DEFAULT_MAX_FRAME_SIZE};
use gfxreplay::ledger::{FileLedger, Ledger};
use gfxreplay::replay::{Query, ReplayOutput, ReplayWorker, Task, TaskHandler};
use gfxreplay::stash::{FileStash, Stash, StashKey};
use gfxreplay::{
    Action, ActionId, ActionStatus, AtomId, Ctx, DeviceInstance, DeviceRegistry, GlVersion,
    LocalManager, Manager, ReplayError, ReplayInput, TransformSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn device(id: &str) -> DeviceInstance {
    DeviceInstance::new(id, GlVersion::new(3, 0))
}

fn open_ledger(config: &gfxreplay::Config) -> Arc<dyn Ledger<Action>> {
    let ledger: FileLedger<Action> = FileLedger::open(config.ledger_path()).unwrap();
    Arc::new(ledger)
}

/// Records tasks and leaves reporting to the test.
struct Recorder(mpsc::UnboundedSender<Task>);

#[async_trait]
impl TaskHandler for Recorder {
    async fn handle(&self, _ctx: &Ctx, task: Task) -> Result<(), ReplayError> {
        let _ = self.0.send(task);
        Ok(())
    }
}

#[tokio::test]
async fn test_worker_replays_capture_from_stash() {
    let (config, _dir) = test_config();
    let ctx = Ctx::new("test");
    let stash: Arc<dyn Stash> = Arc::new(FileStash::open(config.stash_dir()).await.unwrap());
    let manager = LocalManager::new(open_ledger(&config), Arc::new(DeviceRegistry::new()));
    let worker = ReplayWorker::new(&manager, stash.clone(), device("phone"), config.pipeline);
    manager
        .register(&ctx, device("host"), device("phone"), Arc::new(worker))
        .await
        .unwrap();

    let capture = stash
        .put(&ctx, capture_bytes(&frame_capture(3, true)))
        .await
        .unwrap();
    let id = manager
        .do_action(
            &ctx,
            "phone",
            ReplayInput {
                capture,
                transforms: vec![TransformSpec::EarlyTerminator { last: AtomId(6) }],
            },
        )
        .await
        .unwrap();

    let action = wait_terminal(manager.as_ref(), &id).await;
    assert_eq!(action.status, ActionStatus::Succeeded);
    let output = action.output.unwrap();
    assert_eq!(output.atoms, 7);
    let bytes = stash.get(&ctx, &output.result.unwrap()).await.unwrap();
    let atoms = decode_atoms(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap();
    assert_eq!(atoms, frame_capture(3, true)[..7].to_vec());
}

#[tokio::test]
async fn test_devices_receive_only_their_tasks_in_order() {
    let ctx = Ctx::new("test");
    let manager = LocalManager::new(
        Arc::new(gfxreplay::ledger::NullLedger),
        Arc::new(DeviceRegistry::new()),
    );
    let (phone_tx, mut phone_rx) = mpsc::unbounded_channel();
    let (tablet_tx, mut tablet_rx) = mpsc::unbounded_channel();
    manager
        .register(&ctx, device("host"), device("phone"), Arc::new(Recorder(phone_tx)))
        .await
        .unwrap();
    manager
        .register(&ctx, device("host"), device("tablet"), Arc::new(Recorder(tablet_tx)))
        .await
        .unwrap();

    let mut phone_ids = Vec::new();
    let mut tablet_ids = Vec::new();
    for i in 0..6u8 {
        let target = if i % 2 == 0 { "phone" } else { "tablet" };
        let input = ReplayInput {
            capture: StashKey::of(&[i]),
            transforms: Vec::new(),
        };
        let id = manager.do_action(&ctx, target, input).await.unwrap();
        if i % 2 == 0 {
            phone_ids.push(id);
        } else {
            tablet_ids.push(id);
        }
    }

    for expected in &phone_ids {
        assert_eq!(&phone_rx.recv().await.unwrap().action, expected);
    }
    for expected in &tablet_ids {
        assert_eq!(&tablet_rx.recv().await.unwrap().action, expected);
    }

    let devices = manager.devices().devices();
    assert!(devices.iter().any(|d| d.id == "phone"));
    assert!(devices.iter().any(|d| d.id == "tablet"));
}

#[tokio::test]
async fn test_failed_replay_is_searchable_by_status() {
    let (config, _dir) = test_config();
    let ctx = Ctx::new("test");
    let stash: Arc<dyn Stash> = Arc::new(FileStash::open(config.stash_dir()).await.unwrap());
    let manager = LocalManager::new(open_ledger(&config), Arc::new(DeviceRegistry::new()));
    let worker = ReplayWorker::new(&manager, stash.clone(), device("phone"), config.pipeline);
    manager
        .register(&ctx, device("host"), device("phone"), Arc::new(worker))
        .await
        .unwrap();

    let missing = ReplayInput {
        capture: StashKey::of(b"not uploaded"),
        transforms: Vec::new(),
    };
    let id = manager.do_action(&ctx, "phone", missing).await.unwrap();
    let action = wait_terminal(manager.as_ref(), &id).await;
    assert_eq!(action.status, ActionStatus::Failed);
    assert!(action.output.unwrap().error.is_some());

    let mut failed: Vec<Action> = Vec::new();
    let query = Query {
        status: Some(ActionStatus::Failed),
        ..Query::all()
    };
    manager.search(&ctx, &query, &mut failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, id);
}

#[tokio::test]
async fn test_restart_keeps_history_and_requeues_pending() {
    let (config, _dir) = test_config();
    let ctx = Ctx::new("test");

    let (done, waiting) = {
        let manager = LocalManager::new(open_ledger(&config), Arc::new(DeviceRegistry::new()));
        let input = |n: u8| ReplayInput {
            capture: StashKey::of(&[n]),
            transforms: Vec::new(),
        };
        let done = manager.do_action(&ctx, "phone", input(1)).await.unwrap();
        manager
            .update(&ctx, &done, ActionStatus::Running, None)
            .await
            .unwrap();
        manager
            .update(
                &ctx,
                &done,
                ActionStatus::Succeeded,
                Some(ReplayOutput {
                    atoms: 3,
                    ..ReplayOutput::default()
                }),
            )
            .await
            .unwrap();
        let waiting = manager.do_action(&ctx, "phone", input(2)).await.unwrap();
        (done, waiting)
    };

    let manager =
        LocalManager::restore(&ctx, open_ledger(&config), Arc::new(DeviceRegistry::new())).unwrap();
    let mut all: Vec<Action> = Vec::new();
    manager.search(&ctx, &Query::all(), &mut all).await.unwrap();
    let ids: Vec<&ActionId> = all.iter().map(|a| &a.id).collect();
    assert_eq!(ids, vec![&done, &waiting]);
    assert_eq!(all[0].status, ActionStatus::Succeeded);
    assert_eq!(all[0].output.as_ref().unwrap().atoms, 3);

    // Only the pending action is handed to the device after restart.
    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .register(&ctx, device("host"), device("phone"), Arc::new(Recorder(tx)))
        .await
        .unwrap();
    let task = rx.recv().await.unwrap();
    assert_eq!(task.action, waiting);
    assert!(
        tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err()
    );
    assert_eq!(
        manager.action(&waiting).unwrap().status,
        ActionStatus::Running
    );
}

#[tokio::test]
async fn test_restore_survives_torn_ledger_append() {
    let (config, _dir) = test_config();
    let ctx = Ctx::new("test");
    let id = {
        let manager = LocalManager::new(open_ledger(&config), Arc::new(DeviceRegistry::new()));
        let input = ReplayInput {
            capture: StashKey::of(b"trace"),
            transforms: Vec::new(),
        };
        manager.do_action(&ctx, "phone", input).await.unwrap()
    };
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(config.ledger_path())
        .unwrap();
    std::io::Write::write_all(&mut file, &[200, 0, 0, 0, b'{']).unwrap();
    drop(file);

    let manager =
        LocalManager::restore(&ctx, open_ledger(&config), Arc::new(DeviceRegistry::new())).unwrap();
    assert_eq!(manager.action(&id).unwrap().status, ActionStatus::Pending);

    // New transitions land after the last complete record.
    manager
        .update(&ctx, &id, ActionStatus::Running, None)
        .await
        .unwrap();
    drop(manager);
    let manager =
        LocalManager::restore(&ctx, open_ledger(&config), Arc::new(DeviceRegistry::new())).unwrap();
    assert_eq!(manager.action(&id).unwrap().status, ActionStatus::Running);
}

#[tokio::test]
async fn test_terminal_status_is_final() {
    let ctx = Ctx::new("test");
    let manager = LocalManager::new(
        Arc::new(gfxreplay::ledger::NullLedger),
        Arc::new(DeviceRegistry::new()),
    );
    let input = ReplayInput {
        capture: StashKey::of(b"trace"),
        transforms: Vec::new(),
    };
    let id = manager.do_action(&ctx, "phone", input).await.unwrap();
    manager
        .update(&ctx, &id, ActionStatus::Failed, Some(ReplayOutput::failed("boom")))
        .await
        .unwrap();

    for status in [
        ActionStatus::Pending,
        ActionStatus::Running,
        ActionStatus::Succeeded,
        ActionStatus::Failed,
    ] {
        let err = manager.update(&ctx, &id, status, None).await.unwrap_err();
        assert_eq!(err.kind(), gfxreplay::ErrorKind::Protocol);
    }
    let action = manager.action(&id).unwrap();
    assert_eq!(action.status, ActionStatus::Failed);
    assert_eq!(action.output.unwrap().error.as_deref(), Some("boom"));
}
