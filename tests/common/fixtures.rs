//! Capture and server fixtures

use std::sync::Arc;
use std::time::Duration;

use gfxreplay::atom::{BufferId, BufferTarget, BufferUsage, Capability, ContextId, SurfaceId};
use gfxreplay::capture::encode_atoms;
use gfxreplay::ledger::FileLedger;
use gfxreplay::replay::Query;
use gfxreplay::rpc::AppState;
use gfxreplay::stash::FileStash;
use gfxreplay::{
    Action, ActionId, Atom, AtomId, AtomOp, Config, Ctx, DeviceRegistry, LocalManager, Manager,
};
use tempfile::TempDir;

/// Number atoms from zero.
pub fn numbered(ops: Vec<AtomOp>) -> Vec<(AtomId, Atom)> {
    ops.into_iter()
        .enumerate()
        .map(|(i, op)| (AtomId(i as u64), Atom::new(op)))
        .collect()
}

/// An atom that touches no GL state.
pub fn opaque(name: &str) -> AtomOp {
    AtomOp::Opaque {
        name: name.to_string(),
        params: serde_json::Value::Null,
    }
}

/// A single-context capture of `frames` frames. Every frame uploads a
/// fresh buffer, toggles depth testing and swaps.
pub fn frame_capture(frames: u32, preserve_buffers_on_swap: bool) -> Vec<(AtomId, Atom)> {
    let mut ops = vec![
        AtomOp::CreateContext {
            context: ContextId(1),
            preserve_buffers_on_swap,
        },
        AtomOp::MakeCurrent {
            context: ContextId(1),
            draw: SurfaceId(1),
        },
    ];
    for frame in 0..frames {
        let buffer = BufferId(frame + 1);
        ops.push(if frame % 2 == 0 {
            AtomOp::Enable {
                capability: Capability::DepthTest,
            }
        } else {
            AtomOp::Disable {
                capability: Capability::DepthTest,
            }
        });
        ops.push(AtomOp::GenBuffers {
            buffers: vec![buffer],
        });
        ops.push(AtomOp::BindBuffer {
            target: BufferTarget::ArrayBuffer,
            buffer,
        });
        ops.push(AtomOp::BufferData {
            target: BufferTarget::ArrayBuffer,
            data: vec![frame as u8; 16],
            usage: BufferUsage::StaticDraw,
        });
        ops.push(AtomOp::SwapBuffers {
            surface: SurfaceId(1),
        });
    }
    numbered(ops)
}

pub fn capture_bytes(atoms: &[(AtomId, Atom)]) -> Vec<u8> {
    encode_atoms(atoms).expect("encode capture")
}

/// Config rooted in a fresh temporary data directory.
pub fn test_config() -> (Config, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config::from_toml_str(dir.path().to_path_buf(), "").expect("default config");
    (config, dir)
}

/// Server state with an on-disk stash and ledger in a temporary directory.
pub async fn test_state() -> (AppState, TempDir) {
    let (config, dir) = test_config();
    let stash = FileStash::open(config.stash_dir())
        .await
        .expect("Failed to open stash");
    let ledger: FileLedger<Action> =
        FileLedger::open(config.ledger_path()).expect("Failed to open ledger");
    let manager = LocalManager::new(Arc::new(ledger), Arc::new(DeviceRegistry::new()));
    (AppState::new(config, manager, Arc::new(stash)), dir)
}

/// Poll `manager` until the action reaches a terminal status.
pub async fn wait_terminal(manager: &dyn Manager, id: &ActionId) -> Action {
    let ctx = Ctx::new("test");
    for _ in 0..400 {
        let mut found: Vec<Action> = Vec::new();
        manager
            .search(&ctx, &Query::by_id(id.clone()), &mut found)
            .await
            .expect("search");
        if let Some(action) = found.pop() {
            if action.status.is_terminal() {
                return action;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("action {id} never finished");
}
