pub mod atom;
pub mod capture;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod ledger;
pub mod replay;
pub mod rpc;
pub mod stash;
pub mod state;
pub mod transform;

pub use atom::{Atom, AtomId, AtomOp, IdSpace};
pub use config::Config;
pub use context::Ctx;
pub use device::{DeviceInstance, DeviceRegistry, GlVersion};
pub use error::ErrorKind;
pub use replay::{Action, ActionId, ActionStatus, LocalManager, Manager, ReplayError, ReplayInput};
pub use state::State;
pub use transform::{Pass, Transform, TransformSpec, Tweaker, Writer};
