//! Register schemas, mirror buffers and the engines keeping them in step.

#[macro_use]
mod macros;

pub mod config;
pub mod engine;
pub mod mirror;
pub mod register;
pub mod slave_manager;

pub use config::SyncConfig;
pub use engine::{BufferSyncEngine, SyncCycleState, SyncPhase};
pub use mirror::MirrorBuffer;
pub use register::{
    MAX_REGISTER_LEN, Offset, Register, RegisterDescriptor, RegisterDirection, RegisterSchema, Run,
};
pub use slave_manager::SlaveBufferManager;
