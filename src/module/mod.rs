//! Module identity, configuration and typed peripheral façades.
//!
//! Master façades wrap a [`BufferSyncEngine`](crate::sync::BufferSyncEngine)
//! per module; slave façades wrap a
//! [`SlaveBufferManager`](crate::sync::SlaveBufferManager).

pub mod config;
pub mod horn;
pub mod io;
pub mod master;
pub mod metadata;
pub mod motor_mover;
pub mod slave;
pub mod speed_monitor;

pub use config::{DisconnectPolicy, ModuleConfig, ModuleConfigBuilder, ModuleIdentity};
pub use horn::Horn;
pub use io::{ClientMode, Input, ModeSelector, Output};
pub use master::ModuleMaster;
pub use metadata::{ModuleKind, Settings, Status};
pub use motor_mover::MotorMover;
pub use slave::{HornSlave, ModuleSlave, MotorMoverSlave, SpeedMonitorSlave};
pub use speed_monitor::SpeedMonitorManager;
