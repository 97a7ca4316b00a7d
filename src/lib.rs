//! A `no_std`, no-alloc TWI (I2C) stack for modular embedded boards.
//!
//! A controller board talks to a set of peripheral modules over a shared
//! two-wire bus. Every module exposes a small byte-addressed register space;
//! both sides keep a mirror of it and the controller keeps the two in step.
//!
//! # Features
//!
//! - **Interrupt-driven controllers** - [`BusMaster`](bus::BusMaster) and
//!   [`BusSlave`](bus::BusSlave) run their state machines from the TWI
//!   interrupt and post results for mainline code
//! - **Discovery** - incremental address sweeps that verify the module header
//! - **Register mirroring** - a declared register schema drives periodic
//!   reads and write-on-change, with adjacent registers coalesced
//! - **Typed façades** - common module block plus horn, motor mover and speed
//!   monitor layouts on both sides of the bus
//!
//! # Architecture
//!
//! ```text
//!  Controller                                   Module
//! ┌─────────────────────────┐                 ┌─────────────────────────┐
//! │ Horn / MotorMover / ... │                 │ HornSlave / ...         │
//! │   ModuleMaster          │                 │   ModuleSlave           │
//! │     BufferSyncEngine    │                 │     SlaveBufferManager  │
//! │     (schema + mirror)   │                 │     (mirror)            │
//! │           │             │                 │           ▲             │
//! │           ▼             │   TWI  frames   │           │             │
//! │       BusMaster  ───────┼────────────────▶│       BusSlave          │
//! │       (ISR)      ◀──────┼─────────────────┼─────  (ISR, image)      │
//! └─────────────────────────┘  0x5E + image   └─────────────────────────┘
//! ```
//!
//! - The **engine** issues at most one bus operation per tick and drains its
//!   completion on a later tick
//! - **Writes** go out when local code changed a write register
//! - **Reads** refresh read registers every cycle or once on request
//! - The **slave** answers reads from its image and records which bytes the
//!   master wrote, so mainline code can fold them into its mirror
//!
//! # Example
//!
//! ```rust,ignore
//! use twi_module::prelude::*;
//!
//! static MASTER: BusMaster<MyPort, 32> = BusMaster::new(MyPort::take());
//!
//! // TWI master vector
//! fn twi_master_isr() {
//!     MASTER.on_interrupt();
//! }
//!
//! let address = Address::new(42).unwrap();
//! let mut horn = Horn::new(&MASTER, address, SyncConfig::new())?;
//! horn.set_horn(true)?;
//! loop {
//!     horn.tick(millis());
//! }
//! ```

#![deny(unsafe_code)]
#![no_std]

pub mod bus;
pub mod error;
pub mod helpers;
pub mod module;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use error::Error;

pub mod prelude {
    pub use crate::{
        Error,
        bus::{
            Address, BusMaster, BusResult, BusScanner, BusSlave, Completion, MasterPort,
            ModuleDescriptor, ModuleDiscovery, SlavePort, TwiMaster,
        },
        module::{
            ClientMode, DisconnectPolicy, Horn, HornSlave, Input, ModeSelector, ModuleConfig,
            ModuleConfigBuilder, ModuleIdentity, ModuleKind, ModuleMaster, ModuleSlave,
            MotorMover, MotorMoverSlave, Output, SpeedMonitorManager, SpeedMonitorSlave,
        },
        sync::{
            BufferSyncEngine, MirrorBuffer, RegisterDescriptor, RegisterSchema, SlaveBufferManager,
            SyncConfig,
        },
    };
}
