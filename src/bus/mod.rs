//! Bus controllers, address scanning and module discovery.

pub mod address;
pub mod discovery;
pub mod master;
pub mod port;
pub mod result;
pub mod scanner;
pub mod slave;

pub use address::Address;
pub use discovery::{ModuleCheck, ModuleDescriptor, ModuleDiscovery};
pub use master::{BusMaster, TwiMaster};
pub use port::{
    Acknowledge, MasterCommand, MasterPort, MasterStatus, SlaveCommand, SlavePort, SlaveStatus,
};
pub use result::{BusResult, Completion, SlaveEvent, SlaveResult, TransferDirection};
pub use scanner::{AddressCheck, BusScanner, CheckStep, ProbeCheck, ScanState, Scanner};
pub use slave::{BusSlave, RegisterImage};
