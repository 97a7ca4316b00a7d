//! Basic example: a controller and a horn module on one bus
//!
//! This example demonstrates:
//! - Placing a `BusMaster` and a `BusSlave` on their hardware ports
//! - Serving a horn module with `HornSlave`
//! - Driving it from the controller with the `Horn` façade
//! - Settings written by the controller and status read back by it
//!
//! The two ports are joined by an in-memory wire instead of real TWI
//! hardware. On a board each side runs on its own MCU and `on_interrupt` is
//! called from the TWI vector.

#![no_std]

use core::cell::RefCell;

use twi_module::{
    bus::{Acknowledge, MasterCommand, MasterStatus, SlaveCommand, SlaveStatus},
    prelude::*,
};

// ============ Wire ============
// Each port action on one side raises the matching interrupt on the other.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Addressed { read: bool },
    Transfer { read: bool },
}

struct Wire {
    phase: Phase,
    slave_address: Option<Address>,
    slave_enabled: bool,
    master_status: MasterStatus,
    master_irq: Option<MasterStatus>,
    master_rx: u8,
    slave_status: SlaveStatus,
    slave_irq: Option<SlaveStatus>,
    slave_rx: u8,
    slave_tx: u8,
}

impl Wire {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            slave_address: None,
            slave_enabled: false,
            master_status: MasterStatus::empty(),
            master_irq: None,
            master_rx: 0,
            slave_status: SlaveStatus::empty(),
            slave_irq: None,
            slave_rx: 0,
            slave_tx: 0,
        }
    }
}

struct ControllerPort<'w>(&'w RefCell<Wire>);

impl MasterPort for ControllerPort<'_> {
    fn status(&mut self) -> MasterStatus {
        self.0.borrow().master_status
    }

    fn start(&mut self, address_byte: u8) {
        let mut wire = self.0.borrow_mut();
        let read = address_byte & 1 == 1;
        let matched = wire.slave_enabled
            && wire.slave_address.map(Address::get) == Some(address_byte >> 1);
        if matched {
            let mut status = SlaveStatus::ADDRESS_INTERRUPT | SlaveStatus::ADDRESS_MATCH;
            status.set(SlaveStatus::READ, read);
            wire.slave_irq = Some(status);
            wire.phase = Phase::Addressed { read };
        } else {
            if wire.phase != Phase::Idle {
                wire.slave_irq = Some(SlaveStatus::ADDRESS_INTERRUPT);
                wire.phase = Phase::Idle;
            }
            wire.master_irq = Some(MasterStatus::WRITE_INTERRUPT | MasterStatus::RX_NACK);
        }
    }

    fn write_data(&mut self, byte: u8) {
        let mut wire = self.0.borrow_mut();
        wire.slave_rx = byte;
        wire.slave_irq = Some(SlaveStatus::DATA_INTERRUPT);
    }

    fn read_data(&mut self) -> u8 {
        self.0.borrow().master_rx
    }

    fn command(&mut self, _ack: Acknowledge, command: MasterCommand) {
        let mut wire = self.0.borrow_mut();
        match command {
            MasterCommand::ReceiveNext => {
                wire.slave_irq = Some(SlaveStatus::DATA_INTERRUPT | SlaveStatus::READ);
            }
            MasterCommand::Stop => {
                if wire.phase != Phase::Idle {
                    wire.slave_irq = Some(SlaveStatus::ADDRESS_INTERRUPT);
                }
                wire.phase = Phase::Idle;
            }
            MasterCommand::NoAction => {}
        }
    }

    fn bus_idle(&mut self) -> bool {
        self.0.borrow().phase == Phase::Idle
    }
}

struct ModulePort<'w>(&'w RefCell<Wire>);

impl SlavePort for ModulePort<'_> {
    fn status(&mut self) -> SlaveStatus {
        self.0.borrow().slave_status
    }

    fn read_data(&mut self) -> u8 {
        self.0.borrow().slave_rx
    }

    fn write_data(&mut self, byte: u8) {
        self.0.borrow_mut().slave_tx = byte;
    }

    fn respond(&mut self, ack: Acknowledge, command: SlaveCommand) {
        let mut wire = self.0.borrow_mut();
        match wire.phase {
            Phase::Addressed { read: false } => {
                wire.phase = Phase::Transfer { read: false };
                wire.master_irq = Some(MasterStatus::WRITE_INTERRUPT);
            }
            Phase::Addressed { read: true } => {
                wire.phase = Phase::Transfer { read: true };
                wire.slave_irq = Some(SlaveStatus::DATA_INTERRUPT | SlaveStatus::READ);
            }
            Phase::Transfer { read: false } => {
                let mut status = MasterStatus::WRITE_INTERRUPT;
                status.set(MasterStatus::RX_NACK, ack == Acknowledge::Nack);
                wire.master_irq = Some(status);
            }
            Phase::Transfer { read: true } if command == SlaveCommand::Response => {
                wire.master_rx = wire.slave_tx;
                wire.master_irq = Some(MasterStatus::READ_INTERRUPT);
            }
            _ => {}
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().slave_enabled = enabled;
    }

    fn set_address(&mut self, address: Address) {
        self.0.borrow_mut().slave_address = Some(address);
    }
}

/// Stands in for the two TWI interrupt vectors.
fn pump(
    wire: &RefCell<Wire>,
    master: &BusMaster<ControllerPort<'_>, 32>,
    slave: &BusSlave<ModulePort<'_>, 64>,
) {
    loop {
        let slave_irq = wire.borrow_mut().slave_irq.take();
        if let Some(status) = slave_irq {
            wire.borrow_mut().slave_status = status;
            slave.on_interrupt();
            continue;
        }
        let master_irq = wire.borrow_mut().master_irq.take();
        if let Some(status) = master_irq {
            wire.borrow_mut().master_status = status;
            master.on_interrupt();
            continue;
        }
        return;
    }
}

pub fn main() {
    let wire = RefCell::new(Wire::new());
    let master = BusMaster::<_, 32>::new(ControllerPort(&wire));
    let slave = BusSlave::<_, 64>::new(ModulePort(&wire));
    let address = Address::new(42).unwrap();

    // ========== Module side ==========
    // Identity and address come from the module's configuration block
    let config = ModuleConfigBuilder::new()
        .address(address)
        .identity(ModuleIdentity::new(0xAA, 0, "horn").unwrap())
        .build();
    let mut module = HornSlave::new(&slave, &config).unwrap();

    // ========== Controller side ==========
    let mut horn = Horn::new(&master, address, SyncConfig::new()).unwrap();
    horn.set_horn(true).unwrap();
    horn.module_mut().set_led(true).unwrap();

    // ========== Main loops ==========
    // Both sides tick on a 5 ms clock for half a second
    for step in 0..100u32 {
        let now = step * 5;
        horn.tick(now);
        pump(&wire, &master, &slave);
        module.tick(now).unwrap();
        if module.horn() {
            // The module reports that it acted on the request
            module.module_mut().set_operational(true).unwrap();
        }
    }

    assert!(module.horn());
    assert!(module.module().led());
    assert_eq!(horn.module().name(), "horn");
    assert!(horn.module().operational());
    assert_eq!(horn.module().consecutive_errors(), 0);
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_example() {
        super::main();
    }
}
