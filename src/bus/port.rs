//! Hardware seams for the bus controllers.
//!
//! A board support crate implements [`MasterPort`] and/or [`SlavePort`] over
//! its TWI peripheral registers. The controllers in this crate only talk to
//! the hardware through these traits, which keeps the protocol state machines
//! testable on the host.

use bitflags::bitflags;

use crate::bus::Address;

bitflags! {
    /// Master status register snapshot.
    ///
    /// Bit positions follow the AVR `TWI.MSTATUS` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MasterStatus: u8 {
        /// A byte was received (RIF).
        const READ_INTERRUPT   = 1 << 7;
        /// An address or data byte was sent (WIF).
        const WRITE_INTERRUPT  = 1 << 6;
        /// The last byte sent was not acknowledged (RXACK).
        const RX_NACK          = 1 << 4;
        const ARBITRATION_LOST = 1 << 3;
        const BUS_ERROR        = 1 << 2;
    }
}

bitflags! {
    /// Slave status register snapshot.
    ///
    /// Bit positions follow the AVR `TWI.SSTATUS` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlaveStatus: u8 {
        /// Data interrupt (DIF).
        const DATA_INTERRUPT    = 1 << 7;
        /// Address or stop interrupt (APIF).
        const ADDRESS_INTERRUPT = 1 << 6;
        /// Master did not acknowledge the last byte we sent (RXACK).
        const RX_NACK           = 1 << 4;
        const COLLISION         = 1 << 3;
        const BUS_ERROR         = 1 << 2;
        /// Master is reading from us (DIR).
        const READ              = 1 << 1;
        /// APIF was caused by an address match rather than a stop (AP).
        const ADDRESS_MATCH     = 1 << 0;
    }
}

/// Acknowledge action sent with the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledge {
    Ack,
    Nack,
}

/// Master command issued after servicing an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterCommand {
    /// Release the interrupt without further bus action.
    NoAction,
    /// Acknowledge the received byte and clock in the next one.
    ReceiveNext,
    /// Issue a stop condition.
    Stop,
}

/// Slave command issued after servicing an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveCommand {
    NoAction,
    /// Finish the transaction and wait for the next start condition.
    Complete,
    /// Continue the transaction.
    Response,
}

/// Register-level access to a TWI master peripheral.
pub trait MasterPort {
    /// Reads the status flags of the pending interrupt.
    fn status(&mut self) -> MasterStatus;
    /// Emits a start (or repeated start) condition followed by `address_byte`.
    fn start(&mut self, address_byte: u8);
    /// Shifts out one data byte.
    fn write_data(&mut self, byte: u8);
    /// Returns the byte received with the pending read interrupt.
    fn read_data(&mut self) -> u8;
    /// Clears the pending interrupt with the given acknowledge and command.
    fn command(&mut self, ack: Acknowledge, command: MasterCommand);
    /// Returns true when the bus state machine reports an idle bus.
    fn bus_idle(&mut self) -> bool;
}

/// Register-level access to a TWI slave peripheral.
pub trait SlavePort {
    fn status(&mut self) -> SlaveStatus;
    fn read_data(&mut self) -> u8;
    fn write_data(&mut self, byte: u8);
    /// Clears the pending interrupt with the given acknowledge and command.
    fn respond(&mut self, ack: Acknowledge, command: SlaveCommand);
    /// Enables or disables address matching.
    fn set_enabled(&mut self, enabled: bool);
    fn set_address(&mut self, address: Address);
}
