use crate::bus::Address;

/// Outcome of a master bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusResult {
    /// No operation has been started yet.
    #[default]
    Idle,
    /// An operation is in flight.
    Wait,
    /// The operation completed and every byte was acknowledged.
    Success,
    /// A data byte was not acknowledged.
    NackReceived,
    /// The address packet was not acknowledged.
    NoResponse,
    /// Another master won arbitration.
    ArbitrationLost,
    /// Misplaced start or stop condition detected.
    BusError,
}

impl BusResult {
    /// Returns true while the operation is still in flight.
    #[inline]
    pub fn is_pending(self) -> bool {
        self == BusResult::Wait
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == BusResult::Success
    }

    /// Returns true for every transport failure.
    #[inline]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            BusResult::NackReceived
                | BusResult::NoResponse
                | BusResult::ArbitrationLost
                | BusResult::BusError
        )
    }
}

/// Completion record posted by the master interrupt handler.
///
/// Only one operation is ever outstanding, so a single slot holds at most
/// one of these until mainline code takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    pub address: Address,
    pub result: BusResult,
    /// Number of bytes stored in the receive scratch buffer.
    pub received: usize,
}

/// Outcome of the most recent slave transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveResult {
    #[default]
    Idle,
    /// Addressed by a master, transfer in progress.
    Wait,
    /// Master read from us.
    Sent,
    /// Master wrote to us.
    Received,
    /// Receive buffer filled up and further bytes were refused.
    NackSent,
    /// Collision or bus error.
    Error,
}

/// Direction of a transfer seen from the controller that owns the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDirection {
    Send,
    Receive,
}

/// A finished slave transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveEvent {
    pub direction: TransferDirection,
    /// Bytes actually transferred.
    pub len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(BusResult::Wait.is_pending());
        assert!(!BusResult::Idle.is_pending());
        assert!(BusResult::Success.is_success());
        for r in [
            BusResult::NackReceived,
            BusResult::NoResponse,
            BusResult::ArbitrationLost,
            BusResult::BusError,
        ] {
            assert!(r.is_error());
            assert!(!r.is_success());
        }
        assert!(!BusResult::Idle.is_error());
        assert!(!BusResult::Wait.is_error());
    }
}
