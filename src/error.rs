/// Errors that can occur while configuring or driving the bus stack.
///
/// Transport outcomes (NACKs, arbitration loss, bus errors) are not errors
/// here; they are reported as [`BusResult`](crate::bus::BusResult) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Offset or length exceeds buffer bounds.
    OutOfBounds,
    /// Operation attempted with zero length.
    ZeroLength,
    /// A bus operation is still pending.
    Busy,
    /// Bus address outside `1..=127`, or an inverted scan range.
    InvalidAddress,
    /// Register length exceeds 31 bytes.
    RegisterTooLong,
    /// Pinned register offset lies inside the previous register.
    RegisterOverlap,
    /// Fixed-capacity buffer or table is full.
    CapacityExceeded,
    /// Register schema does not cover the mirror buffer exactly.
    SchemaMismatch,
    /// Module name longer than 8 bytes.
    NameTooLong,
    /// Required buffer, image or resize is not in place yet.
    NotReady,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::OutOfBounds => write!(f, "offset or length exceeds buffer bounds"),
            Error::ZeroLength => write!(f, "operation attempted with zero length"),
            Error::Busy => write!(f, "bus operation still pending"),
            Error::InvalidAddress => write!(f, "bus address out of range"),
            Error::RegisterTooLong => write!(f, "register length exceeds 31 bytes"),
            Error::RegisterOverlap => write!(f, "register overlaps the previous one"),
            Error::CapacityExceeded => write!(f, "buffer capacity exceeded"),
            Error::SchemaMismatch => write!(f, "register schema does not match mirror buffer"),
            Error::NameTooLong => write!(f, "module name exceeds 8 bytes"),
            Error::NotReady => write!(f, "required buffer or resize not in place"),
        }
    }
}
