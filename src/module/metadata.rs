//! Register layout shared by every module, plus the per-peripheral extensions.
//!
//! ```text
//! [0..2]   header 0x5E 0x8A
//! [2]      signature
//! [3]      id
//! [4..12]  name, NUL padded
//! [12]     status
//! [13]     settings
//! [14..]   peripheral registers
//! ```

use bitflags::bitflags;

/// Fixed identity header at offset 0.
pub const HEADER: [u8; 2] = [0x5E, 0x8A];
/// First byte of every slave read response.
pub const RESPONSE_PREFIX: u8 = HEADER[0];

pub const SIGNATURE_OFFSET: usize = 2;
pub const ID_OFFSET: usize = 3;
pub const NAME_OFFSET: usize = 4;
pub const NAME_LEN: usize = 8;
pub const STATUS_OFFSET: usize = NAME_OFFSET + NAME_LEN;
pub const SETTINGS_OFFSET: usize = STATUS_OFFSET + 1;
/// Header, signature, id and name.
pub const IDENTITY_LEN: usize = STATUS_OFFSET;
/// Size of the register block common to all modules.
pub const BASE_LEN: usize = SETTINGS_OFFSET + 1;

bitflags! {
    /// Status byte, reported by the module.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const ACTIVE      = 1 << 0;
        const OPERATIONAL = 1 << 1;
        /// Motor mover only.
        const ENGAGED     = 1 << 2;
    }
}

bitflags! {
    /// Settings byte, written by the master.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Settings: u8 {
        const POWER   = 1 << 0;
        const LED     = 1 << 1;
        /// Horn only.
        const HORN    = 1 << 2;
        /// Motor mover only: continuous positioning instead of engage/disengage.
        const MODE    = 1 << 2;
        /// Motor mover only.
        const ENGAGED = 1 << 3;
        /// Motor mover only.
        const POWERED = 1 << 4;
    }
}

/// Signatures used by the known peripheral families.
pub mod signature {
    use core::ops::RangeInclusive;

    pub const HORN: u8 = 0xAA;
    pub const MOTOR_MOVER: RangeInclusive<u8> = 0x30..=0x38;
    pub const SPEED_MONITOR: u8 = 0x56;
}

/// Peripheral family derived from a module signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Horn,
    MotorMover,
    SpeedMonitor,
    Unknown,
}

impl ModuleKind {
    pub fn from_signature(sig: u8) -> Self {
        match sig {
            signature::HORN => Self::Horn,
            signature::SPEED_MONITOR => Self::SpeedMonitor,
            s if signature::MOTOR_MOVER.contains(&s) => Self::MotorMover,
            _ => Self::Unknown,
        }
    }
}

pub mod motor_mover {
    use super::BASE_LEN;

    pub const POSITION_ENGAGED: usize = BASE_LEN;
    pub const POSITION_DISENGAGED: usize = POSITION_ENGAGED + 2;
    pub const CONTINUOUS_POSITION: usize = POSITION_DISENGAGED + 2;
    pub const LEN: usize = CONTINUOUS_POSITION + 2;
}

/// Multi-instance speed monitor.
///
/// A manager block carries the counts; each instance follows it with
/// two constants, a sample position and `sample_count` samples.
pub mod speed_monitor {
    use super::BASE_LEN;

    pub const INSTANCE_COUNT: usize = BASE_LEN;
    pub const SAMPLE_COUNT: usize = INSTANCE_COUNT + 1;
    pub const MANAGER_LEN: usize = SAMPLE_COUNT + 1;

    /// Offsets within one instance block.
    pub const RPS: usize = 0;
    pub const TPS: usize = RPS + 4;
    pub const SAMPLE_POS: usize = TPS + 4;
    pub const SAMPLES: usize = SAMPLE_POS + 1;
    pub const SAMPLE_SIZE: usize = 4;

    /// Largest sample run placed in one register.
    pub const SAMPLES_PER_REGISTER: usize = 7;

    pub const fn instance_len(sample_count: usize) -> usize {
        SAMPLES + sample_count * SAMPLE_SIZE
    }

    pub const fn instance_offset(index: usize, sample_count: usize) -> usize {
        MANAGER_LEN + index * instance_len(sample_count)
    }

    /// Mirror size for the given counts.
    pub const fn len(instance_count: usize, sample_count: usize) -> usize {
        MANAGER_LEN + instance_count * instance_len(sample_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets() {
        assert_eq!(STATUS_OFFSET, 12);
        assert_eq!(SETTINGS_OFFSET, 13);
        assert_eq!(BASE_LEN, 14);
        assert_eq!(motor_mover::LEN, 20);
        assert_eq!(speed_monitor::MANAGER_LEN, 16);
        assert_eq!(speed_monitor::instance_len(4), 25);
        assert_eq!(speed_monitor::len(2, 4), 66);
        assert_eq!(speed_monitor::instance_offset(1, 4), 41);
    }

    #[test]
    fn kinds_by_signature() {
        assert_eq!(ModuleKind::from_signature(0xAA), ModuleKind::Horn);
        assert_eq!(ModuleKind::from_signature(0x34), ModuleKind::MotorMover);
        assert_eq!(ModuleKind::from_signature(0x56), ModuleKind::SpeedMonitor);
        assert_eq!(ModuleKind::from_signature(0x10), ModuleKind::Unknown);
    }
}
