use crate::Error;

/// A 7-bit bus address in the range `1..=127`.
///
/// Address 0 is the general call address and is never used for a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(u8);

impl Address {
    /// Lowest valid peripheral address.
    pub const MIN: Address = Address(1);
    /// Highest valid peripheral address.
    pub const MAX: Address = Address(127);

    /// Returns `None` if `raw` is outside `1..=127`.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw >= Self::MIN.0 && raw <= Self::MAX.0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Address packet for a master write (R/W bit clear).
    #[inline]
    pub const fn write_byte(self) -> u8 {
        self.0 << 1
    }

    /// Address packet for a master read (R/W bit set).
    #[inline]
    pub const fn read_byte(self) -> u8 {
        (self.0 << 1) | 1
    }

    /// The following address, or `None` past [`Address::MAX`].
    pub const fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Address::new(raw).ok_or(Error::InvalidAddress)
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> u8 {
        address.0
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
