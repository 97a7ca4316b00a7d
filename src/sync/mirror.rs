use crate::{Error, helpers::range_span};

/// Local byte image of a peripheral's register space.
///
/// Capacity is fixed at `N` bytes; the length is chosen at construction and
/// only changes by replacing the whole buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorBuffer<const N: usize> {
    bytes: heapless::Vec<u8, N>,
}

impl<const N: usize> MirrorBuffer<N> {
    /// Zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Result<Self, Error> {
        let mut bytes = heapless::Vec::new();
        bytes.resize(len, 0).map_err(|_| Error::CapacityExceeded)?;
        Ok(Self { bytes })
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let bytes = heapless::Vec::from_slice(data).map_err(|_| Error::CapacityExceeded)?;
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn with_bytes<R>(
        &self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, Error> {
        let (start, end) = range_span(self.bytes.len(), offset, len)?;
        Ok(f(&self.bytes[start..end]))
    }

    pub fn with_bytes_mut<R>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, Error> {
        let (start, end) = range_span(self.bytes.len(), offset, len)?;
        Ok(f(&mut self.bytes[start..end]))
    }

    /// Copies `out.len()` bytes starting at `offset`.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), Error> {
        self.with_bytes(offset, out.len(), |src| out.copy_from_slice(src))
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        self.with_bytes_mut(offset, data.len(), |dst| dst.copy_from_slice(data))
    }

    pub fn bit(&self, offset: usize, bit: u8) -> Result<bool, Error> {
        Ok(self.read_u8_at(offset)? & (1 << bit) != 0)
    }

    pub fn set_bit(&mut self, offset: usize, bit: u8, value: bool) -> Result<(), Error> {
        let byte = self.read_u8_at(offset)?;
        let byte = if value {
            byte | (1 << bit)
        } else {
            byte & !(1 << bit)
        };
        self.write_u8_at(offset, byte)
    }

    /// Reads the bit field selected by `mask`, shifted down to bit 0.
    pub fn field(&self, offset: usize, mask: u8) -> Result<u8, Error> {
        let byte = self.read_u8_at(offset)? & mask;
        Ok(byte.checked_shr(mask.trailing_zeros()).unwrap_or(0))
    }

    /// Replaces the bit field selected by `mask`; excess bits of `value` are dropped.
    pub fn set_field(&mut self, offset: usize, mask: u8, value: u8) -> Result<(), Error> {
        let byte = self.read_u8_at(offset)?;
        let shifted = value.checked_shl(mask.trailing_zeros()).unwrap_or(0) & mask;
        self.write_u8_at(offset, (byte & !mask) | shifted)
    }

    impl_read_primitives!();
    impl_write_primitives!();
}
