use bitmaps::{Bitmap, Bits, BitsImpl};

use crate::{Error, helpers::overlaps};

/// Longest register the wire format can describe.
pub const MAX_REGISTER_LEN: u8 = 31;

/// Transfer direction of a register as seen from the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterDirection {
    /// Master reads the register from the peripheral.
    Read,
    /// Master writes the register to the peripheral.
    Write,
}

/// Placement of a register inside the mirror buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// Directly after the previous register.
    Auto,
    At(u8),
}

/// Static description of one register, as listed in a schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub direction: RegisterDirection,
    /// Transferred on every cycle.
    pub regular_update: bool,
    /// Transferred on the next cycle only.
    pub next_update: bool,
    pub len: u8,
    pub offset: Offset,
}

impl RegisterDescriptor {
    pub const fn read(len: u8) -> Self {
        Self {
            direction: RegisterDirection::Read,
            regular_update: false,
            next_update: false,
            len,
            offset: Offset::Auto,
        }
    }

    pub const fn write(len: u8) -> Self {
        Self {
            direction: RegisterDirection::Write,
            ..Self::read(len)
        }
    }

    pub const fn regular(self) -> Self {
        Self {
            regular_update: true,
            ..self
        }
    }

    pub const fn with_next_update(self) -> Self {
        Self {
            next_update: true,
            ..self
        }
    }

    /// Pins the register at `offset`, which must not be below the end of
    /// the register before it.
    pub const fn at(self, offset: u8) -> Self {
        Self {
            offset: Offset::At(offset),
            ..self
        }
    }
}

/// A register with its offset resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub direction: RegisterDirection,
    pub regular_update: bool,
    pub len: u8,
    pub offset: u8,
}

impl Register {
    /// First byte after the register.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset as usize + self.len as usize
    }
}

/// Adjacent due registers merged into a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Index of the first register.
    pub first: usize,
    pub count: usize,
    pub direction: RegisterDirection,
    pub offset: u8,
    /// Combined length in bytes.
    pub len: usize,
}

/// Ordered register table with per-register `next_update` flags.
///
/// Offsets are resolved as registers are pushed: an [`Offset::Auto`]
/// register starts where the previous one ended.
#[derive(Clone)]
pub struct RegisterSchema<const N: usize>
where
    BitsImpl<N>: Bits,
{
    registers: heapless::Vec<Register, N>,
    next: Bitmap<N>,
}

impl<const N: usize> Default for RegisterSchema<N>
where
    BitsImpl<N>: Bits,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for RegisterSchema<N>
where
    BitsImpl<N>: Bits,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterSchema")
            .field("registers", &self.registers.as_slice())
            .field("span", &self.span())
            .finish()
    }
}

impl<const N: usize> RegisterSchema<N>
where
    BitsImpl<N>: Bits,
{
    pub fn new() -> Self {
        Self {
            registers: heapless::Vec::new(),
            next: Bitmap::new(),
        }
    }

    pub fn from_descriptors(descriptors: &[RegisterDescriptor]) -> Result<Self, Error> {
        let mut schema = Self::new();
        schema.extend(descriptors)?;
        Ok(schema)
    }

    /// Appends a register and returns its index.
    pub fn push(&mut self, descriptor: RegisterDescriptor) -> Result<usize, Error> {
        if descriptor.len > MAX_REGISTER_LEN {
            return Err(Error::RegisterTooLong);
        }

        let end = self.registers.last().map_or(0, Register::end);
        let offset = match descriptor.offset {
            Offset::At(offset) if (offset as usize) < end => return Err(Error::RegisterOverlap),
            Offset::At(offset) => offset,
            Offset::Auto => u8::try_from(end).map_err(|_| Error::OutOfBounds)?,
        };

        let index = self.registers.len();
        self.registers
            .push(Register {
                direction: descriptor.direction,
                regular_update: descriptor.regular_update,
                len: descriptor.len,
                offset,
            })
            .map_err(|_| Error::CapacityExceeded)?;
        self.next.set(index, descriptor.next_update);
        Ok(index)
    }

    pub fn extend(&mut self, descriptors: &[RegisterDescriptor]) -> Result<(), Error> {
        for descriptor in descriptors {
            self.push(*descriptor)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Register> {
        self.registers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.registers.iter()
    }

    /// Number of mirror bytes covered, i.e. the highest register end.
    pub fn span(&self) -> usize {
        self.registers.iter().map(Register::end).max().unwrap_or(0)
    }

    pub fn next_update(&self, index: usize) -> bool {
        index < self.registers.len() && self.next.get(index)
    }

    pub fn set_next_update(&mut self, index: usize, value: bool) {
        if index < self.registers.len() {
            self.next.set(index, value);
        }
    }

    /// True if the register takes part in the current cycle.
    pub fn is_due(&self, index: usize) -> bool {
        self.registers
            .get(index)
            .is_some_and(|r| r.regular_update || self.next.get(index))
    }

    /// Flags every register for the next cycle.
    pub fn mark_all(&mut self) {
        for index in 0..self.registers.len() {
            self.next.set(index, true);
        }
    }

    /// Flags every write register overlapping `[offset, offset + len)`.
    ///
    /// Returns the number of registers flagged.
    pub fn mark_writes_overlapping(&mut self, offset: usize, len: usize) -> usize {
        let mut marked = 0;
        for (index, reg) in self.registers.iter().enumerate() {
            if reg.direction == RegisterDirection::Write
                && overlaps(reg.offset as usize, reg.len as usize, offset, len)
            {
                self.next.set(index, true);
                marked += 1;
            }
        }
        marked
    }

    /// Finds the first due register at or after `from` and extends it over
    /// following registers that share its direction, start exactly where the
    /// run ends, and are due themselves. The run never exceeds `max_len`.
    pub fn next_run(&self, from: usize, max_len: usize) -> Option<Run> {
        let first = (from..self.registers.len()).find(|&i| {
            let reg = &self.registers[i];
            reg.len > 0 && reg.len as usize <= max_len && self.is_due(i)
        })?;

        let head = self.registers[first];
        let mut end = head.end();
        let mut count = 1;
        for (index, reg) in self.registers.iter().enumerate().skip(first + 1) {
            let contiguous = reg.offset as usize == end;
            let fits = end + reg.len as usize - head.offset as usize <= max_len;
            if reg.direction != head.direction || !contiguous || !fits || !self.is_due(index) {
                break;
            }
            end += reg.len as usize;
            count += 1;
        }

        Some(Run {
            first,
            count,
            direction: head.direction,
            offset: head.offset,
            len: end - head.offset as usize,
        })
    }

    pub fn clear_run(&mut self, run: &Run) {
        self.apply_run(run, false);
    }

    pub fn mark_run(&mut self, run: &Run) {
        self.apply_run(run, true);
    }

    fn apply_run(&mut self, run: &Run, value: bool) {
        let end = (run.first + run.count).min(self.registers.len());
        for index in run.first..end {
            self.next.set(index, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestSchema = RegisterSchema<8>;

    fn offsets(schema: &TestSchema) -> heapless::Vec<u8, 8> {
        schema.iter().map(|r| r.offset).collect()
    }

    #[test]
    fn auto_offsets_are_contiguous() {
        let schema = TestSchema::from_descriptors(&[
            RegisterDescriptor::read(12),
            RegisterDescriptor::read(1).regular(),
            RegisterDescriptor::write(1),
        ])
        .unwrap();
        assert_eq!(offsets(&schema).as_slice(), &[0, 12, 13]);
        assert_eq!(schema.span(), 14);
    }

    #[test]
    fn pinned_offset_moves_following_registers() {
        let schema = TestSchema::from_descriptors(&[
            RegisterDescriptor::read(2),
            RegisterDescriptor::read(4).at(10),
            RegisterDescriptor::read(1),
        ])
        .unwrap();
        assert_eq!(offsets(&schema).as_slice(), &[0, 10, 14]);
        assert_eq!(schema.span(), 15);
    }

    #[test]
    fn push_errors() {
        let mut schema = TestSchema::new();
        assert_eq!(
            schema.push(RegisterDescriptor::read(32)),
            Err(Error::RegisterTooLong)
        );
        assert_eq!(schema.push(RegisterDescriptor::read(31)), Ok(0));

        let mut full = RegisterSchema::<2>::new();
        full.push(RegisterDescriptor::read(1)).unwrap();
        full.push(RegisterDescriptor::read(1)).unwrap();
        assert_eq!(
            full.push(RegisterDescriptor::read(1)),
            Err(Error::CapacityExceeded)
        );

        // Auto offset past 255
        let mut far = TestSchema::new();
        far.push(RegisterDescriptor::read(31).at(250)).unwrap();
        assert_eq!(
            far.push(RegisterDescriptor::read(1)),
            Err(Error::OutOfBounds)
        );
    }

    #[test]
    fn pinned_offset_cannot_overlap() {
        let mut schema = TestSchema::new();
        schema.push(RegisterDescriptor::read(4)).unwrap();
        assert_eq!(
            schema.push(RegisterDescriptor::write(2).at(3)),
            Err(Error::RegisterOverlap)
        );
        assert_eq!(
            schema.push(RegisterDescriptor::write(2).at(0)),
            Err(Error::RegisterOverlap)
        );
        assert_eq!(schema.len(), 1);

        // Directly adjacent is fine
        assert_eq!(schema.push(RegisterDescriptor::write(2).at(4)), Ok(1));
        assert_eq!(
            RegisterSchema::<4>::from_descriptors(&[
                RegisterDescriptor::read(2).at(6),
                RegisterDescriptor::read(2).at(5),
            ])
            .err(),
            Some(Error::RegisterOverlap)
        );
    }

    #[test]
    fn due_write_registers_coalesce() {
        let mut schema = TestSchema::from_descriptors(&[
            RegisterDescriptor::write(1),
            RegisterDescriptor::write(1),
            RegisterDescriptor::write(2),
            RegisterDescriptor::write(1),
        ])
        .unwrap();
        schema.mark_all();

        let run = schema.next_run(0, 31).unwrap();
        assert_eq!(
            run,
            Run {
                first: 0,
                count: 4,
                direction: RegisterDirection::Write,
                offset: 0,
                len: 5,
            }
        );
    }

    #[test]
    fn run_boundaries() {
        let mut schema = TestSchema::from_descriptors(&[
            RegisterDescriptor::read(2).with_next_update(),
            RegisterDescriptor::read(2).with_next_update(),
            // direction change
            RegisterDescriptor::write(1).with_next_update(),
            // not due
            RegisterDescriptor::write(1),
            RegisterDescriptor::write(1).with_next_update(),
            // gap
            RegisterDescriptor::write(1).with_next_update().at(20),
        ])
        .unwrap();

        let run = schema.next_run(0, 31).unwrap();
        assert_eq!((run.first, run.count, run.len), (0, 2, 4));

        let run = schema.next_run(2, 31).unwrap();
        assert_eq!((run.first, run.count, run.len), (2, 1, 1));

        let run = schema.next_run(3, 31).unwrap();
        assert_eq!((run.first, run.count, run.len), (4, 1, 1));

        let run = schema.next_run(5, 31).unwrap();
        assert_eq!((run.first, run.offset), (5, 20));

        // Length cap splits the first run
        let run = schema.next_run(0, 3).unwrap();
        assert_eq!((run.first, run.count, run.len), (0, 1, 2));

        schema.clear_run(&Run {
            first: 0,
            count: 6,
            direction: RegisterDirection::Read,
            offset: 0,
            len: 0,
        });
        assert_eq!(schema.next_run(0, 31), None);
    }

    #[test]
    fn regular_registers_stay_due() {
        let mut schema =
            TestSchema::from_descriptors(&[RegisterDescriptor::read(1).regular()]).unwrap();
        let run = schema.next_run(0, 31).unwrap();
        schema.clear_run(&run);
        assert!(schema.is_due(0));
        assert!(!schema.next_update(0));
    }

    #[test]
    fn zero_length_registers_are_skipped() {
        let mut schema = TestSchema::from_descriptors(&[
            RegisterDescriptor::read(0),
            RegisterDescriptor::read(1),
        ])
        .unwrap();
        schema.mark_all();
        assert_eq!(schema.next_run(0, 31).unwrap().first, 1);
    }

    #[test]
    fn local_writes_flag_overlapping_write_registers() {
        let mut schema = TestSchema::from_descriptors(&[
            RegisterDescriptor::read(12),
            RegisterDescriptor::read(1).regular(),
            RegisterDescriptor::write(1),
            RegisterDescriptor::write(2),
        ])
        .unwrap();

        // Status byte only: read register, nothing flagged
        assert_eq!(schema.mark_writes_overlapping(12, 1), 0);
        // Settings byte
        assert_eq!(schema.mark_writes_overlapping(13, 1), 1);
        assert!(schema.next_update(2));
        assert!(!schema.next_update(3));
        // Range spanning both write registers
        assert_eq!(schema.mark_writes_overlapping(13, 2), 2);
        assert!(schema.next_update(3));
        // Adjacent but not overlapping
        let mut fresh = TestSchema::from_descriptors(&[
            RegisterDescriptor::read(13),
            RegisterDescriptor::write(1),
        ])
        .unwrap();
        assert_eq!(fresh.mark_writes_overlapping(14, 1), 0);
    }
}
