use bitmaps::{Bits, BitsImpl};

use crate::{
    Error,
    bus::{Address, Completion, TwiMaster},
    sync::{
        MirrorBuffer, SyncConfig,
        register::{RegisterDirection, RegisterSchema, Run},
    },
};

/// Where the engine is within its cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncPhase {
    /// No cycle has run yet.
    #[default]
    Idle,
    /// Between cycles, waiting for the interval to elapse.
    Waiting,
    ProcessingCycle,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncCycleState {
    pub phase: SyncPhase,
    /// Index of the next register to consider.
    pub cursor: usize,
    /// Set on the first error of the current cycle.
    pub cycle_error: bool,
    /// Cycles in a row that saw at least one error.
    pub consecutive_errors: u16,
}

/// Keeps a [`MirrorBuffer`] in step with one peripheral's register space.
///
/// Each [`tick`](BufferSyncEngine::tick) drains the outstanding bus
/// operation, if any, and issues at most one new one. Due registers that are
/// adjacent, contiguous and share a direction are coalesced into a single
/// transfer. The engine assumes it is the only user of its master.
///
/// `R` is the register capacity of the schema, `B` the mirror capacity.
pub struct BufferSyncEngine<'m, M: TwiMaster, const R: usize, const B: usize>
where
    BitsImpl<R>: Bits,
{
    master: &'m M,
    address: Address,
    config: SyncConfig,
    schema: RegisterSchema<R>,
    mirror: MirrorBuffer<B>,
    state: SyncCycleState,
    cycle_started: Option<u32>,
    in_flight: Option<Run>,
    staged: Option<Staged<R, B>>,
    generation: u32,
}

/// Replacement schema and mirror waiting for the bus to go quiet.
struct Staged<const R: usize, const B: usize>
where
    BitsImpl<R>: Bits,
{
    schema: RegisterSchema<R>,
    mirror: MirrorBuffer<B>,
    /// Leading bytes laid out the same in both mirrors.
    retain: usize,
}

impl<'m, M: TwiMaster, const R: usize, const B: usize> BufferSyncEngine<'m, M, R, B>
where
    BitsImpl<R>: Bits,
{
    /// Binds a schema and its mirror to the peripheral at `address`.
    ///
    /// Every register is flagged for the first cycle.
    pub fn new(
        master: &'m M,
        address: Address,
        config: SyncConfig,
        mut schema: RegisterSchema<R>,
        mirror: MirrorBuffer<B>,
    ) -> Result<Self, Error> {
        validate(master, &config, &schema, &mirror)?;
        schema.mark_all();
        Ok(Self {
            master,
            address,
            config,
            schema,
            mirror,
            state: SyncCycleState::default(),
            cycle_started: None,
            in_flight: None,
            staged: None,
            generation: 0,
        })
    }

    /// Advances the engine by at most one bus operation.
    pub fn tick(&mut self, now_ms: u32) {
        if !self.poll_in_flight() {
            return;
        }
        self.apply_staged();

        if self.state.phase != SyncPhase::ProcessingCycle && self.cycle_due(now_ms) {
            self.cycle_started = Some(now_ms);
            self.state.phase = SyncPhase::ProcessingCycle;
            self.state.cursor = 0;
            self.state.cycle_error = false;
        }

        if self.state.phase == SyncPhase::ProcessingCycle {
            self.issue_next();
        }
    }

    /// Writes into the mirror and flags the overlapping write registers.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        self.mirror.write(offset, data)?;
        self.schema.mark_writes_overlapping(offset, data.len());
        Ok(())
    }

    /// Runs `f` on `[offset, offset + len)` of the mirror, then flags the
    /// overlapping write registers.
    pub fn with_mirror_mut<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut MirrorBuffer<B>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let value = f(&mut self.mirror)?;
        self.schema.mark_writes_overlapping(offset, len);
        Ok(value)
    }

    /// Flags every register for the next cycle.
    pub fn request_full_update(&mut self) {
        self.schema.mark_all();
    }

    pub fn mirror(&self) -> &MirrorBuffer<B> {
        &self.mirror
    }

    pub fn schema(&self) -> &RegisterSchema<R> {
        &self.schema
    }

    pub fn state(&self) -> SyncCycleState {
        self.state
    }

    pub fn consecutive_errors(&self) -> u16 {
        self.state.consecutive_errors
    }

    /// Number of schema swaps that have taken effect.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    /// Queues a replacement schema and mirror.
    ///
    /// The swap happens on a later tick once no operation is in flight.
    /// The first `retain` bytes share their layout between the old and new
    /// mirror: when the swap takes effect they are copied from the live
    /// mirror, and write registers in that region still waiting to go out
    /// stay flagged. Returns the generation that signals the swap took
    /// effect. A swap that is still queued is replaced.
    pub fn stage_swap(
        &mut self,
        schema: RegisterSchema<R>,
        mirror: MirrorBuffer<B>,
        retain: usize,
    ) -> Result<u32, Error> {
        validate(self.master, &self.config, &schema, &mirror)?;
        if retain > mirror.len() {
            return Err(Error::OutOfBounds);
        }
        self.staged = Some(Staged {
            schema,
            mirror,
            retain,
        });
        Ok(self.generation.wrapping_add(1))
    }

    pub fn is_swap_pending(&self) -> bool {
        self.staged.is_some()
    }

    fn cycle_due(&self, now_ms: u32) -> bool {
        self.cycle_started
            .is_none_or(|started| now_ms.wrapping_sub(started) >= self.config.interval_ms)
    }

    fn max_run_len(&self) -> usize {
        max_payload(self.master, &self.config)
    }

    /// Returns true once nothing is in flight.
    fn poll_in_flight(&mut self) -> bool {
        let Some(run) = self.in_flight else {
            return true;
        };

        let completion = match self.master.take_completion() {
            Some(completion) => completion,
            None if self.master.result().is_pending() => return false,
            None => {
                log::warn!("{}: completion lost", self.address);
                self.in_flight = None;
                self.fail(&run);
                return true;
            }
        };
        self.in_flight = None;
        self.drain(&run, completion);
        true
    }

    fn drain(&mut self, run: &Run, completion: Completion) {
        if completion.address != self.address {
            log::warn!(
                "{}: completion for {} while syncing",
                self.address,
                completion.address
            );
            self.fail(run);
            return;
        }
        if !completion.result.is_success() {
            log::debug!(
                "{}: {:?} of {} bytes at {} failed: {:?}",
                self.address,
                run.direction,
                run.len,
                run.offset,
                completion.result
            );
            self.fail(run);
            return;
        }

        if run.direction == RegisterDirection::Read {
            let master = self.master;
            let header = self.config.header_len;
            let copied = self
                .mirror
                .with_bytes_mut(run.offset as usize, run.len, |dst| {
                    master.read_received(header, dst)
                });
            if copied != Ok(run.len) {
                log::debug!("{}: short read at {}", self.address, run.offset);
                self.fail(run);
            }
        }
    }

    fn issue_next(&mut self) {
        let Some(run) = self.schema.next_run(self.state.cursor, self.max_run_len()) else {
            self.end_cycle();
            return;
        };

        let master = self.master;
        let address = self.address;
        let issued = match run.direction {
            RegisterDirection::Write => self
                .mirror
                .with_bytes(run.offset as usize, run.len, |data| {
                    master.write_to_address(address, run.offset, data)
                })
                .and_then(core::convert::identity),
            RegisterDirection::Read => {
                master.read_from_address(address, run.offset, run.len + self.config.header_len)
            }
        };

        match issued {
            Ok(()) => {
                self.schema.clear_run(&run);
                self.in_flight = Some(run);
                self.state.cursor = run.first + run.count;
            }
            // Retried on the next tick.
            Err(Error::Busy) => {}
            Err(e) => {
                log::error!(
                    "{}: cannot issue {} bytes at {}: {}",
                    self.address,
                    run.len,
                    run.offset,
                    e
                );
                self.record_error();
                self.state.cursor = run.first + run.count;
            }
        }
    }

    fn fail(&mut self, run: &Run) {
        self.schema.mark_run(run);
        self.record_error();
    }

    fn record_error(&mut self) {
        if self.state.cycle_error {
            return;
        }
        self.state.cycle_error = true;
        self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
        log::warn!(
            "{}: sync cycle failed ({} in a row)",
            self.address,
            self.state.consecutive_errors
        );
    }

    fn end_cycle(&mut self) {
        self.state.phase = SyncPhase::Waiting;
        if !self.state.cycle_error && self.state.consecutive_errors > 0 {
            log::info!(
                "{}: sync recovered after {} failed cycles",
                self.address,
                self.state.consecutive_errors
            );
            self.state.consecutive_errors = 0;
        }
    }

    fn apply_staged(&mut self) {
        let Some(Staged {
            mut schema,
            mut mirror,
            retain,
        }) = self.staged.take()
        else {
            return;
        };

        let retain = retain.min(self.mirror.len());
        if retain > 0 {
            match self.mirror.with_bytes(0, retain, |live| mirror.write(0, live)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) | Err(e) => {
                    log::error!("{}: cannot carry {} bytes over: {}", self.address, retain, e)
                }
            }
        }
        // Local writes made since staging only flagged the old schema.
        for (index, reg) in self.schema.iter().enumerate() {
            if reg.direction == RegisterDirection::Write
                && reg.end() <= retain
                && self.schema.next_update(index)
            {
                schema.mark_writes_overlapping(reg.offset as usize, reg.len as usize);
            }
        }

        self.schema = schema;
        self.mirror = mirror;
        self.state.cursor = 0;
        self.generation = self.generation.wrapping_add(1);
        log::debug!(
            "{}: schema swapped, {} registers over {} bytes (generation {})",
            self.address,
            self.schema.len(),
            self.mirror.len(),
            self.generation
        );
    }
}

fn max_payload<M: TwiMaster>(master: &M, config: &SyncConfig) -> usize {
    // Writes spend one scratch byte on the register address.
    master.capacity().saturating_sub(config.header_len.max(1))
}

fn validate<M: TwiMaster, const R: usize, const B: usize>(
    master: &M,
    config: &SyncConfig,
    schema: &RegisterSchema<R>,
    mirror: &MirrorBuffer<B>,
) -> Result<(), Error>
where
    BitsImpl<R>: Bits,
{
    if schema.span() != mirror.len() {
        return Err(Error::SchemaMismatch);
    }
    let max = max_payload(master, config);
    if schema.iter().any(|reg| reg.len as usize > max) {
        return Err(Error::CapacityExceeded);
    }
    Ok(())
}
