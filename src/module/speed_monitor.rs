use bitmaps::{Bits, BitsImpl};

use crate::{
    Error,
    bus::{Address, TwiMaster},
    module::{
        ModuleMaster,
        master::BASE_REGISTERS,
        metadata::speed_monitor::{
            self, INSTANCE_COUNT, MANAGER_LEN, RPS, SAMPLE_COUNT, SAMPLE_POS, SAMPLE_SIZE,
            SAMPLES, SAMPLES_PER_REGISTER, TPS,
        },
    },
    sync::{MirrorBuffer, RegisterDescriptor, RegisterSchema, SyncConfig},
};

/// Instance and sample counts, read every cycle.
const COUNTS: RegisterDescriptor = RegisterDescriptor::read(2).regular();

/// Builds the register table for the given counts.
pub fn schema<const R: usize>(
    instance_count: usize,
    sample_count: usize,
) -> Result<RegisterSchema<R>, Error>
where
    BitsImpl<R>: Bits,
{
    let mut schema = RegisterSchema::from_descriptors(&BASE_REGISTERS)?;
    schema.push(COUNTS)?;
    for _ in 0..instance_count {
        // Constants are read once per resize.
        schema.push(RegisterDescriptor::read(8).with_next_update())?;
        schema.push(RegisterDescriptor::read(1).regular())?;
        let mut remaining = sample_count;
        while remaining > 0 {
            let n = remaining.min(SAMPLES_PER_REGISTER);
            schema.push(RegisterDescriptor::read((n * SAMPLE_SIZE) as u8).regular())?;
            remaining -= n;
        }
    }
    Ok(schema)
}

/// Multi-instance speed monitor whose register layout depends on counts it
/// reports itself.
///
/// Starts with the manager block only. Once the module reports non-zero
/// counts, a resized schema and mirror are handed to the engine; per-instance
/// accessors fail with [`Error::NotReady`] until the engine has taken them.
pub struct SpeedMonitorManager<'m, M: TwiMaster, const R: usize, const B: usize>
where
    BitsImpl<R>: Bits,
{
    module: ModuleMaster<'m, M, R, B>,
    instance_count: u8,
    sample_count: u8,
    pending: Option<u32>,
    ready: bool,
}

impl<'m, M: TwiMaster, const R: usize, const B: usize> SpeedMonitorManager<'m, M, R, B>
where
    BitsImpl<R>: Bits,
{
    pub fn new(master: &'m M, address: Address, config: SyncConfig) -> Result<Self, Error> {
        Ok(Self {
            module: ModuleMaster::with_registers(master, address, config, &[COUNTS])?,
            instance_count: 0,
            sample_count: 0,
            pending: None,
            ready: false,
        })
    }

    pub fn tick(&mut self, now_ms: u32) {
        self.module.tick(now_ms);

        if let Some(generation) = self.pending {
            if self.module.engine().generation() == generation {
                self.pending = None;
                self.ready = true;
                log::info!(
                    "{}: {} instances of {} samples ready",
                    self.module.address(),
                    self.instance_count,
                    self.sample_count
                );
            }
        }

        let mirror = self.module.engine().mirror();
        let instances = mirror.read_u8_at(INSTANCE_COUNT).unwrap_or_default();
        let samples = mirror.read_u8_at(SAMPLE_COUNT).unwrap_or_default();
        if instances == 0 || samples == 0 {
            return;
        }
        if (instances, samples) != (self.instance_count, self.sample_count) {
            if let Err(e) = self.resize(instances, samples) {
                log::error!(
                    "{}: cannot resize to {}x{}: {}",
                    self.module.address(),
                    instances,
                    samples,
                    e
                );
                // Not retried until the counts change again.
                self.instance_count = instances;
                self.sample_count = samples;
                self.pending = None;
                self.ready = false;
            }
        }
    }

    fn resize(&mut self, instances: u8, samples: u8) -> Result<(), Error> {
        let len = speed_monitor::len(instances as usize, samples as usize);
        let schema = schema::<R>(instances as usize, samples as usize)?;
        let mirror = MirrorBuffer::<B>::new(len)?;
        let generation = self
            .module
            .engine_mut()
            .stage_swap(schema, mirror, MANAGER_LEN)?;
        log::debug!(
            "{}: resizing to {}x{} samples, {} bytes",
            self.module.address(),
            instances,
            samples,
            len
        );
        self.instance_count = instances;
        self.sample_count = samples;
        self.pending = Some(generation);
        self.ready = false;
        Ok(())
    }

    /// True once per-instance registers are being synchronised.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn instance_count(&self) -> u8 {
        self.instance_count
    }

    pub fn sample_count(&self) -> u8 {
        self.sample_count
    }

    /// Revolutions-per-second conversion constant of `instance`.
    pub fn rps_constant(&self, instance: u8) -> Result<u32, Error> {
        let offset = self.instance_offset(instance)?;
        self.mirror().read_u32_le_at(offset + RPS)
    }

    /// Ticks-per-second constant of `instance`.
    pub fn tps_constant(&self, instance: u8) -> Result<u32, Error> {
        let offset = self.instance_offset(instance)?;
        self.mirror().read_u32_le_at(offset + TPS)
    }

    /// Index of the sample the module writes next.
    pub fn sample_pos(&self, instance: u8) -> Result<u8, Error> {
        let offset = self.instance_offset(instance)?;
        self.mirror().read_u8_at(offset + SAMPLE_POS)
    }

    pub fn sample(&self, instance: u8, sample: u8) -> Result<u32, Error> {
        if sample >= self.sample_count {
            return Err(Error::OutOfBounds);
        }
        let offset = self.instance_offset(instance)?;
        self.mirror()
            .read_u32_le_at(offset + SAMPLES + sample as usize * SAMPLE_SIZE)
    }

    pub fn module(&self) -> &ModuleMaster<'m, M, R, B> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut ModuleMaster<'m, M, R, B> {
        &mut self.module
    }

    fn mirror(&self) -> &MirrorBuffer<B> {
        self.module.engine().mirror()
    }

    fn instance_offset(&self, instance: u8) -> Result<usize, Error> {
        if !self.ready {
            return Err(Error::NotReady);
        }
        if instance >= self.instance_count {
            return Err(Error::OutOfBounds);
        }
        Ok(speed_monitor::instance_offset(
            instance as usize,
            self.sample_count as usize,
        ))
    }
}
