//! Peripheral-side façades served through a [`BusSlave`].

use crate::{
    Error,
    bus::{BusSlave, SlavePort},
    module::{
        config::ModuleConfig,
        metadata::{
            BASE_LEN, SETTINGS_OFFSET, STATUS_OFFSET, Settings, Status, motor_mover,
            speed_monitor::{self, INSTANCE_COUNT, RPS, SAMPLE_POS, SAMPLE_SIZE, SAMPLES, TPS},
        },
    },
    sync::{MirrorBuffer, SlaveBufferManager},
};

/// Common module behaviour on the peripheral side.
///
/// `N` is the bus slave image capacity, `B` the mirror capacity.
pub struct ModuleSlave<'s, P: SlavePort, const N: usize, const B: usize> {
    manager: SlaveBufferManager<'s, P, N, B>,
}

impl<'s, P: SlavePort, const N: usize, const B: usize> ModuleSlave<'s, P, N, B> {
    /// Serves a register block of `len` bytes at the configured address.
    ///
    /// The module reports itself Active from the start.
    pub fn new(slave: &'s BusSlave<P, N>, config: &ModuleConfig, len: usize) -> Result<Self, Error> {
        let mut mirror = MirrorBuffer::new(len.max(BASE_LEN))?;
        mirror.write_u8_at(STATUS_OFFSET, Status::ACTIVE.bits())?;
        let manager = SlaveBufferManager::new(slave, config.identity.to_bytes(), mirror)?
            .with_timeout_ms(config.timeout_ms);
        slave.set_address(config.address);
        Ok(Self { manager })
    }

    pub fn tick(&mut self, now_ms: u32) -> Result<(), Error> {
        self.manager.tick(now_ms)
    }

    /// True while the master keeps polling.
    pub fn connected(&self, now_ms: u32) -> bool {
        self.manager.connected(now_ms)
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.byte(STATUS_OFFSET))
    }

    pub fn settings(&self) -> Settings {
        Settings::from_bits_retain(self.byte(SETTINGS_OFFSET))
    }

    pub fn led(&self) -> bool {
        self.settings().contains(Settings::LED)
    }

    pub fn power(&self) -> bool {
        self.settings().contains(Settings::POWER)
    }

    pub fn set_active(&mut self, on: bool) -> Result<(), Error> {
        self.set_status(Status::ACTIVE, on)
    }

    pub fn set_operational(&mut self, on: bool) -> Result<(), Error> {
        self.set_status(Status::OPERATIONAL, on)
    }

    pub fn set_status(&mut self, flags: Status, on: bool) -> Result<(), Error> {
        let mut status = self.status();
        status.set(flags, on);
        self.manager.write(STATUS_OFFSET, &[status.bits()])
    }

    pub fn mirror(&self) -> &MirrorBuffer<B> {
        self.manager.mirror()
    }

    pub fn mirror_mut(&mut self) -> &mut MirrorBuffer<B> {
        self.manager.mirror_mut()
    }

    fn byte(&self, offset: usize) -> u8 {
        self.manager.mirror().read_u8_at(offset).unwrap_or_default()
    }
}

/// Horn peripheral.
pub struct HornSlave<'s, P: SlavePort, const N: usize> {
    module: ModuleSlave<'s, P, N, { BASE_LEN }>,
}

impl<'s, P: SlavePort, const N: usize> HornSlave<'s, P, N> {
    pub fn new(slave: &'s BusSlave<P, N>, config: &ModuleConfig) -> Result<Self, Error> {
        Ok(Self {
            module: ModuleSlave::new(slave, config, BASE_LEN)?,
        })
    }

    pub fn tick(&mut self, now_ms: u32) -> Result<(), Error> {
        self.module.tick(now_ms)
    }

    /// Horn state requested by the master.
    pub fn horn(&self) -> bool {
        self.module.settings().contains(Settings::HORN)
    }

    pub fn module(&self) -> &ModuleSlave<'s, P, N, { BASE_LEN }> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut ModuleSlave<'s, P, N, { BASE_LEN }> {
        &mut self.module
    }
}

/// Motor mover peripheral.
pub struct MotorMoverSlave<'s, P: SlavePort, const N: usize> {
    module: ModuleSlave<'s, P, N, { motor_mover::LEN }>,
}

impl<'s, P: SlavePort, const N: usize> MotorMoverSlave<'s, P, N> {
    pub fn new(slave: &'s BusSlave<P, N>, config: &ModuleConfig) -> Result<Self, Error> {
        Ok(Self {
            module: ModuleSlave::new(slave, config, motor_mover::LEN)?,
        })
    }

    pub fn tick(&mut self, now_ms: u32) -> Result<(), Error> {
        self.module.tick(now_ms)
    }

    pub fn continuous(&self) -> bool {
        self.module.settings().contains(Settings::MODE)
    }

    /// Engaged state requested by the master.
    pub fn engage_requested(&self) -> bool {
        self.module.settings().contains(Settings::ENGAGED)
    }

    pub fn powered(&self) -> bool {
        self.module.settings().contains(Settings::POWERED)
    }

    /// Reports the mechanism's actual engaged state.
    pub fn set_engaged(&mut self, on: bool) -> Result<(), Error> {
        self.module.set_status(Status::ENGAGED, on)
    }

    pub fn position_engaged(&self) -> u16 {
        self.position(motor_mover::POSITION_ENGAGED)
    }

    pub fn position_disengaged(&self) -> u16 {
        self.position(motor_mover::POSITION_DISENGAGED)
    }

    pub fn continuous_position(&self) -> u16 {
        self.position(motor_mover::CONTINUOUS_POSITION)
    }

    /// Position the servo should be driven to in the current mode.
    pub fn target_position(&self) -> u16 {
        if self.continuous() {
            self.continuous_position()
        } else if self.engage_requested() {
            self.position_engaged()
        } else {
            self.position_disengaged()
        }
    }

    pub fn module(&self) -> &ModuleSlave<'s, P, N, { motor_mover::LEN }> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut ModuleSlave<'s, P, N, { motor_mover::LEN }> {
        &mut self.module
    }

    fn position(&self, offset: usize) -> u16 {
        self.module
            .mirror()
            .read_u16_le_at(offset)
            .unwrap_or_default()
    }
}

/// Speed monitor peripheral with a sample ring per instance.
pub struct SpeedMonitorSlave<'s, P: SlavePort, const N: usize, const B: usize> {
    module: ModuleSlave<'s, P, N, B>,
    instance_count: u8,
    sample_count: u8,
}

impl<'s, P: SlavePort, const N: usize, const B: usize> SpeedMonitorSlave<'s, P, N, B> {
    pub fn new(
        slave: &'s BusSlave<P, N>,
        config: &ModuleConfig,
        instance_count: u8,
        sample_count: u8,
    ) -> Result<Self, Error> {
        if instance_count == 0 || sample_count == 0 {
            return Err(Error::ZeroLength);
        }
        let len = speed_monitor::len(instance_count as usize, sample_count as usize);
        let mut module = ModuleSlave::new(slave, config, len)?;
        module
            .mirror_mut()
            .write(INSTANCE_COUNT, &[instance_count, sample_count])?;
        Ok(Self {
            module,
            instance_count,
            sample_count,
        })
    }

    pub fn tick(&mut self, now_ms: u32) -> Result<(), Error> {
        self.module.tick(now_ms)
    }

    pub fn instance_count(&self) -> u8 {
        self.instance_count
    }

    pub fn sample_count(&self) -> u8 {
        self.sample_count
    }

    /// Sets the conversion constants of `instance`.
    pub fn set_constants(&mut self, instance: u8, rps: u32, tps: u32) -> Result<(), Error> {
        let base = self.instance_offset(instance)?;
        let mirror = self.module.mirror_mut();
        mirror.write_u32_le_at(base + RPS, rps)?;
        mirror.write_u32_le_at(base + TPS, tps)
    }

    pub fn rps(&self, instance: u8) -> Result<u32, Error> {
        let base = self.instance_offset(instance)?;
        self.module.mirror().read_u32_le_at(base + RPS)
    }

    pub fn tps(&self, instance: u8) -> Result<u32, Error> {
        let base = self.instance_offset(instance)?;
        self.module.mirror().read_u32_le_at(base + TPS)
    }

    /// Stores `value` at the sample position and advances it, wrapping.
    pub fn push_sample(&mut self, instance: u8, value: u32) -> Result<(), Error> {
        let base = self.instance_offset(instance)?;
        let count = self.sample_count;
        let mirror = self.module.mirror_mut();
        let pos = mirror.read_u8_at(base + SAMPLE_POS)? % count;
        mirror.write_u32_le_at(base + SAMPLES + pos as usize * SAMPLE_SIZE, value)?;
        mirror.write_u8_at(base + SAMPLE_POS, (pos + 1) % count)
    }

    /// Zeroes the samples of `instance` and rewinds its position.
    pub fn clear_samples(&mut self, instance: u8) -> Result<(), Error> {
        let base = self.instance_offset(instance)?;
        let len = self.sample_count as usize * SAMPLE_SIZE;
        let mirror = self.module.mirror_mut();
        mirror.with_bytes_mut(base + SAMPLES, len, |samples| samples.fill(0))?;
        mirror.write_u8_at(base + SAMPLE_POS, 0)
    }

    pub fn module(&self) -> &ModuleSlave<'s, P, N, B> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut ModuleSlave<'s, P, N, B> {
        &mut self.module
    }

    fn instance_offset(&self, instance: u8) -> Result<usize, Error> {
        if instance >= self.instance_count {
            return Err(Error::OutOfBounds);
        }
        Ok(speed_monitor::instance_offset(
            instance as usize,
            self.sample_count as usize,
        ))
    }
}
