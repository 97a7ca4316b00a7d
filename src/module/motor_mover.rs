use crate::{
    Error,
    bus::{Address, TwiMaster},
    module::{
        ModuleMaster,
        metadata::{Settings, Status, motor_mover},
    },
    sync::{RegisterDescriptor, SyncConfig},
};

/// Position registers written by the master.
const REGISTERS: [RegisterDescriptor; 3] = [
    RegisterDescriptor::write(2),
    RegisterDescriptor::write(2),
    RegisterDescriptor::write(2),
];

type Inner<'m, M> = ModuleMaster<'m, M, 6, { motor_mover::LEN }>;

/// Servo-driven engage/disengage mechanism.
pub struct MotorMover<'m, M: TwiMaster> {
    module: Inner<'m, M>,
}

impl<'m, M: TwiMaster> MotorMover<'m, M> {
    pub fn new(master: &'m M, address: Address, config: SyncConfig) -> Result<Self, Error> {
        Ok(Self {
            module: ModuleMaster::with_registers(master, address, config, &REGISTERS)?,
        })
    }

    pub fn tick(&mut self, now_ms: u32) {
        self.module.tick(now_ms);
    }

    /// Engaged state reported by the module.
    pub fn engaged(&self) -> bool {
        self.module.status().contains(Status::ENGAGED)
    }

    pub fn set_engaged(&mut self, on: bool) -> Result<(), Error> {
        self.module.set_settings(Settings::ENGAGED, on)
    }

    /// Continuous mode tracks [`set_continuous_position`](Self::set_continuous_position).
    pub fn set_continuous(&mut self, on: bool) -> Result<(), Error> {
        self.module.set_settings(Settings::MODE, on)
    }

    pub fn set_powered(&mut self, on: bool) -> Result<(), Error> {
        self.module.set_settings(Settings::POWERED, on)
    }

    pub fn position_engaged(&self) -> u16 {
        self.position(motor_mover::POSITION_ENGAGED)
    }

    pub fn set_position_engaged(&mut self, position: u16) -> Result<(), Error> {
        self.set_position(motor_mover::POSITION_ENGAGED, position)
    }

    pub fn position_disengaged(&self) -> u16 {
        self.position(motor_mover::POSITION_DISENGAGED)
    }

    pub fn set_position_disengaged(&mut self, position: u16) -> Result<(), Error> {
        self.set_position(motor_mover::POSITION_DISENGAGED, position)
    }

    pub fn continuous_position(&self) -> u16 {
        self.position(motor_mover::CONTINUOUS_POSITION)
    }

    pub fn set_continuous_position(&mut self, position: u16) -> Result<(), Error> {
        self.set_position(motor_mover::CONTINUOUS_POSITION, position)
    }

    pub fn module(&self) -> &Inner<'m, M> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Inner<'m, M> {
        &mut self.module
    }

    fn position(&self, offset: usize) -> u16 {
        self.module
            .engine()
            .mirror()
            .read_u16_le_at(offset)
            .unwrap_or_default()
    }

    fn set_position(&mut self, offset: usize, position: u16) -> Result<(), Error> {
        self.module
            .engine_mut()
            .write(offset, &position.to_le_bytes())
    }
}
