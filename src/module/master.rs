use bitmaps::{Bits, BitsImpl};

use crate::{
    Error,
    bus::{Address, TwiMaster},
    module::{
        config::{DisconnectPolicy, name_str},
        metadata::{
            ID_OFFSET, IDENTITY_LEN, NAME_LEN, NAME_OFFSET, SETTINGS_OFFSET, SIGNATURE_OFFSET,
            STATUS_OFFSET, Settings, Status,
        },
    },
    sync::{BufferSyncEngine, MirrorBuffer, RegisterDescriptor, RegisterSchema, SyncConfig},
};

/// Registers every module starts with: identity, status and settings.
pub const BASE_REGISTERS: [RegisterDescriptor; 3] = [
    RegisterDescriptor::read(IDENTITY_LEN as u8),
    RegisterDescriptor::read(1).regular(),
    RegisterDescriptor::write(1),
];

/// Master-side view of one module.
///
/// Wraps a [`BufferSyncEngine`] and exposes the common registers as typed
/// accessors. Setters only touch the mirror; the change goes out on the
/// next sync cycle.
pub struct ModuleMaster<'m, M: TwiMaster, const R: usize, const B: usize>
where
    BitsImpl<R>: Bits,
{
    engine: BufferSyncEngine<'m, M, R, B>,
}

impl<'m, M: TwiMaster, const R: usize, const B: usize> ModuleMaster<'m, M, R, B>
where
    BitsImpl<R>: Bits,
{
    /// Module with only the common registers.
    pub fn new(master: &'m M, address: Address, config: SyncConfig) -> Result<Self, Error> {
        Self::with_registers(master, address, config, &[])
    }

    /// Module with `extra` registers following the common ones.
    pub fn with_registers(
        master: &'m M,
        address: Address,
        config: SyncConfig,
        extra: &[RegisterDescriptor],
    ) -> Result<Self, Error> {
        let mut schema = RegisterSchema::from_descriptors(&BASE_REGISTERS)?;
        schema.extend(extra)?;
        let mirror = MirrorBuffer::new(schema.span())?;
        Ok(Self {
            engine: BufferSyncEngine::new(master, address, config, schema, mirror)?,
        })
    }

    pub fn tick(&mut self, now_ms: u32) {
        self.engine.tick(now_ms);
    }

    pub fn address(&self) -> Address {
        self.engine.address()
    }

    pub fn signature(&self) -> u8 {
        self.byte(SIGNATURE_OFFSET)
    }

    pub fn id(&self) -> u8 {
        self.byte(ID_OFFSET)
    }

    pub fn name(&self) -> &str {
        self.engine
            .mirror()
            .as_slice()
            .get(NAME_OFFSET..NAME_OFFSET + NAME_LEN)
            .map_or("", name_str)
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.byte(STATUS_OFFSET))
    }

    pub fn settings(&self) -> Settings {
        Settings::from_bits_retain(self.byte(SETTINGS_OFFSET))
    }

    pub fn active(&self) -> bool {
        self.status().contains(Status::ACTIVE)
    }

    pub fn operational(&self) -> bool {
        self.status().contains(Status::OPERATIONAL)
    }

    pub fn led(&self) -> bool {
        self.settings().contains(Settings::LED)
    }

    pub fn power(&self) -> bool {
        self.settings().contains(Settings::POWER)
    }

    pub fn set_led(&mut self, on: bool) -> Result<(), Error> {
        self.set_settings(Settings::LED, on)
    }

    pub fn set_power(&mut self, on: bool) -> Result<(), Error> {
        self.set_settings(Settings::POWER, on)
    }

    /// Sets or clears `flags` in the settings register.
    pub fn set_settings(&mut self, flags: Settings, on: bool) -> Result<(), Error> {
        let mut settings = self.settings();
        settings.set(flags, on);
        self.engine.write(SETTINGS_OFFSET, &[settings.bits()])
    }

    pub fn consecutive_errors(&self) -> u16 {
        self.engine.consecutive_errors()
    }

    pub fn is_disconnected(&self, policy: &DisconnectPolicy) -> bool {
        policy.is_disconnected(self.consecutive_errors())
    }

    pub fn engine(&self) -> &BufferSyncEngine<'m, M, R, B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut BufferSyncEngine<'m, M, R, B> {
        &mut self.engine
    }

    // The mirror always covers the common block.
    fn byte(&self, offset: usize) -> u8 {
        self.engine.mirror().read_u8_at(offset).unwrap_or_default()
    }
}
