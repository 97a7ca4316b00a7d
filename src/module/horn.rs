use crate::{
    Error,
    bus::{Address, TwiMaster},
    module::{
        ModuleMaster,
        metadata::{BASE_LEN, Settings},
    },
    sync::SyncConfig,
};

/// Horn module: the common block plus one settings bit.
pub struct Horn<'m, M: TwiMaster> {
    module: ModuleMaster<'m, M, 3, { BASE_LEN }>,
}

impl<'m, M: TwiMaster> Horn<'m, M> {
    pub fn new(master: &'m M, address: Address, config: SyncConfig) -> Result<Self, Error> {
        Ok(Self {
            module: ModuleMaster::new(master, address, config)?,
        })
    }

    pub fn tick(&mut self, now_ms: u32) {
        self.module.tick(now_ms);
    }

    pub fn horn(&self) -> bool {
        self.module.settings().contains(Settings::HORN)
    }

    pub fn set_horn(&mut self, on: bool) -> Result<(), Error> {
        self.module.set_settings(Settings::HORN, on)
    }

    pub fn module(&self) -> &ModuleMaster<'m, M, 3, { BASE_LEN }> {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut ModuleMaster<'m, M, 3, { BASE_LEN }> {
        &mut self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        module::metadata::SETTINGS_OFFSET,
        test_support::{MockMaster, addr, module_image},
    };

    #[test]
    fn horn_bit_sits_next_to_common_settings() {
        let master = MockMaster::new();
        master.attach(addr(42), &module_image(0xAA, 0, b"horn"));
        let mut horn = Horn::new(&master, addr(42), SyncConfig::new()).unwrap();
        for _ in 0..4 {
            horn.tick(0);
        }

        horn.set_horn(true).unwrap();
        horn.module_mut().set_led(true).unwrap();
        for _ in 0..4 {
            horn.tick(40);
        }
        assert!(horn.horn());
        assert_eq!(master.image(addr(42))[SETTINGS_OFFSET], 0b110);
    }
}
