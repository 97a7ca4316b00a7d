//! Digital inputs and outputs used by module applications.

use core::cell::Cell;

/// Readable value, such as a switch or a sensor reading.
pub trait Input<T> {
    fn get(&self) -> T;
}

/// Writable value, such as an LED.
pub trait Output<T> {
    fn set(&self, value: T);
}

impl<T: Copy> Input<T> for Cell<T> {
    fn get(&self) -> T {
        Cell::get(self)
    }
}

impl<T: Copy> Output<T> for Cell<T> {
    fn set(&self, value: T) {
        Cell::set(self, value)
    }
}

/// Operating mode of a module application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientMode {
    /// Driven by the bus master.
    Connected,
    /// Driven by local controls.
    Manual,
}

/// Chooses between master control and local control.
///
/// The manual switch always wins. Without it the module follows the master
/// while the master keeps polling.
pub struct ModeSelector<'a, S: Input<bool>, L: Output<bool>> {
    manual_switch: &'a S,
    led: &'a L,
    mode: Option<ClientMode>,
}

impl<'a, S: Input<bool>, L: Output<bool>> ModeSelector<'a, S, L> {
    pub fn new(manual_switch: &'a S, led: &'a L) -> Self {
        Self {
            manual_switch,
            led,
            mode: None,
        }
    }

    /// Re-evaluates the mode and drives the LED.
    ///
    /// In [`ClientMode::Connected`] the LED mirrors `led_setting`, the state
    /// requested by the master. In [`ClientMode::Manual`] it is lit.
    pub fn update(&mut self, connected: bool, led_setting: bool) -> ClientMode {
        let mode = if connected && !self.manual_switch.get() {
            ClientMode::Connected
        } else {
            ClientMode::Manual
        };
        if self.mode != Some(mode) {
            log::info!("mode {:?}", mode);
            self.mode = Some(mode);
        }
        self.led.set(match mode {
            ClientMode::Connected => led_setting,
            ClientMode::Manual => true,
        });
        mode
    }

    /// Mode chosen by the last [`update`](Self::update).
    pub fn mode(&self) -> Option<ClientMode> {
        self.mode
    }
}
