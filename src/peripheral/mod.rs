//! On-chip peripherals and the contract the tick scheduler drives them
//! through.
//!
//! A peripheral never holds a reference back into the chipset.  Every hook
//! gets a [`PeripheralContext`] carrying this cycle's clock snapshot and
//! scheduler state plus the narrow set of interrupt operations a device
//! is allowed to perform.

pub mod external;
pub mod io_ports;
pub mod power;
pub mod rtc;
pub mod timer;
pub mod timer_base;
pub mod watchdog;

use crate::chipset::clock::ClockSnapshot;
use crate::chipset::interrupt::InterruptController;
use crate::chipset::line::MaskableLine;
use crate::chipset::variant::{
    HardwareVariant, SLOT_AL1, SLOT_BLOW, SLOT_EXI3, SLOT_L16384S, SLOT_TM0,
};
use crate::chipset::RunMode;
use crate::config::ChipsetConfig;
use crate::error::ChipsetError;

pub use external::ExternalInterrupts;
pub use io_ports::{IoPorts, PinInput, PortInputs};
pub use power::PowerSupply;
pub use rtc::RealTimeClock;
pub use timer::Timer;
pub use timer_base::TimerBaseCounter;
pub use watchdog::WatchdogTimer;

/// Which clock a peripheral's `tick` is gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDomain {
    /// Every master cycle.
    Always,
    LowSpeed,
    HighSpeed,
    System,
    /// Never ticked.
    Stopped,
}

/// A byte range of SFR space owned by one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: u16,
    pub size: u16,
    pub name: &'static str,
}

impl Region {
    pub const fn new(base: u16, size: u16, name: &'static str) -> Self {
        Self { base, size, name }
    }

    /// One past the last address, as `u32` so `0xFFFF` regions work.
    pub fn end(&self) -> u32 {
        self.base as u32 + self.size as u32
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.base && (address as u32) < self.end()
    }
}

/// Scheduler-level state visible to peripherals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerState {
    pub run_mode: RunMode,
    /// Master cycles since power-on.
    pub cycle: u64,
    pub cycles_per_second: u32,
    /// What the host is doing to each port pin.
    pub port_inputs: PortInputs,
    pub battery_voltage: f32,
    pub solar_panel_voltage: f32,
}

/// What a peripheral may touch while one of its hooks runs.
pub struct PeripheralContext<'a> {
    interrupts: &'a mut InterruptController,
    reset_request: &'a mut bool,
    pins: &'a mut [bool; 4],
    pub clock: ClockSnapshot,
    pub state: SchedulerState,
}

impl<'a> PeripheralContext<'a> {
    pub(crate) fn new(
        interrupts: &'a mut InterruptController,
        reset_request: &'a mut bool,
        pins: &'a mut [bool; 4],
        clock: ClockSnapshot,
        state: SchedulerState,
    ) -> Self {
        Self {
            interrupts,
            reset_request,
            pins,
            clock,
            state,
        }
    }

    pub fn try_raise(&mut self, line: MaskableLine) {
        self.interrupts.try_raise(line);
    }

    pub fn reset_int(&mut self, line: MaskableLine) {
        self.interrupts.reset_int(line);
    }

    pub fn set_enabled(&mut self, line: MaskableLine, enabled: bool) {
        self.interrupts.set_enabled(line, enabled);
    }

    pub fn request_nonmaskable(&mut self) {
        self.interrupts.request_nonmaskable();
    }

    /// Level on external interrupt pin `pin` (EXI0..EXI3).
    pub fn pin_level(&self, pin: usize) -> bool {
        self.pins.get(pin).copied().unwrap_or(true)
    }

    pub fn set_pin_level(&mut self, pin: usize, level: bool) {
        if let Some(p) = self.pins.get_mut(pin) {
            *p = level;
        }
    }

    /// Ask for a full chipset reset once the current dispatch pass ends.
    pub fn request_reset(&mut self) {
        *self.reset_request = true;
    }
}

/// A memory-mapped on-chip device.
pub trait Peripheral {
    fn name(&self) -> &'static str;

    /// Queried every cycle: a device may switch domains at run time.
    fn domain(&self) -> ClockDomain;

    /// BLKCON0 bit that powers this device down, if any.
    fn block_bit(&self) -> Option<u8> {
        None
    }

    fn regions(&self) -> Vec<Region>;

    fn read(&mut self, address: u16, ctx: &mut PeripheralContext) -> u8;
    fn write(&mut self, address: u16, data: u8, ctx: &mut PeripheralContext);

    /// Block bit cleared.
    fn initialise(&mut self, _ctx: &mut PeripheralContext) {}
    /// Block bit set.
    fn uninitialise(&mut self, _ctx: &mut PeripheralContext) {}

    fn reset(&mut self, _ctx: &mut PeripheralContext) {}
    fn tick(&mut self, _ctx: &mut PeripheralContext) {}
    fn tick_after_interrupts(&mut self, _ctx: &mut PeripheralContext) {}

    /// LTBR was written: resynchronise instead of ticking this cycle.
    fn reset_lsclk(&mut self, _ctx: &mut PeripheralContext) {}
}

/// Build the on-chip peripherals wired on `variant`.  A device is left
/// out when one of its interrupt lines does not exist.
pub fn standard_set(
    variant: HardwareVariant,
    config: &ChipsetConfig,
    interrupts: &InterruptController,
) -> Result<Vec<Box<dyn Peripheral>>, ChipsetError> {
    let lines = interrupts.line_count();
    let mut set: Vec<Box<dyn Peripheral>> = Vec::new();

    set.push(Box::new(WatchdogTimer::new(
        config.watchdog_enabled,
        variant.params().has_wdtmod,
    )));
    if lines > SLOT_AL1 {
        set.push(Box::new(RealTimeClock::new(interrupts)?));
    }
    if lines > SLOT_L16384S {
        set.push(Box::new(TimerBaseCounter::new(interrupts)?));
    }
    if lines > SLOT_BLOW {
        set.push(Box::new(PowerSupply::new(interrupts, config.battery_voltage)?));
    }
    if lines > SLOT_TM0 {
        set.push(Box::new(Timer::new(interrupts)?));
    }
    set.push(Box::new(IoPorts::new(variant.params().has_port1_mode1)));
    if lines > SLOT_EXI3 {
        set.push(Box::new(ExternalInterrupts::new(interrupts)?));
    }
    Ok(set)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Harness for driving a single peripheral without a chipset.

    use super::*;

    pub struct Bench {
        pub interrupts: InterruptController,
        pub reset_request: bool,
        pub pins: [bool; 4],
        pub clock: ClockSnapshot,
        pub state: SchedulerState,
    }

    impl Bench {
        /// ClassWiz II sized controller with every line unmasked.
        pub fn new() -> Self {
            let mut interrupts = InterruptController::new(21, (1 << 22) - 1);
            for offset in 0..3 {
                interrupts.write_mask(offset, 0xFF);
            }
            Self {
                interrupts,
                reset_request: false,
                pins: [true; 4],
                clock: ClockSnapshot::default(),
                state: SchedulerState {
                    run_mode: RunMode::Running,
                    cycle: 0,
                    cycles_per_second: 1_048_576,
                    port_inputs: PortInputs::default(),
                    battery_voltage: 3.0,
                    solar_panel_voltage: 0.0,
                },
            }
        }

        pub fn ctx(&mut self) -> PeripheralContext<'_> {
            PeripheralContext::new(
                &mut self.interrupts,
                &mut self.reset_request,
                &mut self.pins,
                self.clock,
                self.state,
            )
        }

        pub fn is_active(&self, slot: usize) -> bool {
            self.interrupts.is_active(slot + crate::chipset::line::INT_MASKABLE)
        }

        pub fn clear(&mut self) {
            self.interrupts.write_pending(0, 0);
            self.interrupts.write_pending(1, 0);
            self.interrupts.write_pending(2, 0);
        }
    }
}
