//! Watchdog timer.
//!
//! Counts the 256 Hz tap of the HTBR output.  The first overflow raises
//! the non-maskable interrupt; a second one without a clear in between
//! resets the chip.  Firmware clears the counter by writing 0x5A then
//! 0xA5 to WDTCON, the second write landing while WDP reads as 1.
//! Most calculators never enable it, in which case it never ticks.

use log::{debug, warn};

use super::{ClockDomain, Peripheral, PeripheralContext, Region};

pub const WDTCON: u16 = 0xF00E;
pub const WDTMOD: u16 = 0xF00F;

/// HTBR output bit sampled.
const TAP: u8 = 0x20;
const WDTMOD_RESET: u8 = 2;

pub struct WatchdogTimer {
    enabled: bool,
    has_wdtmod: bool,
    wdtcon: u8,
    wdtmod: u8,
    /// WDP: toggles on every WDTCON write.
    wdp: bool,
    counter: u32,
    overflowed: bool,
}

impl WatchdogTimer {
    pub fn new(enabled: bool, has_wdtmod: bool) -> Self {
        Self {
            enabled,
            has_wdtmod,
            wdtcon: 0,
            wdtmod: WDTMOD_RESET,
            wdp: false,
            counter: 0,
            overflowed: false,
        }
    }

    fn clear(&mut self) {
        self.wdtcon = 0;
        self.wdtmod = WDTMOD_RESET;
        self.wdp = false;
        self.counter = 0;
        self.overflowed = false;
    }

    /// Overflow period in 256 Hz ticks.
    pub fn period(&self) -> u32 {
        32 << (2 * self.wdtmod as u32)
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl Peripheral for WatchdogTimer {
    fn name(&self) -> &'static str {
        "WatchdogTimer"
    }

    fn domain(&self) -> ClockDomain {
        if self.enabled {
            ClockDomain::HighSpeed
        } else {
            ClockDomain::Stopped
        }
    }

    fn regions(&self) -> Vec<Region> {
        let mut regions = vec![Region::new(WDTCON, 1, "WatchdogTimer/WDTCON")];
        if self.has_wdtmod {
            regions.push(Region::new(WDTMOD, 1, "WatchdogTimer/WDTMOD"));
        }
        regions
    }

    fn read(&mut self, address: u16, _ctx: &mut PeripheralContext) -> u8 {
        match address {
            WDTCON => self.wdp as u8,
            WDTMOD => self.wdtmod,
            _ => 0,
        }
    }

    fn write(&mut self, address: u16, data: u8, _ctx: &mut PeripheralContext) {
        match address {
            WDTCON => {
                if self.wdp && self.wdtcon == 0x5A && data == 0xA5 {
                    debug!("[wdt] cleared at count {}", self.counter);
                    self.counter = 0;
                    self.overflowed = false;
                }
                self.wdp = !self.wdp;
                self.wdtcon = data;
            }
            WDTMOD => self.wdtmod = data & 0x03,
            _ => {}
        }
    }

    fn reset(&mut self, _ctx: &mut PeripheralContext) {
        self.clear();
    }

    fn tick(&mut self, ctx: &mut PeripheralContext) {
        if ctx.clock.hs_output & TAP == 0 {
            return;
        }
        self.counter += 1;
        if self.counter < self.period() {
            return;
        }
        if self.overflowed {
            warn!("[wdt] second overflow, resetting");
            ctx.request_reset();
        } else {
            debug!("[wdt] overflow, raising NMI");
            ctx.request_nonmaskable();
            self.wdtcon = 0;
            self.wdp = false;
            self.counter = 0;
            self.overflowed = true;
        }
    }
}
