//! 16-bit interval timer (Timer 0).
//!
//! Counts prescaled LSCLK or HSCLK ticks up to the TM0D interval, then
//! wraps to zero and raises TM0INT.  An interval of zero holds the
//! counter at zero.

use super::{ClockDomain, Peripheral, PeripheralContext, Region};
use crate::chipset::interrupt::InterruptController;
use crate::chipset::line::MaskableLine;
use crate::chipset::variant::SLOT_TM0;
use crate::error::ChipsetError;

pub const TM0D: u16 = 0xF020;
pub const TM0C: u16 = 0xF022;
pub const TM0CON0: u16 = 0xF024;
pub const TM0CON1: u16 = 0xF025;

/// TM0CON0: clock source select (1 = HSCLK).
const CON0_HSCLK: u8 = 0x08;
/// TM0CON0: prescaler exponent.
const CON0_DIV: u8 = 0x07;

pub struct Timer {
    interval: u16,
    counter: u16,
    con0: u8,
    running: bool,
    /// Source ticks since the last count.
    prescale: u32,
    line: MaskableLine,
}

impl Timer {
    pub fn new(interrupts: &InterruptController) -> Result<Self, ChipsetError> {
        Ok(Self {
            interval: 0,
            counter: 0,
            con0: 0,
            running: false,
            prescale: 0,
            line: interrupts.line(SLOT_TM0)?,
        })
    }

    fn clear(&mut self) {
        self.interval = 0;
        self.counter = 0;
        self.con0 = 0;
        self.running = false;
        self.prescale = 0;
    }

    fn divider(&self) -> u32 {
        1 << (self.con0 & CON0_DIV)
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }
}

impl Peripheral for Timer {
    fn name(&self) -> &'static str {
        "Timer"
    }

    fn domain(&self) -> ClockDomain {
        if self.con0 & CON0_HSCLK != 0 {
            ClockDomain::HighSpeed
        } else {
            ClockDomain::LowSpeed
        }
    }

    fn block_bit(&self) -> Option<u8> {
        Some(0)
    }

    fn regions(&self) -> Vec<Region> {
        vec![
            Region::new(TM0D, 2, "Timer/TM0D"),
            Region::new(TM0C, 2, "Timer/TM0C"),
            Region::new(TM0CON0, 1, "Timer/TM0CON0"),
            Region::new(TM0CON1, 1, "Timer/TM0CON1"),
        ]
    }

    fn read(&mut self, address: u16, _ctx: &mut PeripheralContext) -> u8 {
        match address {
            TM0D => self.interval as u8,
            0xF021 => (self.interval >> 8) as u8,
            TM0C => self.counter as u8,
            0xF023 => (self.counter >> 8) as u8,
            TM0CON0 => self.con0,
            TM0CON1 => self.running as u8,
            _ => 0,
        }
    }

    fn write(&mut self, address: u16, data: u8, _ctx: &mut PeripheralContext) {
        match address {
            TM0D => self.interval = (self.interval & 0xFF00) | data as u16,
            0xF021 => self.interval = (self.interval & 0x00FF) | ((data as u16) << 8),
            // Any write to either byte clears the count.
            TM0C | 0xF023 => self.counter = 0,
            TM0CON0 => {
                self.con0 = data & 0x0F;
                self.prescale = 0;
            }
            TM0CON1 => self.running = data & 0x01 != 0,
            _ => {}
        }
    }

    fn uninitialise(&mut self, _ctx: &mut PeripheralContext) {
        self.clear();
    }

    fn reset(&mut self, _ctx: &mut PeripheralContext) {
        self.clear();
    }

    fn tick(&mut self, ctx: &mut PeripheralContext) {
        if !self.running {
            return;
        }
        self.prescale += 1;
        if self.prescale < self.divider() {
            return;
        }
        self.prescale = 0;
        if self.interval == 0 {
            self.counter = 0;
            return;
        }
        self.counter = self.counter.wrapping_add(1);
        if self.counter >= self.interval {
            self.counter = 0;
            ctx.try_raise(self.line);
        }
    }
}
