//! Low-speed time-base interrupts.
//!
//! LTBR itself lives in the clock generator.  This device only watches
//! the falling edges it latches and raises the four periodic lines.

use super::{ClockDomain, Peripheral, PeripheralContext, Region};
use crate::chipset::interrupt::InterruptController;
use crate::chipset::line::MaskableLine;
use crate::chipset::variant::{SLOT_L1024S, SLOT_L16384S, SLOT_L256S, SLOT_L4096S};
use crate::error::ChipsetError;

/// LTBR bit watched by each line, in line order.
const EDGE_BITS: [u8; 4] = [0x02, 0x08, 0x20, 0x80];

pub struct TimerBaseCounter {
    lines: [MaskableLine; 4],
}

impl TimerBaseCounter {
    pub fn new(interrupts: &InterruptController) -> Result<Self, ChipsetError> {
        Ok(Self {
            lines: [
                interrupts.line(SLOT_L256S)?,
                interrupts.line(SLOT_L1024S)?,
                interrupts.line(SLOT_L4096S)?,
                interrupts.line(SLOT_L16384S)?,
            ],
        })
    }
}

impl Peripheral for TimerBaseCounter {
    fn name(&self) -> &'static str {
        "TimerBaseCounter"
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::LowSpeed
    }

    fn regions(&self) -> Vec<Region> {
        Vec::new()
    }

    fn read(&mut self, _address: u16, _ctx: &mut PeripheralContext) -> u8 {
        0
    }

    fn write(&mut self, _address: u16, _data: u8, _ctx: &mut PeripheralContext) {}

    fn tick(&mut self, ctx: &mut PeripheralContext) {
        let output = ctx.clock.ls_output;
        for (line, bit) in self.lines.iter().zip(EDGE_BITS) {
            if output & bit != 0 {
                ctx.try_raise(*line);
            }
        }
    }

    fn reset_lsclk(&mut self, ctx: &mut PeripheralContext) {
        for line in self.lines {
            ctx.try_raise(line);
        }
    }
}
