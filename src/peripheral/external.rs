//! External interrupt pins EXI1..EXI3.
//!
//! EXICON holds two sensitivity bits per pin (pin `n` at bits `2n+1:2n`).
//! EXI0 belongs to the keyboard matrix and is not handled here.  Pin
//! levels are driven by port 0 of the IO ports.

use super::{ClockDomain, Peripheral, PeripheralContext, Region};
use crate::chipset::interrupt::InterruptController;
use crate::chipset::line::MaskableLine;
use crate::chipset::variant::{SLOT_EXI1, SLOT_EXI2, SLOT_EXI3};
use crate::error::ChipsetError;

pub const EXICON: u16 = 0xF018;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sense {
    Falling,
    Rising,
    High,
    Low,
}

impl Sense {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Sense::Falling,
            1 => Sense::Rising,
            2 => Sense::High,
            _ => Sense::Low,
        }
    }

    fn fires(self, last: bool, now: bool) -> bool {
        match self {
            Sense::Falling => last && !now,
            Sense::Rising => !last && now,
            Sense::High => now,
            Sense::Low => !now,
        }
    }
}

pub struct ExternalInterrupts {
    exicon: u8,
    last_levels: [bool; 4],
    /// Indexed by pin; pin 0 has no line here.
    lines: [Option<MaskableLine>; 4],
}

impl ExternalInterrupts {
    pub fn new(interrupts: &InterruptController) -> Result<Self, ChipsetError> {
        Ok(Self {
            exicon: 0,
            last_levels: [true; 4],
            lines: [
                None,
                Some(interrupts.line(SLOT_EXI1)?),
                Some(interrupts.line(SLOT_EXI2)?),
                Some(interrupts.line(SLOT_EXI3)?),
            ],
        })
    }
}

impl Peripheral for ExternalInterrupts {
    fn name(&self) -> &'static str {
        "ExternalInterrupts"
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::Always
    }

    fn regions(&self) -> Vec<Region> {
        vec![Region::new(EXICON, 1, "ExternalInterrupts/EXICON")]
    }

    fn read(&mut self, address: u16, _ctx: &mut PeripheralContext) -> u8 {
        match address {
            EXICON => self.exicon,
            _ => 0,
        }
    }

    fn write(&mut self, address: u16, data: u8, _ctx: &mut PeripheralContext) {
        if address == EXICON {
            self.exicon = data;
        }
    }

    fn reset(&mut self, _ctx: &mut PeripheralContext) {
        self.exicon = 0;
        self.last_levels = [true; 4];
    }

    fn tick(&mut self, ctx: &mut PeripheralContext) {
        for pin in 1..4 {
            let level = ctx.pin_level(pin);
            let sense = Sense::from_bits(self.exicon >> (2 * pin));
            if let Some(line) = self.lines[pin] {
                if sense.fires(self.last_levels[pin], level) {
                    ctx.try_raise(line);
                }
            }
            self.last_levels[pin] = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::testing::Bench;

    fn pin(bench: &mut Bench, exi: &mut ExternalInterrupts, n: usize, level: bool) {
        bench.pins[n] = level;
        exi.tick(&mut bench.ctx());
    }

    #[test]
    fn test_falling_edge_default() {
        let mut bench = Bench::new();
        let mut exi = ExternalInterrupts::new(&bench.interrupts).unwrap();
        pin(&mut bench, &mut exi, 1, true);
        assert!(!bench.is_active(SLOT_EXI1));
        pin(&mut bench, &mut exi, 1, false);
        assert!(bench.is_active(SLOT_EXI1));
        bench.clear();
        pin(&mut bench, &mut exi, 1, false);
        assert!(!bench.is_active(SLOT_EXI1));
    }

    #[test]
    fn test_rising_and_level_modes() {
        let mut bench = Bench::new();
        let mut exi = ExternalInterrupts::new(&bench.interrupts).unwrap();
        // Pin 2 rising, pin 3 low level.
        exi.write(EXICON, (1 << 4) | (3 << 6), &mut bench.ctx());

        pin(&mut bench, &mut exi, 2, false);
        assert!(!bench.is_active(SLOT_EXI2));
        pin(&mut bench, &mut exi, 2, true);
        assert!(bench.is_active(SLOT_EXI2));

        pin(&mut bench, &mut exi, 3, false);
        assert!(bench.is_active(SLOT_EXI3));
        bench.clear();
        // Level mode re-raises while held.
        pin(&mut bench, &mut exi, 3, false);
        assert!(bench.is_active(SLOT_EXI3));
    }

    #[test]
    fn test_high_level_fires_from_reset() {
        let mut bench = Bench::new();
        let mut exi = ExternalInterrupts::new(&bench.interrupts).unwrap();
        exi.write(EXICON, 2 << 2, &mut bench.ctx());
        exi.tick(&mut bench.ctx());
        assert!(bench.is_active(SLOT_EXI1));
        assert!(!bench.is_active(SLOT_EXI2));
    }
}
