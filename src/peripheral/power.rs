//! Battery level detector and solar panel indicator.
//!
//! A detection run takes [`TEST_TICKS`] master cycles.  After
//! [`SETTLE_TICKS`] the comparator result is decided: voltages clearly
//! outside the ±2 % window around the selected threshold resolve at once,
//! voltages inside it resolve later the closer they are to the threshold.
//! BLDCON2 selects the end-of-test and low-battery interrupts and the
//! repeat behaviour:
//!
//! | BLDCON2[2:0] | after a run                                   |
//! |--------------|-----------------------------------------------|
//! | 0            | stop                                          |
//! | 1..6         | wait `cycles_per_second >> n`, run again      |
//! | 7            | run back to back                              |

use log::debug;

use super::{ClockDomain, Peripheral, PeripheralContext, Region};
use crate::chipset::interrupt::InterruptController;
use crate::chipset::line::MaskableLine;
use crate::chipset::variant::{SLOT_BEND, SLOT_BLOW};
use crate::error::ChipsetError;

pub const BLDCON0: u16 = 0xF0D0;
pub const BLDCON1: u16 = 0xF0D1;
pub const BLDCON2: u16 = 0xF0D2;
pub const SOLAR_INDICATOR: u16 = 0xF310;

pub const TEST_TICKS: u32 = 131_072;
pub const SETTLE_TICKS: u32 = 16_384;
const STANDARD_ERROR: f32 = 0.02;
const SOLAR_THRESHOLD: f32 = 1.0;

/// Detection threshold in volts, indexed by BLDCON0.
const THRESHOLDS: [f32; 32] = [
    1.10, 1.15, 1.20, 1.25, 1.30, 1.35, 1.40, 1.45, 1.50, 1.60, 1.70, 1.80, 1.90, 2.00, 2.10, 2.20,
    2.30, 2.40, 2.50, 2.60, 2.70, 2.80, 2.90, 3.00, 3.10, 3.20, 3.30, 3.40, 3.50, 3.60, 3.80, 4.00,
];

/// BLDCON2 bits.
const CON2_REPEAT: u8 = 0x07;
const CON2_BEND: u8 = 0x10;
const CON2_BLOW: u8 = 0x20;

#[derive(Debug, Clone, Copy)]
struct Run {
    /// BLDCON1 bit 2 at start: only a high result is ever reported early.
    high_only: bool,
    auto_repeat: bool,
    threshold: f32,
    timer: u32,
    decided: bool,
}

pub struct PowerSupply {
    threshold: u8,
    bldcon2: u8,
    sp_indicator: u8,
    mode: bool,
    /// Comparator result: battery above threshold.
    flag: bool,
    control: bool,
    run: Option<Run>,
    /// Cycles waited since the last run (repeat delay).
    delay_timer: u32,
    delay_ticks: u32,
    blow: MaskableLine,
    bend: MaskableLine,
}

impl PowerSupply {
    pub fn new(
        interrupts: &InterruptController,
        battery_voltage: f32,
    ) -> Result<Self, ChipsetError> {
        Ok(Self {
            threshold: 0,
            bldcon2: 0,
            sp_indicator: 0,
            mode: false,
            flag: battery_voltage >= THRESHOLDS[0],
            control: false,
            run: None,
            delay_timer: 0,
            delay_ticks: 0,
            blow: interrupts.line(SLOT_BLOW)?,
            bend: interrupts.line(SLOT_BEND)?,
        })
    }

    pub fn testing(&self) -> bool {
        self.run.is_some()
    }

    pub fn flag(&self) -> bool {
        self.flag
    }

    fn start(&mut self, auto_repeat: bool) {
        if self.run.is_some() {
            return;
        }
        self.run = Some(Run {
            high_only: self.mode,
            auto_repeat,
            threshold: THRESHOLDS[self.threshold as usize],
            timer: 0,
            decided: false,
        });
    }

    fn stop(&mut self, ctx: &mut PeripheralContext) {
        let Some(run) = self.run.take() else {
            return;
        };
        let repeat = self.bldcon2 & CON2_REPEAT;
        if repeat == 0 {
            if self.bldcon2 & CON2_BEND != 0 {
                ctx.try_raise(self.bend);
            }
            self.control = false;
            return;
        }
        if run.auto_repeat {
            self.start(repeat == CON2_REPEAT);
            return;
        }
        if self.bldcon2 & CON2_BEND != 0 {
            ctx.try_raise(self.bend);
        }
        self.delay_timer = 0;
        self.delay_ticks = ctx.state.cycles_per_second >> repeat;
    }

    fn report_low(&mut self, ctx: &mut PeripheralContext) {
        self.flag = false;
        if self.bldcon2 & CON2_BLOW != 0 {
            ctx.try_raise(self.blow);
        }
    }

    fn test_tick(&mut self, ctx: &mut PeripheralContext) {
        let Some(mut run) = self.run else {
            return;
        };
        run.timer += 1;
        self.run = Some(run);
        if run.timer >= TEST_TICKS {
            self.stop(ctx);
            return;
        }
        if run.timer < SETTLE_TICKS || run.decided {
            return;
        }

        let voltage = ctx.state.battery_voltage;
        let window = run.threshold * STANDARD_ERROR;
        let decided = if voltage < run.threshold - window {
            self.report_low(ctx);
            true
        } else if voltage > run.threshold + window {
            self.flag = true;
            true
        } else {
            // -1.0 at the bottom of the window, 1.0 at the top.
            let rel = (voltage - run.threshold) / window;
            let span = (TEST_TICKS - SETTLE_TICKS) as f32;
            let elapsed = run.timer as f32;
            if run.high_only || rel > 0.0 {
                if elapsed >= (0.5 - rel / 2.0) * span + SETTLE_TICKS as f32 {
                    self.flag = true;
                    true
                } else {
                    false
                }
            } else if elapsed >= (0.5 + rel / 2.0) * span + SETTLE_TICKS as f32 {
                self.report_low(ctx);
                true
            } else {
                false
            }
        };
        if decided {
            if let Some(r) = self.run.as_mut() {
                r.decided = true;
            }
        }
    }
}

impl Peripheral for PowerSupply {
    fn name(&self) -> &'static str {
        "PowerSupply"
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::Always
    }

    fn regions(&self) -> Vec<Region> {
        vec![
            Region::new(BLDCON0, 3, "BatteryLevelDetector/BLDCON"),
            Region::new(SOLAR_INDICATOR, 1, "SolarPanelIndicator"),
        ]
    }

    fn read(&mut self, address: u16, ctx: &mut PeripheralContext) -> u8 {
        match address {
            BLDCON0 => self.threshold,
            BLDCON1 => ((self.mode as u8) << 2) | ((self.flag as u8) << 1) | self.control as u8,
            BLDCON2 => self.bldcon2,
            SOLAR_INDICATOR => {
                let available = ctx.state.solar_panel_voltage >= SOLAR_THRESHOLD;
                (self.sp_indicator & 0x0F) | ((available as u8) << 4)
            }
            _ => 0,
        }
    }

    fn write(&mut self, address: u16, data: u8, _ctx: &mut PeripheralContext) {
        match address {
            BLDCON0 => self.threshold = data & 0x1F,
            BLDCON1 => {
                self.mode = data & 0x04 != 0;
                if data & 0x01 != 0 {
                    self.control = true;
                    debug!(
                        "[bld] test started, threshold {:.2} V",
                        THRESHOLDS[self.threshold as usize]
                    );
                    self.start(false);
                } else {
                    self.control = false;
                    self.run = None;
                }
            }
            BLDCON2 => self.bldcon2 = data & 0x37,
            SOLAR_INDICATOR => self.sp_indicator = data & 0x0F,
            _ => {}
        }
    }

    fn reset(&mut self, ctx: &mut PeripheralContext) {
        self.threshold = 0;
        self.bldcon2 = 0;
        self.sp_indicator = 0;
        self.mode = false;
        self.control = false;
        self.run = None;
        self.flag = ctx.state.battery_voltage >= THRESHOLDS[0];
    }

    fn tick(&mut self, ctx: &mut PeripheralContext) {
        if self.run.is_some() {
            self.test_tick(ctx);
        } else if self.control {
            self.delay_timer += 1;
            if self.delay_timer >= self.delay_ticks {
                let auto_repeat = self.bldcon2 & CON2_REPEAT == CON2_REPEAT;
                self.start(auto_repeat);
            }
        }
    }
}
