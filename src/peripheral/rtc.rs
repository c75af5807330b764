//! Real-time clock.
//!
//! Calendar registers hold packed BCD.  The clock advances on the 1 Hz
//! tap of the LTBR output while RTCCON bit 0 is set; the same taps drive
//! the periodic RTC interrupt selected by RTCCON bits 2:1.  Both alarms
//! are compared once per minute, on the seconds carry.

use log::warn;

use super::{ClockDomain, Peripheral, PeripheralContext, Region};
use crate::chipset::interrupt::InterruptController;
use crate::chipset::line::MaskableLine;
use crate::chipset::variant::{SLOT_AL0, SLOT_AL1, SLOT_RTC};
use crate::error::ChipsetError;

const RTC_BASE: u16 = 0xF0C0;

// ── Register offsets ───────────────────────────────────────────

const SEC: usize = 0;
const MIN: usize = 1;
const HOUR: usize = 2;
const WEEK: usize = 3;
const DAY: usize = 4;
const MON: usize = 5;
const YEAR: usize = 6;
const CON: usize = 7;
const AL0MIN: usize = 8;
const AL0HOUR: usize = 9;
const AL0WEEK: usize = 10;
const AL1MIN: usize = 11;
const AL1HOUR: usize = 12;
const AL1DAY: usize = 13;
const AL1MON: usize = 14;
const REG_COUNT: usize = 15;

/// Writable bits per register.
const MASKS: [u8; REG_COUNT] = [
    0x7F, 0x7F, 0x3F, 0x07, 0x3F, 0x1F, 0xFF, 0x07, // RTCSEC..RTCCON
    0x7F, 0x3F, 0x07, 0x7F, 0x3F, 0x3F, 0x1F, // alarms
];

const NAMES: [&str; REG_COUNT] = [
    "RealTimeClock/RTCSEC",
    "RealTimeClock/RTCMIN",
    "RealTimeClock/RTCHOUR",
    "RealTimeClock/RTCWEEK",
    "RealTimeClock/RTCDAY",
    "RealTimeClock/RTCMON",
    "RealTimeClock/RTCYEAR",
    "RealTimeClock/RTCCON",
    "RealTimeClock/AL0MIN",
    "RealTimeClock/AL0HOUR",
    "RealTimeClock/AL0WEEK",
    "RealTimeClock/AL1MIN",
    "RealTimeClock/AL1HOUR",
    "RealTimeClock/AL1DAY",
    "RealTimeClock/AL1MON",
];

/// Days per month in BCD, indexed by the BCD month minus one.  Entries
/// 0x0A..0x0F are never reached by a valid month.
const DAY_COUNT: [u8; 0x12] = [
    0x31, 0x28, 0x31, 0x30, 0x31, 0x30, 0x31, 0x31, 0x30, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31,
    0x30, 0x31,
];

/// RTCCON: clock running.
const CON_RUN: u8 = 0x01;
/// RTCCON bits 2:1: periodic interrupt select.
const CON_PERIOD: u8 = 0x06;
const PERIOD_2HZ: u8 = 0x02;
const PERIOD_1HZ: u8 = 0x04;
const PERIOD_1MIN: u8 = 0x06;

/// LTBR output taps.
const TAP_2HZ: u8 = 0x20;
const TAP_1HZ: u8 = 0x40;

fn bcd_to_bin(v: u8) -> u8 {
    (v >> 4) * 10 + (v & 0x0F)
}

/// BCD increment; a low digit past 9 carries into the high digit.
fn bcd_inc(v: u8) -> u8 {
    let v = v.wrapping_add(1);
    if v & 0x0F > 0x09 {
        v.wrapping_add(0x06)
    } else {
        v
    }
}

/// Round an out-of-range low digit up to the next multiple of 0x10.
fn carry_digit(v: u8) -> u8 {
    if v & 0x0F > 0x09 {
        v.wrapping_add(0x10) & 0xF0
    } else {
        v
    }
}

fn month_valid(mon: u8) -> bool {
    mon != 0 && mon <= 0x12 && mon & 0x0F <= 0x09
}

pub struct RealTimeClock {
    regs: [u8; REG_COUNT],
    rtc_line: MaskableLine,
    al0_line: MaskableLine,
    al1_line: MaskableLine,
}

impl RealTimeClock {
    pub fn new(interrupts: &InterruptController) -> Result<Self, ChipsetError> {
        let mut rtc = Self {
            regs: [0; REG_COUNT],
            rtc_line: interrupts.line(SLOT_RTC)?,
            al0_line: interrupts.line(SLOT_AL0)?,
            al1_line: interrupts.line(SLOT_AL1)?,
        };
        rtc.regs[WEEK] = 1;
        Ok(rtc)
    }

    fn running(&self) -> bool {
        self.regs[CON] & CON_RUN != 0
    }

    fn days_in_month(&self) -> u8 {
        let mon = self.regs[MON];
        if !month_valid(mon) {
            return 0x31;
        }
        let year = bcd_to_bin(self.regs[YEAR]);
        if mon == 0x02 && year % 4 == 0 {
            0x29
        } else {
            DAY_COUNT[mon as usize - 1]
        }
    }

    /// Calendar as `[sec, min, hour, week, day, mon, year]` in BCD.
    pub fn calendar(&self) -> [u8; 7] {
        let mut c = [0; 7];
        c.copy_from_slice(&self.regs[SEC..=YEAR]);
        c
    }

    /// Bring every calendar field back into range, carrying upwards.
    fn normalise(&mut self) {
        let r = &mut self.regs;

        r[SEC] = carry_digit(r[SEC]);
        if r[SEC] >= 0x60 {
            r[SEC] = 0;
            if r[MIN] & 0x0F <= 0x09 {
                r[MIN] += 1;
            }
        }

        r[MIN] = carry_digit(r[MIN]);
        if r[MIN] >= 0x60 {
            r[MIN] = 0;
            if r[HOUR] & 0x0F <= 0x09 {
                r[HOUR] += 1;
            }
        }

        r[HOUR] = carry_digit(r[HOUR]);
        if r[HOUR] >= 0x24 {
            r[HOUR] = 0;
            r[WEEK] += 1;
            if r[WEEK] > 0x07 {
                r[WEEK] = 0x01;
            }
            if r[DAY] & 0x0F <= 0x09 {
                r[DAY] += 1;
            }
        }

        if r[DAY] == 0 {
            r[DAY] = 1;
        }
        r[DAY] = carry_digit(r[DAY]);
        let day = r[DAY];
        let mon_valid = month_valid(r[MON]);
        if day > self.days_in_month() {
            let r = &mut self.regs;
            r[DAY] = 1;
            if mon_valid {
                r[MON] += 1;
            }
        }

        let r = &mut self.regs;
        if r[MON] == 0 {
            r[MON] = 1;
        }
        r[MON] = carry_digit(r[MON]);
        if r[MON] > 0x12 {
            r[MON] = 1;
            if r[YEAR] & 0x0F <= 0x09 && r[YEAR] < 0xA0 {
                r[YEAR] += 1;
            }
        }

        r[YEAR] = carry_digit(r[YEAR]);
        if r[YEAR] >= 0xA0 {
            r[YEAR] = 0;
        }
    }

    /// Advance one second.  Returns true on the seconds carry.
    fn advance_second(&mut self, ctx: &mut PeripheralContext) -> bool {
        let r = &mut self.regs;
        r[SEC] = bcd_inc(r[SEC]);
        if r[SEC] < 0x60 {
            return false;
        }

        if r[CON] & CON_PERIOD == PERIOD_1MIN {
            ctx.try_raise(self.rtc_line);
        }
        r[SEC] = 0;
        r[MIN] = bcd_inc(r[MIN]);
        if r[MIN] < 0x60 {
            return true;
        }

        r[MIN] = 0;
        r[HOUR] = bcd_inc(r[HOUR]);
        if r[HOUR] < 0x24 {
            return true;
        }

        r[HOUR] = 0;
        r[WEEK] += 1;
        if r[WEEK] > 0x07 {
            r[WEEK] = 0x01;
        }
        r[DAY] = bcd_inc(r[DAY]);

        if !month_valid(r[MON]) {
            warn!("[rtc] RTCMON value {:#04X} invalid while running", r[MON]);
            self.normalise();
        }
        if self.regs[DAY] <= self.days_in_month() {
            return true;
        }

        let r = &mut self.regs;
        r[DAY] = 1;
        r[MON] = bcd_inc(r[MON]);
        if r[MON] <= 0x12 {
            return true;
        }

        r[MON] = 1;
        r[YEAR] = bcd_inc(r[YEAR]);
        if r[YEAR] >= 0xA0 {
            r[YEAR] = 0;
        }
        true
    }

    fn alarm0_matches(&self) -> bool {
        let r = &self.regs;
        r[MIN] == r[AL0MIN] && r[HOUR] == r[AL0HOUR] && (r[AL0WEEK] == 0 || r[WEEK] == r[AL0WEEK])
    }

    fn alarm1_matches(&self) -> bool {
        let r = &self.regs;
        r[MIN] == r[AL1MIN]
            && r[HOUR] == r[AL1HOUR]
            && (r[AL1DAY] == 0 || r[DAY] == r[AL1DAY])
            && (r[AL1MON] == 0 || r[MON] == r[AL1MON])
    }
}

impl Peripheral for RealTimeClock {
    fn name(&self) -> &'static str {
        "RealTimeClock"
    }

    fn domain(&self) -> ClockDomain {
        ClockDomain::LowSpeed
    }

    fn regions(&self) -> Vec<Region> {
        NAMES
            .iter()
            .enumerate()
            .map(|(i, &name)| Region::new(RTC_BASE + i as u16, 1, name))
            .collect()
    }

    fn read(&mut self, address: u16, _ctx: &mut PeripheralContext) -> u8 {
        let reg = (address - RTC_BASE) as usize;
        self.regs.get(reg).map_or(0, |v| v & MASKS[reg])
    }

    fn write(&mut self, address: u16, data: u8, _ctx: &mut PeripheralContext) {
        let reg = (address - RTC_BASE) as usize;
        if reg >= REG_COUNT {
            return;
        }
        let data = data & MASKS[reg];
        match reg {
            CON => {
                self.regs[CON] = data;
                if data & CON_RUN != 0 {
                    self.normalise();
                }
            }
            SEC..=YEAR => {
                // Time registers are frozen while the clock runs.
                if self.running() {
                    return;
                }
                self.regs[reg] = if reg == WEEK && data == 0 { MASKS[WEEK] } else { data };
            }
            _ => self.regs[reg] = data,
        }
    }

    fn reset(&mut self, _ctx: &mut PeripheralContext) {
        self.regs[CON] = 0;
    }

    fn tick(&mut self, ctx: &mut PeripheralContext) {
        let output = ctx.clock.ls_output;
        let period = self.regs[CON] & CON_PERIOD;

        if output & TAP_2HZ != 0 && period == PERIOD_2HZ {
            ctx.try_raise(self.rtc_line);
        }

        if output & TAP_1HZ != 0 {
            if period == PERIOD_1HZ {
                ctx.try_raise(self.rtc_line);
            }
            if self.running() && self.advance_second(ctx) {
                if self.alarm0_matches() {
                    ctx.try_raise(self.al0_line);
                }
                if self.alarm1_matches() {
                    ctx.try_raise(self.al1_line);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::testing::Bench;

    fn addr(reg: usize) -> u16 {
        RTC_BASE + reg as u16
    }

    fn set(rtc: &mut RealTimeClock, bench: &mut Bench, cal: [u8; 7]) {
        let mut ctx = bench.ctx();
        for (reg, v) in cal.iter().enumerate() {
            rtc.write(addr(reg), *v, &mut ctx);
        }
    }

    fn second(rtc: &mut RealTimeClock, bench: &mut Bench) {
        bench.clock.ls_output = TAP_1HZ;
        rtc.tick(&mut bench.ctx());
    }

    #[test]
    fn test_bcd_helpers() {
        assert_eq!(bcd_inc(0x09), 0x10);
        assert_eq!(bcd_inc(0x59), 0x60);
        assert_eq!(carry_digit(0x1C), 0x20);
        assert_eq!(bcd_to_bin(0x24), 24);
    }

    #[test]
    fn test_seconds_roll_into_minutes() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        set(&mut rtc, &mut bench, [0x58, 0x59, 0x23, 0x07, 0x31, 0x12, 0x99]);
        rtc.write(addr(CON), CON_RUN, &mut bench.ctx());

        second(&mut rtc, &mut bench);
        assert_eq!(rtc.calendar(), [0x59, 0x59, 0x23, 0x07, 0x31, 0x12, 0x99]);
        second(&mut rtc, &mut bench);
        // End of the century wraps to year 00.
        assert_eq!(rtc.calendar(), [0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_leap_february() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        set(&mut rtc, &mut bench, [0x59, 0x59, 0x23, 0x03, 0x28, 0x02, 0x24]);
        rtc.write(addr(CON), CON_RUN, &mut bench.ctx());
        second(&mut rtc, &mut bench);
        assert_eq!(&rtc.calendar()[4..], &[0x29, 0x02, 0x24]);

        rtc.write(addr(CON), 0, &mut bench.ctx());
        set(&mut rtc, &mut bench, [0x59, 0x59, 0x23, 0x03, 0x28, 0x02, 0x23]);
        rtc.write(addr(CON), CON_RUN, &mut bench.ctx());
        second(&mut rtc, &mut bench);
        assert_eq!(&rtc.calendar()[4..], &[0x01, 0x03, 0x23]);
    }

    #[test]
    fn test_writes_ignored_while_running() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        rtc.write(addr(MIN), 0x15, &mut bench.ctx());
        rtc.write(addr(CON), CON_RUN, &mut bench.ctx());
        rtc.write(addr(MIN), 0x30, &mut bench.ctx());
        assert_eq!(rtc.read(addr(MIN), &mut bench.ctx()), 0x15);
        // Alarm registers stay writable.
        rtc.write(addr(AL0MIN), 0x30, &mut bench.ctx());
        assert_eq!(rtc.read(addr(AL0MIN), &mut bench.ctx()), 0x30);
    }

    #[test]
    fn test_week_zero_reads_back_seven() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        rtc.write(addr(WEEK), 0, &mut bench.ctx());
        assert_eq!(rtc.read(addr(WEEK), &mut bench.ctx()), 0x07);
    }

    #[test]
    fn test_start_normalises_calendar() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        set(&mut rtc, &mut bench, [0x5A, 0x59, 0x23, 0x07, 0x00, 0x00, 0x05]);
        rtc.write(addr(CON), CON_RUN, &mut bench.ctx());
        assert_eq!(rtc.calendar(), [0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x05]);
    }

    #[test]
    fn test_invalid_month_while_running_is_normalised() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        rtc.regs = [0x59, 0x59, 0x23, 0x01, 0x10, 0x1A, 0x20, CON_RUN, 0, 0, 0, 0, 0, 0, 0];
        second(&mut rtc, &mut bench);
        assert_eq!(rtc.calendar(), [0x00, 0x00, 0x00, 0x02, 0x11, 0x01, 0x21]);
    }

    #[test]
    fn test_periodic_interrupts() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();

        rtc.write(addr(CON), PERIOD_2HZ, &mut bench.ctx());
        bench.clock.ls_output = TAP_2HZ;
        rtc.tick(&mut bench.ctx());
        assert!(bench.is_active(SLOT_RTC));

        bench.clear();
        rtc.write(addr(CON), PERIOD_1HZ, &mut bench.ctx());
        rtc.tick(&mut bench.ctx());
        assert!(!bench.is_active(SLOT_RTC));
        second(&mut rtc, &mut bench);
        assert!(bench.is_active(SLOT_RTC));
        // Stopped clock does not count.
        assert_eq!(rtc.calendar()[SEC], 0);
    }

    #[test]
    fn test_minute_interrupt_and_alarms() {
        let mut bench = Bench::new();
        let mut rtc = RealTimeClock::new(&bench.interrupts).unwrap();
        set(&mut rtc, &mut bench, [0x59, 0x29, 0x07, 0x02, 0x15, 0x06, 0x24]);
        let mut ctx = bench.ctx();
        rtc.write(addr(AL0MIN), 0x30, &mut ctx);
        rtc.write(addr(AL0HOUR), 0x07, &mut ctx);
        rtc.write(addr(AL0WEEK), 0x03, &mut ctx);
        rtc.write(addr(AL1MIN), 0x30, &mut ctx);
        rtc.write(addr(AL1HOUR), 0x07, &mut ctx);
        rtc.write(addr(AL1MON), 0x06, &mut ctx);
        rtc.write(addr(CON), CON_RUN | PERIOD_1MIN, &mut ctx);
        drop(ctx);

        second(&mut rtc, &mut bench);
        assert!(bench.is_active(SLOT_RTC));
        // AL0 wants Wednesday, it is Tuesday.
        assert!(!bench.is_active(SLOT_AL0));
        assert!(bench.is_active(SLOT_AL1));

        bench.clear();
        second(&mut rtc, &mut bench);
        assert_eq!(bench.interrupts.active_count(), 0);
    }
}
