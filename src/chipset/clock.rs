//! Clock generator.
//!
//! Three domains are derived from the emulated master clock:
//!
//! * HSCLK: master clock divided by `2^(OSCLK - 1)` (FCON bits 6:4).
//! * SYSCLK: every second HSCLK tick.  The core steps on it.
//! * LSCLK: nominally 16384 Hz, enabled when FCON bits 1:0 are `01`.
//!   The master clock rarely divides evenly, so the interval is nudged by
//!   one cycle every `threshold` ticks (threshold derived from LTBADJ).
//!
//! Each domain also advances a free-running time-base register (HTBR,
//! LTBR) every 128 ticks.  The bits that fell on the last increment are
//! latched into an output byte that peripherals sample on their tick.

/// Nominal LSCLK rate.
pub const LSCLK_FREQ: u32 = 16384;

/// Domain ticks between two time-base register increments.
const TBR_OUTPUT_COUNT: u8 = 128;

/// Clock state as seen by peripherals during one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub hs_tick: bool,
    pub sys_tick: bool,
    pub ls_tick: bool,
    /// LTBR was written last cycle: low-speed subscribers resync instead
    /// of ticking.
    pub ls_reset: bool,
    pub hs_output: u8,
    pub ls_output: u8,
    pub ltbr: u8,
    pub htbr: u8,
}

pub struct ClockGenerator {
    cycles_per_second: u32,

    fcon: u8,
    divider: u32,
    ls_enabled: bool,

    // ── High speed ──
    hs_counter: u32,
    sys_counter: u8,
    hs_tick: bool,
    sys_tick: bool,
    htbr: u8,
    hs_time: u8,
    hs_output: u8,
    /// HTBR was written: skip the next output update.
    htbr_reset: bool,

    // ── Low speed ──
    ls_counter: u32,
    ls_tick: bool,
    ltbr: u8,
    ls_time: u8,
    ls_output: u8,
    ltbr_reset_armed: bool,
    ltbr_reset: bool,
    ltbadj: u16,
    threshold: i32,
    /// LSCLK ticks since the last correction.
    drift_time: i32,
    /// Added to the next LSCLK interval (-1, 0 or +1).
    correction: i32,
}

impl ClockGenerator {
    pub fn new(cycles_per_second: u32) -> Self {
        Self {
            cycles_per_second,
            ..Self::zeroed()
        }
    }

    /// Power-on state.  The master clock rate is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.cycles_per_second);
    }

    fn zeroed() -> Self {
        Self {
            cycles_per_second: 0,
            fcon: 0,
            divider: 1,
            ls_enabled: false,
            hs_counter: 0,
            sys_counter: 0,
            hs_tick: false,
            sys_tick: false,
            htbr: 0,
            hs_time: 0,
            hs_output: 0,
            htbr_reset: false,
            ls_counter: 0,
            ls_tick: false,
            ltbr: 0,
            ls_time: 0,
            ls_output: 0,
            ltbr_reset_armed: false,
            ltbr_reset: false,
            ltbadj: 0,
            threshold: 0,
            drift_time: 0,
            correction: 0,
        }
    }

    // ── Per cycle ──────────────────────────────────────────────

    /// Generate this cycle's domain ticks.  HSCLK (and with it SYSCLK)
    /// only runs while `hs_running`.
    pub fn advance(&mut self, hs_running: bool) {
        self.ltbr_reset = std::mem::take(&mut self.ltbr_reset_armed);

        if hs_running {
            self.hs_counter += 1;
            if self.hs_counter >= self.divider {
                self.hs_tick = true;
                self.hs_counter = 0;
                self.sys_counter += 1;
                if self.sys_counter >= 2 {
                    self.sys_tick = true;
                    self.sys_counter = 0;
                }
                if self.htbr_reset {
                    self.htbr_reset = false;
                } else {
                    self.hs_output = 0;
                    self.hs_time += 1;
                    if self.hs_time >= TBR_OUTPUT_COUNT {
                        self.hs_time = 0;
                        let old = self.htbr;
                        self.htbr = old.wrapping_add(1);
                        self.hs_output = old & !self.htbr;
                    }
                }
            }
        }

        if self.ls_enabled {
            self.ls_counter += 1;
            if self.ls_counter as i64 >= self.ls_interval() {
                self.ls_tick = true;
                self.ls_counter = 0;
                if self.correction != 0 {
                    self.correction = 0;
                    self.drift_time = 0;
                }
                if self.threshold > 0 {
                    self.drift_time += 1;
                    if self.drift_time >= self.threshold {
                        self.correction = -1;
                    }
                } else if self.threshold < 0 {
                    self.drift_time += 1;
                    if self.drift_time >= -self.threshold {
                        self.correction = 1;
                    }
                }

                self.ls_output = 0;
                self.ls_time += 1;
                if self.ls_time >= TBR_OUTPUT_COUNT {
                    self.ls_time = 0;
                    let old = self.ltbr;
                    self.ltbr = old.wrapping_add(1);
                    self.ls_output = old & !self.ltbr;
                }
            }
        }
    }

    /// Clear the per-cycle tick flags and the LTBR reset pulse.
    pub fn end_cycle(&mut self) {
        self.hs_tick = false;
        self.sys_tick = false;
        self.ls_tick = false;
        self.ltbr_reset = false;
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            hs_tick: self.hs_tick,
            sys_tick: self.sys_tick,
            ls_tick: self.ls_tick,
            ls_reset: self.ltbr_reset,
            hs_output: self.hs_output,
            ls_output: self.ls_output,
            ltbr: self.ltbr,
            htbr: self.htbr,
        }
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn cycles_per_second(&self) -> u32 {
        self.cycles_per_second
    }

    pub fn divider(&self) -> u32 {
        self.divider
    }

    pub fn ls_enabled(&self) -> bool {
        self.ls_enabled
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Length of the current LSCLK interval in master cycles.
    pub fn ls_interval(&self) -> i64 {
        (self.cycles_per_second / LSCLK_FREQ) as i64 + self.correction as i64
    }

    // ── Registers ──────────────────────────────────────────────

    pub fn read_fcon(&self) -> u8 {
        self.fcon
    }

    pub fn write_fcon(&mut self, data: u8) {
        let osclk = (data >> 4) & 0x07;
        self.fcon = data & 0x73;
        self.divider = 1 << osclk.saturating_sub(1);
        self.ls_enabled = self.fcon & 0x03 == 0x01;
    }

    pub fn read_ltbr(&self) -> u8 {
        self.ltbr
    }

    /// Any write clears LTBR and resynchronises the low-speed domain.
    pub fn write_ltbr(&mut self) {
        self.ltbr = 0;
        self.ls_time = 0;
        self.ls_counter = 0;
        self.drift_time = 0;
        self.correction = 0;
        self.ls_output = 0xFF;
        self.ltbr_reset_armed = true;
    }

    pub fn read_htbr(&self) -> u8 {
        self.htbr
    }

    pub fn write_htbr(&mut self) {
        self.htbr = 0;
        self.hs_time = 0;
        self.hs_counter = 0;
        self.hs_output = 0xFF;
        self.htbr_reset = true;
    }

    pub fn read_ltbadj(&self, offset: usize) -> u8 {
        (self.ltbadj >> (offset * 8)) as u8
    }

    pub fn write_ltbadj(&mut self, offset: usize, data: u8) {
        let shift = offset * 8;
        self.ltbadj = ((self.ltbadj & !(0xFF << shift)) | ((data as u16) << shift)) & 0x7FF;
        self.threshold = if self.ltbadj == 0 {
            0
        } else {
            // 11-bit two's complement
            let adj = (((self.ltbadj << 5) as i16) >> 5) as i64;
            let t = LSCLK_FREQ as i64 * (1 + 2_097_152 / adj)
                / self.cycles_per_second.max(1) as i64;
            // Symmetric so the drift check can negate it.
            t.clamp(-(i32::MAX as i64), i32::MAX as i64) as i32
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cycle numbers (1-based) of the first `n` LSCLK ticks.
    fn ls_tick_cycles(clock: &mut ClockGenerator, n: usize) -> Vec<u64> {
        let mut ticks = Vec::with_capacity(n);
        let mut cycle = 0u64;
        while ticks.len() < n {
            cycle += 1;
            clock.advance(true);
            if clock.snapshot().ls_tick {
                ticks.push(cycle);
            }
            clock.end_cycle();
        }
        ticks
    }

    fn intervals(ticks: &[u64]) -> Vec<u64> {
        let mut prev = 0;
        ticks
            .iter()
            .map(|&t| {
                let d = t - prev;
                prev = t;
                d
            })
            .collect()
    }

    #[test]
    fn test_fcon_divider() {
        let mut c = ClockGenerator::new(1_048_576);
        assert_eq!(c.divider(), 1);
        for (osclk, div) in [(0u8, 1u32), (1, 1), (2, 2), (3, 4), (7, 64)] {
            c.write_fcon(osclk << 4);
            assert_eq!(c.divider(), div, "OSCLK {osclk}");
        }
        c.write_fcon(0xFF);
        assert_eq!(c.read_fcon(), 0x73);
        assert!(!c.ls_enabled());
        c.write_fcon(0x01);
        assert!(c.ls_enabled());
    }

    #[test]
    fn test_sysclk_is_half_hsclk() {
        let mut c = ClockGenerator::new(1_048_576);
        c.write_fcon(0x30); // divide by 4
        let (mut hs, mut sys) = (0, 0);
        for cycle in 1..=64 {
            c.advance(true);
            let s = c.snapshot();
            assert_eq!(s.hs_tick, cycle % 4 == 0);
            hs += s.hs_tick as u32;
            sys += s.sys_tick as u32;
            c.end_cycle();
        }
        assert_eq!(hs, 16);
        assert_eq!(sys, 8);
    }

    #[test]
    fn test_hsclk_halts_when_stopped() {
        let mut c = ClockGenerator::new(1_048_576);
        c.write_fcon(0x01);
        let mut ls = 0;
        for _ in 0..1000 {
            c.advance(false);
            assert!(!c.snapshot().hs_tick);
            ls += c.snapshot().ls_tick as u32;
            c.end_cycle();
        }
        // Low speed keeps running.
        assert_eq!(ls, 1000 / 64);
    }

    #[test]
    fn test_htbr_output_edges() {
        let mut c = ClockGenerator::new(1_048_576);
        let mut outputs = Vec::new();
        for _ in 0..(128 * 8) {
            c.advance(true);
            let s = c.snapshot();
            if s.hs_output != 0 {
                outputs.push((s.htbr, s.hs_output));
            }
            c.end_cycle();
        }
        assert_eq!(outputs, vec![(2, 0x01), (4, 0x03), (6, 0x01), (8, 0x07)]);
    }

    #[test]
    fn test_nominal_ls_interval() {
        let mut c = ClockGenerator::new(1_000_000);
        c.write_fcon(0x01);
        let ticks = ls_tick_cycles(&mut c, 200);
        assert!(intervals(&ticks).iter().all(|&d| d == 61));
    }

    #[test]
    fn test_positive_ltbadj_shortens_intervals() {
        let mut c = ClockGenerator::new(1_000_000);
        c.write_fcon(0x01);
        c.write_ltbadj(0, 0x00);
        c.write_ltbadj(1, 0x02); // +512
        assert_eq!(c.threshold(), 67);

        let iv = intervals(&ls_tick_cycles(&mut c, 670));
        let short: Vec<usize> = iv
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 60)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(short, (0..9).map(|k| 68 + 67 * k).collect::<Vec<_>>());
        assert!(iv.iter().all(|&d| d == 60 || d == 61));
    }

    #[test]
    fn test_negative_ltbadj_lengthens_intervals() {
        let mut c = ClockGenerator::new(1_000_000);
        c.write_fcon(0x01);
        c.write_ltbadj(1, 0x06);
        c.write_ltbadj(0, 0x00); // 0x600 = -512
        assert_eq!(c.read_ltbadj(1), 0x06);
        assert_eq!(c.threshold(), -67);

        let iv = intervals(&ls_tick_cycles(&mut c, 300));
        let long: Vec<usize> = iv
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 62)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(long, vec![68, 135, 202, 269]);
        assert!(iv.iter().all(|&d| d == 61 || d == 62));
    }

    #[test]
    fn test_ltbadj_masked_to_11_bits() {
        let mut c = ClockGenerator::new(1_000_000);
        c.write_ltbadj(1, 0xFF);
        assert_eq!(c.read_ltbadj(1), 0x07);
        c.write_ltbadj(1, 0x00);
        c.write_ltbadj(0, 0x00);
        assert_eq!(c.threshold(), 0);
    }

    #[test]
    fn test_threshold_saturates_at_tiny_rates() {
        let mut c = ClockGenerator::new(1);
        c.write_ltbadj(0, 0x01);
        assert_eq!(c.threshold(), i32::MAX);
        c.write_ltbadj(0, 0xFF);
        c.write_ltbadj(1, 0x07); // -1
        assert_eq!(c.threshold(), -i32::MAX);
    }

    #[test]
    fn test_ltbr_write_arms_reset_pulse() {
        let mut c = ClockGenerator::new(1_048_576);
        c.write_fcon(0x01);
        ls_tick_cycles(&mut c, 128 * 3);
        assert_eq!(c.read_ltbr(), 3);

        c.write_ltbr();
        assert_eq!(c.read_ltbr(), 0);
        assert_eq!(c.snapshot().ls_output, 0xFF);
        assert!(!c.snapshot().ls_reset);

        c.advance(true);
        assert!(c.snapshot().ls_reset);
        c.end_cycle();
        c.advance(true);
        assert!(!c.snapshot().ls_reset);
    }

    #[test]
    fn test_htbr_write_skips_one_output_update() {
        let mut c = ClockGenerator::new(1_048_576);
        for _ in 0..300 {
            c.advance(true);
            c.end_cycle();
        }
        c.write_htbr();
        assert_eq!(c.read_htbr(), 0);
        c.advance(true);
        assert!(c.snapshot().hs_tick);
        assert_eq!(c.snapshot().hs_output, 0xFF);
        c.end_cycle();
        c.advance(true);
        assert_eq!(c.snapshot().hs_output, 0);
    }

    #[test]
    fn test_reset_keeps_rate() {
        let mut c = ClockGenerator::new(2_000_000);
        c.write_fcon(0x71);
        c.write_ltbadj(0, 0x40);
        c.reset();
        assert_eq!(c.cycles_per_second(), 2_000_000);
        assert_eq!(c.read_fcon(), 0);
        assert_eq!(c.divider(), 1);
        assert_eq!(c.threshold(), 0);
        assert!(!c.ls_enabled());
    }
}
