//! Chipset: interrupt controller, clock generator and the per-cycle tick
//! scheduler that binds them to the instruction core and peripherals.
//!
//! One call to [`Chipset::tick`] is one master clock cycle:
//!
//! 1. the clock generator produces this cycle's HSCLK / SYSCLK / LSCLK
//!    ticks;
//! 2. every enabled peripheral whose domain ticked runs;
//! 3. if any interrupt is active, one is arbitrated and every peripheral
//!    sees `tick_after_interrupts`;
//! 4. the core executes one instruction on a SYSCLK tick while running;
//! 5. the per-cycle clock flags are cleared.

pub mod clock;
pub mod interrupt;
pub mod line;
pub mod region;
pub mod sfr;
pub mod variant;

use log::{debug, info};

use crate::config::ChipsetConfig;
use crate::cpu::InstructionCore;
use crate::error::ChipsetError;
use crate::peripheral::{self, Peripheral, PinInput};

use clock::ClockGenerator;
use interrupt::{Delivery, InterruptController};
use sfr::Sfr;
use variant::HardwareVariant;

/// Core execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// STP: all clocks but LSCLK stopped.
    Stopped,
    /// HLT: clocks run, the core does not.
    Halted,
    Running,
}

/// Counters kept across the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub cycles: u64,
    pub steps: u64,
    pub deliveries: u64,
    pub resets: u64,
}

// ─────────────────────────────────────────────────────────────────
//  Chipset
// ─────────────────────────────────────────────────────────────────

pub struct Chipset<C: InstructionCore> {
    core: C,
    sfr: Sfr,
    variant: HardwareVariant,
    last_delivery: Option<Delivery>,
    stats: Stats,
}

impl<C: InstructionCore> Chipset<C> {
    /// Build a chipset for `config.variant` with its standard peripherals
    /// and bring it out of reset.
    pub fn new(config: &ChipsetConfig, core: C) -> Result<Self, ChipsetError> {
        let params = config.variant.params();
        let interrupts = InterruptController::new(
            params.maskable_lines,
            params.interrupt_valid_mask(config.watchdog_enabled),
        );
        let devices = peripheral::standard_set(config.variant, config, &interrupts)?;
        let clock = ClockGenerator::new(config.cycles_per_second);
        let mut sfr = Sfr::new(
            params,
            interrupts,
            clock,
            config.battery_voltage,
            config.solar_panel_voltage,
        )?;
        for device in devices {
            sfr.add_peripheral(device)?;
        }

        info!(
            "[chipset] {} at {} Hz, {} maskable lines, {} peripherals",
            params.name,
            config.cycles_per_second,
            params.maskable_lines,
            sfr.peripherals.len()
        );

        let mut chipset = Self {
            core,
            sfr,
            variant: config.variant,
            last_delivery: None,
            stats: Stats::default(),
        };
        chipset.reset();
        Ok(chipset)
    }

    /// Register an extra peripheral.  Its interrupt lines must come from
    /// [`Chipset::interrupts`]`().line(..)`.
    pub fn add_peripheral(&mut self, device: Box<dyn Peripheral>) -> Result<usize, ChipsetError> {
        self.sfr.add_peripheral(device)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Full chipset reset.  Afterwards only the reset line is active.
    pub fn reset(&mut self) {
        debug!("[chipset] reset");
        let sfr = &mut self.sfr;
        sfr.interrupts.reset();
        sfr.clock.reset();
        sfr.write_blkcon(0);
        sfr.reset_peripherals();
        sfr.break_requested = false;
        sfr.reset_requested = false;
        self.core.reset();
        sfr.run_mode = RunMode::Running;
        self.stats.resets += 1;
    }

    /// BRK: a break at exception level 2 or above resets the chip.
    pub fn brk(&mut self) {
        if self.core.exception_level() > 1 {
            info!(
                "[chipset] BRK at exception level {}, resetting",
                self.core.exception_level()
            );
            self.reset();
        } else {
            self.sfr.interrupts.raise_break();
        }
    }

    /// Emulator debug interrupt (NMICI).
    pub fn raise_emulator_debug(&mut self) {
        self.sfr.interrupts.raise_emulator();
    }

    pub fn halt(&mut self) {
        self.sfr.run_mode = RunMode::Halted;
    }

    pub fn stop(&mut self) {
        self.sfr.run_mode = RunMode::Stopped;
    }

    // ── Per cycle ──────────────────────────────────────────────

    /// Run one master clock cycle.
    pub fn tick(&mut self) {
        let sfr = &mut self.sfr;
        sfr.clock.advance(sfr.run_mode != RunMode::Stopped);

        sfr.tick_peripherals();
        if std::mem::take(&mut self.sfr.reset_requested) {
            self.reset();
        }

        self.last_delivery = None;
        if self.sfr.interrupts.active_count() > 0 {
            // Any request wakes the core, deliverable or not.
            self.sfr.run_mode = RunMode::Running;
            self.last_delivery = self.sfr.interrupts.accept(&mut self.core);
            if self.last_delivery.is_some() {
                self.stats.deliveries += 1;
            }
            self.sfr.tick_after_interrupts();
        }

        if self.sfr.run_mode == RunMode::Running && self.sfr.clock.snapshot().sys_tick {
            self.core.step(&mut self.sfr);
            self.stats.steps += 1;
            if std::mem::take(&mut self.sfr.break_requested) {
                self.brk();
            }
        }

        self.sfr.clock.end_cycle();
        self.sfr.cycle += 1;
        self.stats.cycles += 1;
    }

    /// Run `n` cycles.
    pub fn run(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    // ── Host inputs ────────────────────────────────────────────

    /// Drive or release pin `pin` of IO port `port`.  Takes effect on the
    /// next cycle.
    pub fn set_port_input(
        &mut self,
        port: usize,
        pin: usize,
        input: PinInput,
    ) -> Result<(), ChipsetError> {
        self.sfr.port_inputs.set(port, pin, input)
    }

    /// Level of external interrupt pin `pin` (1..4) as the chip sees it.
    pub fn pin_level(&self, pin: usize) -> bool {
        self.sfr.pins.get(pin).copied().unwrap_or(true)
    }

    pub fn set_battery_voltage(&mut self, volts: f32) {
        self.sfr.battery_voltage = volts;
    }

    pub fn set_solar_panel_voltage(&mut self, volts: f32) {
        self.sfr.solar_panel_voltage = volts;
    }

    // ── Bus access ─────────────────────────────────────────────

    pub fn read(&mut self, address: u16) -> u8 {
        self.sfr.read(address)
    }

    pub fn write(&mut self, address: u16, data: u8) {
        self.sfr.write(address, data);
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn variant(&self) -> HardwareVariant {
        self.variant
    }

    pub fn run_mode(&self) -> RunMode {
        self.sfr.run_mode
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.sfr.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.sfr.interrupts
    }

    pub fn clock(&self) -> &ClockGenerator {
        &self.sfr.clock
    }

    pub fn sfr(&self) -> &Sfr {
        &self.sfr
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    /// Interrupt accepted during the last cycle, if any.
    pub fn last_delivery(&self) -> Option<Delivery> {
        self.last_delivery
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn peripheral_names(&self) -> Vec<&'static str> {
        self.sfr.peripherals.iter().map(|s| s.device.name()).collect()
    }

    /// Whether the peripheral at `index` is clocked (not blocked).
    pub fn peripheral_enabled(&self, index: usize) -> Option<bool> {
        self.sfr.peripherals.get(index).map(|s| s.enabled)
    }
}
