//! Chipset-side state the instruction core can reach: the SFR space, the
//! interrupt controller, the clock generator and the peripheral table.
//!
//! [`Sfr`] is what `Chipset::tick` hands to the core as its
//! [`SystemBus`] while it steps.

use log::{debug, trace};

use super::clock::ClockGenerator;
use super::interrupt::InterruptController;
use super::region::{ChipRegister, Owner, RegionMap};
use super::variant::VariantParams;
use super::RunMode;
use crate::cpu::SystemBus;
use crate::error::ChipsetError;
use crate::peripheral::{
    ClockDomain, Peripheral, PeripheralContext, PortInputs, Region, SchedulerState,
};

pub(crate) struct Slot {
    pub device: Box<dyn Peripheral>,
    /// Cleared while the device's BLKCON0 bit is set.
    pub enabled: bool,
}

pub struct Sfr {
    pub(crate) params: &'static VariantParams,
    pub(crate) interrupts: InterruptController,
    pub(crate) clock: ClockGenerator,
    pub(crate) peripherals: Vec<Slot>,
    regions: RegionMap,

    pub(crate) run_mode: RunMode,
    blkcon: u8,
    pub(crate) cycle: u64,
    /// External interrupt pin levels, driven by the IO ports.
    pub(crate) pins: [bool; 4],
    pub(crate) port_inputs: PortInputs,
    pub(crate) battery_voltage: f32,
    pub(crate) solar_panel_voltage: f32,

    /// BRK executed during the current step.
    pub(crate) break_requested: bool,
    /// A peripheral asked for a full reset (watchdog).
    pub(crate) reset_requested: bool,
}

impl Sfr {
    pub(crate) fn new(
        params: &'static VariantParams,
        interrupts: InterruptController,
        clock: ClockGenerator,
        battery_voltage: f32,
        solar_panel_voltage: f32,
    ) -> Result<Self, ChipsetError> {
        let mut sfr = Self {
            params,
            interrupts,
            clock,
            peripherals: Vec::new(),
            regions: RegionMap::new(),
            run_mode: RunMode::Running,
            blkcon: 0,
            cycle: 0,
            pins: [true; 4],
            port_inputs: PortInputs::default(),
            battery_voltage,
            solar_panel_voltage,
            break_requested: false,
            reset_requested: false,
        };

        let r = &params.registers;
        let chip = [
            (Region::new(r.ltbadj, 2, "TimerBaseCounter/LTBADJ"), ChipRegister::Ltbadj),
            (Region::new(r.fcon, 1, "ClockGenerator/FCON"), ChipRegister::Fcon),
            (Region::new(r.ltbr, 1, "TimerBaseCounter/LTBR"), ChipRegister::Ltbr),
            (Region::new(r.htbr, 1, "ClockGenerator/HTBR"), ChipRegister::Htbr),
            (Region::new(r.int_mask, 4, "Chipset/InterruptMask"), ChipRegister::IntMask),
            (Region::new(r.int_pending, 4, "Chipset/InterruptPending"), ChipRegister::IntPending),
            (Region::new(r.blkcon, 1, "Chipset/BLKCON0"), ChipRegister::Blkcon),
        ];
        for (region, reg) in chip {
            sfr.regions.insert(region, Owner::Chip(reg))?;
        }
        Ok(sfr)
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            run_mode: self.run_mode,
            cycle: self.cycle,
            cycles_per_second: self.clock.cycles_per_second(),
            port_inputs: self.port_inputs,
            battery_voltage: self.battery_voltage,
            solar_panel_voltage: self.solar_panel_voltage,
        }
    }

    pub fn blkcon(&self) -> u8 {
        self.blkcon
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    // ── Peripheral table ───────────────────────────────────────

    /// Register `device`: validate its block bit and claim its regions.
    pub(crate) fn add_peripheral(
        &mut self,
        device: Box<dyn Peripheral>,
    ) -> Result<usize, ChipsetError> {
        if let Some(bit) = device.block_bit() {
            if bit >= 8 || (1u16 << bit) > self.params.blkcon_mask as u16 {
                return Err(ChipsetError::InvalidBlockBit {
                    peripheral: device.name(),
                    bit,
                });
            }
        }

        let index = self.peripherals.len();
        let mut regions = self.regions.clone();
        for region in device.regions() {
            regions.insert(region, Owner::Peripheral(index))?;
        }
        self.regions = regions;

        debug!("[chipset] peripheral {} at slot {index}", device.name());
        let enabled = match device.block_bit() {
            Some(bit) => self.blkcon & (1 << bit) == 0,
            None => true,
        };
        self.peripherals.push(Slot { device, enabled });
        Ok(index)
    }

    /// Run `f` on peripheral `index` with a freshly built context.
    fn with_peripheral<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut dyn Peripheral, &mut PeripheralContext) -> R,
    ) -> R {
        let state = self.state();
        let clock = self.clock.snapshot();
        let mut ctx = PeripheralContext::new(
            &mut self.interrupts,
            &mut self.reset_requested,
            &mut self.pins,
            clock,
            state,
        );
        f(self.peripherals[index].device.as_mut(), &mut ctx)
    }

    /// Per-cycle dispatch by clock domain.
    pub(crate) fn tick_peripherals(&mut self) {
        let state = self.state();
        let clock = self.clock.snapshot();
        let mut ctx = PeripheralContext::new(
            &mut self.interrupts,
            &mut self.reset_requested,
            &mut self.pins,
            clock,
            state,
        );

        for slot in self.peripherals.iter_mut().filter(|s| s.enabled) {
            let p = slot.device.as_mut();
            match p.domain() {
                ClockDomain::Always => p.tick(&mut ctx),
                ClockDomain::LowSpeed => {
                    if clock.ls_reset {
                        p.reset_lsclk(&mut ctx);
                    } else if clock.ls_tick {
                        p.tick(&mut ctx);
                    }
                }
                ClockDomain::HighSpeed => {
                    if clock.hs_tick {
                        p.tick(&mut ctx);
                    }
                }
                ClockDomain::System => {
                    if clock.sys_tick {
                        p.tick(&mut ctx);
                    }
                }
                ClockDomain::Stopped => {}
            }
        }
    }

    pub(crate) fn tick_after_interrupts(&mut self) {
        let state = self.state();
        let clock = self.clock.snapshot();
        let mut ctx = PeripheralContext::new(
            &mut self.interrupts,
            &mut self.reset_requested,
            &mut self.pins,
            clock,
            state,
        );
        for slot in &mut self.peripherals {
            slot.device.tick_after_interrupts(&mut ctx);
        }
    }

    pub(crate) fn reset_peripherals(&mut self) {
        let state = self.state();
        let clock = self.clock.snapshot();
        let mut ctx = PeripheralContext::new(
            &mut self.interrupts,
            &mut self.reset_requested,
            &mut self.pins,
            clock,
            state,
        );
        for slot in &mut self.peripherals {
            slot.device.reset(&mut ctx);
        }
    }

    // ── Block control ──────────────────────────────────────────

    /// Write BLKCON0.  Hooks fire only for bits that change.
    pub(crate) fn write_blkcon(&mut self, data: u8) {
        let data = data & self.params.blkcon_mask;
        let old = self.blkcon;
        self.blkcon = data;

        for index in 0..self.peripherals.len() {
            let Some(bit) = self.peripherals[index].device.block_bit() else {
                continue;
            };
            let mask = 1 << bit;
            match (old & mask != 0, data & mask != 0) {
                (false, true) => {
                    debug!("[chipset] {} blocked", self.peripherals[index].device.name());
                    self.with_peripheral(index, |p, ctx| p.uninitialise(ctx));
                    self.peripherals[index].enabled = false;
                }
                (true, false) => {
                    debug!("[chipset] {} unblocked", self.peripherals[index].device.name());
                    self.with_peripheral(index, |p, ctx| p.initialise(ctx));
                    self.peripherals[index].enabled = true;
                }
                _ => {}
            }
        }
    }

    // ── Register dispatch ──────────────────────────────────────

    fn read_chip(&self, reg: ChipRegister, offset: usize) -> u8 {
        match reg {
            ChipRegister::Ltbadj => self.clock.read_ltbadj(offset),
            ChipRegister::Fcon => self.clock.read_fcon(),
            ChipRegister::Ltbr => self.clock.read_ltbr(),
            ChipRegister::Htbr => self.clock.read_htbr(),
            ChipRegister::IntMask => self.interrupts.read_mask(offset),
            ChipRegister::IntPending => self.interrupts.read_pending(offset),
            ChipRegister::Blkcon => self.blkcon,
        }
    }

    fn write_chip(&mut self, reg: ChipRegister, offset: usize, data: u8) {
        match reg {
            ChipRegister::Ltbadj => self.clock.write_ltbadj(offset, data),
            ChipRegister::Fcon => self.clock.write_fcon(data),
            ChipRegister::Ltbr => self.clock.write_ltbr(),
            ChipRegister::Htbr => self.clock.write_htbr(),
            ChipRegister::IntMask => self.interrupts.write_mask(offset, data),
            ChipRegister::IntPending => self.interrupts.write_pending(offset, data),
            ChipRegister::Blkcon => self.write_blkcon(data),
        }
    }

    pub fn read(&mut self, address: u16) -> u8 {
        match self.regions.lookup(address) {
            Some((Owner::Chip(reg), offset)) => self.read_chip(reg, offset),
            Some((Owner::Peripheral(index), _)) => {
                self.with_peripheral(index, |p, ctx| p.read(address, ctx))
            }
            None => {
                trace!("[chipset] read from unmapped {address:#06X}");
                0
            }
        }
    }

    pub fn write(&mut self, address: u16, data: u8) {
        match self.regions.lookup(address) {
            Some((Owner::Chip(reg), offset)) => self.write_chip(reg, offset, data),
            Some((Owner::Peripheral(index), _)) => {
                self.with_peripheral(index, |p, ctx| p.write(address, data, ctx))
            }
            None => trace!("[chipset] write {data:#04X} to unmapped {address:#06X}"),
        }
    }
}

impl SystemBus for Sfr {
    fn read(&mut self, address: u16) -> u8 {
        Sfr::read(self, address)
    }

    fn write(&mut self, address: u16, value: u8) {
        Sfr::write(self, address, value)
    }

    fn halt(&mut self) {
        self.run_mode = RunMode::Halted;
    }

    fn stop(&mut self) {
        self.run_mode = RunMode::Stopped;
    }

    fn request_break(&mut self) {
        self.break_requested = true;
    }

    fn raise_software(&mut self, n: usize) -> Result<(), ChipsetError> {
        self.interrupts.raise_software(n)
    }

    fn set_maskable_blocked(&mut self, blocked: bool) {
        self.interrupts.set_maskable_blocked(blocked);
    }
}
