// End-to-end behaviour of a chipset driven cycle by cycle with a scripted
// instruction core.

use std::collections::VecDeque;

use calcchip::chipset::interrupt::{INT_BREAK, INT_NONMASKABLE, INT_RESET, INT_SOFTWARE};
use calcchip::chipset::variant::{SLOT_EXI0, SLOT_TM0};
use calcchip::{
    Chipset, ChipsetConfig, HardwareVariant, InstructionCore, PinInput, RunMode, SystemBus,
};

const IE0: u16 = 0xF010;
const IRQ0: u16 = 0xF014;
const BLKCON0: u16 = 0xF028;
const P0DIR: u16 = 0xF04C;

/// What the core does on one of its steps.
#[derive(Debug, Clone, Copy)]
enum Action {
    Nop,
    Halt,
    Break,
    Software(usize),
}

/// Records steps and exception deliveries.  Never returns from a handler
/// on its own.
#[derive(Default)]
struct RecordingCore {
    level: u8,
    mie: bool,
    steps: u64,
    resets: u32,
    deliveries: Vec<(usize, u8)>,
    script: VecDeque<Action>,
}

impl RecordingCore {
    fn new() -> Self {
        Self {
            mie: true,
            ..Default::default()
        }
    }
}

impl InstructionCore for RecordingCore {
    fn reset(&mut self) {
        self.level = 0;
        self.resets += 1;
    }

    fn step(&mut self, bus: &mut dyn SystemBus) {
        self.steps += 1;
        match self.script.pop_front().unwrap_or(Action::Nop) {
            Action::Nop => {}
            Action::Halt => bus.halt(),
            Action::Break => bus.request_break(),
            Action::Software(n) => bus.raise_software(n).unwrap(),
        }
    }

    fn raise_exception(&mut self, level: u8, index: usize) {
        self.deliveries.push((index, level));
        self.level = level;
    }

    fn exception_level(&self) -> u8 {
        self.level
    }

    fn master_interrupt_enable(&self) -> bool {
        self.mie
    }
}

fn chipset_with(config: ChipsetConfig) -> Chipset<RecordingCore> {
    let mut c = Chipset::new(&config, RecordingCore::new()).unwrap();
    // Deliver the power-on reset.
    c.tick();
    assert_eq!(c.core().deliveries, vec![(INT_RESET, 0)]);
    c.core_mut().deliveries.clear();
    c
}

fn chipset() -> Chipset<RecordingCore> {
    chipset_with(ChipsetConfig::default())
}

fn raise_slot(c: &mut Chipset<RecordingCore>, slot: usize) {
    let line = c.interrupts().line(slot).unwrap();
    c.interrupts_mut().try_raise(line);
}

#[test]
fn disabled_line_stays_pending() {
    let mut c = chipset();
    raise_slot(&mut c, SLOT_EXI0);
    c.run(1000);
    assert!(c.core().deliveries.is_empty());
    assert_eq!(c.read(IRQ0) & 0x02, 0x02);
    assert_eq!(c.interrupts().active_count(), 0);
}

#[test]
fn enabled_line_is_delivered_at_level_one() {
    let mut c = chipset();
    c.write(IE0, 0x02);
    raise_slot(&mut c, SLOT_EXI0);
    assert!(c.interrupts().is_active(5));
    c.tick();
    assert_eq!(c.core().deliveries, vec![(5, 1)]);
    assert_eq!(c.interrupts().active_count(), 0);
    assert_eq!(c.read(IRQ0) & 0x02, 0);
}

#[test]
fn pending_write_raises_enabled_line() {
    let mut c = chipset();
    c.write(IE0, 0x02);
    c.write(IRQ0, 0x02);
    c.tick();
    assert_eq!(c.core().deliveries, vec![(5, 1)]);
}

#[test]
fn maskable_waits_for_mie() {
    let mut c = chipset();
    c.core_mut().mie = false;
    c.write(IE0, 0x02);
    raise_slot(&mut c, SLOT_EXI0);
    c.run(50);
    assert!(c.core().deliveries.is_empty());
    assert!(c.interrupts().is_active(5));

    c.core_mut().mie = true;
    c.tick();
    assert_eq!(c.core().deliveries, vec![(5, 1)]);
}

#[test]
fn break_at_level_two_resets() {
    let mut c = chipset();
    c.write(IE0, 0x02);
    c.write(BLKCON0, 0x01);
    raise_slot(&mut c, SLOT_EXI0);
    c.interrupts_mut().raise_software(5).unwrap();
    c.interrupts_mut().raise_emulator();
    // Masked lines: pending only.
    c.write(IRQ0 + 1, 0x03);
    c.write(IRQ0 + 2, 0x01);
    assert_eq!(c.interrupts().active_count(), 3);
    c.core_mut().level = 2;
    let resets = c.core().resets;

    c.brk();
    assert_eq!(c.core().resets, resets + 1);
    assert_eq!(c.interrupts().active_count(), 1);
    assert!(c.interrupts().is_active(INT_RESET));
    assert!(!c.interrupts().is_active(INT_SOFTWARE + 5));
    for offset in 0..4 {
        assert_eq!(c.read(IRQ0 + offset), 0);
        assert_eq!(c.read(IE0 + offset), 0);
    }
    assert_eq!(c.read(BLKCON0), 0);

    c.tick();
    assert_eq!(c.core().deliveries, vec![(INT_RESET, 0)]);
}

#[test]
fn break_at_level_one_is_delivered() {
    let mut c = chipset();
    c.core_mut().level = 1;
    c.brk();
    assert!(c.interrupts().is_active(INT_BREAK));
    c.tick();
    assert_eq!(c.core().deliveries, vec![(INT_BREAK, 2)]);
}

#[test]
fn break_requested_by_core_during_step() {
    let mut c = chipset();
    c.core_mut().level = 2;
    c.core_mut().script.push_back(Action::Break);
    let resets = c.core().resets;
    // Cycle 2 is the first SYSCLK tick.
    c.tick();
    assert_eq!(c.core().steps, 1);
    assert_eq!(c.core().resets, resets + 1);
    assert!(c.interrupts().is_active(INT_RESET));
}

#[test]
fn nonmaskable_follows_mask_bit_zero() {
    let config = ChipsetConfig {
        watchdog_enabled: true,
        ..Default::default()
    };
    let mut c = chipset_with(config);
    c.interrupts_mut().request_nonmaskable();
    assert_eq!(c.read(IRQ0) & 0x01, 0x01);
    assert!(!c.interrupts().is_active(INT_NONMASKABLE));

    c.write(IE0, 0x01);
    assert!(c.interrupts().is_active(INT_NONMASKABLE));
    c.tick();
    assert_eq!(c.core().deliveries, vec![(INT_NONMASKABLE, 2)]);
    assert_eq!(c.read(IRQ0) & 0x01, 0);
}

#[test]
fn mask_bit_zero_needs_watchdog() {
    let mut c = chipset();
    c.write(IE0, 0xFF);
    assert_eq!(c.read(IE0), 0xFE);
}

#[test]
fn software_interrupt_ignores_mie() {
    let mut c = chipset();
    c.core_mut().mie = false;
    c.core_mut().script.push_back(Action::Software(3));
    c.tick();
    assert_eq!(c.core().steps, 1);
    c.tick();
    assert_eq!(c.core().deliveries, vec![(INT_SOFTWARE + 3, 1)]);
}

#[test]
fn halted_core_wakes_on_interrupt() {
    let mut c = chipset();
    c.core_mut().script.push_back(Action::Halt);
    c.tick();
    assert_eq!(c.run_mode(), RunMode::Halted);
    c.run(100);
    assert_eq!(c.core().steps, 1);

    c.write(IE0, 0x02);
    raise_slot(&mut c, SLOT_EXI0);
    c.tick();
    assert_eq!(c.run_mode(), RunMode::Running);
    assert_eq!(c.core().deliveries, vec![(5, 1)]);
    c.run(4);
    assert_eq!(c.core().steps, 3);
}

#[test]
fn masked_request_does_not_wake_core() {
    let mut c = chipset();
    c.halt();
    raise_slot(&mut c, SLOT_EXI0);
    c.run(10);
    assert_eq!(c.run_mode(), RunMode::Halted);
}

#[test]
fn timer_interrupt_through_chipset() {
    let mut c = chipset();
    assert_eq!(c.peripheral_names()[4], "Timer");
    // TM0INT is slot 4: mask bit 5, line index 9.
    c.write(IE0, 1 << (SLOT_TM0 + 1));
    c.write(0xF020, 10);
    c.write(0xF024, 0x08); // HSCLK, no prescale
    c.write(0xF025, 0x01);

    c.run(9);
    assert!(c.core().deliveries.is_empty());
    c.tick();
    assert_eq!(c.core().deliveries, vec![(9, 1)]);

    // Blocking the timer powers it down.
    c.write(BLKCON0, 0x01);
    assert_eq!(c.peripheral_enabled(4), Some(false));
    assert_eq!(c.read(0xF025), 0);
    c.run(100);
    assert_eq!(c.core().deliveries.len(), 1);
}

#[test]
fn port_zero_input_drives_external_interrupts() {
    let mut c = chipset();
    // EXI1 and EXI2: mask bits 2 and 3, falling edge.
    c.write(IE0, 0x0C);

    // Undriven pin without a pull-up falls as soon as it becomes an input.
    c.write(P0DIR, 0x01);
    assert!(!c.pin_level(1));
    c.tick();
    assert_eq!(c.core().deliveries, vec![(6, 1)]);

    c.core_mut().level = 0;
    c.set_port_input(0, 1, PinInput::Driven(true)).unwrap();
    c.write(P0DIR, 0x03);
    c.run(10);
    assert_eq!(c.core().deliveries.len(), 1);

    c.set_port_input(0, 1, PinInput::Driven(false)).unwrap();
    c.tick();
    assert_eq!(c.core().deliveries, vec![(6, 1), (7, 1)]);
    assert!(c.set_port_input(0, 3, PinInput::Released).is_err());
}

#[test]
fn es_plus_has_no_rtc() {
    let config = ChipsetConfig {
        variant: HardwareVariant::EsPlus,
        ..Default::default()
    };
    let c = chipset_with(config);
    assert!(!c.peripheral_names().contains(&"RealTimeClock"));
    assert_eq!(c.interrupts().line_count(), 12);
    assert!(c.interrupts().line(12).is_err());
}

#[test]
fn run_counts_cycles() {
    let mut c = chipset();
    c.run(99);
    let stats = c.stats();
    assert_eq!(stats.cycles, 100);
    assert_eq!(stats.steps, 50);
    assert_eq!(stats.deliveries, 1);
}
