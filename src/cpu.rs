//! Instruction-core contract.
//!
//! The chipset does not decode instructions.  It steps whatever core it
//! is given and delivers exceptions to it; the core in turn reaches the
//! chipset's registers through [`SystemBus`] while it executes.

use crate::error::ChipsetError;

/// Trait that an external nX-U8 core must implement.
pub trait InstructionCore {
    fn reset(&mut self);

    /// Execute exactly one instruction.
    fn step(&mut self, bus: &mut dyn SystemBus);

    /// Enter the exception handler for `index` at exception level `level`.
    fn raise_exception(&mut self, level: u8, index: usize);

    fn exception_level(&self) -> u8;

    /// PSW master interrupt enable.
    fn master_interrupt_enable(&self) -> bool;
}

/// What the core sees of the chipset while it executes an instruction.
pub trait SystemBus {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);

    fn halt(&mut self);
    fn stop(&mut self);

    /// BRK instruction.  Processed right after the current step.
    fn request_break(&mut self);

    /// SWI #n, `n` in `0..64`.
    fn raise_software(&mut self, n: usize) -> Result<(), ChipsetError>;

    /// Block maskable interrupts for the instruction(s) that follow
    /// writes the real core treats as non-interruptible.
    fn set_maskable_blocked(&mut self, blocked: bool);
}

/// Stand-in core: returns from each handler on its next step and never
/// touches the bus otherwise.
#[derive(Debug, Default)]
pub struct IdleCore {
    levels: Vec<u8>,
    level: u8,
    pub steps: u64,
    pub deliveries: u64,
}

impl IdleCore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstructionCore for IdleCore {
    fn reset(&mut self) {
        self.levels.clear();
        self.level = 0;
    }

    fn step(&mut self, _bus: &mut dyn SystemBus) {
        self.steps += 1;
        // RTI
        if let Some(previous) = self.levels.pop() {
            self.level = previous;
        }
    }

    fn raise_exception(&mut self, level: u8, _index: usize) {
        self.deliveries += 1;
        // Reset does not stack.
        if level == 0 {
            self.levels.clear();
        } else {
            self.levels.push(self.level);
        }
        self.level = level;
    }

    fn exception_level(&self) -> u8 {
        self.level
    }

    fn master_interrupt_enable(&self) -> bool {
        true
    }
}
