//! calcchip: the chipset half of an nX-U8 calculator emulator.
//!
//! The crate models the interrupt controller, the multi-domain clock
//! generator, the per-cycle tick scheduler and the on-chip timing
//! peripherals of the ES PLUS / ClassWiz / ClassWiz II families.  The
//! instruction core is supplied by the caller through
//! [`cpu::InstructionCore`].

pub mod chipset;
pub mod config;
pub mod cpu;
pub mod error;
pub mod peripheral;

pub use chipset::clock::{ClockGenerator, ClockSnapshot};
pub use chipset::interrupt::{Delivery, InterruptController};
pub use chipset::line::MaskableLine;
pub use chipset::variant::HardwareVariant;
pub use chipset::{Chipset, RunMode, Stats};
pub use config::ChipsetConfig;
pub use cpu::{IdleCore, InstructionCore, SystemBus};
pub use error::ChipsetError;
pub use peripheral::{
    ClockDomain, Peripheral, PeripheralContext, PinInput, PortInputs, Region,
};
