//! Chipset error type.
//!
//! Only contract violations end up here.  A masked line or a handler
//! running at too high an exception level is not an error: the request
//! simply stays pending and is retried on the next cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChipsetError {
    #[error("{0} is not a valid maskable interrupt index")]
    InvalidMaskableIndex(usize),

    #[error("{0} is not a valid software interrupt number")]
    InvalidSoftwareIndex(usize),

    #[error("maskable line slot {slot} does not exist ({count} lines on this variant)")]
    InvalidLineSlot { slot: usize, count: usize },

    #[error("port {port} has no pin {pin}")]
    InvalidPortPin { port: usize, pin: usize },

    #[error("invalid BLKCON0 bit {bit} for peripheral {peripheral}")]
    InvalidBlockBit { peripheral: &'static str, bit: u8 },

    #[error("register region {name} at {base:#06X} overlaps {other}")]
    RegionOverlap {
        name: &'static str,
        base: u16,
        other: &'static str,
    },

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
