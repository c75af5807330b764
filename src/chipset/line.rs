//! Maskable interrupt lines.
//!
//! A line is only an index and an enabled flag.  Its pending bit lives
//! in the controller's pending register, so there is exactly one copy of
//! the state the guest can observe.

/// Index of the first maskable line in the 128-entry interrupt space.
pub const INT_MASKABLE: usize = 5;

/// Lines below this index are not mirrored in the shadow registers.
pub const MANAGED_BASE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptLine {
    index: usize,
    enabled: bool,
}

impl InterruptLine {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            index: slot + INT_MASKABLE,
            enabled: false,
        }
    }

    /// Position in the 128-entry interrupt space.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Bit of this line in the mask / pending registers.
    pub fn bit(&self) -> u32 {
        1 << (self.index - MANAGED_BASE)
    }
}

/// Validated handle on one maskable line.
///
/// Handed out by [`InterruptController::line`](super::interrupt::InterruptController::line),
/// which refuses slots the hardware variant does not wire, so holding one
/// means every raise through it is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskableLine(pub(crate) usize);

impl MaskableLine {
    pub fn slot(self) -> usize {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 + INT_MASKABLE
    }
}
