//! Interrupt control logic.
//!
//! Every interrupt source owns one slot of a 128-entry active bitmap:
//!
//! | index   | source                         | exception level |
//! |---------|--------------------------------|-----------------|
//! | 1       | reset                          | 0               |
//! | 2       | break (BRK)                    | 2               |
//! | 3       | emulator debug (NMICI)         | 3               |
//! | 4       | non-maskable (watchdog)        | 2               |
//! | 5..64   | maskable peripheral lines      | 1               |
//! | 64..128 | software (SWI #0..#63)         | 1               |
//!
//! Lines 4..64 are mirrored in the interrupt mask and pending SFRs
//! (bit `index - 4`).  Arbitration picks one slot per cycle by fixed
//! priority; a slot that cannot be delivered yet stays active and is
//! picked again next cycle.

use log::{debug, info};

use super::line::{InterruptLine, MaskableLine, INT_MASKABLE, MANAGED_BASE};
use crate::cpu::InstructionCore;
use crate::error::ChipsetError;

pub const INT_RESET: usize = 1;
pub const INT_BREAK: usize = 2;
pub const INT_EMULATOR: usize = 3;
pub const INT_NONMASKABLE: usize = 4;
pub const INT_SOFTWARE: usize = 64;
pub const INT_COUNT: usize = 128;

/// Pending / mask bit of the non-maskable line.
const NMI_BIT: u32 = 1 << (INT_NONMASKABLE - MANAGED_BASE);

/// Exception level an interrupt index is delivered at.
pub fn exception_level_for(index: usize) -> u8 {
    match index {
        INT_RESET => 0,
        INT_BREAK | INT_NONMASKABLE => 2,
        INT_EMULATOR => 3,
        _ => 1,
    }
}

/// One accepted interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub index: usize,
    pub level: u8,
}

pub struct InterruptController {
    active: [bool; INT_COUNT],
    active_count: usize,

    /// Interrupt mask SFR (IE0..IE3).
    mask: u32,
    /// Interrupt pending SFR (IRQ0..IRQ3).
    pending: u32,
    valid_mask: u32,

    lines: Vec<InterruptLine>,

    /// Maskable interrupts held off by the core for one instruction.
    maskable_blocked: bool,
}

impl InterruptController {
    pub fn new(maskable_lines: usize, valid_mask: u32) -> Self {
        Self {
            active: [false; INT_COUNT],
            active_count: 0,
            mask: 0,
            pending: 0,
            valid_mask,
            lines: (0..maskable_lines).map(InterruptLine::new).collect(),
            maskable_blocked: false,
        }
    }

    /// Drop every request and re-arm the reset line.
    pub fn reset(&mut self) {
        self.mask = 0;
        self.pending = 0;
        for line in &mut self.lines {
            line.set_enabled(false);
        }
        self.active = [false; INT_COUNT];
        self.active_count = 0;
        self.maskable_blocked = false;
        self.raise_reset();
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Recount the bitmap.  Only used to check the counter invariant.
    pub fn count_active(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[InterruptLine] {
        &self.lines
    }

    /// Handle on maskable slot `slot`.
    pub fn line(&self, slot: usize) -> Result<MaskableLine, ChipsetError> {
        if slot >= self.lines.len() {
            return Err(ChipsetError::InvalidLineSlot {
                slot,
                count: self.lines.len(),
            });
        }
        Ok(MaskableLine(slot))
    }

    pub fn maskable_blocked(&self) -> bool {
        self.maskable_blocked
    }

    pub fn set_maskable_blocked(&mut self, blocked: bool) {
        self.maskable_blocked = blocked;
    }

    // ── Raise / reset ──────────────────────────────────────────

    fn activate(&mut self, index: usize) {
        if self.active[index] {
            return;
        }
        self.active[index] = true;
        self.active_count += 1;
    }

    fn deactivate(&mut self, index: usize) {
        if !self.active[index] {
            return;
        }
        self.active[index] = false;
        self.active_count -= 1;
    }

    pub fn raise_reset(&mut self) {
        self.activate(INT_RESET);
    }

    pub fn raise_break(&mut self) {
        self.activate(INT_BREAK);
    }

    pub fn raise_emulator(&mut self) {
        self.activate(INT_EMULATOR);
    }

    pub fn raise_nonmaskable(&mut self) {
        self.activate(INT_NONMASKABLE);
    }

    pub fn reset_nonmaskable(&mut self) {
        self.deactivate(INT_NONMASKABLE);
    }

    pub fn raise_maskable(&mut self, index: usize) -> Result<(), ChipsetError> {
        if !(INT_MASKABLE..INT_SOFTWARE).contains(&index) {
            return Err(ChipsetError::InvalidMaskableIndex(index));
        }
        self.activate(index);
        Ok(())
    }

    pub fn reset_maskable(&mut self, index: usize) -> Result<(), ChipsetError> {
        if !(INT_MASKABLE..INT_SOFTWARE).contains(&index) {
            return Err(ChipsetError::InvalidMaskableIndex(index));
        }
        self.deactivate(index);
        Ok(())
    }

    /// SWI #n.
    pub fn raise_software(&mut self, n: usize) -> Result<(), ChipsetError> {
        if n >= INT_COUNT - INT_SOFTWARE {
            return Err(ChipsetError::InvalidSoftwareIndex(n));
        }
        self.activate(INT_SOFTWARE + n);
        Ok(())
    }

    /// Watchdog-style request: latch the pending bit and raise the line
    /// straight away if it is unmasked.
    pub fn request_nonmaskable(&mut self) {
        self.pending |= NMI_BIT;
        if self.mask & NMI_BIT != 0 {
            self.raise_nonmaskable();
        }
    }

    // ── Line operations ────────────────────────────────────────

    pub fn set_enabled(&mut self, line: MaskableLine, enabled: bool) {
        self.lines[line.0].set_enabled(enabled);
    }

    /// Signal a hardware event on `line`.
    pub fn try_raise(&mut self, line: MaskableLine) {
        let l = self.lines[line.0];
        self.pending |= l.bit();
        if l.enabled() {
            self.activate(l.index());
        }
    }

    /// Drop the pending bit and any in-flight request on `line`.
    pub fn reset_int(&mut self, line: MaskableLine) {
        let l = self.lines[line.0];
        self.pending &= !l.bit();
        self.deactivate(l.index());
    }

    // ── SFR access ─────────────────────────────────────────────

    pub fn read_mask(&self, offset: usize) -> u8 {
        (self.mask >> (offset * 8)) as u8
    }

    pub fn read_pending(&self, offset: usize) -> u8 {
        (self.pending >> (offset * 8)) as u8
    }

    /// Write one byte of the mask register.
    pub fn write_mask(&mut self, offset: usize, data: u8) {
        self.mask = merge_byte(self.mask, offset, data) & self.valid_mask;
        for slot in 0..self.lines.len() {
            let bit = self.lines[slot].bit();
            self.lines[slot].set_enabled(self.mask & bit != 0);
        }
        if self.mask & NMI_BIT != 0 {
            if self.pending & NMI_BIT != 0 {
                self.raise_nonmaskable();
            }
        } else {
            self.reset_nonmaskable();
        }
    }

    /// Write one byte of the pending register.
    pub fn write_pending(&mut self, offset: usize, data: u8) {
        self.pending = merge_byte(self.pending, offset, data) & self.valid_mask;
        for slot in 0..self.lines.len() {
            let line = MaskableLine(slot);
            if self.pending & self.lines[slot].bit() != 0 {
                self.try_raise(line);
            } else {
                self.reset_int(line);
            }
        }
        if self.pending & NMI_BIT != 0 {
            if self.mask & NMI_BIT != 0 {
                self.raise_nonmaskable();
            }
        } else {
            self.reset_nonmaskable();
        }
    }

    // ── Arbitration ────────────────────────────────────────────

    /// Highest-priority active slot and whether it may be delivered at
    /// the given prior exception level.
    fn select(&self, old_level: u8, mie: bool) -> Option<(usize, bool)> {
        if self.active[INT_RESET] {
            return Some((INT_RESET, true));
        }
        if let Some(index) = (INT_SOFTWARE..INT_COUNT).find(|&ix| self.active[ix]) {
            if old_level > 1 {
                info!("[chipset] software interrupt {index:#04X} at exception level {old_level}");
            }
            return Some((index, true));
        }
        // NMICI has the highest level, no need to check.
        if self.active[INT_EMULATOR] {
            return Some((INT_EMULATOR, true));
        }
        // BRK at level > 1 already became a reset.
        if self.active[INT_BREAK] {
            return Some((INT_BREAK, true));
        }
        if self.active[INT_NONMASKABLE] {
            return Some((INT_NONMASKABLE, old_level <= 2));
        }
        (INT_MASKABLE..INT_SOFTWARE)
            .find(|&ix| self.active[ix])
            .map(|ix| (ix, old_level <= 1 && mie && !self.maskable_blocked))
    }

    /// Pick one interrupt and hand it to the core if it can be taken now.
    pub fn accept(&mut self, core: &mut dyn InstructionCore) -> Option<Delivery> {
        let old_level = core.exception_level();
        let (index, deliverable) = self.select(old_level, core.master_interrupt_enable())?;
        if !deliverable {
            return None;
        }

        // Lines past bit 31 have no shadow bit.
        if (INT_NONMASKABLE..INT_SOFTWARE).contains(&index) {
            if let Some(bit) = 1u32.checked_shl((index - MANAGED_BASE) as u32) {
                self.pending &= !bit;
            }
        }
        self.deactivate(index);

        let level = exception_level_for(index);
        debug!("[chipset] accepting interrupt {index:#04X} at level {level}");
        core.raise_exception(level, index);
        Some(Delivery { index, level })
    }
}

/// Replace byte `offset` of a little-endian register.
pub(crate) fn merge_byte(value: u32, offset: usize, data: u8) -> u32 {
    let shift = offset * 8;
    (value & !(0xFF << shift)) | ((data as u32) << shift)
}
