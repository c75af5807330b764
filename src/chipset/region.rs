//! SFR region router.
//!
//! Maps each claimed address range to its owner: one of the chipset's own
//! registers or a peripheral (by index into the peripheral table).  The
//! table is kept sorted by base address so a lookup is a binary search.

use crate::error::ChipsetError;
use crate::peripheral::Region;

/// Registers the chipset itself owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipRegister {
    Ltbadj,
    Fcon,
    Ltbr,
    Htbr,
    IntMask,
    IntPending,
    Blkcon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Chip(ChipRegister),
    Peripheral(usize),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    region: Region,
    owner: Owner,
}

#[derive(Default, Clone)]
pub struct RegionMap {
    entries: Vec<Entry>,
}

impl RegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `region` for `owner`.  Fails if any byte is already claimed.
    pub fn insert(&mut self, region: Region, owner: Owner) -> Result<(), ChipsetError> {
        if let Some(other) = self
            .entries
            .iter()
            .find(|e| {
                (region.base as u32) < e.region.end() && (e.region.base as u32) < region.end()
            })
        {
            return Err(ChipsetError::RegionOverlap {
                name: region.name,
                base: region.base,
                other: other.region.name,
            });
        }
        let at = self.entries.partition_point(|e| e.region.base < region.base);
        self.entries.insert(at, Entry { region, owner });
        Ok(())
    }

    /// Owner of `address` and the offset of `address` inside its region.
    pub fn lookup(&self, address: u16) -> Option<(Owner, usize)> {
        let at = self.entries.partition_point(|e| e.region.base <= address);
        let entry = self.entries[..at].last()?;
        if entry.region.contains(address) {
            Some((entry.owner, (address - entry.region.base) as usize))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = (&Region, Owner)> {
        self.entries.iter().map(|e| (&e.region, e.owner))
    }
}
