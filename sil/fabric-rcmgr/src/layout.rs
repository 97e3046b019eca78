use crate::demand::MmioClass;
use fabric_topology::{MAX_RBS_PER_SOCKET, MAX_SOCKETS};

/// Committed MMIO slice of one root bridge on one side of 4G.
///
/// Three sub-pools share the slice: prefetchable, non-prefetchable and
/// non-PCI. Each tracks how much of it has been handed out at runtime.
#[derive(Debug, Copy, Clone, Default)]
pub struct MmioRegion {
    pub base_non_prefetchable: u64,
    pub size_non_prefetchable: u64,
    pub used_non_prefetchable: u64,
    pub base_prefetchable: u64,
    pub size_prefetchable: u64,
    pub used_prefetchable: u64,
    pub base_non_pci: u64,
    pub size_non_pci: u64,
    pub used_non_pci: u64,
    pub align_non_prefetchable: u64,
    pub align_prefetchable: u64,
    pub align_non_pci: u64,
}

impl MmioRegion {
    fn pool(&self, class: MmioClass) -> (u64, u64) {
        match class {
            MmioClass::NonPrefetchableBelow4G | MmioClass::NonPrefetchableAbove4G => (
                self.base_non_prefetchable + self.used_non_prefetchable,
                self.size_non_prefetchable - self.used_non_prefetchable,
            ),
            MmioClass::PrefetchableBelow4G | MmioClass::PrefetchableAbove4G => (
                self.base_prefetchable + self.used_prefetchable,
                self.size_prefetchable - self.used_prefetchable,
            ),
            MmioClass::NonPciBelow4G | MmioClass::NonPciAbove4G => (
                self.base_non_pci + self.used_non_pci,
                self.size_non_pci - self.used_non_pci,
            ),
        }
    }

    /// Space still available in the pool once its cursor is rounded up to
    /// `align_mask`.
    #[must_use]
    pub fn remaining(&self, class: MmioClass, align_mask: u64) -> u64 {
        let (cursor, free) = self.pool(class);
        let aligned = (cursor + align_mask) & !align_mask;
        free.saturating_sub(aligned - cursor)
    }

    /// Claims `length` bytes from the pool, alignment padding included.
    ///
    /// Returns the aligned base, or `None` if the pool is unset or too full.
    pub fn claim(&mut self, class: MmioClass, length: u64, align_mask: u64) -> Option<u64> {
        let (cursor, free) = self.pool(class);
        if cursor == 0 || free == 0 {
            return None;
        }

        let aligned = (cursor + align_mask) & !align_mask;
        let consumed = length + aligned - cursor;
        if free < consumed {
            return None;
        }

        match class {
            MmioClass::NonPrefetchableBelow4G | MmioClass::NonPrefetchableAbove4G => {
                self.used_non_prefetchable += consumed;
            }
            MmioClass::PrefetchableBelow4G | MmioClass::PrefetchableAbove4G => {
                self.used_prefetchable += consumed;
            }
            MmioClass::NonPciBelow4G | MmioClass::NonPciAbove4G => {
                self.used_non_pci += consumed;
            }
        }
        Some(aligned)
    }
}

/// Every committed MMIO slice, indexed `[socket][root_bridge]`.
#[derive(Debug, Clone, Default)]
pub struct MmioLayout {
    pub below_4g: [[MmioRegion; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    pub above_4g: [[MmioRegion; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],

    /// Whether a bridge received any below/above-4G slice at all. A bridge
    /// without one must never be asked for space.
    pub has_below_4g: [[bool; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    pub has_above_4g: [[bool; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],

    /// Spare register pair carrying the primary root bridge's second
    /// below-4G region, if one was programmed.
    pub primary_second_pair: Option<(usize, usize)>,
}

/// Committed port IO slice of one root bridge.
#[derive(Debug, Copy, Clone, Default)]
pub struct IoRegion {
    pub base: u32,
    pub size: u32,
    pub used: u32,
    /// Legacy ISA ports owned by this bridge, on top of `size`.
    pub legacy_size: u32,
}

/// Every committed port IO slice, indexed `[socket][root_bridge]`.
#[derive(Debug, Clone, Default)]
pub struct IoLayout {
    pub regions: [[IoRegion; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
}
