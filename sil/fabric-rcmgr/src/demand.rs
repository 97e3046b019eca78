use fabric_topology::{MAX_RBS_PER_SOCKET, MAX_SOCKETS};

/// Smallest MMIO range the fabric can describe, 64 KiB.
pub const MMIO_MIN_SIZE: u64 = 0x1_0000;

/// Alignment mask for below-4G non-PCI regions (64 KiB granularity).
pub const NON_PCI_MMIO_ALIGN_MASK: u64 = 0xFFFF;

/// Alignment mask for above-4G non-PCI regions (256 MiB granularity).
pub const NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G: u64 = 0xFFF_FFFF;

/// Smallest useful below-4G non-PCI pool per root bridge.
pub const MMIO_MIN_NON_PCI_SIZE: u64 = 0x50_0000;

/// Smallest useful above-4G non-PCI pool per root bridge.
pub const MMIO_MIN_NON_PCI_SIZE_ABOVE_4G: u64 = 0x2020_0000;

/// Highest port number the data fabric can route.
pub const DF_IO_LIMIT: u32 = 0x200_0000;

/// End of the x86 port IO space.
pub const X86_IO_LIMIT: u32 = 0x1_0000;

/// Legacy ISA port range owned by the primary root bridge.
pub const X86_LEGACY_IO_SIZE: u32 = 0x1000;

/// Port IO region sizes are multiples of 4 KiB.
pub const IO_SIZE_MASK: u32 = 0xFFFF_F000;

/// Mask that rounds a size down to a 16 MiB multiple.
pub const SIZE_16M_MASK: u64 = 0xFFFF_FFFF_FF00_0000;

/// Start of the compat area directly below 4G (IOAPIC, firmware, ...).
pub const BOTTOM_OF_COMPAT: u64 = 0xFEC0_0000;

/// Fixed posted-write region that must always be routed to the primary.
pub const POSTED_REGION_BASE: u64 = 0xFED0_0000;

/// Inclusive end of the posted-write region.
pub const POSTED_REGION_END: u64 = 0xFED0_FFFF;

/// Base of the architectural MMIO hole at 1012 GiB.
pub const MMIO_HOLE_BASE: u64 = 0xFD_0000_0000;

/// First address after the architectural MMIO hole (1 TiB).
pub const MMIO_HOLE_LIMIT: u64 = 0x100_0000_0000;

/// Which of the six MMIO pools a request draws from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MmioClass {
    NonPrefetchableBelow4G,
    PrefetchableBelow4G,
    NonPciBelow4G,
    NonPrefetchableAbove4G,
    PrefetchableAbove4G,
    NonPciAbove4G,
}

impl MmioClass {
    #[inline]
    #[must_use]
    pub const fn is_below_4g(self) -> bool {
        matches!(
            self,
            Self::NonPrefetchableBelow4G | Self::PrefetchableBelow4G | Self::NonPciBelow4G
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_non_pci(self) -> bool {
        matches!(self, Self::NonPciBelow4G | Self::NonPciAbove4G)
    }
}

/// One requested window: how much and on what boundary.
///
/// `align_mask` is the low-bit mask form, e.g. `0xFFFFF` for 1 MiB alignment.
#[derive(Debug, Copy, Clone, Default)]
pub struct Aperture {
    pub size: u64,
    pub align_mask: u64,
}

impl Aperture {
    #[inline]
    #[must_use]
    pub const fn new(size: u64, align_mask: u64) -> Self {
        Self { size, align_mask }
    }
}

/// Per-root-bridge resource demands, collected by a previous boot's
/// enumeration pass and replayed into the planner.
///
/// Indexed `[socket][root_bridge]`. Bridges beyond the live topology keep
/// zero entries; a zero-size aperture simply asks for nothing.
#[derive(Debug, Clone, Default)]
pub struct DemandTable {
    pub prefetchable_below_4g: [[Aperture; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    pub non_prefetchable_below_4g: [[Aperture; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    pub prefetchable_above_4g: [[Aperture; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    pub non_prefetchable_above_4g: [[Aperture; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],

    /// Demands for the primary root bridge's second below-4G region, used
    /// when its first region cannot grow any further.
    pub primary_second_prefetchable: Aperture,
    pub primary_second_non_prefetchable: Aperture,

    /// Port IO bytes wanted per root bridge.
    pub io: [[u64; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],

    /// PCI bus numbers wanted per root bridge.
    pub pci_bus_count: [[u16; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
}
