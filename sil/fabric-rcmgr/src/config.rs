/// Host-supplied policy knobs for the resource manager.
///
/// These mirror the platform build options: where the PCIe configuration
/// window sits, how much space each root bridge sets aside for fixed-address
/// devices, and how far above 4 GiB MMIO may reach.
#[derive(Debug, Copy, Clone)]
pub struct RcMgrConfig {
    /// Base address of the PCIe extended configuration window. Recommended
    /// to sit directly at TOM.
    pub pci_express_base: u64,

    /// Bottom of the MMIO range reserved for the primary root bridge, just
    /// below the compat area.
    pub bottom_mmio_reserved_for_primary_rb: u64,

    /// Below-4G MMIO set aside per root bridge for non-PCI devices (IOAPIC,
    /// GPIO, mailboxes, IOMMU, ...).
    pub mmio_size_per_rb_for_non_pci: u64,

    /// Highest address MMIO above 4G may use, inclusive.
    pub mmio_above_4g_limit: u64,

    /// Above-4G MMIO set aside per root bridge for non-PCI devices.
    pub above_4g_mmio_size_per_rb_for_non_pci: u64,

    /// MCTP is routed through a BMC-owned bus; bus-number maps must not be
    /// reshuffled while it is active.
    pub mctp_enable: bool,
}

impl Default for RcMgrConfig {
    fn default() -> Self {
        Self {
            pci_express_base: 0xE000_0000,
            bottom_mmio_reserved_for_primary_rb: 0xFE00_0000,
            mmio_size_per_rb_for_non_pci: 0x100_0000,
            mmio_above_4g_limit: 0xFFFF_FFFF_FFFF,
            above_4g_mmio_size_per_rb_for_non_pci: 0x2020_0000,
            mctp_enable: false,
        }
    }
}
