/// Physical-address facts the planner needs from the rest of the platform.
#[derive(Debug, Copy, Clone)]
pub struct PlatformBounds {
    /// Top of DRAM below 4G.
    pub tom: u64,

    /// Top of DRAM above 4G; zero if no memory lives there.
    pub tom2: u64,

    /// Size of the PCIe extended configuration window (1 MiB per bus).
    pub pci_cfg_size: u64,

    /// Physical address width of the processor.
    pub phys_addr_bits: u8,

    /// Address bits withheld from MMIO use (memory encryption metadata).
    pub phys_addr_reduction: u8,
}

impl PlatformBounds {
    /// Highest address usable for MMIO above 4G, before policy clamping.
    ///
    /// The top 12 GiB of the reduced physical space stays out of reach of
    /// devices.
    #[must_use]
    pub fn mmio_ceiling_above_4g(&self) -> u64 {
        let usable_bits = self.phys_addr_bits.saturating_sub(self.phys_addr_reduction);
        (1u64 << usable_bits) - 0x3_0000_0000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_drops_the_top_12_gib() {
        let bounds = PlatformBounds {
            tom: 0x8000_0000,
            tom2: 0,
            pci_cfg_size: 0x1000_0000,
            phys_addr_bits: 48,
            phys_addr_reduction: 0,
        };
        assert_eq!(bounds.mmio_ceiling_above_4g(), 0x1_0000_0000_0000 - 0x3_0000_0000);
    }

    #[test]
    fn reduction_shrinks_the_usable_space() {
        let bounds = PlatformBounds {
            tom: 0x8000_0000,
            tom2: 0,
            pci_cfg_size: 0x1000_0000,
            phys_addr_bits: 48,
            phys_addr_reduction: 5,
        };
        assert_eq!(bounds.mmio_ceiling_above_4g(), (1u64 << 43) - 0x3_0000_0000);
    }
}
