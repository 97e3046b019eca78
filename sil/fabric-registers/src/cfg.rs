use bitfield_struct::bitfield;

/// PCI configuration address map base register.
#[bitfield(u32)]
pub struct CfgBaseAddress {
    /// Bit 0 — Read Enable (RE).
    pub re_read_enable: bool,

    /// Bit 1 — Write Enable (WE).
    pub we_write_enable: bool,

    /// Bits 2–7 — Reserved (must be 0).
    #[bits(6, default = 0)]
    _reserved_2_7: u8,

    /// Bits 8–15 — PCI segment number of this bus region.
    pub segment_num: u8,

    /// Bits 16–23 — first bus number decoded by this region.
    pub bus_num_base: u8,

    /// Bits 24–31 — Reserved (must be 0).
    #[bits(8, default = 0)]
    _reserved_24_31: u8,
}

/// PCI configuration address map limit register.
#[bitfield(u32)]
pub struct CfgLimitAddress {
    /// Bits 0–11 — Destination fabric ID of the owning root bridge.
    #[bits(12)]
    pub dst_fabric_id: u16,

    /// Bits 12–15 — Reserved (must be 0).
    #[bits(4, default = 0)]
    _reserved_12_15: u8,

    /// Bits 16–23 — last bus number decoded by this region.
    pub bus_num_limit: u8,

    /// Bits 24–31 — Reserved (must be 0).
    #[bits(8, default = 0)]
    _reserved_24_31: u8,
}

/// Per-root-bridge configuration address control register.
#[bitfield(u32)]
pub struct CfgAddressControl {
    /// Bits 0–7 — secondary bus number of the root bridge.
    pub secondary_bus: u8,

    /// Bits 8–31 — Reserved (must be 0).
    #[bits(24, default = 0)]
    _reserved_8_31: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_bit_positions() {
        let base = CfgBaseAddress::new()
            .with_re_read_enable(true)
            .with_we_write_enable(true)
            .with_bus_num_base(0x40);
        assert_eq!(base.into_bits(), 0x0040_0003);
    }

    #[test]
    fn limit_bit_positions() {
        let limit = CfgLimitAddress::new()
            .with_dst_fabric_id(0x20)
            .with_bus_num_limit(0xFF);
        assert_eq!(limit.into_bits(), 0x00FF_0020);
    }
}
