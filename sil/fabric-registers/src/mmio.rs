use bitfield_struct::bitfield;

/// MMIO region base register.
///
/// Holds address bits `[47:16]` of the first byte routed by this region;
/// regions are carved in 64 KiB granules.
#[bitfield(u32)]
pub struct MmioBaseAddress {
    /// Bits 0–31 — base address bits `[47:16]`.
    #[bits(32)]
    pub base_47_16: u32,
}

impl MmioBaseAddress {
    /// Builds the register value for a byte address. The address must be
    /// 64 KiB aligned.
    #[inline]
    #[must_use]
    pub const fn from_address(address: u64) -> Self {
        Self::new().with_base_47_16((address >> 16) as u32)
    }

    /// First byte address routed by this region.
    #[inline]
    #[must_use]
    pub const fn address(self) -> u64 {
        (self.base_47_16() as u64) << 16
    }
}

/// MMIO region limit register.
///
/// Holds address bits `[47:16]` of the last byte routed by this region; the
/// low 16 bits of the limit are implied to be all-ones.
#[bitfield(u32)]
pub struct MmioLimitAddress {
    /// Bits 0–31 — limit address bits `[47:16]`.
    #[bits(32)]
    pub limit_47_16: u32,
}

impl MmioLimitAddress {
    /// Builds the register value for an inclusive byte limit.
    #[inline]
    #[must_use]
    pub const fn from_address(address: u64) -> Self {
        Self::new().with_limit_47_16((address >> 16) as u32)
    }

    /// Last byte address routed by this region.
    #[inline]
    #[must_use]
    pub const fn address(self) -> u64 {
        ((self.limit_47_16() as u64) << 16) | 0xFFFF
    }
}

/// MMIO region control register.
#[bitfield(u32)]
pub struct MmioAddressControl {
    /// Bit 0 — Read Enable (RE).
    pub re_read_enable: bool,

    /// Bit 1 — Write Enable (WE).
    pub we_write_enable: bool,

    /// Bit 2 — CpuDis.
    ///
    /// CPU accesses with `ReqIo=1` in this range are redirected to the
    /// compatibility address space.
    pub cpu_dis: bool,

    /// Bit 3 — Non-Posted (NP).
    ///
    /// Writes to this region use non-posted transactions.
    pub np_non_posted: bool,

    /// Bits 4–15 — Reserved (must be 0).
    #[bits(12, default = 0)]
    _reserved_4_15: u16,

    /// Bits 16–27 — Destination fabric ID of the owning root bridge.
    #[bits(12)]
    pub dst_fabric_id: u16,

    /// Bits 28–31 — Reserved (must be 0).
    #[bits(4, default = 0)]
    _reserved_28_31: u8,
}
