use bitfield_struct::bitfield;

/// x86 IO region base register.
#[bitfield(u32)]
pub struct X86IoBaseAddress {
    /// Bit 0 — Read Enable (RE).
    pub re_read_enable: bool,

    /// Bit 1 — Write Enable (WE).
    pub we_write_enable: bool,

    /// Bits 2–4 — Reserved (must be 0).
    #[bits(3, default = 0)]
    _reserved_2_4: u8,

    /// Bit 5 — ISA Enable (IE).
    ///
    /// Blocks forwarding of ISA alias ports within this range.
    pub ie_isa_enable: bool,

    /// Bits 6–15 — Reserved (must be 0).
    #[bits(10, default = 0)]
    _reserved_6_15: u16,

    /// Bits 16–28 — base address bits `[24:12]` (4 KiB granules).
    #[bits(13)]
    pub io_base_24_12: u16,

    /// Bits 29–31 — Reserved (must be 0).
    #[bits(3, default = 0)]
    _reserved_29_31: u8,
}

impl X86IoBaseAddress {
    /// Builds the register value for a port address, truncated to 4 KiB.
    #[inline]
    #[must_use]
    pub const fn from_port(port: u32) -> Self {
        Self::new().with_io_base_24_12(((port & 0xFFFF_F000) >> 12) as u16)
    }
}

/// x86 IO region limit register.
#[bitfield(u32)]
pub struct X86IoLimitAddress {
    /// Bits 0–11 — Destination fabric ID of the owning root bridge.
    #[bits(12)]
    pub dst_fabric_id: u16,

    /// Bits 12–15 — Reserved (must be 0).
    #[bits(4, default = 0)]
    _reserved_12_15: u8,

    /// Bits 16–28 — limit address bits `[24:12]` (4 KiB granules).
    #[bits(13)]
    pub io_limit_24_12: u16,

    /// Bits 29–31 — Reserved (must be 0).
    #[bits(3, default = 0)]
    _reserved_29_31: u8,
}

impl X86IoLimitAddress {
    /// Builds the register value for an inclusive port limit.
    #[inline]
    #[must_use]
    pub const fn from_port(port: u32) -> Self {
        Self::new().with_io_limit_24_12(((port & 0xFFFF_F000) >> 12) as u16)
    }
}
