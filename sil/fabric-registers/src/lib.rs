//! # Data-Fabric Address-Map Registers
//!
//! Bit-accurate models of the data-fabric registers that steer MMIO, x86 IO
//! and PCI configuration traffic to the PCIe root bridges, plus the access
//! trait the resource manager uses to program them.
//!
//! ## Register families
//!
//! Three register families cover the three address spaces. Each family is an
//! array of instances with a fixed stride, one instance per routable region:
//!
//! * **MMIO** — base/limit pair plus a control word per region. Base and
//!   limit hold address bits `[47:16]`, so regions are carved in 64 KiB
//!   granules. The control word carries read/write enables, posting control
//!   and the destination fabric ID.
//! * **x86 IO** — base/limit pair per region. Base and limit hold address
//!   bits `[24:12]` (4 KiB granules); the fabric decodes up to 25 bits of IO
//!   space even though x86 port IO stops at 64 KiB.
//! * **PCI configuration** — bus-number base/limit pair per region, with the
//!   destination fabric ID in the limit word, and a per-root-bridge control
//!   register holding the secondary bus number.
//!
//! All writes are broadcast to every component on a socket; the resource
//! manager repeats them for each populated socket so the whole fabric holds
//! one coherent map.
//!
//! [`ShadowFabric`] is an in-memory implementation of [`FabricRegisterAccess`]
//! used by tests and by hosts that want to stage a map before committing it.

#![cfg_attr(not(any(test, doctest)), no_std)]
// Register fields are narrower than the integers carrying them.
#![allow(clippy::cast_possible_truncation)]

mod access;
mod cfg;
mod io;
mod mmio;
mod shadow;

pub use access::{FabricRegisterAccess, RegisterInstance};
pub use cfg::{CfgAddressControl, CfgBaseAddress, CfgLimitAddress};
pub use io::{X86IoBaseAddress, X86IoLimitAddress};
pub use mmio::{MmioAddressControl, MmioBaseAddress, MmioLimitAddress};

/// Number of MMIO base/limit/control register triples per socket.
///
/// Two per root bridge: the even pair maps the below-4G region, the odd pair
/// the above-4G region.
pub const MMIO_REGION_COUNT: usize = 16;

/// Number of x86 IO base/limit register pairs per socket.
pub const IO_REGION_COUNT: usize = 8;

/// Number of PCI configuration address map register pairs per socket.
pub const BUS_REGION_COUNT: usize = 8;

/// Per-root-bridge configuration address control register.
pub const CFG_ADDRESS_CONTROL: u16 = 0xC04;

const CFG_BASE_ADDRESS_0: u16 = 0xC80;
const CFG_LIMIT_ADDRESS_0: u16 = 0xC84;
const CFG_STRIDE: u16 = 0x8;

const X86_IO_BASE_ADDRESS_0: u16 = 0xD00;
const X86_IO_LIMIT_ADDRESS_0: u16 = 0xD04;
const X86_IO_STRIDE: u16 = 0x8;

const MMIO_BASE_ADDRESS_0: u16 = 0xD80;
const MMIO_LIMIT_ADDRESS_0: u16 = 0xD84;
const MMIO_ADDRESS_CONTROL_0: u16 = 0xD88;
const MMIO_STRIDE: u16 = 0x10;

/// Offset of the `index`-th PCI configuration base register.
#[inline]
#[must_use]
pub const fn cfg_base_address(index: usize) -> u16 {
    debug_assert!(index < BUS_REGION_COUNT);
    CFG_BASE_ADDRESS_0 + index as u16 * CFG_STRIDE
}

/// Offset of the `index`-th PCI configuration limit register.
#[inline]
#[must_use]
pub const fn cfg_limit_address(index: usize) -> u16 {
    debug_assert!(index < BUS_REGION_COUNT);
    CFG_LIMIT_ADDRESS_0 + index as u16 * CFG_STRIDE
}

/// Offset of the `index`-th x86 IO base register.
#[inline]
#[must_use]
pub const fn x86_io_base_address(index: usize) -> u16 {
    debug_assert!(index < IO_REGION_COUNT);
    X86_IO_BASE_ADDRESS_0 + index as u16 * X86_IO_STRIDE
}

/// Offset of the `index`-th x86 IO limit register.
#[inline]
#[must_use]
pub const fn x86_io_limit_address(index: usize) -> u16 {
    debug_assert!(index < IO_REGION_COUNT);
    X86_IO_LIMIT_ADDRESS_0 + index as u16 * X86_IO_STRIDE
}

/// Offset of the `pair`-th MMIO base register.
#[inline]
#[must_use]
pub const fn mmio_base_address(pair: usize) -> u16 {
    debug_assert!(pair < MMIO_REGION_COUNT);
    MMIO_BASE_ADDRESS_0 + pair as u16 * MMIO_STRIDE
}

/// Offset of the `pair`-th MMIO limit register.
#[inline]
#[must_use]
pub const fn mmio_limit_address(pair: usize) -> u16 {
    debug_assert!(pair < MMIO_REGION_COUNT);
    MMIO_LIMIT_ADDRESS_0 + pair as u16 * MMIO_STRIDE
}

/// Offset of the `pair`-th MMIO address control register.
#[inline]
#[must_use]
pub const fn mmio_address_control(pair: usize) -> u16 {
    debug_assert!(pair < MMIO_REGION_COUNT);
    MMIO_ADDRESS_CONTROL_0 + pair as u16 * MMIO_STRIDE
}

pub use shadow::ShadowFabric;
