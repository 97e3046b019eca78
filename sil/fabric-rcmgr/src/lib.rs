//! # Fabric Resource Manager
//!
//! Boot-time partitioning of the SoC address spaces across PCIe root
//! bridges. Before host firmware enumerates any PCI device, each root bridge
//! must own disjoint slices of four spaces: MMIO below 4 GiB, MMIO above
//! 4 GiB, legacy x86 port IO, and PCI bus numbers. This crate computes those
//! slices from per-bridge demands, programs the data-fabric address-map
//! registers, and afterwards serves runtime reservations for fixed-address
//! (non-PCI) devices out of the committed pools.
//!
//! ## Address map below 4 GiB
//!
//! ```text
//! +---------------------------------+ --+ 4G
//! |  Firmware, local APIC, ...      |     Left undescribed (COMPAT)
//! +---------------------------------+ --+ 0xFEC0_0000 (bottom of compat)
//! |  Reserved for primary RB        |     Fixed-address devices
//! +---------------------------------+ --+ bottom reserved for primary RB
//! |  MMIO above PCIe config         |
//! +---------------------------------+ --+ PCIe config base + size
//! |  PCIe configuration space       |
//! +---------------------------------+ --+ PCIe config base
//! |  MMIO below PCIe config         |
//! +---------------------------------+ --+ TOM
//! |  DRAM                           |
//! +---------------------------------+ --+ 0
//! ```
//!
//! The PCIe configuration window splits the usable MMIO into two sides. The
//! planner searches for an assignment of bridges to sides that satisfies
//! every demand; if no assignment fits (or no demands are known), an
//! equal-distribution fallback splits the space evenly instead.
//!
//! ## Planning and committing
//!
//! Planning is pure: feasibility walks mutate nothing but a report. Only a
//! layout that passed the full feasibility check is committed, which writes
//! the base/limit/control registers through
//! [`FabricRegisterAccess`](fabric_registers::FabricRegisterAccess) and
//! persists the chosen placement through [`PlacementStore`] so the next boot
//! converges to the same map.
//!
//! The entry point is [`FabricResourceManager`]: `initialize` runs the whole
//! boot flow, `probe` reports how much space the current demands need, and
//! `reserve_mmio` is the runtime sub-allocator for non-PCI regions.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod above4g;
mod bounds;
mod combination;
mod commit;
mod config;
mod demand;
mod equal;
mod error;
mod io_space;
mod layout;
mod manager;
mod pci_bus;
mod planner;
mod reserve;

pub use bounds::PlatformBounds;
pub use combination::PlacementVector;
pub use config::RcMgrConfig;
pub use demand::{
    Aperture, BOTTOM_OF_COMPAT, DF_IO_LIMIT, DemandTable, MMIO_MIN_SIZE, MmioClass,
    X86_IO_LIMIT, X86_LEGACY_IO_SIZE,
};
pub use error::RcError;
pub use layout::{IoLayout, IoRegion, MmioLayout, MmioRegion};
pub use manager::{FabricResourceManager, NullPlacementStore, PlacementStore, SpaceStatus};
pub use reserve::{FabricTarget, ReservedRegion};
