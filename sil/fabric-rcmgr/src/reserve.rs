//! Runtime reservation of non-PCI MMIO out of the committed layout.

use crate::demand::MmioClass;
use crate::error::RcError;
use crate::layout::MmioLayout;
use fabric_registers::{
    BUS_REGION_COUNT, CfgBaseAddress, CfgLimitAddress, FabricRegisterAccess, cfg_base_address,
    cfg_limit_address,
};
use fabric_topology::{ParticipantId, Topology};

/// Who a reservation is routed to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FabricTarget {
    /// A root bridge named directly.
    RootBridge(ParticipantId),
    /// The root bridge decoding the given bus, resolved through the
    /// programmed configuration address maps.
    PciBus { segment: u8, bus: u8 },
}

/// A successfully reserved MMIO range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ReservedRegion {
    pub base: u64,
    pub length: u64,
}

/// Walks the programmed bus maps to find the bridge owning `bus`.
fn resolve_pci_bus<A: FabricRegisterAccess, T: Topology>(
    access: &A,
    topo: &T,
    segment: u8,
    bus: u8,
) -> Option<(usize, usize)> {
    for index in 0..BUS_REGION_COUNT {
        let base = CfgBaseAddress::from_bits(access.read(0, cfg_base_address(index)));
        let limit = CfgLimitAddress::from_bits(access.read(0, cfg_limit_address(index)));
        if base.re_read_enable()
            && base.we_write_enable()
            && limit.bus_num_limit() >= bus
            && base.bus_num_base() <= bus
            && base.segment_num() == segment
        {
            let dst_fabric_id = limit.dst_fabric_id();
            for socket in 0..topo.socket_count() {
                for rb in 0..topo.rbs_per_socket() {
                    if topo.fabric_id(socket, rb) == dst_fabric_id {
                        return Some((socket, rb));
                    }
                }
            }
            return None;
        }
    }
    None
}

/// Reserves `length` bytes of MMIO for a non-PCI device.
///
/// Only the non-PCI pools can be drawn from at runtime; everything else
/// belongs to PCI enumeration. For the primary root bridge the smaller of
/// its first and second below-4G pools is tried first so the larger one
/// stays intact for bigger requests.
///
/// On `OutOfResources` the error carries the largest length that could have
/// been served.
pub(crate) fn reserve_mmio<A: FabricRegisterAccess, T: Topology>(
    access: &A,
    topo: &T,
    layout: &mut MmioLayout,
    length: u64,
    align_mask: u64,
    class: MmioClass,
    target: FabricTarget,
) -> Result<ReservedRegion, RcError> {
    if length == 0 {
        return Ok(ReservedRegion { base: 0, length: 0 });
    }
    if !class.is_non_pci() {
        log::warn!("only the non-PCI pools can be reserved at runtime");
        return Err(RcError::Aborted);
    }

    let (socket, rb) = match target {
        FabricTarget::PciBus { segment, bus } => {
            match resolve_pci_bus(access, topo, segment, bus) {
                Some(found) => found,
                None => {
                    log::error!("no root bridge decodes segment {segment} bus 0x{bus:X}");
                    return Err(RcError::Aborted);
                }
            }
        }
        FabricTarget::RootBridge(id) => {
            // Tolerate callers addressing a bridge index beyond the die shape.
            (id.socket(), id.root_bridge().min(topo.rbs_per_socket() - 1))
        }
    };

    let primary = topo.primary();
    if class.is_below_4g() {
        if !layout.has_below_4g[socket][rb] {
            log::error!("no below 4G MMIO on Socket{socket:X} RootBridge{rb:X}");
            return Err(RcError::Aborted);
        }

        let mut first = (socket, rb);
        let mut second = None;
        let mut size_a = layout.below_4g[socket][rb].remaining(class, align_mask);
        let mut size_b = 0;
        if primary.is(socket, rb) {
            if let Some((ts, tr)) = layout.primary_second_pair {
                size_b = layout.below_4g[ts][tr].remaining(class, align_mask);
                second = Some((ts, tr));
                if size_a > size_b && size_b != 0 {
                    // Draw from the smaller pool first.
                    second = Some(first);
                    first = (ts, tr);
                    core::mem::swap(&mut size_a, &mut size_b);
                }
            }
        }

        let claimed = if size_a >= length {
            layout.below_4g[first.0][first.1].claim(class, length, align_mask)
        } else {
            second
                .filter(|_| size_b >= length)
                .and_then(|(ts, tr)| layout.below_4g[ts][tr].claim(class, length, align_mask))
        };
        match claimed {
            Some(base) => {
                log::info!("reserve MMIO 0x{:X} ~ 0x{:X}", base, base + length - 1);
                Ok(ReservedRegion { base, length })
            }
            None => {
                let largest = size_a.max(size_b);
                log::warn!("not enough space, the biggest MMIO size is 0x{largest:X}");
                Err(RcError::OutOfResources { size: largest })
            }
        }
    } else {
        if !layout.has_above_4g[socket][rb] {
            log::error!("no above 4G MMIO on Socket{socket:X} RootBridge{rb:X}");
            return Err(RcError::Aborted);
        }

        let remaining = layout.above_4g[socket][rb].remaining(class, align_mask);
        let claimed = if remaining >= length {
            layout.above_4g[socket][rb].claim(class, length, align_mask)
        } else {
            None
        };
        match claimed {
            Some(base) => {
                log::info!("reserve MMIO 0x{:X} ~ 0x{:X}", base, base + length - 1);
                Ok(ReservedRegion { base, length })
            }
            None => {
                log::warn!("not enough space, the biggest MMIO size is 0x{remaining:X}");
                Err(RcError::OutOfResources { size: remaining })
            }
        }
    }
}
