//! Port IO distribution.
//!
//! Regions are handed out in bus-number order so port decode matches PCI
//! enumeration order, with the primary root bridge anchored at port 0 to
//! keep the legacy ISA range. The fabric routes 25 bits of IO space; the
//! last bridge's register limit is stretched to cover all of it, but only
//! ports below the 16-bit x86 limit are ever reported as usable.

use crate::commit::set_io_region;
use crate::demand::{DF_IO_LIMIT, DemandTable, IO_SIZE_MASK, X86_IO_LIMIT, X86_LEGACY_IO_SIZE};
use crate::layout::IoLayout;
use crate::manager::SpaceStatus;
use fabric_registers::FabricRegisterAccess;
use fabric_topology::{MAX_HOST_BRIDGES, Topology};

/// Root bridges sorted by their decoded bus base, invalid ranges last.
///
/// Returns dense `(socket, root_bridge)` pairs; only the first
/// `host_bridge_count` entries are meaningful.
fn bus_order<T: Topology>(topo: &T) -> [(usize, usize); MAX_HOST_BRIDGES] {
    let mut keys = [u32::MAX; MAX_HOST_BRIDGES];
    let mut order = [(0, 0); MAX_HOST_BRIDGES];
    let mut count = 0;
    for socket in 0..topo.socket_count() {
        for rb in 0..topo.rbs_per_socket() {
            let base = topo.bus_base(socket, rb);
            keys[count] = if base > topo.bus_limit(socket, rb) { u32::MAX } else { base };
            order[count] = (socket, rb);
            count += 1;
        }
    }
    // Insertion sort; the list is at most eight entries.
    for i in 1..count {
        let mut j = i;
        while j > 0 && keys[j] < keys[j - 1] {
            keys.swap(j, j - 1);
            order.swap(j, j - 1);
            j -= 1;
        }
    }
    order
}

/// Splits the 16-bit port space evenly across all root bridges.
pub(crate) fn init_io_equally<A: FabricRegisterAccess, T: Topology>(
    topo: &T,
    access: &mut A,
    layout: &mut IoLayout,
) {
    let socket_count = topo.socket_count();
    let n = topo.host_bridge_count();
    let primary = topo.primary();

    log::info!("reserve 0x{X86_LEGACY_IO_SIZE:X} IO size for legacy devices");
    let share = ((X86_IO_LIMIT - X86_LEGACY_IO_SIZE) / n as u32) & IO_SIZE_MASK;

    let base_for_primary = 0u32;
    let mut size_for_primary = DF_IO_LIMIT - base_for_primary;
    let mut base_for_others = 0u32;
    if n > 1 {
        // The primary's share starts at port 0 and carries the legacy range.
        size_for_primary = share + X86_LEGACY_IO_SIZE;
        base_for_others = base_for_primary + size_for_primary;
    }

    let order = bus_order(topo);
    for (logical, &(socket, rb)) in order.iter().take(n).enumerate() {
        let is_primary = primary.is(socket, rb);
        let (base, mut size) = if is_primary {
            (base_for_primary, size_for_primary)
        } else {
            let base = base_for_others;
            base_for_others += share;
            (base, share)
        };
        if logical + 1 == n {
            // The fabric decodes up to 25 bits of IO; route all of it.
            size = DF_IO_LIMIT - base;
        }

        set_io_region(access, socket_count, logical, topo.fabric_id(socket, rb), base, size);

        let region = &mut layout.regions[socket][rb];
        if is_primary {
            region.base = base + X86_LEGACY_IO_SIZE;
            region.size = size - X86_LEGACY_IO_SIZE;
            region.legacy_size = X86_LEGACY_IO_SIZE;
        } else {
            region.base = base;
            region.size = size;
            region.legacy_size = 0;
        }
        region.used = 0;
        if logical + 1 == n {
            // Only ports below the x86 limit are usable by devices.
            region.size = X86_IO_LIMIT - region.base;
        }
        log::info!(
            "Socket{socket:X} RootBridge{rb:X} has IO base 0x{:X} size 0x{:X}",
            region.base,
            region.size
        );
    }
}

/// Sizes each bridge's IO region from the demand table.
///
/// With `set_registers` unset this only accumulates `status`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn init_io_from_demands<A: FabricRegisterAccess, T: Topology>(
    topo: &T,
    demand: &DemandTable,
    access: &mut A,
    layout: &mut IoLayout,
    mut status: Option<&mut SpaceStatus>,
    set_registers: bool,
) {
    let socket_count = topo.socket_count();
    let n = topo.host_bridge_count();
    let primary = topo.primary();

    let base_for_primary = 0u32;
    let mut size_for_primary = DF_IO_LIMIT - base_for_primary;
    let mut base_for_others = 0u32;
    if n > 1 {
        let demanded =
            demand.io[primary.socket()][primary.root_bridge()] as u32 & IO_SIZE_MASK;
        size_for_primary = demanded + X86_LEGACY_IO_SIZE;
        base_for_others = base_for_primary + size_for_primary;
    }

    log::info!("reserve 0x{X86_LEGACY_IO_SIZE:X} IO size for legacy devices");

    let order = bus_order(topo);
    let mut reg_index = 0;
    for (logical, &(socket, rb)) in order.iter().take(n).enumerate() {
        let demanded = demand.io[socket][rb] as u32 & IO_SIZE_MASK;
        if let Some(status) = status.as_deref_mut() {
            status.io_size += demanded;
        }

        let is_primary = primary.is(socket, rb);
        let (base, mut size) = if is_primary {
            (base_for_primary, size_for_primary)
        } else {
            let base = base_for_others;
            base_for_others += demanded;
            (base, demanded)
        };
        if logical + 1 == n {
            size = DF_IO_LIMIT - base;
        }

        debug_assert!(base < X86_IO_LIMIT);
        if size == 0 {
            continue;
        }

        if set_registers {
            set_io_region(access, socket_count, reg_index, topo.fabric_id(socket, rb), base, size);

            let region = &mut layout.regions[socket][rb];
            if is_primary {
                region.base = base + X86_LEGACY_IO_SIZE;
                region.size = size - X86_LEGACY_IO_SIZE;
                region.legacy_size = X86_LEGACY_IO_SIZE;
            } else {
                region.base = base;
                region.size = size;
                region.legacy_size = 0;
            }
            region.used = 0;
            if logical + 1 == n {
                region.size = X86_IO_LIMIT - region.base;
            }
            log::info!(
                "Socket{socket:X} RootBridge{rb:X} has IO base 0x{:X} size 0x{:X}",
                region.base,
                region.size
            );
        }
        reg_index += 1;
    }

    if let Some(status) = status {
        status.io_size_req_inc = status.io_size.saturating_sub(X86_IO_LIMIT);
        log::info!(
            "space status: IoSize 0x{:X}, req inc 0x{:X}",
            status.io_size,
            status.io_size_req_inc
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_registers::{ShadowFabric, X86IoBaseAddress, X86IoLimitAddress, x86_io_base_address, x86_io_limit_address};
    use fabric_topology::{ParticipantId, SocRbMap};

    fn two_sockets() -> SocRbMap {
        SocRbMap::new(
            2,
            1,
            [[0x00; 4], [0x40; 4]],
            [[0; 4], [0x80, 0, 0, 0]],
            [[0x7F, 0, 0, 0], [0xFF, 0, 0, 0]],
            ParticipantId::new(0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn equal_split_anchors_the_primary_at_port_zero() {
        let topo = two_sockets();
        let mut shadow = ShadowFabric::new();
        let mut layout = IoLayout::default();

        init_io_equally(&topo, &mut shadow, &mut layout);

        // Share is (0x10000 - 0x1000) / 2 rounded down to 4K, 0x7000 each.
        let primary = layout.regions[0][0];
        assert_eq!(primary.base, 0x1000);
        assert_eq!(primary.size, 0x7000);
        assert_eq!(primary.legacy_size, 0x1000);

        // The last bridge is stretched to the x86 limit in the layout.
        let other = layout.regions[1][0];
        assert_eq!(other.base, 0x8000);
        assert_eq!(other.size, X86_IO_LIMIT - 0x8000);

        // Its register limit covers the whole fabric IO space.
        let limit = X86IoLimitAddress::from_bits(shadow.read(0, x86_io_limit_address(1)));
        assert_eq!(limit.io_limit_24_12(), 0x1FFF);
        let base = X86IoBaseAddress::from_bits(shadow.read(0, x86_io_base_address(1)));
        assert_eq!(base.io_base_24_12(), 0x8);
        assert!(base.re_read_enable());
        assert!(base.we_write_enable());
    }

    #[test]
    fn demand_sized_regions_skip_bridges_without_demand() {
        let topo = two_sockets();
        let mut demand = DemandTable::default();
        demand.io[0][0] = 0x4000;
        let mut shadow = ShadowFabric::new();
        let mut layout = IoLayout::default();

        init_io_from_demands(&topo, &demand, &mut shadow, &mut layout, None, true);

        let primary = layout.regions[0][0];
        assert_eq!(primary.base, 0x1000);
        assert_eq!(primary.size, 0x4000);

        // The second bridge demanded nothing but is last, so it still takes
        // the rest of the space on the next register index.
        let other = layout.regions[1][0];
        assert_eq!(other.base, 0x5000);
        assert_eq!(other.size, X86_IO_LIMIT - 0x5000);
        let limit = X86IoLimitAddress::from_bits(shadow.read(0, x86_io_limit_address(1)));
        assert_eq!(limit.io_limit_24_12(), 0x1FFF);
    }

    #[test]
    fn demand_total_reports_the_shortfall() {
        let topo = two_sockets();
        let mut demand = DemandTable::default();
        demand.io[0][0] = 0xC000;
        demand.io[1][0] = 0x8000;
        let mut shadow = ShadowFabric::new();
        let mut layout = IoLayout::default();
        let mut status = SpaceStatus::default();

        init_io_from_demands(&topo, &demand, &mut shadow, &mut layout, Some(&mut status), false);

        assert_eq!(status.io_size, 0x1_4000);
        assert_eq!(status.io_size_req_inc, 0x4000);
    }
}
