//! PCI bus number assignment.
//!
//! Bus ranges come out of the demand table; nothing is reprogrammed when the
//! decoded ranges already match. The primary root bridge always starts at
//! bus 0, the remaining bridges follow in a fixed per-socket order, and the
//! very last bridge's limit is stretched to 0xFF so every bus number has an
//! owner.

use crate::commit::{clear_cfg_map, set_cfg_map, set_secondary_bus};
use crate::demand::DemandTable;
use fabric_registers::{BUS_REGION_COUNT, FabricRegisterAccess};
use fabric_topology::Topology;

/// Per-socket assignment order of the non-primary root bridges.
///
/// Bridges 2 and 3 sit physically farther from the memory controllers and
/// are filled first so bridge 0's range stays small and close to bus 0.
/// Entries beyond the live bridge count are skipped.
const RB_ASSIGN_ORDER: [usize; 4] = [2, 3, 1, 0];

/// Reassigns every bridge's bus range from the demand table if the decoded
/// ranges drifted from it.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn init_pci_bus_from_demands<A: FabricRegisterAccess, T: Topology>(
    topo: &T,
    demand: &DemandTable,
    access: &mut A,
) {
    let socket_count = topo.socket_count();
    let rbs_per_socket = topo.rbs_per_socket();

    let mut need_reallocate = false;
    'check: for socket in 0..socket_count {
        for rb in 0..rbs_per_socket {
            let decoded = topo.bus_limit(socket, rb) - topo.bus_base(socket, rb) + 1;
            if decoded != u32::from(demand.pci_bus_count[socket][rb]) {
                need_reallocate = true;
                break 'check;
            }
        }
    }
    if !need_reallocate {
        return;
    }

    log::info!("assign PCI bus ranges from the demand table");

    // Every map starts disabled and every bridge decodes bus 0 until its
    // range is written below.
    for index in 0..BUS_REGION_COUNT {
        clear_cfg_map(access, socket_count, index);
    }
    for socket in 0..socket_count {
        for rb in 0..rbs_per_socket {
            set_secondary_bus(access, socket, rb, 0);
        }
    }

    let primary = topo.primary();
    let (ps, pr) = (primary.socket(), primary.root_bridge());
    let mut reg_index = 0;
    let mut bus_base: u16 = 0;
    let mut bus_limit: u16 = bus_base + demand.pci_bus_count[ps][pr] - 1;
    set_cfg_map(
        access,
        socket_count,
        reg_index,
        topo.fabric_id(ps, pr),
        bus_base as u8,
        bus_limit as u8,
    );
    set_secondary_bus(access, ps, pr, bus_base as u8);

    for socket in 0..socket_count {
        let assigned: usize = RB_ASSIGN_ORDER.iter().filter(|rb| **rb < rbs_per_socket).count();
        let mut walked = 0;
        for &rb in RB_ASSIGN_ORDER.iter().rev().filter(|rb| **rb < rbs_per_socket) {
            walked += 1;
            if socket == ps && rb == pr {
                continue;
            }
            reg_index += 1;
            bus_base = bus_limit + 1;
            let last = socket + 1 == socket_count && walked == assigned;
            bus_limit = if last {
                0xFF
            } else {
                bus_base + demand.pci_bus_count[socket][rb] - 1
            };
            set_cfg_map(
                access,
                socket_count,
                reg_index,
                topo.fabric_id(socket, rb),
                bus_base as u8,
                bus_limit as u8,
            );
            set_secondary_bus(access, socket, rb, bus_base as u8);
        }
    }
}
