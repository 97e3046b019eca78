//! Above-4G MMIO window selection and per-bridge bump allocation.

use crate::bounds::PlatformBounds;
use crate::commit::{mmio_pair, set_mmio_pair};
use crate::config::RcMgrConfig;
use crate::demand::{
    MMIO_HOLE_BASE, MMIO_HOLE_LIMIT, MMIO_MIN_NON_PCI_SIZE_ABOVE_4G,
    NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G,
};
use crate::layout::{MmioLayout, MmioRegion};
use crate::manager::SpaceStatus;
use crate::planner::PlanCtx;
use fabric_registers::FabricRegisterAccess;
use fabric_topology::Topology;

/// Usable above-4G window, `base..limit`. A zero limit means no space.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Above4gWindow {
    pub base: u64,
    pub limit: u64,
}

/// Computes the above-4G window from the physical address width, the policy
/// ceiling, the PCIe configuration window and the architectural hole at
/// 1012 GiB.
///
/// `clamp_limit_to_base` keeps a policy ceiling below the base from producing
/// an inverted window.
pub(crate) fn above_4g_window(
    cfg: &RcMgrConfig,
    bounds: &PlatformBounds,
    clamp_limit_to_base: bool,
) -> Above4gWindow {
    let mut base = bounds.tom2.max(0x1_0000_0000);
    let mut limit = bounds.mmio_ceiling_above_4g();

    if cfg.mmio_above_4g_limit < limit {
        limit = (cfg.mmio_above_4g_limit + 1) & 0xFFFF_FFFF_FFFF_0000;
        if clamp_limit_to_base && limit <= base {
            limit = base;
        }
    }

    // A PCIe configuration window above 4G punches a hole; keep whichever
    // side of it is larger.
    if cfg.pci_express_base >= 0x1_0000_0000 {
        debug_assert!(cfg.pci_express_base >= bounds.tom2);
        debug_assert!(cfg.pci_express_base + bounds.pci_cfg_size < limit);
        if cfg.pci_express_base - bounds.tom2
            < limit - (cfg.pci_express_base + bounds.pci_cfg_size)
        {
            base = cfg.pci_express_base + bounds.pci_cfg_size;
        } else {
            limit = cfg.pci_express_base;
        }
    }

    // Same for the architectural hole below 1 TiB.
    let mut size_below_hole = 0;
    let mut size_above_hole = 0;
    if base < MMIO_HOLE_BASE {
        size_below_hole = limit.min(MMIO_HOLE_BASE).saturating_sub(base);
    }
    if limit > MMIO_HOLE_LIMIT {
        size_above_hole = limit - base.max(MMIO_HOLE_LIMIT);
    }

    if size_below_hole == 0 && size_above_hole == 0 {
        log::warn!("there is no MMIO space above 4G");
        limit = 0;
    } else if size_above_hole > size_below_hole {
        base = bounds.tom2.max(MMIO_HOLE_LIMIT);
    } else {
        limit = limit.min(MMIO_HOLE_BASE);
    }

    log::info!("above 4G MMIO base is 0x{base:X}, limit is 0x{limit:X}");
    Above4gWindow { base, limit }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Pool {
    NonPci,
    Prefetchable,
    NonPrefetchable,
}

/// Lays out every bridge's above-4G slice as a bump allocation from
/// `next_base`.
///
/// Within one slice the three pools are ordered by alignment, alternating
/// between biggest-alignment-first and smallest-first from bridge to bridge
/// so neighbouring slices share aligned boundaries. Returns `false` once
/// `next_base` passes `limit`; registers and layout entries are only written
/// for bridges laid out while space remained.
#[allow(clippy::too_many_lines, clippy::similar_names)]
pub(crate) fn arrange_above_4g<A: FabricRegisterAccess, T: Topology>(
    ctx: &PlanCtx<'_, T>,
    mut status: Option<&mut SpaceStatus>,
    next_base: &mut u64,
    limit: u64,
    mut commit: Option<(&mut A, &mut MmioLayout)>,
) -> bool {
    let socket_count = ctx.topo.socket_count();
    let rbs_per_socket = ctx.topo.rbs_per_socket();

    let mut enough_space = true;
    let mut big_align_first = true;
    let align_non_pci = NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G;
    let size_non_pci = ctx
        .cfg
        .above_4g_mmio_size_per_rb_for_non_pci
        .max(MMIO_MIN_NON_PCI_SIZE_ABOVE_4G);

    log::info!("{socket_count} socket(s), {rbs_per_socket} root bridge(s) per socket");
    for socket in 0..socket_count {
        for rb in 0..rbs_per_socket {
            let prefetchable = ctx.demand.prefetchable_above_4g[socket][rb];
            let non_prefetchable = ctx.demand.non_prefetchable_above_4g[socket][rb];

            if let Some(status) = status.as_deref_mut() {
                status.mmio_size_above_4g += prefetchable.size + non_prefetchable.size;
                status.mmio_size_below_4g += ctx.demand.prefetchable_below_4g[socket][rb].size
                    + ctx.demand.non_prefetchable_below_4g[socket][rb].size;
            }

            if prefetchable.size + non_prefetchable.size + size_non_pci == 0 {
                continue;
            }

            let align = non_prefetchable.align_mask;
            let align_p = prefetchable.align_mask;
            let slice_base = *next_base;

            // Default order matches the equal-distribution path: non-PCI,
            // then prefetchable, then non-prefetchable.
            let mut queue = [
                (Pool::NonPci, align_non_pci),
                (Pool::Prefetchable, align_p),
                (Pool::NonPrefetchable, align),
            ];
            for pass in 0..queue.len() {
                for i in 0..(queue.len() - pass - 1) {
                    let swap = if big_align_first {
                        queue[i].1 < queue[i + 1].1
                    } else {
                        // Smallest first, but zero alignment always lands at
                        // the high end of the slice.
                        (queue[i].1 > queue[i + 1].1 || queue[i].1 == 0) && queue[i + 1].1 != 0
                    };
                    if swap {
                        queue.swap(i, i + 1);
                    }
                }
            }
            big_align_first = !big_align_first;

            let mut base_prefetchable = 0;
            let mut base_non_prefetchable = 0;
            let mut base_non_pci = 0;
            let mut size_prefetchable = 0;
            let mut size_non_prefetchable = 0;
            for (pool, _) in queue {
                match pool {
                    Pool::NonPrefetchable => {
                        base_non_prefetchable = (*next_base + align) & !align;
                        size_non_prefetchable = non_prefetchable.size;
                        *next_base = base_non_prefetchable + size_non_prefetchable;
                    }
                    Pool::Prefetchable => {
                        base_prefetchable = (*next_base + align_p) & !align_p;
                        size_prefetchable = prefetchable.size;
                        *next_base = base_prefetchable + size_prefetchable;
                    }
                    Pool::NonPci => {
                        base_non_pci = (*next_base + align_non_pci) & !align_non_pci;
                        *next_base = base_non_pci + size_non_pci;
                    }
                }
            }
            if size_non_prefetchable == 0 {
                base_non_prefetchable = 0;
            }
            if size_prefetchable == 0 {
                base_prefetchable = 0;
            }

            if *next_base > limit {
                enough_space = false;
                log::info!("insufficient space for MMIO above 4G");
            }

            if enough_space {
                if let Some((access, layout)) = commit.as_mut() {
                    log::info!("---Socket{socket:X} RootBridge{rb:X}---");
                    log::info!(
                        "request above 4G: prefetchable size 0x{:X} align 0x{:X}, non-prefetchable size 0x{:X} align 0x{:X}",
                        prefetchable.size,
                        prefetchable.align_mask,
                        non_prefetchable.size,
                        non_prefetchable.align_mask
                    );
                    set_mmio_pair(
                        *access,
                        socket_count,
                        mmio_pair(socket, rb) + 1,
                        ctx.topo.fabric_id(socket, rb),
                        slice_base,
                        *next_base - slice_base,
                    );
                    layout.has_above_4g[socket][rb] = true;
                    layout.above_4g[socket][rb] = MmioRegion {
                        base_non_pci,
                        size_non_pci,
                        base_prefetchable,
                        size_prefetchable,
                        base_non_prefetchable,
                        size_non_prefetchable,
                        align_non_prefetchable: non_prefetchable.align_mask,
                        align_prefetchable: prefetchable.align_mask,
                        align_non_pci,
                        ..Default::default()
                    };
                }
            }
        }
    }

    enough_space
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> PlatformBounds {
        PlatformBounds {
            tom: 0x8000_0000,
            tom2: 0x1_0000_0000,
            pci_cfg_size: 0x1000_0000,
            phys_addr_bits: 40,
            phys_addr_reduction: 0,
        }
    }

    #[test]
    fn window_starts_at_4g_and_stops_below_the_hole() {
        let cfg = RcMgrConfig::default();
        let window = above_4g_window(&cfg, &bounds(), true);
        assert_eq!(window.base, 0x1_0000_0000);
        assert_eq!(window.limit, MMIO_HOLE_BASE);
    }

    #[test]
    fn policy_ceiling_clamps_the_limit() {
        let cfg = RcMgrConfig {
            mmio_above_4g_limit: 0x7F_FFFF_FFFF,
            ..RcMgrConfig::default()
        };
        let window = above_4g_window(&cfg, &bounds(), true);
        assert_eq!(window.limit, 0x80_0000_0000);
    }

    #[test]
    fn ceiling_below_the_base_collapses_the_window() {
        let cfg = RcMgrConfig {
            mmio_above_4g_limit: 0xFFFF_FFFF,
            ..RcMgrConfig::default()
        };
        let window = above_4g_window(&cfg, &bounds(), true);
        assert_eq!(window.limit, 0);
    }

    #[test]
    fn pcie_window_above_4g_keeps_the_larger_side() {
        let cfg = RcMgrConfig {
            pci_express_base: 0x2_0000_0000,
            ..RcMgrConfig::default()
        };
        let window = above_4g_window(&cfg, &bounds(), true);
        // The space above the configuration window dwarfs the space below.
        assert_eq!(window.base, 0x2_1000_0000);
        assert_eq!(window.limit, MMIO_HOLE_BASE);
    }
}
