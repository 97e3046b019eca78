//! Even MMIO distribution, used when no demand table is available.
//!
//! Every bridge receives the same 16 MiB-aligned share of the usable below-4G
//! space, the primary always on top of its side so the reserved region under
//! the compat area attaches to it. A side of the PCIe configuration window
//! that is under 80% of a fair share is skipped and handed to the primary as
//! a second region instead. Above 4G the window is split evenly as well.

use crate::above4g::above_4g_window;
use crate::commit::{mmio_pair, set_mmio_pair};
use crate::demand::{
    BOTTOM_OF_COMPAT, MMIO_MIN_NON_PCI_SIZE_ABOVE_4G, NON_PCI_MMIO_ALIGN_MASK,
    NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G, SIZE_16M_MASK,
};
use crate::error::RcError;
use crate::layout::{MmioLayout, MmioRegion};
use crate::planner::{PlanCtx, additional_mmio_setting};
use fabric_registers::FabricRegisterAccess;
use fabric_topology::{MAX_HOST_BRIDGES, MAX_RBS_PER_SOCKET, MAX_SOCKETS, Topology};

/// Splits one below-4G slice into prefetchable, non-prefetchable and non-PCI
/// pools, 80/20 between the first two, the non-PCI pool at the aligned top.
fn split_below_slice(base: u64, size: u64, size_non_pci: u64) -> MmioRegion {
    let size_prefetchable = ((size - size_non_pci) * 4 / 5) & SIZE_16M_MASK;
    let base_prefetchable = base;
    let base_non_prefetchable = base_prefetchable + size_prefetchable;
    let base_non_pci = (base + size - size_non_pci) & !NON_PCI_MMIO_ALIGN_MASK;
    MmioRegion {
        base_prefetchable,
        size_prefetchable,
        base_non_prefetchable,
        size_non_prefetchable: base_non_pci - base_non_prefetchable,
        base_non_pci,
        size_non_pci,
        align_non_pci: NON_PCI_MMIO_ALIGN_MASK,
        ..Default::default()
    }
}

/// Distributes MMIO evenly across all root bridges and programs the map.
#[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
pub(crate) fn init_mmio_equally<A: FabricRegisterAccess, T: Topology>(
    ctx: &PlanCtx<'_, T>,
    access: &mut A,
    layout: &mut MmioLayout,
) -> Result<(), RcError> {
    let cfg = ctx.cfg;
    let bounds = ctx.bounds;
    let socket_count = ctx.topo.socket_count();
    let rbs_per_socket = ctx.topo.rbs_per_socket();
    let n = socket_count * rbs_per_socket;
    let primary = ctx.topo.primary();
    let mut reserved_region_set = false;

    log::info!(
        "TOM: 0x{:X}, TOM2: 0x{:X}, PCIe configuration space: 0x{:X} ~ 0x{:X}",
        bounds.tom,
        bounds.tom2,
        cfg.pci_express_base,
        cfg.pci_express_base + bounds.pci_cfg_size
    );

    if cfg.pci_express_base < 0x1_0000_0000 {
        if cfg.bottom_mmio_reserved_for_primary_rb < cfg.pci_express_base + bounds.pci_cfg_size {
            log::error!(
                "reserved bottom 0x{:X} is below the PCIe configuration window end 0x{:X}",
                cfg.bottom_mmio_reserved_for_primary_rb,
                cfg.pci_express_base + bounds.pci_cfg_size
            );
            return Err(RcError::Aborted);
        }
        if cfg.pci_express_base < bounds.tom {
            log::error!(
                "PCIe base 0x{:X} is below TOM 0x{:X}",
                cfg.pci_express_base,
                bounds.tom
            );
            return Err(RcError::Aborted);
        }
    }
    if BOTTOM_OF_COMPAT < cfg.bottom_mmio_reserved_for_primary_rb {
        log::error!(
            "reserved bottom 0x{:X} is above the compat area",
            cfg.bottom_mmio_reserved_for_primary_rb
        );
        return Err(RcError::Aborted);
    }

    let (size_above, size_below) = if cfg.pci_express_base >= 0x1_0000_0000 {
        (0, cfg.bottom_mmio_reserved_for_primary_rb - bounds.tom)
    } else {
        (
            cfg.bottom_mmio_reserved_for_primary_rb - cfg.pci_express_base - bounds.pci_cfg_size,
            cfg.pci_express_base - bounds.tom,
        )
    };
    let mut total = size_above + size_below;

    let mut above_too_small = false;
    let mut below_too_small = false;
    if n > 1 {
        // A side worth less than 80% of a fair share is not worth splitting.
        if size_above < (size_below / n as u64) * 8 / 10 {
            above_too_small = true;
            total -= size_above;
            log::warn!("space above the PCIe configuration window is too small");
        }
        if size_below < (size_above / n as u64) * 8 / 10 {
            below_too_small = true;
            total -= size_below;
            log::warn!("space below the PCIe configuration window is too small");
        }
        if total == 0 {
            log::error!("total available MMIO size is 0");
            return Err(RcError::OutOfResources { size: 0 });
        }
    }
    let mut share = total / n as u64;
    let mut share_aligned = share & SIZE_16M_MASK;
    if above_too_small && below_too_small {
        log::error!("insufficient MMIO below and above the PCIe configuration window");
        return Err(RcError::OutOfResources { size: 0 });
    }
    if share == 0 {
        return Err(RcError::OutOfResources { size: 0 });
    }

    // How many bridges land above the configuration window.
    let mut bridges_above;
    let mut remained;
    let mut base;
    if above_too_small {
        bridges_above = 0usize;
        remained = size_below - share_aligned * (n as u64 - 1);
        base = if cfg.pci_express_base >= 0x1_0000_0000 {
            cfg.bottom_mmio_reserved_for_primary_rb
        } else {
            cfg.pci_express_base
        };
    } else {
        bridges_above = (size_above / share) as usize;
        if size_above - share * bridges_above as u64 > share / 2 {
            bridges_above += 1;
        }
        // A single-bridge system always takes the space above the window.
        bridges_above = bridges_above.max(1);
        share = size_above / bridges_above as u64;
        share_aligned = share & SIZE_16M_MASK;
        remained = size_above - share_aligned * (bridges_above as u64 - 1);
        base = cfg.bottom_mmio_reserved_for_primary_rb;
    }
    let bridges_above_initial = bridges_above;

    // The primary first; it always sits on top of its side.
    let (ps, pr) = (primary.socket(), primary.root_bridge());
    layout.has_below_4g[ps][pr] = true;
    if bridges_above != 0 {
        base -= remained;
        bridges_above -= 1;
    } else if !below_too_small {
        base -= remained;
    } else {
        log::error!("insufficient MMIO for the primary root bridge");
        return Err(RcError::OutOfResources { size: 0 });
    }

    let primary_fabric_id = ctx.topo.fabric_id(ps, pr);
    if above_too_small {
        set_mmio_pair(
            access,
            socket_count,
            mmio_pair(ps, pr),
            primary_fabric_id,
            base,
            remained,
        );
    } else {
        // The reserved region under the compat area rides along.
        set_mmio_pair(
            access,
            socket_count,
            mmio_pair(ps, pr),
            primary_fabric_id,
            base,
            remained + BOTTOM_OF_COMPAT - cfg.bottom_mmio_reserved_for_primary_rb,
        );
        reserved_region_set = true;
    }
    layout.below_4g[ps][pr] = split_below_slice(base, remained, cfg.mmio_size_per_rb_for_non_pci);

    // The rest, walking down from the primary's base.
    let mut initialized = 1usize;
    for i in 0..socket_count {
        for j in 0..rbs_per_socket {
            if primary.is(i, j) {
                continue;
            }
            layout.has_below_4g[i][j] = true;
            if bridges_above != 0 {
                if initialized == 1 {
                    remained = share_aligned;
                }
                base -= remained;
                bridges_above -= 1;
            } else if !below_too_small {
                if bridges_above_initial == initialized {
                    // First bridge below the window; re-share what is left.
                    share = size_below / (n - initialized) as u64;
                    share_aligned = share & SIZE_16M_MASK;
                    remained = size_below - share_aligned * (n - initialized - 1) as u64;
                    base = if cfg.pci_express_base >= 0x1_0000_0000 {
                        cfg.bottom_mmio_reserved_for_primary_rb
                    } else {
                        cfg.pci_express_base
                    };
                }
                if initialized == bridges_above_initial + 1 {
                    remained = share_aligned;
                }
                base -= remained;
            } else {
                log::error!("MMIO allocation error");
                return Err(RcError::OutOfResources { size: 0 });
            }

            set_mmio_pair(
                access,
                socket_count,
                mmio_pair(i, j),
                ctx.topo.fabric_id(i, j),
                base,
                remained,
            );
            layout.below_4g[i][j] =
                split_below_slice(base, remained, cfg.mmio_size_per_rb_for_non_pci);
            initialized += 1;
        }
    }

    // A skipped side still goes to the primary as a second region if a spare
    // register pair exists.
    if n < MAX_HOST_BRIDGES
        && ((above_too_small && size_above != 0)
            || (size_below != 0 && (below_too_small || n == 1)))
    {
        'spare: for i in 0..MAX_SOCKETS {
            for j in 0..MAX_RBS_PER_SOCKET {
                if layout.has_below_4g[i][j] {
                    continue;
                }
                log::info!("primary root bridge has a second MMIO region below 4G");
                layout.primary_second_pair = Some((i, j));
                let (second_base, second_size) = if above_too_small {
                    let second_base = cfg.pci_express_base + bounds.pci_cfg_size;
                    set_mmio_pair(
                        access,
                        socket_count,
                        mmio_pair(i, j),
                        primary_fabric_id,
                        second_base,
                        size_above + BOTTOM_OF_COMPAT - cfg.bottom_mmio_reserved_for_primary_rb,
                    );
                    reserved_region_set = true;
                    (second_base, size_above)
                } else {
                    set_mmio_pair(
                        access,
                        socket_count,
                        mmio_pair(i, j),
                        primary_fabric_id,
                        bounds.tom,
                        size_below,
                    );
                    (bounds.tom, size_below)
                };
                layout.below_4g[i][j] = MmioRegion {
                    base_prefetchable: second_base,
                    size_prefetchable: second_size,
                    ..Default::default()
                };
                break 'spare;
            }
        }
    }

    distribute_above_4g_equally(ctx, access, layout);

    additional_mmio_setting(ctx.topo, access, layout, BOTTOM_OF_COMPAT, reserved_region_set);
    Ok(())
}

/// Splits the above-4G window into equal 16 MiB-aligned shares, the last
/// bridge's share stretched to the limit.
fn distribute_above_4g_equally<A: FabricRegisterAccess, T: Topology>(
    ctx: &PlanCtx<'_, T>,
    access: &mut A,
    layout: &mut MmioLayout,
) {
    let cfg = ctx.cfg;
    let socket_count = ctx.topo.socket_count();
    let rbs_per_socket = ctx.topo.rbs_per_socket();
    let n = socket_count * rbs_per_socket;

    let window = above_4g_window(cfg, ctx.bounds, false);
    if window.limit <= window.base {
        return;
    }

    let size = window.limit - window.base;
    let mut share_aligned = (size / n as u64) & SIZE_16M_MASK;
    let remained = size - share_aligned * (n as u64 - 1);
    let mut base = window.base;
    let size_non_pci = cfg
        .above_4g_mmio_size_per_rb_for_non_pci
        .max(MMIO_MIN_NON_PCI_SIZE_ABOVE_4G);

    for i in 0..socket_count {
        for j in 0..rbs_per_socket {
            layout.has_above_4g[i][j] = true;
            let last = i + 1 == socket_count && j + 1 == rbs_per_socket;
            if last {
                share_aligned = remained;
            }
            if share_aligned < MMIO_MIN_NON_PCI_SIZE_ABOVE_4G {
                continue;
            }
            let length = if last {
                // Stretch the last bridge's register limit to the window end.
                window.limit - base
            } else {
                share_aligned
            };
            set_mmio_pair(
                access,
                socket_count,
                mmio_pair(i, j) + 1,
                ctx.topo.fabric_id(i, j),
                base,
                length,
            );

            // Non-PCI at the aligned bottom, then 80/20 for the rest.
            let base_non_pci = (base + NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G)
                & !NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G;
            let base_prefetchable = base_non_pci + size_non_pci;
            let size_prefetchable =
                ((base + share_aligned - base_prefetchable) * 4 / 5) & SIZE_16M_MASK;
            let base_non_prefetchable = base_prefetchable + size_prefetchable;
            layout.above_4g[i][j] = MmioRegion {
                base_non_pci,
                size_non_pci,
                base_prefetchable,
                size_prefetchable,
                base_non_prefetchable,
                size_non_prefetchable: base + share_aligned - base_non_prefetchable,
                align_non_pci: NON_PCI_MMIO_ALIGN_MASK_ABOVE_4G,
                ..Default::default()
            };
            base += share_aligned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::PlatformBounds;
    use crate::config::RcMgrConfig;
    use crate::demand::DemandTable;
    use fabric_registers::{MmioBaseAddress, MmioLimitAddress, ShadowFabric, mmio_base_address, mmio_limit_address};
    use fabric_topology::{ParticipantId, SocRbMap};

    fn single_bridge() -> SocRbMap {
        SocRbMap::new(
            1,
            1,
            [[0x22; 4], [0; 4]],
            [[0; 4]; 2],
            [[0xFF, 0, 0, 0], [0; 4]],
            ParticipantId::new(0, 0).unwrap(),
        )
        .unwrap()
    }

    fn bounds() -> PlatformBounds {
        PlatformBounds {
            tom: 0x8000_0000,
            tom2: 0x1_0000_0000,
            pci_cfg_size: 0x1000_0000,
            phys_addr_bits: 40,
            phys_addr_reduction: 0,
        }
    }

    fn cfg() -> RcMgrConfig {
        RcMgrConfig {
            pci_express_base: 0x8000_0000,
            ..RcMgrConfig::default()
        }
    }

    #[test]
    fn single_bridge_takes_the_whole_side_above_the_window() {
        let topo = single_bridge();
        let cfg = cfg();
        let bounds = bounds();
        let demand = DemandTable::default();
        let ctx = PlanCtx { cfg: &cfg, bounds: &bounds, demand: &demand, topo: &topo };
        let mut shadow = ShadowFabric::new();
        let mut layout = MmioLayout::default();

        init_mmio_equally(&ctx, &mut shadow, &mut layout).unwrap();

        // 0x9000_0000 ~ 0xFE00_0000, registered through the compat bottom.
        let region = layout.below_4g[0][0];
        assert!(layout.has_below_4g[0][0]);
        assert_eq!(region.base_prefetchable, 0x9000_0000);
        assert_eq!(region.size_prefetchable, 0x5700_0000);
        assert_eq!(region.base_non_prefetchable, 0xE700_0000);
        assert_eq!(region.size_non_prefetchable, 0x1600_0000);
        assert_eq!(region.base_non_pci, 0xFD00_0000);
        assert_eq!(region.size_non_pci, 0x100_0000);

        let base = MmioBaseAddress::from_bits(shadow.read(0, mmio_base_address(0)));
        let limit = MmioLimitAddress::from_bits(shadow.read(0, mmio_limit_address(0)));
        assert_eq!(base.address(), 0x9000_0000);
        assert_eq!(limit.address(), BOTTOM_OF_COMPAT - 1);
    }

    #[test]
    fn single_bridge_gets_the_below_side_as_a_second_region() {
        let topo = single_bridge();
        let cfg = RcMgrConfig {
            pci_express_base: 0xA000_0000,
            ..RcMgrConfig::default()
        };
        let bounds = bounds();
        let demand = DemandTable::default();
        let ctx = PlanCtx { cfg: &cfg, bounds: &bounds, demand: &demand, topo: &topo };
        let mut shadow = ShadowFabric::new();
        let mut layout = MmioLayout::default();

        init_mmio_equally(&ctx, &mut shadow, &mut layout).unwrap();

        // TOM ~ PCIe base lands on a spare pair, all prefetchable.
        let (i, j) = layout.primary_second_pair.unwrap();
        assert_eq!((i, j), (0, 1));
        let second = layout.below_4g[i][j];
        assert_eq!(second.base_prefetchable, 0x8000_0000);
        assert_eq!(second.size_prefetchable, 0x2000_0000);
        assert_eq!(second.size_non_prefetchable, 0);
        assert_eq!(second.size_non_pci, 0);
    }

    #[test]
    fn two_sockets_split_both_sides_evenly() {
        let topo = SocRbMap::new(
            2,
            1,
            [[0x00; 4], [0x40; 4]],
            [[0; 4], [0x80, 0, 0, 0]],
            [[0x7F, 0, 0, 0], [0xFF, 0, 0, 0]],
            ParticipantId::new(0, 0).unwrap(),
        )
        .unwrap();
        let cfg = RcMgrConfig {
            pci_express_base: 0xB800_0000,
            ..RcMgrConfig::default()
        };
        let bounds = bounds();
        let demand = DemandTable::default();
        let ctx = PlanCtx { cfg: &cfg, bounds: &bounds, demand: &demand, topo: &topo };
        let mut shadow = ShadowFabric::new();
        let mut layout = MmioLayout::default();

        init_mmio_equally(&ctx, &mut shadow, &mut layout).unwrap();

        assert!(layout.has_below_4g[0][0]);
        assert!(layout.has_below_4g[1][0]);
        // Above the window: 0x3600_0000 for one bridge; below: 0x3800_0000.
        // The primary takes the above side (its top is the reserved bottom).
        let primary = layout.below_4g[0][0];
        assert_eq!(primary.base_prefetchable, 0xC800_0000);
        // The other bridge gets the whole below side.
        let other = layout.below_4g[1][0];
        assert_eq!(other.base_prefetchable, 0x8000_0000);
        assert_eq!(
            other.base_non_pci,
            (0x8000_0000u64 + 0x3800_0000 - 0x100_0000) & !NON_PCI_MMIO_ALIGN_MASK
        );
    }

    #[test]
    fn rejects_pcie_base_below_tom() {
        let topo = single_bridge();
        let cfg = RcMgrConfig {
            pci_express_base: 0x4000_0000,
            ..RcMgrConfig::default()
        };
        let bounds = bounds();
        let demand = DemandTable::default();
        let ctx = PlanCtx { cfg: &cfg, bounds: &bounds, demand: &demand, topo: &topo };
        let mut shadow = ShadowFabric::new();
        let mut layout = MmioLayout::default();

        let result = init_mmio_equally(&ctx, &mut shadow, &mut layout);
        assert_eq!(result, Err(RcError::Aborted));
    }
}
