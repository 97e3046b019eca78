//! Demand-driven below-4G planner.
//!
//! The PCIe configuration window splits the below-4G MMIO into a side above
//! it and a side below it. For every possible count of bridges on the below
//! side, the planner enumerates the placements with that count, checks each
//! for fit without touching any state, and commits the first one that fits.
//! The winning placement is persisted so the next boot converges to the same
//! map, and the stored placement is always tried first.

use crate::above4g::{above_4g_window, arrange_above_4g};
use crate::bounds::PlatformBounds;
use crate::combination::PlacementVector;
use crate::commit::{mmio_pair, set_mmio_pair};
use crate::config::RcMgrConfig;
use crate::demand::{
    BOTTOM_OF_COMPAT, DemandTable, MMIO_MIN_SIZE, NON_PCI_MMIO_ALIGN_MASK, POSTED_REGION_BASE,
    POSTED_REGION_END,
};
use crate::error::RcError;
use crate::layout::{MmioLayout, MmioRegion};
use crate::manager::{PlacementStore, SpaceStatus};
use fabric_registers::FabricRegisterAccess;
use fabric_topology::{MAX_HOST_BRIDGES, MAX_RBS_PER_SOCKET, MAX_SOCKETS, Topology};

/// Everything the planners read but never write.
pub(crate) struct PlanCtx<'a, T> {
    pub cfg: &'a RcMgrConfig,
    pub bounds: &'a PlatformBounds,
    pub demand: &'a DemandTable,
    pub topo: &'a T,
}

/// Best shortfall seen across failed fit checks, for sizing advice.
pub(crate) struct FitReport {
    oversize_below_min: u64,
    align_mask: u64,
}

impl FitReport {
    const UNKNOWN: u64 = 0xFFFF_FFFF;

    fn new() -> Self {
        Self { oversize_below_min: Self::UNKNOWN, align_mask: 0 }
    }

    fn missing(&self) -> u64 {
        if self.oversize_below_min == Self::UNKNOWN {
            0
        } else {
            (self.oversize_below_min + self.align_mask) & !self.align_mask
        }
    }
}

/// Plans and (optionally) commits the whole MMIO map from the demand table.
///
/// With `set_registers` unset this is a pure feasibility pass that only
/// fills `status`.
#[allow(clippy::too_many_lines)]
pub(crate) fn init_mmio_from_demands<A, T, S>(
    ctx: &PlanCtx<'_, T>,
    access: &mut A,
    layout: &mut MmioLayout,
    store: &mut S,
    mut status: Option<&mut SpaceStatus>,
    set_registers: bool,
) -> Result<(), RcError>
where
    A: FabricRegisterAccess,
    T: Topology,
    S: PlacementStore,
{
    let cfg = ctx.cfg;
    let bounds = ctx.bounds;
    let mut report = FitReport::new();

    log::info!(
        "TOM: 0x{:X}, TOM2: 0x{:X}, PCIe configuration space: 0x{:X} ~ 0x{:X}",
        bounds.tom,
        bounds.tom2,
        cfg.pci_express_base,
        cfg.pci_express_base + bounds.pci_cfg_size
    );
    if cfg.pci_express_base < 0x1_0000_0000 {
        debug_assert!(
            cfg.bottom_mmio_reserved_for_primary_rb
                >= cfg.pci_express_base + bounds.pci_cfg_size
        );
        debug_assert!(cfg.pci_express_base >= bounds.tom);
    }

    // Above 4G first; nothing below 4G can compensate for a shortfall there.
    let window = above_4g_window(cfg, bounds, true);
    let mut next_base = window.base;
    let enough_above_4g = if set_registers {
        arrange_above_4g(
            ctx,
            status.as_deref_mut(),
            &mut next_base,
            window.limit,
            Some((&mut *access, &mut *layout)),
        )
    } else {
        arrange_above_4g::<A, T>(ctx, status.as_deref_mut(), &mut next_base, window.limit, None)
    };
    if !enough_above_4g {
        return Err(RcError::OutOfResources {
            size: next_base.saturating_sub(window.limit),
        });
    }

    // Side windows below 4G.
    let base_above = if cfg.pci_express_base >= 0x1_0000_0000 {
        cfg.bottom_mmio_reserved_for_primary_rb
    } else {
        cfg.pci_express_base + bounds.pci_cfg_size
    };
    let base_below = bounds.tom;
    let limit_above = cfg.bottom_mmio_reserved_for_primary_rb;

    let primary = ctx.topo.primary();
    let primary_demand = ctx.demand.prefetchable_below_4g[primary.socket()]
        [primary.root_bridge()]
    .size
        + ctx.demand.non_prefetchable_below_4g[primary.socket()][primary.root_bridge()].size
        + cfg.mmio_size_per_rb_for_non_pci;
    let mut primary_fits_above = primary_demand <= limit_above.saturating_sub(base_above);

    let mut stored_placement_works = false;
    if let Some(flags) = store.load() {
        let vector = PlacementVector::from_flags(ctx.topo.host_bridge_count(), flags);
        let fits = if set_registers {
            try_combination(
                ctx,
                &vector,
                base_above,
                base_below,
                Some((&mut *access, &mut *layout)),
                &mut report,
            )
        } else {
            try_combination::<A, T>(ctx, &vector, base_above, base_below, None, &mut report)
        };
        if fits {
            log::info!("use combination of root-bridge resources from the store");
            stored_placement_works = true;
        }
    }

    let mut result = Ok(());
    if !stored_placement_works {
        let outcome = arrange_below_4g(
            ctx,
            base_above,
            base_below,
            access,
            layout,
            set_registers,
            &mut report,
            primary_fits_above,
        );
        match outcome {
            Some(vector) => {
                log::info!("save combination to the store");
                store.save(&vector.flags());
            }
            None if primary_fits_above => {
                // The primary may fit on the other side even though nothing
                // worked with it pinned above.
                primary_fits_above = false;
                let retry = arrange_below_4g(
                    ctx,
                    base_above,
                    base_below,
                    access,
                    layout,
                    set_registers,
                    &mut report,
                    primary_fits_above,
                );
                if let Some(vector) = retry {
                    log::info!("save combination to the store");
                    store.save(&vector.flags());
                } else {
                    log::warn!("not enough resources below 4G");
                    result = Err(RcError::OutOfResources { size: report.missing() });
                }
            }
            None => {
                log::warn!("not enough resources below 4G");
                result = Err(RcError::OutOfResources { size: report.missing() });
            }
        }
    }

    if let Some(status) = status {
        status.mmio_size_above_4g_req_inc = next_base.saturating_sub(window.limit);
        status.mmio_size_below_4g_req_inc = report.missing();
        log::info!(
            "space status: MmioSizeAbove4G 0x{:X}, req inc 0x{:X}",
            status.mmio_size_above_4g,
            status.mmio_size_above_4g_req_inc
        );
        log::info!(
            "space status: MmioSizeBelow4G 0x{:X}, req inc 0x{:X}",
            status.mmio_size_below_4g,
            status.mmio_size_below_4g_req_inc
        );
    }

    result
}

/// Searches placements with 0, 1, ... below-side bridges and commits the
/// first that fits, returning it.
#[allow(clippy::too_many_arguments)]
fn arrange_below_4g<A: FabricRegisterAccess, T: Topology>(
    ctx: &PlanCtx<'_, T>,
    base_above: u64,
    base_below: u64,
    access: &mut A,
    layout: &mut MmioLayout,
    set_registers: bool,
    report: &mut FitReport,
    primary_fits_above: bool,
) -> Option<PlacementVector> {
    let n = ctx.topo.host_bridge_count();
    let primary = ctx.topo.primary();
    let primary_index = primary.socket() * ctx.topo.rbs_per_socket() + primary.root_bridge();

    let mut found = None;
    'search: for below_count in 0..=n {
        let mut vector = PlacementVector::with_trailing_below(n, below_count);
        loop {
            // Keep the primary on the side it is known to fit on.
            if vector.is_above(primary_index) == primary_fits_above
                && try_combination::<A, T>(ctx, &vector, base_above, base_below, None, report)
            {
                found = Some(vector);
                break 'search;
            }
            match vector.next_combination() {
                Some(next) => vector = next,
                None => break,
            }
        }
        if ctx.cfg.pci_express_base == base_below {
            // No space below the configuration window at all.
            break;
        }
    }

    let vector = found?;
    if set_registers {
        try_combination(
            ctx,
            &vector,
            base_above,
            base_below,
            Some((access, layout)),
            report,
        );
    } else {
        try_combination::<A, T>(ctx, &vector, base_above, base_below, None, report);
    }
    Some(vector)
}

/// Checks whether one placement fits and, when `commit` is given, programs
/// the registers and fills the layout for it.
///
/// Bridges are laid out from the highest dense index down, the primary
/// always last so it ends up on top of its side and can absorb the rest of
/// that side up to its limit.
#[allow(clippy::too_many_lines, clippy::similar_names)]
fn try_combination<A: FabricRegisterAccess, T: Topology>(
    ctx: &PlanCtx<'_, T>,
    placement: &PlacementVector,
    mut base_above: u64,
    mut base_below: u64,
    mut commit: Option<(&mut A, &mut MmioLayout)>,
    report: &mut FitReport,
) -> bool {
    let cfg = ctx.cfg;
    let socket_count = ctx.topo.socket_count();
    let rbs_per_socket = ctx.topo.rbs_per_socket();
    let n = socket_count * rbs_per_socket;
    let primary = ctx.topo.primary();

    let limit_above = cfg.bottom_mmio_reserved_for_primary_rb;
    let limit_below = cfg.pci_express_base;
    let has_space_below = limit_below > base_below;

    let size_non_pci = cfg.mmio_size_per_rb_for_non_pci;
    let align_non_pci = NON_PCI_MMIO_ALIGN_MASK;

    let mut big_align_first_above = true;
    let mut big_align_first_below = true;
    let mut align_first_above = None;
    let mut align_first_below = None;
    let mut oversize = false;
    let mut primary_non_pci_at_second = false;
    let mut reserved_region_set = false;

    for i in 0..=n {
        let (socket, rb) = if i == n {
            // Last pass: the primary root bridge.
            (primary.socket(), primary.root_bridge())
        } else {
            let k = n - i - 1;
            let (socket, rb) = (k / rbs_per_socket, k % rbs_per_socket);
            if primary.is(socket, rb) {
                continue;
            }
            (socket, rb)
        };

        let prefetchable = ctx.demand.prefetchable_below_4g[socket][rb];
        let non_prefetchable = ctx.demand.non_prefetchable_below_4g[socket][rb];
        if prefetchable.size + non_prefetchable.size + size_non_pci == 0 {
            continue;
        }

        let align = non_prefetchable.align_mask;
        let align_p = prefetchable.align_mask;
        let above = placement.is_above(socket * rbs_per_socket + rb);

        let (big_align, slice_base) = if above {
            let big = big_align_first_above;
            big_align_first_above = !big_align_first_above;
            if align_first_above.is_none() {
                // First region on this side; its alignment scales shortfall
                // advice.
                align_first_above = Some(align.max(align_p));
            }
            (big, base_above)
        } else {
            let big = big_align_first_below;
            big_align_first_below = !big_align_first_below;
            if align_first_below.is_none() {
                align_first_below = Some(align.max(align_p));
            }
            (big, base_below)
        };

        let mut base_prefetchable;
        let mut base_non_prefetchable;
        let base_non_pci;
        let size_prefetchable;
        let size_non_prefetchable;
        let ceiling;
        // How much this slice shrinks if the non-PCI pool moves to the
        // primary's second region.
        let delta_size;
        if big_align {
            if align_p >= align {
                // Prefetchable, non-prefetchable, non-PCI.
                base_prefetchable = (slice_base + align_p) & !align_p;
                base_non_prefetchable =
                    (base_prefetchable + prefetchable.size + align) & !align;
                base_non_pci = (base_non_prefetchable + non_prefetchable.size + align_non_pci)
                    & !align_non_pci;
                size_prefetchable = base_non_prefetchable - base_prefetchable;
                size_non_prefetchable = base_non_pci - base_non_prefetchable;
                ceiling = base_non_pci + size_non_pci;
                delta_size =
                    base_non_pci - base_non_prefetchable - non_prefetchable.size + size_non_pci;
            } else {
                // Non-prefetchable, prefetchable, non-PCI.
                base_non_prefetchable = (slice_base + align) & !align;
                base_prefetchable =
                    (base_non_prefetchable + non_prefetchable.size + align_p) & !align_p;
                base_non_pci =
                    (base_prefetchable + prefetchable.size + align_non_pci) & !align_non_pci;
                size_non_prefetchable = base_prefetchable - base_non_prefetchable;
                size_prefetchable = base_non_pci - base_prefetchable;
                ceiling = base_non_pci + size_non_pci;
                delta_size = base_non_pci - base_prefetchable - prefetchable.size + size_non_pci;
            }
        } else if align_p <= align {
            // Non-PCI, prefetchable, non-prefetchable.
            base_non_pci = (slice_base + align_non_pci) & !align_non_pci;
            base_prefetchable = (base_non_pci + size_non_pci + align_p) & !align_p;
            base_non_prefetchable = (base_prefetchable + prefetchable.size + align) & !align;
            size_prefetchable = base_non_prefetchable - base_prefetchable;
            size_non_prefetchable = non_prefetchable.size;
            ceiling = base_non_prefetchable + size_non_prefetchable;
            delta_size = base_prefetchable - ((slice_base + align_p) & !align_p);
        } else {
            // Non-PCI, non-prefetchable, prefetchable.
            base_non_pci = (slice_base + align_non_pci) & !align_non_pci;
            base_non_prefetchable = (base_non_pci + size_non_pci + align) & !align;
            base_prefetchable =
                (base_non_prefetchable + non_prefetchable.size + align_p) & !align_p;
            size_non_prefetchable = base_prefetchable - base_non_prefetchable;
            size_prefetchable = prefetchable.size;
            ceiling = base_prefetchable + size_prefetchable;
            delta_size = base_non_prefetchable - ((slice_base + align) & !align);
        }

        if size_non_prefetchable == 0 {
            base_non_prefetchable = 0;
        }
        if size_prefetchable == 0 {
            base_prefetchable = 0;
        }

        let mut ceiling = ceiling;
        if above {
            base_above = ceiling;
            if base_above > limit_above {
                oversize = true;
            }
        } else {
            base_below = ceiling;
            if base_below > limit_below {
                oversize = true;
            }
        }

        // Oversized with the primary's slice: see whether moving its non-PCI
        // pool to a second region (always at the top of that region) frees
        // enough.
        if oversize && primary.is(socket, rb) && n < MAX_HOST_BRIDGES {
            if above {
                if base_above - delta_size <= limit_above
                    && base_below <= (limit_below - size_non_pci) & !align_non_pci
                {
                    oversize = false;
                    primary_non_pci_at_second = true;
                    base_above -= delta_size;
                    ceiling -= delta_size;
                }
            } else if base_below - delta_size <= limit_below
                && base_above <= (limit_above - size_non_pci) & !align_non_pci
            {
                oversize = false;
                primary_non_pci_at_second = true;
                base_below -= delta_size;
                ceiling -= delta_size;
            }

            // With the non-PCI pool gone from the low end, everything above
            // it slides down.
            if primary_non_pci_at_second && !big_align {
                base_non_prefetchable = base_non_prefetchable.saturating_sub(delta_size);
                base_prefetchable = base_prefetchable.saturating_sub(delta_size);
            }
        }

        if !oversize {
            if let Some((access, layout)) = commit.as_mut() {
                log::info!("---Socket{socket:X} RootBridge{rb:X}---");
                log::info!(
                    "request below 4G: prefetchable size 0x{:X} align 0x{:X}, non-prefetchable size 0x{:X} align 0x{:X}",
                    prefetchable.size,
                    prefetchable.align_mask,
                    non_prefetchable.size,
                    non_prefetchable.align_mask
                );
                debug_assert!(BOTTOM_OF_COMPAT >= cfg.bottom_mmio_reserved_for_primary_rb);

                let pair = mmio_pair(socket, rb);
                let fabric_id = ctx.topo.fabric_id(socket, rb);
                if primary.is(socket, rb) {
                    if above {
                        // The primary's slice swallows everything up to the
                        // compat area, reserved region included.
                        set_mmio_pair(
                            *access,
                            socket_count,
                            pair,
                            fabric_id,
                            slice_base,
                            BOTTOM_OF_COMPAT - slice_base,
                        );
                        base_above = BOTTOM_OF_COMPAT;
                        reserved_region_set = true;
                    } else {
                        set_mmio_pair(
                            *access,
                            socket_count,
                            pair,
                            fabric_id,
                            slice_base,
                            limit_below - slice_base,
                        );
                        base_below = limit_below;
                    }
                } else {
                    set_mmio_pair(
                        *access,
                        socket_count,
                        pair,
                        fabric_id,
                        slice_base,
                        ceiling - slice_base,
                    );
                }

                layout.has_below_4g[socket][rb] = true;
                let (base_non_pci, size_non_pci) =
                    if primary.is(socket, rb) && primary_non_pci_at_second {
                        log::info!(
                            "non-PCI MMIO of the primary root bridge moved to its second region"
                        );
                        (0, 0)
                    } else {
                        (base_non_pci, size_non_pci)
                    };
                layout.below_4g[socket][rb] = MmioRegion {
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

    // Feasibility mode records the smallest shortfall seen, preferring a
    // below-side number since hosts fix shortfalls by moving TOM.
    if commit.is_none() {
        if oversize {
            let over_above = base_above.saturating_sub(limit_above);
            let over_below = base_below.saturating_sub(limit_below);
            if over_above == 0 {
                if over_below < report.oversize_below_min {
                    report.oversize_below_min = over_below;
                    report.align_mask = align_first_below.unwrap_or(0);
                }
            } else if !has_space_below {
                report.oversize_below_min = over_above;
                report.align_mask = align_first_above.unwrap_or(0);
            }
        } else {
            report.oversize_below_min = 0;
        }
    }

    if !oversize {
        if let Some((access, layout)) = commit {
            commit_primary_second_region(
                ctx,
                access,
                layout,
                base_above,
                base_below,
                primary_non_pci_at_second,
                &mut reserved_region_set,
            );
            additional_mmio_setting(
                ctx.topo,
                access,
                layout,
                BOTTOM_OF_COMPAT,
                reserved_region_set,
            );
        }
    }

    !oversize
}

/// Gives the primary root bridge the leftover side of the window as a second
/// region over a spare register pair, when demands (or a relocated non-PCI
/// pool) call for one.
#[allow(clippy::too_many_lines)]
fn commit_primary_second_region<A: FabricRegisterAccess, T: Topology>(
    ctx: &PlanCtx<'_, T>,
    access: &mut A,
    layout: &mut MmioLayout,
    base_above: u64,
    base_below: u64,
    primary_non_pci_at_second: bool,
    reserved_region_set: &mut bool,
) {
    let cfg = ctx.cfg;
    let socket_count = ctx.topo.socket_count();
    let rbs_per_socket = ctx.topo.rbs_per_socket();
    let primary = ctx.topo.primary();
    let limit_above = cfg.bottom_mmio_reserved_for_primary_rb;
    let limit_below = cfg.pci_express_base;

    if base_above + MMIO_MIN_SIZE > limit_above && base_below + MMIO_MIN_SIZE > limit_below {
        return;
    }
    let second_prefetchable = ctx.demand.primary_second_prefetchable;
    let second_non_prefetchable = ctx.demand.primary_second_non_prefetchable;
    if second_prefetchable.size == 0
        && second_non_prefetchable.size == 0
        && !primary_non_pci_at_second
    {
        return;
    }
    if socket_count * rbs_per_socket >= MAX_HOST_BRIDGES {
        return;
    }

    for i in 0..MAX_SOCKETS {
        for j in 0..MAX_RBS_PER_SOCKET {
            if layout.has_below_4g[i][j] {
                continue;
            }
            log::info!("primary root bridge has a second MMIO region below 4G");
            layout.primary_second_pair = Some((i, j));
            let pair = mmio_pair(i, j);
            let fabric_id = ctx.topo.fabric_id(primary.socket(), primary.root_bridge());

            let (base, mut second_size) = if base_above < limit_above {
                set_mmio_pair(
                    access,
                    socket_count,
                    pair,
                    fabric_id,
                    base_above,
                    BOTTOM_OF_COMPAT - base_above,
                );
                *reserved_region_set = true;
                (base_above, limit_above - base_above)
            } else {
                set_mmio_pair(
                    access,
                    socket_count,
                    pair,
                    fabric_id,
                    base_below,
                    limit_below - base_below,
                );
                (base_below, limit_below - base_below)
            };

            let region = &mut layout.below_4g[i][j];
            if primary_non_pci_at_second {
                // The relocated non-PCI pool sits at the top of the region.
                region.base_non_pci = (base + second_size - cfg.mmio_size_per_rb_for_non_pci)
                    & !NON_PCI_MMIO_ALIGN_MASK;
                region.size_non_pci = cfg.mmio_size_per_rb_for_non_pci;
                second_size = region.base_non_pci - base;
            } else {
                region.base_non_pci = 0;
                region.size_non_pci = 0;
            }

            // Split what is left by the ratio of the second-region demands.
            let (mut size_prefetchable, mut size_non_prefetchable) =
                if second_non_prefetchable.size == 0 {
                    (second_size, 0)
                } else if second_prefetchable.size == 0 {
                    (0, second_size)
                } else {
                    let prefetchable = (second_size
                        / (second_prefetchable.size + second_non_prefetchable.size))
                        * second_prefetchable.size;
                    (prefetchable, second_size - prefetchable)
                };

            let mut base_prefetchable = if size_prefetchable == 0 {
                base
            } else {
                (base + second_prefetchable.align_mask) & !second_prefetchable.align_mask
            };
            let mut base_non_prefetchable;
            if size_non_prefetchable == 0 {
                base_non_prefetchable = base_prefetchable + size_prefetchable;
            } else {
                base_non_prefetchable = (base_prefetchable
                    + size_prefetchable
                    + second_non_prefetchable.align_mask)
                    & !second_non_prefetchable.align_mask;
                size_non_prefetchable = base + second_size - base_non_prefetchable;
            }
            if size_non_prefetchable == 0 {
                base_non_prefetchable = 0;
            }
            if size_prefetchable == 0 {
                base_prefetchable = 0;
            }

            region.base_prefetchable = base_prefetchable;
            region.size_prefetchable = size_prefetchable;
            region.base_non_prefetchable = base_non_prefetchable;
            region.size_non_prefetchable = size_non_prefetchable;
            region.used_prefetchable = 0;
            region.used_non_prefetchable = 0;
            region.used_non_pci = 0;
            region.align_prefetchable = second_prefetchable.align_mask;
            region.align_non_prefetchable = second_non_prefetchable.align_mask;
            return;
        }
    }
}

/// Routes the fixed posted-write region at 0xFED0_0000 to the primary over a
/// spare register pair, unless the primary's reserved region already covers
/// it.
pub(crate) fn additional_mmio_setting<A: FabricRegisterAccess, T: Topology>(
    topo: &T,
    access: &mut A,
    layout: &MmioLayout,
    bottom_of_compat: u64,
    reserved_region_set: bool,
) {
    let base = POSTED_REGION_BASE;
    let size = POSTED_REGION_END - POSTED_REGION_BASE + 1;

    if reserved_region_set && bottom_of_compat > POSTED_REGION_END {
        return;
    }
    if size < MMIO_MIN_SIZE {
        return;
    }

    let socket_count = topo.socket_count();
    let primary = topo.primary();
    let fabric_id = topo.fabric_id(primary.socket(), primary.root_bridge());

    for i in 0..MAX_SOCKETS {
        for j in 0..MAX_RBS_PER_SOCKET {
            if !layout.has_below_4g[i][j] {
                if layout.primary_second_pair == Some((i, j)) {
                    continue;
                }
                set_mmio_pair(access, socket_count, mmio_pair(i, j), fabric_id, base, size);
                return;
            }
            if !layout.has_above_4g[i][j] {
                set_mmio_pair(access, socket_count, mmio_pair(i, j) + 1, fabric_id, base, size);
                return;
            }
        }
    }
}
