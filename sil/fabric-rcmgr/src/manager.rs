//! The resource manager facade: owns the register access, the committed
//! layouts and the planning entry points.

use crate::bounds::PlatformBounds;
use crate::config::RcMgrConfig;
use crate::demand::{DemandTable, MmioClass};
use crate::equal::init_mmio_equally;
use crate::error::RcError;
use crate::io_space::{init_io_equally, init_io_from_demands};
use crate::layout::{IoLayout, MmioLayout};
use crate::pci_bus::init_pci_bus_from_demands;
use crate::planner::{PlanCtx, init_mmio_from_demands};
use crate::reserve::{FabricTarget, ReservedRegion, reserve_mmio};
use fabric_registers::FabricRegisterAccess;
use fabric_topology::{MAX_HOST_BRIDGES, MAX_RBS_PER_SOCKET, MAX_SOCKETS, Topology};

/// Totals of a feasibility pass over a demand table.
///
/// The `*_req_inc` fields say how much more space each address space would
/// need for the demands to fit; all three being zero means the table fits.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SpaceStatus {
    pub io_size: u32,
    pub io_size_req_inc: u32,
    pub mmio_size_below_4g: u64,
    pub mmio_size_below_4g_req_inc: u64,
    pub mmio_size_above_4g: u64,
    pub mmio_size_above_4g_req_inc: u64,
}

/// Persistence for the below-4G placement vector, so subsequent boots start
/// from the placement that worked last time.
pub trait PlacementStore {
    /// The stored placement, if any.
    fn load(&self) -> Option<[bool; MAX_HOST_BRIDGES]>;

    /// Stores a placement that fit. May be a no-op.
    fn save(&mut self, flags: &[bool; MAX_HOST_BRIDGES]);
}

/// Store that remembers nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullPlacementStore;

impl PlacementStore for NullPlacementStore {
    fn load(&self) -> Option<[bool; MAX_HOST_BRIDGES]> {
        None
    }

    fn save(&mut self, _flags: &[bool; MAX_HOST_BRIDGES]) {}
}

/// Boot-time owner of the fabric address maps.
///
/// Built once over the register access and the topology, it partitions MMIO,
/// port IO and PCI bus numbers across the root bridges and afterwards serves
/// runtime reservations out of the committed layout.
pub struct FabricResourceManager<A, T, S> {
    access: A,
    topo: T,
    store: S,
    cfg: RcMgrConfig,
    bounds: PlatformBounds,
    demand: DemandTable,
    mmio: MmioLayout,
    io: IoLayout,
}

impl<A, T, S> FabricResourceManager<A, T, S>
where
    A: FabricRegisterAccess,
    T: Topology,
    S: PlacementStore,
{
    /// Creates a manager over an unprogrammed fabric.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::InvalidParameter`] if the topology's shape exceeds
    /// the register file, or its primary bridge lies outside the shape.
    pub fn new(
        access: A,
        topo: T,
        store: S,
        cfg: RcMgrConfig,
        bounds: PlatformBounds,
    ) -> Result<Self, RcError> {
        let sockets = topo.socket_count();
        let rbs = topo.rbs_per_socket();
        if sockets == 0 || sockets > MAX_SOCKETS || rbs == 0 || rbs > MAX_RBS_PER_SOCKET {
            return Err(RcError::InvalidParameter);
        }
        let primary = topo.primary();
        if primary.socket() >= sockets || primary.root_bridge() >= rbs {
            return Err(RcError::InvalidParameter);
        }
        Ok(Self {
            access,
            topo,
            store,
            cfg,
            bounds,
            demand: DemandTable::default(),
            mmio: MmioLayout::default(),
            io: IoLayout::default(),
        })
    }

    /// Partitions all three address spaces and programs the registers.
    ///
    /// With a demand table the planner sizes every region from it, falling
    /// back to the even split if the demands cannot be placed; without one
    /// everything is split evenly. Bus numbers are only reassigned from a
    /// demand table, and never while MCTP is routing fixed bus numbers.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::OutOfResources`] or [`RcError::Aborted`] when even
    /// the fallback split cannot be programmed.
    pub fn initialize(&mut self, demand: Option<DemandTable>) -> Result<(), RcError> {
        let from_demands = demand.is_some();
        if let Some(demand) = demand {
            self.demand = demand;
        }
        let Self { access, topo, store, cfg, bounds, demand, mmio, io } = self;
        let ctx = PlanCtx { cfg: &*cfg, bounds: &*bounds, demand: &*demand, topo: &*topo };

        if from_demands {
            log::info!("init MMIO based on the demand table");
            let planned = init_mmio_from_demands(&ctx, access, mmio, store, None, true);
            if let Err(error) = planned {
                log::warn!("init MMIO based on the demand table failed: {error}; init equally");
                *mmio = MmioLayout::default();
                init_mmio_equally(&ctx, access, mmio)?;
            }

            log::info!("init IO based on the demand table");
            init_io_from_demands(&*topo, &*demand, access, io, None, true);

            if cfg.mctp_enable {
                log::info!("MCTP owns fixed bus numbers; keeping the decoded bus ranges");
            } else {
                init_pci_bus_from_demands(&*topo, &*demand, access);
            }
        } else {
            log::info!("init MMIO equally");
            init_mmio_equally(&ctx, access, mmio)?;
            log::info!("init IO equally");
            init_io_equally(&*topo, access, io);
        }
        Ok(())
    }

    /// Checks whether a demand table would fit, without touching registers
    /// or the committed layout.
    #[must_use]
    pub fn probe(&mut self, demand: &DemandTable) -> SpaceStatus {
        let mut status = SpaceStatus::default();
        let Self { access, topo, store, cfg, bounds, mmio, io, .. } = self;
        let ctx = PlanCtx { cfg: &*cfg, bounds: &*bounds, demand, topo: &*topo };

        // Feasibility only; neither call writes registers or the layout.
        let _ = init_mmio_from_demands(&ctx, access, mmio, store, Some(&mut status), false);
        init_io_from_demands(&*topo, demand, access, io, Some(&mut status), false);
        status
    }

    /// Reserves MMIO for a non-PCI device out of the committed layout.
    ///
    /// # Errors
    ///
    /// [`RcError::Aborted`] for an unresolvable target or a non-runtime
    /// pool; [`RcError::OutOfResources`] when no pool can serve `length`,
    /// carrying the largest length that would have fit.
    pub fn reserve_mmio(
        &mut self,
        length: u64,
        align_mask: u64,
        class: MmioClass,
        target: FabricTarget,
    ) -> Result<ReservedRegion, RcError> {
        let Self { access, topo, mmio, .. } = self;
        reserve_mmio(&*access, &*topo, mmio, length, align_mask, class, target)
    }

    /// The committed MMIO layout.
    #[must_use]
    pub fn mmio_layout(&self) -> &MmioLayout {
        &self.mmio
    }

    /// The committed port IO layout.
    #[must_use]
    pub fn io_layout(&self) -> &IoLayout {
        &self.io
    }

    /// The register access, e.g. to inspect a staged shadow map.
    #[must_use]
    pub fn access(&self) -> &A {
        &self.access
    }

    /// Consumes the manager, returning the register access.
    #[must_use]
    pub fn into_access(self) -> A {
        self.access
    }
}
