//! End-to-end boot flow over a shadow register file: demand-driven
//! initialization of a two-socket system, followed by probing and runtime
//! reservations.

use fabric_rcmgr::{
    Aperture, DemandTable, FabricResourceManager, FabricTarget, MmioClass, PlacementStore,
    PlatformBounds, RcMgrConfig,
};
use fabric_registers::{
    CFG_ADDRESS_CONTROL, CfgAddressControl, CfgBaseAddress, CfgLimitAddress, FabricRegisterAccess,
    MmioBaseAddress,
    MmioLimitAddress, ShadowFabric, X86IoLimitAddress, cfg_base_address, cfg_limit_address,
    mmio_base_address, mmio_limit_address, x86_io_limit_address,
};
use fabric_topology::{MAX_HOST_BRIDGES, ParticipantId, SocRbMap, Topology};

/// Placement store backed by a plain field, standing in for an NV variable.
#[derive(Default)]
struct MemoryStore {
    flags: Option<[bool; MAX_HOST_BRIDGES]>,
}

impl PlacementStore for MemoryStore {
    fn load(&self) -> Option<[bool; MAX_HOST_BRIDGES]> {
        self.flags
    }

    fn save(&mut self, flags: &[bool; MAX_HOST_BRIDGES]) {
        self.flags = Some(*flags);
    }
}

fn two_socket_topology() -> SocRbMap {
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

fn bounds() -> PlatformBounds {
    PlatformBounds {
        tom: 0x8000_0000,
        tom2: 0x1_0000_0000,
        pci_cfg_size: 0x1000_0000,
        phys_addr_bits: 40,
        phys_addr_reduction: 0,
    }
}

fn config() -> RcMgrConfig {
    RcMgrConfig {
        pci_express_base: 0xE000_0000,
        bottom_mmio_reserved_for_primary_rb: 0xFD00_0000,
        ..RcMgrConfig::default()
    }
}

fn demands() -> DemandTable {
    let mut demand = DemandTable::default();
    for socket in 0..2 {
        demand.prefetchable_below_4g[socket][0] = Aperture::new(0x800_0000, 0xF_FFFF);
        demand.non_prefetchable_below_4g[socket][0] = Aperture::new(0x400_0000, 0xF_FFFF);
    }
    demand.io[0][0] = 0x2000;
    demand.io[1][0] = 0x3000;
    demand.pci_bus_count[0][0] = 0x40;
    demand.pci_bus_count[1][0] = 0xC0;
    demand
}

fn manager() -> FabricResourceManager<ShadowFabric, SocRbMap, MemoryStore> {
    FabricResourceManager::new(
        ShadowFabric::new(),
        two_socket_topology(),
        MemoryStore::default(),
        config(),
        bounds(),
    )
    .unwrap()
}

fn mmio_span(shadow: &ShadowFabric, pair: usize) -> (u64, u64) {
    (
        MmioBaseAddress::from_bits(shadow.read(0, mmio_base_address(pair))).address(),
        MmioLimitAddress::from_bits(shadow.read(0, mmio_limit_address(pair))).address(),
    )
}

#[test]
fn demands_split_the_sockets_across_the_configuration_window() {
    let mut manager = manager();
    manager.initialize(Some(demands())).unwrap();

    // Socket 1 lands below the window, right at TOM.
    let other = manager.mmio_layout().below_4g[1][0];
    assert_eq!(other.base_prefetchable, 0x8000_0000);
    assert_eq!(other.size_prefetchable, 0x800_0000);
    assert_eq!(other.base_non_prefetchable, 0x8800_0000);
    assert_eq!(other.size_non_prefetchable, 0x400_0000);
    assert_eq!(other.base_non_pci, 0x8C00_0000);
    assert_eq!(other.size_non_pci, 0x100_0000);

    // The primary sits above it, filling the window up to the reserved
    // bottom exactly.
    let primary = manager.mmio_layout().below_4g[0][0];
    assert_eq!(primary.base_prefetchable, 0xF000_0000);
    assert_eq!(primary.size_prefetchable, 0x800_0000);
    assert_eq!(primary.base_non_prefetchable, 0xF800_0000);
    assert_eq!(primary.size_non_prefetchable, 0x400_0000);
    assert_eq!(primary.base_non_pci, 0xFC00_0000);
    assert_eq!(primary.size_non_pci, 0x100_0000);

    // Register pairs: the primary's slice extends through the reserved
    // region to the bottom of the compat area.
    let shadow = manager.access();
    assert_eq!(mmio_span(shadow, 0), (0xF000_0000, 0xFEBF_FFFF));
    assert_eq!(mmio_span(shadow, 8), (0x8000_0000, 0x8CFF_FFFF));

    // The fixed posted-write region rides on a spare pair.
    assert_eq!(mmio_span(shadow, 2), (0xFED0_0000, 0xFED0_FFFF));

    // Above 4G both bridges carry their non-PCI pool.
    assert!(manager.mmio_layout().has_above_4g[0][0]);
    assert!(manager.mmio_layout().has_above_4g[1][0]);
    assert_eq!(manager.mmio_layout().above_4g[0][0].base_non_pci, 0x1_0000_0000);
    assert_eq!(manager.mmio_layout().above_4g[1][0].base_non_pci, 0x1_3000_0000);
}

#[test]
fn initialize_programs_io_and_bus_numbers() {
    let mut manager = manager();
    manager.initialize(Some(demands())).unwrap();

    let primary = manager.io_layout().regions[0][0];
    assert_eq!(primary.base, 0x1000);
    assert_eq!(primary.size, 0x2000);
    assert_eq!(primary.legacy_size, 0x1000);

    // The last bridge absorbs the rest of the x86 port space.
    let other = manager.io_layout().regions[1][0];
    assert_eq!(other.base, 0x3000);
    assert_eq!(other.size, 0x1_0000 - 0x3000);

    let shadow = manager.access();
    let limit = X86IoLimitAddress::from_bits(shadow.read(0, x86_io_limit_address(1)));
    assert_eq!(limit.dst_fabric_id(), 0x40);
    assert_eq!(limit.io_limit_24_12(), 0x1FFF);

    // Bus numbers were redistributed 0x40/0xC0, the last map capped at 0xFF.
    let base = CfgBaseAddress::from_bits(shadow.read(0, cfg_base_address(0)));
    let limit = CfgLimitAddress::from_bits(shadow.read(0, cfg_limit_address(0)));
    assert!(base.re_read_enable() && base.we_write_enable());
    assert_eq!(base.bus_num_base(), 0x00);
    assert_eq!(limit.bus_num_limit(), 0x3F);
    assert_eq!(limit.dst_fabric_id(), 0x00);

    let base = CfgBaseAddress::from_bits(shadow.read(0, cfg_base_address(1)));
    let limit = CfgLimitAddress::from_bits(shadow.read(0, cfg_limit_address(1)));
    assert_eq!(base.bus_num_base(), 0x40);
    assert_eq!(limit.bus_num_limit(), 0xFF);
    assert_eq!(limit.dst_fabric_id(), 0x40);

    let control =
        CfgAddressControl::from_bits(shadow.read_instance(1, 0, CFG_ADDRESS_CONTROL));
    assert_eq!(control.secondary_bus(), 0x40);
}

#[test]
fn a_stored_placement_is_replayed_on_the_next_boot() {
    let topo = two_socket_topology();
    let n = topo.host_bridge_count();

    // The placement the search converges to: primary above the window,
    // socket 1 below it. A store seeded with it skips the search entirely.
    let mut stored = [true; MAX_HOST_BRIDGES];
    stored[n - 1] = false;

    let mut manager = FabricResourceManager::new(
        ShadowFabric::new(),
        topo,
        MemoryStore { flags: Some(stored) },
        config(),
        bounds(),
    )
    .unwrap();
    manager.initialize(Some(demands())).unwrap();
    assert_eq!(manager.mmio_layout().below_4g[1][0].base_prefetchable, 0x8000_0000);
    assert_eq!(manager.mmio_layout().below_4g[0][0].base_prefetchable, 0xF000_0000);
}

#[test]
fn probe_reports_the_demand_totals() {
    let mut manager = manager();
    manager.initialize(Some(demands())).unwrap();

    let status = manager.probe(&demands());
    assert_eq!(status.io_size, 0x5000);
    assert_eq!(status.io_size_req_inc, 0);
    assert_eq!(status.mmio_size_below_4g, 0x1800_0000);
    assert_eq!(status.mmio_size_below_4g_req_inc, 0);
    assert_eq!(status.mmio_size_above_4g, 0);
    assert_eq!(status.mmio_size_above_4g_req_inc, 0);
}

#[test]
fn probe_of_oversized_demands_reports_the_shortfall() {
    let mut manager = manager();
    manager.initialize(Some(demands())).unwrap();

    let mut oversized = demands();
    for socket in 0..2 {
        oversized.prefetchable_below_4g[socket][0] = Aperture::new(0x7000_0000, 0xF_FFFF);
    }
    let status = manager.probe(&oversized);
    assert!(status.mmio_size_below_4g_req_inc > 0);
}

#[test]
fn a_single_bridge_takes_one_side_and_the_other_becomes_its_second_region() {
    let topo = SocRbMap::new(
        1,
        1,
        [[0x22; 4], [0; 4]],
        [[0; 4]; 2],
        [[0xFF, 0, 0, 0], [0; 4]],
        ParticipantId::new(0, 0).unwrap(),
    )
    .unwrap();
    let mut demand = DemandTable::default();
    demand.prefetchable_below_4g[0][0] = Aperture::new(0x800_0000, 0xF_FFFF);
    demand.non_prefetchable_below_4g[0][0] = Aperture::new(0x400_0000, 0xF_FFFF);
    demand.primary_second_prefetchable = Aperture::new(0x1000_0000, 0xFF_FFFF);
    demand.pci_bus_count[0][0] = 0x100;

    let mut manager = FabricResourceManager::new(
        ShadowFabric::new(),
        topo,
        MemoryStore::default(),
        config(),
        bounds(),
    )
    .unwrap();
    manager.initialize(Some(demand)).unwrap();

    // The demands exactly fill the side above the configuration window.
    let first = manager.mmio_layout().below_4g[0][0];
    assert_eq!(first.base_prefetchable, 0xF000_0000);
    assert_eq!(first.base_non_prefetchable, 0xF800_0000);
    assert_eq!(first.base_non_pci, 0xFC00_0000);

    // The whole below side becomes the second region, all prefetchable.
    assert_eq!(manager.mmio_layout().primary_second_pair, Some((0, 1)));
    let second = manager.mmio_layout().below_4g[0][1];
    assert_eq!(second.base_prefetchable, 0x8000_0000);
    assert_eq!(second.size_prefetchable, 0x6000_0000);
    assert_eq!(second.size_non_prefetchable, 0);

    let shadow = manager.access();
    assert_eq!(mmio_span(shadow, 0), (0xF000_0000, 0xFEBF_FFFF));
    assert_eq!(mmio_span(shadow, 2), (0x8000_0000, 0xDFFF_FFFF));
    // The posted region skips the second region's slot and takes the next
    // spare pair.
    assert_eq!(mmio_span(shadow, 4), (0xFED0_0000, 0xFED0_FFFF));
}

fn two_by_two_topology() -> SocRbMap {
    SocRbMap::new(
        2,
        2,
        [[0x00, 0x10, 0, 0], [0x40, 0x50, 0, 0]],
        [[0x00, 0x20, 0, 0], [0x40, 0x60, 0, 0]],
        [[0x1F, 0x3F, 0, 0], [0x5F, 0x7F, 0, 0]],
        ParticipantId::new(0, 0).unwrap(),
    )
    .unwrap()
}

#[test]
fn an_oversized_primary_pushes_a_neighbour_above_the_window() {
    let mut demand = DemandTable::default();
    demand.prefetchable_below_4g[0][0] = Aperture::new(0x3000_0000, 0xF_FFFF);
    demand.non_prefetchable_below_4g[0][0] = Aperture::new(0x800_0000, 0xF_FFFF);
    for (socket, rb) in [(0, 1), (1, 0), (1, 1)] {
        demand.prefetchable_below_4g[socket][rb] = Aperture::new(0x800_0000, 0xF_FFFF);
        demand.non_prefetchable_below_4g[socket][rb] = Aperture::new(0x200_0000, 0xF_FFFF);
    }
    // Bus ranges match the decoded topology; the bus maps stay untouched.
    demand.pci_bus_count = [[0x20, 0x20, 0, 0], [0x20, 0x20, 0, 0]];

    let mut manager = FabricResourceManager::new(
        ShadowFabric::new(),
        two_by_two_topology(),
        MemoryStore::default(),
        config(),
        bounds(),
    )
    .unwrap();
    manager.initialize(Some(demand)).unwrap();

    // The primary cannot fit above; the search lands on socket 0 bridge 1
    // above the window and everyone else below it.
    let moved = manager.mmio_layout().below_4g[0][1];
    assert_eq!(moved.base_prefetchable, 0xF000_0000);
    assert_eq!(moved.base_non_prefetchable, 0xF800_0000);
    assert_eq!(moved.base_non_pci, 0xFA00_0000);

    let primary = manager.mmio_layout().below_4g[0][0];
    assert_eq!(primary.base_prefetchable, 0x9600_0000);
    assert_eq!(primary.base_non_prefetchable, 0xC600_0000);
    assert_eq!(primary.base_non_pci, 0xCE00_0000);

    // Below the window, socket 1 packs down from TOM.
    assert_eq!(manager.mmio_layout().below_4g[1][1].base_prefetchable, 0x8000_0000);
    assert_eq!(manager.mmio_layout().below_4g[1][0].base_non_pci, 0x8B00_0000);

    let shadow = manager.access();
    // The primary's register absorbs its whole side up to the window.
    assert_eq!(mmio_span(shadow, 0), (0x9600_0000, 0xDFFF_FFFF));
    assert_eq!(mmio_span(shadow, 10), (0x8000_0000, 0x8AFF_FFFF));
    assert_eq!(mmio_span(shadow, 2), (0xF000_0000, 0xFAFF_FFFF));
    // The posted region takes the first spare pair.
    assert_eq!(mmio_span(shadow, 4), (0xFED0_0000, 0xFED0_FFFF));
}

#[test]
fn unplaceable_demands_fall_back_to_the_even_split() {
    let mut demand = demands();
    for socket in 0..2 {
        demand.prefetchable_below_4g[socket][0] = Aperture::new(0x7000_0000, 0xF_FFFF);
    }

    let mut manager = manager();
    manager.initialize(Some(demand)).unwrap();

    // The even split ignores the demands: the below side is halved, the
    // undersized above side goes to the primary as a second region.
    assert_eq!(manager.mmio_layout().below_4g[0][0].base_prefetchable, 0xB000_0000);
    assert_eq!(manager.mmio_layout().below_4g[1][0].base_prefetchable, 0x8000_0000);
    assert_eq!(manager.mmio_layout().primary_second_pair, Some((0, 1)));
}

#[test]
fn runtime_reservations_come_out_of_the_committed_pools() {
    let mut manager = manager();
    manager.initialize(Some(demands())).unwrap();

    // Routed through the bus maps: bus 0x90 decodes to socket 1.
    let region = manager
        .reserve_mmio(
            0x8000,
            0xFFF,
            MmioClass::NonPciBelow4G,
            FabricTarget::PciBus { segment: 0, bus: 0x90 },
        )
        .unwrap();
    assert_eq!(region.base, 0x8C00_0000);

    // The primary's above-4G pool serves large fixed-address devices.
    let region = manager
        .reserve_mmio(
            0x10_0000,
            0xF_FFFF,
            MmioClass::NonPciAbove4G,
            FabricTarget::RootBridge(ParticipantId::new(0, 0).unwrap()),
        )
        .unwrap();
    assert_eq!(region.base, 0x1_0000_0000);
}
