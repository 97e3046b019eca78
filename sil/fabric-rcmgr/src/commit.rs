//! Register-write helpers. Every map register is broadcast to each socket so
//! all fabric devices route identically; only the per-root-bridge secondary
//! bus number is written to a single instance.

use crate::demand::MMIO_MIN_SIZE;
use fabric_topology::MAX_RBS_PER_SOCKET;
use fabric_registers::{
    CFG_ADDRESS_CONTROL, CfgAddressControl, CfgBaseAddress, CfgLimitAddress,
    FabricRegisterAccess, MmioAddressControl, MmioBaseAddress, MmioLimitAddress,
    RegisterInstance, X86IoBaseAddress, X86IoLimitAddress, cfg_base_address,
    cfg_limit_address, mmio_address_control, mmio_base_address, mmio_limit_address,
    x86_io_base_address, x86_io_limit_address,
};

/// Register pair owned by `(socket, root_bridge)`; even for below 4G, odd
/// for above. Indexed over the full register file so spare pairs can never
/// collide with a live bridge's pair.
pub(crate) const fn mmio_pair(socket: usize, root_bridge: usize) -> usize {
    (socket * MAX_RBS_PER_SOCKET + root_bridge) * 2
}

/// Programs one MMIO base/limit/control triple on every socket.
pub(crate) fn set_mmio_pair<A: FabricRegisterAccess>(
    access: &mut A,
    socket_count: usize,
    pair: usize,
    dst_fabric_id: u16,
    base: u64,
    length: u64,
) {
    debug_assert!(length >= MMIO_MIN_SIZE);
    let base = (base + 0xFFFF) & 0xFFFF_FFFF_FFFF_0000;

    let control = MmioAddressControl::new()
        .with_re_read_enable(true)
        .with_we_write_enable(true)
        .with_dst_fabric_id(dst_fabric_id);

    for socket in 0..socket_count {
        access.write(
            socket,
            RegisterInstance::Broadcast,
            mmio_base_address(pair),
            MmioBaseAddress::from_address(base).into_bits(),
        );
        access.write(
            socket,
            RegisterInstance::Broadcast,
            mmio_limit_address(pair),
            MmioLimitAddress::from_address(base + length - 1).into_bits(),
        );
        access.write(
            socket,
            RegisterInstance::Broadcast,
            mmio_address_control(pair),
            control.into_bits(),
        );
    }
    log::info!(
        "set MMIO pair #{pair:X}, 0x{:X}0000 ~ 0x{:X}FFFF DstFabricID 0x{dst_fabric_id:X}",
        base >> 16,
        (base + length - 1) >> 16
    );
}

/// Programs one port IO region on every socket. The limit goes first so the
/// region only becomes routable once it is fully described.
pub(crate) fn set_io_region<A: FabricRegisterAccess>(
    access: &mut A,
    socket_count: usize,
    index: usize,
    dst_fabric_id: u16,
    base: u32,
    size: u32,
) {
    let base_register = X86IoBaseAddress::from_port(base)
        .with_re_read_enable(true)
        .with_we_write_enable(true);
    let limit_register =
        X86IoLimitAddress::from_port(base + size - 1).with_dst_fabric_id(dst_fabric_id);

    for socket in 0..socket_count {
        access.write(
            socket,
            RegisterInstance::Broadcast,
            x86_io_limit_address(index),
            limit_register.into_bits(),
        );
        // Enable after the limit is in place.
        access.write(
            socket,
            RegisterInstance::Broadcast,
            x86_io_base_address(index),
            base_register.into_bits(),
        );
    }
    log::info!(
        "set IO region #{index:X}, 0x{:X}000 ~ 0x{:X}FFF DstFabricID 0x{dst_fabric_id:X}",
        base >> 12,
        (base + size - 1) >> 12
    );
}

/// Programs one bus-number map on every socket.
pub(crate) fn set_cfg_map<A: FabricRegisterAccess>(
    access: &mut A,
    socket_count: usize,
    index: usize,
    dst_fabric_id: u16,
    bus_base: u8,
    bus_limit: u8,
) {
    let base_register = CfgBaseAddress::new()
        .with_re_read_enable(true)
        .with_we_write_enable(true)
        .with_bus_num_base(bus_base);
    let limit_register = CfgLimitAddress::new()
        .with_dst_fabric_id(dst_fabric_id)
        .with_bus_num_limit(bus_limit);

    for socket in 0..socket_count {
        access.write(
            socket,
            RegisterInstance::Broadcast,
            cfg_base_address(index),
            base_register.into_bits(),
        );
        access.write(
            socket,
            RegisterInstance::Broadcast,
            cfg_limit_address(index),
            limit_register.into_bits(),
        );
    }
    log::info!(
        "set bus map #{index:X}, {bus_base:#04X} ~ {bus_limit:#04X} DstFabricID 0x{dst_fabric_id:X}"
    );
}

/// Disables one bus-number map on every socket.
pub(crate) fn clear_cfg_map<A: FabricRegisterAccess>(
    access: &mut A,
    socket_count: usize,
    index: usize,
) {
    for socket in 0..socket_count {
        access.write(socket, RegisterInstance::Broadcast, cfg_base_address(index), 0);
        access.write(socket, RegisterInstance::Broadcast, cfg_limit_address(index), 0);
    }
}

/// Tells one root bridge which bus number it decodes as its own.
pub(crate) fn set_secondary_bus<A: FabricRegisterAccess>(
    access: &mut A,
    socket: usize,
    root_bridge: usize,
    secondary_bus: u8,
) {
    let control = CfgAddressControl::new().with_secondary_bus(secondary_bus);
    access.write(
        socket,
        RegisterInstance::RootBridge(root_bridge),
        CFG_ADDRESS_CONTROL,
        control.into_bits(),
    );
}
