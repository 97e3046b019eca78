/// Addressee of a fabric register write within one socket.
///
/// Most address-map registers are replicated across every fabric component
/// and are kept coherent by broadcasting. The configuration address control
/// register is the exception: it lives per IO root complex, one instance per
/// root bridge.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegisterInstance {
    /// All components on the socket.
    Broadcast,
    /// The IO root complex instance of the given root bridge.
    RootBridge(usize),
}

/// Synchronous access to the data-fabric indirect register space.
///
/// Implementations sit on whatever transport the platform provides (PCI
/// config cycles to the DF function, SMN, or an in-memory shadow for tests).
/// Reads always observe the broadcast-coherent value.
pub trait FabricRegisterAccess {
    /// Reads a 32-bit register on the given socket.
    fn read(&self, socket: usize, register: u16) -> u32;

    /// Writes a 32-bit register on the given socket.
    fn write(&mut self, socket: usize, instance: RegisterInstance, register: u16, value: u32);
}
