/// Errors reported by the resource manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RcError {
    /// A space could not satisfy the demands placed on it.
    ///
    /// `size` is best-effort context: for the planners it is the additional
    /// space that would have been needed, for the runtime sub-allocator it is
    /// the largest length that could still be served.
    #[error("out of resources (size of interest 0x{size:X})")]
    OutOfResources { size: u64 },

    /// Inputs are inconsistent with the platform state; nothing was changed.
    #[error("aborted, inconsistent platform state")]
    Aborted,

    /// A required collaborator or data block is missing.
    #[error("not found")]
    NotFound,

    /// A caller-supplied parameter is outside its valid range.
    #[error("invalid parameter")]
    InvalidParameter,
}
