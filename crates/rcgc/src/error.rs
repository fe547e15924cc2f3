//! Tracking error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while tracking, accessing, or traversing
/// allocations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackError {
    /// A raw address handed to a constructor or assignment was null.
    NullAddress,
    /// The handle is not bound to any allocation.
    EmptyHandle,
    /// The handle's allocation was force-released by a registry shutdown.
    StaleHandle {
        /// Registry epoch recorded when the handle was bound.
        handle_epoch: u64,
        /// Current epoch of the registry.
        registry_epoch: u64,
    },
    /// Indexed access on a scalar family.
    NotAnArray,
    /// Indexed access outside `[0, len)`.
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of elements in the tracked region.
        len: usize,
    },
    /// Cursor dereferenced or advanced outside its bounds.
    CursorOutOfRange {
        /// Position the cursor was asked to reach or read.
        position: usize,
        /// Upper bound of the cursor's region.
        len: usize,
    },
    /// Cursor stepped or peeked before the start of its region.
    CursorBeforeStart {
        /// Position the cursor was at.
        position: usize,
        /// Signed step that was requested from `position`.
        offset: isize,
    },
    /// A boxed slice does not match the family's fixed array size.
    LengthMismatch {
        /// The family's array size.
        expected: usize,
        /// Length of the slice that was offered.
        actual: usize,
    },
    /// The underlying allocator refused an allocation.
    AllocationFailed {
        /// Number of elements requested.
        elements: usize,
        /// Number of bytes requested.
        bytes: usize,
    },
    /// An entry for this address already exists in the registry.
    AlreadyTracked {
        /// The duplicated address.
        address: usize,
    },
    /// Mutable access was requested while other handles alias the
    /// allocation.
    SharedAllocation {
        /// Current number of handles referencing the allocation.
        refcount: usize,
    },
    /// The thread's family table has already been torn down.
    RegistryUnavailable,
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullAddress => write!(f, "cannot track a null address"),
            Self::EmptyHandle => write!(f, "handle is not bound to an allocation"),
            Self::StaleHandle {
                handle_epoch,
                registry_epoch,
            } => {
                write!(
                    f,
                    "stale handle: bound at epoch {handle_epoch}, registry is at epoch {registry_epoch}"
                )
            }
            Self::NotAnArray => write!(f, "indexed access on a scalar allocation"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for {len} elements")
            }
            Self::CursorOutOfRange { position, len } => {
                write!(f, "cursor position {position} outside region of {len} elements")
            }
            Self::CursorBeforeStart { position, offset } => {
                write!(
                    f,
                    "cursor offset {offset} from position {position} is before the start of the region"
                )
            }
            Self::LengthMismatch { expected, actual } => {
                write!(f, "expected an array of {expected} elements, got {actual}")
            }
            Self::AllocationFailed { elements, bytes } => {
                write!(f, "allocation of {elements} elements ({bytes} bytes) failed")
            }
            Self::AlreadyTracked { address } => {
                write!(f, "address {address:#x} is already tracked")
            }
            Self::SharedAllocation { refcount } => {
                write!(f, "allocation is shared by {refcount} handles")
            }
            Self::RegistryUnavailable => {
                write!(f, "family registry table has been torn down on this thread")
            }
        }
    }
}

impl Error for TrackError {}
