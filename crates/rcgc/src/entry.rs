//! Allocation shapes and read-only entry snapshots.
//!
//! An [`EntryInfo`] is what external reporting sees of a tracking entry:
//! the allocation's address, how many handles reference it, and its
//! [`Shape`]. Snapshots are copied out of the registry and never alias it.

use std::fmt;

/// Layout of a tracked allocation.
///
/// The release path is chosen by this variant: a scalar is freed as a
/// single boxed value, an array as a boxed slice of `len` elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single heap value.
    Scalar,
    /// A contiguous heap array.
    Array {
        /// Number of elements. Always nonzero.
        len: usize,
    },
}

impl Shape {
    /// Shape of the `N` family: scalar for `N == 0`, otherwise an array of
    /// `N` elements.
    pub const fn of_family(n: usize) -> Self {
        if n == 0 {
            Self::Scalar
        } else {
            Self::Array { len: n }
        }
    }

    /// Whether the allocation was created as an array.
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// Array element count, or 0 for scalars.
    pub const fn array_size(&self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Array { len } => *len,
        }
    }

    /// Number of addressable elements: 1 for scalars.
    pub const fn element_count(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Array { len } => *len,
        }
    }
}

/// Snapshot of a single tracking entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct EntryInfo {
    /// Address of the allocation.
    pub address: usize,
    /// Number of live handles referencing the allocation.
    pub refcount: usize,
    /// Layout of the allocation.
    pub shape: Shape,
}

impl EntryInfo {
    /// Whether no handle references the allocation any more.
    pub fn is_dead(&self) -> bool {
        self.refcount == 0
    }

    /// Whether the allocation was created as an array.
    pub fn is_array(&self) -> bool {
        self.shape.is_array()
    }

    /// Array element count, or 0 for scalars.
    pub fn array_size(&self) -> usize {
        self.shape.array_size()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Array { len } => write!(f, "array[{len}]"),
        }
    }
}
