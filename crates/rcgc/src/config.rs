//! Registry configuration parameters.

/// Configuration for a [`Registry`](crate::Registry).
///
/// Fixed at construction; every clone of a registry shares the same
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Run a collection pass every time a handle is dropped.
    ///
    /// Default: `true`. When disabled, dead entries stay in the registry
    /// until [`Registry::collect`](crate::Registry::collect) or
    /// [`Registry::sweep`](crate::Registry::sweep) is called.
    pub collect_on_release: bool,

    /// Number of entries the table is pre-sized for.
    ///
    /// Default: 16.
    pub initial_capacity: usize,
}

impl RegistryConfig {
    /// Default for [`RegistryConfig::collect_on_release`].
    pub const DEFAULT_COLLECT_ON_RELEASE: bool = true;

    /// Default for [`RegistryConfig::initial_capacity`].
    pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            collect_on_release: Self::DEFAULT_COLLECT_ON_RELEASE,
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
        }
    }

    /// Defer collection to explicit `collect()`/`sweep()` calls.
    pub fn deferred() -> Self {
        Self {
            collect_on_release: false,
            ..Self::new()
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}
