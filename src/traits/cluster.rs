/// Cluster leadership oracle.
///
/// Only the primary node runs recovery, the renewal sweep, and key
/// rotation. The flag is evaluated fresh at the top of every entry point
/// and never cached; after losing leadership a node's next tick is a
/// no-op.
pub trait ClusterState: Send + Sync {
    /// Whether this node is currently the primary.
    fn is_primary(&self) -> bool;
}
