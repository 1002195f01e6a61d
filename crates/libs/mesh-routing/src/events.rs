use mesh_codec::Instance;

use crate::link::Link;

/// Events emitted by `RoutingTable` mutations. The table itself holds no
/// observer list — callers collect these and dispatch to whoever is
/// listening, keeping the table a plain, directly testable data structure.
#[derive(Debug, Clone)]
pub enum RoutingEvent {
    InstanceFound(Instance),
    InstanceLost(Instance),
    LinkUpdate(Link),
}
