//! Simulation component identifier.

/// Identifier of simulation component.
///
/// Identifiers are assigned in registration order by [`Simulation`](crate::Simulation) and are used as event
/// source and destination. Nodes and switches of a fabric are components, as is the traffic generator.
pub type Id = u32;
