// Dynamic taint analysis over general-purpose registers, used to find the
// memory addresses whose loaded values later feed address computations.

pub mod classify;
pub mod hook;
pub mod policy;
pub mod propagator;
pub mod table;
pub mod tracer;

/// Index of a row of the taint table. One row per register plus a scratch row.
pub type Row = usize;
/// Index of a color of the taint table.
pub type Color = usize;

pub use hook::{AddressEvent, AddressHooks};
pub use policy::{AlwaysTrack, StackFramePolicy, TrackPolicy};
pub use propagator::Propagator;
pub use table::{ColorSet, TaintTable, MAX_COLORS};
pub use tracer::Tracer;
