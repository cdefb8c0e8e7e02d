//! Shared sizing constant for the chunk registry.
//!
//! The chunk record itself — base, size, mark bit, generation — is an
//! internal detail of [`crate::registry::ChunkRegistry`], which must be able
//! to allocate records fallibly (see that module's `Node`/`RecordRef`). This
//! module exists so `GENERATIONS` has one definition shared by the registry,
//! the collector's sweep order, and the scanner's generation filters.

/// Number of generations the registry tracks (nursery .. tenured).
pub const GENERATIONS: usize = 3;
