//! The aggregation engine (§4.3): variant selection, the aggregate function
//! contract, per-Block processing with overflow modes, and cross-variant
//! merge (including folding a stream of already-aggregated Blocks from
//! shard partials, the same way).

pub mod function;
pub mod key;
pub mod variant;

pub use function::{AggregateFunction, AggregateState, Count, Extremum, ExtremumKind, Sum};
pub use key::{select_variant, GenericKey, VariantKind};
pub use variant::{AggregatedDataVariants, ControlFlow, OverflowMode};
