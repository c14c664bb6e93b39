//! The MergeTree read path (§4.4): from a query's conditions down to the
//! Blocks a worker stream produces.
//!
//! The pipeline, in order: [`part_selection`] picks which parts survive
//! the date/primary-key conditions and narrows each to candidate mark
//! ranges; [`sharding`] splits that set across parallel-replica peers;
//! [`spreading`] divides one replica's share across worker threads;
//! [`scan`] drives each worker's two-phase PREWHERE -> WHERE pass over
//! [`storage`], sized by [`predictor`].

pub mod mark_ranges;
pub mod part_selection;
pub mod pk_condition;
pub mod predictor;
pub mod scan;
pub mod sharding;
pub mod spreading;
pub mod storage;
pub mod types;

pub use mark_ranges::{narrow_mark_ranges, DEFAULT_COARSE_INDEX_GRANULARITY, DEFAULT_MIN_MARKS_FOR_SEEK};
pub use part_selection::select_parts;
pub use pk_condition::{part_excluded_by_date, PKCondition};
pub use predictor::AdaptiveBlockSizePredictor;
pub use scan::{FilterOutcome, RowFilter, TwoPhaseScan};
pub use sharding::shard_for_replica;
pub use spreading::{spread_across_threads, StreamPlan, DEFAULT_MIN_MARKS_FOR_CONCURRENT_READ};
pub use storage::{FlatFilePartStorage, InMemoryPartStorage, MarkEntry, PartStorage};
pub use types::{MarkRange, PartInfo, PartRanges};
