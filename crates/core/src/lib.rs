//! Task lifecycle primitives shared by every long-running crucible
//! component: MergeTree read streams, aggregation workers, and the Keeper
//! server's session checker and Raft driver.

mod task_center;

pub use task_center::{
    cancellation_watcher, is_cancellation_requested, TaskCenter, TaskCenterFactory, TaskId,
    TaskKind,
};
