//! Small stream combinators shared by the MergeTree read path and the
//! Keeper background tasks, in the spirit of the teacher's own
//! `restate-futures-util` crate (a home for stream/future helpers too small
//! to deserve their own dependency).

mod cancelable;
mod overdue;

pub use cancelable::{CancelableStreamExt, TakeUntilCancelled};
pub use overdue::OverduePeriodic;
