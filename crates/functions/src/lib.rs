//! The function protocol (§4.2): `return_type`/`execute` entry points,
//! the `execute_left_type -> execute_right_type -> execute_impl` dispatch
//! helper, comparisons, string search, `LIKE` lowering, and the process-wide
//! regex cache they share.

pub mod comparison;
pub mod datetime;
pub mod dispatch;
pub mod like;
pub mod regex_cache;
pub mod search;

pub use comparison::CompareOp;
pub use datetime::{to_date, to_hour, to_minute, to_second, to_start_of_day, utc_offset_seconds, TimeZone};
pub use dispatch::{dispatch, BinaryDispatch};
pub use like::{is_match as like_is_match, lower as lower_like, LoweredLike};
pub use regex_cache::RegexCache;
pub use search::SearchMode;
