//! The columnar data plane: `Type`, `Column`, `Block`, `Field` (§3). Every
//! function, aggregate, and storage in crucible operates through these
//! primitives.

pub mod block;
pub mod column;
pub mod field;
pub mod ty;

pub use block::{Block, BlockColumn};
pub use column::{ArrayColumn, Column, ConstColumn, FixedStringColumn, NullableColumn, StringColumn, VectorColumn};
pub use field::{Field, FieldArena};
pub use ty::{Decimal, NumberKind, Type};
