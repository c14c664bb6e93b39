//! `PartStorage`: how mark ranges are turned into Blocks (§4.4.5).
//!
//! Two implementations only, per the Non-goals: an in-memory store (what
//! the read-path algorithms above are actually tested against) and a
//! minimal flat-file format — one file per column holding its rows via
//! the same binary encoding `Type::encode_binary`/`decode_binary` already
//! use for wire framing, plus one `.mrk` file per column holding an
//! `(offset, rows)` pair per mark. No compression, no checksums, no
//! compatibility with any specific on-disk format; a real storage engine
//! is out of scope.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use crucible_block::{Column, Type};
use crucible_errors::{Code, Error, Result};
use crucible_types::PartId;

use crate::types::MarkRange;

/// A `(byte offset, row count)` pair, one per mark, identifying where a
/// granule starts in a column's data file and how many rows it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkEntry {
    pub offset: u64,
    pub rows: usize,
}

/// Reads granules of one column, given only the mark ranges to fetch.
/// Implementors own whatever representation they like; the read path
/// never inspects bytes directly.
pub trait PartStorage: Send + Sync {
    /// Reads and concatenates the rows covered by `ranges` for `column`,
    /// returning an empty-but-correctly-typed column when `ranges` is
    /// empty.
    fn read_column(&self, part: &PartId, column: &str, ranges: &[MarkRange]) -> Result<Column>;

    fn column_type(&self, part: &PartId, column: &str) -> Result<Type>;

    fn mark_count(&self, part: &PartId, column: &str) -> Result<usize>;
}

/// Stores every part's columns as plain in-memory `Column`s, sliced into
/// fixed-size marks computed from an index-granularity setting.
#[derive(Default)]
pub struct InMemoryPartStorage {
    columns: HashMap<(String, String), (Type, Column)>,
    marks: HashMap<(String, String), usize>,
}

impl InMemoryPartStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a column's full data for a part, pre-split into
    /// `index_granularity`-row marks (the last mark may be shorter).
    pub fn add_column(&mut self, part: &PartId, column: &str, ty: Type, data: Column, index_granularity: usize) {
        let rows = data.size();
        let marks = if index_granularity == 0 {
            1
        } else {
            rows.div_ceil(index_granularity).max(1)
        };
        self.columns.insert((part.0.clone(), column.to_owned()), (ty, data));
        self.marks.insert((part.0.clone(), column.to_owned()), marks);
    }

    fn granularity_of(&self, part: &PartId, column: &str, rows: usize) -> Result<usize> {
        let marks = self.mark_count(part, column)?;
        if marks == 0 {
            return Ok(rows.max(1));
        }
        Ok(rows.div_ceil(marks).max(1))
    }
}

impl PartStorage for InMemoryPartStorage {
    fn read_column(&self, part: &PartId, column: &str, ranges: &[MarkRange]) -> Result<Column> {
        let key = (part.0.clone(), column.to_owned());
        let (_, data) = self
            .columns
            .get(&key)
            .ok_or_else(|| missing_column(part, column))?;
        let granularity = self.granularity_of(part, column, data.size())?;

        let mut out = data.empty_like();
        for range in ranges {
            let start_row = range.begin * granularity;
            let end_row = (range.end * granularity).min(data.size());
            if start_row >= end_row {
                continue;
            }
            out.insert_range_from(data, start_row, end_row - start_row)?;
        }
        Ok(out)
    }

    fn column_type(&self, part: &PartId, column: &str) -> Result<Type> {
        let key = (part.0.clone(), column.to_owned());
        self.columns
            .get(&key)
            .map(|(ty, _)| ty.clone())
            .ok_or_else(|| missing_column(part, column))
    }

    fn mark_count(&self, part: &PartId, column: &str) -> Result<usize> {
        let key = (part.0.clone(), column.to_owned());
        self.marks.get(&key).copied().ok_or_else(|| missing_column(part, column))
    }
}

/// The minimal flat-file layout: `<root>/<part>/<column>.bin` holds the
/// column's rows back-to-back, each encoded with `Type::encode_binary`;
/// `<root>/<part>/<column>.mrk` holds one `(offset: u64 LE, rows: u64
/// LE)` pair per mark. A column's `Type` is tracked in memory by this
/// process for the lifetime of the `FlatFilePartStorage` value (the
/// format carries no self-describing type header — reopening a directory
/// written by a previous process isn't supported, consistent with "no
/// compatibility with any specific on-disk format").
pub struct FlatFilePartStorage {
    root: PathBuf,
    types: Mutex<HashMap<(String, String), Type>>,
}

impl FlatFilePartStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            types: Mutex::new(HashMap::new()),
        }
    }

    fn data_path(&self, part: &PartId, column: &str) -> PathBuf {
        self.root.join(&part.0).join(format!("{column}.bin"))
    }

    fn mark_path(&self, part: &PartId, column: &str) -> PathBuf {
        self.root.join(&part.0).join(format!("{column}.mrk"))
    }

    /// Writes `data`'s rows, split into `index_granularity`-row marks, to
    /// disk under this storage's root, overwriting any existing files for
    /// this `(part, column)`.
    pub fn write_column(
        &self,
        part: &PartId,
        column: &str,
        ty: &Type,
        data: &Column,
        index_granularity: usize,
    ) -> Result<()> {
        let dir = self.root.join(&part.0);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let granularity = index_granularity.max(1);
        let rows = data.size();

        let mut encoded = BytesMut::new();
        let mut marks = Vec::new();
        let mut row = 0usize;
        while row < rows {
            let mark_rows = granularity.min(rows - row);
            marks.push(MarkEntry {
                offset: encoded.len() as u64,
                rows: mark_rows,
            });
            for r in row..row + mark_rows {
                ty.encode_binary(&data.get(r)?, &mut encoded)?;
            }
            row += mark_rows;
        }
        if rows == 0 {
            marks.push(MarkEntry { offset: 0, rows: 0 });
        }

        let data_path = self.data_path(part, column);
        let mut data_file = File::create(&data_path).map_err(|e| io_err(&data_path, e))?;
        data_file.write_all(&encoded).map_err(|e| io_err(&data_path, e))?;

        let mark_path = self.mark_path(part, column);
        let mut mark_file = File::create(&mark_path).map_err(|e| io_err(&mark_path, e))?;
        for mark in &marks {
            mark_file.write_all(&mark.offset.to_le_bytes()).map_err(|e| io_err(&mark_path, e))?;
            mark_file
                .write_all(&(mark.rows as u64).to_le_bytes())
                .map_err(|e| io_err(&mark_path, e))?;
        }

        self.types
            .lock()
            .unwrap()
            .insert((part.0.clone(), column.to_owned()), ty.clone());
        Ok(())
    }

    fn read_marks(&self, part: &PartId, column: &str) -> Result<Vec<MarkEntry>> {
        let mark_path = self.mark_path(part, column);
        let mut file = File::open(&mark_path).map_err(|e| io_err(&mark_path, e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| io_err(&mark_path, e))?;
        if bytes.len() % 16 != 0 {
            return Err(Error::io(
                Code::CorruptedData,
                format!("truncated mark file {}", mark_path.display()),
            ));
        }
        Ok(bytes
            .chunks_exact(16)
            .map(|chunk| MarkEntry {
                offset: u64::from_le_bytes(chunk[0..8].try_into().unwrap()),
                rows: u64::from_le_bytes(chunk[8..16].try_into().unwrap()) as usize,
            })
            .collect())
    }
}

impl PartStorage for FlatFilePartStorage {
    fn read_column(&self, part: &PartId, column: &str, ranges: &[MarkRange]) -> Result<Column> {
        let ty = self.column_type(part, column)?;
        let marks = self.read_marks(part, column)?;
        let data_path = self.data_path(part, column);

        let mut out = ty.new_empty_column();
        for range in ranges {
            if range.begin >= marks.len() {
                continue;
            }
            let end = range.end.min(marks.len());
            if range.begin >= end {
                continue;
            }
            let span = &marks[range.begin..end];
            let Some(first) = span.first() else { continue };
            let total_rows: usize = span.iter().map(|m| m.rows).sum();
            if total_rows == 0 {
                continue;
            }

            let mut file = File::open(&data_path).map_err(|e| io_err(&data_path, e))?;
            file.seek(SeekFrom::Start(first.offset)).map_err(|e| io_err(&data_path, e))?;
            let mut raw = Vec::new();
            file.read_to_end(&mut raw).map_err(|e| io_err(&data_path, e))?;
            let mut buf: Bytes = raw.into();

            for _ in 0..total_rows {
                let field = ty.decode_binary(&mut buf)?;
                push_decoded_value(&mut out, &field);
            }
        }
        Ok(out)
    }

    fn column_type(&self, part: &PartId, column: &str) -> Result<Type> {
        let key = (part.0.clone(), column.to_owned());
        self.types
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| missing_column(part, column))
    }

    fn mark_count(&self, part: &PartId, column: &str) -> Result<usize> {
        Ok(self.read_marks(part, column)?.len())
    }
}

fn missing_column(part: &PartId, column: &str) -> Error {
    Error::logic(Code::LogicalError, format!("no column '{column}' in part '{}'", part.0))
}

fn io_err(path: &Path, err: std::io::Error) -> Error {
    Error::io(Code::CannotReadAllData, format!("{}: {err}", path.display()))
}

/// Narrows a decoded `Field`'s erased numeric width back down to the
/// destination `Column`'s concrete representation. Mirrors the equivalent
/// helper in the aggregation engine's block materialization.
fn push_decoded_value(column: &mut Column, field: &crucible_block::Field) {
    use crucible_block::{Field, VectorColumn};

    match column {
        Column::Vector(vector) => push_vector_value(vector, field),
        Column::String(s) => {
            if let Field::String(bytes) = field {
                s.push(bytes);
            }
        }
        Column::Nullable(n) if matches!(field, Field::Null) => n.push_null(),
        _ => {}
    }

    fn push_vector_value(vector: &mut VectorColumn, field: &Field) {
        let as_u64 = field.as_u64();
        let as_i64 = field.as_i64();
        let as_f64 = match field {
            Field::Float64(v) => Some(*v),
            _ => None,
        };
        match vector {
            VectorColumn::UInt8(v) => {
                if let Some(x) = as_u64 {
                    v.push(x as u8)
                }
            }
            VectorColumn::UInt16(v) => {
                if let Some(x) = as_u64 {
                    v.push(x as u16)
                }
            }
            VectorColumn::UInt32(v) => {
                if let Some(x) = as_u64 {
                    v.push(x as u32)
                }
            }
            VectorColumn::UInt64(v) => {
                if let Some(x) = as_u64 {
                    v.push(x)
                }
            }
            VectorColumn::Int8(v) => {
                if let Some(x) = as_i64 {
                    v.push(x as i8)
                }
            }
            VectorColumn::Int16(v) => {
                if let Some(x) = as_i64 {
                    v.push(x as i16)
                }
            }
            VectorColumn::Int32(v) => {
                if let Some(x) = as_i64 {
                    v.push(x as i32)
                }
            }
            VectorColumn::Int64(v) => {
                if let Some(x) = as_i64 {
                    v.push(x)
                }
            }
            VectorColumn::Float32(v) => {
                if let Some(x) = as_f64 {
                    v.push(x as f32)
                }
            }
            VectorColumn::Float64(v) => {
                if let Some(x) = as_f64 {
                    v.push(x)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::{NumberKind, VectorColumn};

    fn part(name: &str) -> PartId {
        PartId(name.to_owned())
    }

    #[test]
    fn in_memory_storage_reads_requested_mark_ranges_only() {
        let mut storage = InMemoryPartStorage::new();
        let column = Column::Vector(VectorColumn::UInt32((0..100).collect()));
        storage.add_column(&part("p0"), "x", Type::Number(NumberKind::UInt32), column, 10);

        assert_eq!(storage.mark_count(&part("p0"), "x").unwrap(), 10);

        let read = storage.read_column(&part("p0"), "x", &[MarkRange::new(2, 4)]).unwrap();
        assert_eq!(read, Column::Vector(VectorColumn::UInt32((20..40).collect())));
    }

    #[test]
    fn in_memory_storage_concatenates_multiple_ranges_in_order() {
        let mut storage = InMemoryPartStorage::new();
        let column = Column::Vector(VectorColumn::UInt32((0..30).collect()));
        storage.add_column(&part("p0"), "x", Type::Number(NumberKind::UInt32), column, 10);

        let read = storage
            .read_column(&part("p0"), "x", &[MarkRange::new(0, 1), MarkRange::new(2, 3)])
            .unwrap();
        let expected: Vec<u32> = (0..10).chain(20..30).collect();
        assert_eq!(read, Column::Vector(VectorColumn::UInt32(expected)));
    }

    #[test]
    fn unknown_column_is_a_logic_error_not_a_panic() {
        let storage = InMemoryPartStorage::new();
        assert!(storage.read_column(&part("p0"), "missing", &[]).is_err());
    }

    #[test]
    fn flat_file_storage_round_trips_marks_and_values() {
        let dir = std::env::temp_dir().join(format!("crucible-mergetree-test-{}-a", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let storage = FlatFilePartStorage::new(&dir);
        let column = Column::Vector(VectorColumn::UInt32((0..25).collect()));
        storage
            .write_column(&part("p0"), "x", &Type::Number(NumberKind::UInt32), &column, 10)
            .unwrap();
        assert_eq!(storage.mark_count(&part("p0"), "x").unwrap(), 3);

        let read = storage.read_column(&part("p0"), "x", &[MarkRange::new(1, 3)]).unwrap();
        let expected: Vec<u32> = (10..25).collect();
        assert_eq!(read, Column::Vector(VectorColumn::UInt32(expected)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
