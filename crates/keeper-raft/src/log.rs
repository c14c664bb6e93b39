//! Segmented, CRC-guarded log storage (§4.5.6, §6 "Persistent layout
//! (Keeper)"): files named `log_<first_idx>_<last_idx>`, each record
//! `(idx: u64, term: u64, type: u8, payload_len: u32, payload)` followed
//! by a CRC32 of everything before it. `crc32fast` is a targeted import
//! for this layer — the teacher has no on-disk log format of its own to
//! adapt here.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};

pub const RECORD_TYPE_NORMAL: u8 = 0;
pub const RECORD_TYPE_CONF_CHANGE: u8 = 1;

/// How the log writer acknowledges a write back to the Raft driver.
/// `FSYNC_PARALLEL` (§4.5.6) lets the leader pipeline proposals by
/// notifying completion once the fsync has been queued rather than
/// waiting for it to land, at the cost of losing unacknowledged entries
/// on a crash between notify and fsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// fsync before acknowledging every append.
    Sync,
    /// Acknowledge immediately; fsync happens on a best-effort basis.
    FsyncParallel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub idx: u64,
    pub term: u64,
    pub record_type: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checksum mismatch in log record at offset {0}")]
    ChecksumMismatch(usize),
    #[error("truncated log record")]
    Truncated,
}

fn encode_record(buf: &mut BytesMut, record: &LogRecord) {
    let start = buf.len();
    buf.put_u64_le(record.idx);
    buf.put_u64_le(record.term);
    buf.put_u8(record.record_type);
    buf.put_u32_le(record.payload.len() as u32);
    buf.put_slice(&record.payload);
    let crc = crc32fast::hash(&buf[start..]);
    buf.put_u32_le(crc);
}

fn decode_record(cursor: &mut impl Buf, base_offset: usize) -> Result<LogRecord, LogError> {
    if cursor.remaining() < 8 + 8 + 1 + 4 {
        return Err(LogError::Truncated);
    }
    let idx = cursor.get_u64_le();
    let term = cursor.get_u64_le();
    let record_type = cursor.get_u8();
    let len = cursor.get_u32_le() as usize;
    if cursor.remaining() < len + 4 {
        return Err(LogError::Truncated);
    }
    let mut payload = vec![0u8; len];
    // Compute the CRC over everything written before the trailing CRC
    // field; re-serialize the header bytes we just consumed rather than
    // reaching back into the original buffer (simpler than tracking a
    // byte range across `Buf` calls).
    let mut header = BytesMut::with_capacity(8 + 8 + 1 + 4);
    header.put_u64_le(idx);
    header.put_u64_le(term);
    header.put_u8(record_type);
    header.put_u32_le(len as u32);
    cursor.copy_to_slice(&mut payload);
    let expected_crc = cursor.get_u32_le();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header);
    hasher.update(&payload);
    let actual_crc = hasher.finalize();
    if actual_crc != expected_crc {
        return Err(LogError::ChecksumMismatch(base_offset));
    }
    Ok(LogRecord { idx, term, record_type, payload })
}

/// One append-only segment file, `log_<first_idx>_<last_idx>` on disk.
pub struct Segment {
    pub path: PathBuf,
    pub first_idx: u64,
    pub last_idx: u64,
    file: File,
    policy: FsyncPolicy,
}

impl Segment {
    pub fn create(dir: &Path, first_idx: u64, policy: FsyncPolicy) -> Result<Self, LogError> {
        let path = dir.join(format!("log_{first_idx}_{first_idx}"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Segment { path, first_idx, last_idx: first_idx, file, policy })
    }

    pub fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let mut buf = BytesMut::new();
        encode_record(&mut buf, record);
        self.file.write_all(&buf)?;
        match self.policy {
            FsyncPolicy::Sync => self.file.sync_data()?,
            FsyncPolicy::FsyncParallel => {
                let _ = self.file.sync_data();
            }
        }
        self.last_idx = record.idx;
        Ok(())
    }

    /// Renames the segment file on disk so its name reflects the final
    /// `last_idx` once the segment is sealed (rotated out).
    pub fn seal(&mut self, dir: &Path) -> Result<(), LogError> {
        let sealed_path = dir.join(format!("log_{}_{}", self.first_idx, self.last_idx));
        if sealed_path != self.path {
            fs::rename(&self.path, &sealed_path)?;
            self.path = sealed_path;
        }
        Ok(())
    }

    pub fn read_all(path: &Path) -> Result<Vec<LogRecord>, LogError> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let mut cursor = std::io::Cursor::new(bytes);
        let mut records = Vec::new();
        let mut offset = 0;
        while cursor.has_remaining() {
            let remaining_before = cursor.remaining();
            records.push(decode_record(&mut cursor, offset)?);
            offset += remaining_before - cursor.remaining();
        }
        Ok(records)
    }
}

/// Scans `dir` for `log_<first>_<last>` segment files, returning them
/// sorted by `first_idx`, for startup replay.
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>, LogError> {
    let mut segments: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let rest = name.strip_prefix("log_")?;
            let first = rest.split('_').next()?.parse::<u64>().ok()?;
            Some((first, e.path()))
        })
        .collect();
    segments.sort_by_key(|(first, _)| *first);
    Ok(segments.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_all_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::create(dir.path(), 1, FsyncPolicy::Sync).unwrap();
        segment
            .append(&LogRecord { idx: 1, term: 1, record_type: RECORD_TYPE_NORMAL, payload: b"one".to_vec() })
            .unwrap();
        segment
            .append(&LogRecord { idx: 2, term: 1, record_type: RECORD_TYPE_NORMAL, payload: b"two".to_vec() })
            .unwrap();
        segment.seal(dir.path()).unwrap();

        let records = Segment::read_all(&segment.path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, b"two");
        assert_eq!(segment.path.file_name().unwrap().to_str().unwrap(), "log_1_2");
    }

    #[test]
    fn corrupted_record_is_detected_by_crc() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::create(dir.path(), 1, FsyncPolicy::Sync).unwrap();
        segment
            .append(&LogRecord { idx: 1, term: 1, record_type: RECORD_TYPE_NORMAL, payload: b"one".to_vec() })
            .unwrap();
        let mut bytes = fs::read(&segment.path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&segment.path, bytes).unwrap();
        assert!(matches!(Segment::read_all(&segment.path), Err(LogError::ChecksumMismatch(_))));
    }
}
