//! Append-only commit log.

use crate::error::{CoreError, CoreResult};
use crate::kv::record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use crate::types::TransactionId;
use roomdb_storage::StorageBackend;

/// Summary of a log replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of committed batches applied.
    pub committed: u64,
    /// Highest transaction id seen in a commit marker.
    pub last_txid: Option<TransactionId>,
    /// Bytes discarded from the tail (torn frame or uncommitted batch).
    pub truncated_bytes: u64,
}

/// Writes committed batches to a storage backend and replays them on open.
pub struct CommitLog {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl CommitLog {
    /// Creates a commit log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Appends `records` followed by a commit marker for `txid`, then
    /// flushes (or syncs) the backend.
    ///
    /// On failure the log is cut back to its previous length, so a failed
    /// commit never leaves a half-written batch in front of later ones.
    pub fn append_batch(&mut self, records: &[LogRecord], txid: TransactionId) -> CoreResult<()> {
        let mut buf = Vec::new();
        for record in records {
            buf.extend_from_slice(&record.encode_frame()?);
        }
        buf.extend_from_slice(&LogRecord::Commit { txid }.encode_frame()?);

        let start = self.backend.size()?;
        let result = self.write_durably(&buf);
        if result.is_err() {
            let _ = self.backend.truncate(start);
        }
        result
    }

    fn write_durably(&mut self, buf: &[u8]) -> CoreResult<()> {
        self.backend.append(buf)?;
        if self.sync_on_commit {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        Ok(())
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Replays every committed batch in log order, handing each to `apply`
    /// along with the offset of its first frame.
    ///
    /// A torn trailing frame and any records after the last commit marker
    /// are discarded and the log is truncated to the end of the last commit.
    ///
    /// # Errors
    ///
    /// Bad magic, an unsupported format version, an unknown record type or a
    /// checksum mismatch on a complete frame is fatal.
    pub fn replay<F>(&mut self, mut apply: F) -> CoreResult<ReplayStats>
    where
        F: FnMut(u64, Vec<LogRecord>) -> CoreResult<()>,
    {
        let data = self.backend.read_all()?;
        let mut stats = ReplayStats::default();
        let mut pending = Vec::new();
        let mut pos = 0usize;
        let mut committed_end = 0usize;

        while let Some((record, frame_len)) = read_frame(&data, pos)? {
            pos += frame_len;
            match record {
                LogRecord::Commit { txid } => {
                    apply(committed_end as u64, std::mem::take(&mut pending))?;
                    stats.committed += 1;
                    stats.last_txid = Some(stats.last_txid.map_or(txid, |t| t.max(txid)));
                    committed_end = pos;
                }
                other => pending.push(other),
            }
        }

        if committed_end < data.len() {
            stats.truncated_bytes = (data.len() - committed_end) as u64;
            tracing::warn!(
                offset = committed_end,
                discarded = stats.truncated_bytes,
                "discarding uncommitted commit-log tail"
            );
            self.backend.truncate(committed_end as u64)?;
        }

        Ok(stats)
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

/// Reads one frame at `pos`. `Ok(None)` means end of log or a torn frame.
fn read_frame(data: &[u8], pos: usize) -> CoreResult<Option<(LogRecord, usize)>> {
    let offset = pos as u64;
    let remaining = &data[pos.min(data.len())..];
    if remaining.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = &remaining[..HEADER_SIZE];
    if header[0..4] != LOG_MAGIC {
        return Err(CoreError::log_corruption(offset, "invalid magic"));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > LOG_VERSION {
        return Err(CoreError::log_corruption(
            offset,
            format!("unsupported format version {version}"),
        ));
    }

    let type_byte = header[6];
    let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
        CoreError::log_corruption(offset, format!("unknown record type {type_byte}"))
    })?;

    let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
    let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
    if remaining.len() < total_len {
        return Ok(None);
    }

    let body_end = HEADER_SIZE + payload_len;
    let stored_crc = u32::from_le_bytes([
        remaining[body_end],
        remaining[body_end + 1],
        remaining[body_end + 2],
        remaining[body_end + 3],
    ]);
    let computed_crc = compute_crc32(&remaining[..body_end]);
    if stored_crc != computed_crc {
        return Err(CoreError::ChecksumMismatch {
            offset,
            expected: stored_crc,
            actual: computed_crc,
        });
    }

    let record = LogRecord::decode_payload(record_type, &remaining[HEADER_SIZE..body_end], offset)?;
    Ok(Some((record, total_len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomdb_storage::InMemoryBackend;

    fn create_bucket(name: &str) -> LogRecord {
        LogRecord::CreateBucket {
            bucket: name.into(),
        }
    }

    fn replay_all(log: &mut CommitLog) -> (Vec<Vec<LogRecord>>, ReplayStats) {
        let mut batches = Vec::new();
        let stats = log
            .replay(|_, batch| {
                batches.push(batch);
                Ok(())
            })
            .unwrap();
        (batches, stats)
    }

    #[test]
    fn empty_log_replays_nothing() {
        let mut log = CommitLog::new(Box::new(InMemoryBackend::new()), true);
        let (batches, stats) = replay_all(&mut log);
        assert!(batches.is_empty());
        assert_eq!(stats, ReplayStats::default());
    }

    #[test]
    fn batches_replay_in_order() {
        let backend = InMemoryBackend::new();
        let mut log = CommitLog::new(Box::new(backend.clone()), true);
        log.append_batch(&[create_bucket("A")], TransactionId::new(1))
            .unwrap();
        log.append_batch(
            &[create_bucket("B"), create_bucket("C")],
            TransactionId::new(2),
        )
        .unwrap();

        let mut reopened = CommitLog::new(Box::new(backend), true);
        let (batches, stats) = replay_all(&mut reopened);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![create_bucket("A")]);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(stats.committed, 2);
        assert_eq!(stats.last_txid, Some(TransactionId::new(2)));
        assert_eq!(stats.truncated_bytes, 0);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let backend = InMemoryBackend::new();
        let mut log = CommitLog::new(Box::new(backend.clone()), true);
        log.append_batch(&[create_bucket("A")], TransactionId::new(1))
            .unwrap();
        let good_len = backend.data().len();

        // Half of a second batch made it to disk.
        let mut torn = create_bucket("B").encode_frame().unwrap();
        torn.truncate(torn.len() - 3);
        let mut damaged = backend.clone();
        damaged.append(&torn).unwrap();

        let mut reopened = CommitLog::new(Box::new(backend.clone()), true);
        let (batches, stats) = replay_all(&mut reopened);

        assert_eq!(batches.len(), 1);
        assert_eq!(stats.truncated_bytes, torn.len() as u64);
        assert_eq!(backend.data().len(), good_len);
    }

    #[test]
    fn uncommitted_complete_frames_are_discarded() {
        let mut data = create_bucket("A").encode_frame().unwrap();
        data.extend_from_slice(
            &LogRecord::Commit {
                txid: TransactionId::new(1),
            }
            .encode_frame()
            .unwrap(),
        );
        let committed_len = data.len();
        data.extend_from_slice(&create_bucket("orphan").encode_frame().unwrap());

        let backend = InMemoryBackend::with_data(data);
        let mut log = CommitLog::new(Box::new(backend.clone()), true);
        let (batches, _) = replay_all(&mut log);

        assert_eq!(batches, vec![vec![create_bucket("A")]]);
        assert_eq!(backend.data().len(), committed_len);
    }

    #[test]
    fn checksum_mismatch_is_fatal() {
        let mut data = create_bucket("A").encode_frame().unwrap();
        data[HEADER_SIZE + 4] ^= 0xFF;

        let mut log = CommitLog::new(Box::new(InMemoryBackend::with_data(data)), true);
        let result = log.replay(|_, _| Ok(()));
        assert!(matches!(
            result,
            Err(CoreError::ChecksumMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut data = create_bucket("A").encode_frame().unwrap();
        data[0] = b'X';

        let mut log = CommitLog::new(Box::new(InMemoryBackend::with_data(data)), true);
        assert!(matches!(
            log.replay(|_, _| Ok(())),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn newer_format_version_is_fatal() {
        let mut data = create_bucket("A").encode_frame().unwrap();
        data[4..6].copy_from_slice(&(LOG_VERSION + 1).to_le_bytes());

        let mut log = CommitLog::new(Box::new(InMemoryBackend::with_data(data)), true);
        assert!(matches!(
            log.replay(|_, _| Ok(())),
            Err(CoreError::LogCorruption { .. })
        ));
    }
}
