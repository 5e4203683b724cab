//! Commit-log record types and framing.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;

/// Magic bytes identifying a commit-log frame.
pub const LOG_MAGIC: [u8; 4] = *b"RMKV";

/// Current commit-log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type tag of a commit-log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A bucket was created.
    CreateBucket = 1,
    /// A bucket and all of its entries were removed.
    DeleteBucket = 2,
    /// A key was written.
    Put = 3,
    /// A key was removed.
    Delete = 4,
    /// A bucket's sequence counter moved.
    SetSequence = 5,
    /// Everything since the previous commit is durable.
    Commit = 6,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateBucket),
            2 => Some(Self::DeleteBucket),
            3 => Some(Self::Put),
            4 => Some(Self::Delete),
            5 => Some(Self::SetSequence),
            6 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One mutation (or commit marker) in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A bucket was created.
    CreateBucket {
        /// Bucket name.
        bucket: String,
    },
    /// A bucket was removed.
    DeleteBucket {
        /// Bucket name.
        bucket: String,
    },
    /// A key was written.
    Put {
        /// Bucket name.
        bucket: String,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// A key was removed.
    Delete {
        /// Bucket name.
        bucket: String,
        /// Key bytes.
        key: Vec<u8>,
    },
    /// A bucket's sequence counter was set.
    SetSequence {
        /// Bucket name.
        bucket: String,
        /// New counter value.
        sequence: u64,
    },
    /// Commit marker.
    Commit {
        /// Committing transaction.
        txid: TransactionId,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::CreateBucket { .. } => LogRecordType::CreateBucket,
            Self::DeleteBucket { .. } => LogRecordType::DeleteBucket,
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::SetSequence { .. } => LogRecordType::SetSequence,
            Self::Commit { .. } => LogRecordType::Commit,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a length does not fit the 4-byte length prefix.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::CreateBucket { bucket } | Self::DeleteBucket { bucket } => {
                put_bytes(&mut buf, bucket.as_bytes())?;
            }
            Self::Put { bucket, key, value } => {
                put_bytes(&mut buf, bucket.as_bytes())?;
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
            Self::Delete { bucket, key } => {
                put_bytes(&mut buf, bucket.as_bytes())?;
                put_bytes(&mut buf, key)?;
            }
            Self::SetSequence { bucket, sequence } => {
                put_bytes(&mut buf, bucket.as_bytes())?;
                buf.extend_from_slice(&sequence.to_le_bytes());
            }
            Self::Commit { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload. `offset` is only
    /// used in error messages.
    pub fn decode_payload(
        record_type: LogRecordType,
        payload: &[u8],
        offset: u64,
    ) -> CoreResult<Self> {
        let mut reader = PayloadReader {
            payload,
            cursor: 0,
            offset,
        };

        let record = match record_type {
            LogRecordType::CreateBucket => Self::CreateBucket {
                bucket: reader.string()?,
            },
            LogRecordType::DeleteBucket => Self::DeleteBucket {
                bucket: reader.string()?,
            },
            LogRecordType::Put => Self::Put {
                bucket: reader.string()?,
                key: reader.bytes()?,
                value: reader.bytes()?,
            },
            LogRecordType::Delete => Self::Delete {
                bucket: reader.string()?,
                key: reader.bytes()?,
            },
            LogRecordType::SetSequence => Self::SetSequence {
                bucket: reader.string()?,
                sequence: reader.u64()?,
            },
            LogRecordType::Commit => Self::Commit {
                txid: TransactionId::new(reader.u64()?),
            },
        };

        if reader.cursor != payload.len() {
            return Err(CoreError::log_corruption(
                offset,
                format!(
                    "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                    reader.cursor,
                    payload.len()
                ),
            ));
        }
        Ok(record)
    }

    /// Encodes the record with its envelope:
    /// `magic | version | type | len | payload | crc32`.
    pub fn encode_frame(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("log record payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.push(self.record_type().as_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CoreError::invalid_operation("log field longer than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
    offset: u64,
}

impl PayloadReader<'_> {
    fn take(&mut self, n: usize) -> CoreResult<&[u8]> {
        let end = self
            .cursor
            .checked_add(n)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| CoreError::log_corruption(self.offset, "unexpected end of payload"))?;
        let slice = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let offset = self.offset;
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| CoreError::log_corruption(offset, "invalid u32"))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let offset = self.offset;
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CoreError::log_corruption(offset, "invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> CoreResult<String> {
        let offset = self.offset;
        String::from_utf8(self.bytes()?)
            .map_err(|_| CoreError::log_corruption(offset, "bucket name is not UTF-8"))
    }
}

/// Computes CRC32 checksum for data (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
