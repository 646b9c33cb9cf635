//! Store types

use crate::error::{Result, SymbolStoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A symbol table as produced by the symbolication side
///
/// `addrs` holds sorted code addresses, `index[i]..index[i + 1]` is the byte
/// range of the i-th name inside `buffer`. The store does not interpret any
/// of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub addrs: Vec<u32>,
    pub index: Vec<u32>,
    pub buffer: Vec<u8>,
}

impl SymbolTable {
    pub fn new(addrs: Vec<u32>, index: Vec<u32>, buffer: Vec<u8>) -> Self {
        Self {
            addrs,
            index,
            buffer,
        }
    }

    /// Total payload size in bytes
    pub fn byte_len(&self) -> usize {
        (self.addrs.len() + self.index.len()) * 4 + self.buffer.len()
    }
}

/// Pack a u32 array as little-endian bytes
pub(crate) fn pack_u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn unpack_u32s(column: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(SymbolStoreError::corrupt(format!(
            "{} blob length {} is not a multiple of 4",
            column,
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Symbol table row as stored
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SymbolTableRow {
    pub insertion_order: i64,
    pub addrs: Vec<u8>,
    pub idx: Vec<u8>,
    pub buffer: Vec<u8>,
}

impl SymbolTableRow {
    pub fn to_symbol_table(&self) -> Result<SymbolTable> {
        Ok(SymbolTable {
            addrs: unpack_u32s("addrs", &self.addrs)?,
            index: unpack_u32s("idx", &self.idx)?,
            buffer: self.buffer.clone(),
        })
    }
}

/// Statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Physical connection opens over the lifetime of this handle
    pub opens: u64,
    pub last_age_sweep_at: Option<DateTime<Utc>>,
    pub last_count_sweep_at: Option<DateTime<Utc>>,
}

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_u32s() {
        let values = vec![0, 1, 0xdead_beef, u32::MAX];
        let packed = pack_u32s(&values);
        assert_eq!(packed.len(), 16);
        assert_eq!(&packed[8..12], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(unpack_u32s("addrs", &packed).unwrap(), values);
    }

    #[test]
    fn test_unpack_rejects_truncated_blob() {
        let err = unpack_u32s("idx", &[1, 2, 3]).unwrap_err();
        assert!(err.is_storage());
        assert!(err.to_string().contains("idx"));
    }

    #[test]
    fn test_row_into_symbol_table() {
        let row = SymbolTableRow {
            insertion_order: 7,
            addrs: pack_u32s(&[0x1000, 0x2000]),
            idx: pack_u32s(&[0, 4, 8]),
            buffer: b"mainexit".to_vec(),
        };
        let table = row.to_symbol_table().unwrap();
        assert_eq!(table.addrs, vec![0x1000, 0x2000]);
        assert_eq!(table.index, vec![0, 4, 8]);
        assert_eq!(table.buffer, b"mainexit");
        assert_eq!(table.byte_len(), 28);
    }

    #[test]
    fn test_store_stats_default() {
        let stats = StoreStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.opens, 0);
        assert!(stats.last_age_sweep_at.is_none());
    }

    #[test]
    fn test_symbol_table_serialization() {
        let table = SymbolTable::new(vec![16], vec![0, 3], b"foo".to_vec());
        let json = serde_json::to_string(&table).unwrap();
        let back: SymbolTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_millis_conversion() {
        let t = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(to_millis(t), 1_700_000_000_123);
    }
}
