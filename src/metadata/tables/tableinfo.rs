use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::tables::{CodedIndexType, TableId};

/// Row count of a single table and the number of bits needed to index it.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Bits required to address every row
    pub bits: u8,
}

impl TableRowInfo {
    /// Compute the index width for a table with `rows` rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            // Safe: 32 - zeros is always <= 32, fits in u8
            (32 - rows.leading_zeros()) as u8
        };

        Self { rows, bits }
    }
}

/// Index widths of every column kind, derived from row counts and the heap size flags.
///
/// Simple table indices are 2 bytes unless the table has more than 0xFFFF rows; coded indices
/// are 2 bytes unless the largest referenced table needs more than `16 - tag bits` bits; heap
/// indices are 4 bytes when the matching `HeapSizes` flag is set.
#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
}

impl TableInfo {
    /// Build the index widths from per-table row counts and the `HeapSizes` byte.
    #[must_use]
    pub fn new(row_counts: &[u32], heap_sizes: u8) -> Self {
        let mut rows = vec![TableRowInfo::default(); TableId::COUNT];
        for table_id in TableId::iter() {
            if let Some(count) = row_counts.get(table_id as usize) {
                rows[table_id as usize] = TableRowInfo::new(*count);
            }
        }

        let mut table_info = TableInfo {
            rows,
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: heap_sizes & 1 == 1,
            is_large_index_guid: heap_sizes & 2 == 2,
            is_large_index_blob: heap_sizes & 4 == 4,
        };

        table_info.calculate_coded_index_bits();
        table_info
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// Size in bytes of a `#Strings` heap index.
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.is_large_index_str {
            4
        } else {
            2
        }
    }

    /// Size in bytes of a `#GUID` heap index.
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.is_large_index_guid {
            4
        } else {
            2
        }
    }

    /// Size in bytes of a `#Blob` heap index.
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.is_large_index_blob {
            4
        } else {
            2
        }
    }

    /// Size in bytes of a simple index into `table_id`.
    #[must_use]
    pub fn table_index_bytes(&self, table_id: TableId) -> u8 {
        if self.rows[table_id as usize].bits > 16 {
            4
        } else {
            2
        }
    }

    /// Size in bytes of a coded index of kind `coded_index_type`.
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        if self.coded_indexes[coded_index_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);

            self.coded_indexes[coded_index as usize] = max_bits + coded_index.tag_bits();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(tables: &[(TableId, u32)]) -> Vec<u32> {
        let mut counts = vec![0; TableId::COUNT];
        for (table, rows) in tables {
            counts[*table as usize] = *rows;
        }
        counts
    }

    #[test]
    fn small_tables() {
        let info = TableInfo::new(&counts(&[(TableId::TypeRef, 10), (TableId::MemberRef, 20)]), 0);

        assert_eq!(info.rows(TableId::TypeRef), 10);
        assert_eq!(info.str_bytes(), 2);
        assert_eq!(info.blob_bytes(), 2);
        assert_eq!(info.table_index_bytes(TableId::TypeRef), 2);
        assert_eq!(info.coded_index_bytes(CodedIndexType::HasCustomAttribute), 2);
    }

    #[test]
    fn heap_flags() {
        let info = TableInfo::new(&[], 0x07);
        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.guid_bytes(), 4);
        assert_eq!(info.blob_bytes(), 4);

        let info = TableInfo::new(&[], 0x04);
        assert_eq!(info.str_bytes(), 2);
        assert_eq!(info.blob_bytes(), 4);
    }

    #[test]
    fn coded_index_thresholds() {
        // HasCustomAttribute uses 5 tag bits: 2^11 rows is the first count needing 4 bytes
        let info = TableInfo::new(&counts(&[(TableId::MethodDef, 0x7FF)]), 0);
        assert_eq!(info.coded_index_bytes(CodedIndexType::HasCustomAttribute), 2);

        let info = TableInfo::new(&counts(&[(TableId::MethodDef, 0x800)]), 0);
        assert_eq!(info.coded_index_bytes(CodedIndexType::HasCustomAttribute), 4);
        assert_eq!(info.coded_index_bytes(CodedIndexType::MethodDefOrRef), 2);
        assert_eq!(info.table_index_bytes(TableId::MethodDef), 2);

        let info = TableInfo::new(&counts(&[(TableId::MethodDef, 0x1_0000)]), 0);
        assert_eq!(info.table_index_bytes(TableId::MethodDef), 4);
    }
}
