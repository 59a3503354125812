//! The `#~` stream: header, row counts and generic row storage.
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Reserved (0)
//! 4       1     MajorVersion
//! 5       1     MinorVersion
//! 6       1     HeapSizes
//! 7       1     Reserved (1)
//! 8       8     Valid
//! 16      8     Sorted
//! 24      4*n   Rows, one per bit set in Valid
//! ...     4     Extra data, only when HeapSizes has bit 0x40 set
//! ...           Table rows
//! ```

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{push_le, push_le_dyn, read_le_at, read_le_at_dyn},
    metadata::tables::{
        schema::{columns, row_size},
        TableId, TableInfo,
    },
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// `HeapSizes` bit for a 4-byte `#Strings` index
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// `HeapSizes` bit for a 4-byte `#GUID` index
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// `HeapSizes` bit for a 4-byte `#Blob` index
pub const HEAP_LARGE_BLOB: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

/// Decoded rows of one table, one `u32` per column.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRows {
    columns: usize,
    values: Vec<u32>,
}

impl TableRows {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.columns == 0 {
            0
        } else {
            self.values.len() / self.columns
        }
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column values of the 0-based row `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[u32]> {
        let start = index.checked_mul(self.columns)?;
        self.values.get(start..start + self.columns)
    }

    /// Mutable column values of the 0-based row `index`.
    pub fn row_mut(&mut self, index: usize) -> Option<&mut [u32]> {
        let start = index.checked_mul(self.columns)?;
        self.values.get_mut(start..start + self.columns)
    }

    /// Row by 1-based metadata row id.
    #[must_use]
    pub fn rid(&self, rid: u32) -> Option<&[u32]> {
        self.row((rid as usize).checked_sub(1)?)
    }

    /// Iterate over all rows.
    pub fn iter(&self) -> impl Iterator<Item = &[u32]> {
        self.values.chunks_exact(self.columns.max(1))
    }
}

/// The parsed `#~` stream with every table decoded.
#[derive(Clone, Debug)]
pub struct TablesHeader {
    /// Major version of the table schema
    pub major_version: u8,
    /// Minor version of the table schema
    pub minor_version: u8,
    /// `HeapSizes` flags the rows were decoded with
    pub heap_sizes: u8,
    /// Bit vector of sorted tables
    pub sorted: u64,
    extra_data: Option<u32>,
    tables: Vec<Option<TableRows>>,
}

impl TablesHeader {
    /// Decode the `#~` stream in `data`.
    ///
    /// # Errors
    /// Returns an error for truncated data or [`crate::Error::NotSupported`] if the stream uses
    /// tables beyond `GenericParamConstraint`.
    pub fn read(data: &[u8]) -> Result<TablesHeader> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let mut offset = 4;
        let major_version = read_le_at::<u8>(data, &mut offset)?;
        let minor_version = read_le_at::<u8>(data, &mut offset)?;
        let heap_sizes = read_le_at::<u8>(data, &mut offset)?;
        offset += 1;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let sorted = read_le_at::<u64>(data, &mut offset)?;

        if valid >> (TableId::MAX + 1) != 0 {
            return Err(NotSupported(format!(
                "tables stream declares unknown tables - {valid:#x}"
            )));
        }

        let mut row_counts = vec![0_u32; TableId::COUNT];
        for table_id in TableId::iter() {
            if valid & (1 << table_id as u64) != 0 {
                row_counts[table_id as usize] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        let extra_data = if heap_sizes & HEAP_EXTRA_DATA != 0 {
            Some(read_le_at::<u32>(data, &mut offset)?)
        } else {
            None
        };

        let info = TableInfo::new(&row_counts, heap_sizes);
        let mut tables = vec![None; TableId::COUNT];
        for table_id in TableId::iter() {
            if valid & (1 << table_id as u64) == 0 {
                continue;
            }

            let schema = columns(table_id);
            let count = row_counts[table_id as usize] as usize;
            let needed = count
                .checked_mul(row_size(table_id, &info))
                .ok_or(OutOfBounds)?;
            if offset.checked_add(needed).map_or(true, |end| end > data.len()) {
                return Err(malformed_error!(
                    "Table {:?} with {} rows exceeds the tables stream",
                    table_id,
                    count
                ));
            }

            let mut values = Vec::with_capacity(count * schema.len());
            for _ in 0..count {
                for column in schema {
                    values.push(read_le_at_dyn(data, &mut offset, column.size(&info) == 4)?);
                }
            }

            tables[table_id as usize] = Some(TableRows {
                columns: schema.len(),
                values,
            });
        }

        Ok(TablesHeader {
            major_version,
            minor_version,
            heap_sizes,
            sorted,
            extra_data,
            tables,
        })
    }

    /// Rows of `table`, if the table is present.
    #[must_use]
    pub fn table(&self, table: TableId) -> Option<&TableRows> {
        self.tables[table as usize].as_ref()
    }

    /// Mutable rows of `table`, if the table is present.
    pub fn table_mut(&mut self, table: TableId) -> Option<&mut TableRows> {
        self.tables[table as usize].as_mut()
    }

    /// Number of rows in `table`, 0 when absent.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.table(table)
            .and_then(|rows| u32::try_from(rows.len()).ok())
            .unwrap_or(0)
    }

    /// Index widths currently in effect.
    #[must_use]
    pub fn info(&self) -> TableInfo {
        TableInfo::new(&self.row_counts(), self.heap_sizes)
    }

    fn row_counts(&self) -> Vec<u32> {
        TableId::iter().map(|table| self.rows(table)).collect()
    }

    /// Encode the stream with the heap index widths given by `heap_sizes`.
    ///
    /// # Errors
    /// Returns an error if a value does not fit its column under the new widths.
    pub fn write(&self, heap_sizes: u8) -> Result<Vec<u8>> {
        let row_counts = self.row_counts();
        let info = TableInfo::new(&row_counts, heap_sizes);

        let mut valid = 0_u64;
        for table_id in TableId::iter() {
            if self.table(table_id).is_some() {
                valid |= 1 << table_id as u64;
            }
        }

        let mut buffer = Vec::new();
        push_le::<u32>(&mut buffer, 0);
        push_le::<u8>(&mut buffer, self.major_version);
        push_le::<u8>(&mut buffer, self.minor_version);
        push_le::<u8>(&mut buffer, heap_sizes);
        push_le::<u8>(&mut buffer, 1);
        push_le::<u64>(&mut buffer, valid);
        push_le::<u64>(&mut buffer, self.sorted);

        for table_id in TableId::iter() {
            if self.table(table_id).is_some() {
                push_le::<u32>(&mut buffer, row_counts[table_id as usize]);
            }
        }

        if let Some(extra_data) = self.extra_data {
            push_le::<u32>(&mut buffer, extra_data);
        }

        for table_id in TableId::iter() {
            let Some(rows) = self.table(table_id) else {
                continue;
            };

            let schema = columns(table_id);
            for row in rows.iter() {
                for (column, value) in schema.iter().zip(row) {
                    if push_le_dyn(&mut buffer, *value, column.size(&info) == 4).is_err() {
                        return Err(malformed_error!(
                            "Value {:#x} does not fit a {:?} column of {:?}",
                            value,
                            column,
                            table_id
                        ));
                    }
                }
            }
        }

        while buffer.len() % 4 != 0 {
            buffer.push(0);
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const TABLES: [u8; 64] = [
        0x00, 0x00, 0x00, 0x00, // reserved
        0x02, 0x00,             // version 2.0
        0x00,                   // heap sizes
        0x01,                   // reserved
        0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, // valid: Module, Assembly
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // sorted
        0x01, 0x00, 0x00, 0x00, // Module rows
        0x01, 0x00, 0x00, 0x00, // Assembly rows
        // Module: Generation, Name, Mvid, EncId, EncBaseId
        0x00, 0x00, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
        // Assembly: HashAlgId, version 1.2.3.4, Flags, PublicKey, Name, Culture
        0x04, 0x80, 0x00, 0x00,
        0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x12, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn read_rows() {
        let header = TablesHeader::read(&TABLES).unwrap();
        assert_eq!(header.major_version, 2);
        assert_eq!(header.rows(TableId::Module), 1);
        assert_eq!(header.rows(TableId::TypeDef), 0);
        assert!(header.table(TableId::TypeDef).is_none());

        let assembly = header.table(TableId::Assembly).unwrap();
        assert_eq!(assembly.len(), 1);
        assert_eq!(
            assembly.rid(1).unwrap(),
            &[0x8004, 1, 2, 3, 4, 0, 0, 0x12, 0]
        );
        assert!(assembly.rid(0).is_none());
        assert!(assembly.rid(2).is_none());
    }

    #[test]
    fn write_identical() {
        let header = TablesHeader::read(&TABLES).unwrap();
        let written = header.write(header.heap_sizes).unwrap();
        assert_eq!(written, TABLES);
    }

    #[test]
    fn write_wide_strings() {
        let mut header = TablesHeader::read(&TABLES).unwrap();
        header
            .table_mut(TableId::Assembly)
            .unwrap()
            .row_mut(0)
            .unwrap()[7] = 0x1_2345;

        assert!(header.write(0).is_err());

        let written = header.write(HEAP_LARGE_STRINGS).unwrap();
        let reread = TablesHeader::read(&written).unwrap();
        assert_eq!(reread.heap_sizes, HEAP_LARGE_STRINGS);
        assert_eq!(reread.table(TableId::Assembly).unwrap().rid(1).unwrap()[7], 0x1_2345);
        assert_eq!(reread.table(TableId::Module).unwrap().rid(1).unwrap()[1], 0x0A);
    }

    #[test]
    fn truncated_stream() {
        assert!(TablesHeader::read(&TABLES[..40]).is_err());
        assert!(TablesHeader::read(&TABLES[..10]).is_err());
    }

    #[test]
    fn unknown_tables() {
        let mut data = TABLES;
        data[14] = 0x01; // bit 0x30
        assert!(matches!(TablesHeader::read(&data), Err(NotSupported(_))));
    }
}
