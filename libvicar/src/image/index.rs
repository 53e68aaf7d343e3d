use std::io::{Read, Seek, SeekFrom};
use tracing::{instrument, trace};

use crate::error::{CodecError, Error, GeometryError};

use super::layout::Compression;

/// Largest payload a compressed record may announce
const MAX_RECORD_PAYLOAD: u64 = 100_000_000;
/// Payloads up to this size are always plausible
const SMALL_RECORD_PAYLOAD: u64 = 1000;
const SIZE_FIELD_LEN: u64 = 4;

/// Where the size of each compressed record is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `BASIC`: a size field (payload plus the field itself) precedes every record
    InlineBeforeRecord,
    /// `BASIC2`: a table of payload sizes follows the label
    TableAfterLabel,
}

impl Placement {
    /// Size field placement used by a compression, if any
    #[must_use]
    pub const fn for_compression(compression: Compression) -> Option<Self> {
        match compression {
            Compression::None => None,
            Compression::Basic => Some(Self::InlineBeforeRecord),
            Compression::Basic2 => Some(Self::TableAfterLabel),
        }
    }
}

/// Position and value of the size field of a record being written, and
/// position of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSlot {
    /// Offset of the little-endian size field
    pub size_position: u64,
    /// Value to store in the size field
    pub size: u32,
    /// Offset of the encoded scanline
    pub payload_position: u64,
}

/// Offsets of the compressed records of a dataset
///
/// Record `band * height + row` starts at `offsets[record]`. Entries are only
/// known up to the high water mark: entry `i + 1` is derived from the size
/// field of record `i`, so the table grows sequentially and never shrinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIndex {
    placement: Placement,
    label_end: u64,
    scanline_size: u64,
    records: usize,
    offsets: Vec<u64>,
}

impl RecordIndex {
    fn new(
        placement: Placement,
        label_end: u64,
        records: usize,
        scanline_size: u64,
    ) -> Result<Self, GeometryError> {
        let first = match placement {
            Placement::InlineBeforeRecord => label_end.checked_add(SIZE_FIELD_LEN),
            Placement::TableAfterLabel => (records as u64)
                .checked_mul(SIZE_FIELD_LEN)
                .and_then(|table| label_end.checked_add(table)),
        }
        .ok_or(GeometryError::Overflow("first record offset"))?;
        let mut offsets = Vec::with_capacity(records.min(1 << 16) + 1);
        offsets.push(first);
        Ok(Self {
            placement,
            label_end,
            scanline_size,
            records,
            offsets,
        })
    }

    /// Creates the index of an existing dataset
    ///
    /// `label_end` is the offset of the first byte after the label (and any
    /// binary header records), `scanline_size` the decoded size of a record.
    ///
    /// # Errors
    ///
    /// Fails if the first record offset overflows
    pub fn for_reading(
        placement: Placement,
        label_end: u64,
        records: usize,
        scanline_size: u64,
    ) -> Result<Self, GeometryError> {
        Self::new(placement, label_end, records, scanline_size)
    }

    /// Creates an empty index for a dataset whose label is `label_size` bytes
    ///
    /// # Errors
    ///
    /// Fails if the first record offset overflows
    pub fn for_writing(
        placement: Placement,
        label_size: u64,
        records: usize,
        scanline_size: u64,
    ) -> Result<Self, GeometryError> {
        Self::new(placement, label_size, records, scanline_size)
    }

    /// Size field placement
    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    /// Number of records in the dataset
    #[must_use]
    pub const fn records(&self) -> usize {
        self.records
    }

    /// Number of records whose extent is known
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Known record offsets, the last one being the end of the last known record
    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    fn check_record(&self, record: usize) -> Result<(), CodecError> {
        if record >= self.records {
            return Err(CodecError::NoSuchRecord {
                record,
                records: self.records,
            });
        }
        Ok(())
    }

    fn size_position(&self, record: usize) -> Result<u64, GeometryError> {
        match self.placement {
            Placement::InlineBeforeRecord => Ok(self.offsets[record] - SIZE_FIELD_LEN),
            Placement::TableAfterLabel => (record as u64)
                .checked_mul(SIZE_FIELD_LEN)
                .and_then(|position| position.checked_add(self.label_end))
                .ok_or(GeometryError::Overflow("record size position")),
        }
    }

    /// Payload size announced by a size field, or an error if no valid record
    /// can have it
    fn payload_size(&self, record: usize, size: u32) -> Result<u64, CodecError> {
        let size = u64::from(size);
        let implausible = CodecError::ImplausibleRecordSize { record, size };
        let payload = match self.placement {
            Placement::InlineBeforeRecord if size <= SIZE_FIELD_LEN => return Err(implausible),
            Placement::InlineBeforeRecord => size - SIZE_FIELD_LEN,
            Placement::TableAfterLabel if size == 0 => return Err(implausible),
            Placement::TableAfterLabel => size,
        };
        if payload > MAX_RECORD_PAYLOAD
            || (payload > SMALL_RECORD_PAYLOAD && (payload - 11) / 4 > self.scanline_size)
        {
            return Err(implausible);
        }
        Ok(payload)
    }

    /// Makes sure the extent of `record` is known, reading the missing size
    /// fields in order
    ///
    /// Known records are returned without touching the stream.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and implausible size fields. Entries read before
    /// the failure stay valid.
    #[instrument(skip(self, stream), level = "trace")]
    pub fn ensure<R: Read + Seek>(&mut self, stream: &mut R, record: usize) -> Result<(), Error> {
        self.check_record(record)?;
        while self.high_water_mark() <= record {
            let i = self.high_water_mark();
            stream.seek(SeekFrom::Start(self.size_position(i)?))?;
            let mut field = [0; 4];
            stream.read_exact(&mut field)?;
            let size = u32::from_le_bytes(field);
            let payload = self.payload_size(i, size)?;
            let step = match self.placement {
                Placement::InlineBeforeRecord => payload + SIZE_FIELD_LEN,
                Placement::TableAfterLabel => payload,
            };
            let next = self.offsets[i]
                .checked_add(step)
                .ok_or(GeometryError::Overflow("record offset"))?;
            trace!("record {i}: {payload} bytes at {}", self.offsets[i]);
            self.offsets.push(next);
        }
        Ok(())
    }

    /// Offset and payload length of a record
    ///
    /// # Errors
    ///
    /// See [`Self::ensure`]
    pub fn record_span<R: Read + Seek>(
        &mut self,
        stream: &mut R,
        record: usize,
    ) -> Result<(u64, u64), Error> {
        self.ensure(stream, record)?;
        let start = self.offsets[record];
        let mut len = self.offsets[record + 1] - start;
        if self.placement == Placement::InlineBeforeRecord {
            len -= SIZE_FIELD_LEN;
        }
        Ok((start, len))
    }

    /// Reserves room for the next record of `coded_len` bytes
    ///
    /// # Errors
    ///
    /// Records must be appended in order: anything but the record at the
    /// high water mark is rejected.
    pub fn append(&mut self, record: usize, coded_len: usize) -> Result<RecordSlot, Error> {
        self.check_record(record)?;
        let expected = self.high_water_mark();
        if record != expected {
            return Err(CodecError::OutOfOrder {
                expected,
                requested: record,
            }
            .into());
        }
        let coded_len = coded_len as u64;
        let size = match self.placement {
            Placement::InlineBeforeRecord => coded_len + SIZE_FIELD_LEN,
            Placement::TableAfterLabel => coded_len,
        };
        let slot = RecordSlot {
            size_position: self.size_position(record)?,
            size: u32::try_from(size).map_err(|_| GeometryError::Overflow("record size"))?,
            payload_position: self.offsets[record],
        };
        let next = self.offsets[record]
            .checked_add(size)
            .ok_or(GeometryError::Overflow("record offset"))?;
        self.offsets.push(next);
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Seek, SeekFrom};

    /// Counts the reads issued to the wrapped stream
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        reads: usize,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    // 8 byte label, then BASIC records of 3, 5 and 2 payload bytes
    fn basic_file() -> CountingReader {
        let mut data = vec![b'L'; 8];
        for payload in [3u32, 5, 2] {
            data.extend((payload + 4).to_le_bytes());
            data.extend(std::iter::repeat(0xAA).take(payload as usize));
        }
        CountingReader {
            inner: Cursor::new(data),
            reads: 0,
        }
    }

    #[test]
    fn inline_sizes_are_read_lazily() {
        let mut file = basic_file();
        let mut index = RecordIndex::for_reading(Placement::InlineBeforeRecord, 8, 3, 16).unwrap();
        assert_eq!(index.high_water_mark(), 0);

        assert_eq!(index.record_span(&mut file, 1).unwrap(), (19, 5));
        assert_eq!(index.high_water_mark(), 2);
        assert_eq!(index.offsets(), [12, 19, 28]);

        let reads = file.reads;
        assert_eq!(index.record_span(&mut file, 0).unwrap(), (12, 3));
        index.ensure(&mut file, 1).unwrap();
        assert_eq!(file.reads, reads);

        assert_eq!(index.record_span(&mut file, 2).unwrap(), (28, 2));
        assert_eq!(index.offsets(), [12, 19, 28, 34]);
    }

    #[test]
    fn table_sizes_follow_the_label() {
        let mut data = vec![b'L'; 4];
        for size in [2u32, 6] {
            data.extend(size.to_le_bytes());
        }
        data.extend([1, 2, 3, 4, 5, 6, 7, 8]);
        let mut file = Cursor::new(data);
        let mut index = RecordIndex::for_reading(Placement::TableAfterLabel, 4, 2, 16).unwrap();
        assert_eq!(index.record_span(&mut file, 1).unwrap(), (14, 6));
        assert_eq!(index.record_span(&mut file, 0).unwrap(), (12, 2));
    }

    #[test]
    fn implausible_sizes_are_rejected() {
        let mut file = Cursor::new(vec![4, 0, 0, 0]);
        let mut index = RecordIndex::for_reading(Placement::InlineBeforeRecord, 0, 1, 16).unwrap();
        assert!(matches!(
            index.ensure(&mut file, 0),
            Err(Error::Codec(CodecError::ImplausibleRecordSize { record: 0, size: 4 }))
        ));

        let mut file = Cursor::new(0u32.to_le_bytes().to_vec());
        let mut index = RecordIndex::for_reading(Placement::TableAfterLabel, 0, 1, 16).unwrap();
        assert!(matches!(
            index.ensure(&mut file, 0),
            Err(Error::Codec(CodecError::ImplausibleRecordSize { record: 0, size: 0 }))
        ));

        let mut file = Cursor::new(2000u32.to_le_bytes().to_vec());
        let mut index = RecordIndex::for_reading(Placement::TableAfterLabel, 0, 1, 16).unwrap();
        assert!(matches!(
            index.ensure(&mut file, 0),
            Err(Error::Codec(CodecError::ImplausibleRecordSize { .. }))
        ));
        assert_eq!(index.high_water_mark(), 0);

        assert!(matches!(
            index.ensure(&mut file, 1),
            Err(Error::Codec(CodecError::NoSuchRecord { record: 1, records: 1 }))
        ));
    }

    #[test]
    fn truncated_stream_fails() {
        let mut file = Cursor::new(vec![9, 0]);
        let mut index = RecordIndex::for_reading(Placement::InlineBeforeRecord, 0, 1, 16).unwrap();
        assert!(matches!(index.ensure(&mut file, 0), Err(Error::Io(_))));
    }

    #[test]
    fn appends_must_be_sequential() {
        let mut index = RecordIndex::for_writing(Placement::InlineBeforeRecord, 10, 3, 4).unwrap();
        let slot = index.append(0, 3).unwrap();
        assert_eq!(
            slot,
            RecordSlot {
                size_position: 10,
                size: 7,
                payload_position: 14
            }
        );
        assert!(matches!(
            index.append(2, 3),
            Err(Error::Codec(CodecError::OutOfOrder {
                expected: 1,
                requested: 2
            }))
        ));
        assert!(matches!(
            index.append(0, 3),
            Err(Error::Codec(CodecError::OutOfOrder { .. }))
        ));
        let slot = index.append(1, 5).unwrap();
        assert_eq!(slot.size_position, 17);
        assert_eq!(slot.payload_position, 21);

        let mut index = RecordIndex::for_writing(Placement::TableAfterLabel, 10, 2, 4).unwrap();
        let slot = index.append(0, 3).unwrap();
        assert_eq!(
            slot,
            RecordSlot {
                size_position: 10,
                size: 3,
                payload_position: 18
            }
        );
        let slot = index.append(1, 4).unwrap();
        assert_eq!((slot.size_position, slot.payload_position), (14, 21));
        assert!(index.append(2, 1).is_err());
    }
}
