//! Binary spike recordings.
//!
//! Header (12 bytes, little endian):
//!   [0..4]   Magic: "SPKF"
//!   [4..6]   Version: u16
//!   [6..8]   Flags: u16 (reserved, zero)
//!   [8..12]  Neuron count: u32
//!
//! Body: fixed-size records `{neuron: u32, time: u32}` (8 bytes), sorted by non-decreasing time.
//!
//! Legacy recordings without header can still be read with [`SpikeFileReader::headerless`],
//! the neuron count being supplied by the caller.
use log;
use std::io::{self, BufReader, Read, Write};

use crate::error::{Result, StimError};
use crate::SpikeTime;

const MAGIC: &[u8; 4] = b"SPKF";
const VERSION: u16 = 1;
/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 12;
/// Size of a record in bytes.
pub const RECORD_SIZE: usize = 8;

/// A spike of a neuron in a recorded population.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct SpikeRecord {
    /// The time of the spike (ms).
    pub time: SpikeTime,
    /// The population-local index of the neuron.
    pub neuron: u32,
}

impl SpikeRecord {
    pub fn new(neuron: u32, time: SpikeTime) -> Self {
        SpikeRecord { neuron, time }
    }

    fn to_bytes(self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..4].copy_from_slice(&self.neuron.to_le_bytes());
        bytes[4..].copy_from_slice(&self.time.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        SpikeRecord {
            neuron: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            time: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// The header of a recording.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SpikeFileHeader {
    pub version: u16,
    pub neuron_count: u32,
}

impl SpikeFileHeader {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..].copy_from_slice(&self.neuron_count.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &bytes[..4] != MAGIC {
            return Err(StimError::CorruptRecording("Invalid magic bytes".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(StimError::CorruptRecording(format!(
                "Unsupported version {}",
                version
            )));
        }
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        if flags != 0 {
            return Err(StimError::CorruptRecording(format!(
                "Unsupported flags {:#06x}",
                flags
            )));
        }
        Ok(SpikeFileHeader {
            version,
            neuron_count: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Checks that `record` may follow `previous` in a recording of `neuron_count` neurons.
fn check_record(
    record: &SpikeRecord,
    previous: Option<&SpikeRecord>,
    neuron_count: u32,
    position: u64,
) -> Result<()> {
    if record.neuron >= neuron_count {
        return Err(StimError::CorruptRecording(format!(
            "Record {}: neuron {} out of a population of {}",
            position, record.neuron, neuron_count
        )));
    }
    if let Some(previous) = previous {
        if record.time < previous.time {
            return Err(StimError::CorruptRecording(format!(
                "Record {}: time {} ms after {} ms",
                position, record.time, previous.time
            )));
        }
    }
    Ok(())
}

/// Streaming writer of a recording.
pub struct SpikeFileWriter<W: Write> {
    writer: W,
    neuron_count: u32,
    last: Option<SpikeRecord>,
    num_records: u64,
}

impl<W: Write> SpikeFileWriter<W> {
    /// Create a writer and write the header.
    pub fn new(mut writer: W, neuron_count: u32) -> Result<Self> {
        let header = SpikeFileHeader {
            version: VERSION,
            neuron_count,
        };
        writer.write_all(&header.to_bytes())?;
        Ok(SpikeFileWriter {
            writer,
            neuron_count,
            last: None,
            num_records: 0,
        })
    }

    /// Append a record.
    /// The function returns an error if the record is out of order or out of the population.
    pub fn write(&mut self, record: SpikeRecord) -> Result<()> {
        check_record(&record, self.last.as_ref(), self.neuron_count, self.num_records)?;
        self.writer.write_all(&record.to_bytes())?;
        self.last = Some(record);
        self.num_records += 1;
        Ok(())
    }

    /// Returns the number of records written so far.
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        log::debug!("Wrote {} spike records", self.num_records);
        Ok(self.writer)
    }
}

/// Streaming reader of a recording, validating records as they are read.
pub struct SpikeFileReader<R: Read> {
    reader: BufReader<R>,
    header: SpikeFileHeader,
    last: Option<SpikeRecord>,
    num_records: u64,
    failed: bool,
}

impl<R: Read> SpikeFileReader<R> {
    /// Create a reader and parse the header.
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let mut bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                StimError::CorruptRecording("Truncated header".to_string())
            }
            _ => StimError::from(e),
        })?;
        let header = SpikeFileHeader::from_bytes(&bytes)?;
        Ok(SpikeFileReader::with_header(reader, header))
    }

    /// Create a reader for a legacy recording without header.
    pub fn headerless(reader: R, neuron_count: u32) -> Self {
        let header = SpikeFileHeader {
            version: 0,
            neuron_count,
        };
        SpikeFileReader::with_header(BufReader::new(reader), header)
    }

    fn with_header(reader: BufReader<R>, header: SpikeFileHeader) -> Self {
        SpikeFileReader {
            reader,
            header,
            last: None,
            num_records: 0,
            failed: false,
        }
    }

    /// Returns the header of the recording (version 0 for header-less recordings).
    pub fn header(&self) -> SpikeFileHeader {
        self.header
    }

    /// Returns the number of records read so far.
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Read the next record, or `None` at the end of the recording.
    pub fn read_record(&mut self) -> Result<Option<SpikeRecord>> {
        let mut bytes = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.reader.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StimError::from(e)),
            }
        }
        match filled {
            0 => Ok(None),
            RECORD_SIZE => {
                let record = SpikeRecord::from_bytes(&bytes);
                check_record(
                    &record,
                    self.last.as_ref(),
                    self.header.neuron_count,
                    self.num_records,
                )?;
                self.last = Some(record);
                self.num_records += 1;
                Ok(Some(record))
            }
            n => Err(StimError::CorruptRecording(format!(
                "Record {}: truncated after {} of {} bytes",
                self.num_records, n, RECORD_SIZE
            ))),
        }
    }
}

impl<R: Read> Iterator for SpikeFileReader<R> {
    type Item = Result<SpikeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Encode a recording of a population of `neuron_count` neurons in memory.
pub fn encode(records: &[SpikeRecord], neuron_count: u32) -> Result<Vec<u8>> {
    let buffer = Vec::with_capacity(HEADER_SIZE + records.len() * RECORD_SIZE);
    let mut writer = SpikeFileWriter::new(buffer, neuron_count)?;
    for record in records {
        writer.write(*record)?;
    }
    writer.finish()
}

/// Decode a recording held in memory.
pub fn decode(bytes: &[u8]) -> Result<(SpikeFileHeader, Vec<SpikeRecord>)> {
    let reader = SpikeFileReader::new(bytes)?;
    let header = reader.header();
    let records = reader.collect::<Result<Vec<SpikeRecord>>>()?;
    Ok((header, records))
}
