pub const ACK: u8 = 0xc0;
pub const NACK: u8 = 0xa0;

use binary_util::interfaces::{Reader, Writer};
use binary_util::io::{ByteReader, ByteWriter};

use super::{invalid_data, read_u24_le, u24, write_u24_le};
use crate::error::ProtocolError;

/// An ack record.
/// A record holds a single or range of acked packets.
/// No real complexity other than that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Single(SingleRecord),
    Range(RangeRecord),
}

impl Record {
    /// The first id covered by this record.
    pub fn start(&self) -> u32 {
        match self {
            Record::Single(single) => single.sequence,
            Record::Range(range) => range.start,
        }
    }

    /// The last id covered by this record (inclusive).
    pub fn end(&self) -> u32 {
        match self {
            Record::Single(single) => single.sequence,
            Record::Range(range) => range.end,
        }
    }

    /// The amount of ids after `start` covered by this record, `0` for singles.
    /// This is negative when the range runs backwards.
    pub fn span(&self) -> i32 {
        u24::minus_wrap(self.end(), self.start())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleRecord {
    pub sequence: u32,
}

/// An inclusive range of ids, `start` through `end` in wrap-aware order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRecord {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub id: u8,
    pub count: u16,
    pub records: Vec<Record>,
}

impl Ack {
    pub fn new(count: u16, nack: bool) -> Self {
        Self {
            id: if nack { NACK } else { ACK },
            count,
            records: Vec::new(),
        }
    }

    pub fn is_nack(&self) -> bool {
        self.id == NACK
    }

    /// An acknowledgement for exactly one id.
    pub fn single(sequence: u32, nack: bool) -> Self {
        let mut ack = Self::new(1, nack);
        ack.records.push(Record::Single(SingleRecord { sequence }));
        ack
    }

    /// An acknowledgement for the inclusive range `start..=end`.
    pub fn range(start: u32, end: u32, nack: bool) -> Self {
        let mut ack = Self::new(1, nack);
        if start == end {
            ack.records.push(Record::Single(SingleRecord { sequence: start }));
        } else {
            ack.records.push(Record::Range(RangeRecord { start, end }));
        }
        ack
    }

    /// Compresses a set of ids into the minimal list of contiguous records.
    ///
    /// Ids are ordered by their distance from the first id given, so a set that
    /// straddles the wrap point (`0xFFFFFE, 0xFFFFFF, 0, 1`) still collapses into
    /// a single range. Duplicate ids are ignored.
    pub fn from_records(mut missing: Vec<u32>, nack: bool) -> Self {
        let mut records: Vec<Record> = Vec::new();

        if let Some(&origin) = missing.first() {
            missing.sort_by_key(|id| u24::minus_wrap(*id, origin));
            missing.dedup();

            let mut start = missing[0];
            let mut end = missing[0];

            for &id in missing.iter().skip(1) {
                if id == u24::plus_one(end) {
                    end = id;
                } else {
                    records.push(Self::record(start, end));
                    start = id;
                    end = id;
                }
            }
            records.push(Self::record(start, end));
        }

        let mut ack = Self::new(records.len() as u16, nack);
        ack.records = records;
        ack
    }

    fn record(start: u32, end: u32) -> Record {
        if start == end {
            Record::Single(SingleRecord { sequence: start })
        } else {
            Record::Range(RangeRecord { start, end })
        }
    }

    /// Expands every record into the ids it covers.
    ///
    /// A single range spanning more than `max_packet_loss` ids, a range that
    /// runs backwards, or a message covering more than `max_packet_loss` ids in
    /// total is a protocol violation, and nothing is returned in that case.
    pub fn sequences(&self, max_packet_loss: u32) -> Result<Vec<u32>, ProtocolError> {
        let mut total: u32 = 0;

        for record in self.records.iter() {
            let span = record.span();
            if span < 0 {
                return Err(ProtocolError::MalformedRange {
                    start: record.start(),
                    end: record.end(),
                });
            }
            if span as u32 > max_packet_loss {
                return Err(ProtocolError::AckRangeTooLarge {
                    span: span as u32,
                    max: max_packet_loss,
                });
            }
            total = total.saturating_add(span as u32 + 1);
            if total > max_packet_loss {
                return Err(ProtocolError::AckTooLarge {
                    total,
                    max: max_packet_loss,
                });
            }
        }

        let mut ids = Vec::with_capacity(total as usize);
        for record in self.records.iter() {
            let start = record.start();
            for i in 0..=record.span() as u32 {
                ids.push(u24::add(start, i));
            }
        }
        Ok(ids)
    }
}

impl Reader<Ack> for Ack {
    fn read(buf: &mut ByteReader) -> std::io::Result<Ack> {
        let id = buf.read_u8()?;
        if id != ACK && id != NACK {
            return invalid_data(format!("{:#04x} is not an ack or nack", id));
        }

        let count = buf.read_u16()?;
        let mut records: Vec<Record> = Vec::with_capacity(count.min(64) as usize);

        for _ in 0..count {
            if buf.read_u8()? == 1 {
                records.push(Record::Single(SingleRecord {
                    sequence: read_u24_le(buf)?,
                }));
            } else {
                records.push(Record::Range(RangeRecord {
                    start: read_u24_le(buf)?,
                    end: read_u24_le(buf)?,
                }));
            }
        }

        Ok(Self { id, count, records })
    }
}

impl Writer for Ack {
    fn write(&self, buf: &mut ByteWriter) -> std::io::Result<()> {
        buf.write_u8(self.id)?;
        buf.write_u16(self.records.len() as u16)?;

        for record in self.records.iter() {
            match record {
                Record::Single(rec) => {
                    buf.write_u8(1)?;
                    write_u24_le(buf, rec.sequence)?;
                }
                Record::Range(rec) => {
                    buf.write_u8(0)?;
                    write_u24_le(buf, rec.start)?;
                    write_u24_le(buf, rec.end)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_contiguous_ids() {
        let ack = Ack::from_records(vec![5, 6, 7, 9, 11, 12], false);
        assert_eq!(
            ack.records,
            vec![
                Record::Range(RangeRecord { start: 5, end: 7 }),
                Record::Single(SingleRecord { sequence: 9 }),
                Record::Range(RangeRecord { start: 11, end: 12 }),
            ]
        );
        assert_eq!(ack.count, 3);
    }

    #[test]
    fn compresses_across_the_wrap() {
        let ack = Ack::from_records(vec![u24::MAX - 1, 1, u24::MAX, 0], true);
        assert!(ack.is_nack());
        assert_eq!(
            ack.records,
            vec![Record::Range(RangeRecord {
                start: u24::MAX - 1,
                end: 1
            })]
        );
        assert_eq!(
            ack.sequences(16).unwrap(),
            vec![u24::MAX - 1, u24::MAX, 0, 1]
        );
    }

    #[test]
    fn rejects_oversized_ranges() {
        let ack = Ack::range(0, 100, false);
        assert_eq!(
            ack.sequences(64),
            Err(ProtocolError::AckRangeTooLarge { span: 100, max: 64 })
        );

        let backwards = Ack::range(10, 5, false);
        assert!(matches!(
            backwards.sequences(64),
            Err(ProtocolError::MalformedRange { .. })
        ));
    }

    #[test]
    fn rejects_oversized_totals() {
        let ack = Ack::from_records((0..40).step_by(2).collect(), false);
        assert_eq!(ack.records.len(), 20);
        assert_eq!(
            ack.sequences(10),
            Err(ProtocolError::AckTooLarge { total: 11, max: 10 })
        );
    }

    #[test]
    fn wire_format() {
        let ack = Ack::from_records(vec![1, 2, 3, 8], false);
        let bytes = ack.write_to_bytes().unwrap();
        assert_eq!(
            bytes.as_slice(),
            &[ACK, 0, 2, 0, 1, 0, 0, 3, 0, 0, 1, 8, 0, 0]
        );
        assert_eq!(Ack::read_from_slice(bytes.as_slice()).unwrap(), ack);
    }
}
