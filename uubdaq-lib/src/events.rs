//! Shower event header
//!
//! The header is a snapshot of the trigger and
//! time tagging registers at the moment the event
//! was read out of the ring buffers.

use std::fmt;

use crate::constants::{
  HEADER_TAG,
  TTAG_NANOSEC_MASK,
  TTAG_EVTCTR_SHIFT,
};
use crate::serialization::{
  Serialization,
  SerializationError,
  parse_u32,
};

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct EventHeader {
  /// Process local event counter
  pub id             : u32,
  /// Shower buffer status register at readout
  pub buf_status     : u32,
  /// First sample of the trace within the slot
  pub buf_start      : u32,
  pub trig_id        : u32,
  pub ttag_seconds   : u32,
  /// Clock ticks (lower 30 bits) and event
  /// counter (upper 2 bits)
  pub ttag_nanosec   : u32,
  /// Ring buffer slot the event was read from
  pub rd             : u32,
}

impl EventHeader {

  pub fn new() -> Self {
    Self::default()
  }

  /// The clock ticks of the trigger time tag
  pub fn ticks(&self) -> u32 {
    self.ttag_nanosec & TTAG_NANOSEC_MASK
  }

  /// The event counter of the time tagging block
  pub fn evt_counter(&self) -> u32 {
    self.ttag_nanosec >> TTAG_EVTCTR_SHIFT
  }

  /// The id as sent in the header packet of the
  /// data stream, distinguishing it from a fragment
  pub fn tagged_id(&self) -> u32 {
    self.id | HEADER_TAG
  }

  /// The wire representation of the header packet
  pub fn to_header_packet(&self) -> Vec<u8> {
    let mut tagged = *self;
    tagged.id = self.tagged_id();
    tagged.to_bytestream()
  }

  /// One line summary, as printed by the tools
  /// in verbose mode
  pub fn summary(&self, duration_us : u64) -> String {
    format!("sent id {:08x}, rd {}, time {:9}.{:09} [s.tics], evt {:1x}, duration {} [us]",
            self.id,
            self.rd,
            self.ttag_seconds,
            self.ticks(),
            self.evt_counter(),
            duration_us)
  }
}

impl Serialization for EventHeader {

  const SIZE : usize = 28;

  fn from_bytestream(stream : &Vec<u8>,
                     pos    : &mut usize)
    -> Result<Self, SerializationError> {
    Self::verify_fixed(stream, pos)?;
    let mut header = Self::new();
    header.id           = parse_u32(stream, pos);
    header.buf_status   = parse_u32(stream, pos);
    header.buf_start    = parse_u32(stream, pos);
    header.trig_id      = parse_u32(stream, pos);
    header.ttag_seconds = parse_u32(stream, pos);
    header.ttag_nanosec = parse_u32(stream, pos);
    header.rd           = parse_u32(stream, pos);
    Ok(header)
  }

  fn to_bytestream(&self) -> Vec<u8> {
    let mut stream = Vec::<u8>::with_capacity(Self::SIZE);
    stream.extend_from_slice(&self.id.to_le_bytes());
    stream.extend_from_slice(&self.buf_status.to_le_bytes());
    stream.extend_from_slice(&self.buf_start.to_le_bytes());
    stream.extend_from_slice(&self.trig_id.to_le_bytes());
    stream.extend_from_slice(&self.ttag_seconds.to_le_bytes());
    stream.extend_from_slice(&self.ttag_nanosec.to_le_bytes());
    stream.extend_from_slice(&self.rd.to_le_bytes());
    stream
  }
}

impl fmt::Display for EventHeader {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<EventHeader:
  id       : {}
  status   : {:#010x}
  start    : {}
  trig id  : {:#010x}
  time     : {}.{:09} [s.tics]
  evt ctr  : {}
  rd       : {}>",
      self.id,
      self.buf_status,
      self.buf_start,
      self.trig_id,
      self.ttag_seconds,
      self.ticks(),
      self.evt_counter(),
      self.rd)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_header() -> EventHeader {
    EventHeader {
      id           : 7,
      buf_status   : 0x0000_0105,
      buf_start    : 17,
      trig_id      : 0xabcd,
      ttag_seconds : 1234,
      ttag_nanosec : (2 << 30) | 5678,
      rd           : 1,
    }
  }

  #[test]
  fn header_packet_layout() {
    let packet = sample_header().to_header_packet();
    assert_eq!(packet.len(), EventHeader::SIZE);
    assert_eq!(&packet[0..4], &(7u32 | 0x8000_0000).to_le_bytes());
    assert_eq!(&packet[8..12], &17u32.to_le_bytes());
    assert_eq!(&packet[24..28], &1u32.to_le_bytes());
  }

  #[test]
  fn decode_header() {
    let header  = sample_header();
    let mut pos = 0usize;
    let decoded = EventHeader::from_bytestream(&header.to_bytestream(), &mut pos).unwrap();
    assert_eq!(decoded, header);
    assert_eq!(pos, EventHeader::SIZE);
  }

  #[test]
  fn decode_short_stream() {
    let mut pos = 0usize;
    let stream  = vec![0u8; EventHeader::SIZE - 1];
    assert_eq!(EventHeader::from_bytestream(&stream, &mut pos),
               Err(SerializationError::StreamTooShort));
  }

  #[test]
  fn time_tag_fields() {
    let header = sample_header();
    assert_eq!(header.ticks(), 5678);
    assert_eq!(header.evt_counter(), 2);
    assert_eq!(header.summary(12),
               "sent id 00000007, rd 1, time      1234.000005678 [s.tics], evt 2, duration 12 [us]");
  }
}
