//! Splitting an event payload into datagrams
//!
//! Each fragment datagram starts with a FragmentHeader,
//! followed by the bytes [start, end) of the payload.
//! The receiver reassembles by offset, nothing is
//! acknowledged.

use std::fmt;

use crate::errors::StreamError;
use crate::serialization::{
  Serialization,
  SerializationError,
  parse_u16,
  parse_u32,
};

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct FragmentHeader {
  /// Event id (without the header tag)
  pub id    : u32,
  /// Payload relative offset of the first byte
  pub start : u16,
  /// Payload relative offset after the last byte
  pub end   : u16,
}

impl FragmentHeader {
  /// Number of payload bytes, 0 for a header
  /// with end before start
  pub fn len(&self) -> usize {
    self.end.saturating_sub(self.start) as usize
  }
}

impl Serialization for FragmentHeader {

  const SIZE : usize = 8;

  fn from_bytestream(stream : &Vec<u8>,
                     pos    : &mut usize)
    -> Result<Self, SerializationError> {
    Self::verify_fixed(stream, pos)?;
    let id    = parse_u32(stream, pos);
    let start = parse_u16(stream, pos);
    let end   = parse_u16(stream, pos);
    if end < start {
      return Err(SerializationError::WrongByteSize);
    }
    Ok(FragmentHeader { id, start, end })
  }

  fn to_bytestream(&self) -> Vec<u8> {
    let mut stream = Vec::<u8>::with_capacity(Self::SIZE);
    stream.extend_from_slice(&self.id.to_le_bytes());
    stream.extend_from_slice(&self.start.to_le_bytes());
    stream.extend_from_slice(&self.end.to_le_bytes());
    stream
  }
}

impl fmt::Display for FragmentHeader {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<FragmentHeader: id {}, [{}, {})>", self.id, self.start, self.end)
  }
}

/// Iterate over the datagrams of one payload
///
/// Fragments come in increasing offset order and
/// hold at most `packet_size - FragmentHeader::SIZE`
/// payload bytes each.
#[derive(Debug)]
pub struct Fragmenter<'a> {
  payload     : &'a [u8],
  id          : u32,
  max_payload : usize,
  offset      : usize,
}

impl<'a> Fragmenter<'a> {

  pub fn new(payload     : &'a [u8],
             id          : u32,
             packet_size : usize) -> Result<Self, StreamError> {
    if payload.len() > u16::MAX as usize {
      return Err(StreamError::PayloadTooLarge(payload.len()));
    }
    if packet_size <= FragmentHeader::SIZE {
      return Err(StreamError::PacketSizeTooSmall(packet_size));
    }
    Ok(Fragmenter {
      payload,
      id,
      max_payload : packet_size - FragmentHeader::SIZE,
      offset      : 0,
    })
  }

  /// The maximum number of payload bytes per fragment
  pub fn max_payload(&self) -> usize {
    self.max_payload
  }

  /// Number of fragments needed for the whole payload
  pub fn n_fragments(&self) -> usize {
    (self.payload.len() + self.max_payload - 1) / self.max_payload
  }
}

impl<'a> Iterator for Fragmenter<'a> {
  type Item = (FragmentHeader, Vec<u8>);

  /// Yields the header and the complete datagram
  fn next(&mut self) -> Option<Self::Item> {
    if self.offset >= self.payload.len() {
      return None;
    }
    let end    = usize::min(self.offset + self.max_payload, self.payload.len());
    // fits, the payload size is checked at construction
    let header = FragmentHeader {
      id    : self.id,
      start : self.offset as u16,
      end   : end as u16,
    };
    let mut datagram = header.to_bytestream();
    datagram.extend_from_slice(&self.payload[self.offset..end]);
    self.offset = end;
    Some((header, datagram))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn three_full_fragments() {
    let packet_size = 1400usize;
    let max         = packet_size - FragmentHeader::SIZE;
    let payload : Vec<u8> = (0..3*max).map(|k| (k % 251) as u8).collect();
    let frag = Fragmenter::new(&payload, 5, packet_size).unwrap();
    assert_eq!(frag.n_fragments(), 3);
    let offsets : Vec<(u16, u16)> = frag.map(|(h,_)| (h.start, h.end)).collect();
    assert_eq!(offsets, vec![(0, max as u16),
                             (max as u16, 2*max as u16),
                             (2*max as u16, 3*max as u16)]);
  }

  #[test]
  fn reassemble_by_offset() {
    let payload : Vec<u8> = (0..40960u32).map(|k| (k * 7 % 256) as u8).collect();
    let mut rebuilt = vec![0u8; payload.len()];
    let mut last_end = 0usize;
    for (_, datagram) in Fragmenter::new(&payload, 9, 1400).unwrap() {
      assert!(datagram.len() <= 1400);
      let mut pos = 0usize;
      let header  = FragmentHeader::from_bytestream(&datagram, &mut pos).unwrap();
      assert_eq!(header.id, 9);
      assert_eq!(header.start as usize, last_end);
      rebuilt[header.start as usize..header.end as usize].copy_from_slice(&datagram[pos..]);
      last_end = header.end as usize;
    }
    assert_eq!(last_end, payload.len());
    assert_eq!(rebuilt, payload);
  }

  #[test]
  fn short_last_fragment() {
    let payload = vec![1u8; 25];
    let frags : Vec<_> = Fragmenter::new(&payload, 0, 18).unwrap().collect();
    assert_eq!(frags.len(), 3);
    assert_eq!(frags[2].0.len(), 5);
    assert_eq!(frags[2].1.len(), FragmentHeader::SIZE + 5);
  }

  #[test]
  fn reversed_offsets_have_no_length() {
    let header = FragmentHeader { id : 1, start : 100, end : 40 };
    assert_eq!(header.len(), 0);
    let mut pos = 0usize;
    assert_eq!(FragmentHeader::from_bytestream(&header.to_bytestream(), &mut pos),
               Err(SerializationError::WrongByteSize));
  }

  #[test]
  fn empty_payload_has_no_fragments() {
    assert_eq!(Fragmenter::new(&[], 0, 1400).unwrap().count(), 0);
  }

  #[test]
  fn reject_oversized_payload() {
    let payload = vec![0u8; u16::MAX as usize + 1];
    assert!(matches!(Fragmenter::new(&payload, 0, 1400),
                     Err(StreamError::PayloadTooLarge(_))));
    assert!(matches!(Fragmenter::new(&[0u8; 4], 0, 8),
                     Err(StreamError::PacketSizeTooSmall(8))));
  }
}
