//! Serialization/Deserialization helpers
//!
//! Everything which goes over the wire is little
//! endian and has a fixed size.

pub use crate::errors::SerializationError;

pub fn parse_u16(bs : &Vec::<u8>, pos : &mut usize) -> u16 {
  let value = u16::from_le_bytes([bs[*pos], bs[*pos+1]]);
  *pos += 2;
  value
}

/// Get u32 from a bytestream and move on the position marker
pub fn parse_u32(bs : &Vec::<u8>, pos : &mut usize) -> u32 {
  let value = u32::from_le_bytes([bs[*pos], bs[*pos+1], bs[*pos+2], bs[*pos+3]]);
  *pos += 4;
  value
}

/// Convert the packed shower buffer words into
/// the bytes of the streamed payload
pub fn u32_to_u8(vec_u32 : &[u32]) -> Vec<u8> {
  vec_u32.iter()
    .flat_map(|&n| n.to_le_bytes())
    .collect()
}

/// Encode/decode fixed size wire structures
pub trait Serialization {

  /// Size of the serialized representation in bytes
  const SIZE : usize;

  /// Make sure there are at least SIZE bytes left
  /// in the stream after pos
  fn verify_fixed(stream : &Vec<u8>,
                  pos    : &usize) -> Result<(), SerializationError> {
    if stream.len() < *pos + Self::SIZE {
      error!("Seeing {} bytes, but expecting {}", stream.len().saturating_sub(*pos), Self::SIZE);
      return Err(SerializationError::StreamTooShort);
    }
    Ok(())
  }

  /// Decode a serializable from a bytestream
  fn from_bytestream(bytestream : &Vec<u8>,
                     pos        : &mut usize)
    -> Result<Self, SerializationError>
    where Self : Sized;

  /// Encode a serializable to a bytestream
  fn to_bytestream(&self) -> Vec<u8>;
}

#[test]
fn words_to_bytes_are_little_endian() {
  let bytes = u32_to_u8(&[0x0403_0201, 0x0807_0605]);
  assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
  let mut pos = 2usize;
  assert_eq!(parse_u16(&bytes, &mut pos), 0x0403);
  assert_eq!(parse_u32(&bytes, &mut pos), 0x0807_0605);
  assert_eq!(pos, 8);
}
