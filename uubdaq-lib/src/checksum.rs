//! CRC-32 as used by zlib and the boot loader
//! to check firmware and kernel images

use std::io;
use std::io::Read;

use crc::{Crc, CRC_32_ISO_HDLC};

pub const CRC32 : Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Chunk size for reading files
const CHECKSUM_BUFSIZE : usize = 4096;

/// Calculate the CRC-32 of everything the reader delivers
pub fn crc32_of<R : Read>(reader : &mut R) -> io::Result<u32> {
  let mut digest = CRC32.digest();
  let mut buf    = [0u8; CHECKSUM_BUFSIZE];
  loop {
    let n = match reader.read(&mut buf) {
      Ok(0)    => break,
      Ok(n)    => n,
      Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
      Err(err) => return Err(err),
    };
    digest.update(&buf[..n]);
  }
  Ok(digest.finalize())
}

#[test]
fn check_value() {
  let mut data = &b"123456789"[..];
  assert_eq!(crc32_of(&mut data).unwrap(), 0xcbf4_3926);
}

#[test]
fn larger_than_one_chunk() {
  let data : Vec<u8> = (0..10000u32).map(|k| (k % 256) as u8).collect();
  let mut reader = &data[..];
  assert_eq!(crc32_of(&mut reader).unwrap(), CRC32.checksum(&data));
}
