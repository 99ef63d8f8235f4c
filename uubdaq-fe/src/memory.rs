//! Access to the register blocks and shower
//! ring buffers through /dev/mem
//!
//! The register blocks are mapped read/write, the
//! ring buffers read only. All accesses are volatile,
//! the values change under our feet.
//!
//! Everything gets unmapped when the DeviceMap
//! goes out of scope.

extern crate memmap;

use std::fs::File;
use std::os::unix::fs::OpenOptionsExt;
use std::ptr;

use memmap::{Mmap,
             MmapMut,
             MmapOptions};

use uubdaq_lib::constants::{
  NSAMPLES,
  RAW_NCH,
  SHWR_MEM_DEPTH,
  SHWR_MEM_NBUF,
};
use uubdaq_lib::errors::MemoryError;
use uubdaq_lib::settings::MemorySettings;

use crate::registers::*;

/// The size of a 32bit unsigned int in byte
/// (all words in registers are u32)
pub const SIZEOF_U32 : usize = 4;

/// The three register blocks of the trigger logic
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Block {
  Trigger,
  TimeTagging,
  TestControl,
}

/// Access to registers and ring buffers
///
/// Implemented by the /dev/mem mapping and by the
/// simulated board used in the tests.
pub trait RegisterAccess {

  /// Read a single register word
  fn read(&self, block : Block, word : usize) -> u32;

  /// Write a single register word
  fn write(&mut self, block : Block, word : usize, value : u32);

  /// Copy NSAMPLES words of ring buffer slot `slot`
  /// of raw channel `channel` into `dst`
  fn copy_slot(&self,
               channel : usize,
               slot    : usize,
               dst     : &mut [u32]) -> Result<(), MemoryError>;

  /// Read-modify-write
  fn set_bits(&mut self, block : Block, word : usize, bits : u32) {
    let value = self.read(block, word);
    self.write(block, word, value | bits);
  }
}

/// Round n up to a multiple of `multiple`
pub fn roundup(n : usize, multiple : usize) -> usize {
  ((n + multiple - 1) / multiple) * multiple
}

/// The page size of the system, mappings have to
/// be a multiple of it
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size <= 0 {
    4096
  } else {
    size as usize
  }
}

/// A mapped register block
#[derive(Debug)]
pub struct RegisterBlock {
  map     : MmapMut,
  n_words : usize,
}

impl RegisterBlock {

  pub fn map(devmem : &File,
             base   : u64,
             size   : usize) -> std::io::Result<Self> {
    let map = unsafe {
      MmapOptions::new()
        .offset(base)
        .len(size)
        .map_mut(devmem)?
    };
    Ok(RegisterBlock {
      map,
      n_words : size/SIZEOF_U32,
    })
  }

  /// Volatile read of a register word
  ///
  /// A word outside of the block reads as 0.
  pub fn read(&self, word : usize) -> u32 {
    if word >= self.n_words {
      error!("Register {} outside of the mapped block of {} words!", word, self.n_words);
      return 0;
    }
    let p = self.map.as_ptr() as *const u32;
    unsafe {
      ptr::read_volatile(p.add(word))
    }
  }

  /// Volatile write of a register word, words
  /// outside of the block are not touched
  pub fn write(&mut self, word : usize, value : u32) {
    if word >= self.n_words {
      error!("Register {} outside of the mapped block of {} words, not writing {:#x}!", word, self.n_words, value);
      return;
    }
    let p = self.map.as_mut_ptr() as *mut u32;
    unsafe {
      ptr::write_volatile(p.add(word), value);
    }
  }
}

/// A mapped shower ring buffer (read only)
#[derive(Debug)]
pub struct RingBuffer {
  map     : Mmap,
  channel : usize,
  n_slots : usize,
}

impl RingBuffer {

  pub fn map(devmem  : &File,
             channel : usize,
             base    : u64,
             size    : usize) -> std::io::Result<Self> {
    let map = unsafe {
      MmapOptions::new()
        .offset(base)
        .len(size)
        .map(devmem)?
    };
    Ok(RingBuffer {
      map,
      channel,
      n_slots : usize::min(SHWR_MEM_NBUF, size/SHWR_MEM_DEPTH),
    })
  }

  pub fn n_slots(&self) -> usize {
    self.n_slots
  }

  /// Copy one slot out of the ring buffer. Never
  /// touches memory outside of the mapped window.
  pub fn copy_slot(&self, slot : usize, dst : &mut [u32]) -> Result<(), MemoryError> {
    if slot >= self.n_slots {
      return Err(MemoryError::SlotOutOfRange { channel : self.channel, slot });
    }
    if dst.len() < NSAMPLES {
      return Err(MemoryError::DestinationTooShort(dst.len()));
    }
    let p = self.map.as_ptr() as *const u32;
    let offset = slot*NSAMPLES;
    for (k, word) in dst[..NSAMPLES].iter_mut().enumerate() {
      *word = unsafe { ptr::read_volatile(p.add(offset + k)) };
    }
    Ok(())
  }
}

/// All mapped regions needed for the event readout
#[derive(Debug)]
pub struct DeviceMap {
  trigger      : RegisterBlock,
  time_tagging : RegisterBlock,
  test_control : RegisterBlock,
  shower       : Vec<RingBuffer>,
}

impl DeviceMap {

  /// Map all register blocks and ring buffers
  ///
  /// /dev/mem gets closed again once everything is
  /// mapped. On error, the regions mapped so far are
  /// released before returning.
  pub fn open(settings : &MemorySettings) -> Result<Self, MemoryError> {
    let devmem = File::options()
      .read(true)
      .write(true)
      .custom_flags(libc::O_SYNC)
      .open(&settings.devmem)
      .map_err(MemoryError::DevMem)?;
    let page      = page_size();
    let regs_size = roundup(REG_BLOCK_WORDS*SIZEOF_U32, page);
    let shwr_size = roundup(SHWR_MEM_DEPTH*SHWR_MEM_NBUF, page);
    debug!("Mapping register blocks ({regs_size} bytes) and shower buffers ({shwr_size} bytes) from {}", settings.devmem);
    let trigger = RegisterBlock::map(&devmem, SDE_TRIGGER_BASE, regs_size)
      .map_err(MemoryError::MapTrigger)?;
    let time_tagging = RegisterBlock::map(&devmem, TIME_TAGGING_BASE, regs_size)
      .map_err(MemoryError::MapTimeTagging)?;
    let test_control = RegisterBlock::map(&devmem, TEST_CONTROL_BASE, regs_size)
      .map_err(MemoryError::MapTestControl)?;
    let mut shower = Vec::<RingBuffer>::with_capacity(RAW_NCH);
    for (channel, base) in TRIGGER_MEMORY_SHWR_BASE.iter().enumerate() {
      match RingBuffer::map(&devmem, channel, *base, shwr_size) {
        Err(source) => {
          return Err(MemoryError::MapShower { channel, source });
        }
        Ok(buf) => shower.push(buf),
      }
    }
    Ok(DeviceMap {
      trigger,
      time_tagging,
      test_control,
      shower,
    })
  }

  /// Unmap everything
  pub fn close(self) {
    debug!("Unmapping register blocks and shower buffers");
  }

  fn block(&self, block : Block) -> &RegisterBlock {
    match block {
      Block::Trigger     => &self.trigger,
      Block::TimeTagging => &self.time_tagging,
      Block::TestControl => &self.test_control,
    }
  }

  fn block_mut(&mut self, block : Block) -> &mut RegisterBlock {
    match block {
      Block::Trigger     => &mut self.trigger,
      Block::TimeTagging => &mut self.time_tagging,
      Block::TestControl => &mut self.test_control,
    }
  }
}

impl RegisterAccess for DeviceMap {

  fn read(&self, block : Block, word : usize) -> u32 {
    self.block(block).read(word)
  }

  fn write(&mut self, block : Block, word : usize, value : u32) {
    self.block_mut(block).write(word, value);
  }

  fn copy_slot(&self,
               channel : usize,
               slot    : usize,
               dst     : &mut [u32]) -> Result<(), MemoryError> {
    match self.shower.get(channel) {
      None      => Err(MemoryError::NoSuchChannel(channel)),
      Some(buf) => buf.copy_slot(slot, dst),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn round_up_to_pages() {
    assert_eq!(roundup(1024, 4096), 4096);
    assert_eq!(roundup(4096, 4096), 4096);
    assert_eq!(roundup(SHWR_MEM_DEPTH*SHWR_MEM_NBUF, 4096), 32768);
    assert!(page_size() >= 4096);
  }

  /// A plain file stands in for the ring buffer memory
  fn file_backed_ring() -> (tempfile::NamedTempFile, RingBuffer) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let words : Vec<u8> = (0..(SHWR_MEM_NBUF*NSAMPLES) as u32)
      .flat_map(|k| k.to_le_bytes())
      .collect();
    file.write_all(&words).unwrap();
    file.flush().unwrap();
    let ring = RingBuffer::map(file.as_file(), 2, 0, SHWR_MEM_DEPTH*SHWR_MEM_NBUF).unwrap();
    (file, ring)
  }

  #[test]
  fn copy_every_slot() {
    let (_file, ring) = file_backed_ring();
    assert_eq!(ring.n_slots(), SHWR_MEM_NBUF);
    let mut dst = vec![0u32; NSAMPLES];
    for slot in 0..SHWR_MEM_NBUF {
      ring.copy_slot(slot, &mut dst).unwrap();
      assert_eq!(dst[0], (slot*NSAMPLES) as u32);
      assert_eq!(dst[NSAMPLES-1], ((slot+1)*NSAMPLES - 1) as u32);
    }
  }

  #[test]
  fn reject_slot_outside_window() {
    let (_file, ring) = file_backed_ring();
    let mut dst = vec![7u32; NSAMPLES];
    assert!(matches!(ring.copy_slot(SHWR_MEM_NBUF, &mut dst),
                     Err(MemoryError::SlotOutOfRange { channel : 2, slot : 4 })));
    assert!(dst.iter().all(|w| *w == 7));
    let mut short = vec![0u32; NSAMPLES - 1];
    assert!(ring.copy_slot(0, &mut short).is_err());
  }

  #[test]
  fn register_words_stay_in_the_block() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8;16]).unwrap();
    file.flush().unwrap();
    let mut regs = RegisterBlock::map(file.as_file(), 0, 16).unwrap();
    regs.write(3, 0xdead_beef);
    assert_eq!(regs.read(3), 0xdead_beef);
    regs.write(4, 0x1234);
    assert_eq!(regs.read(4), 0);
    assert_eq!(regs.read(usize::MAX), 0);
    assert_eq!(regs.read(0), 0);
  }

  #[test]
  fn open_missing_devmem() {
    let settings = MemorySettings {
      devmem : String::from("/this/does/not/exist/mem"),
    };
    match DeviceMap::open(&settings) {
      Err(MemoryError::DevMem(_)) => (),
      other => panic!("Expected DevMem error, got {:?}", other.map(|_| ())),
    }
  }
}
