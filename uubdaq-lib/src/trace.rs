//! Unpacking of the shower buffer words
//!
//! Each 32 bit word of a raw channel carries two
//! 12 bit samples. The low half belongs to the
//! analog channel A (logical channel 2c), the high
//! half to channel B (2c+1).
//!
//! The trigger position is not at the beginning of
//! the slot, the trace starts at buf_start and wraps
//! around at the end of the slot.

use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::{
  NSAMPLES,
  NCH,
  RAW_NCH,
  DATASIZE,
  SAMPLE_MASK,
  HIGH_SAMPLE_SHIFT,
};
use crate::errors::UnpackError;
use crate::events::EventHeader;

/// The samples of all logical channels of one event
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
  samples : Vec<u16>,
}

impl Trace {

  pub fn new() -> Self {
    Trace {
      samples : vec![0u16; NCH*NSAMPLES],
    }
  }

  /// Unpack the staging buffer as described by the header
  pub fn from_event(header  : &EventHeader,
                    databuf : &[u32]) -> Result<Self, UnpackError> {
    let mut trace = Trace::new();
    trace.unpack(header.buf_start, databuf)?;
    Ok(trace)
  }

  /// Refill all channels from the packed words
  ///
  /// # Arguments
  ///
  /// * start   : offset of the first sample in each
  ///             channel's slot
  /// * databuf : NSAMPLES words per raw channel,
  ///             channel major
  pub fn unpack(&mut self, start : u32, databuf : &[u32]) -> Result<(), UnpackError> {
    if start as usize >= NSAMPLES {
      return Err(UnpackError::StartOutOfRange(start));
    }
    if databuf.len() < DATASIZE {
      return Err(UnpackError::BufferTooShort(databuf.len()));
    }
    let start = start as usize;
    for adc in 0..RAW_NCH {
      let words = &databuf[adc*NSAMPLES..(adc+1)*NSAMPLES];
      for i in 0..NSAMPLES {
        let word = words[(start + i) % NSAMPLES];
        self.samples[(2*adc)*NSAMPLES + i]     = (word & SAMPLE_MASK) as u16;
        self.samples[(2*adc + 1)*NSAMPLES + i] = ((word >> HIGH_SAMPLE_SHIFT) & SAMPLE_MASK) as u16;
      }
    }
    Ok(())
  }

  /// The samples of a logical channel (0..NCH)
  pub fn channel(&self, ch : usize) -> &[u16] {
    &self.samples[ch*NSAMPLES..(ch+1)*NSAMPLES]
  }

  pub fn channel_mut(&mut self, ch : usize) -> &mut [u16] {
    &mut self.samples[ch*NSAMPLES..(ch+1)*NSAMPLES]
  }

  /// Write the trace as text, one line per sample
  /// with a 5 wide column per logical channel
  pub fn write_to<W : Write>(&self, writer : &mut W) -> io::Result<()> {
    for i in 0..NSAMPLES {
      for ch in 0..NCH {
        write!(writer, "{:5}", self.samples[ch*NSAMPLES + i])?;
      }
      writeln!(writer)?;
    }
    Ok(())
  }

  /// Dump the trace to a file, see write_to
  pub fn dump(&self, path : &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    self.write_to(&mut writer)?;
    writer.flush()
  }
}

impl Default for Trace {
  fn default() -> Self {
    Self::new()
  }
}
