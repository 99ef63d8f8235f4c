//! Front-end code running on the UUB
//!
//! Register and ring buffer access, ADC control,
//! event readout, streaming and the ramp self test.
//! The binaries in src/bin are thin wrappers around
//! these modules.

pub mod registers;
pub mod memory;
pub mod control;
pub mod adc;
pub mod reader;
pub mod stream;
pub mod ramp_server;
pub mod selftest;
pub mod sim;

#[macro_use] extern crate log;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use uubdaq_lib::errors::{
  FrontEndError,
  ReadoutError,
};

/// A flag which gets set on SIGINT/SIGTERM, so that
/// the long running tools can clean up
pub fn register_stop_flag() -> Result<Arc<AtomicBool>, FrontEndError> {
  let stop = Arc::new(AtomicBool::new(false));
  for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
    signal_hook::flag::register(sig, Arc::clone(&stop))
      .map_err(ReadoutError::Signal)?;
  }
  Ok(stop)
}
