//! Convenience functions to set up the trigger
//! and the test control registers
//!
//! For the mapping of registers/addresses,
//! see `registers.rs`
//!

use std::io;
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::Duration;

use uubdaq_lib::settings::{
  TriggerSettings,
  TriggerSource,
};

use crate::memory::{Block, RegisterAccess};
use crate::registers::*;

/// Fire the LED and wait for the pulse to get recorded
pub fn led_trigger<H : RegisterAccess>(regs : &mut H) {
  trace!("LED pulse!");
  regs.write(Block::Trigger, LED_CONTROL_ADDR, 0);
  regs.write(Block::Trigger, LED_CONTROL_ADDR, 1);
  // without waiting, there is nothing to read
  thread::sleep(Duration::from_micros(100));
}

/// Use the internal PPS instead of the GPS receiver
pub fn set_fake_pps<H : RegisterAccess>(regs : &mut H) {
  trace!("Enable fake PPS!");
  regs.set_bits(Block::TestControl, USE_FAKE_ADDR, 1 << USE_FAKE_PPS_BIT);
}

/// Write the trigger mask and thresholds of a source
pub fn apply_trigger_source<H : RegisterAccess>(regs     : &mut H,
                                                settings : &TriggerSettings) {
  let thr    = settings.thresholds;
  let enable = settings.enable();
  info!("Using trigger {}", settings.source);
  match settings.source {
    TriggerSource::External => {
      regs.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, COMPATIBILITY_SHWR_BUF_TRIG_EXT);
    }
    TriggerSource::SingleBin | TriggerSource::SingleBinMulti => {
      regs.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, SHWR_BUF_TRIG_SB);
      regs.write(Block::Trigger, SB_TRIG_THR0_ADDR, thr[0]);
      regs.write(Block::Trigger, SB_TRIG_THR1_ADDR, thr[1]);
      regs.write(Block::Trigger, SB_TRIG_THR2_ADDR, thr[2]);
      regs.write(Block::Trigger, SB_TRIG_SSD_ADDR,  thr[3]);
      regs.write(Block::Trigger, SB_TRIG_ENAB_ADDR, enable);
    }
    TriggerSource::CompatSingleBin => {
      regs.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, COMPATIBILITY_SHWR_BUF_TRIG_SB);
      regs.write(Block::Trigger, COMPATIBILITY_SB_TRIG_THR0_ADDR, thr[0]);
      regs.write(Block::Trigger, COMPATIBILITY_SB_TRIG_THR1_ADDR, thr[1]);
      regs.write(Block::Trigger, COMPATIBILITY_SB_TRIG_THR2_ADDR, thr[2]);
      regs.write(Block::Trigger, COMPATIBILITY_SB_TRIG_ENAB_ADDR, enable);
    }
  }
}

/// Holds the register map while we changed the
/// trigger mask. The previous mask is written back
/// when the guard goes out of scope.
pub struct TriggerGuard<'a, H : RegisterAccess> {
  regs  : &'a mut H,
  saved : u32,
}

impl<'a, H : RegisterAccess> TriggerGuard<'a, H> {

  /// Save the current trigger and switch to the LED
  pub fn led(regs : &'a mut H) -> Self {
    let saved = regs.read(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR);
    debug!("Saved trigger mask {:#x}, switching to LED", saved);
    regs.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, SHWR_BUF_TRIG_LED);
    TriggerGuard { regs, saved }
  }

  /// Save the current trigger and switch to the
  /// configured source
  pub fn configure(regs : &'a mut H, settings : &TriggerSettings) -> Self {
    let saved = regs.read(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR);
    debug!("Saved trigger mask {:#x}", saved);
    apply_trigger_source(regs, settings);
    TriggerGuard { regs, saved }
  }

  pub fn saved_mask(&self) -> u32 {
    self.saved
  }
}

impl<'a, H : RegisterAccess> Deref for TriggerGuard<'a, H> {
  type Target = H;
  fn deref(&self) -> &H {
    self.regs
  }
}

impl<'a, H : RegisterAccess> DerefMut for TriggerGuard<'a, H> {
  fn deref_mut(&mut self) -> &mut H {
    self.regs
  }
}

impl<'a, H : RegisterAccess> Drop for TriggerGuard<'a, H> {
  fn drop(&mut self) {
    debug!("Restoring trigger mask {:#x}", self.saved);
    self.regs.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, self.saved);
  }
}

/// Ask for the realtime scheduler. Not being
/// allowed to is not fatal.
pub fn request_realtime_priority(priority : i32) {
  if priority <= 0 {
    return;
  }
  let param = libc::sched_param { sched_priority : priority };
  let ret   = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
  if ret < 0 {
    warn!("Schedule setting error: {}", io::Error::last_os_error());
  } else {
    debug!("Running with SCHED_FIFO priority {}", priority);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sim::{SimulatedBoard, SimPattern};

  #[test]
  fn led_guard_restores_mask() {
    let mut board = SimulatedBoard::new([SimPattern::Ramp;5]);
    board.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, 0x1234);
    {
      let mut guard = TriggerGuard::led(&mut board);
      assert_eq!(guard.saved_mask(), 0x1234);
      led_trigger(&mut *guard);
      assert_eq!(guard.read(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR), SHWR_BUF_TRIG_LED);
    }
    assert_eq!(board.read(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR), 0x1234);
    assert_eq!(board.pending(), 1);
  }

  #[test]
  fn single_bin_multi_registers() {
    let mut board = SimulatedBoard::new([SimPattern::Ramp;5]);
    let mut settings = TriggerSettings::new();
    settings.source = TriggerSource::SingleBinMulti;
    {
      let _guard = TriggerGuard::configure(&mut board, &settings);
    }
    let writes = board.trigger_writes();
    assert!(writes.contains(&(SB_TRIG_ENAB_ADDR, 0x37)));
    assert!(writes.contains(&(SB_TRIG_SSD_ADDR, 1000)));
    assert_eq!(writes.last(), Some(&(SHWR_BUF_TRIG_MASK_ADDR, 0)));
  }

  #[test]
  fn fake_pps_keeps_other_bits() {
    let mut board = SimulatedBoard::new([SimPattern::Ramp;5]);
    board.write(Block::TestControl, USE_FAKE_ADDR, 0x10);
    set_fake_pps(&mut board);
    assert_eq!(board.read(Block::TestControl, USE_FAKE_ADDR), 0x10 | (1 << USE_FAKE_PPS_BIT));
  }
}
