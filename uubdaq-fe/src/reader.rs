//! Trigger wait and event readout
//!
//! The firmware does not interrupt us. Instead, a
//! periodic timer wakes the process up and we look
//! at the status register, whether one of the ring
//! buffer slots got filled. If so, the slot of every
//! raw channel is copied into the staging buffer,
//! the header registers are snapshotted and the slot
//! is handed back to the hardware.

use std::fs::File;
use std::io;
use std::io::Read;
use std::os::unix::io::FromRawFd;
use std::time::Instant;

use uubdaq_lib::constants::{
  NSAMPLES,
  RAW_NCH,
  DATASIZE,
};
use uubdaq_lib::errors::{
  FrontEndError,
  ReadoutError,
};
use uubdaq_lib::events::EventHeader;

use crate::memory::{Block, RegisterAccess};
use crate::registers::*;

/// What woke us up
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Tick {
  /// The periodic timer expired
  Wakeup,
  /// Something else (e.g. a signal), give up waiting
  Interrupted,
}

/// Source of the periodic wake-ups
pub trait Ticker {
  /// Block until the next wake-up
  fn wait(&mut self) -> Result<Tick, ReadoutError>;
}

/// Periodic wake-up through a timerfd
#[derive(Debug)]
pub struct TimerFd {
  fd : File,
}

impl TimerFd {

  /// Create the timer and arm it with the given interval
  ///
  /// An interval of 0 would disarm the timer, it
  /// gets raised to 1 ns.
  pub fn new(interval_ns : u64) -> Result<Self, ReadoutError> {
    let interval_ns = interval_ns.max(1);
    let raw = unsafe {
      libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC)
    };
    if raw < 0 {
      return Err(ReadoutError::Timer(io::Error::last_os_error()));
    }
    // closes the timer when dropped
    let fd = unsafe { File::from_raw_fd(raw) };
    let period = libc::timespec {
      tv_sec  : (interval_ns / 1_000_000_000) as libc::time_t,
      tv_nsec : (interval_ns % 1_000_000_000) as libc::c_long,
    };
    let spec = libc::itimerspec {
      it_interval : period,
      it_value    : period,
    };
    let ret = unsafe {
      libc::timerfd_settime(raw, 0, &spec, std::ptr::null_mut())
    };
    if ret != 0 {
      return Err(ReadoutError::SetTime(io::Error::last_os_error()));
    }
    debug!("Armed wake-up timer with an interval of {} ns", interval_ns);
    Ok(TimerFd { fd })
  }
}

impl Ticker for TimerFd {
  fn wait(&mut self) -> Result<Tick, ReadoutError> {
    // number of expirations since the last read.
    // Only one read, a signal has to end the wait
    let mut expirations = [0u8;8];
    match self.fd.read(&mut expirations) {
      Ok(8) => Ok(Tick::Wakeup),
      Ok(n) => {
        error!("Short read of {} bytes from the timer", n);
        Err(ReadoutError::Wait(io::Error::from(io::ErrorKind::UnexpectedEof)))
      }
      Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(Tick::Interrupted),
      Err(err) => Err(ReadoutError::Wait(err)),
    }
  }
}

/// Destination of the slot copies
///
/// The DMA friendly layout of the firmware tools
/// wants the buffer to start at an address which
/// is 4 modulo 8.
#[derive(Debug)]
pub struct StagingBuffer {
  storage : Vec<u32>,
  offset  : usize,
}

impl StagingBuffer {

  pub fn new() -> Result<Self, ReadoutError> {
    let storage = vec![0u32; DATASIZE + 2];
    let base    = storage.as_ptr() as usize;
    let offset  = match base % 8 {
      4 => 0,
      0 => 1,
      _ => {
        error!("Databuf alignment problem: buffer at {:#x}", base);
        return Err(ReadoutError::BufAlign);
      }
    };
    let buf = StagingBuffer { storage, offset };
    if (buf.as_slice().as_ptr() as usize) % 8 != 4 {
      return Err(ReadoutError::BufAlign);
    }
    Ok(buf)
  }

  /// The event data, NSAMPLES words per raw channel
  pub fn as_slice(&self) -> &[u32] {
    &self.storage[self.offset..self.offset + DATASIZE]
  }

  pub fn as_mut_slice(&mut self) -> &mut [u32] {
    &mut self.storage[self.offset..self.offset + DATASIZE]
  }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ReaderState {
  /// Waiting for the buffer full flag
  Idle,
  /// Copying a slot out of the ring buffers
  Draining,
}

/// Result of a single readout attempt
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ReadOutcome {
  /// An event is in the staging buffer
  Event { header : EventHeader, duration_us : u64 },
  /// We were interrupted or the tick budget ran out
  TimedOut,
}

/// Reads events one by one out of the ring buffers
#[derive(Debug)]
pub struct EventReader<T : Ticker> {
  ticker     : T,
  staging    : StagingBuffer,
  id_counter : u32,
  state      : ReaderState,
}

impl<T : Ticker> EventReader<T> {

  pub fn new(ticker : T) -> Result<Self, ReadoutError> {
    Ok(EventReader {
      ticker,
      staging    : StagingBuffer::new()?,
      id_counter : 0,
      state      : ReaderState::Idle,
    })
  }

  /// The id the next event will get
  pub fn next_id(&self) -> u32 {
    self.id_counter
  }

  pub fn state(&self) -> ReaderState {
    self.state
  }

  /// The data of the last event read
  pub fn data(&self) -> &[u32] {
    self.staging.as_slice()
  }

  /// Wait for an event and read it out
  ///
  /// # Arguments
  ///
  /// * regs      : register and ring buffer access
  /// * max_ticks : give up after this many wake-ups
  ///               without data (0 waits forever)
  pub fn read_event<H : RegisterAccess>(&mut self,
                                        regs      : &mut H,
                                        max_ticks : u64)
    -> Result<ReadOutcome, FrontEndError> {
    let mut n_ticks = 0u64;
    while status_nfull(regs.read(Block::Trigger, SHWR_BUF_STATUS_ADDR)) == 0 {
      if max_ticks > 0 && n_ticks >= max_ticks {
        trace!("No trigger within {} ticks", n_ticks);
        return Ok(ReadOutcome::TimedOut);
      }
      match self.ticker.wait()? {
        Tick::Wakeup      => n_ticks += 1,
        Tick::Interrupted => {
          debug!("Wait for trigger got interrupted");
          return Ok(ReadOutcome::TimedOut);
        }
      }
    }
    self.state = ReaderState::Draining;
    let result = self.drain(regs);
    self.state = ReaderState::Idle;
    result
  }

  fn drain<H : RegisterAccess>(&mut self, regs : &mut H)
    -> Result<ReadOutcome, FrontEndError> {
    let start = Instant::now();
    let rd    = status_rnum(regs.read(Block::Trigger, SHWR_BUF_STATUS_ADDR));
    let buf   = self.staging.as_mut_slice();
    for ch in 0..RAW_NCH {
      regs.copy_slot(ch, rd, &mut buf[ch*NSAMPLES..(ch+1)*NSAMPLES])?;
    }
    let header = EventHeader {
      id           : self.id_counter,
      buf_status   : regs.read(Block::Trigger, SHWR_BUF_STATUS_ADDR),
      buf_start    : regs.read(Block::Trigger, SHWR_BUF_START_ADDR),
      trig_id      : regs.read(Block::Trigger, SHWR_BUF_TRIG_ID_ADDR),
      ttag_seconds : regs.read(Block::TimeTagging, TTAG_SHWR_SECONDS_ADDR),
      ttag_nanosec : regs.read(Block::TimeTagging, TTAG_SHWR_NANOSEC_ADDR),
      rd           : rd as u32,
    };
    // release the slot, has to be the last register access
    regs.write(Block::Trigger, SHWR_BUF_CONTROL_ADDR, rd as u32);
    self.id_counter = self.id_counter.wrapping_add(1);
    let duration_us = start.elapsed().as_micros() as u64;
    Ok(ReadOutcome::Event { header, duration_us })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sim::{SimulatedBoard, SimPattern};

  #[test]
  fn staging_alignment() {
    let buf = StagingBuffer::new().unwrap();
    assert_eq!(buf.as_slice().as_ptr() as usize % 8, 4);
    assert_eq!(buf.as_slice().len(), DATASIZE);
  }

  #[test]
  fn timer_ticks() {
    let mut timer = TimerFd::new(10_000).unwrap();
    assert_eq!(timer.wait().unwrap(), Tick::Wakeup);
    assert_eq!(timer.wait().unwrap(), Tick::Wakeup);
  }

  extern "C" fn on_sigusr1(_ : libc::c_int) {}

  #[test]
  fn signal_ends_the_wait() {
    // no SA_RESTART, so the read returns EINTR
    unsafe {
      let mut action : libc::sigaction = std::mem::zeroed();
      action.sa_sigaction = on_sigusr1 as extern "C" fn(libc::c_int) as libc::sighandler_t;
      action.sa_flags     = 0;
      libc::sigemptyset(&mut action.sa_mask);
      assert_eq!(libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()), 0);
    }
    let (tx, rx) = std::sync::mpsc::channel();
    let waiter = std::thread::spawn(move || {
      tx.send(unsafe { libc::pthread_self() }).unwrap();
      let mut timer = TimerFd::new(5_000_000_000).unwrap();
      let start     = Instant::now();
      let tick      = timer.wait().unwrap();
      (tick, start.elapsed())
    });
    let thread_id = rx.recv().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(100));
    unsafe {
      libc::pthread_kill(thread_id, libc::SIGUSR1);
    }
    let (tick, elapsed) = waiter.join().unwrap();
    assert_eq!(tick, Tick::Interrupted);
    assert!(elapsed < std::time::Duration::from_secs(4));
  }

  #[test]
  fn zero_interval_still_ticks() {
    let mut timer = TimerFd::new(0).unwrap();
    assert_eq!(timer.wait().unwrap(), Tick::Wakeup);
  }

  #[test]
  fn times_out_without_trigger() {
    let mut board  = SimulatedBoard::new([SimPattern::Ramp;5]);
    let mut reader = EventReader::new(board.ticker()).unwrap();
    assert_eq!(reader.read_event(&mut board, 5).unwrap(), ReadOutcome::TimedOut);
    assert_eq!(board.ticks(), 5);
    assert_eq!(reader.next_id(), 0);
    assert_eq!(reader.state(), ReaderState::Idle);
  }

  #[test]
  fn read_releases_the_slot_last() {
    let mut board  = SimulatedBoard::new([SimPattern::Ramp;5]);
    board.queue_events(2);
    let mut reader = EventReader::new(board.ticker()).unwrap();
    for expected_id in 0..2u32 {
      match reader.read_event(&mut board, 0).unwrap() {
        ReadOutcome::Event { header, .. } => {
          assert_eq!(header.id, expected_id);
          assert_eq!(header.rd, expected_id);
          assert_eq!(header.buf_start, board.buf_start());
        }
        ReadOutcome::TimedOut => panic!("Expected an event"),
      }
      let writes = board.trigger_writes();
      assert_eq!(writes.last(), Some(&(SHWR_BUF_CONTROL_ADDR, expected_id)));
    }
    assert_eq!(reader.next_id(), 2);
    assert_eq!(board.pending(), 0);
  }

  #[test]
  fn event_arrives_after_some_ticks() {
    let mut board  = SimulatedBoard::new([SimPattern::Ramp;5]);
    board.trigger_after_ticks(3);
    let mut reader = EventReader::new(board.ticker()).unwrap();
    let outcome = reader.read_event(&mut board, 0).unwrap();
    assert!(matches!(outcome, ReadOutcome::Event { .. }));
    assert_eq!(board.ticks(), 3);
  }
}
