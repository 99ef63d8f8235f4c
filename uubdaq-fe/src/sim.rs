//! A simulated UUB
//!
//! Stands in for the register blocks, the shower
//! ring buffers, the wake-up timer and the SPI links
//! of the ADCs, so that the readout and the ADC
//! control can run without hardware.
//!
//! All parts share one state. Writing the ramp test
//! mode to an ADC through its MockSpi link changes
//! what the ring buffers of that ADC deliver.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use uubdaq_lib::constants::{
  NSAMPLES,
  RAW_NCH,
  SHWR_MEM_NBUF,
  MAX_SAMPLE_VAL,
  ADC_ADDR_TEST,
  ADC_RAMPON,
  ADC_READ_FLAG,
};
use uubdaq_lib::errors::{
  MemoryError,
  ReadoutError,
};

use crate::adc::SpiLink;
use crate::memory::{Block, RegisterAccess};
use crate::reader::{Tick, Ticker};
use crate::registers::*;

/// Baseline of an ADC which is not in ramp mode
pub const SIM_BASELINE : u16 = 250;

/// What an ADC delivers
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SimPattern {
  /// A healthy ADC: the test ramp when in ramp
  /// mode, a flat baseline otherwise
  Ramp,
  /// A broken ADC stuck at a value
  Constant(u16),
  /// Channel B does not follow channel A
  Skewed,
}

type TickHook = Box<dyn FnMut(u64)>;

struct SimState {
  patterns        : [SimPattern;RAW_NCH],
  ramp_on         : [bool;RAW_NCH],
  trigger_regs    : Vec<u32>,
  ttag_regs       : Vec<u32>,
  test_regs       : Vec<u32>,
  trigger_writes  : Vec<(usize, u32)>,
  slots           : Vec<Vec<u32>>,
  wr              : usize,
  rd              : usize,
  nfull           : usize,
  n_events        : u32,
  buf_start       : u32,
  ticks           : u64,
  trigger_at_tick : Option<u64>,
  tick_hook       : Option<TickHook>,
  adc_regs        : Vec<HashMap<u16, u8>>,
  readback_errors : HashMap<(usize, u16), u8>,
  failing_adcs    : Vec<usize>,
  spi_log         : Vec<(usize, Vec<u8>)>,
}

impl SimState {

  fn new(patterns : [SimPattern;RAW_NCH]) -> Self {
    SimState {
      patterns,
      ramp_on         : [false;RAW_NCH],
      trigger_regs    : vec![0u32; REG_BLOCK_WORDS],
      ttag_regs       : vec![0u32; REG_BLOCK_WORDS],
      test_regs       : vec![0u32; REG_BLOCK_WORDS],
      trigger_writes  : Vec::new(),
      slots           : vec![vec![0u32; NSAMPLES*SHWR_MEM_NBUF]; RAW_NCH],
      wr              : 0,
      rd              : 0,
      nfull           : 0,
      n_events        : 0,
      buf_start       : 17,
      ticks           : 0,
      trigger_at_tick : None,
      tick_hook       : None,
      adc_regs        : vec![HashMap::new(); RAW_NCH],
      readback_errors : HashMap::new(),
      failing_adcs    : Vec::new(),
      spi_log         : Vec::new(),
    }
  }

  fn update_status(&mut self) {
    self.trigger_regs[SHWR_BUF_STATUS_ADDR] =
        ((self.nfull as u32) << SHWR_BUF_NFULL_SHIFT)
      | ((self.rd as u32) << SHWR_BUF_RNUM_SHIFT);
  }

  /// Sample i (after the trigger position) of an ADC,
  /// channels A and B
  fn sample(&self, adc : usize, i : usize) -> (u32, u32) {
    let ramp = |first : u32| (first + MAX_SAMPLE_VAL - (i as u32 % MAX_SAMPLE_VAL)) % MAX_SAMPLE_VAL;
    match self.patterns[adc] {
      SimPattern::Ramp => {
        if self.ramp_on[adc] {
          let v = ramp(100*adc as u32 + self.n_events);
          (v, v)
        } else {
          (SIM_BASELINE as u32, SIM_BASELINE as u32)
        }
      }
      SimPattern::Constant(c) => (c as u32, c as u32),
      SimPattern::Skewed => {
        let v = ramp(42);
        (v, (v + 1) % MAX_SAMPLE_VAL)
      }
    }
  }

  /// The hardware fills the next free slot
  fn fill_slot(&mut self) {
    if self.nfull >= SHWR_MEM_NBUF {
      warn!("All shower buffers full, dropping the event");
      return;
    }
    let start = self.buf_start as usize % NSAMPLES;
    for adc in 0..RAW_NCH {
      for i in 0..NSAMPLES {
        let (a, b) = self.sample(adc, i);
        let k      = (start + i) % NSAMPLES;
        self.slots[adc][self.wr*NSAMPLES + k] = (b << 16) | a;
      }
    }
    self.n_events += 1;
    self.trigger_regs[SHWR_BUF_START_ADDR]   = self.buf_start;
    self.trigger_regs[SHWR_BUF_TRIG_ID_ADDR] = self.n_events;
    self.ttag_regs[TTAG_SHWR_SECONDS_ADDR]   = 1_000 + self.n_events;
    self.ttag_regs[TTAG_SHWR_NANOSEC_ADDR]   = ((self.n_events & 0x3) << 30) | (self.ticks as u32 & 0x3fff_ffff);
    self.wr     = (self.wr + 1) % SHWR_MEM_NBUF;
    self.nfull += 1;
    self.update_status();
  }

  fn release(&mut self, slot : u32) {
    if self.nfull == 0 || slot as usize != self.rd {
      warn!("Release of slot {} which is not being read!", slot);
      return;
    }
    self.rd     = (self.rd + 1) % SHWR_MEM_NBUF;
    self.nfull -= 1;
    self.update_status();
  }
}

/// Registers and ring buffers of a simulated board
pub struct SimulatedBoard {
  state : Rc<RefCell<SimState>>,
}

impl SimulatedBoard {

  pub fn new(patterns : [SimPattern;RAW_NCH]) -> Self {
    let mut state = SimState::new(patterns);
    state.update_status();
    SimulatedBoard {
      state : Rc::new(RefCell::new(state)),
    }
  }

  /// Wake-ups for an EventReader on this board
  pub fn ticker(&self) -> SimTicker {
    SimTicker {
      state : Rc::clone(&self.state),
    }
  }

  /// SPI links to the simulated ADCs
  pub fn adc_links(&self) -> Vec<Option<MockSpi>> {
    (0..RAW_NCH).map(|adc| Some(MockSpi {
      adc,
      state : Rc::clone(&self.state),
    })).collect()
  }

  /// Let the hardware record n events right away
  pub fn queue_events(&mut self, n : usize) {
    let mut state = self.state.borrow_mut();
    for _ in 0..n {
      state.fill_slot();
    }
  }

  /// Record an event when the timer ticked n times
  pub fn trigger_after_ticks(&mut self, n : u64) {
    self.state.borrow_mut().trigger_at_tick = Some(n);
  }

  /// Called with the tick count on every wake-up
  pub fn on_tick(&mut self, hook : impl FnMut(u64) + 'static) {
    self.state.borrow_mut().tick_hook = Some(Box::new(hook));
  }

  pub fn set_buf_start(&mut self, start : u32) {
    self.state.borrow_mut().buf_start = start;
  }

  /// Every transaction on this ADC fails
  pub fn fail_adc(&mut self, adc : usize) {
    self.state.borrow_mut().failing_adcs.push(adc);
  }

  /// The register reads back a wrong value
  pub fn corrupt_readback(&mut self, adc : usize, addr : u16, value : u8) {
    self.state.borrow_mut().readback_errors.insert((adc, addr), value);
  }

  pub fn buf_start(&self) -> u32 {
    self.state.borrow().buf_start
  }

  pub fn ticks(&self) -> u64 {
    self.state.borrow().ticks
  }

  /// Number of filled, not yet released slots
  pub fn pending(&self) -> usize {
    self.state.borrow().nfull
  }

  pub fn is_ramp_on(&self, adc : usize) -> bool {
    self.state.borrow().ramp_on[adc]
  }

  /// All writes to the trigger block, in order
  pub fn trigger_writes(&self) -> Vec<(usize, u32)> {
    self.state.borrow().trigger_writes.clone()
  }

  /// All SPI transactions (adc, bytes), in order
  pub fn spi_log(&self) -> Vec<(usize, Vec<u8>)> {
    self.state.borrow().spi_log.clone()
  }

  /// The current value of an ADC register
  pub fn adc_register(&self, adc : usize, addr : u16) -> Option<u8> {
    self.state.borrow().adc_regs[adc].get(&addr).copied()
  }
}

impl RegisterAccess for SimulatedBoard {

  fn read(&self, block : Block, word : usize) -> u32 {
    let state = self.state.borrow();
    match block {
      Block::Trigger     => state.trigger_regs[word],
      Block::TimeTagging => state.ttag_regs[word],
      Block::TestControl => state.test_regs[word],
    }
  }

  fn write(&mut self, block : Block, word : usize, value : u32) {
    let mut state = self.state.borrow_mut();
    match block {
      Block::Trigger => {
        state.trigger_writes.push((word, value));
        match word {
          SHWR_BUF_CONTROL_ADDR => state.release(value),
          SHWR_BUF_STATUS_ADDR  => (),
          LED_CONTROL_ADDR      => {
            let led_enabled = state.trigger_regs[SHWR_BUF_TRIG_MASK_ADDR] & SHWR_BUF_TRIG_LED != 0;
            if value == 1 && led_enabled {
              state.fill_slot();
            }
            state.trigger_regs[word] = value;
          }
          _ => state.trigger_regs[word] = value,
        }
      }
      Block::TimeTagging => state.ttag_regs[word] = value,
      Block::TestControl => state.test_regs[word] = value,
    }
  }

  fn copy_slot(&self,
               channel : usize,
               slot    : usize,
               dst     : &mut [u32]) -> Result<(), MemoryError> {
    let state = self.state.borrow();
    if channel >= RAW_NCH {
      return Err(MemoryError::NoSuchChannel(channel));
    }
    if slot >= SHWR_MEM_NBUF {
      return Err(MemoryError::SlotOutOfRange { channel, slot });
    }
    if dst.len() < NSAMPLES {
      return Err(MemoryError::DestinationTooShort(dst.len()));
    }
    dst[..NSAMPLES].copy_from_slice(&state.slots[channel][slot*NSAMPLES..(slot+1)*NSAMPLES]);
    Ok(())
  }
}

/// The wake-up timer of a simulated board
pub struct SimTicker {
  state : Rc<RefCell<SimState>>,
}

impl Ticker for SimTicker {
  fn wait(&mut self) -> Result<Tick, ReadoutError> {
    let (ticks, hook) = {
      let mut state = self.state.borrow_mut();
      state.ticks += 1;
      (state.ticks, state.tick_hook.take())
    };
    if let Some(mut hook) = hook {
      hook(ticks);
      self.state.borrow_mut().tick_hook = Some(hook);
    }
    let mut state = self.state.borrow_mut();
    if state.trigger_at_tick == Some(ticks) {
      state.fill_slot();
    }
    Ok(Tick::Wakeup)
  }
}

/// SPI link to a simulated ADC
pub struct MockSpi {
  adc   : usize,
  state : Rc<RefCell<SimState>>,
}

impl SpiLink for MockSpi {

  fn write_bytes(&mut self, bytes : &[u8]) -> io::Result<usize> {
    let mut state = self.state.borrow_mut();
    state.spi_log.push((self.adc, bytes.to_vec()));
    if state.failing_adcs.contains(&self.adc) {
      return Err(io::Error::new(io::ErrorKind::Other, "simulated SPI failure"));
    }
    if bytes.len() != 3 {
      return Ok(0);
    }
    let addr  = ((bytes[0] as u16) << 8) | bytes[1] as u16;
    let value = bytes[2];
    state.adc_regs[self.adc].insert(addr, value);
    if addr == ADC_ADDR_TEST {
      state.ramp_on[self.adc] = value == ADC_RAMPON;
    }
    Ok(3)
  }

  fn write_then_read(&mut self, tx : &[u8], rx : &mut [u8]) -> io::Result<()> {
    let mut state = self.state.borrow_mut();
    state.spi_log.push((self.adc, tx.to_vec()));
    if state.failing_adcs.contains(&self.adc) || tx.len() != 2 || rx.is_empty() {
      return Err(io::Error::new(io::ErrorKind::Other, "simulated SPI failure"));
    }
    let addr = (((tx[0] & !ADC_READ_FLAG) as u16) << 8) | tx[1] as u16;
    rx[0] = match state.readback_errors.get(&(self.adc, addr)) {
      Some(value) => *value,
      None        => state.adc_regs[self.adc].get(&addr).copied().unwrap_or(0),
    };
    Ok(())
  }
}
