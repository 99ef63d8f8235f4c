//! Control of the AD9268 ADCs over SPI
//!
//! Each of the 5 ADCs has its own spidev device.
//! A register write is a plain 3 byte write
//! (address high, address low, value), a read is
//! a single SPI message with a 2 byte address phase
//! (read flag set) followed by one response byte.
//!
//! An ADC which failed once is never talked to
//! again, but the others carry on.

use std::fs::File;
use std::io;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use uubdaq_lib::constants::{
  ADC_ADDR_CHS,
  ADC_ADDR_TEST,
  ADC_MASK_CHS,
  ADC_RAMPON,
  ADC_RAMPOFF,
  ADC_READ_FLAG,
};
use uubdaq_lib::errors::AdcError;
use uubdaq_lib::settings::AdcSettings;

//========== spidev ioctls ======================

const SPI_IOC_MAGIC : u32 = b'k' as u32;
const IOC_WRITE     : u32 = 1;
const IOC_READ      : u32 = 2;

const fn ioc(dir : u32, nr : u32, size : u32) -> u32 {
  (dir << 30) | (size << 16) | (SPI_IOC_MAGIC << 8) | nr
}

const SPI_IOC_WR_MODE          : u32 = ioc(IOC_WRITE, 1, 1);
const SPI_IOC_RD_MODE          : u32 = ioc(IOC_READ,  1, 1);
const SPI_IOC_WR_BITS_PER_WORD : u32 = ioc(IOC_WRITE, 3, 1);
const SPI_IOC_RD_BITS_PER_WORD : u32 = ioc(IOC_READ,  3, 1);
const SPI_IOC_WR_MAX_SPEED_HZ  : u32 = ioc(IOC_WRITE, 4, 4);
const SPI_IOC_RD_MAX_SPEED_HZ  : u32 = ioc(IOC_READ,  4, 4);

/// One transfer of a SPI message (linux/spi/spidev.h)
#[repr(C)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
  tx_buf           : u64,
  rx_buf           : u64,
  len              : u32,
  speed_hz         : u32,
  delay_usecs      : u16,
  bits_per_word    : u8,
  cs_change        : u8,
  tx_nbits         : u8,
  rx_nbits         : u8,
  word_delay_usecs : u8,
  pad              : u8,
}

const fn spi_ioc_message(n : u32) -> u32 {
  ioc(IOC_WRITE, 0, n*std::mem::size_of::<SpiIocTransfer>() as u32)
}

/// One step of the ADC initialization
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum InitStep {
  /// Write without read back
  Write(u16, u8),
  /// Write and verify
  Check(u16, u8),
}

/// AD9268 power-up sequence
pub const ADC_INIT_SEQUENCE : [InitStep;7] = [
  // select both channels A and B
  InitStep::Check(0x0005, 0x03),
  // digital reset
  InitStep::Check(0x0008, 0x03),
  InitStep::Check(0x0008, 0x00),
  // soft reset, reads back 0x18
  InitStep::Write(0x0000, 0x3c),
  // output mode LVDS inverted
  InitStep::Check(0x0014, 0xa4),
  // VREF 2.0V p-p
  InitStep::Check(0x0018, 0x04),
  // normal mode
  InitStep::Check(0x000d, 0x00),
];

/// Byte level access to the SPI bus of one ADC
pub trait SpiLink {

  /// Write the bytes in one transfer, returns
  /// the number of bytes written
  fn write_bytes(&mut self, bytes : &[u8]) -> io::Result<usize>;

  /// Send tx, then clock in rx.len() bytes
  /// within the same chip select
  fn write_then_read(&mut self, tx : &[u8], rx : &mut [u8]) -> io::Result<()>;
}

/// A linux spidev device
#[derive(Debug)]
pub struct Spidev {
  file : File,
}

impl Spidev {

  /// Open the spidev device of an ADC and configure
  /// mode, word size and speed for both directions
  pub fn open(adc : usize, settings : &AdcSettings) -> Result<Self, AdcError> {
    let path = settings.device_path(adc);
    let file = match File::options().read(true).write(true).open(&path) {
      Err(source) => {
        error!("Cannot open SPI device {}! {}", path, source);
        return Err(AdcError::Open { adc, source });
      }
      Ok(f) => f,
    };
    let dev = Spidev { file };
    let mut mode  = settings.spi_mode;
    let mut bits  = settings.bits_per_word;
    let mut speed = settings.spi_speed_hz;
    dev.ioctl(SPI_IOC_WR_MODE, &mut mode).map_err(|_| AdcError::WrMode(adc))?;
    dev.ioctl(SPI_IOC_RD_MODE, &mut mode).map_err(|_| AdcError::RdMode(adc))?;
    dev.ioctl(SPI_IOC_WR_BITS_PER_WORD, &mut bits).map_err(|_| AdcError::BitsPerWord(adc))?;
    dev.ioctl(SPI_IOC_RD_BITS_PER_WORD, &mut bits).map_err(|_| AdcError::BitsPerWord(adc))?;
    dev.ioctl(SPI_IOC_WR_MAX_SPEED_HZ, &mut speed).map_err(|_| AdcError::WrSpeed(adc))?;
    dev.ioctl(SPI_IOC_RD_MAX_SPEED_HZ, &mut speed).map_err(|_| AdcError::RdSpeed(adc))?;
    debug!("Opened {} (mode {}, {} bits, {} Hz)", path, mode, bits, speed);
    Ok(dev)
  }

  fn ioctl<T>(&self, request : u32, arg : &mut T) -> io::Result<()> {
    let ret = unsafe {
      libc::ioctl(self.file.as_raw_fd(), request as _, arg as *mut T)
    };
    if ret < 0 {
      let err = io::Error::last_os_error();
      error!("ioctl {:#010x} failed! {}", request, err);
      return Err(err);
    }
    Ok(())
  }
}

impl SpiLink for Spidev {

  fn write_bytes(&mut self, bytes : &[u8]) -> io::Result<usize> {
    self.file.write(bytes)
  }

  fn write_then_read(&mut self, tx : &[u8], rx : &mut [u8]) -> io::Result<()> {
    let mut xfer = [SpiIocTransfer::default(), SpiIocTransfer::default()];
    xfer[0].tx_buf = tx.as_ptr() as u64;
    xfer[0].len    = tx.len() as u32;
    xfer[1].rx_buf = rx.as_mut_ptr() as u64;
    xfer[1].len    = rx.len() as u32;
    self.ioctl(spi_ioc_message(2), &mut xfer)
  }
}

/// The link to one ADC and its health
#[derive(Debug)]
pub struct AdcHandle<L : SpiLink> {
  pub index  : usize,
  link       : Option<L>,
  failed     : bool,
}

impl<L : SpiLink> AdcHandle<L> {

  pub fn new(index : usize, link : Option<L>) -> Self {
    AdcHandle {
      index,
      link,
      failed : false,
    }
  }

  pub fn is_failed(&self) -> bool {
    self.failed
  }

  pub fn is_open(&self) -> bool {
    self.link.is_some()
  }

  fn usable_link(&mut self) -> Result<&mut L, AdcError> {
    if self.failed {
      return Err(AdcError::Skipped(self.index));
    }
    match self.link.as_mut() {
      None       => Err(AdcError::NotOpen(self.index)),
      Some(link) => Ok(link),
    }
  }

  /// Write a register. Any failure marks the ADC as failed.
  pub fn write(&mut self, addr : u16, value : u8) -> Result<(), AdcError> {
    let index = self.index;
    let cmd   = [(addr >> 8) as u8, (addr & 0xff) as u8, value];
    let link  = self.usable_link()?;
    match link.write_bytes(&cmd) {
      Ok(3) => {
        trace!("ADC {index} [{addr:04x}] <- {value:02x}");
        Ok(())
      }
      Ok(n) => {
        error!("SPI write to ADC {} transferred {} of 3 bytes!", index, n);
        self.failed = true;
        Err(AdcError::Write { adc : index, addr })
      }
      Err(err) => {
        error!("SPI write to ADC {} failed! {}", index, err);
        self.failed = true;
        Err(AdcError::Write { adc : index, addr })
      }
    }
  }

  /// Read a register back. Any failure marks the ADC as failed.
  pub fn read(&mut self, addr : u16) -> Result<u8, AdcError> {
    let index  = self.index;
    let tx     = [ADC_READ_FLAG | (addr >> 8) as u8, (addr & 0xff) as u8];
    let mut rx = [0u8;1];
    let link   = self.usable_link()?;
    match link.write_then_read(&tx, &mut rx) {
      Ok(_) => Ok(rx[0]),
      Err(err) => {
        error!("SPI_IOC_MESSAGE for ADC {} failed! {}", index, err);
        self.failed = true;
        Err(AdcError::Read { adc : index, addr })
      }
    }
  }

  /// Close the link
  pub fn release(&mut self) {
    self.link = None;
  }
}

/// All ADCs of the board
#[derive(Debug)]
pub struct AdcSet<L : SpiLink> {
  adcs : Vec<AdcHandle<L>>,
}

impl AdcSet<Spidev> {

  /// Open and configure the SPI link of every ADC.
  /// Failing to do so for any ADC is fatal.
  pub fn open(settings : &AdcSettings) -> Result<Self, AdcError> {
    let mut links = Vec::<Option<Spidev>>::with_capacity(settings.n_adc);
    for adc in 0..settings.n_adc {
      links.push(Some(Spidev::open(adc, settings)?));
    }
    Ok(AdcSet::from_links(links))
  }
}

impl<L : SpiLink> AdcSet<L> {

  /// Wrap existing links, None marks an ADC without link
  pub fn from_links(links : Vec<Option<L>>) -> Self {
    let adcs = links.into_iter()
      .enumerate()
      .map(|(index, link)| AdcHandle::new(index, link))
      .collect();
    AdcSet { adcs }
  }

  /// n ADCs without links, see attach
  pub fn unlinked(n : usize) -> Self {
    AdcSet::from_links((0..n).map(|_| None).collect())
  }

  /// Give an ADC a (new) link. Clears the failed state.
  pub fn attach(&mut self, adc : usize, link : L) -> Result<(), AdcError> {
    let handle    = self.handle_mut(adc)?;
    handle.link   = Some(link);
    handle.failed = false;
    Ok(())
  }

  /// Close the link of one ADC
  pub fn release(&mut self, adc : usize) {
    if let Some(handle) = self.adcs.get_mut(adc) {
      handle.release();
    }
  }

  pub fn len(&self) -> usize {
    self.adcs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.adcs.is_empty()
  }

  pub fn handle(&self, adc : usize) -> Option<&AdcHandle<L>> {
    self.adcs.get(adc)
  }

  fn handle_mut(&mut self, adc : usize) -> Result<&mut AdcHandle<L>, AdcError> {
    match self.adcs.get_mut(adc) {
      None         => Err(AdcError::NoSuchAdc(adc)),
      Some(handle) => Ok(handle),
    }
  }

  pub fn is_failed(&self, adc : usize) -> bool {
    self.adcs.get(adc).map(|h| h.is_failed()).unwrap_or(false)
  }

  /// Write a register of one ADC
  pub fn write(&mut self, adc : usize, addr : u16, value : u8) -> Result<(), AdcError> {
    self.handle_mut(adc)?.write(addr, value)
  }

  /// Read a register of one ADC
  pub fn read(&mut self, adc : usize, addr : u16) -> Result<u8, AdcError> {
    self.handle_mut(adc)?.read(addr)
  }

  /// Write a register and verify it by reading it back
  pub fn set_and_check(&mut self, adc : usize, addr : u16, value : u8) -> Result<(), AdcError> {
    self.write(adc, addr, value)?;
    let found = self.read(adc, addr)?;
    if found != value {
      return Err(AdcError::Readback { adc, addr, expected : value, found });
    }
    Ok(())
  }

  /// Select the channels and write the test mode of one ADC
  pub fn set_adc_test_mode(&mut self, adc : usize, channels : u8, mode : u8) -> Result<(), AdcError> {
    self.write(adc, ADC_ADDR_CHS, channels)?;
    self.write(adc, ADC_ADDR_TEST, mode)
  }

  /// Put every usable ADC (both channels) into the given
  /// test mode.
  ///
  /// Failures are not fatal here: a failing ADC gets
  /// marked and skipped from now on, the others are
  /// still configured. Returns the number of ADCs
  /// which accepted the mode.
  pub fn set_test_mode(&mut self, mode : u8) -> usize {
    let mut n_ok = 0usize;
    for handle in self.adcs.iter_mut() {
      if handle.is_failed() {
        warn!("Operation ignored on failing ADC {}", handle.index);
        continue;
      }
      if !handle.is_open() {
        warn!("SPI for ADC {} not open", handle.index);
        continue;
      }
      let result = handle.write(ADC_ADDR_CHS, ADC_MASK_CHS)
        .and_then(|_| handle.write(ADC_ADDR_TEST, mode));
      match result {
        Err(err) => error!("Unable to set test mode {:#04x} for ADC {}! {}", mode, handle.index, err),
        Ok(_)    => n_ok += 1,
      }
    }
    debug!("Test mode {:#04x} set for {} ADCs", mode, n_ok);
    n_ok
  }

  /// Back to normal mode, then close all links
  pub fn restore_normal(&mut self) {
    self.set_test_mode(ADC_RAMPOFF);
    for handle in self.adcs.iter_mut() {
      handle.release();
    }
  }

  /// Run the power-up register sequence on one ADC.
  ///
  /// Returns the read-back mismatches, transfer
  /// problems are fatal.
  pub fn initialize(&mut self, adc : usize) -> Result<Vec<AdcError>, AdcError> {
    let mut mismatches = Vec::<AdcError>::new();
    for step in ADC_INIT_SEQUENCE.iter() {
      let result = match *step {
        InitStep::Write(addr, value) => self.write(adc, addr, value),
        InitStep::Check(addr, value) => self.set_and_check(adc, addr, value),
      };
      match result {
        Ok(_) => (),
        Err(err @ AdcError::Readback {..}) => {
          warn!("{}", err);
          mismatches.push(err);
        }
        Err(err) => return Err(err),
      }
    }
    Ok(mismatches)
  }

  /// Switch all ADCs to the ramp test pattern.
  ///
  /// Normal mode is restored when the returned
  /// guard goes out of scope.
  pub fn ramp_on(&mut self) -> RampGuard<'_, L> {
    self.set_test_mode(ADC_RAMPON);
    RampGuard { adcs : self }
  }
}

/// Initialize n ADCs one after the other (adcinit)
///
/// Each link is opened with `open`, initialized and
/// closed again before the next ADC. Returns all
/// read-back mismatches.
pub fn initialize_adcs<L, F>(n_adc : usize, mut open : F) -> Result<Vec<AdcError>, AdcError>
  where L : SpiLink,
        F : FnMut(usize) -> Result<L, AdcError> {
  let mut adcs       = AdcSet::<L>::unlinked(n_adc);
  let mut mismatches = Vec::<AdcError>::new();
  for adc in 0..n_adc {
    adcs.attach(adc, open(adc)?)?;
    mismatches.extend(adcs.initialize(adc)?);
    adcs.release(adc);
    thread::sleep(Duration::from_micros(100));
  }
  Ok(mismatches)
}

/// Keeps the ADCs in ramp mode while alive
pub struct RampGuard<'a, L : SpiLink> {
  adcs : &'a mut AdcSet<L>,
}

impl<'a, L : SpiLink> Deref for RampGuard<'a, L> {
  type Target = AdcSet<L>;
  fn deref(&self) -> &AdcSet<L> {
    self.adcs
  }
}

impl<'a, L : SpiLink> DerefMut for RampGuard<'a, L> {
  fn deref_mut(&mut self) -> &mut AdcSet<L> {
    self.adcs
  }
}

impl<'a, L : SpiLink> Drop for RampGuard<'a, L> {
  fn drop(&mut self) {
    debug!("Restoring normal mode of the ADCs");
    self.adcs.restore_normal();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  /// Records everything, fails on request
  #[derive(Debug, Default)]
  struct Recorder {
    log        : Rc<RefCell<Vec<Vec<u8>>>>,
    short      : bool,
    read_value : u8,
  }

  impl SpiLink for Recorder {
    fn write_bytes(&mut self, bytes : &[u8]) -> io::Result<usize> {
      self.log.borrow_mut().push(bytes.to_vec());
      if self.short { Ok(2) } else { Ok(bytes.len()) }
    }
    fn write_then_read(&mut self, tx : &[u8], rx : &mut [u8]) -> io::Result<()> {
      self.log.borrow_mut().push(tx.to_vec());
      rx[0] = self.read_value;
      Ok(())
    }
  }

  #[test]
  fn ioctl_numbers() {
    assert_eq!(std::mem::size_of::<SpiIocTransfer>(), 32);
    assert_eq!(SPI_IOC_WR_MODE, 0x4001_6b01);
    assert_eq!(SPI_IOC_RD_MAX_SPEED_HZ, 0x8004_6b04);
    assert_eq!(spi_ioc_message(2), 0x4040_6b00);
  }

  #[test]
  fn write_and_read_framing() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let rec = Recorder { log : log.clone(), short : false, read_value : 0xa4 };
    let mut adcs = AdcSet::from_links(vec![Some(rec)]);
    adcs.write(0, 0x0d, 0x0f).unwrap();
    assert_eq!(adcs.read(0, 0x114).unwrap(), 0xa4);
    assert_eq!(log.borrow()[0], vec![0x00, 0x0d, 0x0f]);
    assert_eq!(log.borrow()[1], vec![0x81, 0x14]);
  }

  #[test]
  fn short_write_is_an_error() {
    let rec = Recorder { short : true, ..Default::default() };
    let mut adcs = AdcSet::from_links(vec![Some(rec)]);
    assert!(matches!(adcs.write(0, 5, 3), Err(AdcError::Write { adc : 0, addr : 5 })));
    assert!(adcs.is_failed(0));
    assert!(matches!(adcs.write(0, 5, 3), Err(AdcError::Skipped(0))));
  }

  #[test]
  fn failed_adc_is_skipped() {
    let logs : Vec<_> = (0..3).map(|_| Rc::new(RefCell::new(Vec::new()))).collect();
    let links = logs.iter().enumerate()
      .map(|(k, log)| Some(Recorder { log : log.clone(), short : k == 1, read_value : 0 }))
      .collect();
    let mut adcs = AdcSet::from_links(links);
    assert_eq!(adcs.set_test_mode(ADC_RAMPON), 2);
    assert_eq!(logs[1].borrow().len(), 1);
    assert_eq!(adcs.set_test_mode(ADC_RAMPOFF), 2);
    // no further transactions for the failed one
    assert_eq!(logs[1].borrow().len(), 1);
    assert_eq!(logs[0].borrow().len(), 4);
    assert_eq!(logs[2].borrow()[1], vec![0x00, 0x0d, 0x0f]);
  }

  #[test]
  fn guard_restores_normal_mode() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let rec = Recorder { log : log.clone(), ..Default::default() };
    let mut adcs = AdcSet::from_links(vec![Some(rec), None]);
    {
      let guard = adcs.ramp_on();
      assert!(guard.handle(0).unwrap().is_open());
    }
    assert_eq!(log.borrow().last().unwrap(), &vec![0x00, 0x0d, 0x00]);
    assert!(!adcs.handle(0).unwrap().is_open());
    assert!(!adcs.is_failed(1));
  }

  #[test]
  fn readback_mismatch() {
    let rec = Recorder { read_value : 0x18, ..Default::default() };
    let mut adcs = AdcSet::from_links(vec![Some(rec)]);
    match adcs.set_and_check(0, 0x14, 0xa4) {
      Err(AdcError::Readback { adc : 0, addr : 0x14, expected : 0xa4, found : 0x18 }) => (),
      other => panic!("Unexpected {:?}", other),
    }
    assert!(matches!(adcs.write(3, 0, 0), Err(AdcError::NoSuchAdc(3))));
  }
}
