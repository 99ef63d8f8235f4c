//! Error types of the acquisition suite
//!
//! Every fatal condition of the front-end tools maps
//! to a fixed process exit code (see constants), so
//! a caller (e.g. the test station software) can tell
//! what went wrong without parsing stderr.

use std::error::Error;
use std::fmt;
use std::io;

use crate::constants::*;

/// Indicate issues with (de)serialization of the
/// wire formats
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum SerializationError {
  StreamTooShort,
  WrongByteSize,
  TomlDecodingError,
}

impl SerializationError {
  pub fn to_string(&self) -> String {
    match self {
      SerializationError::StreamTooShort    => String::from("StreamTooShort"),
      SerializationError::WrongByteSize     => String::from("WrongByteSize"),
      SerializationError::TomlDecodingError => String::from("TomlDecodingError"),
    }
  }
}

impl fmt::Display for SerializationError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<SerializationError : {}>", self.to_string())
  }
}

impl Error for SerializationError {
}

/// Problems while converting the packed words
/// into a trace
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UnpackError {
  /// The hardware reported a start offset which
  /// is not within a slot
  StartOutOfRange(u32),
  /// The staging buffer does not hold a full event
  BufferTooShort(usize),
}

impl fmt::Display for UnpackError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      UnpackError::StartOutOfRange(start) => {
        write!(f, "<UnpackError : buffer start {start} exceeds the slot size of {NSAMPLES} samples>")
      },
      UnpackError::BufferTooShort(len) => {
        write!(f, "<UnpackError : staging buffer holds {len} words, need {DATASIZE}>")
      }
    }
  }
}

impl Error for UnpackError {
}

/// Failures on the SPI link to one of the ADCs
#[derive(Debug)]
pub enum AdcError {
  /// Can not open the spidev device
  Open { adc : usize, source : io::Error },
  WrMode(usize),
  RdMode(usize),
  BitsPerWord(usize),
  WrSpeed(usize),
  RdSpeed(usize),
  /// A register write did not transfer all bytes
  Write { adc : usize, addr : u16 },
  /// The SPI message for a register read failed
  Read { adc : usize, addr : u16 },
  /// A register did not hold the value we wrote
  Readback { adc : usize, addr : u16, expected : u8, found : u8 },
  /// The ADC has no open link (never opened, or released)
  NotOpen(usize),
  /// The ADC failed before, we don't talk to it anymore
  Skipped(usize),
  NoSuchAdc(usize),
}

impl fmt::Display for AdcError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      AdcError::Open { adc, source } => write!(f, "<AdcError : Cannot open SPI device {adc} ({source})>"),
      AdcError::WrMode(adc)          => write!(f, "<AdcError : Cannot set SPI write mode for ADC {adc}>"),
      AdcError::RdMode(adc)          => write!(f, "<AdcError : Cannot set SPI read mode for ADC {adc}>"),
      AdcError::BitsPerWord(adc)     => write!(f, "<AdcError : Cannot set bits per word for ADC {adc}>"),
      AdcError::WrSpeed(adc)         => write!(f, "<AdcError : Cannot set max wr speed for ADC {adc}>"),
      AdcError::RdSpeed(adc)         => write!(f, "<AdcError : Cannot set max rd speed for ADC {adc}>"),
      AdcError::Write { adc, addr }  => write!(f, "<AdcError : SPI write to ADC {adc} register {addr:#06x} incomplete>"),
      AdcError::Read { adc, addr }   => write!(f, "<AdcError : SPI read of ADC {adc} register {addr:#06x} failed>"),
      AdcError::Readback { adc, addr, expected, found } => {
        write!(f, "<AdcError : ADC {adc} [{addr:04x}]{expected:02x}:{found:02x}>")
      },
      AdcError::NotOpen(adc)         => write!(f, "<AdcError : SPI for ADC {adc} not open>"),
      AdcError::Skipped(adc)         => write!(f, "<AdcError : operation ignored on failing ADC {adc}>"),
      AdcError::NoSuchAdc(adc)       => write!(f, "<AdcError : there is no ADC {adc}>"),
    }
  }
}

impl Error for AdcError {
}

/// Errors while mapping the register blocks
/// and shower buffers
#[derive(Debug)]
pub enum MemoryError {
  DevMem(io::Error),
  MapTrigger(io::Error),
  MapTimeTagging(io::Error),
  MapTestControl(io::Error),
  MapShower { channel : usize, source : io::Error },
  /// Slot index outside of the ring buffer
  SlotOutOfRange { channel : usize, slot : usize },
  /// No shower buffer for this channel
  NoSuchChannel(usize),
  /// Destination too small for one slot
  DestinationTooShort(usize),
}

impl fmt::Display for MemoryError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      MemoryError::DevMem(err)         => write!(f, "<MemoryError : Error opening /dev/mem ({err})>"),
      MemoryError::MapTrigger(err)     => write!(f, "<MemoryError : Error mapping regs ({err})>"),
      MemoryError::MapTimeTagging(err) => write!(f, "<MemoryError : Error mapping tt_regs ({err})>"),
      MemoryError::MapTestControl(err) => write!(f, "<MemoryError : Error mapping tstctl_regs ({err})>"),
      MemoryError::MapShower { channel, source } => {
        write!(f, "<MemoryError : Error mapping shower buf {channel} ({source})>")
      },
      MemoryError::SlotOutOfRange { channel, slot } => {
        write!(f, "<MemoryError : slot {slot} of shower buf {channel} is out of range>")
      },
      MemoryError::NoSuchChannel(ch)       => write!(f, "<MemoryError : no shower buf {ch}>"),
      MemoryError::DestinationTooShort(sz) => write!(f, "<MemoryError : destination of {sz} words can not hold a slot>"),
    }
  }
}

impl Error for MemoryError {
}

/// Setting up or waiting on the readout timer
#[derive(Debug)]
pub enum ReadoutError {
  /// Blocking signals for the timer failed
  Signal(io::Error),
  /// The timer can not be created
  Timer(io::Error),
  /// The timer can not be armed
  SetTime(io::Error),
  /// The staging buffer can not be aligned
  BufAlign,
  /// Waiting for the timer failed
  Wait(io::Error),
}

impl fmt::Display for ReadoutError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ReadoutError::Signal(err)  => write!(f, "<ReadoutError : error while trying to set signals ({err})>"),
      ReadoutError::Timer(err)   => write!(f, "<ReadoutError : timer creation error ({err})>"),
      ReadoutError::SetTime(err) => write!(f, "<ReadoutError : timer arming error ({err})>"),
      ReadoutError::BufAlign     => write!(f, "<ReadoutError : databuf alignment problem>"),
      ReadoutError::Wait(err)    => write!(f, "<ReadoutError : waiting for the timer failed ({err})>"),
    }
  }
}

impl Error for ReadoutError {
}

/// Issues with the UDP data and control channels
#[derive(Debug)]
pub enum StreamError {
  Socket(io::Error),
  Send(io::Error),
  /// A datagram was sent only partially
  ShortSend { expected : usize, sent : usize },
  /// Fragment offsets are 16 bit
  PayloadTooLarge(usize),
  /// The packet size leaves no room for payload
  PacketSizeTooSmall(usize),
  InvalidAddress(String),
}

impl fmt::Display for StreamError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      StreamError::Socket(err)   => write!(f, "<StreamError : creating socket failed ({err})>"),
      StreamError::Send(err)     => write!(f, "<StreamError : senddata failed ({err})>"),
      StreamError::ShortSend { expected, sent } => {
        write!(f, "<StreamError : senddata sent {sent} of {expected} bytes>")
      },
      StreamError::PayloadTooLarge(len) => {
        write!(f, "<StreamError : payload of {len} bytes does not fit 16 bit fragment offsets>")
      },
      StreamError::PacketSizeTooSmall(sz) => {
        write!(f, "<StreamError : packet size {sz} leaves no room for the fragment payload>")
      },
      StreamError::InvalidAddress(addr) => write!(f, "<StreamError : invalid address {addr}>"),
    }
  }
}

impl Error for StreamError {
}

/// Any fatal condition of the front-end tools
#[derive(Debug)]
pub enum FrontEndError {
  Adc(AdcError),
  Memory(MemoryError),
  Readout(ReadoutError),
  Stream(StreamError),
  Unpack(UnpackError),
  Settings(SerializationError),
}

impl FrontEndError {

  /// The process exit code associated with this error
  pub fn exit_code(&self) -> i32 {
    match self {
      FrontEndError::Adc(err) => {
        match err {
          AdcError::Open {..}      => EXIT_OPENSPI,
          AdcError::WrMode(_)      => EXIT_SPIWRMODE,
          AdcError::RdMode(_)      => EXIT_SPIRDMODE,
          AdcError::BitsPerWord(_) => EXIT_SPIBITPERW,
          AdcError::WrSpeed(_)     => EXIT_SPIWRSPEED,
          AdcError::RdSpeed(_)     => EXIT_SPIRDSPEED,
          AdcError::Read {..}      => EXIT_SPIREAD,
          AdcError::Readback {..}  => EXIT_READBACK,
          _                        => EXIT_SPIWRITE,
        }
      },
      FrontEndError::Memory(err) => {
        match err {
          MemoryError::DevMem(_)         => EXIT_EVTDEVMEM,
          MemoryError::MapTrigger(_)     => EXIT_EVTMAPTRIG,
          MemoryError::MapTimeTagging(_) => EXIT_EVTMAPTIME,
          MemoryError::MapTestControl(_) => EXIT_EVTMAPTEST,
          _                              => EXIT_EVTMAPSHWR,
        }
      },
      FrontEndError::Readout(err) => {
        match err {
          ReadoutError::Signal(_)  => EXIT_EVTSIGNAL,
          ReadoutError::Timer(_)   => EXIT_EVTTIMER,
          ReadoutError::SetTime(_) => EXIT_EVTSETTIME,
          ReadoutError::BufAlign   => EXIT_BUFALIGN,
          ReadoutError::Wait(_)    => EXIT_EVTSIGNAL,
        }
      },
      FrontEndError::Stream(_)   => EXIT_SOCKET,
      FrontEndError::Unpack(_)   => EXIT_UNPACK,
      FrontEndError::Settings(_) => EXIT_SETTINGS,
    }
  }
}

impl fmt::Display for FrontEndError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      FrontEndError::Adc(err)      => write!(f, "{err}"),
      FrontEndError::Memory(err)   => write!(f, "{err}"),
      FrontEndError::Readout(err)  => write!(f, "{err}"),
      FrontEndError::Stream(err)   => write!(f, "{err}"),
      FrontEndError::Unpack(err)   => write!(f, "{err}"),
      FrontEndError::Settings(err) => write!(f, "{err}"),
    }
  }
}

impl Error for FrontEndError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      FrontEndError::Adc(err)      => Some(err),
      FrontEndError::Memory(err)   => Some(err),
      FrontEndError::Readout(err)  => Some(err),
      FrontEndError::Stream(err)   => Some(err),
      FrontEndError::Unpack(err)   => Some(err),
      FrontEndError::Settings(err) => Some(err),
    }
  }
}

impl From<AdcError> for FrontEndError {
  fn from(err : AdcError) -> Self {
    FrontEndError::Adc(err)
  }
}

impl From<MemoryError> for FrontEndError {
  fn from(err : MemoryError) -> Self {
    FrontEndError::Memory(err)
  }
}

impl From<ReadoutError> for FrontEndError {
  fn from(err : ReadoutError) -> Self {
    FrontEndError::Readout(err)
  }
}

impl From<StreamError> for FrontEndError {
  fn from(err : StreamError) -> Self {
    FrontEndError::Stream(err)
  }
}

impl From<UnpackError> for FrontEndError {
  fn from(err : UnpackError) -> Self {
    FrontEndError::Unpack(err)
  }
}

impl From<SerializationError> for FrontEndError {
  fn from(err : SerializationError) -> Self {
    FrontEndError::Settings(err)
  }
}

#[test]
fn exit_codes_are_distinct_per_failure() {
  let open = FrontEndError::from(AdcError::Open { adc : 1, source : io::Error::from(io::ErrorKind::NotFound) });
  assert_eq!(open.exit_code(), EXIT_OPENSPI);
  assert_eq!(FrontEndError::from(AdcError::Write { adc : 0, addr : 5 }).exit_code(), EXIT_SPIWRITE);
  assert_eq!(FrontEndError::from(AdcError::Read { adc : 0, addr : 5 }).exit_code(), EXIT_SPIREAD);
  let shwr = MemoryError::MapShower { channel : 3, source : io::Error::from(io::ErrorKind::PermissionDenied) };
  assert_eq!(FrontEndError::from(shwr).exit_code(), EXIT_EVTMAPSHWR);
  assert_eq!(FrontEndError::from(ReadoutError::BufAlign).exit_code(), EXIT_BUFALIGN);
  // operational errors never collide with the ramp bitmask
  assert!(FrontEndError::from(UnpackError::StartOutOfRange(4096)).exit_code() > 31);
}
