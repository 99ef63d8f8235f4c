//! Aggregate settings for the acquisition tools
//!
//! All tools run with the defaults below, which
//! correspond to the standard UUB setup. A toml
//! file given with --config can override any of
//! them. Missing sections or fields keep their
//! default values.
//!
//! Different sections represent different
//! aspects of the front-end
//!

use std::fs::File;
use std::io::{
    Write,
    Read,
};
use std::fmt;

extern crate toml;

use crate::constants::*;
use crate::errors::SerializationError;

/// Trigger source for the shower buffers while streaming
#[derive(Debug, Copy, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum TriggerSource {
  /// External trigger input (compatibility mapping)
  External,
  /// Full bandwidth single bin
  SingleBin,
  /// Full bandwidth single bin with multiplicity
  SingleBinMulti,
  /// Compatibility single bin
  CompatSingleBin,
}

impl fmt::Display for TriggerSource {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      TriggerSource::External        => "External",
      TriggerSource::SingleBin       => "SingleBin",
      TriggerSource::SingleBinMulti  => "SingleBinMulti",
      TriggerSource::CompatSingleBin => "CompatSingleBin",
    };
    write!(f, "<TriggerSource: {}>", repr)
  }
}

/// The trigger wait and event readout
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ReadoutSettings {
  /// Interval of the wake-up timer (ns)
  pub wait_time_ns      : u64,
  /// SCHED_FIFO priority, 0 does not ask for
  /// a realtime scheduler at all
  pub realtime_priority : i32,
  /// Give up waiting for a trigger after this
  /// many timer ticks (0 waits forever).
  /// Only used when streaming, so that the
  /// stop signal gets checked regularly
  pub max_wait_ticks    : u64,
}

impl ReadoutSettings {
  pub fn new() -> Self {
    Self {
      wait_time_ns      : WAITTIME_NS,
      realtime_priority : RT_PRIORITY,
      max_wait_ticks    : 100_000,
    }
  }
}

impl Default for ReadoutSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// SPI links to the ADCs
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AdcSettings {
  /// The ADC number gets appended to this
  pub spi_device_prefix : String,
  pub n_adc             : usize,
  pub spi_mode          : u8,
  pub bits_per_word     : u8,
  pub spi_speed_hz      : u32,
}

impl AdcSettings {
  pub fn new() -> Self {
    Self {
      spi_device_prefix : String::from(SPIDEV_PREFIX),
      n_adc             : RAW_NCH,
      spi_mode          : SPI_MODE,
      bits_per_word     : SPI_BITS_PER_WORD,
      spi_speed_hz      : SPI_SPEED_HZ,
    }
  }

  /// The spidev device of a single ADC
  pub fn device_path(&self, adc : usize) -> String {
    format!("{}{}", self.spi_device_prefix, adc)
  }
}

impl Default for AdcSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Sending events to the data receiver
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct StreamSettings {
  /// Ip address of the data receiver
  pub server      : String,
  pub data_port   : u16,
  /// Any datagram on this port stops netscope
  pub ctrl_port   : u16,
  /// Maximum size of a fragment datagram,
  /// fragment header included
  pub packet_size : usize,
}

impl StreamSettings {
  pub fn new() -> Self {
    Self {
      server      : String::from(DEFAULT_SERVER),
      data_port   : DATAPORT,
      ctrl_port   : CTRLPORT,
      packet_size : PACKETSIZE,
    }
  }

  pub fn data_address(&self) -> String {
    format!("{}:{}", self.server, self.data_port)
  }
}

impl Default for StreamSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Shower trigger used while streaming
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct TriggerSettings {
  pub source      : TriggerSource,
  /// Single bin thresholds (PMT 1-3, SSD).
  /// The compatibility trigger uses the first 3
  pub thresholds  : [u32;4],
  /// Overrides the default enable mask of the source
  #[serde(skip_serializing_if = "Option::is_none")]
  pub enable_mask : Option<u32>,
}

impl TriggerSettings {
  pub fn new() -> Self {
    Self {
      source      : TriggerSource::External,
      thresholds  : [1000;4],
      enable_mask : None,
    }
  }

  /// The enable mask written for the single bin triggers
  pub fn enable(&self) -> u32 {
    match self.enable_mask {
      Some(mask) => mask,
      None => {
        match self.source {
          TriggerSource::External        => 0,
          TriggerSource::SingleBin       => 0x1f,
          TriggerSource::SingleBinMulti  => 0x07 | 0x30,
          TriggerSource::CompatSingleBin => 0x78,
        }
      }
    }
  }
}

impl Default for TriggerSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// The remote ramp toggle (adcramp)
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct RampServerSettings {
  pub port        : u16,
  /// Receive timeout, after which we
  /// simply wait again
  pub timeout_sec : u64,
}

impl RampServerSettings {
  pub fn new() -> Self {
    Self {
      port        : ADCPORT,
      timeout_sec : 1,
    }
  }
}

impl Default for RampServerSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Access to the physical memory
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MemorySettings {
  pub devmem : String,
}

impl MemorySettings {
  pub fn new() -> Self {
    Self {
      devmem : String::from("/dev/mem"),
    }
  }
}

impl Default for MemorySettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Configure the acquisition tools
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct UubSettings {
  pub readout     : ReadoutSettings,
  pub adc         : AdcSettings,
  pub stream      : StreamSettings,
  pub trigger     : TriggerSettings,
  pub ramp_server : RampServerSettings,
  pub memory      : MemorySettings,
}

impl UubSettings {
  pub fn new() -> Self {
    UubSettings {
      readout     : ReadoutSettings::new(),
      adc         : AdcSettings::new(),
      stream      : StreamSettings::new(),
      trigger     : TriggerSettings::new(),
      ramp_server : RampServerSettings::new(),
      memory      : MemorySettings::new(),
    }
  }

  /// Write the settings to a toml file
  pub fn to_toml(&self, mut filename : String) {
    if !filename.ends_with(".toml") {
      filename += ".toml";
    }
    info!("Will write to file {}!", filename);
    match File::create(&filename) {
      Err(err) => {
        error!("Unable to open file {}! {}", filename, err);
      }
      Ok(mut file) => {
        match toml::to_string_pretty(&self) {
          Err(err) => {
            error!("Unable to serialize toml! {err}");
          }
          Ok(toml_string) => {
            match file.write_all(toml_string.as_bytes()) {
              Err(err) => error!("Unable to write to file {}! {}", filename, err),
              Ok(_)    => debug!("Wrote settings to {}!", filename)
            }
          }
        }
      }
    }
  }

  /// Read settings from a toml file
  pub fn from_toml(filename : String) -> Result<UubSettings, SerializationError> {
    match File::open(&filename) {
      Err(err) => {
        error!("Unable to open {}! {}", filename, err);
        return Err(SerializationError::TomlDecodingError);
      }
      Ok(mut file) => {
        let mut toml_string = String::from("");
        match file.read_to_string(&mut toml_string) {
          Err(err) => {
            error!("Unable to read {}! {}", filename, err);
            return Err(SerializationError::TomlDecodingError);
          }
          Ok(_) => {
            match toml::from_str::<UubSettings>(&toml_string) {
              Err(err) => {
                error!("Can't interpret toml! {}", err);
                return Err(SerializationError::TomlDecodingError);
              }
              Ok(settings) => {
                if settings.readout.wait_time_ns == 0 {
                  error!("A wait_time_ns of 0 would disarm the wake-up timer!");
                  return Err(SerializationError::TomlDecodingError);
                }
                return Ok(settings);
              }
            }
          }
        }
      }
    }
  }

  /// Settings from the optional --config argument of
  /// the tools, defaults if there is none
  pub fn load(config : Option<String>) -> Result<UubSettings, SerializationError> {
    match config {
      None => Ok(UubSettings::new()),
      Some(filename) => {
        let settings = UubSettings::from_toml(filename)?;
        debug!("Using settings {}", settings);
        Ok(settings)
      }
    }
  }
}

impl fmt::Display for UubSettings {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let disp : String;
    match toml::to_string(self) {
      Err(err) => {
        error!("Deserialization error! {err}");
        disp = String::from("-- DESERIALIZATION ERROR! --");
      }
      Ok(_disp) => {
        disp = _disp;
      }
    }
    write!(f, "<UubSettings :\n{}>", disp)
  }
}

impl Default for UubSettings {
  fn default() -> Self {
    Self::new()
  }
}
