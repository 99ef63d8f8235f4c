//! Sizes, ports and protocol codes shared by the
//! UUB acquisition tools.
//!
//! The shower buffer geometry follows the firmware
//! (shwr_evt_defs.h): 5 raw ADC channels, each word
//! carries the samples of the two analog channels
//! A and B.

/// Number of samples per channel in one shower event
pub const NSAMPLES         : usize = 2048;
/// Number of ADC chips (raw channels)
pub const RAW_NCH          : usize = 5;
/// Number of logical channels after unpacking
pub const NCH              : usize = 2*RAW_NCH;
/// One sample is 12 bit
pub const SAMPLE_MASK      : u32   = 0xfff;
/// Modulus of the ramp test pattern
pub const MAX_SAMPLE_VAL   : u32   = 1 << 12;
/// Shift of the high (B) sample within a packed word
pub const HIGH_SAMPLE_SHIFT: u32   = 16;
/// Number of packed words of one full event
pub const DATASIZE         : usize = NSAMPLES*RAW_NCH;
/// Size of the raw event payload in bytes
pub const PAYLOAD_SIZE     : usize = 4*DATASIZE;

/// Number of slots in each shower ring buffer
pub const SHWR_MEM_NBUF    : usize = 4;
/// Depth of a ring buffer slot in bytes
pub const SHWR_MEM_DEPTH   : usize = 4*NSAMPLES;

/// Destination of the netscope data stream
pub const DEFAULT_SERVER   : &str  = "192.168.31.254";
/// The port on which to send data
pub const DATAPORT         : u16   = 8888;
/// The port we listen to for the stop signal
pub const CTRLPORT         : u16   = 8887;
/// The port adcramp listens to for commands
pub const ADCPORT          : u16   = 8886;
/// Maximum datagram size of a fragment,
/// including the fragment header
pub const PACKETSIZE       : usize = 1400;
/// Set in the id of the header packet
pub const HEADER_TAG       : u32   = 0x8000_0000;

/// Interval of the readout wake-up timer in ns
pub const WAITTIME_NS      : u64   = 10_000;
/// SCHED_FIFO priority requested by the readout tools
pub const RT_PRIORITY      : i32   = 10;

/// Time tagging: the lower bits of the nanosecond
/// register hold the clock ticks, the upper bits
/// a small event counter
pub const TTAG_NANOSEC_MASK: u32   = 0x3fff_ffff;
pub const TTAG_EVTCTR_SHIFT: u32   = 30;

//========== ADC (AD9268) over SPI =============

pub const SPIDEV_PREFIX    : &str  = "/dev/spidev32766.";
pub const SPI_MODE         : u8    = 0;
pub const SPI_BITS_PER_WORD: u8    = 8;
pub const SPI_SPEED_HZ     : u32   = 5_000_000;

/// Register selecting the channels the next write goes to
pub const ADC_ADDR_CHS     : u16   = 0x05;
/// Test mode register
pub const ADC_ADDR_TEST    : u16   = 0x0d;
/// Select both channels A and B
pub const ADC_MASK_CHS     : u8    = 0x03;
pub const ADC_RAMPON       : u8    = 0x0f;
pub const ADC_RAMPOFF      : u8    = 0x00;
/// Read flag in the address phase of a SPI read
pub const ADC_READ_FLAG    : u8    = 0x80;

//========== adcramp command protocol ==========

/// Length of a command/response datagram
pub const RAMP_MSGLEN      : usize = 18;
pub const RAMP_MASK_CMD    : u8    = 0x40;
pub const RAMP_MASK_ON     : u8    = 0x20;
pub const RAMP_MASK_ADC    : u8    = 0x1c;
pub const RAMP_SH_ADC      : u8    = 2;
pub const RAMP_MASK_CHS    : u8    = 0x03;
pub const RAMP_CMD_QUIT    : u8    = 0x21;
pub const RAMP_RESP_BASE   : u8    = 0x20;
pub const RAMP_RESP_ERR    : u8    = 0x10;

//========== process exit codes ================

pub const EXIT_NOPER       : i32 = 32;
pub const EXIT_OPENSPI     : i32 = 33;
pub const EXIT_SPIWRMODE   : i32 = 34;
pub const EXIT_SPIRDMODE   : i32 = 35;
pub const EXIT_SPIBITPERW  : i32 = 36;
pub const EXIT_SPIWRSPEED  : i32 = 37;
pub const EXIT_SPIRDSPEED  : i32 = 38;
pub const EXIT_SPIWRITE    : i32 = 39;
pub const EXIT_SPIREAD     : i32 = 40;
pub const EXIT_READBACK    : i32 = 41;
pub const EXIT_BUFALIGN    : i32 = 50;
pub const EXIT_EVTDEVMEM   : i32 = 60;
pub const EXIT_EVTMAPTRIG  : i32 = 61;
pub const EXIT_EVTMAPTIME  : i32 = 62;
pub const EXIT_EVTMAPTEST  : i32 = 63;
pub const EXIT_EVTMAPSHWR  : i32 = 64;
pub const EXIT_EVTSIGNAL   : i32 = 65;
pub const EXIT_EVTTIMER    : i32 = 66;
pub const EXIT_EVTSETTIME  : i32 = 67;
pub const EXIT_SETTINGS    : i32 = 68;
pub const EXIT_SOCKET      : i32 = 70;
pub const EXIT_UNPACK      : i32 = 71;
