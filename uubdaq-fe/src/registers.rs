//! Register map of the UUB programmable logic
//!
//! The FPGA exposes its register blocks and the
//! shower ring buffers on the AXI bus, which is
//! visible in /dev/mem. Addresses below are the
//! physical base addresses (Addr8) of the blocks,
//! all other numbers are offsets in 32bit words
//! within a block.
//!
//! Please refer to the firmware headers
//! sde_trigger_defs.h, time_tagging.h and
//! test_control_defs.h in case the firmware
//! changes.

//========== Physical base addresses ============

pub const SDE_TRIGGER_BASE          : u64 = 0x43c0_0000;
pub const TIME_TAGGING_BASE         : u64 = 0x43c1_0000;
pub const TEST_CONTROL_BASE         : u64 = 0x43c2_0000;

/// The shower ring buffer of each raw channel
pub const TRIGGER_MEMORY_SHWR_BASE  : [u64;5] = [0x4000_0000,
                                                 0x4001_0000,
                                                 0x4002_0000,
                                                 0x4003_0000,
                                                 0x4004_0000];

/// Number of words mapped per register block
pub const REG_BLOCK_WORDS           : usize = 256;

//========== SDE trigger block ==================

/// Enable mask of the shower triggers
pub const SHWR_BUF_TRIG_MASK_ADDR   : usize = 0x08;
/// Write the slot number to hand it back to the
/// hardware after readout
pub const SHWR_BUF_CONTROL_ADDR     : usize = 0x10;
pub const SHWR_BUF_STATUS_ADDR      : usize = 0x11;
/// First sample of the trace within the slot
pub const SHWR_BUF_START_ADDR       : usize = 0x12;
pub const SHWR_BUF_TRIG_ID_ADDR     : usize = 0x13;

/// Status: slot to read next
pub const SHWR_BUF_RNUM_SHIFT       : u32   = 2;
pub const SHWR_BUF_RNUM_MASK        : u32   = 0x3;
/// Status: number of full slots
pub const SHWR_BUF_NFULL_SHIFT      : u32   = 8;
pub const SHWR_BUF_NFULL_MASK       : u32   = 0x7;

/// Write 0 to switch the LED off, then 1 to fire a pulse
pub const LED_CONTROL_ADDR          : usize = 0x30;

/// Full bandwidth single bin trigger
pub const SB_TRIG_THR0_ADDR         : usize = 0x40;
pub const SB_TRIG_THR1_ADDR         : usize = 0x41;
pub const SB_TRIG_THR2_ADDR         : usize = 0x42;
pub const SB_TRIG_SSD_ADDR          : usize = 0x43;
pub const SB_TRIG_ENAB_ADDR         : usize = 0x44;

/// Compatibility (UB like) single bin trigger
pub const COMPATIBILITY_SB_TRIG_THR0_ADDR : usize = 0x50;
pub const COMPATIBILITY_SB_TRIG_THR1_ADDR : usize = 0x51;
pub const COMPATIBILITY_SB_TRIG_THR2_ADDR : usize = 0x52;
pub const COMPATIBILITY_SB_TRIG_ENAB_ADDR : usize = 0x53;

/// Values for SHWR_BUF_TRIG_MASK_ADDR
pub const SHWR_BUF_TRIG_SB                : u32 = 1 << 0;
pub const SHWR_BUF_TRIG_LED               : u32 = 1 << 6;
pub const COMPATIBILITY_SHWR_BUF_TRIG_SB  : u32 = 1 << 8;
pub const COMPATIBILITY_SHWR_BUF_TRIG_EXT : u32 = 1 << 13;

//========== Time tagging block =================

pub const TTAG_SHWR_NANOSEC_ADDR    : usize = 0x04;
pub const TTAG_SHWR_SECONDS_ADDR    : usize = 0x05;

//========== Test control block =================

pub const USE_FAKE_ADDR             : usize = 0x00;
/// Use the internally generated PPS instead of GPS
pub const USE_FAKE_PPS_BIT          : u32   = 1;

/// Extract the slot to read from the status register
pub fn status_rnum(status : u32) -> usize {
  ((status >> SHWR_BUF_RNUM_SHIFT) & SHWR_BUF_RNUM_MASK) as usize
}

/// Extract the number of full slots from the status register
pub fn status_nfull(status : u32) -> u32 {
  (status >> SHWR_BUF_NFULL_SHIFT) & SHWR_BUF_NFULL_MASK
}

#[test]
fn status_fields() {
  let status = (2 << SHWR_BUF_NFULL_SHIFT) | (3 << SHWR_BUF_RNUM_SHIFT) | 0x1;
  assert_eq!(status_rnum(status), 3);
  assert_eq!(status_nfull(status), 2);
  assert_eq!(status_nfull(0x0ff), 0);
}

#[test]
fn register_offsets_fit_block() {
  for addr in [SHWR_BUF_TRIG_MASK_ADDR,
               SHWR_BUF_CONTROL_ADDR,
               SHWR_BUF_STATUS_ADDR,
               LED_CONTROL_ADDR,
               COMPATIBILITY_SB_TRIG_ENAB_ADDR,
               TTAG_SHWR_SECONDS_ADDR] {
    assert!(addr < REG_BLOCK_WORDS);
  }
}
