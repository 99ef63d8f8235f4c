//! Evaluation of the ADC ramp test pattern
//!
//! In ramp mode both analog channels of an ADC carry
//! the same pattern and sample value plus sample index
//! stays constant (modulo 4096) along the trace.

use crate::constants::{
  RAW_NCH,
  MAX_SAMPLE_VAL,
};
use crate::trace::Trace;

/// Check the ramp for each ADC
///
/// Returns a bitmask with bit c set if ADC c did
/// not deliver a clean pattern, so 0 means all good.
pub fn evaluate_ramp(trace : &Trace) -> u8 {
  let mut result = 0u8;
  for adc in 0..RAW_NCH {
    if !ramp_ok(trace.channel(2*adc), trace.channel(2*adc + 1)) {
      result |= 1 << adc;
    }
  }
  result
}

/// Check the pattern of one ADC (channels A and B)
pub fn ramp_ok(chan_a : &[u16], chan_b : &[u16]) -> bool {
  let sum = match chan_a.first() {
    None    => return true,
    Some(s) => *s as u32,
  };
  for (i, (a, b)) in chan_a.iter().zip(chan_b.iter()).enumerate() {
    if a != b || (*a as u32 + i as u32) % MAX_SAMPLE_VAL != sum {
      trace!("Ramp mismatch at sample {i}: A {a}, B {b}, expected sum {sum}");
      return false;
    }
  }
  true
}
