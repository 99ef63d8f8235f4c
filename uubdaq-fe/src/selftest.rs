//! ADC self test with the ramp pattern
//!
//! Switch the trigger to the LED, put the ADCs into
//! ramp mode, take a single event and check the
//! pattern of every ADC. The trigger mask and the
//! ADC mode are restored in any case.

use std::io;

use uubdaq_lib::errors::{
  FrontEndError,
  ReadoutError,
};
use uubdaq_lib::events::EventHeader;
use uubdaq_lib::ramp::evaluate_ramp;
use uubdaq_lib::trace::Trace;

use crate::adc::{AdcSet, SpiLink};
use crate::control::{
  TriggerGuard,
  led_trigger,
  set_fake_pps,
};
use crate::memory::RegisterAccess;
use crate::reader::{
  EventReader,
  ReadOutcome,
  Ticker,
};

/// The outcome of a ramp check
#[derive(Debug, Clone)]
pub struct RampReport {
  pub header      : EventHeader,
  pub duration_us : u64,
  pub trace       : Trace,
  /// Bit n set: ADC n failed
  pub result      : u8,
}

/// Take one LED triggered event with all ADCs in
/// ramp mode and evaluate it
pub fn check_ramp<H, L, T>(regs      : &mut H,
                           adcs      : &mut AdcSet<L>,
                           reader    : &mut EventReader<T>,
                           max_ticks : u64) -> Result<RampReport, FrontEndError>
  where H : RegisterAccess,
        L : SpiLink,
        T : Ticker {
  let mut trigger = TriggerGuard::led(regs);
  set_fake_pps(&mut *trigger);
  let ramp = adcs.ramp_on();
  led_trigger(&mut *trigger);
  let outcome = reader.read_event(&mut *trigger, max_ticks)?;
  // back to normal mode before the trigger gets restored
  drop(ramp);
  drop(trigger);
  match outcome {
    ReadOutcome::TimedOut => {
      error!("No event after the LED pulse!");
      Err(ReadoutError::Wait(io::Error::new(io::ErrorKind::TimedOut, "no LED event")).into())
    }
    ReadOutcome::Event { header, duration_us } => {
      let trace  = Trace::from_event(&header, reader.data())?;
      let result = evaluate_ramp(&trace);
      if result != 0 {
        warn!("Ramp check failed, ADC mask {:#04x}", result);
      }
      Ok(RampReport { header, duration_us, trace, result })
    }
  }
}
