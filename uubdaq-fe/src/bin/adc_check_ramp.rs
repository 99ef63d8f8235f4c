//! Check if the ADCs are initialized correctly
//!
//! * set the ADCs to ramp test mode
//! * take one LED triggered trace and evaluate it
//! * set the ADCs back to normal mode
//!
//! Exit code: 0 all ADCs are OK, 1-31 bit mask of
//! the failing ADCs, 32 and above an error in the
//! SPI communication, the readout etc.

#[macro_use] extern crate log;

use std::path::Path;
use std::process::exit;

use clap::Parser;
use log::LevelFilter;

use uubdaq_lib::constants::EXIT_NOPER;
use uubdaq_lib::errors::FrontEndError;
use uubdaq_lib::settings::UubSettings;
use uubdaq_lib::{
  init_env_logger,
  verbosity_level,
};

use uubdaq_fe::adc::AdcSet;
use uubdaq_fe::control::request_realtime_priority;
use uubdaq_fe::memory::DeviceMap;
use uubdaq_fe::reader::{
  EventReader,
  TimerFd,
};
use uubdaq_fe::selftest::check_ramp;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Dump the trace to this file
  #[arg(short = 'd', long)]
  dump: Option<String>,
  /// Be verbose
  #[arg(short, long, default_value_t = false)]
  verbose: bool,
  /// Settings file (toml)
  #[arg(short, long)]
  config: Option<String>,
}

fn run(args : &Args) -> Result<i32, FrontEndError> {
  let settings = UubSettings::load(args.config.clone())?;
  request_realtime_priority(settings.readout.realtime_priority);
  let mut adcs   = AdcSet::open(&settings.adc)?;
  let mut map    = DeviceMap::open(&settings.memory)?;
  let mut reader = EventReader::new(TimerFd::new(settings.readout.wait_time_ns)?)?;
  let report     = check_ramp(&mut map, &mut adcs, &mut reader, 0)?;
  map.close();
  if let Some(fname) = &args.dump {
    match report.trace.dump(Path::new(fname)) {
      Err(err) => error!("Cannot open file '{}' for saving trace! {}", fname, err),
      Ok(_)    => debug!("Trace written to {}", fname),
    }
  }
  if args.verbose {
    eprintln!("{}", report.header.summary(report.duration_us));
  }
  Ok(report.result as i32)
}

fn main() {
  let args = match Args::try_parse() {
    Err(err) => {
      let _ = err.print();
      exit(EXIT_NOPER);
    }
    Ok(args) => args,
  };
  init_env_logger(verbosity_level(args.verbose, LevelFilter::Warn));
  // all cleanup happens when run returns
  let code = match run(&args) {
    Err(err) => {
      error!("{}", err);
      err.exit_code()
    }
    Ok(result) => result,
  };
  exit(code);
}
