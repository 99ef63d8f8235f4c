//! Initialization of the ADCs after power up
//!
//! Every register which can be read back gets
//! verified. Mismatches are reported as
//! [address]written:read and give exit code 41.

#[macro_use] extern crate log;

use std::process::exit;

use clap::Parser;
use log::LevelFilter;

use uubdaq_lib::constants::{
  EXIT_NOPER,
  EXIT_READBACK,
};
use uubdaq_lib::errors::FrontEndError;
use uubdaq_lib::settings::UubSettings;
use uubdaq_lib::{
  init_env_logger,
  verbosity_level,
};

use uubdaq_fe::adc::{
  Spidev,
  initialize_adcs,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Be verbose
  #[arg(short, long, default_value_t = false)]
  verbose: bool,
  /// Settings file (toml)
  #[arg(short, long)]
  config: Option<String>,
}

fn run(args : &Args) -> Result<i32, FrontEndError> {
  let settings = UubSettings::load(args.config.clone())?;
  info!("Initialization of {} ADCs on SPI-0", settings.adc.n_adc);
  let mismatches = initialize_adcs(settings.adc.n_adc, |adc| Spidev::open(adc, &settings.adc))?;
  if mismatches.is_empty() {
    info!("All ADC registers verified");
    return Ok(0);
  }
  error!("{} registers did not read back correctly", mismatches.len());
  Ok(EXIT_READBACK)
}

fn main() {
  let args = match Args::try_parse() {
    Err(err) => {
      let _ = err.print();
      exit(EXIT_NOPER);
    }
    Ok(args) => args,
  };
  init_env_logger(verbosity_level(args.verbose, LevelFilter::Info));
  let code = match run(&args) {
    Err(err) => {
      error!("{}", err);
      err.exit_code()
    }
    Ok(result) => result,
  };
  exit(code);
}
