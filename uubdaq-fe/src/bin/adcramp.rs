//! Switch the ADC ramp on/off, controlled by UDP packets
//!
//! See uubdaq_fe::ramp_server for the protocol.

#[macro_use] extern crate log;

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
use uubdaq_fe::ramp_server::RampServer;
use uubdaq_fe::register_stop_flag;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Listen on this port instead of the configured one
  #[arg(short, long)]
  port: Option<u16>,
  /// Be verbose
  #[arg(short, long, default_value_t = false)]
  verbose: bool,
  /// Settings file (toml)
  #[arg(short, long)]
  config: Option<String>,
}

fn run(args : &Args) -> Result<i32, FrontEndError> {
  let mut settings = UubSettings::load(args.config.clone())?;
  if let Some(port) = args.port {
    settings.ramp_server.port = port;
  }
  let stop     = register_stop_flag()?;
  let server   = RampServer::new(&settings.ramp_server)?;
  let mut adcs = AdcSet::open(&settings.adc)?;
  server.serve(&mut adcs, &stop)?;
  Ok(0)
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
