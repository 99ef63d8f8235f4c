//! Stream shower events to a data receiver
//!
//! Reads events with the configured trigger and sends
//! them as UDP fragments, until anything arrives on the
//! control port or the process gets SIGINT/SIGTERM.

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

use uubdaq_fe::control::{
  TriggerGuard,
  request_realtime_priority,
  set_fake_pps,
};
use uubdaq_fe::memory::DeviceMap;
use uubdaq_fe::reader::{
  EventReader,
  TimerFd,
};
use uubdaq_fe::register_stop_flag;
use uubdaq_fe::stream::{
  ControlListener,
  DataSender,
  run_stream,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Ip address of the data receiver
  #[arg(short, long)]
  server: Option<String>,
  /// Be verbose
  #[arg(short, long, default_value_t = false)]
  verbose: bool,
  /// Settings file (toml)
  #[arg(short, long)]
  config: Option<String>,
}

fn run(args : &Args) -> Result<i32, FrontEndError> {
  let mut settings = UubSettings::load(args.config.clone())?;
  if let Some(server) = &args.server {
    settings.stream.server = server.clone();
  }
  let stop = register_stop_flag()?;
  request_realtime_priority(settings.readout.realtime_priority);
  let sender     = DataSender::new(&settings.stream)?;
  let control    = ControlListener::new(&settings.stream)?;
  let mut map    = DeviceMap::open(&settings.memory)?;
  let mut reader = EventReader::new(TimerFd::new(settings.readout.wait_time_ns)?)?;
  {
    let mut trigger = TriggerGuard::configure(&mut map, &settings.trigger);
    set_fake_pps(&mut *trigger);
    run_stream(&mut *trigger,
               &mut reader,
               &sender,
               &control,
               &stop,
               settings.readout.max_wait_ticks)?;
  }
  map.close();
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
