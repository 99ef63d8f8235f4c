//! Hardware independent parts of the UUB acquisition
//! suite.
//!
//! * wire formats of the streamed events (header
//!   packet and fragments)
//! * unpacking of the shower buffer words into traces
//! * evaluation of the ADC ramp test pattern
//! * settings, logging and error types shared by
//!   the front-end tools
//!

pub mod constants;
pub mod errors;
pub mod serialization;
pub mod events;
pub mod fragment;
pub mod trace;
pub mod ramp;
pub mod settings;
pub mod checksum;

pub use events::EventHeader;
pub use fragment::{
  FragmentHeader,
  Fragmenter,
};
pub use trace::Trace;
pub use ramp::evaluate_ramp;
pub use settings::UubSettings;

use std::io::Write;

use colored::{Colorize, ColoredString};
use log::{Level, LevelFilter};

#[macro_use] extern crate log;
extern crate env_logger;

/// Make sure that the loglevel is in color, even though not using pretty_env logger
pub fn color_log(level : &Level) -> ColoredString {
  match level {
    Level::Error    => String::from(" ERROR!").red(),
    Level::Warn     => String::from(" WARN  ").yellow(),
    Level::Info     => String::from(" Info  ").green(),
    Level::Debug    => String::from(" debug ").blue(),
    Level::Trace    => String::from(" trace ").cyan(),
  }
}

/// Set up the environmental (env) logger
/// with our format
///
/// Ensure that the lines and module paths
/// are printed in the logging output.
/// RUST_LOG takes precedence over the given
/// default level.
pub fn init_env_logger(default_level : LevelFilter) {
  env_logger::builder()
    .filter_level(default_level)
    .parse_default_env()
    .format(|buf, record| {
    writeln!( buf, "[{level}][{module_path}:{line}] {args}",
      level = color_log(&record.level()),
      module_path = record.module_path().unwrap_or("<unknown>"),
      line = record.line().unwrap_or(0),
      args = record.args()
      )
    }).init();
}

/// The log level of the tools, -v gives debug output
pub fn verbosity_level(verbose : bool, default : LevelFilter) -> LevelFilter {
  if verbose {
    LevelFilter::Debug
  } else {
    default
  }
}
