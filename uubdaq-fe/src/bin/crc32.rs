//! CRC-32 of a file, as the boot loader calculates it

#[macro_use] extern crate log;

use std::fs::File;
use std::process::exit;

use clap::Parser;
use clap::error::ErrorKind;
use log::LevelFilter;

use uubdaq_lib::checksum::crc32_of;
use uubdaq_lib::init_env_logger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// The file to check
  filename: String,
}

fn main() {
  let args = match Args::try_parse() {
    Err(err) => {
      let _ = err.print();
      match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit(0),
        _ => exit(1),
      }
    }
    Ok(args) => args,
  };
  init_env_logger(LevelFilter::Warn);
  let mut file = match File::open(&args.filename) {
    Err(err) => {
      error!("Cannot open file {} for reading! {}", args.filename, err);
      exit(2);
    }
    Ok(f) => f,
  };
  match crc32_of(&mut file) {
    Err(err) => {
      error!("Reading {} failed! {}", args.filename, err);
      exit(2);
    }
    Ok(crc) => println!("{:08x}", crc),
  }
}
