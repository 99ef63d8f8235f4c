//! Remote switch of the ADC ramp (adcramp)
//!
//! Commands come as 18 byte UDP datagrams, each byte
//! (up to the first NUL) is a command:
//!
//! * `0x21` : quit
//! * `0b01OAAACC` : ADC AAA, write channel select CC
//!                  and switch the ramp on (O=1) or off
//!
//! The reply is the same datagram, with the first byte
//! replaced by the status: 0x20 plus the number of
//! executed commands, 0x10 set in case of an error.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use uubdaq_lib::constants::{
  RAMP_MSGLEN,
  RAMP_MASK_CMD,
  RAMP_MASK_ON,
  RAMP_MASK_ADC,
  RAMP_SH_ADC,
  RAMP_MASK_CHS,
  RAMP_CMD_QUIT,
  RAMP_RESP_BASE,
  RAMP_RESP_ERR,
  ADC_RAMPON,
  ADC_RAMPOFF,
};
use uubdaq_lib::errors::{
  AdcError,
  FrontEndError,
  StreamError,
};
use uubdaq_lib::settings::RampServerSettings;

use crate::adc::{AdcSet, SpiLink};

/// Switch the ramp of a single ADC
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RampCommand {
  pub adc      : usize,
  pub channels : u8,
  pub on       : bool,
}

/// A decoded command datagram
#[derive(Debug, Clone, PartialEq)]
pub struct RampRequest {
  pub commands : Vec<RampCommand>,
  pub quit     : bool,
  pub status   : u8,
}

/// Decode a command datagram
///
/// Decoding stops at the first NUL, at quit or at the
/// first invalid byte. The last byte of the datagram
/// is never looked at.
pub fn parse_ramp_message(msg : &[u8], n_adc : usize) -> RampRequest {
  let mut request = RampRequest {
    commands : Vec::new(),
    quit     : false,
    status   : RAMP_RESP_BASE,
  };
  let body = &msg[..msg.len().saturating_sub(1)];
  for &c in body.iter().take_while(|c| **c != 0) {
    if c == RAMP_CMD_QUIT {
      request.status += 1;
      request.quit    = true;
      break;
    } else if c & RAMP_MASK_CMD != 0 {
      let adc = ((c & RAMP_MASK_ADC) >> RAMP_SH_ADC) as usize;
      if adc >= n_adc {
        request.status |= RAMP_RESP_ERR;
        break;
      }
      request.commands.push(RampCommand {
        adc,
        channels : c & RAMP_MASK_CHS,
        on       : c & RAMP_MASK_ON != 0,
      });
      request.status += 1;
    } else {
      request.status |= RAMP_RESP_ERR;
      break;
    }
  }
  request
}

/// Execute the commands of a datagram and turn it into
/// the reply. Returns true if quit was requested.
pub fn handle_ramp_message<L : SpiLink>(adcs : &mut AdcSet<L>,
                                        msg  : &mut [u8]) -> Result<bool, AdcError> {
  let request = parse_ramp_message(msg, adcs.len());
  for cmd in request.commands.iter() {
    let mode = if cmd.on { ADC_RAMPON } else { ADC_RAMPOFF };
    debug!("ADC {} channels {:#x} ramp {}", cmd.adc, cmd.channels, if cmd.on {"on"} else {"off"});
    adcs.set_adc_test_mode(cmd.adc, cmd.channels, mode)?;
  }
  if let Some(first) = msg.first_mut() {
    *first = request.status;
  }
  Ok(request.quit)
}

/// The command socket of adcramp
#[derive(Debug)]
pub struct RampServer {
  socket : UdpSocket,
}

impl RampServer {

  pub fn new(settings : &RampServerSettings) -> Result<Self, StreamError> {
    let server = RampServer::bind(&format!("0.0.0.0:{}", settings.port))?;
    server.socket
      .set_read_timeout(Some(Duration::from_secs(settings.timeout_sec.max(1))))
      .map_err(StreamError::Socket)?;
    Ok(server)
  }

  pub fn bind(addr : &str) -> Result<Self, StreamError> {
    let socket = UdpSocket::bind(addr).map_err(StreamError::Socket)?;
    socket.set_read_timeout(Some(Duration::from_secs(1))).map_err(StreamError::Socket)?;
    info!("Waiting for ramp commands on {}", addr);
    Ok(RampServer { socket })
  }

  pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
    self.socket.local_addr()
  }

  /// Serve commands until quit (or the stop flag)
  pub fn serve<L : SpiLink>(&self,
                            adcs : &mut AdcSet<L>,
                            stop : &AtomicBool) -> Result<(), FrontEndError> {
    let mut buf = [0u8; RAMP_MSGLEN];
    loop {
      if stop.load(Ordering::Relaxed) {
        info!("Stop flag set, leaving");
        return Ok(());
      }
      let (len, from) = match self.socket.recv_from(&mut buf) {
        Ok(r) => r,
        Err(err) if err.kind() == io::ErrorKind::WouldBlock
                 || err.kind() == io::ErrorKind::TimedOut
                 || err.kind() == io::ErrorKind::Interrupted => continue,
        Err(err) => return Err(StreamError::Socket(err).into()),
      };
      if len != RAMP_MSGLEN {
        debug!("Ignoring datagram of {} bytes from {}", len, from);
        continue;
      }
      buf[RAMP_MSGLEN - 1] = 0;
      let quit = handle_ramp_message(adcs, &mut buf)?;
      if let Err(err) = self.socket.send_to(&buf, from) {
        warn!("Unable to reply to {}! {}", from, err);
      }
      if quit {
        info!("Quit requested by {}", from);
        return Ok(());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn message(cmds : &[u8]) -> [u8; RAMP_MSGLEN] {
    let mut msg = [0u8; RAMP_MSGLEN];
    msg[..cmds.len()].copy_from_slice(cmds);
    msg
  }

  #[test]
  fn decode_commands() {
    // ADC 2 both channels on, ADC 4 channel A off
    let req = parse_ramp_message(&message(&[0x40 | 0x20 | (2 << 2) | 3, 0x40 | (4 << 2) | 1]), 5);
    assert_eq!(req.commands, vec![RampCommand { adc : 2, channels : 3, on : true },
                                  RampCommand { adc : 4, channels : 1, on : false }]);
    assert_eq!(req.status, 0x22);
    assert!(!req.quit);
  }

  #[test]
  fn quit_stops_decoding() {
    let req = parse_ramp_message(&message(&[0x41, RAMP_CMD_QUIT, 0x42]), 5);
    assert_eq!(req.commands.len(), 1);
    assert_eq!(req.status, 0x22);
    assert!(req.quit);
  }

  #[test]
  fn invalid_bytes() {
    let req = parse_ramp_message(&message(&[0x41, 0x05, 0x42]), 5);
    assert_eq!(req.commands.len(), 1);
    assert_eq!(req.status, 0x31);
    // ADC 5 does not exist
    let req = parse_ramp_message(&message(&[0x40 | (5 << 2)]), 5);
    assert!(req.commands.is_empty());
    assert_eq!(req.status, 0x30);
  }

  #[test]
  fn last_byte_is_ignored() {
    let msg = [0x41u8; RAMP_MSGLEN];
    let req = parse_ramp_message(&msg, 5);
    assert_eq!(req.commands.len(), RAMP_MSGLEN - 1);
    assert_eq!(req.status, RAMP_RESP_BASE + (RAMP_MSGLEN - 1) as u8);
  }
}
