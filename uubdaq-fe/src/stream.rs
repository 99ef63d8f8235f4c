//! Streaming of events over UDP (netscope)
//!
//! Every event goes out as a header packet (28 bytes,
//! bit 31 of the id set) followed by the fragments of
//! the payload. A second socket listens for the stop
//! signal, any datagram there ends the acquisition.

use std::io;
use std::net::{
  SocketAddr,
  ToSocketAddrs,
  UdpSocket,
};
use std::sync::atomic::{AtomicBool, Ordering};

use uubdaq_lib::errors::{
  FrontEndError,
  StreamError,
};
use uubdaq_lib::events::EventHeader;
use uubdaq_lib::fragment::Fragmenter;
use uubdaq_lib::serialization::u32_to_u8;
use uubdaq_lib::settings::StreamSettings;

use crate::memory::RegisterAccess;
use crate::reader::{
  EventReader,
  ReadOutcome,
  Ticker,
};

/// Sends events to the data receiver
#[derive(Debug)]
pub struct DataSender {
  socket      : UdpSocket,
  dest        : SocketAddr,
  packet_size : usize,
}

impl DataSender {

  pub fn new(settings : &StreamSettings) -> Result<Self, StreamError> {
    DataSender::connect(&settings.data_address(), settings.packet_size)
  }

  /// Send to the given "host:port"
  pub fn connect(dest : &str, packet_size : usize) -> Result<Self, StreamError> {
    let dest = match dest.to_socket_addrs() {
      Err(err) => {
        error!("Can not resolve {}! {}", dest, err);
        return Err(StreamError::InvalidAddress(String::from(dest)));
      }
      Ok(mut addrs) => {
        match addrs.next() {
          None       => return Err(StreamError::InvalidAddress(String::from(dest))),
          Some(addr) => addr,
        }
      }
    };
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(StreamError::Socket)?;
    info!("Will send data to {}", dest);
    Ok(DataSender { socket, dest, packet_size })
  }

  fn send_datagram(&self, datagram : &[u8]) -> Result<(), StreamError> {
    let sent = self.socket.send_to(datagram, self.dest).map_err(StreamError::Send)?;
    if sent != datagram.len() {
      return Err(StreamError::ShortSend { expected : datagram.len(), sent });
    }
    Ok(())
  }

  /// Send the header packet and all fragments of
  /// one event. Returns the number of fragments.
  pub fn send_event(&self,
                    header  : &EventHeader,
                    payload : &[u8]) -> Result<usize, StreamError> {
    let fragments = Fragmenter::new(payload, header.id, self.packet_size)?;
    self.send_datagram(&header.to_header_packet())?;
    let mut n_frag = 0usize;
    for (_, datagram) in fragments {
      self.send_datagram(&datagram)?;
      n_frag += 1;
    }
    trace!("Sent event {} in {} fragments", header.id, n_frag);
    Ok(n_frag)
  }
}

/// Listens for the stop signal
#[derive(Debug)]
pub struct ControlListener {
  socket : UdpSocket,
}

impl ControlListener {

  pub fn new(settings : &StreamSettings) -> Result<Self, StreamError> {
    ControlListener::bind(&format!("0.0.0.0:{}", settings.ctrl_port))
  }

  pub fn bind(addr : &str) -> Result<Self, StreamError> {
    let socket = UdpSocket::bind(addr).map_err(StreamError::Socket)?;
    socket.set_nonblocking(true).map_err(StreamError::Socket)?;
    debug!("Listening for the stop signal on {}", addr);
    Ok(ControlListener { socket })
  }

  pub fn local_addr(&self) -> io::Result<SocketAddr> {
    self.socket.local_addr()
  }

  /// Check (without waiting) if a stop datagram arrived
  pub fn stop_requested(&self) -> bool {
    let mut buf = [0u8;64];
    match self.socket.recv_from(&mut buf) {
      Ok((_, from)) => {
        info!("Got stop signal from {}", from);
        true
      }
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => false,
      Err(err) => {
        warn!("Receiving on the control socket failed! {}", err);
        false
      }
    }
  }
}

/// What happened during a streaming run
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct StreamStatistics {
  pub n_events      : usize,
  pub n_fragments   : usize,
  pub n_timeouts    : usize,
  pub last_event_id : Option<u32>,
}

/// Read and send events until a stop signal arrives
/// on the control socket or the stop flag gets set
/// (e.g. by SIGINT). An event which is being sent
/// always goes out completely.
pub fn run_stream<H, T>(regs      : &mut H,
                        reader    : &mut EventReader<T>,
                        sender    : &DataSender,
                        control   : &ControlListener,
                        stop      : &AtomicBool,
                        max_ticks : u64) -> Result<StreamStatistics, FrontEndError>
  where H : RegisterAccess,
        T : Ticker {
  let mut stats = StreamStatistics::default();
  while !control.stop_requested() {
    if stop.load(Ordering::Relaxed) {
      info!("Stop flag set, ending the acquisition");
      break;
    }
    match reader.read_event(regs, max_ticks)? {
      ReadOutcome::TimedOut => {
        stats.n_timeouts += 1;
      }
      ReadOutcome::Event { header, duration_us } => {
        let payload = u32_to_u8(reader.data());
        stats.n_fragments += sender.send_event(&header, &payload)?;
        stats.n_events    += 1;
        stats.last_event_id = Some(header.id);
        info!("{}", header.summary(duration_us));
      }
    }
  }
  info!("Sent {} events in {} fragments", stats.n_events, stats.n_fragments);
  Ok(stats)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn invalid_destination() {
    assert!(matches!(DataSender::connect("no port given", 1400),
                     Err(StreamError::InvalidAddress(_))));
  }

  #[test]
  fn control_datagram_requests_stop() {
    let control = ControlListener::bind("127.0.0.1:0").unwrap();
    assert!(!control.stop_requested());
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(&[1u8], control.local_addr().unwrap()).unwrap();
    // loopback delivery is not instantaneous
    let mut stop = false;
    for _ in 0..100 {
      if control.stop_requested() {
        stop = true;
        break;
      }
      std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(stop);
    assert!(!control.stop_requested());
  }

  #[test]
  fn too_small_packet_size_sends_nothing() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_nonblocking(true).unwrap();
    let sender   = DataSender::connect(&receiver.local_addr().unwrap().to_string(), 8).unwrap();
    let header   = EventHeader::new();
    assert!(matches!(sender.send_event(&header, &[0u8; 16]),
                     Err(StreamError::PacketSizeTooSmall(8))));
    let mut buf = [0u8; 64];
    assert!(receiver.recv(&mut buf).is_err());
  }
}
