use std::net::UdpSocket;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use uubdaq_lib::constants::{
  ADC_ADDR_TEST,
  ADC_RAMPOFF,
  HEADER_TAG,
  NSAMPLES,
  PAYLOAD_SIZE,
  RAMP_MSGLEN,
  RAW_NCH,
};
use uubdaq_lib::errors::{
  AdcError,
  FrontEndError,
};
use uubdaq_lib::events::EventHeader;
use uubdaq_lib::fragment::FragmentHeader;
use uubdaq_lib::serialization::Serialization;

use uubdaq_fe::adc::{
  AdcSet,
  initialize_adcs,
};
use uubdaq_fe::control::{
  TriggerGuard,
  set_fake_pps,
};
use uubdaq_fe::ramp_server::RampServer;
use uubdaq_fe::reader::EventReader;
use uubdaq_fe::registers::SHWR_BUF_TRIG_MASK_ADDR;
use uubdaq_fe::selftest::check_ramp;
use uubdaq_fe::sim::{
  SimPattern,
  SimulatedBoard,
};
use uubdaq_fe::stream::{
  ControlListener,
  DataSender,
  run_stream,
};
use uubdaq_lib::settings::TriggerSettings;

/// A receiver for the data stream which collects
/// datagrams until the sender is quiet for a while
fn spawn_receiver() -> (String, mpsc::Receiver<Vec<Vec<u8>>>) {
  let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
  let rcvbuf : libc::c_int = 4*1024*1024;
  unsafe {
    libc::setsockopt(socket.as_raw_fd(),
                     libc::SOL_SOCKET,
                     libc::SO_RCVBUF,
                     &rcvbuf as *const libc::c_int as *const libc::c_void,
                     std::mem::size_of::<libc::c_int>() as libc::socklen_t);
  }
  socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
  let addr = socket.local_addr().unwrap().to_string();
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    let mut packets = Vec::<Vec<u8>>::new();
    let mut buf     = vec![0u8; 65536];
    while let Ok(len) = socket.recv(&mut buf) {
      packets.push(buf[..len].to_vec());
    }
    tx.send(packets).unwrap();
  });
  (addr, rx)
}

/// Split received datagrams into events: a header
/// packet followed by the reassembled payload
fn reassemble(packets : &[Vec<u8>]) -> Vec<(EventHeader, Vec<FragmentHeader>, Vec<u8>)> {
  let mut events = Vec::new();
  for packet in packets {
    let mut pos = 0usize;
    if packet.len() == EventHeader::SIZE {
      let mut header = EventHeader::from_bytestream(packet, &mut pos).unwrap();
      assert_ne!(header.id & HEADER_TAG, 0);
      header.id &= !HEADER_TAG;
      events.push((header, Vec::new(), Vec::new()));
      continue;
    }
    let frag = FragmentHeader::from_bytestream(packet, &mut pos).unwrap();
    let (header, frags, payload) = events.last_mut().unwrap();
    assert_eq!(frag.id, header.id);
    assert_eq!(frag.start as usize, payload.len());
    payload.extend_from_slice(&packet[FragmentHeader::SIZE..]);
    frags.push(frag);
  }
  events
}

#[test]
fn ramp_check_all_adcs_ok() {
  let mut board  = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  let mut adcs   = AdcSet::from_links(board.adc_links());
  let mut reader = EventReader::new(board.ticker()).unwrap();
  let report     = check_ramp(&mut board, &mut adcs, &mut reader, 0).unwrap();
  assert_eq!(report.result, 0);
  assert_eq!(report.header.id, 0);
  assert_eq!(report.header.buf_start, board.buf_start());
  // the ADCs are back in normal mode, the slot is released
  for adc in 0..RAW_NCH {
    assert!(!board.is_ramp_on(adc));
    assert_eq!(board.adc_register(adc, ADC_ADDR_TEST), Some(ADC_RAMPOFF));
  }
  assert_eq!(board.pending(), 0);
}

#[test]
fn ramp_check_restores_trigger_mask() {
  let mut board  = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  {
    use uubdaq_fe::memory::{Block, RegisterAccess};
    board.write(Block::Trigger, SHWR_BUF_TRIG_MASK_ADDR, 0x1234);
  }
  let mut adcs   = AdcSet::from_links(board.adc_links());
  let mut reader = EventReader::new(board.ticker()).unwrap();
  check_ramp(&mut board, &mut adcs, &mut reader, 0).unwrap();
  let last_mask = board.trigger_writes()
                       .into_iter()
                       .filter(|(word, _)| *word == SHWR_BUF_TRIG_MASK_ADDR)
                       .last()
                       .unwrap();
  assert_eq!(last_mask.1, 0x1234);
}

#[test]
fn ramp_check_flags_a_stuck_adc() {
  let mut patterns = [SimPattern::Ramp;RAW_NCH];
  patterns[2]      = SimPattern::Constant(1234);
  let mut board    = SimulatedBoard::new(patterns);
  let mut adcs     = AdcSet::from_links(board.adc_links());
  let mut reader   = EventReader::new(board.ticker()).unwrap();
  let report       = check_ramp(&mut board, &mut adcs, &mut reader, 0).unwrap();
  assert_eq!(report.result, 0x04);
}

#[test]
fn ramp_check_flags_skewed_and_wrapped_traces() {
  let mut patterns = [SimPattern::Ramp;RAW_NCH];
  patterns[4]      = SimPattern::Skewed;
  let mut board    = SimulatedBoard::new(patterns);
  // trigger position close to the end of the slot
  board.set_buf_start((NSAMPLES - 3) as u32);
  let mut adcs     = AdcSet::from_links(board.adc_links());
  let mut reader   = EventReader::new(board.ticker()).unwrap();
  let report       = check_ramp(&mut board, &mut adcs, &mut reader, 0).unwrap();
  assert_eq!(report.result, 0x10);
}

#[test]
fn failing_adc_is_skipped_and_reported() {
  let mut board  = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  board.fail_adc(1);
  let mut adcs   = AdcSet::from_links(board.adc_links());
  let mut reader = EventReader::new(board.ticker()).unwrap();
  let report     = check_ramp(&mut board, &mut adcs, &mut reader, 0).unwrap();
  // no ramp on ADC 1, the others still get checked
  assert_eq!(report.result, 0x02);
  assert!(adcs.is_failed(1));
  // one failed transaction, afterwards it is left alone
  let n_adc1 = board.spi_log().iter().filter(|(adc, _)| *adc == 1).count();
  assert_eq!(n_adc1, 1);
}

#[test]
fn stream_one_event_to_localhost() {
  let mut board    = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  board.queue_events(1);
  let mut reader   = EventReader::new(board.ticker()).unwrap();
  let (addr, rx)   = spawn_receiver();
  let packet_size  = 1400usize;
  let sender       = DataSender::connect(&addr, packet_size).unwrap();
  let header = match reader.read_event(&mut board, 10).unwrap() {
    uubdaq_fe::reader::ReadOutcome::Event { header, .. } => header,
    uubdaq_fe::reader::ReadOutcome::TimedOut => panic!("no event"),
  };
  let max     = packet_size - FragmentHeader::SIZE;
  let payload : Vec<u8> = (0..3*max).map(|k| (k % 253) as u8).collect();
  assert_eq!(sender.send_event(&header, &payload).unwrap(), 3);
  let packets = rx.recv().unwrap();
  assert_eq!(packets.len(), 4);
  let events = reassemble(&packets);
  assert_eq!(events.len(), 1);
  let (rcv_header, frags, rcv_payload) = &events[0];
  assert_eq!(*rcv_header, header);
  let offsets : Vec<(u16, u16)> = frags.iter().map(|f| (f.start, f.end)).collect();
  assert_eq!(offsets, vec![(0, 1392), (1392, 2784), (2784, 4176)]);
  assert_eq!(*rcv_payload, payload);
}

#[test]
fn stream_until_control_datagram() {
  let mut board   = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  let control     = ControlListener::bind("127.0.0.1:0").unwrap();
  let ctrl_addr   = control.local_addr().unwrap();
  let (addr, rx)  = spawn_receiver();
  let sender      = DataSender::connect(&addr, 1400).unwrap();
  // two events are waiting, a third one arrives with the
  // first wake-up, together with the stop request
  board.queue_events(2);
  board.trigger_after_ticks(1);
  let stopper = UdpSocket::bind("127.0.0.1:0").unwrap();
  board.on_tick(move |tick| {
    if tick == 1 {
      stopper.send_to(b"stop", ctrl_addr).unwrap();
      thread::sleep(Duration::from_millis(10));
    }
  });
  let mut reader  = EventReader::new(board.ticker()).unwrap();
  let stop        = AtomicBool::new(false);
  let stats = {
    let settings    = TriggerSettings::default();
    let mut trigger = TriggerGuard::configure(&mut board, &settings);
    set_fake_pps(&mut *trigger);
    run_stream(&mut *trigger, &mut reader, &sender, &control, &stop, 100).unwrap()
  };
  assert_eq!(stats.n_events, 3);
  assert_eq!(stats.n_fragments, 3*30);
  assert_eq!(stats.last_event_id, Some(2));
  assert_eq!(board.pending(), 0);

  let events = reassemble(&rx.recv().unwrap());
  assert_eq!(events.len(), 3);
  for (k, (header, frags, payload)) in events.iter().enumerate() {
    assert_eq!(header.id, k as u32);
    assert_eq!(frags.len(), 30);
    assert_eq!(payload.len(), PAYLOAD_SIZE);
    assert_eq!(frags.last().unwrap().end as usize, PAYLOAD_SIZE);
  }
}

#[test]
fn stream_stops_on_flag() {
  let mut board  = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  let control    = ControlListener::bind("127.0.0.1:0").unwrap();
  let (addr, _rx) = spawn_receiver();
  let sender     = DataSender::connect(&addr, 1400).unwrap();
  let mut reader = EventReader::new(board.ticker()).unwrap();
  let stop       = AtomicBool::new(true);
  let stats = run_stream(&mut board, &mut reader, &sender, &control, &stop, 10).unwrap();
  assert_eq!(stats.n_events, 0);
  assert_eq!(board.ticks(), 0);
}

#[test]
fn adcinit_reports_mismatches() {
  let mut board = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  board.corrupt_readback(3, 0x0014, 0x00);
  let mut links = board.adc_links();
  let mismatches = initialize_adcs(RAW_NCH, |adc| {
    links[adc].take().ok_or(AdcError::NotOpen(adc))
  }).unwrap();
  assert_eq!(mismatches.len(), 1);
  match &mismatches[0] {
    AdcError::Readback { adc, addr, expected, found } => {
      assert_eq!((*adc, *addr, *expected, *found), (3, 0x0014, 0xa4, 0x00));
    }
    err => panic!("unexpected {}", err),
  }
  // the other ADCs went through the whole sequence
  assert_eq!(board.adc_register(0, 0x0018), Some(0x04));
  assert_eq!(board.adc_register(4, ADC_ADDR_TEST), Some(ADC_RAMPOFF));
}

#[test]
fn adcinit_transfer_error_is_fatal() {
  let mut board = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  board.fail_adc(0);
  let mut links = board.adc_links();
  let result = initialize_adcs(RAW_NCH, |adc| {
    links[adc].take().ok_or(AdcError::NotOpen(adc))
  });
  let err = FrontEndError::from(result.unwrap_err());
  assert_eq!(err.exit_code(), uubdaq_lib::constants::EXIT_SPIWRITE);
}

#[test]
fn ramp_server_over_udp() {
  let board  = SimulatedBoard::new([SimPattern::Ramp;RAW_NCH]);
  let server = RampServer::bind("127.0.0.1:0").unwrap();
  let addr   = server.local_addr().unwrap();
  let client = UdpSocket::bind("127.0.0.1:0").unwrap();
  client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

  // wrong size, never answered
  client.send_to(&[0x40u8; 4], addr).unwrap();
  // ADC 1 both channels on, then quit
  let mut msg = [0u8; RAMP_MSGLEN];
  msg[0] = 0x40 | 0x20 | (1 << 2) | 0x03;
  client.send_to(&msg, addr).unwrap();
  let mut quit = [0u8; RAMP_MSGLEN];
  quit[0] = 0x21;
  client.send_to(&quit, addr).unwrap();

  let mut adcs = AdcSet::from_links(board.adc_links());
  let stop     = AtomicBool::new(false);
  server.serve(&mut adcs, &stop).unwrap();
  assert!(board.is_ramp_on(1));
  assert!(!board.is_ramp_on(0));

  let mut reply = [0u8; 64];
  let (len, _) = client.recv_from(&mut reply).unwrap();
  assert_eq!(len, RAMP_MSGLEN);
  assert_eq!(reply[0], 0x21);
  let (len, _) = client.recv_from(&mut reply).unwrap();
  assert_eq!(len, RAMP_MSGLEN);
  assert_eq!(reply[0], 0x21);
}
