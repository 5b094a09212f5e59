#![allow(dead_code, unused_imports)]
use hdbus::adapter::{J1939Adapter, SerialAdapter};
use hdbus::bus::{Bus, J1587Bus, J1939Bus, J1939Interface};
use hdbus::config::BusConfig;
use hdbus::decoder::Decoder;
use hdbus::dtc::error::Error as StoreError;
use hdbus::dtc::{DtcRecord, DtcStore, MemoryStore, Protocol, SledStore};
use hdbus::j1587::command;
use hdbus::j1587::constants::{PID_ACTIVE_DTC, PID_CLEAR_DTCS, PID_ENGINE_RPM, PID_VEHICLE_SPEED};
use hdbus::j1587::{Message, Parameter};
use hdbus::j1939::constants::{PGN_DM1, PGN_EEC1, PGN_REQUEST};
use hdbus::j1939::{J1939Decoder, J1939Frame};
use hdbus::metrics::{MetricTable, ENGINE_RPM, SPEED};
use hdbus::session::{Command, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

static MOCK_READ_TIMEOUT_MS: u64 = 10;
static WAIT_TIMEOUT_MS: u64 = 2000;
static QUIET_PERIOD_MS: u64 = 200;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> BusConfig {
    BusConfig {
        read_timeout: Duration::from_millis(MOCK_READ_TIMEOUT_MS),
        ..BusConfig::default()
    }
}

/// Serial link fed from a channel. Each chunk is returned by a single read and followed by a line idle period.
struct MockSerial {
    rx: mpsc::Receiver<Vec<u8>>,
    idle_pending: bool,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl SerialAdapter for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.idle_pending {
            self.idle_pending = false;
            std::thread::sleep(Duration::from_millis(5));
            return Err(std::io::ErrorKind::TimedOut.into());
        }

        match self.rx.recv_timeout(Duration::from_millis(MOCK_READ_TIMEOUT_MS)) {
            Ok(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                self.idle_pending = true;
                Ok(chunk.len())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Err(std::io::ErrorKind::TimedOut.into()),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                std::thread::sleep(Duration::from_millis(MOCK_READ_TIMEOUT_MS));
                Ok(0)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.written.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

impl Drop for MockSerial {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct SerialHarness {
    tx: mpsc::Sender<Vec<u8>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl SerialHarness {
    fn new() -> (Self, MockSerial) {
        let (tx, rx) = mpsc::channel();
        let written = Arc::new(Mutex::new(vec![]));
        let closed = Arc::new(AtomicBool::new(false));
        let adapter = MockSerial {
            rx,
            idle_pending: false,
            written: written.clone(),
            closed: closed.clone(),
        };
        (Self { tx, written, closed }, adapter)
    }

    fn send(&self, frame: &[u8]) {
        self.tx.send(frame.to_vec()).unwrap();
    }
}

type SentMessage = (u32, Vec<u8>, u8);

struct MockJ1939 {
    rx: mpsc::Receiver<J1939Frame>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail_send: bool,
}

impl J1939Adapter for MockJ1939 {
    fn recv(&mut self) -> hdbus::Result<Option<J1939Frame>> {
        match self.rx.recv_timeout(Duration::from_millis(MOCK_READ_TIMEOUT_MS)) {
            Ok(frame) => Ok(Some(frame)),
            Err(_) => Ok(None),
        }
    }

    fn send(&mut self, pgn: u32, data: &[u8], destination: u8) -> hdbus::Result<()> {
        if self.fail_send {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        self.sent.lock().unwrap().push((pgn, data.to_vec(), destination));
        Ok(())
    }
}

type SentLog = Arc<Mutex<Vec<SentMessage>>>;

fn j1939_mock(fail_send: bool) -> (mpsc::Sender<J1939Frame>, SentLog, MockJ1939) {
    let (tx, rx) = mpsc::channel();
    let sent = Arc::new(Mutex::new(vec![]));
    let adapter = MockJ1939 {
        rx,
        sent: sent.clone(),
        fail_send,
    };
    (tx, sent, adapter)
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_millis(WAIT_TIMEOUT_MS), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn next_dtc(rx: &mut Receiver<DtcRecord>) -> DtcRecord {
    tokio::time::timeout(Duration::from_millis(WAIT_TIMEOUT_MS), rx.recv())
        .await
        .expect("no DTC received")
        .expect("DTC channel closed")
}

async fn assert_no_dtc(rx: &mut Receiver<DtcRecord>) {
    let result = tokio::time::timeout(Duration::from_millis(QUIET_PERIOD_MS), rx.recv()).await;
    assert!(result.is_err(), "unexpected DTC {:?}", result);
}

fn j1587_dtc_frame(mid: u8, code: u8, fmi: u8) -> Vec<u8> {
    Message {
        mid,
        parameters: vec![Parameter {
            pid: PID_ACTIVE_DTC,
            data: vec![code, fmi],
        }],
    }
    .encode()
    .unwrap()
}

fn dm1(source_address: u8, spn: u32, fmi: u8) -> J1939Frame {
    let data = [
        0x00,
        0x00,
        spn as u8,
        (spn >> 8) as u8,
        ((spn >> 16) as u8) << 5 | fmi,
        0x01,
    ];
    J1939Frame::new(PGN_DM1, source_address, &data)
}

#[tokio::test]
#[serial_test::serial]
async fn j1587_metrics() {
    init_tracing();
    let (harness, adapter) = SerialHarness::new();
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config());
    bus.start().unwrap();

    harness.send(&[128, 84, 0x32, 250]);
    harness.send(&command::encode_frame(128, PID_ENGINE_RPM, &[0x27, 0x10]));

    let metrics = bus.metrics();
    wait_for(|| metrics.get(SPEED) == Some(50.0) && metrics.get(ENGINE_RPM) == Some(1250.0)).await;

    let snapshot = bus.snapshot();
    let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
    assert_eq!(json["Speed"], 50.0);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
#[serial_test::serial]
async fn j1587_malformed_frame_is_skipped() {
    init_tracing();
    let (harness, adapter) = SerialHarness::new();
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config());
    bus.start().unwrap();

    // Bad checksum, then a single byte, then a valid frame
    harness.send(&[128, 84, 0x40, 0x00]);
    harness.send(&[128]);
    harness.send(&command::encode_frame(128, PID_VEHICLE_SPEED, &[60]));

    let metrics = bus.metrics();
    wait_for(|| metrics.get(SPEED) == Some(60.0)).await;
    assert!(bus.is_running());
}

#[tokio::test]
#[serial_test::serial]
async fn j1587_dtc_reported_once() {
    init_tracing();
    let (harness, adapter) = SerialHarness::new();
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    for _ in 0..3 {
        harness.send(&j1587_dtc_frame(128, 110, 0));
    }

    let dtc = next_dtc(&mut dtcs).await;
    assert_eq!(dtc.protocol, Protocol::J1587);
    assert_eq!(dtc.source, 128);
    assert_eq!(dtc.code, 110);
    assert_eq!(dtc.fmi, 0);
    assert!(dtc.active);

    assert_no_dtc(&mut dtcs).await;
}

#[tokio::test]
#[serial_test::serial]
async fn j1587_clear_active_dtcs() {
    init_tracing();
    let (harness, adapter) = SerialHarness::new();
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    harness.send(&j1587_dtc_frame(128, 100, 1));
    next_dtc(&mut dtcs).await;

    bus.clear_active_dtcs(None).await.unwrap();
    {
        let written = harness.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0][..2], [128, PID_CLEAR_DTCS]);
        assert!(command::is_valid(&written[0]));
    }

    // The store forgot the fault, so it is reported again
    harness.send(&j1587_dtc_frame(128, 100, 1));
    assert_eq!(next_dtc(&mut dtcs).await.code, 100);

    bus.clear_active_dtcs(Some(130)).await.unwrap();
    assert_eq!(harness.written.lock().unwrap()[1][0], 130);
}

#[tokio::test]
#[serial_test::serial]
async fn stop_closes_adapter_and_channels() {
    init_tracing();
    let (harness, adapter) = SerialHarness::new();
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    harness.send(&j1587_dtc_frame(128, 91, 2));
    next_dtc(&mut dtcs).await;

    bus.stop();
    assert!(harness.closed.load(Ordering::SeqCst));
    assert!(dtcs.recv().await.is_none());

    bus.stop();
    assert!(matches!(bus.start(), Err(hdbus::Error::Stopped)));
    assert!(matches!(bus.clear_active_dtcs(None).await, Err(hdbus::Error::NotRunning)));
}

#[tokio::test]
#[serial_test::serial]
async fn drop_stops_bus() {
    let (harness, adapter) = SerialHarness::new();
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config());
    bus.start().unwrap();

    drop(bus);
    assert!(harness.closed.load(Ordering::SeqCst));
}

#[tokio::test]
#[serial_test::serial]
async fn full_dtc_channel_drops_newest() {
    init_tracing();
    let (harness, adapter) = SerialHarness::new();
    let config = BusConfig {
        dtc_buffer_size: 1,
        ..config()
    };
    let mut bus = J1587Bus::j1587(adapter, Arc::new(MemoryStore::new()), config);
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    for code in [110, 100, 91] {
        harness.send(&j1587_dtc_frame(128, code, 0));
    }

    // Frames are processed in order, so the DTCs were handled once the speed shows up
    harness.send(&command::encode_frame(128, PID_VEHICLE_SPEED, &[10]));
    let metrics = bus.metrics();
    wait_for(|| metrics.get(SPEED) == Some(10.0)).await;

    assert_eq!(next_dtc(&mut dtcs).await.code, 110);
    assert_no_dtc(&mut dtcs).await;

    // Dropped DTCs were never delivered, so their next sighting is reported
    harness.send(&j1587_dtc_frame(128, 100, 0));
    assert_eq!(next_dtc(&mut dtcs).await.code, 100);
    harness.send(&j1587_dtc_frame(128, 110, 0));
    assert_no_dtc(&mut dtcs).await;
}

/// Decoder that holds the first frame until the test releases it.
struct GatedDecoder {
    gate: Arc<Barrier>,
    entered: Arc<AtomicBool>,
    held: AtomicBool,
}

impl Decoder for GatedDecoder {
    type Frame = J1939Frame;

    fn decode(&self, frame: &J1939Frame, metrics: &MetricTable) -> hdbus::Result<Vec<DtcRecord>> {
        if !self.held.swap(true, Ordering::SeqCst) {
            self.entered.store(true, Ordering::SeqCst);
            self.gate.wait();
        }
        J1939Decoder::new().decode(frame, metrics)
    }
}

fn eec1(rpm: u16) -> J1939Frame {
    let [lo, hi] = (rpm * 8).to_le_bytes();
    J1939Frame::new(PGN_EEC1, 0x00, &[0xff, 0xff, 0xff, lo, hi, 0xff, 0xff, 0xff])
}

#[tokio::test]
#[serial_test::serial]
async fn full_frame_channel_drops_newest() {
    init_tracing();
    let (tx, _sent, adapter) = j1939_mock(false);
    let gate = Arc::new(Barrier::new(2));
    let entered = Arc::new(AtomicBool::new(false));
    let decoder = GatedDecoder {
        gate: gate.clone(),
        entered: entered.clone(),
        held: AtomicBool::new(false),
    };
    let config = BusConfig {
        frame_buffer_size: 1,
        ..config()
    };
    let mut bus = Bus::new(
        Some(J1939Interface::new(adapter)),
        decoder,
        Arc::new(MemoryStore::new()),
        config,
    );
    bus.start().unwrap();

    tx.send(eec1(1000)).unwrap();
    wait_for(|| entered.load(Ordering::SeqCst)).await;

    // Processor is stuck: 2000 fills the channel, 3000 is dropped
    tx.send(eec1(2000)).unwrap();
    tx.send(eec1(3000)).unwrap();
    tokio::time::sleep(Duration::from_millis(QUIET_PERIOD_MS)).await;
    assert!(bus.is_running());
    gate.wait();

    let metrics = bus.metrics();
    wait_for(|| metrics.get(ENGINE_RPM) == Some(2000.0)).await;
    tokio::time::sleep(Duration::from_millis(QUIET_PERIOD_MS)).await;
    assert_eq!(metrics.get(ENGINE_RPM), Some(2000.0));

    tx.send(eec1(4000)).unwrap();
    wait_for(|| metrics.get(ENGINE_RPM) == Some(4000.0)).await;
    assert!(bus.is_running());
}

/// Store whose lookups always fail.
struct BrokenStore;

impl DtcStore for BrokenStore {
    fn is_new(&self, _code_id: u32, _fmi: u8) -> Result<bool, StoreError> {
        Err(StoreError::Poisoned)
    }

    fn remove(&self, _code_id: u32, _fmi: u8) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }
}

#[tokio::test]
#[serial_test::serial]
async fn store_failure_forwards_every_sighting() {
    init_tracing();
    let (tx, _sent, adapter) = j1939_mock(false);
    let mut bus = J1939Bus::j1939(adapter, Arc::new(BrokenStore), config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    for _ in 0..3 {
        tx.send(dm1(0x00, 110, 1)).unwrap();
        let dtc = next_dtc(&mut dtcs).await;
        assert_eq!((dtc.code, dtc.fmi), (110, 1));
    }
    assert!(bus.is_running());
}

#[tokio::test]
#[serial_test::serial]
async fn j1939_metrics_and_dtcs() {
    init_tracing();
    let (tx, _sent, adapter) = j1939_mock(false);
    let mut bus = J1939Bus::j1939(adapter, Arc::new(MemoryStore::new()), config());
    let mut dtcs = bus.dtc_stream().unwrap();
    bus.start().unwrap();

    tx.send(J1939Frame::new(
        PGN_EEC1,
        0x00,
        &[0xff, 0xff, 0xff, 0x10, 0x27, 0xff, 0xff, 0xff],
    ))
    .unwrap();
    for _ in 0..3 {
        tx.send(dm1(0x00, 0x10201, 3)).unwrap();
    }

    let metrics = bus.metrics();
    wait_for(|| metrics.get(ENGINE_RPM) == Some(1250.0)).await;

    use tokio_stream::StreamExt;
    let dtc = tokio::time::timeout(Duration::from_millis(WAIT_TIMEOUT_MS), dtcs.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dtc.protocol, Protocol::J1939);
    assert_eq!(dtc.code, 0x10201);
    assert_eq!(dtc.fmi, 3);

    let again = tokio::time::timeout(Duration::from_millis(QUIET_PERIOD_MS), dtcs.next()).await;
    assert!(again.is_err());
}

#[tokio::test]
#[serial_test::serial]
async fn j1939_clear_sends_dm11_request() {
    init_tracing();
    let (_tx, sent, adapter) = j1939_mock(false);
    let mut bus = J1939Bus::j1939(adapter, Arc::new(MemoryStore::new()), config());
    bus.start().unwrap();

    bus.clear_active_dtcs(None).await.unwrap();
    bus.clear_active_dtcs(Some(0x03)).await.unwrap();

    // Concurrent commands are queued to the reader and all complete
    let requests = (0x10..0x18).map(|target| bus.clear_active_dtcs(Some(target)));
    let results = tokio::time::timeout(
        Duration::from_millis(WAIT_TIMEOUT_MS),
        futures::future::join_all(requests),
    )
    .await
    .unwrap();
    assert!(results.iter().all(|result| result.is_ok()));

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0], (PGN_REQUEST, vec![0xd3, 0xfe, 0x00], 0x00));
    assert_eq!(sent[1].2, 0x03);
    assert_eq!(sent.len(), 10);
}

#[tokio::test]
#[serial_test::serial]
async fn failed_write_keeps_store_and_bus() {
    init_tracing();
    let (tx, _sent, adapter) = j1939_mock(true);
    let store = Arc::new(MemoryStore::new());
    let mut bus = J1939Bus::j1939(adapter, store.clone(), config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    tx.send(dm1(0x00, 110, 1)).unwrap();
    next_dtc(&mut dtcs).await;

    let result = bus.clear_active_dtcs(None).await;
    assert!(matches!(result, Err(hdbus::Error::IoError(_))));
    assert!(bus.is_running());

    // Not cleared, still known
    assert!(!store.is_new(110, 1).unwrap());
}

#[tokio::test]
#[serial_test::serial]
async fn session_executes_commands() {
    init_tracing();
    let (_tx, sent, adapter) = j1939_mock(false);
    let bus = J1939Bus::j1939(adapter, Arc::new(MemoryStore::new()), config());
    let mut session = Session::from(bus);
    assert_eq!(session.protocol(), Protocol::J1939);

    let json = r#"{"command": "clear_dtcs", "target": 1}"#;
    let command: Command = serde_json::from_str(json).unwrap();
    assert!(matches!(session.execute(command).await, Err(hdbus::Error::NotRunning)));

    session.start().unwrap();
    session.execute(command).await.unwrap();
    assert_eq!(sent.lock().unwrap()[0].2, 1);

    session.stop();
    assert!(!session.is_running());
}

#[tokio::test]
#[serial_test::serial]
async fn sled_dedup_survives_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dtc.db");

    {
        let (tx, _sent, adapter) = j1939_mock(false);
        let store = Arc::new(SledStore::open(&path).unwrap());
        let mut bus = J1939Bus::j1939(adapter, store, config());
        let mut dtcs = bus.take_dtc_receiver().unwrap();
        bus.start().unwrap();

        tx.send(dm1(0x00, 190, 2)).unwrap();
        assert_eq!(next_dtc(&mut dtcs).await.code, 190);
    }

    let (tx, _sent, adapter) = j1939_mock(false);
    let store = Arc::new(SledStore::open(&path).unwrap());
    let mut bus = J1939Bus::j1939(adapter, store, config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    tx.send(dm1(0x00, 190, 2)).unwrap();
    tx.send(dm1(0x00, 190, 3)).unwrap();
    assert_eq!(next_dtc(&mut dtcs).await.fmi, 3);
    assert_no_dtc(&mut dtcs).await;
}

#[cfg(feature = "test-vcan")]
#[tokio::test]
#[serial_test::serial]
async fn vcan_j1939_round_trip() {
    use hdbus::socketcan::socket::J1939Socket;
    use hdbus::socketcan::SocketCan;

    init_tracing();
    let read_timeout = Duration::from_millis(MOCK_READ_TIMEOUT_MS);
    let adapter = SocketCan::open("vcan0", Some(0xf9), read_timeout).unwrap();
    let mut bus = J1939Bus::j1939(adapter, Arc::new(MemoryStore::new()), config());
    let mut dtcs = bus.take_dtc_receiver().unwrap();
    bus.start().unwrap();

    // Play engine #1 on the same interface
    let engine = J1939Socket::open("vcan0", 0x00).unwrap();
    engine.send_to(&[0x00, 0x00, 0x6e, 0x00, 0x01, 0x01], PGN_DM1, 0xff).unwrap();

    let dtc = next_dtc(&mut dtcs).await;
    assert_eq!(dtc.source, 0x00);
    assert_eq!(dtc.code, 110);

    bus.clear_active_dtcs(None).await.unwrap();
}

#[cfg(feature = "test-serial")]
#[tokio::test]
#[serial_test::serial]
async fn serial_port_opens() {
    use hdbus::session::{SerialConfig, SessionConfig};

    let port = std::env::var("HDBUS_TEST_SERIAL").unwrap_or_else(|_| "/dev/ttyUSB0".to_owned());
    let config = SessionConfig::J1587(SerialConfig {
        port,
        ..SerialConfig::default()
    });
    let mut session = Session::open(&config, BusConfig::default()).unwrap();
    session.start().unwrap();
    session.execute(Command::ClearActiveDtcs { target: None }).await.unwrap();
}
