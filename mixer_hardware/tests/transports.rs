use mixer_hardware::{LineTransport, SimulatedTransport, TransportError};
use mixer_traits::Transport;
use rstest::rstest;
use std::io::{self, Write};

#[test]
fn simulated_records_in_order_and_shares_log_across_clones() {
    let sim = SimulatedTransport::new();
    let mut t = sim.clone();
    t.send("batchabort").unwrap();
    t.send("batchprep 0x1 3:100").unwrap();
    t.send("batchrun").unwrap();
    assert_eq!(sim.sent(), vec!["batchabort", "batchprep 0x1 3:100", "batchrun"]);
    assert_eq!(sim.attempts(), 3);
}

#[rstest]
#[case(0, vec!["b", "c"])]
#[case(1, vec!["a", "c"])]
#[case(5, vec!["a", "b", "c"])]
fn fail_nth_skips_exactly_one_attempt(#[case] n: usize, #[case] expected: Vec<&str>) {
    let sim = SimulatedTransport::new();
    sim.fail_nth(n);
    let mut t = sim.clone();
    let results: Vec<bool> = ["a", "b", "c"].iter().map(|c| t.send(c).is_ok()).collect();
    assert_eq!(results.iter().filter(|ok| !**ok).count(), usize::from(n < 3));
    assert_eq!(sim.sent(), expected);
}

#[test]
fn fail_on_prefix_returns_typed_error() {
    let sim = SimulatedTransport::new();
    sim.fail_on("batchrun");
    let mut t = sim.clone();
    let err = t.send("batchrun").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TransportError>(),
        Some(TransportError::Rejected(c)) if c == "batchrun"
    ));
    assert!(t.send("batchabort").is_ok());
}

#[test]
fn disconnected_simulator_refuses_everything() {
    let sim = SimulatedTransport::new();
    sim.set_connected(false);
    let mut t = sim.clone();
    assert!(!t.is_connected());
    let err = t.send("batchabort").unwrap_err();
    assert!(matches!(err.downcast_ref::<TransportError>(), Some(TransportError::Disconnected)));
    assert!(sim.sent().is_empty());
}

#[test]
fn line_transport_frames_with_newlines() {
    let mut t = LineTransport::new(Vec::new());
    t.send("batchprep 0x1f 22:500").unwrap();
    t.send("batchrun").unwrap();
    let bytes = t.into_inner().unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "batchprep 0x1f 22:500\nbatchrun\n");
}

struct Broken;

impl Write for Broken {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn line_transport_goes_down_after_a_write_error() {
    let mut t = LineTransport::new(Broken);
    assert!(t.is_connected());
    assert!(t.send("batchrun").is_err());
    assert!(!t.is_connected());
    let err = t.send("batchabort").unwrap_err();
    assert!(matches!(err.downcast_ref::<TransportError>(), Some(TransportError::Disconnected)));
}

#[test]
fn line_transport_opens_a_writable_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tty");
    std::fs::write(&path, "").unwrap();
    let mut t = LineTransport::open(&path).unwrap();
    t.send("pulse 1 22 100").unwrap();
    t.close();
    assert!(!t.is_connected());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "pulse 1 22 100\n");
}
