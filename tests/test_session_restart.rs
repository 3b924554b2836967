use bytebeat::clock::SampleClock;
use bytebeat::formula::BytebeatCompiler;
use bytebeat::frame::{BitDepth, SinkFormat};
use bytebeat::scheduler::{SchedulerConfig, SchedulerHandle};
use bytebeat::sink::{FrameRecord, MemorySink, SharedSink};
use bytebeat::slot::FormulaSlot;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn format() -> SinkFormat {
    SinkFormat {
        sample_rate: 8000,
        channels: 1,
        bit_depth: BitDepth::Eight,
        signed: false,
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        frame_samples: 4,
        program_poll: Duration::from_millis(1),
        drain_poll: Duration::from_millis(2),
        eval_error_report_limit: 1,
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn records(sink: &SharedSink<MemorySink>) -> Vec<FrameRecord> {
    sink.with_sink(|s| s.written().to_vec()).unwrap()
}

/// Slot with `t`, sink that backs up after two frames and is never played
fn start() -> (
    SchedulerHandle<BytebeatCompiler, MemorySink>,
    Arc<SharedSink<MemorySink>>,
) {
    let slot = Arc::new(FormulaSlot::new(BytebeatCompiler));
    slot.try_compile_and_swap("t");
    let sink = Arc::new(SharedSink::new(MemorySink::new(format(), 8, 2, 0)));
    let clock = SampleClock::new(8000, 8000).unwrap();
    let handle = SchedulerHandle::spawn(slot, sink.clone(), clock, config()).unwrap();
    (handle, sink)
}

#[test]
fn test_restart_supersedes_old_loop() {
    let (mut handle, sink) = start();
    assert!(wait_until(|| records(&sink).len() == 2), "first session fills to high water");
    assert_eq!(handle.live_marker(), 1);

    let marker = handle.restart().unwrap();
    assert_eq!(marker, 2, "marker strictly increases");
    assert_eq!(sink.with_sink(|s| s.resets()).unwrap(), 1);

    // The old loop notices it is stale and exits cleanly
    let exit = handle
        .exits()
        .recv_timeout(Duration::from_secs(5))
        .expect("old loop should exit");
    assert_eq!(exit.marker, 1);
    assert!(exit.result.is_ok());

    assert!(wait_until(|| records(&sink).len() == 4), "new session fills to high water");
    // Give a stale writer every chance to misbehave
    thread::sleep(Duration::from_millis(20));

    let after: Vec<u64> = records(&sink)[2..].iter().map(|r| r.first_ordinal).collect();
    assert_eq!(after, vec![0, 4], "new session starts at ordinal 0 and the old loop wrote nothing");

    handle.shutdown().unwrap();
}

#[test]
fn test_shutdown_stops_without_new_loop() {
    let (handle, sink) = start();
    assert!(wait_until(|| records(&sink).len() == 2));
    let exits = handle.exits().clone();

    handle.shutdown().unwrap();
    let exit = exits.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(exit.marker, 1);
    assert!(exits.try_recv().is_err(), "no second loop was started");

    // Draining the sink would have woken a live loop
    sink.with_sink(|s| s.drain(2)).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(records(&sink).len(), 2);
}

#[test]
fn test_sink_failure_is_reported_on_exit_channel() {
    let (handle, sink) = start();
    assert!(wait_until(|| records(&sink).len() == 2));

    sink.with_sink(|s| s.fail("device unplugged")).unwrap();
    let exit = handle
        .exits()
        .recv_timeout(Duration::from_secs(5))
        .expect("loop should stop on sink failure");
    assert_eq!(exit.marker, 1);
    assert!(exit.result.is_err());

    handle.shutdown().unwrap();
}
