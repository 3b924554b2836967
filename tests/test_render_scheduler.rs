use bytebeat::clock::SampleClock;
use bytebeat::formula::BytebeatCompiler;
use bytebeat::frame::{BitDepth, SinkFormat, SILENCE};
use bytebeat::scheduler::{LoopState, RenderLoop, RenderSession, SchedulerConfig};
use bytebeat::sink::{AudioSink, MemorySink, SharedSink};
use bytebeat::slot::FormulaSlot;
use std::sync::Arc;
use std::time::Duration;

type Loop = RenderLoop<BytebeatCompiler, MemorySink>;

fn u8_format(sample_rate: u32) -> SinkFormat {
    SinkFormat {
        sample_rate,
        channels: 1,
        bit_depth: BitDepth::Eight,
        signed: false,
    }
}

fn fast_config(frame_samples: usize) -> SchedulerConfig {
    SchedulerConfig {
        frame_samples,
        program_poll: Duration::from_millis(1),
        drain_poll: Duration::from_millis(1),
        eval_error_report_limit: 4,
    }
}

fn setup(
    source: &str,
    sink: MemorySink,
    logical_rate: u32,
    frame_samples: usize,
) -> (Loop, Arc<FormulaSlot<BytebeatCompiler>>, Arc<SharedSink<MemorySink>>) {
    let physical_rate = sink.format().sample_rate;
    let slot = Arc::new(FormulaSlot::new(BytebeatCompiler));
    slot.try_compile_and_swap(source);
    let sink = Arc::new(SharedSink::new(sink));
    let clock = SampleClock::new(logical_rate, physical_rate).unwrap();
    let session = RenderSession::new(sink.live_marker(), clock);
    let render_loop = RenderLoop::new(slot.clone(), sink.clone(), session, fast_config(frame_samples));
    (render_loop, slot, sink)
}

fn written_ordinals(sink: &SharedSink<MemorySink>) -> Vec<u64> {
    sink.with_sink(|s| s.written().iter().map(|r| r.first_ordinal).collect())
        .unwrap()
}

#[test]
fn test_backpressure_pauses_until_drained_and_resumes_in_order() {
    // capacity 8 frames, high water 2, low water 1
    let sink = MemorySink::new(u8_format(8000), 8, 2, 1);
    let (mut rl, _slot, shared) = setup("t", sink, 8000, 4);

    assert_eq!(rl.step().unwrap(), LoopState::Producing);
    assert_eq!(rl.step().unwrap(), LoopState::Producing);
    assert_eq!(rl.step().unwrap(), LoopState::Draining, "second frame hits high water");

    // No production while the sink is above low water
    for _ in 0..5 {
        assert_eq!(rl.step().unwrap(), LoopState::Draining);
    }
    assert_eq!(written_ordinals(&shared), vec![0, 4]);

    shared.with_sink(|s| s.drain(1)).unwrap();
    assert_eq!(rl.step().unwrap(), LoopState::Producing);
    rl.step().unwrap();

    assert_eq!(
        written_ordinals(&shared),
        vec![0, 4, 8],
        "production resumes at the next ordinal"
    );
    let bytes = shared.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(bytes, (0u8..12).collect::<Vec<_>>());
}

#[test]
fn test_rejected_frame_is_resent_unchanged() {
    // capacity 2 but high water never reached, so the third frame is rejected
    let sink = MemorySink::new(u8_format(8000), 2, 10, 1);
    let (mut rl, _slot, shared) = setup("t", sink, 8000, 4);

    rl.step().unwrap();
    rl.step().unwrap();
    rl.step().unwrap();
    assert_eq!(rl.step().unwrap(), LoopState::Draining);
    assert_eq!(shared.with_sink(|s| s.rejected()).unwrap(), 1);
    assert_eq!(rl.frames_written(), 2);
    assert_eq!(rl.session().physical_ordinal(), 12, "rejected frame was rendered once");

    shared.with_sink(|s| s.drain(1)).unwrap();
    assert_eq!(rl.step().unwrap(), LoopState::Producing);
    rl.step().unwrap();

    assert_eq!(written_ordinals(&shared), vec![0, 4, 8]);
    assert_eq!(rl.session().physical_ordinal(), 12, "resend does not advance time");
    let bytes = shared.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(bytes, (0u8..12).collect::<Vec<_>>());
}

#[test]
fn test_faulting_formula_keeps_frame_count() {
    let (mut good, _, good_sink) = setup("t", MemorySink::unbounded(u8_format(8000)), 8000, 8);
    let (mut bad, _, bad_sink) = setup("255 / (t & 1)", MemorySink::unbounded(u8_format(8000)), 8000, 8);

    for _ in 0..4 {
        good.step().unwrap();
        bad.step().unwrap();
    }
    assert_eq!(good.frames_written(), bad.frames_written());
    assert_eq!(bad.frames_written(), 3);

    let bytes = bad_sink.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(bytes.len(), good_sink.with_sink(|s| s.all_bytes()).unwrap().len());
    for (t, byte) in bytes.iter().enumerate() {
        if t % 2 == 0 {
            assert_eq!(*byte, SILENCE, "even t divides by zero");
        } else {
            assert_eq!(*byte, 255);
        }
    }
    assert_eq!(bad.faults().total(), 12);
    assert_eq!(bad.faults().reported(), 4);
}

#[test]
fn test_swap_is_heard_from_next_frame() {
    let (mut rl, slot, shared) = setup("1", MemorySink::unbounded(u8_format(8000)), 8000, 4);
    rl.step().unwrap();
    rl.step().unwrap();

    slot.try_compile_and_swap("2");
    rl.step().unwrap();

    let records = shared.with_sink(|s| s.written().to_vec()).unwrap();
    assert_eq!(records[0].generation, 1);
    assert_eq!(records[1].generation, 2);
    assert_eq!(records[1].first_ordinal, 4, "time keeps running across a swap");
    let bytes = shared.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(bytes, vec![1, 1, 1, 1, 2, 2, 2, 2]);
}

#[test]
fn test_failed_reload_keeps_playing_previous_formula() {
    let (mut rl, slot, shared) = setup("t & 7", MemorySink::unbounded(u8_format(8000)), 8000, 8);
    rl.step().unwrap();
    rl.step().unwrap();

    slot.try_compile_and_swap("t & (");
    rl.step().unwrap();

    let bytes = shared.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(&bytes[8..], &[0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn test_8k_formula_on_44k_output() {
    let (mut rl, _slot, shared) = setup("t & 255", MemorySink::unbounded(u8_format(44100)), 8000, 1024);
    rl.step().unwrap();
    rl.step().unwrap();

    let bytes = shared.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(bytes.len(), 1024);
    // floor(n * 8000 / 44100) is 0 for n in 0..=5 and 1 at n = 6
    assert_eq!(&bytes[..7], &[0, 0, 0, 0, 0, 0, 1]);
    assert_eq!(bytes[1023], ((1023u64 * 8000 / 44100) & 0xFF) as u8);
}

#[test]
fn test_stereo_16_bit_encoding() {
    let format = SinkFormat {
        sample_rate: 8000,
        channels: 2,
        bit_depth: BitDepth::Sixteen,
        signed: true,
    };
    let (mut rl, _slot, shared) = setup("255", MemorySink::unbounded(format), 8000, 2);
    rl.step().unwrap();
    rl.step().unwrap();

    let bytes = shared.with_sink(|s| s.all_bytes()).unwrap();
    assert_eq!(bytes.len(), 2 * 2 * 2);
    for sample in bytes.chunks_exact(2) {
        assert_eq!(i16::from_le_bytes([sample[0], sample[1]]), 127 << 8);
    }
}
