//! Property-based tests for the streaming decode engine.

use proptest::prelude::*;

use hcastream::io::MemorySource;
use hcastream::sound::synthetic::sample_value;
use hcastream::sound::{CodecSession, SyntheticDecoder, SyntheticStream};

fn open(stream: &SyntheticStream) -> CodecSession<SyntheticDecoder> {
    let mut src = MemorySource::new("prop", stream.build());
    CodecSession::open(&mut src, SyntheticDecoder::new()).unwrap()
}

proptest! {
    /// A request within one block reads at most one block and leaves the rest in the window.
    #[test]
    fn partial_request_reads_one_block(spb in 1u32..512, channels in 1u32..3, k_frac in 0.0f64..1.0) {
        let k = ((spb as f64 * k_frac) as u32).clamp(1, spb);
        let mut session = open(&SyntheticStream::new(channels, spb, 4));

        let out = session.decode_to_vec(k as usize);

        prop_assert_eq!(out.len(), (k * channels) as usize);
        prop_assert_eq!(session.current_block(), 1);
        prop_assert_eq!(session.samples_filled(), spb - k);
    }

    /// Chunked decoding delivers every frame after the delay, in order, then silence.
    #[test]
    fn chunked_decode_delivers_whole_stream(
        spb in 1u32..200,
        blocks in 0u32..8,
        delay in 0u32..300,
        chunk in 1usize..500,
    ) {
        let stream = SyntheticStream::new(2, spb, blocks).encoder_delay(delay);
        let total = stream.info().total_samples() as usize;
        let mut session = open(&stream);

        let mut delivered = Vec::new();
        while delivered.len() < (total + chunk) * 2 {
            delivered.extend(session.decode_to_vec(chunk));
        }

        let real: Vec<i16> = (delay as u64..blocks as u64 * spb as u64)
            .flat_map(|f| (0..2).map(move |c| sample_value(f, c, 2)))
            .collect();
        prop_assert_eq!(&delivered[..total * 2], real.as_slice());
        prop_assert!(delivered[total * 2..].iter().all(|&s| s == 0));
        prop_assert!(!session.has_error());
    }

    /// Reset always re-arms the encoder delay from block 0.
    #[test]
    fn reset_restores_start(delay in 0u32..100, consumed in 0usize..400) {
        let mut session = open(&SyntheticStream::new(1, 64, 6).encoder_delay(delay).loop_start(2, 9));
        let _ = session.decode_to_vec(consumed);
        session.seek_to_loop();
        session.reset();

        prop_assert_eq!(session.current_block(), 0);
        prop_assert_eq!(session.samples_filled(), 0);
        prop_assert_eq!(session.samples_to_discard(), delay);
    }

    /// After a loop seek the loop delay is skipped before output resumes.
    #[test]
    fn loop_seek_discards_loop_delay(loop_block in 0u32..5, loop_delay in 0u32..150) {
        let mut session = open(&SyntheticStream::new(1, 64, 5).loop_start(loop_block, loop_delay));
        let _ = session.decode_to_vec(10);
        session.seek_to_loop();

        let out = session.decode_to_vec(8);
        let start = loop_block as u64 * 64 + loop_delay as u64;
        for (i, &s) in out.iter().enumerate() {
            let frame = start + i as u64;
            let want = if frame < 320 { sample_value(frame, 0, 1) } else { 0 };
            prop_assert_eq!(s, want);
        }
    }
}
