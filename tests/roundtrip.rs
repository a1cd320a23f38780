mod common;

use common::{decode_all, decode_chunked, encode_all, encode_chunked, ALL_LEVELS, ALL_STRATEGIES, PANGRAM};
use streaming_deflate_core::{Decoder, DecoderLimits, Encoder, Progress, Status};

#[test]
fn roundtrips_at_every_level_and_strategy() {
    for &level in &ALL_LEVELS {
        for &strategy in &ALL_STRATEGIES {
            let compressed = encode_all(PANGRAM, level, strategy);
            let out = decode_all(&compressed);
            assert_eq!(out, PANGRAM, "level={level} strategy={strategy:?}");
        }
    }
}

#[test]
fn empty_input_produces_a_non_empty_stream_that_decodes_to_empty() {
    for &level in &ALL_LEVELS {
        let compressed = encode_all(b"", level, streaming_deflate_core::Strategy::Default);
        assert!(!compressed.is_empty(), "level {level} emitted no bytes for empty input");
        assert_eq!(decode_all(&compressed), b"");
    }
}

#[test]
fn single_byte_roundtrips_at_every_level() {
    for &level in &ALL_LEVELS {
        let compressed = encode_all(b"z", level, streaming_deflate_core::Strategy::Default);
        assert_eq!(decode_all(&compressed), b"z");
    }
}

#[test]
fn all_same_byte_compresses_well_and_roundtrips() {
    let data = vec![0xAAu8; 20_000];
    let compressed = encode_all(&data, 6, streaming_deflate_core::Strategy::Rle);
    assert!(
        compressed.len() < data.len() / 20,
        "expected a large compression ratio for a constant byte, got {} for {} input bytes",
        compressed.len(),
        data.len()
    );
    assert_eq!(decode_all(&compressed), data);
}

#[test]
fn chunk_independence_holds_for_varied_input_and_output_partitions() {
    let data = PANGRAM.repeat(8);
    let full = decode_all(&encode_all(&data, 6, streaming_deflate_core::Strategy::Default));
    assert_eq!(full, data);

    for &(in_chunk, out_chunk) in &[(1, 1), (1, 7), (3, 1), (17, 5), (64, 64), (4096, 4096)] {
        let mut enc = Encoder::new(6, 15, streaming_deflate_core::Strategy::Default, 0).unwrap();
        let compressed = encode_chunked(&data, &mut enc, in_chunk, out_chunk);

        let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
        let out = decode_chunked(&compressed, &mut dec, in_chunk, out_chunk);
        assert_eq!(out, data, "in_chunk={in_chunk} out_chunk={out_chunk}");
    }
}

#[test]
fn byte_by_byte_decoding_matches_all_at_once() {
    let data = PANGRAM.repeat(3);
    let compressed = encode_all(&data, 6, streaming_deflate_core::Strategy::Default);

    let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
    let out = decode_chunked(&compressed, &mut dec, 1, 1);
    assert_eq!(out, data);
}

#[test]
fn tiny_output_buffers_during_encoder_finish_drain_without_loss() {
    let data = PANGRAM.repeat(5);
    for &buf_len in &[1usize, 2] {
        let mut enc = Encoder::new(6, 15, streaming_deflate_core::Strategy::Default, 0).unwrap();
        let compressed = encode_chunked(&data, &mut enc, data.len(), buf_len);
        assert_eq!(decode_all(&compressed), data, "finish output buffer len {buf_len}");
    }
}

#[test]
fn tiny_output_buffers_during_decoder_finish_drain_without_loss() {
    let data = PANGRAM.repeat(5);
    let compressed = encode_all(&data, 6, streaming_deflate_core::Strategy::Default);
    for &buf_len in &[1usize, 2] {
        let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
        let out = decode_chunked(&compressed, &mut dec, compressed.len(), buf_len);
        assert_eq!(out, data, "finish output buffer len {buf_len}");
    }
}

#[test]
fn truncated_stream_fails_corrupt_never_ok() {
    let data = PANGRAM.repeat(4);
    let compressed = encode_all(&data, 6, streaming_deflate_core::Strategy::Default);
    let truncated = &compressed[..compressed.len() - 1];

    let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
    let mut buf = [0u8; 4096];
    let (_, _, progress) = dec.update(truncated, &mut buf).unwrap();
    if progress != Progress::Done {
        assert!(dec.finish(&mut buf).is_err(), "truncated stream must not report finish as OK");
    }
}

#[test]
fn reset_idempotence_matches_a_fresh_instance() {
    let data = PANGRAM.repeat(2);
    let compressed = encode_all(&data, 6, streaming_deflate_core::Strategy::Default);

    let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
    let first = decode_chunked(&compressed, &mut dec, 13, 17);
    dec.reset();
    let second = decode_chunked(&compressed, &mut dec, 13, 17);
    assert_eq!(first, second);
    assert_eq!(first, data);

    let mut enc = Encoder::new(6, 15, streaming_deflate_core::Strategy::Default, 0).unwrap();
    let first_enc = encode_chunked(&data, &mut enc, 11, 9);
    enc.reset();
    let second_enc = encode_chunked(&data, &mut enc, 11, 9);
    assert_eq!(first_enc, second_enc);
}

#[test]
fn failed_decoder_never_resumes_into_ok() {
    // Scenario B shape: a stored block with a corrupted NLEN.
    let bad = [0x01u8, 0x05, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l', b'o'];
    let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
    let mut buf = [0u8; 64];
    let err = dec.update(&bad, &mut buf).unwrap_err();
    assert_eq!(err.status(), Status::ErrCorrupt);
    assert!(dec.finish(&mut buf).is_err(), "finish on a failed decoder must not report OK");
    let (used, written, _) = dec.update(&bad, &mut buf).unwrap_or((0, 0, Progress::Done));
    assert_eq!((used, written), (0, 0), "update on a failed decoder must be a no-op, never progress");
}
