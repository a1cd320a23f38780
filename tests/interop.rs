mod common;

use std::io::{Read, Write};

use common::{decode_all, encode_all, lcg_bytes, ALL_LEVELS, PANGRAM};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use streaming_deflate_core::Strategy;

fn flate2_decode(compressed: &[u8]) -> Vec<u8> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

fn flate2_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Scenario E: at every level, our own round trip is exact and a reference
/// raw-deflate decoder accepts what our encoder produced.
#[test]
fn encoder_output_is_accepted_by_a_reference_decoder_at_every_level() {
    for &level in &ALL_LEVELS {
        let compressed = encode_all(PANGRAM, level, Strategy::Default);
        assert_eq!(decode_all(&compressed), PANGRAM, "our own round trip failed at level {level}");
        assert_eq!(
            flate2_decode(&compressed),
            PANGRAM,
            "reference decoder rejected our level {level} output"
        );
    }
}

#[test]
fn decoder_accepts_a_reference_encoders_output() {
    let compressed = flate2_encode(PANGRAM);
    assert_eq!(decode_all(&compressed), PANGRAM);
}

#[test]
fn decoder_accepts_reference_encoder_output_for_binary_data() {
    let data = lcg_bytes(65_536);
    let compressed = flate2_encode(&data);
    assert_eq!(decode_all(&compressed), data);
}

/// Scenario F: a 64 KiB pseudo-random stream round-trips exactly at level 6.
#[test]
fn pseudo_random_64kib_roundtrips_at_level_6() {
    let data = lcg_bytes(65_536);
    let compressed = encode_all(&data, 6, Strategy::Default);
    assert_eq!(decode_all(&compressed), data);
    assert_eq!(flate2_decode(&compressed), data);
}

#[test]
fn all_strategies_interoperate_with_the_reference_decoder() {
    let data = PANGRAM.repeat(10);
    for strategy in [
        Strategy::Default,
        Strategy::Filtered,
        Strategy::HuffmanOnly,
        Strategy::Rle,
        Strategy::Fixed,
    ] {
        let compressed = encode_all(&data, 6, strategy);
        assert_eq!(flate2_decode(&compressed), data, "strategy {strategy:?}");
    }
}
