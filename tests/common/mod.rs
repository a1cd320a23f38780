use streaming_deflate_core::{Decoder, DecoderLimits, Encoder, FinishProgress, Progress, Strategy};

/// Encodes `data` through `enc`, feeding input in `in_chunk`-sized pieces and
/// draining output through `out_chunk`-sized buffers, exercising arbitrary
/// input/output partitioning the way a real streaming caller would.
pub fn encode_chunked(data: &[u8], enc: &mut Encoder, in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let in_chunk = in_chunk.max(1);
    let out_chunk = out_chunk.max(1);
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_chunk];
    let mut pos = 0;
    while pos < data.len() {
        let end = (pos + in_chunk).min(data.len());
        let mut slice = &data[pos..end];
        while !slice.is_empty() {
            let (used, written) = enc.update(slice, &mut buf).unwrap();
            out.extend_from_slice(&buf[..written]);
            slice = &slice[used..];
            if used == 0 && written == 0 {
                break;
            }
        }
        pos = end;
    }
    loop {
        let (written, progress) = enc.finish(&mut buf).unwrap();
        out.extend_from_slice(&buf[..written]);
        if progress == FinishProgress::Done {
            break;
        }
    }
    out
}

pub fn encode_all(data: &[u8], level: u8, strategy: Strategy) -> Vec<u8> {
    let mut enc = Encoder::new(level, 15, strategy, 0).unwrap();
    encode_chunked(data, &mut enc, data.len().max(1), 4096)
}

/// Decodes `compressed` through `dec`, feeding input in `in_chunk`-sized
/// pieces and draining output through `out_chunk`-sized buffers.
pub fn decode_chunked(compressed: &[u8], dec: &mut Decoder, in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let in_chunk = in_chunk.max(1);
    let out_chunk = out_chunk.max(1);
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_chunk];
    let mut pos = 0;
    loop {
        let end = (pos + in_chunk).min(compressed.len());
        let mut slice = &compressed[pos..end];
        let chunk_is_last = end == compressed.len();
        loop {
            let (used, written, progress) = dec.update(slice, &mut buf).unwrap();
            out.extend_from_slice(&buf[..written]);
            slice = &slice[used..];
            pos += used;
            if progress == Progress::Done {
                return out;
            }
            if slice.is_empty() {
                break;
            }
        }
        if chunk_is_last {
            break;
        }
    }
    loop {
        let (written, progress) = dec.finish(&mut buf).unwrap();
        out.extend_from_slice(&buf[..written]);
        if progress == Progress::Done {
            break;
        }
    }
    out
}

pub fn decode_all(compressed: &[u8]) -> Vec<u8> {
    let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
    decode_chunked(compressed, &mut dec, compressed.len().max(1), 4096)
}

pub const PANGRAM: &[u8] =
    b"The quick brown fox jumps over the lazy dog. Pack my box with five dozen liquor jugs. How vexingly quick daft zebras jump!";

pub const ALL_LEVELS: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

pub const ALL_STRATEGIES: [Strategy; 5] = [
    Strategy::Default,
    Strategy::Filtered,
    Strategy::HuffmanOnly,
    Strategy::Rle,
    Strategy::Fixed,
];

/// The 64 KiB pseudo-random byte sequence from scenario F: an LCG seeded
/// with 12345, taking the high byte of each successive 32-bit state.
pub fn lcg_bytes(count: usize) -> Vec<u8> {
    let mut state: u32 = 12345;
    (0..count)
        .map(|_| {
            state = state
                .wrapping_mul(1103515245)
                .wrapping_add(12345);
            (state >> 24) as u8
        })
        .collect()
}
