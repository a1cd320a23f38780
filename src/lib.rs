//! Streaming RFC 1951 DEFLATE codec core: a resumable encoder and decoder
//! that can be fed arbitrarily small input/output chunks across repeated
//! calls, safe against adversarial compressed input, and interoperable with
//! any standards-compliant raw-deflate producer/consumer.
//!
//! This crate is the engine; the options container, plugin registry, and
//! allocator are external collaborators whose trait boundaries live in
//! [`external`]. A host application wires a concrete registry/options/
//! allocator around [`Codec`], or uses [`Decoder`]/[`Encoder`] directly.

pub mod bitstream;
pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod external;
pub mod huffman;
pub mod window;

use log::warn;

pub use decoder::{Decoder, DecoderLimits, Progress};
pub use encoder::{Encoder, FinishProgress, Strategy};
pub use error::{DeflateError, DeflateResult, Status};
pub use external::{AllocatorHandle, DeflateOptions, GlobalAllocator, OptionsSource, Registry};

/// One codec instance, wrapping either a [`Decoder`] or an [`Encoder`], for
/// callers that want a single type and the `Status`-returning shape spec §6
/// describes (`create_encoder`/`create_decoder` → handle, `update`/`finish`
/// → status code, `get_error_detail`, `destroy`).
///
/// Most Rust callers are better served calling [`Decoder`]/[`Encoder`]
/// directly, which return `DeflateResult` instead of a raw `Status`; `Codec`
/// exists for hosts that only have the registry-style boundary available
/// (e.g. a C-ABI shim sitting on top of this crate).
pub enum Codec {
    Encoder(Encoder),
    Decoder(Decoder),
}

impl Codec {
    /// Spec §6 `create_decoder`: builds a decoder from an `OptionsSource`,
    /// reading `deflate.window_bits` and the `limits.*` keys.
    pub fn create_decoder(options: &dyn OptionsSource) -> DeflateResult<Self> {
        let opts = read_decoder_options(options)?;
        let limits = DecoderLimits {
            max_output_bytes: opts.max_output_bytes,
            max_expansion_ratio: opts.max_expansion_ratio,
            max_memory_bytes: opts.max_memory_bytes,
            max_window_bytes: opts.max_window_bytes,
        };
        Ok(Codec::Decoder(Decoder::new(opts.window_bits, limits)?))
    }

    /// Spec §6 `create_encoder`: builds an encoder from an `OptionsSource`,
    /// reading `deflate.level`, `deflate.window_bits`, `deflate.strategy`, and
    /// `limits.max_memory_bytes`.
    pub fn create_encoder(options: &dyn OptionsSource) -> DeflateResult<Self> {
        let level = read_level(options)?;
        let window_bits = read_window_bits(options)?;
        let strategy = read_strategy(options);
        let max_memory_bytes = read_max_memory_bytes(options);
        Ok(Codec::Encoder(Encoder::new(level, window_bits, strategy, max_memory_bytes)?))
    }

    /// Spec §6 `update`. Returns `(bytes_in, bytes_out, status)`; `status`
    /// is `Status::Ok` on any non-fatal progress (including "needs more
    /// input/output"), matching the registry-facing contract instead of the
    /// richer Rust `Progress`/error type the underlying codec returns.
    pub fn update(&mut self, input: &[u8], output: &mut [u8]) -> (usize, usize, Status) {
        match self {
            Codec::Decoder(d) => match d.update(input, output) {
                Ok((used, written, _progress)) => (used, written, Status::Ok),
                Err(e) => {
                    warn!("decoder update failed: {e}");
                    (0, 0, e.status())
                }
            },
            Codec::Encoder(e) => match e.update(input, output) {
                Ok((used, written)) => (used, written, Status::Ok),
                Err(err) => {
                    warn!("encoder update failed: {err}");
                    (0, 0, err.status())
                }
            },
        }
    }

    /// Spec §6 `finish`. Per spec's note that `finish` returns `LIMIT` to
    /// mean "call me again with more output room" rather than a fatal
    /// resource-limit failure: that in-progress signal is carried here as
    /// `Status::ErrLimit` without marking the underlying codec failed, since
    /// the codec itself distinguishes the two with a dedicated progress
    /// enum rather than overloading its error type (see DESIGN.md).
    pub fn finish(&mut self, output: &mut [u8]) -> (usize, Status) {
        match self {
            Codec::Decoder(d) => match d.finish(output) {
                Ok((written, Progress::Done)) => (written, Status::Ok),
                Ok((written, Progress::NeedsMore)) => (written, Status::ErrLimit),
                Err(e) => {
                    warn!("decoder finish failed: {e}");
                    (0, e.status())
                }
            },
            Codec::Encoder(e) => match e.finish(output) {
                Ok((written, FinishProgress::Done)) => (written, Status::Ok),
                Ok((written, FinishProgress::CallAgain)) => (written, Status::ErrLimit),
                Err(err) => {
                    warn!("encoder finish failed: {err}");
                    (0, err.status())
                }
            },
        }
    }

    /// Spec §6 `get_error_detail`. Only decoders carry a detail slot today;
    /// encoder failures surface their message directly through `DeflateError`.
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Codec::Decoder(d) => d.error_detail(),
            Codec::Encoder(_) => None,
        }
    }

    /// Spec §4.4/§4.5 `reset`: returns the codec to its post-construction
    /// state for a fresh stream.
    pub fn reset(&mut self) {
        match self {
            Codec::Decoder(d) => d.reset(),
            Codec::Encoder(e) => e.reset(),
        }
    }
}

struct DecoderOptions {
    window_bits: u8,
    max_output_bytes: u64,
    max_expansion_ratio: f64,
    max_memory_bytes: u64,
    max_window_bytes: u64,
}

fn read_decoder_options(options: &dyn OptionsSource) -> DeflateResult<DecoderOptions> {
    Ok(DecoderOptions {
        window_bits: read_window_bits(options)?,
        max_output_bytes: options.get_uint("limits.max_output_bytes").unwrap_or(0),
        max_expansion_ratio: options.get_uint("limits.max_expansion_ratio").unwrap_or(0) as f64,
        max_memory_bytes: read_max_memory_bytes(options),
        max_window_bytes: options.get_uint("limits.max_window_bytes").unwrap_or(0),
    })
}

fn read_max_memory_bytes(options: &dyn OptionsSource) -> u64 {
    options.get_uint("limits.max_memory_bytes").unwrap_or(0)
}

fn read_level(options: &dyn OptionsSource) -> DeflateResult<u8> {
    let v = options.get_int("deflate.level").unwrap_or(6);
    if !(0..=9).contains(&v) {
        return Err(DeflateError::InvalidArgument("deflate.level out of range 0..9"));
    }
    Ok(v as u8)
}

fn read_window_bits(options: &dyn OptionsSource) -> DeflateResult<u8> {
    let v = options.get_uint("deflate.window_bits").unwrap_or(15);
    if !(8..=15).contains(&v) {
        return Err(DeflateError::InvalidArgument("deflate.window_bits out of range 8..15"));
    }
    Ok(v as u8)
}

fn read_strategy(options: &dyn OptionsSource) -> Strategy {
    Strategy::from_option_str(options.get_str("deflate.strategy").unwrap_or("default"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_roundtrips_through_status_api() {
        let enc_opts = DeflateOptions::new().with_level(6);
        let mut encoder = Codec::create_encoder(&enc_opts).unwrap();

        let data = b"hello hello hello world world world";
        let mut compressed = Vec::new();
        let mut buf = [0u8; 64];
        let (_, written, status) = encoder.update(data, &mut buf);
        assert_eq!(status, Status::Ok);
        compressed.extend_from_slice(&buf[..written]);
        loop {
            let (written, status) = encoder.finish(&mut buf);
            compressed.extend_from_slice(&buf[..written]);
            if status == Status::Ok {
                break;
            }
        }

        let dec_opts = DeflateOptions::new();
        let mut decoder = Codec::create_decoder(&dec_opts).unwrap();
        let mut out = Vec::new();
        let (_, written, status) = decoder.update(&compressed, &mut buf);
        assert_eq!(status, Status::Ok);
        out.extend_from_slice(&buf[..written]);
        loop {
            let (written, status) = decoder.finish(&mut buf);
            out.extend_from_slice(&buf[..written]);
            if status == Status::Ok {
                break;
            }
        }
        assert_eq!(out, data);
    }

    #[test]
    fn invalid_level_is_rejected_at_creation() {
        let opts = DeflateOptions::new().with_level(99);
        assert!(Codec::create_encoder(&opts).is_err());
    }
}
