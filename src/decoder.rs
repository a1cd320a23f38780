//! Resumable DEFLATE decoder (spec §4.4): a state machine whose `update` and
//! `finish` methods may be called repeatedly with arbitrarily small input
//! and output slices, picking back up exactly where the previous call left
//! off. Grounded in the teacher's `decode_blocks.rs`/`decompress_deflate.rs`
//! stage breakdown (header flags, dynamic header parsing, static/dynamic
//! block decode, uncompressed block copy); restructured from the teacher's
//! full-buffer `libdeflate_deflate_decompress` loop into discrete stages
//! that can suspend on either "need more input" or "need more output room".

use log::{trace, warn};

use crate::bitstream::{BitReader, InputCursor, OutputCursor};
use crate::constants::{
    DEFLATE_BLOCKTYPE_DYNAMIC_HUFFMAN, DEFLATE_BLOCKTYPE_RESERVED, DEFLATE_BLOCKTYPE_STATIC_HUFFMAN,
    DEFLATE_BLOCKTYPE_UNCOMPRESSED, DEFLATE_NUM_LITLEN_SYMS, DEFLATE_NUM_OFFSET_SYMS,
    DEFLATE_NUM_PRECODE_SYMS, DEFLATE_PRECODE_LENS_PERMUTATION, DIST_BASE_EXTRA, LENGTH_BASE_EXTRA,
};
use crate::error::{corrupt_at, incomplete_stream, limit_at, DeflateError, DeflateResult, ErrorDetail};
use crate::huffman::{DecodeTable, FastEntry, FAST_BITS};
use crate::window::Window;

/// Caller-tunable ceilings (spec §4.4 "Limits", §6 `limits.*` options); `0`
/// means "no limit" for every size-based field.
#[derive(Clone, Copy, Debug)]
pub struct DecoderLimits {
    pub max_output_bytes: u64,
    /// Maximum allowed `bytes_out / bytes_in` ratio, guarding against
    /// decompression bombs. `0.0` disables the check.
    pub max_expansion_ratio: f64,
    /// Construction-time ceiling on this decoder's total estimated heap
    /// footprint (spec §4.4 "the memory-tracking check applies at
    /// construction", §5 "a running memory total is compared against
    /// `max_memory_bytes` at init time"). `0` disables the check.
    pub max_memory_bytes: u64,
    /// Construction-time ceiling on the sliding window's allocated size in
    /// bytes (spec §6 `limits.max_window_bytes`). `0` disables the check.
    pub max_window_bytes: u64,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: 0,
            max_expansion_ratio: 0.0,
            max_memory_bytes: 0,
            max_window_bytes: 0,
        }
    }
}

/// Estimates the total heap footprint `Decoder::new` would commit to for a
/// window of `window_capacity` bytes: the struct itself, the sliding window
/// buffer, the two decode tables built eagerly (fixed tables at
/// construction, or the largest a dynamic block's litlen/distance tables
/// can grow to), and the dynamic header's worst-case code-length scratch
/// array. Computed *before* any allocation happens, so a budget violation
/// can be reported with nothing left to roll back (spec §5 "all allocations
/// are rolled back").
fn estimate_decoder_memory(window_capacity: usize) -> u64 {
    let fast_table_bytes = (1usize << FAST_BITS) * std::mem::size_of::<FastEntry>();
    let decode_tables_bytes = fast_table_bytes * 2;
    let scratch_bytes = DEFLATE_NUM_LITLEN_SYMS + DEFLATE_NUM_OFFSET_SYMS + DEFLATE_NUM_PRECODE_SYMS;
    (std::mem::size_of::<Decoder>() + window_capacity + decode_tables_bytes + scratch_bytes) as u64
}

/// What the caller should do next after a call to [`Decoder::update`] or
/// [`Decoder::finish`] returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The call made progress and stopped only because it ran out of input,
    /// output space, or both; supply more of whichever is empty and call
    /// again.
    NeedsMore,
    /// The final block's end-of-block symbol was consumed; decoding is
    /// complete and no previously-unconsumed input remains significant.
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    BlockHeader,
    StoredLen,
    StoredCopy,
    DynamicHeader,
    DynamicPrecodeLens,
    DynamicLitlenLens,
    HuffmanData,
    Done,
}

#[derive(Clone, Copy, Debug)]
enum SymbolState {
    AwaitingSymbol,
    PendingLiteral(u8),
    NeedLengthExtra { length_base: u16, extra_bits: u8 },
    NeedDistanceSymbol { length: u16 },
    NeedDistanceExtra { length: u16, dist_base: u16, extra_bits: u8 },
    Copying { distance: usize, remaining: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CodeLenSymbolState {
    AwaitingSymbol,
    NeedRepeatPrevExtra,
    NeedRepeatZeroShortExtra,
    NeedRepeatZeroLongExtra,
}

/// The streaming decoder. Every field that represents "where we were" is a
/// plain struct field, not a local variable, which is what makes `update`
/// resumable across arbitrarily small buffer boundaries.
pub struct Decoder {
    reader: BitReader,
    window: Window,
    stage: Stage,
    limits: DecoderLimits,
    error_detail: ErrorDetail,
    failed: Option<DeflateError>,

    is_final_block: bool,
    block_type: u32,

    stored_len: u16,
    stored_len_field: Option<u16>,

    num_litlen_syms: usize,
    num_offset_syms: usize,
    num_precode_lens_expected: usize,
    precode_lens: [u8; DEFLATE_NUM_PRECODE_SYMS],
    precode_index: usize,
    precode_table: Option<DecodeTable>,

    code_lens: Vec<u8>,
    code_len_index: usize,
    code_len_state: CodeLenSymbolState,

    litlen_table: Option<DecodeTable>,
    offset_table: Option<DecodeTable>,

    symbol_state: SymbolState,

    bytes_out: u64,
    bytes_in: u64,
}

impl Decoder {
    pub fn new(window_bits: u8, limits: DecoderLimits) -> DeflateResult<Self> {
        if !(8..=15).contains(&window_bits) {
            return Err(DeflateError::InvalidArgument("window_bits out of range 8..=15"));
        }
        let window_capacity = 1usize << window_bits;
        if limits.max_window_bytes != 0 && window_capacity as u64 > limits.max_window_bytes {
            return Err(DeflateError::Limit(format!(
                "window size {window_capacity} bytes exceeds configured limit {} bytes",
                limits.max_window_bytes
            )));
        }
        let estimated_bytes = estimate_decoder_memory(window_capacity);
        if limits.max_memory_bytes != 0 && estimated_bytes > limits.max_memory_bytes {
            return Err(DeflateError::Memory {
                requested: estimated_bytes as usize,
                budget: limits.max_memory_bytes as usize,
            });
        }
        Ok(Self {
            reader: BitReader::new(),
            window: Window::new(window_bits)?,
            stage: Stage::BlockHeader,
            limits,
            error_detail: ErrorDetail::default(),
            failed: None,
            is_final_block: false,
            block_type: 0,
            stored_len: 0,
            stored_len_field: None,
            num_litlen_syms: 0,
            num_offset_syms: 0,
            num_precode_lens_expected: 0,
            precode_lens: [0u8; DEFLATE_NUM_PRECODE_SYMS],
            precode_index: 0,
            precode_table: None,
            code_lens: Vec::new(),
            code_len_index: 0,
            code_len_state: CodeLenSymbolState::AwaitingSymbol,
            litlen_table: None,
            offset_table: None,
            symbol_state: SymbolState::AwaitingSymbol,
            bytes_out: 0,
            bytes_in: 0,
        })
    }

    /// Resets all decoder state to start a fresh stream, without
    /// reallocating the sliding window (spec §4.4 `reset`).
    pub fn reset(&mut self) {
        self.reader = BitReader::new();
        self.window.reset();
        self.stage = Stage::BlockHeader;
        self.error_detail.clear();
        self.failed = None;
        self.is_final_block = false;
        self.symbol_state = SymbolState::AwaitingSymbol;
        self.bytes_out = 0;
        self.bytes_in = 0;
        self.litlen_table = None;
        self.offset_table = None;
        self.precode_table = None;
        self.stored_len_field = None;
        self.code_len_index = 0;
        self.code_len_state = CodeLenSymbolState::AwaitingSymbol;
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_str()
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Feeds `input` and drains as much decoded output into `output` as
    /// fits, stopping when either is exhausted or the stream ends. Safe to
    /// call with empty slices (spec's zero-length streaming edge case).
    pub fn update(&mut self, input: &[u8], output: &mut [u8]) -> DeflateResult<(usize, usize, Progress)> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let mut in_cursor = InputCursor::new(input);
        let mut out_cursor = OutputCursor::new(output);
        let progress = self.run(&mut in_cursor, &mut out_cursor)?;
        Ok((in_cursor.consumed(), out_cursor.written(), progress))
    }

    /// Like `update`, but signals that no further input will ever arrive:
    /// an incomplete final block is reported as corrupt rather than as
    /// "needs more input" (spec §4.4 `finish`). A tiny output buffer is not
    /// itself an incomplete stream: if a pending match copy or buffered
    /// literal is still draining when output runs out, that's "call me
    /// again with more output room", not a truncated stream (spec's output
    /// buffer of size 1 or 2 during `finish` boundary behavior). Only a
    /// stall with output room still available — meaning no further input
    /// will ever satisfy the stage we're stuck in — is reported as corrupt.
    pub fn finish(&mut self, output: &mut [u8]) -> DeflateResult<(usize, Progress)> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let empty: [u8; 0] = [];
        let mut in_cursor = InputCursor::new(&empty);
        let mut out_cursor = OutputCursor::new(output);
        let progress = self.run(&mut in_cursor, &mut out_cursor)?;
        match progress {
            Progress::Done => Ok((out_cursor.written(), progress)),
            Progress::NeedsMore if out_cursor.remaining() == 0 => Ok((out_cursor.written(), progress)),
            Progress::NeedsMore => {
                let err = incomplete_stream("finish");
                self.error_detail.set(err.to_string());
                warn!("{err}");
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: DeflateError) -> DeflateError {
        self.error_detail.set(err.to_string());
        warn!("{err}");
        self.failed = Some(err.clone());
        err
    }

    fn check_limits(&mut self, stage: &str) -> DeflateResult<()> {
        if self.limits.max_output_bytes != 0 && self.bytes_out > self.limits.max_output_bytes {
            let err = limit_at(stage, self.bytes_out, self.limits.max_output_bytes);
            return Err(self.fail(err));
        }
        if self.limits.max_expansion_ratio > 0.0 && self.bytes_in > 0 {
            let ratio = self.bytes_out as f64 / self.bytes_in as f64;
            if ratio > self.limits.max_expansion_ratio {
                let err = DeflateError::Limit(format!(
                    "expansion ratio {ratio:.1} exceeds limit {:.1} at stage '{stage}'",
                    self.limits.max_expansion_ratio
                ));
                return Err(self.fail(err));
            }
        }
        Ok(())
    }

    fn run(&mut self, input: &mut InputCursor, output: &mut OutputCursor) -> DeflateResult<Progress> {
        loop {
            let before_in = input.consumed();
            match self.stage {
                Stage::Done => return Ok(Progress::Done),
                Stage::BlockHeader => {
                    if !self.read_block_header(input)? {
                        return Ok(Progress::NeedsMore);
                    }
                }
                Stage::StoredLen => {
                    if !self.read_stored_len(input)? {
                        return Ok(Progress::NeedsMore);
                    }
                }
                Stage::StoredCopy => {
                    if !self.run_stored_copy(input, output)? {
                        return Ok(Progress::NeedsMore);
                    }
                }
                Stage::DynamicHeader => {
                    if !self.read_dynamic_header(input)? {
                        return Ok(Progress::NeedsMore);
                    }
                }
                Stage::DynamicPrecodeLens => {
                    if !self.read_precode_lens(input)? {
                        return Ok(Progress::NeedsMore);
                    }
                }
                Stage::DynamicLitlenLens => {
                    if !self.read_litlen_lens(input)? {
                        return Ok(Progress::NeedsMore);
                    }
                }
                Stage::HuffmanData => {
                    match self.run_huffman_data(input, output)? {
                        HuffmanStep::NeedsMore => return Ok(Progress::NeedsMore),
                        HuffmanStep::BlockDone => {
                            trace!("end-of-block symbol consumed, final={}", self.is_final_block);
                            self.stage = if self.is_final_block {
                                Stage::Done
                            } else {
                                Stage::BlockHeader
                            };
                        }
                    }
                }
            }
            self.bytes_in += (input.consumed() - before_in) as u64;
            if self.stage == Stage::Done {
                return Ok(Progress::Done);
            }
        }
    }

    fn read_block_header(&mut self, input: &mut InputCursor) -> DeflateResult<bool> {
        let bfinal = match self.reader.read_bits(input, 1) {
            Some(v) => v,
            None => return Ok(false),
        };
        let btype = match self.reader.read_bits(input, 2) {
            Some(v) => v,
            None => return Ok(false),
        };
        self.is_final_block = bfinal != 0;
        self.block_type = btype;
        trace!("block header: final={} type={}", self.is_final_block, btype);

        match btype {
            DEFLATE_BLOCKTYPE_UNCOMPRESSED => {
                self.stage = Stage::StoredLen;
            }
            DEFLATE_BLOCKTYPE_STATIC_HUFFMAN => {
                self.load_static_tables()?;
                self.symbol_state = SymbolState::AwaitingSymbol;
                self.stage = Stage::HuffmanData;
            }
            DEFLATE_BLOCKTYPE_DYNAMIC_HUFFMAN => {
                self.stage = Stage::DynamicHeader;
            }
            DEFLATE_BLOCKTYPE_RESERVED => {
                return Err(self.fail(corrupt_at("block-header", self.bytes_out)));
            }
            _ => unreachable!("2-bit field"),
        }
        Ok(true)
    }

    fn load_static_tables(&mut self) -> DeflateResult<()> {
        let litlen_lengths = crate::constants::fixed_litlen_lengths();
        let dist_lengths = crate::constants::fixed_dist_lengths();
        self.litlen_table = Some(DecodeTable::build(&litlen_lengths)?);
        self.offset_table = Some(DecodeTable::build(&dist_lengths)?);
        Ok(())
    }

    fn read_stored_len(&mut self, input: &mut InputCursor) -> DeflateResult<bool> {
        self.reader.align_to_byte();
        // LEN and NLEN are two byte-aligned 16-bit fields. Read them as two
        // separate bit-reads, stashing LEN in `stored_len_field` once read
        // so a later call that runs out of input before NLEN arrives
        // doesn't need to (and can't) re-read LEN.
        if self.stored_len_field.is_none() {
            let len = match self.reader.read_bits(input, 16) {
                Some(v) => v as u16,
                None => return Ok(false),
            };
            self.stored_len_field = Some(len);
        }
        let nlen = match self.reader.read_bits(input, 16) {
            Some(v) => v as u16,
            None => return Ok(false),
        };
        let len = self.stored_len_field.take().unwrap();
        if len != !nlen {
            return Err(self.fail(corrupt_at("stored-block-len", self.bytes_out)));
        }
        self.stored_len = len;
        self.stage = Stage::StoredCopy;
        Ok(true)
    }

    fn run_stored_copy(&mut self, input: &mut InputCursor, output: &mut OutputCursor) -> DeflateResult<bool> {
        debug_assert!(self.reader.bits_available() % 8 == 0);
        while self.stored_len > 0 {
            if output.remaining() == 0 {
                return Ok(false);
            }
            let chunk = (self.stored_len as usize).min(output.remaining());
            let mut buf = vec![0u8; chunk];
            // Stored bytes may already be buffered in the bit reader (up to
            // a few bytes of refill lookahead) or still sit in `input`;
            // reading one byte at a time through `read_bits` handles both
            // uniformly without needing a separate byte-aligned fast path.
            let mut copied = 0usize;
            while copied < chunk {
                match self.reader.read_bits(input, 8) {
                    Some(byte) => {
                        buf[copied] = byte as u8;
                        copied += 1;
                    }
                    None => break,
                }
            }
            if copied == 0 {
                return Ok(false);
            }
            self.window.push_bytes(&buf[..copied], output);
            self.bytes_out += copied as u64;
            self.check_limits("stored-copy")?;
            self.stored_len -= copied as u16;
            if copied < chunk {
                return Ok(false);
            }
        }
        self.stage = Stage::BlockHeader;
        Ok(true)
    }

    fn read_dynamic_header(&mut self, input: &mut InputCursor) -> DeflateResult<bool> {
        let hlit = match self.reader.read_bits(input, 5) {
            Some(v) => v,
            None => return Ok(false),
        };
        let hdist = match self.reader.read_bits(input, 5) {
            Some(v) => v,
            None => return Ok(false),
        };
        let hclen = match self.reader.read_bits(input, 4) {
            Some(v) => v,
            None => return Ok(false),
        };
        self.num_litlen_syms = hlit as usize + 257;
        self.num_offset_syms = hdist as usize + 1;
        self.num_precode_lens_expected = hclen as usize + 4;
        if self.num_litlen_syms > DEFLATE_NUM_LITLEN_SYMS || self.num_offset_syms > DEFLATE_NUM_OFFSET_SYMS {
            return Err(self.fail(corrupt_at("dynamic-header", self.bytes_out)));
        }
        self.precode_lens = [0u8; DEFLATE_NUM_PRECODE_SYMS];
        self.precode_index = 0;
        self.stage = Stage::DynamicPrecodeLens;
        Ok(true)
    }

    fn read_precode_lens(&mut self, input: &mut InputCursor) -> DeflateResult<bool> {
        while self.precode_index < self.num_precode_lens_expected {
            let len = match self.reader.read_bits(input, 3) {
                Some(v) => v as u8,
                None => return Ok(false),
            };
            let slot = DEFLATE_PRECODE_LENS_PERMUTATION[self.precode_index] as usize;
            self.precode_lens[slot] = len;
            self.precode_index += 1;
        }
        let table = DecodeTable::build(&self.precode_lens)
            .map_err(|_| corrupt_at("precode-table", self.bytes_out))
            .map_err(|e| self.fail(e))?;
        self.precode_table = Some(table);
        self.code_lens = vec![0u8; self.num_litlen_syms + self.num_offset_syms];
        self.code_len_index = 0;
        self.code_len_state = CodeLenSymbolState::AwaitingSymbol;
        self.stage = Stage::DynamicLitlenLens;
        Ok(true)
    }

    fn read_litlen_lens(&mut self, input: &mut InputCursor) -> DeflateResult<bool> {
        let total = self.code_lens.len();
        loop {
            if self.code_len_index >= total {
                break;
            }
            match self.code_len_state {
                CodeLenSymbolState::AwaitingSymbol => {
                    let table = self.precode_table.as_ref().unwrap();
                    let decoded = decode_symbol(&mut self.reader, input, table)
                        .map_err(|e| self.fail(e))?;
                    let (symbol, consumed) = match decoded {
                        Some(v) => v,
                        None => return Ok(false),
                    };
                    let _ = consumed;
                    match symbol {
                        0..=15 => {
                            self.code_lens[self.code_len_index] = symbol as u8;
                            self.code_len_index += 1;
                        }
                        16 => self.code_len_state = CodeLenSymbolState::NeedRepeatPrevExtra,
                        17 => self.code_len_state = CodeLenSymbolState::NeedRepeatZeroShortExtra,
                        18 => self.code_len_state = CodeLenSymbolState::NeedRepeatZeroLongExtra,
                        _ => return Err(self.fail(corrupt_at("precode-symbol", self.bytes_out))),
                    }
                }
                CodeLenSymbolState::NeedRepeatPrevExtra => {
                    if self.code_len_index == 0 {
                        return Err(self.fail(corrupt_at("precode-repeat-prev", self.bytes_out)));
                    }
                    let extra = match self.reader.read_bits(input, 2) {
                        Some(v) => v,
                        None => return Ok(false),
                    };
                    let repeat = 3 + extra as usize;
                    let prev = self.code_lens[self.code_len_index - 1];
                    if self.code_len_index + repeat > total {
                        return Err(self.fail(corrupt_at("precode-repeat-prev", self.bytes_out)));
                    }
                    for _ in 0..repeat {
                        self.code_lens[self.code_len_index] = prev;
                        self.code_len_index += 1;
                    }
                    self.code_len_state = CodeLenSymbolState::AwaitingSymbol;
                }
                CodeLenSymbolState::NeedRepeatZeroShortExtra => {
                    let extra = match self.reader.read_bits(input, 3) {
                        Some(v) => v,
                        None => return Ok(false),
                    };
                    let repeat = 3 + extra as usize;
                    if self.code_len_index + repeat > total {
                        return Err(self.fail(corrupt_at("precode-repeat-zero", self.bytes_out)));
                    }
                    self.code_len_index += repeat;
                    self.code_len_state = CodeLenSymbolState::AwaitingSymbol;
                }
                CodeLenSymbolState::NeedRepeatZeroLongExtra => {
                    let extra = match self.reader.read_bits(input, 7) {
                        Some(v) => v,
                        None => return Ok(false),
                    };
                    let repeat = 11 + extra as usize;
                    if self.code_len_index + repeat > total {
                        return Err(self.fail(corrupt_at("precode-repeat-zero", self.bytes_out)));
                    }
                    self.code_len_index += repeat;
                    self.code_len_state = CodeLenSymbolState::AwaitingSymbol;
                }
            }
        }

        let litlen_lens = &self.code_lens[..self.num_litlen_syms];
        let dist_lens = &self.code_lens[self.num_litlen_syms..];
        let litlen_table = DecodeTable::build(litlen_lens)
            .map_err(|_| corrupt_at("litlen-table", self.bytes_out))
            .map_err(|e| self.fail(e))?;
        let offset_table = if dist_lens.iter().all(|&l| l == 0) {
            // No distance codes used: a valid (if degenerate) all-literal
            // block. Build a table that can never be queried.
            DecodeTable::build(&[0u8; DEFLATE_NUM_OFFSET_SYMS]).map_err(|e| self.fail(e))?
        } else {
            DecodeTable::build(dist_lens)
                .map_err(|_| corrupt_at("offset-table", self.bytes_out))
                .map_err(|e| self.fail(e))?
        };
        self.litlen_table = Some(litlen_table);
        self.offset_table = Some(offset_table);
        self.symbol_state = SymbolState::AwaitingSymbol;
        self.stage = Stage::HuffmanData;
        Ok(true)
    }

    fn run_huffman_data(
        &mut self,
        input: &mut InputCursor,
        output: &mut OutputCursor,
    ) -> DeflateResult<HuffmanStep> {
        loop {
            match self.symbol_state {
                SymbolState::Copying { distance, remaining } => {
                    if output.remaining() == 0 {
                        return Ok(HuffmanStep::NeedsMore);
                    }
                    let chunk = remaining.min(output.remaining());
                    self.window
                        .copy_match(distance, chunk, output)
                        .map_err(|e| self.fail(e))?;
                    self.bytes_out += chunk as u64;
                    self.check_limits("huffman-data")?;
                    let left = remaining - chunk;
                    if left == 0 {
                        self.symbol_state = SymbolState::AwaitingSymbol;
                    } else {
                        self.symbol_state = SymbolState::Copying { distance, remaining: left };
                        return Ok(HuffmanStep::NeedsMore);
                    }
                }
                SymbolState::PendingLiteral(byte) => {
                    if output.remaining() == 0 {
                        return Ok(HuffmanStep::NeedsMore);
                    }
                    self.window.push_literal(byte, output);
                    self.bytes_out += 1;
                    self.check_limits("huffman-data")?;
                    self.symbol_state = SymbolState::AwaitingSymbol;
                }
                SymbolState::AwaitingSymbol => {
                    let table = self.litlen_table.as_ref().unwrap();
                    let decoded = decode_symbol(&mut self.reader, input, table)
                        .map_err(|e| self.fail(e))?;
                    let (symbol, _consumed) = match decoded {
                        Some(v) => v,
                        None => return Ok(HuffmanStep::NeedsMore),
                    };
                    if symbol < 256 {
                        self.symbol_state = SymbolState::PendingLiteral(symbol as u8);
                    } else if symbol == 256 {
                        self.symbol_state = SymbolState::AwaitingSymbol;
                        return Ok(HuffmanStep::BlockDone);
                    } else {
                        let idx = symbol as usize - 257;
                        if idx >= LENGTH_BASE_EXTRA.len() {
                            return Err(self.fail(corrupt_at("length-symbol", self.bytes_out)));
                        }
                        let (base, extra) = LENGTH_BASE_EXTRA[idx];
                        if extra == 0 {
                            self.symbol_state = SymbolState::NeedDistanceSymbol { length: base };
                        } else {
                            self.symbol_state = SymbolState::NeedLengthExtra {
                                length_base: base,
                                extra_bits: extra,
                            };
                        }
                    }
                }
                SymbolState::NeedLengthExtra { length_base, extra_bits } => {
                    let extra = match self.reader.read_bits(input, extra_bits as u32) {
                        Some(v) => v,
                        None => return Ok(HuffmanStep::NeedsMore),
                    };
                    let length = length_base + extra as u16;
                    self.symbol_state = SymbolState::NeedDistanceSymbol { length };
                }
                SymbolState::NeedDistanceSymbol { length } => {
                    let table = self.offset_table.as_ref().unwrap();
                    let decoded = decode_symbol(&mut self.reader, input, table)
                        .map_err(|e| self.fail(e))?;
                    let (symbol, _consumed) = match decoded {
                        Some(v) => v,
                        None => return Ok(HuffmanStep::NeedsMore),
                    };
                    let idx = symbol as usize;
                    if idx >= DIST_BASE_EXTRA.len() {
                        return Err(self.fail(corrupt_at("distance-symbol", self.bytes_out)));
                    }
                    let (base, extra_bits) = DIST_BASE_EXTRA[idx];
                    if extra_bits == 0 {
                        if !self.window.can_reference(base as usize) {
                            return Err(self.fail(corrupt_at("distance-symbol", self.bytes_out)));
                        }
                        self.symbol_state = SymbolState::Copying {
                            distance: base as usize,
                            remaining: length as usize,
                        };
                    } else {
                        self.symbol_state = SymbolState::NeedDistanceExtra {
                            length,
                            dist_base: base,
                            extra_bits,
                        };
                    }
                }
                SymbolState::NeedDistanceExtra { length, dist_base, extra_bits } => {
                    let extra = match self.reader.read_bits(input, extra_bits as u32) {
                        Some(v) => v,
                        None => return Ok(HuffmanStep::NeedsMore),
                    };
                    let distance = dist_base as usize + extra as usize;
                    if !self.window.can_reference(distance) {
                        return Err(self.fail(corrupt_at("distance-symbol", self.bytes_out)));
                    }
                    self.symbol_state = SymbolState::Copying {
                        distance,
                        remaining: length as usize,
                    };
                }
            }
        }
    }
}

enum HuffmanStep {
    NeedsMore,
    BlockDone,
}

/// Decodes one Huffman symbol using the two-level table (spec §4.3): peek
/// up to the table's maximum codeword length, resolve via the fast table,
/// falling back to the long table for codewords longer than `FAST_BITS`.
/// Returns `Ok(None)` if not enough input is currently buffered to resolve
/// a symbol with certainty — the caller must retry after more input
/// arrives, without having consumed anything.
fn decode_symbol(
    reader: &mut BitReader,
    input: &mut InputCursor,
    table: &DecodeTable,
) -> DeflateResult<Option<(u16, u8)>> {
    let max_len = table.max_length().max(1) as u32;
    let (bits, available) = reader.peek_bits(input, max_len);

    if let Some((symbol, len)) = table.lookup_fast(bits) {
        if available < len as u32 {
            return Ok(None);
        }
        reader.consume(len as u32);
        return Ok(Some((symbol, len)));
    }

    if available < max_len {
        return Ok(None);
    }
    match table.lookup_long(bits) {
        Some((symbol, len)) => {
            reader.consume(len as u32);
            Ok(Some((symbol, len)))
        }
        None => Err(DeflateError::Corrupt("invalid huffman codeword".to_string())),
    }
}
