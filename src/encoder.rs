//! Resumable DEFLATE encoder (spec §4.5): LZ77 hash-chain match finding over
//! a growing history buffer, canonical Huffman block construction, and an
//! `update`/`finish` contract mirroring the decoder's. The teacher crate is
//! decode-only, so this module has no direct teacher counterpart; it is
//! grounded in `huffman.rs` (itself grounded in
//! `ca1b91d5_sile-libflate__src-deflate-encode.rs` and
//! `8860ca92_aschampion-deflate-rs__src-lz77.rs`) for code construction, and
//! reuses this crate's own `bitstream`/`constants` modules so both sides of
//! the codec agree on wire format bit-for-bit.
//!
//! Unlike the decoder's [`crate::window::Window`] (a capacity-bounded
//! circular buffer indexed only by relative distance, since a decoder never
//! needs to look *ahead*), the match finder here needs to peek up to 258
//! bytes past the current position before committing to a literal or a
//! match. It therefore keeps its own flat, trimmed history buffer addressed
//! by absolute stream position instead of reusing `Window`; match distances
//! are still validated the same way (`1..=capacity`).

use log::trace;

use crate::bitstream::{BitWriter, OutOfSpace};
use crate::constants::{
    self, DEFLATE_NUM_LITLEN_SYMS, DEFLATE_NUM_OFFSET_SYMS, DEFLATE_NUM_PRECODE_SYMS,
    DEFLATE_PRECODE_LENS_PERMUTATION,
};
use crate::error::{DeflateError, DeflateResult};
use crate::huffman::{self, MAX_CODE_LEN};

const NONE: usize = usize::MAX;
const MAX_MATCH_LEN: usize = 258;
const MIN_MATCH_LEN: usize = 3;
const MAX_DISTANCE: usize = 32 * 1024;
const STORED_BLOCK_MAX: usize = 65_535;
const HASH_BITS: usize = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;

/// Encoder strategy (spec §4.5 "Levels and strategies").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Default,
    Filtered,
    HuffmanOnly,
    Rle,
    Fixed,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Default
    }
}

/// Parses one of the five option strings §6 documents; unknown values fall
/// back to `Default` per spec ("Unknown strings silently fall back").
impl Strategy {
    pub fn from_option_str(s: &str) -> Self {
        match s {
            "filtered" => Strategy::Filtered,
            "huffman_only" => Strategy::HuffmanOnly,
            "rle" => Strategy::Rle,
            "fixed" => Strategy::Fixed,
            _ => Strategy::Default,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockMode {
    Stored,
    Fixed,
    Dynamic,
}

#[derive(Clone, Copy, Debug)]
enum Symbol {
    Literal(u8),
    Match { length: u16, distance: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Accepting,
    Done,
}

/// What the caller should do next after [`Encoder::finish`] returns
/// successfully (spec §4.5 "`finish` protocol").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishProgress {
    /// Everything has been copied into the caller's output; the stream is
    /// complete.
    Done,
    /// The internal staging buffer still holds bytes the caller's output
    /// slice had no room for; call `finish` again with a fresh buffer.
    CallAgain,
}

/// The streaming encoder. See spec §3 "Encoder state (summary)".
pub struct Encoder {
    level: u8,
    strategy: Strategy,
    window_bits: u8,
    window_capacity: usize,
    max_chain: usize,
    lazy: bool,

    stage: Stage,
    failed: Option<DeflateError>,

    history: Vec<u8>,
    base_pos: usize,
    pos: usize,
    end_pos: usize,

    hash_head: Vec<usize>,
    hash_prev: Vec<usize>,
    hash_pos_stream: Vec<usize>,

    stored_pending: Vec<u8>,

    symbols: Vec<Symbol>,

    fixed_litlen_lengths: [u8; DEFLATE_NUM_LITLEN_SYMS],
    fixed_litlen_codes_rev: Vec<u16>,
    fixed_dist_codes_rev: Vec<u16>,

    bit_writer: BitWriter,
    staging: Vec<u8>,
    staging_consumed: usize,
    final_rendered: bool,

    total_in: u64,
    total_out: u64,
}

fn max_chain_for(level: u8, strategy: Strategy) -> usize {
    let band = match level {
        0..=3 => 0,
        4..=6 => 1,
        _ => 2,
    };
    match strategy {
        Strategy::Filtered => [16, 128, 256][band],
        _ => [4, 32, 128][band],
    }
}

/// Estimates the total heap footprint `Encoder::new` would commit to for a
/// window of `window_capacity` bytes: the struct itself, the history buffer
/// and the two hash-chain tables (each window-sized), plus the fixed-Huffman
/// code tables built eagerly at construction. Computed *before* any
/// allocation happens, mirroring the decoder's construction-time estimate
/// (spec §5 "all allocations are rolled back").
fn estimate_encoder_memory(window_capacity: usize) -> u64 {
    let hash_head_bytes = HASH_SIZE * std::mem::size_of::<usize>();
    let hash_chain_bytes = window_capacity * std::mem::size_of::<usize>() * 2;
    let fixed_code_bytes = (DEFLATE_NUM_LITLEN_SYMS + DEFLATE_NUM_OFFSET_SYMS) * std::mem::size_of::<u16>();
    (std::mem::size_of::<Encoder>() + window_capacity + hash_head_bytes + hash_chain_bytes + fixed_code_bytes) as u64
}

fn block_mode_for(level: u8, strategy: Strategy) -> BlockMode {
    if level == 0 {
        BlockMode::Stored
    } else if strategy == Strategy::Fixed {
        BlockMode::Fixed
    } else if level <= 3 {
        BlockMode::Fixed
    } else {
        BlockMode::Dynamic
    }
}

impl Encoder {
    pub fn new(
        level: u8,
        window_bits: u8,
        strategy: Strategy,
        max_memory_bytes: u64,
    ) -> DeflateResult<Self> {
        if level > 9 {
            return Err(DeflateError::InvalidArgument("level out of range 0..=9"));
        }
        if !(8..=15).contains(&window_bits) {
            return Err(DeflateError::InvalidArgument("window_bits out of range 8..=15"));
        }
        let window_capacity = 1usize << window_bits;
        let estimated_bytes = estimate_encoder_memory(window_capacity);
        if max_memory_bytes != 0 && estimated_bytes > max_memory_bytes {
            return Err(DeflateError::Memory {
                requested: estimated_bytes as usize,
                budget: max_memory_bytes as usize,
            });
        }
        let fixed_litlen_lengths = constants::fixed_litlen_lengths();
        let fixed_dist_lengths = constants::fixed_dist_lengths();
        let fixed_litlen_codes_rev = reversed_codes(&fixed_litlen_lengths)?;
        let fixed_dist_codes_rev = reversed_codes(&fixed_dist_lengths)?;

        Ok(Self {
            level,
            strategy,
            window_bits,
            window_capacity,
            max_chain: max_chain_for(level, strategy),
            lazy: strategy == Strategy::Filtered,
            stage: Stage::Accepting,
            failed: None,
            history: Vec::new(),
            base_pos: 0,
            pos: 0,
            end_pos: 0,
            hash_head: vec![NONE; HASH_SIZE],
            hash_prev: vec![NONE; window_capacity],
            hash_pos_stream: vec![0; window_capacity],
            stored_pending: Vec::new(),
            symbols: Vec::new(),
            fixed_litlen_lengths,
            fixed_litlen_codes_rev,
            fixed_dist_codes_rev,
            bit_writer: BitWriter::new(),
            staging: Vec::new(),
            staging_consumed: 0,
            final_rendered: false,
            total_in: 0,
            total_out: 0,
        })
    }

    /// Returns the encoder to the post-construction state for a fresh
    /// stream, keeping the precomputed fixed-Huffman tables (spec §4.5
    /// `reset`).
    pub fn reset(&mut self) {
        self.stage = Stage::Accepting;
        self.failed = None;
        self.history.clear();
        self.base_pos = 0;
        self.pos = 0;
        self.end_pos = 0;
        self.hash_head.iter_mut().for_each(|h| *h = NONE);
        self.hash_prev.iter_mut().for_each(|h| *h = NONE);
        self.stored_pending.clear();
        self.symbols.clear();
        self.bit_writer = BitWriter::new();
        self.staging.clear();
        self.staging_consumed = 0;
        self.final_rendered = false;
        self.total_in = 0;
        self.total_out = 0;
    }

    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    fn fail(&mut self, err: DeflateError) -> DeflateError {
        self.failed = Some(err.clone());
        err
    }

    /// Accepts more plaintext and/or drains more compressed bytes into
    /// `output`. Always consumes all of `input` (bounded memory is kept by
    /// flushing symbol/stored buffers well before they can grow unbounded);
    /// `output` may be any size, including empty or 1-byte (spec's chunked
    /// I/O requirement).
    pub fn update(&mut self, input: &[u8], output: &mut [u8]) -> DeflateResult<(usize, usize)> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.stage == Stage::Done {
            return Ok((0, self.drain_staging(output)));
        }
        self.history.extend_from_slice(input);
        self.end_pos += input.len();
        self.total_in += input.len() as u64;

        let result = if self.level == 0 {
            self.run_stored_accept()
        } else {
            self.run_lz77(false);
            self.flush_full_blocks()
        };
        if let Err(err) = result {
            return Err(self.fail(err));
        }
        self.trim_history();

        let written = self.drain_staging(output);
        Ok((input.len(), written))
    }

    /// Flushes everything buffered as a final block, then drains the
    /// internal staging buffer into `output` (spec §4.5 `finish` protocol:
    /// may be called repeatedly with small buffers until `Done`).
    pub fn finish(&mut self, output: &mut [u8]) -> DeflateResult<(usize, FinishProgress)> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if !self.final_rendered {
            let result = if self.level == 0 {
                self.render_stored_block(true)
            } else {
                self.run_lz77(true);
                self.render_symbol_block(true)
            };
            if let Err(err) = result {
                return Err(self.fail(err));
            }
            self.final_rendered = true;
            trace!("final block rendered, total_in={} total_out={}", self.total_in, self.total_out);
        }
        let written = self.drain_staging(output);
        if self.staging_consumed == self.staging.len() {
            self.stage = Stage::Done;
            Ok((written, FinishProgress::Done))
        } else {
            Ok((written, FinishProgress::CallAgain))
        }
    }

    fn drain_staging(&mut self, output: &mut [u8]) -> usize {
        let available = self.staging.len() - self.staging_consumed;
        let n = available.min(output.len());
        output[..n].copy_from_slice(&self.staging[self.staging_consumed..self.staging_consumed + n]);
        self.staging_consumed += n;
        self.total_out += n as u64;
        if self.staging_consumed == self.staging.len() && self.staging_consumed > 0 {
            self.staging.clear();
            self.staging_consumed = 0;
        } else if self.staging_consumed > 1 << 20 {
            self.staging.drain(0..self.staging_consumed);
            self.staging_consumed = 0;
        }
        n
    }

    fn trim_history(&mut self) {
        let keep_from = self.pos.saturating_sub(self.window_capacity);
        if keep_from > self.base_pos {
            let drop = keep_from - self.base_pos;
            self.history.drain(0..drop);
            self.base_pos += drop;
        }
    }

    // ---- level 0: stored blocks only ----

    fn run_stored_accept(&mut self) -> DeflateResult<()> {
        self.stored_pending.extend_from_slice(&self.history[self.pos - self.base_pos..]);
        self.pos = self.end_pos;
        while self.stored_pending.len() >= STORED_BLOCK_MAX {
            self.render_stored_block(false)?;
        }
        Ok(())
    }

    fn render_stored_block(&mut self, is_final: bool) -> DeflateResult<()> {
        loop {
            let chunk_len = self.stored_pending.len().min(STORED_BLOCK_MAX);
            let remaining_after = self.stored_pending.len() - chunk_len;
            let last = is_final && remaining_after == 0;
            self.write_bits(last as u32, 1)?;
            self.write_bits(0, 2)?;
            self.bit_writer
                .flush_to_byte(&mut self.staging)
                .map_err(|_| unreachable!("Vec sink never reports out of space"))?;
            let len = chunk_len as u16;
            for b in len.to_le_bytes() {
                self.staging.push(b);
            }
            for b in (!len).to_le_bytes() {
                self.staging.push(b);
            }
            self.staging.extend_from_slice(&self.stored_pending[..chunk_len]);
            self.stored_pending.drain(0..chunk_len);
            if last || remaining_after == 0 {
                trace!("stored block emitted: {} bytes, final={}", chunk_len, last);
                return Ok(());
            }
        }
    }

    // ---- levels 1..9: LZ77 + Huffman ----

    fn hash_at(&self, abs_pos: usize) -> usize {
        let base = abs_pos - self.base_pos;
        let mut h: u32 = 0;
        for k in 0..3 {
            h = ((h << 5) ^ (h >> 10) ^ self.history[base + k] as u32) & 0x7FFF;
        }
        h as usize
    }

    fn insert(&mut self, abs_pos: usize) {
        if self.end_pos - abs_pos < 3 {
            return;
        }
        let idx = abs_pos % self.window_capacity;
        let h = self.hash_at(abs_pos);
        self.hash_prev[idx] = self.hash_head[h];
        self.hash_pos_stream[idx] = abs_pos;
        self.hash_head[h] = idx;
    }

    /// Walks the hash chain at `abs_pos` (spec §4.5 "LZ77 match finding"),
    /// skipping any entry whose recorded insertion position doesn't match
    /// the buffer-distance arithmetic (a wrapped-over, stale slot).
    fn find_match(&self, abs_pos: usize) -> Option<(usize, usize)> {
        let avail = (self.end_pos - abs_pos).min(MAX_MATCH_LEN);
        if avail < MIN_MATCH_LEN {
            return None;
        }
        let h = self.hash_at(abs_pos);
        let current_idx = abs_pos % self.window_capacity;
        let mut idx = self.hash_head[h];
        let mut chain = 0usize;
        let mut best_len = 0usize;
        let mut best_dist = 0usize;
        let capacity = self.window_capacity;
        let max_dist = capacity.min(MAX_DISTANCE);

        while idx != NONE && chain < self.max_chain {
            let stored_pos = self.hash_pos_stream[idx];
            if stored_pos >= abs_pos {
                break;
            }
            let stream_dist = abs_pos - stored_pos;
            let buf_dist = (current_idx + capacity - idx) % capacity;
            if stream_dist != buf_dist {
                break;
            }
            if stream_dist > max_dist {
                break;
            }
            if stored_pos >= self.base_pos {
                let cand_base = stored_pos - self.base_pos;
                let cur_base = abs_pos - self.base_pos;
                let mut len = 0usize;
                while len < avail && self.history[cand_base + len] == self.history[cur_base + len] {
                    len += 1;
                }
                if len > best_len {
                    best_len = len;
                    best_dist = stream_dist;
                }
            }
            idx = self.hash_prev[idx];
            chain += 1;
        }

        if best_len >= MIN_MATCH_LEN {
            Some((best_len, best_dist))
        } else {
            None
        }
    }

    fn push_literal(&mut self, byte: u8) {
        self.symbols.push(Symbol::Literal(byte));
    }

    fn push_match(&mut self, length: usize, distance: usize) {
        self.symbols.push(Symbol::Match {
            length: length as u16,
            distance: distance as u16,
        });
    }

    /// Consumes as much of the accepted input as the chosen strategy allows
    /// into buffered symbols. `final_pass` is true only from `finish`: it
    /// processes all the way to `end_pos` instead of leaving a lookahead
    /// margin for a possible lazy-match peek.
    fn run_lz77(&mut self, final_pass: bool) {
        match self.strategy {
            Strategy::HuffmanOnly => self.run_huffman_only(),
            Strategy::Rle => self.run_rle(),
            _ => self.run_hash_chain(final_pass),
        }
    }

    fn run_huffman_only(&mut self) {
        while self.pos < self.end_pos {
            let byte = self.history[self.pos - self.base_pos];
            self.push_literal(byte);
            self.pos += 1;
        }
    }

    fn run_rle(&mut self) {
        while self.pos < self.end_pos {
            let base = self.pos - self.base_pos;
            let avail = self.end_pos - self.pos;
            if self.pos >= 1 && avail >= MIN_MATCH_LEN {
                let prev_byte = self.history[base - 1];
                let max_run = avail.min(MAX_MATCH_LEN);
                let mut run = 0usize;
                while run < max_run && self.history[base + run] == prev_byte {
                    run += 1;
                }
                if run >= MIN_MATCH_LEN {
                    self.push_match(run, 1);
                    self.pos += run;
                    continue;
                }
            }
            self.push_literal(self.history[base]);
            self.pos += 1;
        }
    }

    fn run_hash_chain(&mut self, final_pass: bool) {
        let margin = if self.lazy && !final_pass { 2 } else { 1 };
        while self.pos + margin <= self.end_pos || (final_pass && self.pos < self.end_pos) {
            if self.pos >= self.end_pos {
                break;
            }
            let pos = self.pos;
            let candidate = self.find_match(pos);

            if self.lazy {
                if let Some((len, dist)) = candidate {
                    let have_next = self.end_pos - (pos + 1) >= MIN_MATCH_LEN;
                    if len < 32 && have_next {
                        self.insert(pos);
                        let next = self.find_match(pos + 1);
                        if matches!(next, Some((next_len, _)) if next_len >= len + 2) {
                            self.push_literal(self.history[pos - self.base_pos]);
                            self.pos += 1;
                            continue;
                        }
                        self.commit_match(pos, len, dist, 1);
                        continue;
                    }
                }
            }

            match candidate {
                Some((len, dist)) => self.commit_match(pos, len, dist, 0),
                None => {
                    self.insert(pos);
                    self.push_literal(self.history[pos - self.base_pos]);
                    self.pos += 1;
                }
            }
        }
    }

    /// Commits a chosen match: buffers the symbol, inserts every covered
    /// position into the hash chain so future matches can reference it, and
    /// advances `pos`. `already_inserted` accounts for a position the lazy
    /// peek already inserted before the match was chosen.
    fn commit_match(&mut self, pos: usize, len: usize, dist: usize, already_inserted: usize) {
        self.push_match(len, dist);
        for k in already_inserted..len {
            self.insert(pos + k);
        }
        self.pos += len;
    }

    fn flush_full_blocks(&mut self) -> DeflateResult<()> {
        while self.symbols.len() >= self.window_capacity {
            self.render_symbol_block(false)?;
        }
        Ok(())
    }

    fn write_bits(&mut self, value: u32, n: u32) -> DeflateResult<()> {
        self.bit_writer
            .write_bits(value, n, &mut self.staging)
            .map_err(|OutOfSpace| DeflateError::Internal("staging buffer rejected a write"))
    }

    fn render_symbol_block(&mut self, is_final: bool) -> DeflateResult<()> {
        let mode = block_mode_for(self.level, self.strategy);
        let block_symbols: Vec<Symbol> = if self.symbols.len() <= self.window_capacity {
            std::mem::take(&mut self.symbols)
        } else {
            self.symbols.drain(..self.window_capacity).collect()
        };
        let mut block_lit_freq = [0u32; DEFLATE_NUM_LITLEN_SYMS];
        let mut block_dist_freq = [0u32; DEFLATE_NUM_OFFSET_SYMS];
        for s in &block_symbols {
            match s {
                Symbol::Literal(b) => block_lit_freq[*b as usize] += 1,
                Symbol::Match { length, distance } => {
                    let (lsym, _, _) = constants::length_to_symbol(*length);
                    block_lit_freq[lsym as usize] += 1;
                    let (dsym, _, _) = constants::distance_to_symbol(*distance);
                    block_dist_freq[dsym as usize] += 1;
                }
            }
        }

        self.write_bits(is_final as u32, 1)?;
        match mode {
            BlockMode::Stored => unreachable!("level 0 never reaches render_symbol_block"),
            BlockMode::Fixed => {
                self.write_bits(1, 2)?;
                self.write_symbols_fixed(&block_symbols)?;
            }
            BlockMode::Dynamic => {
                self.write_bits(2, 2)?;
                self.write_symbols_dynamic(&block_symbols, block_lit_freq, block_dist_freq)?;
            }
        }
        if is_final {
            self.bit_writer
                .flush_to_byte(&mut self.staging)
                .map_err(|OutOfSpace| DeflateError::Internal("staging buffer rejected a flush"))?;
        }
        trace!(
            "{:?} block emitted: {} symbols, final={}",
            mode,
            block_symbols.len(),
            is_final
        );
        Ok(())
    }

    fn write_symbols_fixed(&mut self, symbols: &[Symbol]) -> DeflateResult<()> {
        for s in symbols {
            self.write_symbol_fixed(*s)?;
        }
        self.write_bits(
            self.fixed_litlen_codes_rev[256] as u32,
            self.fixed_litlen_lengths[256] as u32,
        )
    }

    fn write_symbol_fixed(&mut self, symbol: Symbol) -> DeflateResult<()> {
        match symbol {
            Symbol::Literal(b) => {
                self.write_bits(
                    self.fixed_litlen_codes_rev[b as usize] as u32,
                    self.fixed_litlen_lengths[b as usize] as u32,
                )?;
            }
            Symbol::Match { length, distance } => {
                let (lsym, lextra_bits, lextra_val) = constants::length_to_symbol(length);
                self.write_bits(
                    self.fixed_litlen_codes_rev[lsym as usize] as u32,
                    self.fixed_litlen_lengths[lsym as usize] as u32,
                )?;
                if lextra_bits > 0 {
                    self.write_bits(lextra_val as u32, lextra_bits as u32)?;
                }
                let (dsym, dextra_bits, dextra_val) = constants::distance_to_symbol(distance);
                self.write_bits(self.fixed_dist_codes_rev[dsym as usize] as u32, 5)?;
                if dextra_bits > 0 {
                    self.write_bits(dextra_val as u32, dextra_bits as u32)?;
                }
            }
        }
        Ok(())
    }

    /// Builds and emits one dynamic-Huffman block (spec §4.5 steps 1-9).
    fn write_symbols_dynamic(
        &mut self,
        symbols: &[Symbol],
        mut lit_freq: [u32; DEFLATE_NUM_LITLEN_SYMS],
        dist_freq: [u32; DEFLATE_NUM_OFFSET_SYMS],
    ) -> DeflateResult<()> {
        lit_freq[256] += 1;

        let mut lit_lengths = huffman::build_code_lengths(&lit_freq, MAX_CODE_LEN);
        if lit_lengths[256] == 0 {
            lit_lengths[256] = 1;
        }
        let mut dist_lengths = huffman::build_code_lengths(&dist_freq, MAX_CODE_LEN);
        if dist_lengths.iter().all(|&l| l == 0) {
            dist_lengths[0] = 1;
        }

        let num_litlen = (lit_lengths.iter().rposition(|&l| l > 0).unwrap_or(256) + 1).max(257);
        let num_dist = (dist_lengths.iter().rposition(|&l| l > 0).unwrap_or(0) + 1).max(1);
        let hlit = num_litlen - 257;
        let hdist = num_dist - 1;

        let mut ordered_lengths = Vec::with_capacity(num_litlen + num_dist);
        ordered_lengths.extend_from_slice(&lit_lengths[..num_litlen]);
        ordered_lengths.extend_from_slice(&dist_lengths[..num_dist]);

        let rle = rle_encode_lengths(&ordered_lengths);
        let mut cl_freq = [0u32; DEFLATE_NUM_PRECODE_SYMS];
        for &(sym, _, _) in &rle {
            cl_freq[sym as usize] += 1;
        }
        let mut cl_lengths = huffman::build_code_lengths(&cl_freq, 7);
        fixup_precode_completeness(&mut cl_lengths);

        let mut precode_lens_in_order = [0u8; DEFLATE_NUM_PRECODE_SYMS];
        for (i, &sym) in DEFLATE_PRECODE_LENS_PERMUTATION.iter().enumerate() {
            precode_lens_in_order[i] = cl_lengths[sym as usize];
        }
        let hclen = huffman::trim_precode_lengths(&precode_lens_in_order);

        self.write_bits(hlit as u32, 5)?;
        self.write_bits(hdist as u32, 5)?;
        self.write_bits((hclen - 4) as u32, 4)?;
        for &len in &precode_lens_in_order[..hclen] {
            self.write_bits(len as u32, 3)?;
        }

        let cl_codes_rev = reversed_codes(&cl_lengths)?;
        for &(sym, extra_bits, extra_val) in &rle {
            self.write_bits(cl_codes_rev[sym as usize] as u32, cl_lengths[sym as usize] as u32)?;
            if extra_bits > 0 {
                self.write_bits(extra_val as u32, extra_bits as u32)?;
            }
        }

        let lit_codes_rev = reversed_codes(&lit_lengths)?;
        let dist_codes_rev = reversed_codes(&dist_lengths)?;
        for s in symbols {
            match *s {
                Symbol::Literal(b) => {
                    self.write_bits(lit_codes_rev[b as usize] as u32, lit_lengths[b as usize] as u32)?;
                }
                Symbol::Match { length, distance } => {
                    let (lsym, lextra_bits, lextra_val) = constants::length_to_symbol(length);
                    self.write_bits(
                        lit_codes_rev[lsym as usize] as u32,
                        lit_lengths[lsym as usize] as u32,
                    )?;
                    if lextra_bits > 0 {
                        self.write_bits(lextra_val as u32, lextra_bits as u32)?;
                    }
                    let (dsym, dextra_bits, dextra_val) = constants::distance_to_symbol(distance);
                    self.write_bits(
                        dist_codes_rev[dsym as usize] as u32,
                        dist_lengths[dsym as usize] as u32,
                    )?;
                    if dextra_bits > 0 {
                        self.write_bits(dextra_val as u32, dextra_bits as u32)?;
                    }
                }
            }
        }
        self.write_bits(lit_codes_rev[256] as u32, lit_lengths[256] as u32)
    }
}

/// Assigns canonical codes then bit-reverses each to transmit form (spec
/// §4.5 "Bit reversal of emitted codes", §9).
fn reversed_codes(lengths: &[u8]) -> DeflateResult<Vec<u16>> {
    let codes = huffman::assign_canonical_codes(lengths)?;
    Ok(codes
        .iter()
        .zip(lengths.iter())
        .map(|(&code, &len)| crate::bitstream::reverse_bits(code, len))
        .collect())
}

/// Run-length encodes a literal/length + distance code-length sequence
/// using the code-length alphabet (spec §4.5 step 6): symbols 16/17/18
/// repeat a previous or zero length, 0..15 encode themselves.
fn rle_encode_lengths(lengths: &[u8]) -> Vec<(u16, u8, u16)> {
    let mut out = Vec::new();
    let n = lengths.len();
    let mut i = 0usize;
    while i < n {
        let len = lengths[i];
        if len == 0 {
            let mut run = 1usize;
            while i + run < n && lengths[i + run] == 0 && run < 138 {
                run += 1;
            }
            if run < 3 {
                for _ in 0..run {
                    out.push((0, 0, 0));
                }
            } else if run <= 10 {
                out.push((17, 3, (run - 3) as u16));
            } else {
                out.push((18, 7, (run - 11) as u16));
            }
            i += run;
        } else {
            out.push((len as u16, 0, 0));
            i += 1;
            let mut run = 0usize;
            while i + run < n && lengths[i + run] == len && run < 6 {
                run += 1;
            }
            if run >= 3 {
                out.push((16, 2, (run - 3) as u16));
                i += run;
            }
        }
    }
    out
}

/// Pads the code-length alphabet's own lengths until its Kraft sum equals
/// `2^7` (spec §4.5 step 7, §9 "Code-length alphabet completeness for
/// interop"): some widely deployed decoders reject an incomplete tree for
/// this particular alphabet even though RFC 1951 permits it.
fn fixup_precode_completeness(cl_lengths: &mut [u8]) {
    let kraft = |lens: &[u8]| -> u32 {
        lens.iter().map(|&l| if l > 0 { 1u32 << (7 - l) } else { 0 }).sum()
    };
    let mut sum = kraft(cl_lengths);
    if sum >= 128 {
        return;
    }
    for &sym in DEFLATE_PRECODE_LENS_PERMUTATION.iter().rev() {
        if sum >= 128 {
            break;
        }
        if cl_lengths[sym as usize] == 0 {
            cl_lengths[sym as usize] = 7;
            sum += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, DecoderLimits};

    fn roundtrip(data: &[u8], level: u8, strategy: Strategy) -> Vec<u8> {
        let mut enc = Encoder::new(level, 15, strategy, 0).unwrap();
        let mut compressed = Vec::new();
        let mut buf = [0u8; 37];
        let (consumed, written) = enc.update(data, &mut buf).unwrap();
        assert_eq!(consumed, data.len());
        compressed.extend_from_slice(&buf[..written]);
        loop {
            let (written, progress) = enc.finish(&mut buf).unwrap();
            compressed.extend_from_slice(&buf[..written]);
            if progress == FinishProgress::Done {
                break;
            }
        }

        let mut dec = Decoder::new(15, DecoderLimits::default()).unwrap();
        let mut out = Vec::new();
        let mut pos = 0;
        let mut outbuf = [0u8; 5];
        loop {
            let (used, written, progress) = dec.update(&compressed[pos..], &mut outbuf).unwrap();
            pos += used;
            out.extend_from_slice(&outbuf[..written]);
            if progress == crate::decoder::Progress::Done {
                break;
            }
            if used == 0 && written == 0 && pos >= compressed.len() {
                break;
            }
        }
        loop {
            match dec.finish(&mut outbuf) {
                Ok((written, progress)) => {
                    out.extend_from_slice(&outbuf[..written]);
                    if progress == crate::decoder::Progress::Done {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        out
    }

    #[test]
    fn empty_input_roundtrips_at_every_level() {
        for level in 0..=9u8 {
            let out = roundtrip(b"", level, Strategy::Default);
            assert_eq!(out, b"");
        }
    }

    #[test]
    fn single_byte_roundtrips() {
        for level in 0..=9u8 {
            let out = roundtrip(b"Q", level, Strategy::Default);
            assert_eq!(out, b"Q");
        }
    }

    #[test]
    fn repeated_text_roundtrips_all_strategies() {
        let data = b"abababababababababababababababababababab".repeat(4);
        for strategy in [
            Strategy::Default,
            Strategy::Filtered,
            Strategy::HuffmanOnly,
            Strategy::Rle,
            Strategy::Fixed,
        ] {
            let out = roundtrip(&data, 6, strategy);
            assert_eq!(out, data);
        }
    }

    #[test]
    fn rle_strategy_compresses_repeated_byte_well() {
        let data = vec![0x42u8; 5000];
        let mut enc = Encoder::new(6, 15, Strategy::Rle, 0).unwrap();
        let mut compressed = Vec::new();
        let mut buf = [0u8; 4096];
        let (_, written) = enc.update(&data, &mut buf).unwrap();
        compressed.extend_from_slice(&buf[..written]);
        loop {
            let (written, progress) = enc.finish(&mut buf).unwrap();
            compressed.extend_from_slice(&buf[..written]);
            if progress == FinishProgress::Done {
                break;
            }
        }
        assert!(compressed.len() < 100, "expected tiny output, got {}", compressed.len());
    }

    #[test]
    fn dynamic_huffman_roundtrips_longer_text() {
        let data = b"The quick brown fox jumps over the lazy dog. Pack my box with \
five dozen liquor jugs. How vexingly quick daft zebras jump!"
            .repeat(20);
        for level in [4, 6, 9] {
            let out = roundtrip(&data, level, Strategy::Default);
            assert_eq!(out, data);
        }
    }

    #[test]
    fn small_sizes_roundtrip_across_levels_and_strategies() {
        let strategies = [
            Strategy::Default,
            Strategy::Filtered,
            Strategy::HuffmanOnly,
            Strategy::Rle,
            Strategy::Fixed,
        ];
        for size in 0..=16usize {
            let data: Vec<u8> = (0..size).map(|i| (i * 37 % 256) as u8).collect();
            for level in 0..=9u8 {
                for &strategy in &strategies {
                    let out = roundtrip(&data, level, strategy);
                    assert_eq!(out, data, "level={level} strategy={strategy:?} size={size}");
                }
            }
        }
    }
}
