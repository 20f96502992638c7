//! Streaming extraction of self-delimited FIX messages from arbitrarily
//! framed log files. The scanner is lenient: anything that is not a
//! complete `8=FIX … 10=DDD` span is treated as log noise and skipped;
//! only real I/O failures surface as errors.

mod context;
mod summary;

pub use context::{ContextParser, ContextRing};
pub use summary::ScanSummary;

use crate::error::{ScanError, ScanResult};
use crate::types::raw::FixRawMessage;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Field separator byte.
const SOH: u8 = 0x01;

/// Bytes of preceding log text kept for timestamp/direction extraction.
const CONTEXT_CAPACITY: usize = 4096;

/// Start marker of a candidate message.
const START_MARKER: &[u8] = b"8=FIX";

/// Which field terminators the scanner recognizes. All recognized
/// delimiters are normalized to SOH in emitted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterRules {
    pub soh: bool,
    pub pipe: bool,
    pub caret_a: bool,
}

impl Default for DelimiterRules {
    fn default() -> Self {
        Self {
            soh: true,
            pipe: true,
            caret_a: true,
        }
    }
}

impl DelimiterRules {
    /// Length of the recognized boundary starting at `pos`, if any.
    fn boundary_len(&self, buf: &[u8], pos: usize) -> Option<usize> {
        match buf.get(pos) {
            Some(&SOH) if self.soh => Some(1),
            Some(&b'|') if self.pipe => Some(1),
            Some(&b'^') if self.caret_a && buf.get(pos + 1) == Some(&b'A') => Some(2),
            _ => None,
        }
    }

    /// True when a recognized boundary ends exactly before `pos`.
    fn boundary_ends_at(&self, buf: &[u8], pos: usize) -> bool {
        if pos >= 1 {
            let b = buf[pos - 1];
            if (b == SOH && self.soh) || (b == b'|' && self.pipe) {
                return true;
            }
        }
        pos >= 2 && self.caret_a && buf[pos - 2] == b'^' && buf[pos - 1] == b'A'
    }
}

/// Scanner configuration. The defaults match typical gateway logs.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Read buffer size in bytes.
    pub chunk_size: usize,
    /// Hard cap on a single message; longer candidates are abandoned.
    pub max_message_length: usize,
    /// Recognized field terminators.
    pub delimiters: DelimiterRules,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            max_message_length: 4096,
            delimiters: DelimiterRules::default(),
        }
    }
}

/// Entry point for scanning files and readers.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Scan a file. The handle is released when the iterator is exhausted
    /// or dropped, whichever comes first.
    pub fn scan_file(&self, path: impl AsRef<Path>) -> ScanResult<MessageIter<File>> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(self.scan_reader(file, path.to_path_buf()))
    }

    /// Scan an arbitrary byte stream, attributing messages to `origin`.
    pub fn scan_reader<R: Read>(&self, reader: R, origin: PathBuf) -> MessageIter<R> {
        MessageIter {
            config: self.config.clone(),
            parser: ContextParser::new(),
            origin,
            reader: Some(reader),
            buf: Vec::with_capacity(self.config.chunk_size),
            window_offset: 0,
            context: ContextRing::new(CONTEXT_CAPACITY),
            eof: false,
            done: false,
        }
    }
}

/// Outcome of one terminator search over the current window.
enum TermSearch {
    /// Terminator found; `msg_end` is the index just past the checksum
    /// digits, `trailing` the length of the boundary that followed it.
    Found { msg_end: usize, trailing: usize },
    /// The window may still grow into a complete message.
    NeedMore,
    /// The candidate exceeded the length cap without terminating.
    Oversize,
    /// End of stream reached with no terminator.
    Unterminated,
}

/// Lazy, one-shot iterator over the messages of a single stream.
pub struct MessageIter<R: Read> {
    config: ScanConfig,
    parser: ContextParser,
    origin: PathBuf,
    reader: Option<R>,
    /// Unconsumed window; `buf[0]` sits at `window_offset` in the stream.
    buf: Vec<u8>,
    window_offset: u64,
    context: ContextRing,
    eof: bool,
    done: bool,
}

impl<R: Read> MessageIter<R> {
    /// Read one chunk; flips `eof` when the stream is drained.
    fn fill(&mut self) -> ScanResult<()> {
        let Some(reader) = self.reader.as_mut() else {
            self.eof = true;
            return Ok(());
        };
        let start = self.buf.len();
        self.buf.resize(start + self.config.chunk_size, 0);
        let n = match reader.read(&mut self.buf[start..]) {
            Ok(n) => n,
            Err(e) => {
                self.buf.truncate(start);
                return Err(ScanError::Io(e));
            }
        };
        self.buf.truncate(start + n);
        if n == 0 {
            self.eof = true;
            self.reader = None;
        }
        Ok(())
    }

    /// Drop `n` leading bytes into the context ring.
    fn consume_to_context(&mut self, n: usize) {
        self.context.extend(&self.buf[..n]);
        self.buf.drain(..n);
        self.window_offset += n as u64;
    }

    /// Drop `n` leading bytes without recording them as context.
    fn consume_silent(&mut self, n: usize) {
        self.buf.drain(..n);
        self.window_offset += n as u64;
    }

    fn finish(&mut self) {
        self.done = true;
        self.reader = None;
    }

    /// Search the window for a `10=DDD` terminator of the candidate that
    /// starts at `buf[0]`.
    fn find_terminator(&self) -> TermSearch {
        let buf = &self.buf;
        let rules = &self.config.delimiters;
        let cap = self.config.max_message_length;
        let mut need_more = false;

        let mut p = START_MARKER.len();
        while p + 3 <= buf.len() && p + 6 <= cap {
            if &buf[p..p + 3] != b"10=" || !rules.boundary_ends_at(buf, p) {
                p += 1;
                continue;
            }
            if p + 6 > buf.len() {
                // Digits may still arrive.
                need_more = true;
                break;
            }
            if !buf[p + 3..p + 6].iter().all(u8::is_ascii_digit) {
                p += 1;
                continue;
            }
            let msg_end = p + 6;
            if msg_end == buf.len() {
                if self.eof {
                    return TermSearch::Found { msg_end, trailing: 0 };
                }
                need_more = true;
                break;
            }
            if let Some(len) = rules.boundary_len(buf, msg_end) {
                return TermSearch::Found { msg_end, trailing: len };
            }
            match buf[msg_end] {
                b' ' | b'\t' | b']' | b')' | b'\n' | b'\r' => {
                    return TermSearch::Found { msg_end, trailing: 0 }
                }
                _ => {
                    p += 1;
                }
            }
        }

        if need_more && !self.eof {
            return TermSearch::NeedMore;
        }
        if self.buf.len() >= cap {
            return TermSearch::Oversize;
        }
        if self.eof {
            TermSearch::Unterminated
        } else {
            TermSearch::NeedMore
        }
    }

    /// Rewrite the candidate span with every recognized boundary replaced
    /// by a single SOH, ending with the terminator's SOH.
    fn normalize(&self, end: usize) -> Vec<u8> {
        let rules = &self.config.delimiters;
        let mut payload = Vec::with_capacity(end + 1);
        let mut pos = 0;
        while pos < end {
            if let Some(len) = rules.boundary_len(&self.buf, pos) {
                payload.push(SOH);
                pos += len;
            } else {
                payload.push(self.buf[pos]);
                pos += 1;
            }
        }
        if payload.last() != Some(&SOH) {
            payload.push(SOH);
        }
        payload
    }
}

impl<R: Read> Iterator for MessageIter<R> {
    type Item = ScanResult<FixRawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            // Locate the next candidate start.
            match find_subslice(&self.buf, START_MARKER) {
                Some(pos) => self.consume_to_context(pos),
                None => {
                    // Retain a partial marker that may complete next read.
                    let keep = self.buf.len().min(START_MARKER.len() - 1);
                    let discard = self.buf.len() - keep;
                    self.consume_to_context(discard);
                    if self.eof {
                        self.finish();
                        return None;
                    }
                    if let Err(e) = self.fill() {
                        self.finish();
                        return Some(Err(e));
                    }
                    continue;
                }
            }

            match self.find_terminator() {
                TermSearch::Found { msg_end, trailing } => {
                    let snapshot = self.context.snapshot();
                    let raw = FixRawMessage {
                        origin: self.origin.clone(),
                        offset: self.window_offset,
                        payload: self.normalize(msg_end),
                        timestamp: self.parser.timestamp(&snapshot),
                        direction: self.parser.direction(&snapshot),
                    };
                    self.consume_silent(msg_end + trailing);
                    return Some(Ok(raw));
                }
                TermSearch::NeedMore => {
                    if let Err(e) = self.fill() {
                        self.finish();
                        return Some(Err(e));
                    }
                }
                TermSearch::Oversize => {
                    debug!(
                        origin = %self.origin.display(),
                        offset = self.window_offset,
                        "Abandoning oversize message candidate"
                    );
                    // Step past the start marker and look for the next one.
                    self.consume_to_context(1);
                }
                TermSearch::Unterminated => {
                    debug!(
                        origin = %self.origin.display(),
                        offset = self.window_offset,
                        "Discarding unterminated trailing candidate"
                    );
                    self.finish();
                    return None;
                }
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
