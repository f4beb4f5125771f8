//! Incremental gzip container decoding
//!
//! [`StreamInflater`] accepts a compressed object as a sequence of arbitrarily
//! sized chunks and forwards decompressed bytes to a [`ByteSink`] as soon as the
//! deflate decoder produces them. Chunk boundaries may fall anywhere, including
//! inside the variable-length container header.
//!
//! ## States
//!
//! - `AwaitingHeader`: chunks accumulate until the full header length is known.
//!   Not having enough bytes yet is the normal steady state, never an error.
//!   The signature and flags byte are checked as soon as they arrive.
//! - `StreamingPayload`: the header was validated and dropped; every chunk goes
//!   straight into the raw deflate decoder.
//! - `Drained`: the deflate stream signalled its end. The 8-byte gzip trailer
//!   and anything after it is ignored.

use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;
use tracing::debug;

/// `ID1 ID2 CM` for gzip with the deflate method
pub const GZIP_SIGNATURE: [u8; 3] = [0x1f, 0x8b, 0x08];

const FIXED_HEADER_LEN: usize = 10;
const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;
const FLAG_RESERVED: u8 = 0xe0;

const OUTPUT_CHUNK_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum InflateError {
    #[error("invalid gzip signature: {0:02x?}")]
    BadSignature([u8; 3]),

    #[error("reserved gzip header flags set: {0:#04x}")]
    ReservedFlags(u8),

    #[error("stream ended before a complete gzip header ({buffered} bytes buffered)")]
    TruncatedHeader { buffered: usize },

    #[error("deflate payload ended before its final block")]
    TruncatedPayload,

    #[error("deflate error: {0}")]
    Decompress(#[from] flate2::DecompressError),

    #[error("inflater already closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, InflateError>;

/// Downstream consumer of decompressed bytes
pub trait ByteSink {
    fn feed(&mut self, data: &[u8]);

    /// End of stream; no more `feed` calls follow
    fn close(&mut self);
}

impl ByteSink for Vec<u8> {
    fn feed(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }

    fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflatePhase {
    AwaitingHeader,
    StreamingPayload,
    Drained,
}

enum HeaderScan {
    Incomplete,
    Complete(usize),
}

/// Deflate context, created once per inflater
struct Payload {
    decoder: Decompress,
    ended: bool,
}

pub struct StreamInflater<S> {
    sink: S,
    pending: Vec<u8>,
    payload: Option<Payload>,
    closed: bool,
}

impl<S: ByteSink> StreamInflater<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            payload: None,
            closed: false,
        }
    }

    pub fn phase(&self) -> InflatePhase {
        match &self.payload {
            None => InflatePhase::AwaitingHeader,
            Some(payload) if payload.ended => InflatePhase::Drained,
            Some(_) => InflatePhase::StreamingPayload,
        }
    }

    /// Bytes held back while waiting for the rest of the header
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Push the next chunk of the compressed object
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if self.closed {
            return Err(InflateError::Closed);
        }

        if self.payload.is_some() {
            return self.inflate(chunk, FlushDecompress::None);
        }

        self.pending.extend_from_slice(chunk);
        let header_len = match scan_header(&self.pending)? {
            HeaderScan::Incomplete => {
                debug!(buffered = self.pending.len(), "Waiting for complete gzip header");
                return Ok(());
            }
            HeaderScan::Complete(len) => len,
        };

        let remainder = self.pending.split_off(header_len);
        self.pending = Vec::new();
        self.payload = Some(Payload {
            decoder: Decompress::new(false),
            ended: false,
        });
        debug!(header_len, "Gzip header recognized");

        self.inflate(&remainder, FlushDecompress::None)
    }

    /// Flush buffered output and signal end of stream to the sink.
    ///
    /// Closing before any header was recognized emits nothing and is not an
    /// error; callers that need a complete stream check [`Self::phase`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.payload.is_none() {
            debug!(buffered = self.pending.len(), "Closed before a gzip header was recognized");
            return Ok(());
        }

        self.inflate(&[], FlushDecompress::Finish)?;
        self.sink.close();
        Ok(())
    }

    fn inflate(&mut self, mut input: &[u8], flush: FlushDecompress) -> Result<()> {
        let Some(payload) = self.payload.as_mut() else {
            return Ok(());
        };
        let mut out = vec![0u8; OUTPUT_CHUNK_BYTES];

        while !payload.ended {
            let in_before = payload.decoder.total_in();
            let out_before = payload.decoder.total_out();
            let status = payload.decoder.decompress(input, &mut out, flush)?;
            let consumed = (payload.decoder.total_in() - in_before) as usize;
            let produced = (payload.decoder.total_out() - out_before) as usize;

            input = &input[consumed..];
            if produced > 0 {
                self.sink.feed(&out[..produced]);
            }

            if status == Status::StreamEnd {
                payload.ended = true;
                if !input.is_empty() {
                    debug!(trailing = input.len(), "Ignoring bytes after deflate stream end");
                }
                break;
            }

            // Output space left over means the decoder is waiting on input
            if input.is_empty() && produced < out.len() {
                break;
            }
            if consumed == 0 && produced == 0 {
                break;
            }
        }

        Ok(())
    }
}

/// Work out the header length, or report that more bytes are needed.
///
/// The signature and flags byte are judged as soon as they have arrived, so
/// non-gzip input fails before any optional field is walked.
fn scan_header(buf: &[u8]) -> Result<HeaderScan> {
    if let Some(&[id1, id2, cm]) = buf.get(..3) {
        let signature = [id1, id2, cm];
        if signature != GZIP_SIGNATURE {
            return Err(InflateError::BadSignature(signature));
        }
    }
    if let Some(&flags) = buf.get(3) {
        if flags & FLAG_RESERVED != 0 {
            return Err(InflateError::ReservedFlags(flags));
        }
    }
    if buf.len() < FIXED_HEADER_LEN {
        return Ok(HeaderScan::Incomplete);
    }

    let flags = buf[3];
    let mut pos = FIXED_HEADER_LEN;

    if flags & FLAG_EXTRA != 0 {
        let Some(xlen) = buf.get(pos..pos + 2) else {
            return Ok(HeaderScan::Incomplete);
        };
        pos += 2 + u16::from_le_bytes([xlen[0], xlen[1]]) as usize;
    }

    for flag in [FLAG_NAME, FLAG_COMMENT] {
        if flags & flag != 0 {
            match find_nul(buf, pos) {
                Some(end) => pos = end + 1,
                None => return Ok(HeaderScan::Incomplete),
            }
        }
    }

    if flags & FLAG_HCRC != 0 {
        pos += 2;
    }

    if buf.len() < pos {
        return Ok(HeaderScan::Incomplete);
    }

    Ok(HeaderScan::Complete(pos))
}

fn find_nul(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == 0)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder};
    use std::io::Write;

    fn sample_text() -> Vec<u8> {
        let mut text = Vec::new();
        for i in 0..400 {
            writeln!(text, "2023-05-01\t00:00:{:02}\tFRA50\t{}", i % 60, i * 17).unwrap();
        }
        text
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Gzip with every optional header field present
    fn gzip_all_flags(data: &[u8]) -> Vec<u8> {
        let mut out = vec![0x1f, 0x8b, 0x08];
        out.push(FLAG_EXTRA | FLAG_NAME | FLAG_COMMENT | FLAG_HCRC);
        out.extend_from_slice(&[0, 0, 0, 0, 0, 3]);
        out.extend_from_slice(&5u16.to_le_bytes());
        out.extend_from_slice(b"ab\x00cd");
        out.extend_from_slice(b"E2ABC.2023-05-01-00.log\x00");
        out.extend_from_slice(b"edge log\x00");
        out.extend_from_slice(&[0xaa, 0xbb]);

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        out.extend_from_slice(&encoder.finish().unwrap());
        // CRC32 and ISIZE are not checked
        out.extend_from_slice(&[0u8; 8]);
        out
    }

    fn inflate_chunks(chunks: &[&[u8]]) -> Result<(Vec<u8>, InflatePhase)> {
        let mut inflater = StreamInflater::new(Vec::new());
        for chunk in chunks {
            inflater.feed(chunk)?;
        }
        inflater.close()?;
        let phase = inflater.phase();
        Ok((inflater.into_sink(), phase))
    }

    #[test]
    fn test_whole_stream() {
        let text = sample_text();
        let (out, phase) = inflate_chunks(&[&gzip(&text)]).unwrap();
        assert_eq!(out, text);
        assert_eq!(phase, InflatePhase::Drained);
    }

    #[test]
    fn test_every_two_way_split_matches_whole() {
        let text = sample_text();
        for compressed in [gzip(&text), gzip_all_flags(&text)] {
            for split in 0..=compressed.len() {
                let (head, tail) = compressed.split_at(split);
                let (out, phase) = inflate_chunks(&[head, tail]).unwrap();
                assert_eq!(out, text, "split at {split}");
                assert_eq!(phase, InflatePhase::Drained);
            }
        }
    }

    #[test]
    fn test_single_byte_chunks() {
        let text = sample_text();
        let compressed = gzip_all_flags(&text);
        let chunks: Vec<&[u8]> = compressed.chunks(1).collect();
        let (out, _) = inflate_chunks(&chunks).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_partial_header_emits_nothing() {
        let compressed = gzip_all_flags(b"hello\n");
        let mut inflater = StreamInflater::new(Vec::new());
        // Stops inside the file name field
        inflater.feed(&compressed[..20]).unwrap();
        assert_eq!(inflater.phase(), InflatePhase::AwaitingHeader);
        assert_eq!(inflater.buffered(), 20);
        assert!(inflater.sink().is_empty());
    }

    #[test]
    fn test_close_without_header_is_silent() {
        let mut inflater = StreamInflater::new(Vec::new());
        inflater.close().unwrap();
        assert!(inflater.into_sink().is_empty());

        let mut inflater = StreamInflater::new(Vec::new());
        inflater.feed(&[0x1f, 0x8b]).unwrap();
        inflater.close().unwrap();
        assert_eq!(inflater.phase(), InflatePhase::AwaitingHeader);
        assert!(inflater.into_sink().is_empty());
    }

    #[test]
    fn test_bad_signature() {
        let mut compressed = gzip(b"hello\n");
        compressed[0] = b'P';
        let mut inflater = StreamInflater::new(Vec::new());
        let err = inflater.feed(&compressed).unwrap_err();
        assert!(matches!(err, InflateError::BadSignature([b'P', 0x8b, 0x08])));
    }

    #[test]
    fn test_split_signature_waits_for_third_byte() {
        let mut inflater = StreamInflater::new(Vec::new());
        inflater.feed(b"PK").unwrap();
        assert_eq!(inflater.phase(), InflatePhase::AwaitingHeader);
        let err = inflater.feed(b"\x03\x00").unwrap_err();
        assert!(matches!(err, InflateError::BadSignature([b'P', b'K', 0x03])));
    }

    #[test]
    fn test_non_gzip_with_name_flag_fails_on_first_chunk() {
        let mut object = b"PK\x03\x08".to_vec();
        object.resize(64 * 1024, b'a');

        let mut inflater = StreamInflater::new(Vec::new());
        let mut chunks = object.chunks(8 * 1024);
        let err = inflater.feed(chunks.next().unwrap()).unwrap_err();
        assert!(matches!(err, InflateError::BadSignature([b'P', b'K', 0x03])));
        assert!(inflater.sink().is_empty());
    }

    #[test]
    fn test_reserved_flags_rejected() {
        let mut compressed = gzip(b"hello\n");
        compressed[3] |= 0x20;
        let mut inflater = StreamInflater::new(Vec::new());
        assert!(matches!(
            inflater.feed(&compressed[..4]),
            Err(InflateError::ReservedFlags(0x20))
        ));
    }

    #[test]
    fn test_truncated_payload_is_not_drained() {
        let text = sample_text();
        let compressed = gzip(&text);
        let cut = compressed.len() / 2;
        let mut inflater = StreamInflater::new(Vec::new());
        inflater.feed(&compressed[..cut]).unwrap();
        let _ = inflater.close();
        assert_eq!(inflater.phase(), InflatePhase::StreamingPayload);
    }

    #[test]
    fn test_feed_after_close() {
        let mut inflater = StreamInflater::new(Vec::new());
        inflater.feed(&gzip(b"x")).unwrap();
        inflater.close().unwrap();
        assert!(matches!(inflater.feed(b"more"), Err(InflateError::Closed)));
    }
}
