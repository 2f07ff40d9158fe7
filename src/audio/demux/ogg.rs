//! Ogg → raw Opus packet demuxer.
//!
//! Rebuilds packet boundaries from the page lacing table rather than byte
//! counts: a lacing value of 255 means the packet continues in the next
//! segment (possibly on the next page), anything smaller terminates it.
//! Page CRCs are not checked; the transcoder on the other end of the pipe is
//! trusted to frame its own output correctly.

use std::{collections::VecDeque, io::Read};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use tracing::{debug, trace};

use crate::audio::constants::{OGG_MAX_SEGMENT, OGG_PAGE_HEADER_LEN};

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

const OPUS_HEAD: &[u8] = b"OpusHead";
const OPUS_TAGS: &[u8] = b"OpusTags";

#[derive(Debug, thiserror::Error)]
pub enum OggError {
    /// Input ended inside a page or inside a packet continued across pages.
    #[error("Ogg stream truncated")]
    Truncated,
    #[error("malformed Ogg page: {0}")]
    Malformed(String),
    #[error("Ogg read failed: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for OggError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(e)
        }
    }
}

/// Page header fields the demuxer acts on.
#[derive(Debug, Clone, Copy)]
struct PageHeader {
    flags: u8,
    granule: u64,
    serial: u32,
    sequence: u32,
    segments: u8,
}

/// Pulls complete packets out of an Ogg byte stream.
pub struct OggPacketReader<R> {
    inner: R,
    ready: VecDeque<Bytes>,
    /// Head of a packet whose last segment was 255 on the previous page.
    partial: Vec<u8>,
    /// Opus header packets still expected after a beginning-of-stream page.
    headers_pending: u8,
    finished: bool,
    pages: u64,
}

impl<R: Read> OggPacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            ready: VecDeque::new(),
            partial: Vec::new(),
            headers_pending: 0,
            finished: false,
            pages: 0,
        }
    }

    /// Number of pages parsed so far.
    pub fn pages_read(&self) -> u64 {
        self.pages
    }

    /// Read the next audio packet.
    ///
    /// Returns `Ok(None)` once the stream signals end-of-stream or the input
    /// ends on a page boundary.
    pub fn next_packet(&mut self) -> Result<Option<Bytes>, OggError> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Ok(Some(packet));
            }
            if self.finished {
                return Ok(None);
            }
            if !self.read_page()? {
                self.finished = true;
                if !self.partial.is_empty() {
                    return Err(OggError::Truncated);
                }
                return Ok(None);
            }
        }
    }

    /// Fills `buf` completely, or reports a clean EOF if nothing was read.
    fn fill_or_eof(&mut self, buf: &mut [u8]) -> Result<bool, OggError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(OggError::Truncated),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn read_header(&mut self) -> Result<Option<PageHeader>, OggError> {
        let mut capture = [0u8; 4];
        if !self.fill_or_eof(&mut capture)? {
            return Ok(None);
        }
        if &capture != CAPTURE_PATTERN {
            return Err(OggError::Malformed(format!(
                "bad capture pattern {:02x?} after {} pages",
                capture, self.pages
            )));
        }

        let version = self.inner.read_u8()?;
        if version != 0 {
            return Err(OggError::Malformed(format!(
                "unsupported stream structure version {}",
                version
            )));
        }

        let flags = self.inner.read_u8()?;
        let granule = self.inner.read_u64::<LittleEndian>()?;
        let serial = self.inner.read_u32::<LittleEndian>()?;
        let sequence = self.inner.read_u32::<LittleEndian>()?;
        let _crc = self.inner.read_u32::<LittleEndian>()?;
        let segments = self.inner.read_u8()?;

        Ok(Some(PageHeader {
            flags,
            granule,
            serial,
            sequence,
            segments,
        }))
    }

    /// Parses one page into `ready`. Returns `false` on clean EOF.
    fn read_page(&mut self) -> Result<bool, OggError> {
        let Some(header) = self.read_header()? else {
            return Ok(false);
        };
        self.pages += 1;

        trace!(
            "Ogg page serial={} seq={} granule={} segments={} ({} header bytes)",
            header.serial,
            header.sequence,
            header.granule,
            header.segments,
            OGG_PAGE_HEADER_LEN + header.segments as usize
        );

        let mut lacing = vec![0u8; header.segments as usize];
        self.inner.read_exact(&mut lacing)?;

        let body_len: usize = lacing.iter().map(|&v| v as usize).sum();
        let mut body = vec![0u8; body_len];
        self.inner.read_exact(&mut body)?;
        let body = Bytes::from(body);

        if header.flags & FLAG_BOS != 0 {
            self.headers_pending = 2;
        }

        let continued = header.flags & FLAG_CONTINUED != 0;
        // Orphaned tail of a packet we never saw the start of.
        let mut discard_first = continued && self.partial.is_empty() && self.pages > 1;
        if !continued && !self.partial.is_empty() {
            debug!(
                "Dropping {} byte packet fragment not continued on page {}",
                self.partial.len(),
                header.sequence
            );
            self.partial.clear();
        }

        let mut start = 0;
        let mut offset = 0;
        for &len in &lacing {
            offset += len as usize;
            if len == OGG_MAX_SEGMENT {
                continue;
            }

            if discard_first {
                discard_first = false;
            } else if self.partial.is_empty() {
                self.emit(body.slice(start..offset));
            } else {
                self.partial.extend_from_slice(&body[start..offset]);
                let packet = Bytes::from(std::mem::take(&mut self.partial));
                self.emit(packet);
            }
            start = offset;
        }
        if start < offset && !discard_first {
            self.partial.extend_from_slice(&body[start..offset]);
        }

        if header.flags & FLAG_EOS != 0 {
            if !self.partial.is_empty() {
                debug!(
                    "End-of-stream page left {} bytes of unfinished packet",
                    self.partial.len()
                );
                self.partial.clear();
            }
            self.finished = true;
        }

        Ok(true)
    }

    fn emit(&mut self, packet: Bytes) {
        if packet.is_empty() {
            return;
        }
        if self.headers_pending > 0
            && (packet.starts_with(OPUS_HEAD) || packet.starts_with(OPUS_TAGS))
        {
            self.headers_pending -= 1;
            return;
        }
        self.ready.push_back(packet);
    }
}
