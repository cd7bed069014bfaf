//! One peer TCP connection: a 64 KiB write buffer flushed opportunistically
//! (`examples/original_source/src/shared/types/net_node.cpp`'s
//! `FR_WRITE_BUFFER_SIZE`/`Send`/`Flush`), and an incremental, nonblocking
//! frame reader mirroring that same file's `HEADER`/`BODY` two-phase
//! `Receive` state machine — translated to Rust's pull-based nonblocking
//! I/O instead of a push callback.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use log::{trace, warn};

use crate::error::ProtocolError;
use crate::protocol::{self, Message, MessageKind};

/// Matches the original `NetNode`'s static write buffer size.
const WRITE_BUFFER_SIZE: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Header,
    Body,
}

/// A TCP connection to one peer (worker↔worker, or worker↔renderer),
/// tracked from the worker side of the protocol (`spec.md` §4.5, §5).
pub struct PeerConn {
    stream: TcpStream,
    /// The peer's worker id, once known (set after `INIT`/`RENDER_START`
    /// assigns ids, or immediately for outbound connections we dialed).
    pub worker_id: Option<u32>,

    write_buf: Vec<u8>,

    mode: ReadMode,
    header_buf: [u8; 8],
    header_filled: usize,
    pending_kind: u32,
    pending_size: u32,
    body_buf: Vec<u8>,
    body_filled: usize,

    sent_materials: HashSet<u32>,
    sent_shaders: HashSet<u32>,
    sent_textures: HashSet<u32>,
}

impl PeerConn {
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        stream.set_nonblocking(true).ok();
        stream.set_nodelay(true).ok();
        Self {
            stream,
            worker_id: None,
            write_buf: Vec::with_capacity(WRITE_BUFFER_SIZE),
            mode: ReadMode::Header,
            header_buf: [0u8; 8],
            header_filled: 0,
            pending_kind: 0,
            pending_size: 0,
            body_buf: Vec::new(),
            body_filled: 0,
            sent_materials: HashSet::new(),
            sent_shaders: HashSet::new(),
            sent_textures: HashSet::new(),
        }
    }

    /// Appends `message` to the write buffer, flushing first if it would
    /// overflow `WRITE_BUFFER_SIZE` (`net_node.cpp::Send`).
    pub fn queue(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let (kind, body) = protocol::encode_body(message)?;
        let frame_len = 8 + body.len();

        if self.write_buf.len() + frame_len > WRITE_BUFFER_SIZE {
            self.flush()?;
        }

        self.write_buf.extend_from_slice(&kind.as_u32().to_le_bytes());
        self.write_buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.write_buf.extend_from_slice(&body);

        if self.write_buf.len() >= WRITE_BUFFER_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes any buffered bytes to the socket. Called from `queue` when
    /// the buffer fills, and from the worker's 10 ms flush timer
    /// (`spec.md` §5).
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        match self.stream.write_all(&self.write_buf) {
            Ok(()) => {
                self.write_buf.clear();
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }

    /// Advances the incremental frame reader with whatever bytes are
    /// currently available, without blocking. Returns `Ok(Some(message))`
    /// once a full frame has arrived, `Ok(None)` if nothing is ready yet,
    /// or `Err(ConnectionClosed)` once the peer hangs up.
    pub fn poll(&mut self) -> Result<Option<Message>, ProtocolError> {
        loop {
            let (dst, filled): (&mut [u8], &mut usize) = match self.mode {
                ReadMode::Header => (&mut self.header_buf, &mut self.header_filled),
                ReadMode::Body => (&mut self.body_buf, &mut self.body_filled),
            };

            if *filled < dst.len() {
                match self.stream.read(&mut dst[*filled..]) {
                    Ok(0) => return Err(ProtocolError::ConnectionClosed),
                    Ok(n) => {
                        *filled += n;
                        if *filled < dst.len() {
                            return Ok(None);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(ProtocolError::Io(e)),
                }
            }

            match self.mode {
                ReadMode::Header => {
                    let kind_raw = u32::from_le_bytes(self.header_buf[0..4].try_into().unwrap());
                    let size = u32::from_le_bytes(self.header_buf[4..8].try_into().unwrap());
                    self.pending_kind = kind_raw;
                    self.pending_size = size;
                    self.header_filled = 0;
                    self.body_buf = vec![0u8; size as usize];
                    self.body_filled = 0;
                    self.mode = ReadMode::Body;
                }
                ReadMode::Body => {
                    let kind = MessageKind::from_u32(self.pending_kind)?;
                    let body = std::mem::take(&mut self.body_buf);
                    self.body_filled = 0;
                    self.mode = ReadMode::Header;
                    let message = protocol::decode_body(kind, &body)?;
                    trace!("received {kind:?} ({} bytes)", body.len());
                    return Ok(Some(message));
                }
            }
        }
    }

    /// Skips re-sending a material already known to be on this peer,
    /// marking it sent otherwise (`net_node.cpp`'s `_materials` dedup map).
    pub fn should_send_material(&mut self, id: u32) -> bool {
        self.sent_materials.insert(id)
    }

    pub fn should_send_shader(&mut self, id: u32) -> bool {
        self.sent_shaders.insert(id)
    }

    pub fn should_send_texture(&mut self, id: u32) -> bool {
        self.sent_textures.insert(id)
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }
}

/// Logs and swallows a disconnect that's expected during teardown, and
/// escalates anything else (`spec.md` §4.5: "any other receipt in any
/// state is a protocol error: log and close the socket").
pub fn log_disconnect(addr: &str, err: &ProtocolError) {
    match err {
        ProtocolError::ConnectionClosed => trace!("[{addr}] disconnected"),
        other => warn!("[{addr}] protocol error, closing: {other}"),
    }
}
