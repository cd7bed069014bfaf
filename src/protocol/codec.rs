//! Length-prefixed message framing: `(kind:u32 LE)(size:u32 LE)(body)`
//! (`spec.md` §6). Every body is `bincode`-encoded, including `RAY` —
//! `bincode`'s deterministic little-endian binary layout stands in for
//! the spec's "in-memory byte image of a FatRay" without the `unsafe`
//! transmutes a literal `#[repr(C)]` POD cast would require for a
//! Rust enum (see `DESIGN.md`).

use std::io::{Read, Write};

use crate::error::ProtocolError;

use super::message::{Message, MessageKind, RenderRange};
use super::wire_ray;

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e)
        }
    })
}

fn read_body<R: Read>(reader: &mut R, size: u32) -> Result<Vec<u8>, ProtocolError> {
    let mut body = vec![0u8; size as usize];
    let mut read = 0usize;
    while read < body.len() {
        match reader.read(&mut body[read..]) {
            Ok(0) => {
                return Err(ProtocolError::Truncated {
                    expected: size,
                    got: read,
                })
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(body)
}

/// Splits a `Message` into its wire `kind` and encoded body (no payload
/// for `None`/`Ok`/`BuildBvh`/`RenderStop`/`RenderPause`/`RenderResume`).
/// Shared by the blocking [`write_message`] and the worker's nonblocking
/// per-peer frame writer (`worker::net`).
pub fn encode_body(message: &Message) -> Result<(MessageKind, Vec<u8>), ProtocolError> {
    let body = match message {
        Message::None
        | Message::Ok
        | Message::BuildBvh
        | Message::RenderStop
        | Message::RenderPause
        | Message::RenderResume => Vec::new(),
        Message::Error(s) => bincode::serialize(s)?,
        Message::Init { worker_id } => bincode::serialize(worker_id)?,
        Message::SyncConfig(c) => bincode::serialize(c)?,
        Message::SyncShader(s) => bincode::serialize(s)?,
        Message::SyncTexture(t) => bincode::serialize(t)?,
        Message::SyncMaterial(m) => bincode::serialize(m)?,
        Message::SyncMesh(m) => bincode::serialize(m)?,
        Message::SyncCamera(c) => bincode::serialize(c)?,
        Message::SyncEmissive(l) => bincode::serialize(l)?,
        Message::SyncWbvh(b) => bincode::serialize(b)?,
        Message::SyncImage(i) => bincode::serialize(i)?,
        Message::RenderStart(r) => bincode::serialize(&r.pack())?,
        Message::RenderStats(s) => bincode::serialize(s)?,
        Message::Ray(r) => wire_ray::encode(r),
    };
    Ok((message.kind(), body))
}

/// Reassembles a `Message` from a wire `kind` and its already fully-read
/// body bytes. Shared by [`read_message`] and the worker's nonblocking
/// per-peer frame reader.
pub fn decode_body(kind: MessageKind, body: &[u8]) -> Result<Message, ProtocolError> {
    Ok(match kind {
        MessageKind::None => Message::None,
        MessageKind::Ok => Message::Ok,
        MessageKind::Error => Message::Error(bincode::deserialize(body)?),
        MessageKind::Init => Message::Init {
            worker_id: bincode::deserialize(body)?,
        },
        MessageKind::SyncConfig => Message::SyncConfig(bincode::deserialize(body)?),
        MessageKind::SyncShader => Message::SyncShader(bincode::deserialize(body)?),
        MessageKind::SyncTexture => Message::SyncTexture(bincode::deserialize(body)?),
        MessageKind::SyncMaterial => Message::SyncMaterial(bincode::deserialize(body)?),
        MessageKind::SyncMesh => Message::SyncMesh(bincode::deserialize(body)?),
        MessageKind::SyncCamera => Message::SyncCamera(bincode::deserialize(body)?),
        MessageKind::SyncEmissive => Message::SyncEmissive(bincode::deserialize(body)?),
        MessageKind::SyncWbvh => Message::SyncWbvh(bincode::deserialize(body)?),
        MessageKind::BuildBvh => Message::BuildBvh,
        MessageKind::SyncImage => Message::SyncImage(bincode::deserialize(body)?),
        MessageKind::RenderStart => {
            let packed: u32 = bincode::deserialize(body)?;
            Message::RenderStart(RenderRange::unpack(packed))
        }
        MessageKind::RenderStop => Message::RenderStop,
        MessageKind::RenderPause => Message::RenderPause,
        MessageKind::RenderResume => Message::RenderResume,
        MessageKind::RenderStats => Message::RenderStats(bincode::deserialize(body)?),
        MessageKind::Ray => Message::Ray(wire_ray::decode(body).ok_or_else(|| ProtocolError::Truncated {
            expected: std::mem::size_of::<wire_ray::WireRay>() as u32,
            got: body.len(),
        })?),
    })
}

/// Writes one framed message. See [`encode_body`] for the body encoding.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), ProtocolError> {
    let (kind, body) = encode_body(message)?;
    writer.write_all(&kind.as_u32().to_le_bytes())?;
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    Ok(())
}

/// Reads one framed message, or `ProtocolError::ConnectionClosed` if the
/// peer closed the stream cleanly between messages.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, ProtocolError> {
    let mut header = [0u8; 8];
    read_exact_or_closed(reader, &mut header)?;

    let kind_raw = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let size = u32::from_le_bytes(header[4..8].try_into().unwrap());
    let kind = MessageKind::from_u32(kind_raw)?;
    let body = read_body(reader, size)?;
    decode_body(kind, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(message: Message) -> Message {
        let mut buf = Vec::new();
        write_message(&mut buf, &message).unwrap();
        let mut cursor = Cursor::new(buf);
        read_message(&mut cursor).unwrap()
    }

    #[test]
    fn no_payload_messages_round_trip() {
        assert!(matches!(round_trip(Message::Ok), Message::Ok));
        assert!(matches!(round_trip(Message::RenderStop), Message::RenderStop));
    }

    #[test]
    fn init_round_trips_worker_id() {
        match round_trip(Message::Init { worker_id: 7 }) {
            Message::Init { worker_id } => assert_eq!(worker_id, 7),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn render_start_round_trips_packed_range() {
        let range = RenderRange { offset: 10, chunk: 64 };
        match round_trip(Message::RenderStart(range)) {
            Message::RenderStart(r) => assert_eq!(r, range),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn empty_stream_is_connection_closed() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            read_message(&mut cursor),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn truncated_body_is_reported() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Message::Error("oops".into())).unwrap();
        buf.truncate(buf.len() - 2);
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_message(&mut cursor),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&999u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_message(&mut cursor),
            Err(ProtocolError::UnknownKind(999))
        ));
    }
}
