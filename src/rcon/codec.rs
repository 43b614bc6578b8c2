//! Source-RCON packet framing.
//!
//! Frame layout, all integers little-endian: `length` (excluding itself),
//! `id`, `type`, NUL-terminated body, one extra NUL pad byte.

use std::io::{Error, ErrorKind};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Login request carrying the password as body.
pub(crate) const TYPE_AUTH: i32 = 3;
/// Command execution request.
pub(crate) const TYPE_EXEC: i32 = 2;

/// Bytes of id + type + the two trailing NULs.
const HEADER_LEN: usize = 10;
/// Servers cap command/response bodies near 4 KiB.
const MAX_BODY: usize = 4096;

/// One decoded RCON packet.
#[derive(Debug)]
pub(crate) struct Packet {
    pub id: i32,
    #[allow(dead_code)]
    pub ptype: i32,
    pub body: String,
}

/// Encode and write one packet.
pub(crate) async fn write_packet(
    stream: &mut TcpStream,
    id: i32,
    ptype: i32,
    body: &str,
) -> std::io::Result<()> {
    let payload = body.as_bytes();
    if payload.len() > MAX_BODY {
        return Err(Error::new(ErrorKind::InvalidInput, "rcon body too long"));
    }
    let frame_len = payload.len().saturating_add(HEADER_LEN);
    let frame_len_i32 = i32::try_from(frame_len)
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "rcon body too long"))?;

    let mut buf = Vec::with_capacity(frame_len.saturating_add(4));
    buf.extend_from_slice(&frame_len_i32.to_le_bytes());
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&ptype.to_le_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&[0, 0]);

    stream.write_all(&buf).await
}

/// Read and decode one packet.
pub(crate) async fn read_packet(stream: &mut TcpStream) -> std::io::Result<Packet> {
    let frame_len = stream.read_i32_le().await?;
    let frame_len = usize::try_from(frame_len)
        .map_err(|_| Error::new(ErrorKind::InvalidData, "negative rcon frame length"))?;
    if !(HEADER_LEN..=MAX_BODY.saturating_add(HEADER_LEN)).contains(&frame_len) {
        return Err(Error::new(ErrorKind::InvalidData, "rcon frame length out of range"));
    }

    let id = stream.read_i32_le().await?;
    let ptype = stream.read_i32_le().await?;

    let mut body = vec![0_u8; frame_len.saturating_sub(HEADER_LEN)];
    stream.read_exact(&mut body).await?;
    let mut terminator = [0_u8; 2];
    stream.read_exact(&mut terminator).await?;

    Ok(Packet {
        id,
        ptype,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
