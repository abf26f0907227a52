//! Buffered, peekable frame reader/writer over any tokio stream.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

use opalrdp_pdu::{Action, PduHint};

pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Framed<S> {
    pub fn new(stream: S) -> Self {
        Self::new_with_leftover(stream, BytesMut::new())
    }

    /// Wraps a stream keeping bytes already read from it (e.g. across a TLS
    /// upgrade or a stream split).
    pub fn new_with_leftover(stream: S, leftover: BytesMut) -> Self {
        Self { stream, buf: leftover }
    }

    pub fn into_inner(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    pub fn into_inner_no_leftover(self) -> S {
        let (stream, leftover) = self.into_inner();
        debug_assert_eq!(leftover.len(), 0, "unexpected leftover");
        stream
    }

    pub fn get_inner_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Bytes accumulated but not yet consumed.
    pub fn peek(&self) -> &[u8] {
        &self.buf
    }
}

impl<S> Framed<S>
where
    S: AsyncRead + Unpin,
{
    /// Accumulates at least `length` bytes and returns exactly `length`
    /// bytes, keeping the leftover in the internal buffer.
    ///
    /// Cancel safe: dropping the future loses no data.
    pub async fn read_exact(&mut self, length: usize) -> io::Result<BytesMut> {
        loop {
            if self.buf.len() >= length {
                return Ok(self.buf.split_to(length));
            }

            self.buf.reserve(length - self.buf.len());

            let len = self.stream.read_buf(&mut self.buf).await?;

            if len == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
            }
        }
    }

    /// Reads one whole RDP frame (TPKT or FastPath).
    ///
    /// Cancel safe: dropping the future loses no data.
    pub async fn read_pdu(&mut self) -> io::Result<(Action, BytesMut)> {
        loop {
            match opalrdp_pdu::find_size(self.peek()) {
                Ok(Some(pdu_info)) => {
                    let frame = self.read_exact(pdu_info.length).await?;

                    return Ok((pdu_info.action, frame));
                }
                Ok(None) => {
                    let len = self.stream.read_buf(&mut self.buf).await?;

                    if len == 0 {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
                    }
                }
                Err(e) => return Err(io::Error::other(e)),
            };
        }
    }

    /// Reads one frame delimited by the provided hint.
    ///
    /// Cancel safe: dropping the future loses no data.
    pub async fn read_by_hint(&mut self, hint: &dyn PduHint) -> io::Result<Bytes> {
        loop {
            match hint.find_size(self.peek()).map_err(io::Error::other)? {
                Some(length) => {
                    return Ok(self.read_exact(length).await?.freeze());
                }
                None => {
                    let len = self.stream.read_buf(&mut self.buf).await?;

                    if len == 0 {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
                    }
                }
            };
        }
    }
}

impl<S> Framed<S>
where
    S: AsyncWrite + Unpin,
{
    /// Writes an entire buffer to the stream.
    ///
    /// Not cancel safe: a dropped future may leave a partial write.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;

        Ok(())
    }
}
