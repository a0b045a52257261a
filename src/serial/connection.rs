// ABOUTME: Chunked byte I/O over any async stream split into independent read and write halves
// ABOUTME: The reader keeps a reusable BytesMut buffer; the writer is buffered and flushed per write

use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};

/// Read side of a serial connection.
#[derive(Debug)]
pub struct ReadConnection<R> {
    reader: R,
    // Refilled in place; each chunk is split off and frozen.
    buffer: BytesMut,
    capacity: usize,
}

impl<R: AsyncRead + Unpin> ReadConnection<R> {
    pub fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Wait for the next chunk of bytes.
    ///
    /// Chunk boundaries are whatever the stream delivered; no framing is
    /// applied. Returns `None` at end of stream.
    pub async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.buffer.reserve(self.capacity);
        if 0 == self.reader.read_buf(&mut self.buffer).await? {
            return Ok(None);
        }
        Ok(Some(self.buffer.split().freeze()))
    }
}

/// Write side of a serial connection.
#[derive(Debug)]
pub struct WriteConnection<W> {
    stream: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> WriteConnection<W> {
    pub fn new(writer: W) -> Self {
        Self {
            stream: BufWriter::new(writer),
        }
    }

    /// Write all of `data` and flush it to the device.
    pub async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// Split `stream` into connection halves.
pub fn split<S>(stream: S, read_capacity: usize) -> (ReadConnection<ReadHalf<S>>, WriteConnection<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    (ReadConnection::new(reader, read_capacity), WriteConnection::new(writer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_chunks_until_eof() {
        let (modem, host) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(host, 16);
        let (modem_reader, mut modem_writer) = tokio::io::split(modem);

        modem_writer.write_all(b"OK\r\n").await.unwrap();
        let chunk = reader.read_chunk().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"OK\r\n");

        drop(modem_writer);
        drop(modem_reader);
        assert!(reader.read_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_are_flushed() {
        let (mut modem, host) = tokio::io::duplex(64);
        let (_reader, mut writer) = split(host, 16);

        writer.write_chunk(b"AT\r").await.unwrap();

        let mut received = [0u8; 3];
        modem.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"AT\r");
    }
}
