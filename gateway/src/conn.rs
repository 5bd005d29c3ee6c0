//! Client transport abstraction.
//!
//! Sessions speak the same length-framed protocol over plain TCP or over
//! WebSocket binary messages; a WS message is just one more chunk fed into
//! the frame buffer. Read and write halves split so the session can run
//! independent reader and writer tasks.

use std::io;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const READ_CHUNK: usize = 4096;

pub enum Connection {
    Tcp(TcpStream),
    Ws(WebSocketStream<TcpStream>),
}

impl Connection {
    pub fn split(self) -> (ConnReader, ConnWriter) {
        match self {
            Connection::Tcp(stream) => {
                let (read, write) = stream.into_split();
                (ConnReader::Tcp(read), ConnWriter::Tcp(write))
            }
            Connection::Ws(stream) => {
                let (sink, stream) = stream.split();
                (ConnReader::Ws(stream), ConnWriter::Ws(sink))
            }
        }
    }
}

pub enum ConnReader {
    Tcp(OwnedReadHalf),
    Ws(SplitStream<WebSocketStream<TcpStream>>),
}

impl ConnReader {
    /// Read the next chunk of bytes. `Ok(None)` means the peer closed the
    /// stream cleanly.
    pub async fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self {
            ConnReader::Tcp(read) => {
                let mut buf = [0u8; READ_CHUNK];
                let n = read.read(&mut buf).await?;
                if n == 0 {
                    Ok(None)
                } else {
                    Ok(Some(buf[..n].to_vec()))
                }
            }
            ConnReader::Ws(stream) => loop {
                match stream.next().await {
                    None => return Ok(None),
                    Some(Err(err)) => return Err(io::Error::other(err)),
                    Some(Ok(Message::Binary(bytes))) => return Ok(Some(bytes)),
                    Some(Ok(Message::Close(_))) => return Ok(None),
                    // Pings are answered by the protocol layer; text has no
                    // meaning on this endpoint.
                    Some(Ok(_)) => continue,
                }
            },
        }
    }
}

pub enum ConnWriter {
    Tcp(OwnedWriteHalf),
    Ws(SplitSink<WebSocketStream<TcpStream>, Message>),
}

impl ConnWriter {
    pub async fn write_frame(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        match self {
            ConnWriter::Tcp(write) => write.write_all(&bytes).await,
            ConnWriter::Ws(sink) => sink
                .send(Message::Binary(bytes))
                .await
                .map_err(io::Error::other),
        }
    }

    pub async fn shutdown(&mut self) {
        match self {
            ConnWriter::Tcp(write) => {
                let _ = write.shutdown().await;
            }
            ConnWriter::Ws(sink) => {
                let _ = sink.close().await;
            }
        }
    }
}
