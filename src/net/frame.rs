//! Length-prefixed message framing.
//!
//! Every message is a 4-byte big-endian signed length followed by that many
//! bytes. A negative length carries no payload and is a signal instead.

use crate::stream::{FrameSource, RecordSink, StreamFrame};
use log::trace;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use thiserror::Error;

/// Largest payload accepted in one message.
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    EndOfData,
    Terminate,
    Other(i32),
}

impl Signal {
    pub fn code(self) -> i32 {
        match self {
            Signal::EndOfData => -1,
            Signal::Terminate => -4,
            Signal::Other(code) => code,
        }
    }

    fn from_code(code: i32) -> Self {
        match code {
            -1 => Signal::EndOfData,
            -4 => Signal::Terminate,
            other => Signal::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Vec<u8>),
    Signal(Signal),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("signal code {0} is not negative")]
    InvalidSignal(i32),
    #[error("peer closed the connection")]
    Closed,
    #[error("connection closed inside a {len} byte message")]
    Truncated { len: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(err) => err,
            FrameError::Closed | FrameError::Truncated { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Bidirectional framed channel over any byte stream.
pub struct MessageChannel<S = TcpStream> {
    stream: S,
}

impl MessageChannel<TcpStream> {
    pub fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl<S: Read + Write> MessageChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn send(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > MAX_MESSAGE_LEN {
            return Err(FrameError::TooLarge {
                len: payload.len(),
                max: MAX_MESSAGE_LEN,
            });
        }
        let mut buf = Vec::with_capacity(payload.len() + 4);
        buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        trace!("event=frame_sent len={}", payload.len());
        Ok(())
    }

    pub fn send_text(&mut self, text: &str) -> Result<(), FrameError> {
        self.send(text.as_bytes())
    }

    pub fn signal(&mut self, signal: Signal) -> Result<(), FrameError> {
        let code = signal.code();
        if code >= 0 {
            return Err(FrameError::InvalidSignal(code));
        }
        self.stream.write_all(&code.to_be_bytes())?;
        self.stream.flush()?;
        trace!("event=signal_sent code={code}");
        Ok(())
    }

    /// Blocks for the next frame. A clean close between frames is
    /// [`FrameError::Closed`].
    pub fn recv(&mut self) -> Result<Frame, FrameError> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.stream.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Err(FrameError::Closed),
                Ok(0) => return Err(FrameError::Truncated { len: 4 }),
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        let len = i32::from_be_bytes(prefix);
        if len < 0 {
            return Ok(Frame::Signal(Signal::from_code(len)));
        }
        let len = len as usize;
        if len > MAX_MESSAGE_LEN {
            return Err(FrameError::TooLarge {
                len,
                max: MAX_MESSAGE_LEN,
            });
        }
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                FrameError::Truncated { len }
            } else {
                FrameError::Io(err)
            }
        })?;
        Ok(Frame::Message(payload))
    }
}

impl<S: Read + Write> RecordSink for MessageChannel<S> {
    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        MessageChannel::send(self, message).map_err(io::Error::from)
    }

    fn end_of_data(&mut self) -> io::Result<()> {
        self.signal(Signal::EndOfData).map_err(io::Error::from)
    }
}

impl<S: Read + Write> FrameSource for MessageChannel<S> {
    fn next_frame(&mut self) -> io::Result<StreamFrame> {
        loop {
            match self.recv()? {
                Frame::Message(bytes) => return Ok(StreamFrame::Data(bytes)),
                Frame::Signal(Signal::EndOfData) => return Ok(StreamFrame::EndOfData),
                Frame::Signal(Signal::Terminate) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "peer terminated the stream",
                    ))
                }
                Frame::Signal(Signal::Other(code)) => {
                    trace!("event=signal_ignored code={code}");
                }
            }
        }
    }
}
