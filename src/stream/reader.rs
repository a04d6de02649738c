//! Consumer side of the record streaming protocol.

use super::engine::DATA_ACK;
use super::record::{DeviceRecord, RecordHeader};
use crate::protocol::ProtocolError;
use std::collections::VecDeque;
use std::io;
use thiserror::Error;

/// One message of a record stream as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Data(Vec<u8>),
    EndOfData,
}

pub trait FrameSource {
    fn next_frame(&mut self) -> io::Result<StreamFrame>;
}

impl FrameSource for VecDeque<StreamFrame> {
    fn next_frame(&mut self) -> io::Result<StreamFrame> {
        self.pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "stream exhausted"))
    }
}

#[derive(Debug, Error)]
pub enum StreamDecodeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("expected data acknowledgement, got `{0}`")]
    MissingAcknowledgement(String),
    #[error(transparent)]
    Header(#[from] ProtocolError),
    #[error("record payload is {actual} bytes, header announced {expected}")]
    LengthMismatch { expected: u32, actual: usize },
    #[error("end of data between a record header and its payload")]
    TruncatedRecord,
}

/// Turns header/payload message pairs back into records.
pub struct RecordStreamReader<S> {
    source: S,
    acknowledged: bool,
    finished: bool,
}

impl<S: FrameSource> RecordStreamReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            acknowledged: false,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Next forwarded record, or `None` once end of data arrived.
    pub fn next_record(&mut self) -> Result<Option<DeviceRecord>, StreamDecodeError> {
        if self.finished {
            return Ok(None);
        }
        if !self.acknowledged {
            match self.source.next_frame()? {
                StreamFrame::Data(bytes) if bytes == DATA_ACK.as_bytes() => {
                    self.acknowledged = true;
                }
                StreamFrame::Data(bytes) => {
                    return Err(StreamDecodeError::MissingAcknowledgement(
                        String::from_utf8_lossy(&bytes).trim_end().to_string(),
                    ))
                }
                StreamFrame::EndOfData => {
                    self.finished = true;
                    return Ok(None);
                }
            }
        }
        let header = match self.source.next_frame()? {
            StreamFrame::EndOfData => {
                self.finished = true;
                return Ok(None);
            }
            StreamFrame::Data(bytes) => RecordHeader::parse(&String::from_utf8_lossy(&bytes))?,
        };
        let StreamFrame::Data(data) = self.source.next_frame()? else {
            self.finished = true;
            return Err(StreamDecodeError::TruncatedRecord);
        };
        if data.len() != header.data_len as usize {
            return Err(StreamDecodeError::LengthMismatch {
                expected: header.data_len,
                actual: data.len(),
            });
        }
        Ok(Some(DeviceRecord::new(
            header.session_id,
            header.session_time,
            header.file_index,
            header.stream,
            data,
        )))
    }

    /// Drains the stream.
    pub fn read_all(&mut self) -> Result<Vec<DeviceRecord>, StreamDecodeError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}
