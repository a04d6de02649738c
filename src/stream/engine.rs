//! Sequential, label-aware, multi-volume record streaming for one session.

use super::bsr::RestoreSelector;
use super::device::{Device, DeviceError, DeviceLease};
use super::label::{SessionLabel, VolumeHeader};
use super::reader::StreamFrame;
use super::record::{DeviceRecord, LabelKind, RecordHeader};
use crate::job::CancelToken;
use crate::protocol::VolumeInfo;
use log::{debug, info, warn};
use std::io;
use thiserror::Error;

/// Acknowledgement sent before the first record.
pub const DATA_ACK: &str = "3000 OK data\n";

/// Separator between volume names in a restore volume list.
pub const VOLUME_SEPARATOR: char = '|';

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no volume named for the session")]
    NoVolumes,
    #[error("volume `{volume}` rejected by catalog: {reason}")]
    VolumeRejected { volume: String, reason: String },
    #[error("cannot acquire volume `{volume}`: {source}")]
    Acquire {
        volume: String,
        #[source]
        source: DeviceError,
    },
    #[error("read error on volume `{volume}`: {source}")]
    Device {
        volume: String,
        #[source]
        source: DeviceError,
    },
    #[error("cannot close volume `{volume}`: {source}")]
    Close {
        volume: String,
        #[source]
        source: DeviceError,
    },
    #[error("cannot release device: {0}")]
    Release(#[source] DeviceError),
    #[error("error sending to consumer: {0}")]
    Send(#[source] io::Error),
    #[error("error sending record header: {0}")]
    SendHeader(#[source] io::Error),
    #[error("error sending record data: {0}")]
    SendData(#[source] io::Error),
    #[error("error signalling end of data: {0}")]
    EndOfData(#[source] io::Error),
    #[error("job cancelled")]
    Cancelled,
}

/// Where forwarded records go.
pub trait RecordSink {
    fn send(&mut self, message: &[u8]) -> io::Result<()>;

    fn end_of_data(&mut self) -> io::Result<()>;
}

/// Records every message, for consumers living in the same process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedStream {
    pub frames: Vec<StreamFrame>,
}

impl RecordSink for CapturedStream {
    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        self.frames.push(StreamFrame::Data(message.to_vec()));
        Ok(())
    }

    fn end_of_data(&mut self) -> io::Result<()> {
        self.frames.push(StreamFrame::EndOfData);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum VolumeLookupError {
    #[error("volume not found")]
    NotFound,
    #[error("volume not appropriate")]
    NotAppropriate,
    #[error("{0}")]
    Failed(String),
}

/// Catalog confirmation of a volume before it is mounted.
pub trait VolumeLookup {
    fn volume_for_read(&mut self, volume_name: &str) -> Result<VolumeInfo, VolumeLookupError>;
}

/// What a restore session wants streamed.
pub struct ReadJob {
    pub job_name: String,
    /// One or more volume names joined by [`VOLUME_SEPARATOR`].
    pub volumes: String,
    pub session_id: u32,
    pub session_time: u32,
    pub selector: Option<Box<dyn RestoreSelector>>,
    pub cancel: CancelToken,
}

impl ReadJob {
    pub fn new(
        job_name: impl Into<String>,
        volumes: impl Into<String>,
        session_id: u32,
        session_time: u32,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            volumes: volumes.into(),
            session_id,
            session_time,
            selector: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_selector(mut self, selector: impl RestoreSelector + 'static) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn volume_list(&self) -> Vec<&str> {
        self.volumes
            .split(VOLUME_SEPARATOR)
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub volumes_read: Vec<String>,
    pub records_forwarded: u64,
    pub bytes_forwarded: u64,
    pub records_skipped: u64,
    pub labels_seen: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Acquiring(usize),
    Streaming,
    AdvancingVolume,
    Draining,
    Done,
    Failed,
}

enum Step {
    Continue,
    EndOfVolume,
}

/// Streams one session's records from a device to a consumer.
pub struct RecordStreamer<'a> {
    device: &'a mut dyn Device,
    sink: &'a mut dyn RecordSink,
    lookup: Option<&'a mut dyn VolumeLookup>,
    state: StreamState,
    volume_header: Option<VolumeHeader>,
    session_label: Option<SessionLabel>,
}

impl<'a> RecordStreamer<'a> {
    pub fn new(device: &'a mut dyn Device, sink: &'a mut dyn RecordSink) -> Self {
        Self {
            device,
            sink,
            lookup: None,
            state: StreamState::Idle,
            volume_header: None,
            session_label: None,
        }
    }

    pub fn with_lookup(mut self, lookup: &'a mut dyn VolumeLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Runs the session to completion.
    ///
    /// End of data is signalled exactly once and the device released on
    /// every path; the first failure among streaming, signalling and
    /// releasing becomes the result.
    pub fn run(&mut self, job: &ReadJob) -> Result<ReadSummary, ReadError> {
        let mut summary = ReadSummary::default();
        let volumes = job.volume_list();
        debug!(
            "event=read_session_start job={} volumes={} session_id={} session_time={}",
            job.job_name,
            volumes.len(),
            job.session_id,
            job.session_time
        );
        let sink = &mut *self.sink;
        let lookup = self.lookup.as_deref_mut();
        let mut lease = DeviceLease::new(&mut *self.device);
        let mut session = Session {
            job,
            sink: &mut *sink,
            lookup,
            state: &mut self.state,
            volume_header: &mut self.volume_header,
            session_label: &mut self.session_label,
        };
        let streamed = session.stream(&mut lease, &volumes, &mut summary);
        let signalled = sink.end_of_data().map_err(ReadError::EndOfData);
        let released = lease.release().map_err(ReadError::Release);
        let outcome = streamed.and(signalled).and(released);
        self.state = if outcome.is_ok() {
            StreamState::Done
        } else {
            StreamState::Failed
        };
        match &outcome {
            Ok(()) => info!(
                "event=read_session_done job={} records={} bytes={} skipped={}",
                job.job_name,
                summary.records_forwarded,
                summary.bytes_forwarded,
                summary.records_skipped
            ),
            Err(err) => warn!(
                "event=read_session_failed job={} records={} error=\"{}\"",
                job.job_name, summary.records_forwarded, err
            ),
        }
        outcome.map(|()| summary)
    }
}

/// Borrowed state of one running session.
struct Session<'s, 'a> {
    job: &'s ReadJob,
    sink: &'s mut (dyn RecordSink + 'a),
    lookup: Option<&'s mut (dyn VolumeLookup + 'a)>,
    state: &'s mut StreamState,
    volume_header: &'s mut Option<VolumeHeader>,
    session_label: &'s mut Option<SessionLabel>,
}

impl Session<'_, '_> {
    fn stream(
        &mut self,
        device: &mut DeviceLease<'_>,
        volumes: &[&str],
        summary: &mut ReadSummary,
    ) -> Result<(), ReadError> {
        if volumes.is_empty() {
            return Err(ReadError::NoVolumes);
        }
        self.sink
            .send(DATA_ACK.as_bytes())
            .map_err(ReadError::Send)?;
        let mut record = DeviceRecord::default();
        let mut current = 0;
        *self.state = StreamState::Acquiring(0);
        loop {
            match *self.state {
                StreamState::Acquiring(index) => {
                    let volume = volumes[index];
                    self.acquire(device, volume)?;
                    summary.volumes_read.push(volume.to_string());
                    if index > 0 {
                        self.discard_leading_label(device, volume);
                    }
                    *self.state = StreamState::Streaming;
                }
                StreamState::Streaming => {
                    if self.job.cancel.is_cancelled() {
                        return Err(ReadError::Cancelled);
                    }
                    match self.step(device, volumes[current], &mut record, summary)? {
                        Step::Continue => {}
                        Step::EndOfVolume if current + 1 < volumes.len() => {
                            *self.state = StreamState::AdvancingVolume;
                        }
                        Step::EndOfVolume => *self.state = StreamState::Draining,
                    }
                }
                StreamState::AdvancingVolume => {
                    device.close().map_err(|source| ReadError::Close {
                        volume: volumes[current].to_string(),
                        source,
                    })?;
                    current += 1;
                    info!(
                        "event=read_next_volume job={} volume={} position={}/{}",
                        self.job.job_name,
                        volumes[current],
                        current + 1,
                        volumes.len()
                    );
                    *self.state = StreamState::Acquiring(current);
                }
                StreamState::Draining | StreamState::Idle | StreamState::Done | StreamState::Failed => {
                    return Ok(())
                }
            }
        }
    }

    fn acquire(&mut self, device: &mut DeviceLease<'_>, volume: &str) -> Result<(), ReadError> {
        if let Some(lookup) = self.lookup.as_deref_mut() {
            lookup
                .volume_for_read(volume)
                .map_err(|err| ReadError::VolumeRejected {
                    volume: volume.to_string(),
                    reason: err.to_string(),
                })?;
        }
        device
            .acquire_for_read(volume)
            .map_err(|source| ReadError::Acquire {
                volume: volume.to_string(),
                source,
            })
    }

    /// Reads the label at the start of a newly mounted volume into its own
    /// record, leaving any partially read data record untouched.
    fn discard_leading_label(&mut self, device: &mut DeviceLease<'_>, volume: &str) {
        let mut label = DeviceRecord::default();
        match device.read_record(&mut label) {
            Ok(()) => {
                if let Ok(header) = VolumeHeader::from_record(&label) {
                    *self.volume_header = Some(header);
                }
                debug!(
                    "event=read_label_discarded volume={} file_index={}",
                    volume, label.file_index
                );
            }
            Err(err) => warn!(
                "event=read_label_missing volume={} error=\"{}\"",
                volume, err
            ),
        }
    }

    fn step(
        &mut self,
        device: &mut DeviceLease<'_>,
        volume: &str,
        record: &mut DeviceRecord,
        summary: &mut ReadSummary,
    ) -> Result<Step, ReadError> {
        match device.read_record(record) {
            Ok(()) => {}
            Err(DeviceError::EndOfMedium) => {
                if !record.is_complete() {
                    debug!(
                        "event=read_record_spans_volume volume={} remainder={}",
                        volume, record.remainder
                    );
                }
                return Ok(Step::EndOfVolume);
            }
            Err(DeviceError::EndOfFile) => {
                debug!("event=read_end_of_file volume={}", volume);
                return Ok(Step::Continue);
            }
            Err(source) => {
                return Err(ReadError::Device {
                    volume: volume.to_string(),
                    source,
                })
            }
        }
        if !record.is_complete() {
            return Ok(Step::Continue);
        }
        if record.file_index < 0 {
            summary.labels_seen += 1;
            return Ok(self.handle_label(record, volume));
        }
        if !self.wanted(record) {
            summary.records_skipped += 1;
            return Ok(Step::Continue);
        }
        let header = RecordHeader::of(record).render();
        self.sink
            .send(header.as_bytes())
            .map_err(ReadError::SendHeader)?;
        self.sink.send(&record.data).map_err(ReadError::SendData)?;
        summary.records_forwarded += 1;
        summary.bytes_forwarded += record.data.len() as u64;
        Ok(Step::Continue)
    }

    fn handle_label(&mut self, record: &DeviceRecord, volume: &str) -> Step {
        let kind = record.label_kind();
        debug!(
            "event=read_label volume={} kind={} session_id={} session_time={} len={}",
            volume,
            kind.map_or("UNKNOWN", LabelKind::as_str),
            record.session_id,
            record.session_time,
            record.data.len()
        );
        match kind {
            Some(LabelKind::VolumeLabel) => match VolumeHeader::from_record(record) {
                Ok(header) => *self.volume_header = Some(header),
                Err(err) => warn!("event=read_label_invalid volume={} error=\"{}\"", volume, err),
            },
            Some(LabelKind::StartOfSession) => match SessionLabel::from_record(record) {
                Ok(label) => *self.session_label = Some(label),
                Err(err) => warn!("event=read_label_invalid volume={} error=\"{}\"", volume, err),
            },
            Some(LabelKind::EndOfMedia) => return Step::EndOfVolume,
            Some(LabelKind::PreLabel | LabelKind::EndOfSession) | None => {}
        }
        Step::Continue
    }

    fn wanted(&self, record: &DeviceRecord) -> bool {
        if let Some(selector) = &self.job.selector {
            if !selector.matches(
                record,
                self.volume_header.as_ref(),
                self.session_label.as_ref(),
            ) {
                return false;
            }
        }
        record.belongs_to(self.job.session_id, self.job.session_time)
    }
}
