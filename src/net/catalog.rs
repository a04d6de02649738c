//! Catalog conversation over TCP.
//!
//! The server side binds each connection to the job named in its first
//! valid message and hands every message to the [`CatalogDispatcher`]. The
//! client side is what a storage daemon uses to ask for volumes and report
//! usage.

use super::frame::{Frame, FrameError, MessageChannel, Signal};
use super::server::{spawn_listener, ServerHandle, SERVER_SHUTDOWN_GRACE};
use super::NetError;
use crate::catalog::{JobMediaSpan, VolumeUsage};
use crate::dispatcher::CatalogDispatcher;
use crate::job::{JobRegistry, SharedJob};
use crate::protocol::{
    AttributeHeader, AttributeMessage, AttributePayload, CatalogRequest, CatalogResponse,
    InboundMessage, ProtocolError, VolumeInfo,
};
use crate::stream::{VolumeLookup, VolumeLookupError};
use crate::util::{unix_now, RetryPolicy};
use log::{debug, info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const SERVER_NAME: &str = "catalog";

#[derive(Debug, Clone)]
pub struct CatalogServerConfig {
    pub bind: SocketAddr,
    pub max_connections: Option<usize>,
    /// Applied to reads and writes on every accepted connection.
    pub io_timeout: Option<Duration>,
}

impl CatalogServerConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            max_connections: None,
            io_timeout: None,
        }
    }
}

pub struct CatalogServer;

impl CatalogServer {
    pub fn spawn(
        config: CatalogServerConfig,
        dispatcher: Arc<CatalogDispatcher>,
        jobs: Arc<JobRegistry>,
    ) -> Result<CatalogServerHandle, NetError> {
        let listener = TcpListener::bind(config.bind)?;
        let io_timeout = config.io_timeout;
        let inner = spawn_listener(
            SERVER_NAME,
            listener,
            config.max_connections,
            move |stream, addr, shutdown| {
                serve_connection(stream, addr, &shutdown, &dispatcher, &jobs, io_timeout)
            },
        )?;
        Ok(CatalogServerHandle { inner })
    }
}

pub struct CatalogServerHandle {
    inner: ServerHandle,
}

impl CatalogServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn active_connections(&self) -> usize {
        self.inner.active_connections()
    }

    pub fn shutdown(mut self) -> Result<(), NetError> {
        self.inner.try_shutdown(SERVER_SHUTDOWN_GRACE)
    }
}

fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shutdown: &AtomicBool,
    dispatcher: &CatalogDispatcher,
    jobs: &JobRegistry,
    io_timeout: Option<Duration>,
) -> Result<(), NetError> {
    stream.set_read_timeout(io_timeout)?;
    stream.set_write_timeout(io_timeout)?;
    stream.set_nodelay(true)?;
    let mut channel = MessageChannel::new(stream);
    let mut bound: Option<SharedJob> = None;
    let outcome = converse(&mut channel, addr, shutdown, dispatcher, jobs, &mut bound);
    if let Some(job) = bound {
        let mut job = job.lock();
        dispatcher.finish_job(&mut job);
        info!(
            "event=catalog_session_closed job={} addr={} errors={}",
            job.job_name, addr, job.error_count
        );
    }
    outcome
}

fn converse(
    channel: &mut MessageChannel<TcpStream>,
    addr: SocketAddr,
    shutdown: &AtomicBool,
    dispatcher: &CatalogDispatcher,
    jobs: &JobRegistry,
    bound: &mut Option<SharedJob>,
) -> Result<(), NetError> {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }
        let raw = match channel.recv() {
            Ok(Frame::Message(raw)) => raw,
            Ok(Frame::Signal(Signal::Terminate)) | Err(FrameError::Closed) => return Ok(()),
            Ok(Frame::Signal(signal)) => {
                debug!("event=catalog_signal_ignored addr={addr} code={}", signal.code());
                continue;
            }
            Err(FrameError::Io(_)) if shutdown.load(Ordering::Relaxed) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let job = match bound.clone() {
            Some(job) => job,
            None => match identify_job(&raw, jobs) {
                Ok(job) => {
                    info!(
                        "event=catalog_session_bound job={} addr={addr}",
                        job.lock().job_name
                    );
                    *bound = Some(job.clone());
                    job
                }
                Err(reply) => {
                    if let Some(reply) = reply {
                        channel.send_text(&reply.render())?;
                    }
                    continue;
                }
            },
        };
        let reply = {
            let mut job = job.lock();
            dispatcher.handle_message(&mut job, &raw, unix_now())
        };
        if let Some(reply) = reply {
            channel.send_text(&reply.render())?;
        }
    }
}

/// Finds the job a connection's first message names. On failure returns
/// the reply to send, if the message expects one.
fn identify_job(raw: &[u8], jobs: &JobRegistry) -> Result<SharedJob, Option<CatalogResponse>> {
    match InboundMessage::parse(raw) {
        Ok(message) => match jobs.get(message.job()) {
            Some(job) => Ok(job),
            None => {
                warn!("event=catalog_unknown_job job={}", message.job());
                match message {
                    InboundMessage::Request(_) => Err(Some(CatalogResponse::invalid(raw))),
                    InboundMessage::Attributes(_) => Err(None),
                }
            }
        },
        Err(err) if !err.expects_reply() => {
            warn!("event=catalog_attributes_invalid job=unbound error=\"{err}\"");
            Err(None)
        }
        Err(err) => {
            warn!("event=catalog_request_invalid job=unbound error=\"{err}\"");
            Err(Some(CatalogResponse::invalid(raw)))
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogClientError {
    #[error("no appendable volume available")]
    NoMedia,
    #[error("volume not found")]
    NotFound,
    #[error("volume not appropriate")]
    NotAppropriate,
    #[error("catalog failed to update the media record")]
    UpdateFailed,
    #[error("catalog failed to record the job media span")]
    JobMediaFailed,
    #[error("catalog rejected the request: {0}")]
    Invalid(String),
    #[error("unexpected catalog reply `{0}`")]
    Unexpected(String),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<FrameError> for CatalogClientError {
    fn from(err: FrameError) -> Self {
        CatalogClientError::Net(NetError::Frame(err))
    }
}

impl From<CatalogResponse> for CatalogClientError {
    fn from(response: CatalogResponse) -> Self {
        match response {
            CatalogResponse::NoMedia => CatalogClientError::NoMedia,
            CatalogResponse::VolumeNotFound => CatalogClientError::NotFound,
            CatalogResponse::VolumeNotAppropriate => CatalogClientError::NotAppropriate,
            CatalogResponse::UpdateMediaError => CatalogClientError::UpdateFailed,
            CatalogResponse::JobMediaError => CatalogClientError::JobMediaFailed,
            CatalogResponse::Invalid(text) => CatalogClientError::Invalid(text),
            other => CatalogClientError::Unexpected(other.render().trim_end().to_string()),
        }
    }
}

/// Storage-side connection to the catalog daemon for one job.
pub struct CatalogClient {
    channel: MessageChannel<TcpStream>,
    job_name: String,
}

impl CatalogClient {
    /// Connects, retrying on `policy`'s schedule.
    pub fn connect(
        addr: SocketAddr,
        job_name: impl Into<String>,
        policy: &RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, CatalogClientError> {
        let job_name = job_name.into();
        let mut retry = policy.handle();
        let channel = loop {
            match MessageChannel::connect(addr, timeout) {
                Ok(channel) => break channel,
                Err(err) => match retry.next_delay() {
                    Some(delay) => {
                        warn!(
                            "event=catalog_connect_retry addr={addr} attempt={} delay_ms={} error={err}",
                            retry.attempts(),
                            delay.as_millis()
                        );
                        thread::sleep(delay);
                    }
                    None => return Err(NetError::Io(err).into()),
                },
            }
        };
        channel.get_ref().set_read_timeout(Some(timeout)).map_err(NetError::Io)?;
        debug!("event=catalog_connected addr={addr} job={job_name}");
        Ok(Self { channel, job_name })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Sends `text` as-is and parses the reply.
    pub fn raw_request(&mut self, text: &str) -> Result<CatalogResponse, CatalogClientError> {
        self.channel.send_text(text)?;
        match self.channel.recv()? {
            Frame::Message(reply) => Ok(CatalogResponse::parse(&String::from_utf8_lossy(&reply))?),
            Frame::Signal(signal) => Err(CatalogClientError::Unexpected(format!(
                "signal {}",
                signal.code()
            ))),
        }
    }

    fn request(&mut self, request: CatalogRequest) -> Result<CatalogResponse, CatalogClientError> {
        self.raw_request(&request.render())
    }

    fn expect_volume(response: CatalogResponse) -> Result<VolumeInfo, CatalogClientError> {
        match response {
            CatalogResponse::Volume(info) => Ok(info),
            other => Err(other.into()),
        }
    }

    fn expect_updated(response: CatalogResponse) -> Result<(), CatalogClientError> {
        match response {
            CatalogResponse::Updated => Ok(()),
            other => Err(other.into()),
        }
    }

    /// Asks for the next appendable volume.
    pub fn find_media(&mut self, index: u32) -> Result<VolumeInfo, CatalogClientError> {
        let response = self.request(CatalogRequest::FindMedia {
            job: self.job_name.clone(),
            index,
        })?;
        Self::expect_volume(response)
    }

    pub fn volume_info(
        &mut self,
        volume_name: &str,
        write: bool,
    ) -> Result<VolumeInfo, CatalogClientError> {
        let response = self.request(CatalogRequest::GetVolInfo {
            job: self.job_name.clone(),
            volume_name: volume_name.to_string(),
            write,
        })?;
        Self::expect_volume(response)
    }

    pub fn update_media(&mut self, usage: VolumeUsage) -> Result<(), CatalogClientError> {
        let response = self.request(CatalogRequest::UpdateMedia {
            job: self.job_name.clone(),
            usage,
        })?;
        Self::expect_updated(response)
    }

    pub fn create_job_media(&mut self, span: JobMediaSpan) -> Result<(), CatalogClientError> {
        let response = self.request(CatalogRequest::CreateJobMedia {
            job: self.job_name.clone(),
            span,
        })?;
        Self::expect_updated(response)
    }

    /// Sends one attribute or digest message; the catalog does not reply.
    pub fn send_attributes(
        &mut self,
        header: AttributeHeader,
        payload: AttributePayload,
    ) -> Result<(), CatalogClientError> {
        let message = AttributeMessage {
            job: self.job_name.clone(),
            header,
            payload,
        };
        self.channel.send(&message.encode())?;
        Ok(())
    }

    /// Ends the session so the catalog commits the job's attributes.
    pub fn close(mut self) -> Result<(), CatalogClientError> {
        self.channel.signal(Signal::Terminate)?;
        Ok(())
    }
}

impl VolumeLookup for CatalogClient {
    fn volume_for_read(&mut self, volume_name: &str) -> Result<VolumeInfo, VolumeLookupError> {
        self.volume_info(volume_name, false).map_err(|err| match err {
            CatalogClientError::NotFound => VolumeLookupError::NotFound,
            CatalogClientError::NotAppropriate => VolumeLookupError::NotAppropriate,
            other => VolumeLookupError::Failed(other.to_string()),
        })
    }
}
