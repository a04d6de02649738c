//! Catalog request dispatch for one job.
//!
//! Every request line gets exactly one response; attribute messages get
//! none. Malformed input is answered with an "invalid request" line and never
//! ends the conversation.

use crate::catalog::{FileAttributesRecord, JobMediaSpan};
use crate::daemon::DaemonContext;
use crate::job::JobContext;
use crate::protocol::{
    AttributeMessage, AttributePayload, CatalogRequest, CatalogResponse, InboundMessage,
    VolumeInfo,
};
use crate::retirement::VolumeRetirement;
use crate::selection::{Selection, VolumeEligibility, VolumeSelector};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, warn};

pub struct CatalogDispatcher {
    context: DaemonContext,
}

impl CatalogDispatcher {
    pub fn new(context: DaemonContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &DaemonContext {
        &self.context
    }

    fn selector(&self) -> VolumeSelector<'_> {
        VolumeSelector::new(self.context.store.as_ref(), self.context.messages.as_ref())
    }

    /// Handles one raw message, returning the response to send, if any.
    pub fn handle_message(
        &self,
        job: &mut JobContext,
        raw: &[u8],
        now: u64,
    ) -> Option<CatalogResponse> {
        match InboundMessage::parse(raw) {
            Ok(InboundMessage::Request(request)) => Some(self.handle_request(job, request, now)),
            Ok(InboundMessage::Attributes(message)) => {
                self.ingest_attributes(job, message);
                None
            }
            Err(err) if !err.expects_reply() => {
                warn!(
                    "event=catalog_attributes_invalid job={} error=\"{}\"",
                    job.job_name, err
                );
                None
            }
            Err(err) => {
                warn!(
                    "event=catalog_request_invalid job={} error=\"{}\"",
                    job.job_name, err
                );
                Some(CatalogResponse::invalid(raw))
            }
        }
    }

    pub fn handle_request(
        &self,
        job: &mut JobContext,
        request: CatalogRequest,
        now: u64,
    ) -> CatalogResponse {
        debug!(
            "event=catalog_request job={} kind={}",
            job.job_name,
            request.kind()
        );
        match request {
            CatalogRequest::FindMedia { index, .. } => {
                match self.selector().select_for_append(job, index, now) {
                    Ok(Selection::Selected(volume)) => {
                        CatalogResponse::Volume(VolumeInfo::from(&volume))
                    }
                    Ok(Selection::NoMedia(reason)) => {
                        debug!(
                            "event=find_media_empty job={} reason={:?}",
                            job.job_name, reason
                        );
                        CatalogResponse::NoMedia
                    }
                    Err(err) => {
                        self.report_error(job, format!("Catalog error finding next volume: {err}"));
                        CatalogResponse::NoMedia
                    }
                }
            }
            CatalogRequest::GetVolInfo {
                volume_name, write, ..
            } => match self.selector().lookup_volume(job, &volume_name, write) {
                Ok(VolumeEligibility::Eligible(volume)) => {
                    CatalogResponse::Volume(VolumeInfo::from(&volume))
                }
                Ok(VolumeEligibility::NotFound) => CatalogResponse::VolumeNotFound,
                Ok(VolumeEligibility::NotAppropriate(_)) => CatalogResponse::VolumeNotAppropriate,
                Err(err) => {
                    self.report_error(
                        job,
                        format!("Catalog error looking up Volume \"{volume_name}\": {err}"),
                    );
                    CatalogResponse::VolumeNotFound
                }
            },
            CatalogRequest::UpdateMedia { usage, .. } => {
                let retirement = VolumeRetirement::new(
                    self.context.store.as_ref(),
                    self.context.messages.as_ref(),
                );
                match retirement.apply(job, usage, now) {
                    Ok(_) => CatalogResponse::Updated,
                    Err(err) => {
                        self.report_error(job, format!("Catalog error updating Media record. {err}"));
                        CatalogResponse::UpdateMediaError
                    }
                }
            }
            CatalogRequest::CreateJobMedia { span, .. } => self.record_job_media(job, span),
        }
    }

    /// Appends one position record for the job's current volume.
    pub fn record_job_media(&self, job: &mut JobContext, span: JobMediaSpan) -> CatalogResponse {
        let record = span.into_record(job.job_id, job.media_id);
        match self.context.store.create_job_media(&record) {
            Ok(id) => {
                debug!(
                    "event=job_media_recorded job={} media_id={} job_media_id={}",
                    job.job_name, job.media_id, id
                );
                CatalogResponse::Updated
            }
            Err(err) => {
                self.report_error(job, format!("Catalog error creating JobMedia record. {err}"));
                CatalogResponse::JobMediaError
            }
        }
    }

    /// Stores file attributes and digests sent by the storage daemon.
    pub fn ingest_attributes(&self, job: &mut JobContext, message: AttributeMessage) {
        if !job.pool.catalog_files {
            return;
        }
        let store = self.context.store.as_ref();
        if !job.transaction_open {
            match store.begin_transaction(job.job_id) {
                Ok(()) => job.transaction_open = true,
                Err(err) => {
                    self.report_error(job, format!("Catalog error starting transaction. {err}"));
                    return;
                }
            }
        }
        let header = message.header;
        match message.payload {
            AttributePayload::Attributes {
                fname, attributes, ..
            } => {
                let record = FileAttributesRecord {
                    file_id: 0,
                    job_id: job.job_id,
                    file_index: header.file_index,
                    stream: header.stream,
                    fname,
                    attributes,
                    digest: None,
                };
                match store.create_file_attributes(&record) {
                    Ok(file_id) => {
                        job.file_id = file_id;
                        job.file_index = header.file_index;
                    }
                    Err(err) => {
                        job.error_count += 1;
                        self.context
                            .messages
                            .fatal(&job.job_name, format!("Attribute create error. {err}"));
                    }
                }
            }
            AttributePayload::Digest(digest) => {
                if job.file_index != header.file_index {
                    self.context.messages.warning(
                        &job.job_name,
                        "Got MD5 but not same File as attributes".to_string(),
                    );
                    return;
                }
                let encoded = STANDARD.encode(digest);
                if let Err(err) = store.add_file_digest(job.file_id, &encoded) {
                    self.report_error(job, format!("Catalog error updating MD5. {err}"));
                }
            }
            AttributePayload::Other(body) => {
                debug!(
                    "event=attributes_ignored job={} stream={} len={}",
                    job.job_name,
                    header.stream,
                    body.len()
                );
            }
        }
    }

    /// Commits the job's open transaction and releases its volume claims.
    pub fn finish_job(&self, job: &mut JobContext) {
        if job.transaction_open {
            job.transaction_open = false;
            if let Err(err) = self.context.store.commit_transaction(job.job_id) {
                self.report_error(job, format!("Catalog error committing attributes. {err}"));
            }
        }
        self.context.store.release_claims(job.job_id);
    }

    fn report_error(&self, job: &mut JobContext, text: String) {
        job.error_count += 1;
        self.context.messages.error(&job.job_name, text);
    }
}
