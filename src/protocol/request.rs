use super::attributes::AttributeMessage;
use super::ProtocolError;
use crate::catalog::{JobMediaSpan, VolumeStatus, VolumeUsage};
use crate::edit::{escape_spaces, unescape_spaces, MAX_NAME_LENGTH};
use std::str::{FromStr, SplitWhitespace};

const REQUEST_KEYWORD: &str = "CatReq";
pub(crate) const UPDATE_KEYWORD: &str = "UpdCat";

/// A request expecting exactly one response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRequest {
    FindMedia {
        job: String,
        index: u32,
    },
    GetVolInfo {
        job: String,
        volume_name: String,
        write: bool,
    },
    UpdateMedia {
        job: String,
        usage: VolumeUsage,
    },
    CreateJobMedia {
        job: String,
        span: JobMediaSpan,
    },
}

/// Everything the storage daemon may send on a catalog connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Request(CatalogRequest),
    /// Unsolicited; produces no response.
    Attributes(AttributeMessage),
}

impl InboundMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.starts_with(UPDATE_KEYWORD.as_bytes()) {
            return AttributeMessage::decode(bytes)
                .map(InboundMessage::Attributes)
                .map_err(|err| ProtocolError::MalformedAttributes(Box::new(err)));
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::Unrecognized)?;
        CatalogRequest::parse(text).map(InboundMessage::Request)
    }

    pub fn job(&self) -> &str {
        match self {
            InboundMessage::Request(request) => request.job(),
            InboundMessage::Attributes(message) => &message.job,
        }
    }
}

impl CatalogRequest {
    pub fn job(&self) -> &str {
        match self {
            CatalogRequest::FindMedia { job, .. }
            | CatalogRequest::GetVolInfo { job, .. }
            | CatalogRequest::UpdateMedia { job, .. }
            | CatalogRequest::CreateJobMedia { job, .. } => job,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CatalogRequest::FindMedia { .. } => "FindMedia",
            CatalogRequest::GetVolInfo { .. } => "GetVolInfo",
            CatalogRequest::UpdateMedia { .. } => "UpdateMedia",
            CatalogRequest::CreateJobMedia { .. } => "CreateJobMedia",
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields = Fields::new(line);
        fields.keyword(REQUEST_KEYWORD)?;
        let job = fields.name("Job")?;
        let selector = fields.next_token()?;
        let request = if let Some(index) = selector.strip_prefix("FindMedia=") {
            CatalogRequest::FindMedia {
                job,
                index: parse_number("FindMedia", index)?,
            }
        } else {
            match selector {
                "GetVolInfo" => CatalogRequest::GetVolInfo {
                    job,
                    volume_name: unescape_spaces(&fields.name("VolName")?),
                    write: fields.flag("write")?,
                },
                "UpdateMedia" => CatalogRequest::UpdateMedia {
                    job,
                    usage: parse_usage(&mut fields)?,
                },
                "CreateJobMedia" => CatalogRequest::CreateJobMedia {
                    job,
                    span: JobMediaSpan {
                        first_index: fields.number("FirstIndex")?,
                        last_index: fields.number("LastIndex")?,
                        start_file: fields.number("StartFile")?,
                        end_file: fields.number("EndFile")?,
                        start_block: fields.number("StartBlock")?,
                        end_block: fields.number("EndBlock")?,
                    },
                },
                _ => return Err(ProtocolError::Unrecognized),
            }
        };
        fields.finish()?;
        Ok(request)
    }

    /// Renders the request line, newline included.
    pub fn render(&self) -> String {
        match self {
            CatalogRequest::FindMedia { job, index } => {
                format!("{REQUEST_KEYWORD} Job={job} FindMedia={index}\n")
            }
            CatalogRequest::GetVolInfo {
                job,
                volume_name,
                write,
            } => format!(
                "{REQUEST_KEYWORD} Job={job} GetVolInfo VolName={} write={}\n",
                escape_spaces(volume_name),
                u8::from(*write)
            ),
            CatalogRequest::UpdateMedia { job, usage } => format!(
                "{REQUEST_KEYWORD} Job={job} UpdateMedia VolName={} VolJobs={} VolFiles={} \
                 VolBlocks={} VolBytes={} VolMounts={} VolErrors={} VolWrites={} \
                 VolMaxBytes={} EndTime={} VolStatus={} Slot={} relabel={}\n",
                escape_spaces(&usage.volume_name),
                usage.vol_jobs,
                usage.vol_files,
                usage.vol_blocks,
                usage.vol_bytes,
                usage.vol_mounts,
                usage.vol_errors,
                usage.vol_writes,
                usage.vol_max_bytes,
                usage.end_time,
                usage.status,
                usage.slot,
                u8::from(usage.relabel)
            ),
            CatalogRequest::CreateJobMedia { job, span } => format!(
                "{REQUEST_KEYWORD} Job={job} CreateJobMedia FirstIndex={} LastIndex={} \
                 StartFile={} EndFile={} StartBlock={} EndBlock={}\n",
                span.first_index,
                span.last_index,
                span.start_file,
                span.end_file,
                span.start_block,
                span.end_block
            ),
        }
    }
}

fn parse_usage(fields: &mut Fields<'_>) -> Result<VolumeUsage, ProtocolError> {
    Ok(VolumeUsage {
        volume_name: unescape_spaces(&fields.name("VolName")?),
        vol_jobs: fields.number("VolJobs")?,
        vol_files: fields.number("VolFiles")?,
        vol_blocks: fields.number("VolBlocks")?,
        vol_bytes: fields.number("VolBytes")?,
        vol_mounts: fields.number("VolMounts")?,
        vol_errors: fields.number("VolErrors")?,
        vol_writes: fields.number("VolWrites")?,
        vol_max_bytes: fields.number("VolMaxBytes")?,
        end_time: fields.number("EndTime")?,
        status: VolumeStatus::from_str(fields.value("VolStatus")?)?,
        slot: fields.number("Slot")?,
        relabel: fields.flag("relabel")?,
    })
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Whitespace tokenizer for `key=value` request lines.
pub(crate) struct Fields<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        Self {
            tokens: line.split_whitespace(),
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<&'a str, ProtocolError> {
        self.tokens.next().ok_or(ProtocolError::Unrecognized)
    }

    pub(crate) fn keyword(&mut self, expected: &str) -> Result<(), ProtocolError> {
        if self.next_token()? == expected {
            Ok(())
        } else {
            Err(ProtocolError::Unrecognized)
        }
    }

    pub(crate) fn value(&mut self, key: &'static str) -> Result<&'a str, ProtocolError> {
        let token = self
            .tokens
            .next()
            .ok_or(ProtocolError::MissingField { field: key })?;
        match token.split_once('=') {
            Some((name, value)) if name == key => Ok(value),
            _ => Err(ProtocolError::MissingField { field: key }),
        }
    }

    /// A bounded name value, rejected rather than truncated when too long.
    pub(crate) fn name(&mut self, key: &'static str) -> Result<String, ProtocolError> {
        let value = self.value(key)?;
        if value.len() >= MAX_NAME_LENGTH {
            return Err(ProtocolError::FieldTooLong {
                field: key,
                len: value.len(),
                max: MAX_NAME_LENGTH - 1,
            });
        }
        Ok(value.to_string())
    }

    pub(crate) fn number<T: FromStr>(&mut self, key: &'static str) -> Result<T, ProtocolError> {
        parse_number(key, self.value(key)?)
    }

    pub(crate) fn flag(&mut self, key: &'static str) -> Result<bool, ProtocolError> {
        Ok(self.number::<i32>(key)? != 0)
    }

    pub(crate) fn finish(mut self) -> Result<(), ProtocolError> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(ProtocolError::TrailingText(extra.to_string())),
        }
    }
}
