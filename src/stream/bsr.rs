//! Restore selection: which records of a session a restore wants.

use super::label::{SessionLabel, VolumeHeader};
use super::record::DeviceRecord;
use std::ops::RangeInclusive;

pub trait RestoreSelector: Send {
    fn matches(
        &self,
        record: &DeviceRecord,
        volume: Option<&VolumeHeader>,
        session: Option<&SessionLabel>,
    ) -> bool;
}

impl<F> RestoreSelector for F
where
    F: Fn(&DeviceRecord, Option<&VolumeHeader>, Option<&SessionLabel>) -> bool + Send,
{
    fn matches(
        &self,
        record: &DeviceRecord,
        volume: Option<&VolumeHeader>,
        session: Option<&SessionLabel>,
    ) -> bool {
        self(record, volume, session)
    }
}

/// Conjunction of optional criteria; an empty criterion list matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapSelector {
    volumes: Vec<String>,
    job_names: Vec<String>,
    file_indexes: Vec<RangeInclusive<i32>>,
    streams: Vec<i32>,
}

impl BootstrapSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(mut self, name: impl Into<String>) -> Self {
        self.volumes.push(name.into());
        self
    }

    pub fn job(mut self, name: impl Into<String>) -> Self {
        self.job_names.push(name.into());
        self
    }

    pub fn file_indexes(mut self, range: RangeInclusive<i32>) -> Self {
        self.file_indexes.push(range);
        self
    }

    pub fn stream(mut self, stream: i32) -> Self {
        self.streams.push(stream);
        self
    }
}

impl RestoreSelector for BootstrapSelector {
    fn matches(
        &self,
        record: &DeviceRecord,
        volume: Option<&VolumeHeader>,
        session: Option<&SessionLabel>,
    ) -> bool {
        if !self.volumes.is_empty()
            && !volume.is_some_and(|header| self.volumes.contains(&header.volume_name))
        {
            return false;
        }
        if !self.job_names.is_empty()
            && !session.is_some_and(|label| self.job_names.contains(&label.job_name))
        {
            return false;
        }
        if !self.file_indexes.is_empty()
            && !self
                .file_indexes
                .iter()
                .any(|range| range.contains(&record.file_index))
        {
            return false;
        }
        self.streams.is_empty() || self.streams.contains(&record.stream)
    }
}
