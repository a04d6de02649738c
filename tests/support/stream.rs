#![allow(dead_code)]

use volstream::stream::label::{SessionLabel, VolumeHeader};
use volstream::stream::record::{streams, DeviceRecord, LabelKind};
use volstream::stream::MediumItem;

pub const SESSION_ID: u32 = 7;
pub const SESSION_TIME: u32 = 1_700_000_000;

pub fn volume_label(name: &str) -> MediumItem {
    MediumItem::Record(
        VolumeHeader {
            volume_name: name.into(),
            pool_name: "Default".into(),
            media_type: "File".into(),
            label_time: 1_000,
            ..VolumeHeader::default()
        }
        .to_record(),
    )
}

pub fn session_label(kind: LabelKind) -> MediumItem {
    MediumItem::Record(
        SessionLabel {
            job_id: 3,
            job_name: "nightly.3".into(),
            client_name: "client-fd".into(),
            pool_name: "Default".into(),
            write_time: 1_000,
        }
        .to_record(kind, SESSION_ID, SESSION_TIME),
    )
}

pub fn file_data(file_index: i32, bytes: &[u8]) -> MediumItem {
    MediumItem::Record(data_record(file_index, bytes))
}

pub fn data_record(file_index: i32, bytes: &[u8]) -> DeviceRecord {
    DeviceRecord::new(
        SESSION_ID,
        SESSION_TIME,
        file_index,
        streams::FILE_DATA,
        bytes.to_vec(),
    )
}

/// First `head` bytes of a record whose tail continues elsewhere.
pub fn split_head(file_index: i32, bytes: &[u8], head: usize) -> MediumItem {
    let mut record = data_record(file_index, &bytes[..head]);
    record.remainder = (bytes.len() - head) as u32;
    MediumItem::Record(record)
}

pub fn split_tail(bytes: &[u8], head: usize) -> MediumItem {
    MediumItem::Continuation {
        data: bytes[head..].to_vec(),
        remainder: 0,
    }
}

/// A complete volume: label, session start, the given items, session end.
pub fn volume(name: &str, body: Vec<MediumItem>) -> Vec<MediumItem> {
    let mut items = vec![volume_label(name), session_label(LabelKind::StartOfSession)];
    items.extend(body);
    items.push(session_label(LabelKind::EndOfSession));
    items
}
