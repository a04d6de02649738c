use super::stream_support::{
    file_data, split_head, split_tail, volume, volume_label, session_label, SESSION_ID,
    SESSION_TIME,
};
use std::collections::VecDeque;
use volstream::catalog::VolumeRecord;
use volstream::job::CancelToken;
use volstream::protocol::VolumeInfo;
use volstream::stream::record::LabelKind;
use volstream::stream::{
    BootstrapSelector, CapturedStream, MemoryDevice, ReadError, ReadJob, RecordStreamReader,
    RecordStreamer, StreamFrame, StreamState, VolumeLookup, VolumeLookupError, DATA_ACK,
};

fn three_volume_device() -> MemoryDevice {
    MemoryDevice::new("FileStorage")
        .with_volume("A", volume("A", vec![file_data(1, b"alpha"), file_data(2, b"beta")]))
        .with_volume("B", volume("B", vec![file_data(3, b"gamma")]))
        .with_volume("C", volume("C", vec![file_data(4, b"delta"), file_data(5, b"")]))
}

fn end_of_data_count(stream: &CapturedStream) -> usize {
    stream
        .frames
        .iter()
        .filter(|frame| **frame == StreamFrame::EndOfData)
        .count()
}

#[test]
fn three_volumes_stream_in_order_with_one_end_of_data() {
    let mut device = three_volume_device();
    let activity = device.activity();
    let mut sink = CapturedStream::default();
    let job = ReadJob::new("restore.9", "A|B|C", SESSION_ID, SESSION_TIME);

    let mut streamer = RecordStreamer::new(&mut device, &mut sink);
    let summary = streamer.run(&job).unwrap();
    assert_eq!(streamer.state(), StreamState::Done);

    assert_eq!(summary.volumes_read, vec!["A", "B", "C"]);
    assert_eq!(summary.records_forwarded, 5);
    assert_eq!(summary.bytes_forwarded, 19);
    assert_eq!(end_of_data_count(&sink), 1);
    assert_eq!(sink.frames.first(), Some(&StreamFrame::Data(DATA_ACK.as_bytes().to_vec())));
    assert_eq!(sink.frames.last(), Some(&StreamFrame::EndOfData));

    let activity = activity.lock();
    assert_eq!(activity.acquired, vec!["A", "B", "C"]);
    assert_eq!(activity.closes, 2);
    assert_eq!(activity.releases, 1);
    drop(activity);

    let frames: VecDeque<_> = sink.frames.into_iter().collect();
    let records = RecordStreamReader::new(frames).read_all().unwrap();
    let indexes: Vec<i32> = records.iter().map(|record| record.file_index).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
    assert_eq!(records[2].data, b"gamma");
    assert!(records[4].data.is_empty());
}

#[test]
fn record_spanning_a_volume_boundary_arrives_whole() {
    let payload = b"0123456789";
    let mut device = MemoryDevice::new("FileStorage")
        .with_volume(
            "A",
            vec![
                volume_label("A"),
                session_label(LabelKind::StartOfSession),
                file_data(1, b"first"),
                split_head(2, payload, 4),
            ],
        )
        .with_volume(
            "B",
            vec![
                volume_label("B"),
                split_tail(payload, 4),
                file_data(3, b"last"),
                session_label(LabelKind::EndOfSession),
            ],
        );
    let mut sink = CapturedStream::default();
    let summary = RecordStreamer::new(&mut device, &mut sink)
        .run(&ReadJob::new("restore.9", "A|B", SESSION_ID, SESSION_TIME))
        .unwrap();

    assert_eq!(summary.records_forwarded, 3);
    let frames: VecDeque<_> = sink.frames.into_iter().collect();
    let records = RecordStreamReader::new(frames).read_all().unwrap();
    assert_eq!(records[1].file_index, 2);
    assert_eq!(records[1].data, payload);
    assert_eq!(records[2].data, b"last");
}

#[test]
fn selector_limits_forwarded_records() {
    let mut device = three_volume_device();
    let mut sink = CapturedStream::default();
    let job = ReadJob::new("restore.9", "A|B|C", SESSION_ID, SESSION_TIME)
        .with_selector(BootstrapSelector::new().volume("B").volume("C").file_indexes(3..=4));
    let summary = RecordStreamer::new(&mut device, &mut sink).run(&job).unwrap();

    assert_eq!(summary.records_forwarded, 2);
    assert_eq!(summary.records_skipped, 3);
    assert_eq!(end_of_data_count(&sink), 1);
}

#[test]
fn failed_mount_mid_list_still_ends_the_stream() {
    let mut device = three_volume_device().failing_acquire("B");
    let activity = device.activity();
    let mut sink = CapturedStream::default();
    let mut streamer = RecordStreamer::new(&mut device, &mut sink);
    let err = streamer
        .run(&ReadJob::new("restore.9", "A|B|C", SESSION_ID, SESSION_TIME))
        .unwrap_err();
    assert_eq!(streamer.state(), StreamState::Failed);

    assert!(matches!(err, ReadError::Acquire { ref volume, .. } if volume == "B"));
    assert_eq!(end_of_data_count(&sink), 1);
    assert_eq!(activity.lock().releases, 1);
    assert_eq!(activity.lock().acquired, vec!["A", "B"]);
}

struct RejectVolume(&'static str);

impl VolumeLookup for RejectVolume {
    fn volume_for_read(&mut self, volume_name: &str) -> Result<VolumeInfo, VolumeLookupError> {
        if volume_name == self.0 {
            Err(VolumeLookupError::NotFound)
        } else {
            Ok(VolumeInfo::from(&VolumeRecord::new(volume_name, 1, "File")))
        }
    }
}

#[test]
fn catalog_rejection_stops_before_mounting() {
    let mut device = three_volume_device();
    let activity = device.activity();
    let mut sink = CapturedStream::default();
    let mut lookup = RejectVolume("C");
    let err = RecordStreamer::new(&mut device, &mut sink)
        .with_lookup(&mut lookup)
        .run(&ReadJob::new("restore.9", "A|B|C", SESSION_ID, SESSION_TIME))
        .unwrap_err();

    assert!(matches!(err, ReadError::VolumeRejected { ref volume, .. } if volume == "C"));
    assert_eq!(activity.lock().acquired, vec!["A", "B"]);
    assert_eq!(end_of_data_count(&sink), 1);
}

#[test]
fn cancelled_session_still_signals_end_of_data() {
    let mut device = three_volume_device();
    let activity = device.activity();
    let mut sink = CapturedStream::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let job = ReadJob::new("restore.9", "A|B|C", SESSION_ID, SESSION_TIME).with_cancel(cancel);
    let err = RecordStreamer::new(&mut device, &mut sink).run(&job).unwrap_err();

    assert!(matches!(err, ReadError::Cancelled));
    assert_eq!(
        sink.frames,
        vec![
            StreamFrame::Data(DATA_ACK.as_bytes().to_vec()),
            StreamFrame::EndOfData,
        ]
    );
    assert_eq!(activity.lock().releases, 1);
}
