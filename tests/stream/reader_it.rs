use super::stream_support::{volume, SESSION_ID, SESSION_TIME};
use std::collections::VecDeque;
use volstream::stream::record::streams;
use volstream::stream::{
    CapturedStream, DeviceRecord, MediumItem, MemoryDevice, ReadJob, RecordStreamReader,
    RecordStreamer, StreamDecodeError, StreamFrame,
};

fn record(file_index: i32, stream: i32, data: &[u8]) -> MediumItem {
    MediumItem::Record(DeviceRecord::new(
        SESSION_ID,
        SESSION_TIME,
        file_index,
        stream,
        data.to_vec(),
    ))
}

fn captured_file() -> CapturedStream {
    let mut device = MemoryDevice::new("FileStorage").with_volume(
        "A",
        volume(
            "A",
            vec![
                record(1, streams::UNIX_ATTRIBUTES, b"0 0 100644 /etc/hosts"),
                record(1, streams::FILE_DATA, b"127.0.0.1 localhost\n"),
                record(1, streams::MD5_DIGEST, &[0xAB; 16]),
            ],
        ),
    );
    let mut sink = CapturedStream::default();
    RecordStreamer::new(&mut device, &mut sink)
        .run(&ReadJob::new("restore.2", "A", SESSION_ID, SESSION_TIME))
        .unwrap();
    sink
}

#[test]
fn decoded_records_keep_stream_and_session() {
    let frames: VecDeque<_> = captured_file().frames.into_iter().collect();
    let mut reader = RecordStreamReader::new(frames);
    let records = reader.read_all().unwrap();
    assert!(reader.is_finished());

    let kinds: Vec<i32> = records.iter().map(|record| record.stream).collect();
    assert_eq!(
        kinds,
        vec![streams::UNIX_ATTRIBUTES, streams::FILE_DATA, streams::MD5_DIGEST]
    );
    assert!(records
        .iter()
        .all(|record| record.belongs_to(SESSION_ID, SESSION_TIME) && record.file_index == 1));
    assert_eq!(records[2].data, vec![0xAB; 16]);
}

#[test]
fn payload_shorter_than_its_header_is_reported() {
    let mut frames: VecDeque<_> = captured_file().frames.into_iter().collect();
    // ack, attributes header, attributes payload
    frames[2] = StreamFrame::Data(b"0 0 100644".to_vec());
    let err = RecordStreamReader::new(frames).read_all().unwrap_err();
    assert!(matches!(
        err,
        StreamDecodeError::LengthMismatch {
            expected: 21,
            actual: 10
        }
    ));
}

#[test]
fn missing_acknowledgement_is_reported() {
    let frames: VecDeque<_> = captured_file().frames.into_iter().skip(1).collect();
    let err = RecordStreamReader::new(frames).read_all().unwrap_err();
    assert!(matches!(err, StreamDecodeError::MissingAcknowledgement(ref line) if line.starts_with("rechdr")));
}

#[test]
fn stream_cut_after_a_header_is_truncated() {
    let mut frames: VecDeque<_> = captured_file().frames.into_iter().take(2).collect();
    frames.push_back(StreamFrame::EndOfData);
    let err = RecordStreamReader::new(frames).read_all().unwrap_err();
    assert!(matches!(err, StreamDecodeError::TruncatedRecord));
}
