use super::catalog_support::CatalogFixture;
use super::net_support::{eventually, RunningCatalog, IO_TIMEOUT};
use volstream::catalog::{CatalogStore, JobMediaSpan, VolumeStatus, VolumeUsage};
use volstream::config::DaemonConfig;
use volstream::daemon::Daemon;
use volstream::job::JobKind;
use volstream::net::{CatalogClient, CatalogClientError, Frame, MessageChannel, NetError};
use volstream::protocol::{AttributeHeader, AttributePayload, CatalogResponse};
use volstream::stream::record::streams;
use volstream::util::{RetryPolicy, VolstreamError};

fn header(file_index: i32, stream: i32) -> AttributeHeader {
    AttributeHeader {
        session_id: 7,
        session_time: 1_700_000_000,
        file_index,
        stream,
    }
}

#[test]
fn backup_session_is_recorded_and_committed_on_close() {
    let running = RunningCatalog::start(
        CatalogFixture::with_volumes(&["Vol0001"]),
        &[(1, JobKind::Backup)],
    );
    let catalog = running.fixture.catalog.clone();
    let mut client = running.client("nightly.1");

    let info = client.find_media(1).unwrap();
    assert_eq!(info.volume_name, "Vol0001");
    let media_id = running.fixture.volume("Vol0001").media_id;

    client
        .update_media(VolumeUsage {
            volume_name: "Vol0001".into(),
            vol_jobs: 1,
            vol_files: 1,
            vol_bytes: 4096,
            end_time: 1_700_000_100,
            status: VolumeStatus::Append,
            ..VolumeUsage::default()
        })
        .unwrap();
    client
        .create_job_media(JobMediaSpan {
            first_index: 1,
            last_index: 2,
            end_block: 63,
            ..JobMediaSpan::default()
        })
        .unwrap();
    client
        .send_attributes(
            header(1, streams::UNIX_ATTRIBUTES),
            AttributePayload::Attributes {
                file_type: 3,
                fname: "/etc/hosts".into(),
                attributes: "P0C A A IH/ B A A A".into(),
            },
        )
        .unwrap();
    client
        .send_attributes(header(1, streams::MD5_DIGEST), AttributePayload::Digest([0xAB; 16]))
        .unwrap();
    // Attributes stay uncommitted until the session ends.
    assert!(catalog.files_for_job(1).is_empty());
    client.close().unwrap();

    assert!(eventually(|| catalog.files_for_job(1).len() == 1));
    let file = &catalog.files_for_job(1)[0];
    assert_eq!(file.fname, "/etc/hosts");
    assert_eq!(file.digest.as_deref(), Some("q6urq6urq6urq6urq6urqw=="));
    assert!(eventually(|| catalog.claimed_volume(1).is_none()));

    let volume = running.fixture.volume("Vol0001");
    assert_eq!(volume.vol_bytes, 4096);
    assert_eq!(volume.vol_jobs, 1);

    let positions = catalog.job_media_for_job(1).unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].media_id, media_id);
    assert_eq!(positions[0].last_index, 2);
    running.server.shutdown().unwrap();
}

#[test]
fn malformed_request_leaves_connection_usable() {
    let running = RunningCatalog::start(
        CatalogFixture::with_volumes(&["Vol0001"]),
        &[(1, JobKind::Backup)],
    );
    let mut client = running.client("nightly.1");
    assert!(client.find_media(1).is_ok());

    let reply = client.raw_request("CatReq Job=nightly.1 Bogus=1\n").unwrap();
    assert_eq!(reply.code(), 1990);
    assert!(matches!(reply, CatalogResponse::Invalid(ref text) if text.contains("Bogus=1")));

    let info = client.volume_info("Vol0001", true).unwrap();
    assert_eq!(info.volume_name, "Vol0001");
    assert!(matches!(
        client.volume_info("Missing", false),
        Err(CatalogClientError::NotFound)
    ));
    running.server.shutdown().unwrap();
}

#[test]
fn truncated_attributes_do_not_shift_later_replies() {
    let running = RunningCatalog::start(
        CatalogFixture::with_volumes(&["Vol0001"]),
        &[(1, JobKind::Backup)],
    );
    let mut channel = MessageChannel::connect(running.server.local_addr(), IO_TIMEOUT).unwrap();
    channel.get_ref().set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    let mut exchange = |line: &str| {
        channel.send_text("UpdCat Job=nightly.1 FileAttributes short").unwrap();
        channel.send_text(line).unwrap();
        match channel.recv().unwrap() {
            Frame::Message(reply) => String::from_utf8(reply).unwrap(),
            Frame::Signal(signal) => panic!("unexpected signal {signal:?}"),
        }
    };

    // Once before the connection is bound to a job, once after.
    let reply = exchange("CatReq Job=nightly.1 FindMedia=1\n");
    assert!(reply.starts_with("1000 OK VolName=Vol0001 "), "{reply}");
    let reply = exchange("CatReq Job=nightly.1 GetVolInfo VolName=Vol0001 write=0\n");
    assert!(reply.starts_with("1000 OK VolName=Vol0001 "), "{reply}");
    running.server.shutdown().unwrap();
}

#[test]
fn concurrent_sessions_get_distinct_volumes() {
    let running = RunningCatalog::start(
        CatalogFixture::with_volumes(&["Vol0001", "Vol0002"]),
        &[(1, JobKind::Backup), (2, JobKind::Backup), (3, JobKind::Backup)],
    );
    let mut first = running.client("nightly.1");
    let mut second = running.client("nightly.2");
    let mut third = running.client("nightly.3");

    let a = first.find_media(1).unwrap().volume_name;
    let b = second.find_media(1).unwrap().volume_name;
    assert_ne!(a, b);
    assert!(matches!(third.find_media(1), Err(CatalogClientError::NoMedia)));

    // Closing a session frees its volume for the waiting job.
    first.close().unwrap();
    let catalog = running.fixture.catalog.clone();
    assert!(eventually(|| catalog.claimed_volume(1).is_none()));
    assert_eq!(third.find_media(1).unwrap().volume_name, a);
    running.server.shutdown().unwrap();
}

#[test]
fn shutdown_closes_idle_sessions_and_releases_claims() {
    let running = RunningCatalog::start(
        CatalogFixture::with_volumes(&["Vol0001"]),
        &[(1, JobKind::Backup)],
    );
    let catalog = running.fixture.catalog.clone();
    let mut client = running.client("nightly.1");
    client.find_media(1).unwrap();
    assert!(catalog.claimed_volume(1).is_some());

    running.server.shutdown().unwrap();
    assert!(catalog.claimed_volume(1).is_none());
    drop(client);
}

#[test]
fn daemon_serves_its_configured_jobs_and_reports_bind_failures() {
    let config = DaemonConfig::from_yaml(
        "listen: 127.0.0.1:0\n\
         pools: [{name: Default}]\n\
         jobs: [{id: 4, name: nightly.4, pool: Default}]\n\
         volumes: [{name: Vol0001, pool: Default}]\n",
    )
    .unwrap();
    let daemon = Daemon::bootstrap(&config).unwrap();
    let server = daemon.serve(&config).unwrap();

    let mut client = CatalogClient::connect(
        server.local_addr(),
        "nightly.4",
        &RetryPolicy::once(),
        IO_TIMEOUT,
    )
    .unwrap();
    assert_eq!(client.find_media(1).unwrap().volume_name, "Vol0001");

    let taken = DaemonConfig::from_yaml(&format!(
        "listen: {}\npools: [{{name: Default}}]\n",
        server.local_addr()
    ))
    .unwrap();
    assert!(matches!(
        daemon.serve(&taken),
        Err(VolstreamError::Network(NetError::Io(_)))
    ));
    client.close().unwrap();
    server.shutdown().unwrap();
}
