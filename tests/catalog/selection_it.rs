use super::catalog_support::{backup_job, default_pool, CatalogFixture, StubbornStore};
use std::collections::HashSet;
use std::thread;
use volstream::catalog::{CatalogStore, VolumeStatus};
use volstream::messages::{MemorySink, MessageType};
use volstream::selection::{
    NoMediaReason, Selection, VolumeEligibility, VolumeSelector, MAX_SELECTION_ATTEMPTS,
};

#[test]
fn concurrent_jobs_never_share_a_volume() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001", "Vol0002", "Vol0003"]);
    let outcomes: Vec<Selection> = thread::scope(|scope| {
        let handles: Vec<_> = (1..=8)
            .map(|job_id| {
                let catalog = fixture.catalog.clone();
                scope.spawn(move || {
                    let sink = MemorySink::new();
                    let mut job = backup_job(job_id, default_pool());
                    VolumeSelector::new(catalog.as_ref(), &sink)
                        .select_for_append(&mut job, 1, 1_000)
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let selected: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            Selection::Selected(volume) => Some(volume.volume_name.clone()),
            Selection::NoMedia(_) => None,
        })
        .collect();
    let distinct: HashSet<_> = selected.iter().collect();
    assert_eq!(selected.len(), 3);
    assert_eq!(distinct.len(), 3);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Selection::NoMedia(NoMediaReason::Exhausted)))
            .count(),
        5
    );
}

#[test]
fn released_claims_make_the_volume_selectable_again() {
    let fixture = CatalogFixture::with_volumes(&["Vol0001"]);
    let selector = VolumeSelector::new(fixture.catalog.as_ref(), fixture.sink.as_ref());
    let mut first = backup_job(1, default_pool());
    let mut second = backup_job(2, default_pool());

    assert!(matches!(
        selector.select_for_append(&mut first, 1, 0).unwrap(),
        Selection::Selected(_)
    ));
    assert!(matches!(
        selector.select_for_append(&mut second, 1, 0).unwrap(),
        Selection::NoMedia(NoMediaReason::Exhausted)
    ));
    fixture.catalog.release_claims(first.job_id);
    let Selection::Selected(volume) = selector.select_for_append(&mut second, 1, 0).unwrap() else {
        panic!("volume should be free after release");
    };
    assert_eq!(volume.volume_name, "Vol0001");
    assert_eq!(second.volume_name, "Vol0001");
}

#[test]
fn selection_gives_up_after_the_attempt_ceiling() {
    let store = StubbornStore::new(1);
    let sink = MemorySink::new();
    let mut pool = default_pool();
    pool.volume_use_duration = 10;
    let mut job = backup_job(1, pool);

    let outcome = VolumeSelector::new(&store, &sink)
        .select_for_append(&mut job, 1, 1_000)
        .unwrap();

    assert_eq!(outcome, Selection::NoMedia(NoMediaReason::RetryCeiling));
    assert_eq!(store.update_count(), MAX_SELECTION_ATTEMPTS as usize);
    assert_eq!(
        sink.of_kind(MessageType::Info).len(),
        MAX_SELECTION_ATTEMPTS as usize
    );
    let errors = sink.of_kind(MessageType::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text.contains("We seem to be looping"));
    assert!(job.volume_name.is_empty());
}

#[test]
fn auto_labels_fill_the_pool_up_to_its_limit() {
    let fixture = CatalogFixture::new();
    let mut pool = default_pool();
    pool.label_format = Some("Auto-".into());
    pool.max_volumes = 2;
    let selector = VolumeSelector::new(fixture.catalog.as_ref(), fixture.sink.as_ref());

    let mut names = Vec::new();
    for job_id in 1..=3 {
        let mut job = backup_job(job_id, pool.clone());
        match selector.select_for_append(&mut job, 1, 0).unwrap() {
            Selection::Selected(volume) => names.push(volume.volume_name),
            Selection::NoMedia(reason) => assert_eq!(reason, NoMediaReason::Exhausted),
        }
    }
    assert_eq!(names, vec!["Auto-0001".to_string(), "Auto-0002".to_string()]);
    assert!(fixture.sink.contains("Created new Volume \"Auto-0002\""));
}

#[test]
fn error_volume_is_found_for_read_but_refused_for_write() {
    let fixture = CatalogFixture::new();
    fixture.add_volume("Broken", VolumeStatus::Error);
    let selector = VolumeSelector::new(fixture.catalog.as_ref(), fixture.sink.as_ref());
    let mut job = backup_job(1, default_pool());

    assert!(matches!(
        selector.lookup_volume(&mut job, "Broken", false).unwrap(),
        VolumeEligibility::Eligible(volume) if volume.status == VolumeStatus::Error
    ));
    assert!(matches!(
        selector.lookup_volume(&mut job, "Broken", true).unwrap(),
        VolumeEligibility::NotAppropriate(_)
    ));
    assert_eq!(job.volume_name, "Broken");
    assert_eq!(
        selector.lookup_volume(&mut job, "Missing", false).unwrap(),
        VolumeEligibility::NotFound
    );
}

#[test]
fn volumes_purged_by_an_earlier_request_are_recycled_later() {
    let fixture = CatalogFixture::new();
    for name in ["Old1", "Old2"] {
        let mut volume = fixture.add_volume(name, VolumeStatus::Full);
        volume.last_written = 10;
        fixture.catalog.update_volume(&volume).unwrap();
    }
    let mut pool = default_pool();
    pool.volume_retention = 100;
    let selector = VolumeSelector::new(fixture.catalog.as_ref(), fixture.sink.as_ref());
    let mut first = backup_job(1, pool.clone());
    let mut second = backup_job(2, pool);

    let Selection::Selected(one) = selector.select_for_append(&mut first, 1, 1_000).unwrap() else {
        panic!("first job should recycle an expired volume");
    };
    // Pruning purged both volumes; only one was recycled.
    let other = if one.volume_name == "Old1" { "Old2" } else { "Old1" };
    assert_eq!(fixture.volume(other).status, VolumeStatus::Purged);

    let Selection::Selected(two) = selector.select_for_append(&mut second, 1, 1_000).unwrap() else {
        panic!("second job should recycle the purged volume");
    };
    assert_eq!(two.volume_name, other);
    assert_eq!(two.status, VolumeStatus::Recycle);
    assert_eq!(fixture.volume(other).status, VolumeStatus::Recycle);
}
