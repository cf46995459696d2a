mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use common::{TestImage, write_zip};
use dicom_browser::extractor::FileLocator;
use dicom_browser::pixel::{to_display_image, to_display_plane};
use dicom_browser::progress::LOADING_STAGE;
use dicom_browser::{
    IngestError, IngestOptions, LoadAttribute, NoProgress, Progress, SourceKind, TimestepSpec,
    ingest, ingest::ingest_classified,
};

#[test]
fn test_files_are_grouped_by_series() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for (i, time) in ["0", "10", "20"].into_iter().enumerate() {
        TestImage::in_series("1.2.3.1")
            .trigger_time(time)
            .write(&root.join("a").join(format!("img{i}.dcm")));
    }
    for i in 0..2 {
        TestImage::in_series("1.2.3.2").write(&root.join("b").join(format!("img{i}")));
    }
    TestImage::default().write(&root.join("orphan.dcm"));
    fs::write(root.join("notes.txt"), vec![b'n'; 400]).unwrap();
    TestImage::in_series("9.9.9").write(&root.join("DICOMDIR"));

    let series = ingest(root, &IngestOptions::with_workers(3), &NoProgress).unwrap();

    let ids: Vec<_> = series.iter().map(|s| s.series_id()).collect();
    assert_eq!(ids, vec!["1.2.3.1", "1.2.3.2", "???"]);
    assert_eq!(series[0].len(), 3);
    assert_eq!(series[1].len(), 2);
    assert_eq!(series[2].len(), 1);
    assert!(series.iter().all(|s| s.root() == root));
    assert_eq!(
        series[0].get_timestep_spec(),
        TimestepSpec {
            start: 0.0,
            interval: 10.0,
            count: 3
        }
    );
}

#[test]
fn test_files_and_attributes_stay_aligned_after_sorting() {
    let dir = tempfile::tempdir().unwrap();
    for (name, time) in [("img3", "30"), ("img1", "10"), ("img2", "20")] {
        TestImage::in_series("1.2.3")
            .trigger_time(time)
            .write(&dir.path().join(name));
    }

    let series = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap();
    let series = &series[0];

    let names: Vec<_> = series
        .files()
        .iter()
        .map(|f| match f {
            FileLocator::Path(p) => p.file_name().unwrap().to_string_lossy().into_owned(),
            other => panic!("unexpected locator {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["img1", "img2", "img3"]);

    let mut sorted = series.filenames();
    sorted.sort();
    assert_eq!(series.filenames(), sorted);

    for (i, time) in ["10", "20", "30"].into_iter().enumerate() {
        assert_eq!(series.load_attrs()[i][&LoadAttribute::TriggerTime], time);
        let values = series.get_attr_values(&["TriggerTime"], i).unwrap();
        assert_eq!(values, vec![time]);
    }
}

#[test]
fn test_summary_values() {
    let dir = tempfile::tempdir().unwrap();
    for (i, time) in ["0", "10", "20"].into_iter().enumerate() {
        TestImage::in_series("1.2.3")
            .trigger_time(time)
            .description("cine")
            .write(&dir.path().join(format!("img{i}")));
    }

    let series = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap();
    let values = series[0]
        .get_attr_values(
            &[
                "PatientName",
                "SeriesDescription",
                "NumImages",
                "TimestepSpec",
                "Rows",
                "NotAKeyword",
            ],
            0,
        )
        .unwrap();

    assert_eq!(
        values,
        vec![
            "Doe^Jane",
            "cine",
            "3",
            "start: 0, interval: 10, # Steps: 3",
            "",
            ""
        ]
    );
}

#[test]
fn test_caches_return_identical_objects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img0");
    TestImage::in_series("1.2.3")
        .pixels(2, 2, vec![0, 1, 2, 3])
        .write(&path);

    let series = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap();
    let series = &series[0];

    let first = series.get_attr_object(0).unwrap();
    let pixels = series.get_pixel_data(0).unwrap().unwrap();

    fs::remove_file(&path).unwrap();

    let second = series.get_attr_object(0).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let again = series.get_pixel_data(0).unwrap().unwrap();
    assert!(Arc::ptr_eq(&pixels, &again));
}

#[test]
fn test_concurrent_first_access_shares_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    TestImage::in_series("1.2.3")
        .pixels(2, 2, vec![4, 3, 2, 1])
        .write(&dir.path().join("img0"));

    let series = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap();
    let series = &series[0];

    let (objects, images): (Vec<_>, Vec<_>) = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let object = series.get_attr_object(0).unwrap();
                    let image = series.get_pixel_data(0).unwrap().unwrap();
                    (object, image)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).unzip()
    });

    assert!(objects.iter().all(|o| Arc::ptr_eq(o, &objects[0])));
    assert!(images.iter().all(|i| Arc::ptr_eq(i, &images[0])));
    assert!(Arc::ptr_eq(&objects[0], &series.get_attr_object(0).unwrap()));
}

#[test]
fn test_uncached_file_removed_after_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img0");
    TestImage::in_series("1.2.3").write(&path);

    let series = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap();
    fs::remove_file(&path).unwrap();

    assert!(series[0].get_attr_object(0).is_err());
    assert!(series[0].get_pixel_data(0).unwrap().is_none());
}

#[test]
fn test_rescale_is_applied_to_pixel_data() {
    let dir = tempfile::tempdir().unwrap();
    TestImage::in_series("1.2.3")
        .pixels(2, 2, vec![0, 1, 2, 3])
        .write(&dir.path().join("plain"));
    TestImage::in_series("1.2.3")
        .pixels(2, 2, vec![0, 1, 2, 3])
        .rescale("2", "-10")
        .write(&dir.path().join("scaled"));

    let series = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap();
    let series = &series[0];

    // "plain" sorts before "scaled"
    let plain = series.get_pixel_data(0).unwrap().unwrap();
    assert_eq!(plain.shape(), &[2, 2]);
    assert_eq!(plain.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 2.0, 3.0]);

    let scaled = series.get_pixel_data(1).unwrap().unwrap();
    assert_eq!(
        scaled.iter().copied().collect::<Vec<_>>(),
        vec![-10.0, -8.0, -6.0, -4.0]
    );

    let image = to_display_image(&to_display_plane(scaled.view())).unwrap();
    assert_eq!((image.width(), image.height()), (2, 2));
    let luma = image.to_luma8().into_raw();
    assert_eq!((luma[0], luma[3]), (0, 255));
    assert!(luma.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_source_without_dicom_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"plain text").unwrap();
    fs::write(dir.path().join("b.bin"), vec![0u8; 1024]).unwrap();

    let err = ingest(dir.path(), &IngestOptions::default(), &NoProgress).unwrap_err();
    assert!(matches!(err, IngestError::NoSeries(_)));
}

#[test]
fn test_archive_entries_are_cached_eagerly() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("study.zip");
    write_zip(
        &zip_path,
        &[
            (
                "s/b.dcm",
                TestImage::in_series("1.2.3")
                    .trigger_time("5")
                    .pixels(1, 2, vec![7, 9])
                    .to_bytes("2.25.2"),
            ),
            (
                "s/a.dcm",
                TestImage::in_series("1.2.3")
                    .trigger_time("0")
                    .pixels(1, 2, vec![1, 3])
                    .to_bytes("2.25.1"),
            ),
            ("DICOMDIR", TestImage::in_series("9").to_bytes("2.25.3")),
            ("readme.txt", b"not dicom".to_vec()),
        ],
    );

    let (kind, series) =
        ingest_classified(&zip_path, &IngestOptions::default(), &NoProgress).unwrap();
    assert_eq!(kind, SourceKind::Archive);
    assert_eq!(series.len(), 1);

    let series = &series[0];
    let prefix = zip_path.display().to_string();
    assert_eq!(
        series.filenames(),
        vec![format!("{prefix}?s/a.dcm"), format!("{prefix}?s/b.dcm")]
    );

    fs::remove_file(&zip_path).unwrap();

    let first = series.get_pixel_data(0).unwrap().unwrap();
    assert_eq!(first.iter().copied().collect::<Vec<_>>(), vec![1.0, 3.0]);
    let object = series.get_attr_object(1).unwrap();
    assert!(Arc::ptr_eq(&object, &series.get_attr_object(1).unwrap()));
    assert_eq!(
        series.get_attr_values(&["TriggerTime"], 1).unwrap(),
        vec!["5"]
    );
}

#[test]
fn test_progress_is_throttled_and_finished() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..250 {
        TestImage::in_series("1.2.3").write(&dir.path().join(format!("img{i:03}")));
    }

    let seen = Mutex::new(Vec::new());
    let sink = |p: Progress| seen.lock().unwrap().push(p);
    let series = ingest(dir.path(), &IngestOptions::with_workers(4), &sink).unwrap();
    assert_eq!(series[0].len(), 250);

    let seen = seen.into_inner().unwrap();
    let loading: Vec<_> = seen.iter().filter(|p| p.stage == LOADING_STAGE).collect();
    assert_eq!(loading.len(), 125);
    assert!(loading.windows(2).all(|w| w[0].completed < w[1].completed));
    assert_eq!(loading.last().unwrap().completed, 250);
    assert!(loading.iter().all(|p| p.total == 250));

    assert!(seen.last().unwrap().is_finished());
    assert_eq!(seen.iter().filter(|p| p.is_finished()).count(), 1);
}

#[test]
fn test_temporal_attribute_option() {
    let dir = tempfile::tempdir().unwrap();
    for (i, time) in ["0", "4"].into_iter().enumerate() {
        TestImage::in_series("1.2.3")
            .trigger_time(time)
            .write(&dir.path().join(format!("img{i}")));
    }

    let options = IngestOptions {
        temporal_attribute: LoadAttribute::SeriesNumber,
        ..IngestOptions::default()
    };
    let series = ingest(dir.path(), &options, &NoProgress).unwrap();

    assert_eq!(series[0].temporal_attribute(), LoadAttribute::SeriesNumber);
    assert_eq!(series[0].get_timestep_spec(), TimestepSpec::default());
    assert_eq!(
        series[0].timestep_spec_for(LoadAttribute::TriggerTime).count,
        2
    );
}
