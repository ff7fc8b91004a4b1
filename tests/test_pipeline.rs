//! Integration tests for the per-image pipeline and the directory runner.

mod common;

use labelview::pipeline::list_images;
use labelview::render::class_color;
use labelview::{FailurePolicy, Pipeline, detect_image};
use std::sync::Arc;

use common::*;

#[tokio::test]
async fn test_detect_image_normalizes_response() -> anyhow::Result<()> {
    let service = FakeDetectionService::new(vec![det("cats", 92.5, 0.1, 0.2, 0.3, 0.4)]);

    let out = detect_image(&service, b"img".to_vec(), TEST_MODEL, None, &vocab()).await?;

    assert_eq!(out.len(), 1);
    let (class_id, confidence, x1, y1, x2, y2) = out[0].as_tuple();
    assert_eq!(class_id, 1);
    assert_eq!(confidence, 92.5);
    assert_eq!((x1, y1), (0.1, 0.2));
    assert!((x2 - 0.4).abs() < 1e-6);
    assert!((y2 - 0.6).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn test_detect_image_unknown_label_is_an_error() {
    let service = FakeDetectionService::new(vec![det("hats", 80.0, 0.0, 0.0, 0.5, 0.5)]);

    let err = detect_image(&service, b"img".to_vec(), TEST_MODEL, None, &vocab())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownLabel(ref name) if name == "hats"));
}

#[tokio::test]
async fn test_detect_image_empty_response() -> anyhow::Result<()> {
    let service = FakeDetectionService::new(vec![]);
    let out = detect_image(&service, b"img".to_vec(), TEST_MODEL, None, &vocab()).await?;
    assert!(out.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_detect_image_passes_request_through_uncached() -> anyhow::Result<()> {
    let service = FakeDetectionService::new(vec![]);

    detect_image(&service, b"same".to_vec(), TEST_MODEL, Some(75.0), &vocab()).await?;
    detect_image(&service, b"same".to_vec(), TEST_MODEL, None, &vocab()).await?;

    let calls = service.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].model_id, TEST_MODEL);
    assert_eq!(calls[0].image_bytes, b"same");
    assert_eq!(calls[0].min_confidence, Some(75.0));
    assert_eq!(calls[1].min_confidence, None);
    Ok(())
}

#[tokio::test]
async fn test_invalid_floor_rejected_before_any_call() {
    let service = FakeDetectionService::new(vec![]);

    let err = detect_image(&service, b"img".to_vec(), TEST_MODEL, Some(140.0), &vocab())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn test_service_errors_propagate_with_kind() {
    let service = FakeDetectionService::new(vec![])
        .with_reply(b"img", Reply::Fail(ServiceErrorKind::ModelNotRunning));

    let err = detect_image(&service, b"img".to_vec(), TEST_MODEL, None, &vocab())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Service {
            kind: ServiceErrorKind::ModelNotRunning,
            ..
        }
    ));
    assert!(!err.is_retriable());
}

#[test]
fn test_list_images_skips_other_files() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("a.jpg"), b"a")?;
    std::fs::write(dir.path().join("b.PNG"), b"b")?;
    std::fs::write(dir.path().join("notes.txt"), b"n")?;
    std::fs::create_dir(dir.path().join("nested.png"))?;

    let mut names: Vec<String> = list_images(dir.path())?
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names, vec!["a.jpg", "b.PNG"]);
    Ok(())
}

#[tokio::test]
async fn test_run_directory_processes_each_image_once() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("one.jpg"), b"one")?;
    std::fs::write(dir.path().join("two.jpg"), b"two")?;
    std::fs::write(dir.path().join("skip.txt"), b"skip")?;

    let service = Arc::new(
        FakeDetectionService::new(vec![])
            .with_reply(b"one", Reply::Labels(vec![det("boots", 60.0, 0.0, 0.0, 0.5, 0.5)]))
            .with_reply(
                b"two",
                Reply::Labels(vec![
                    det("cats", 90.0, 0.1, 0.1, 0.2, 0.2),
                    det("boots", 20.0, 0.5, 0.5, 0.2, 0.2),
                ]),
            ),
    );
    let pipeline = Pipeline::new(service.clone(), vocab(), TEST_MODEL).with_display_threshold(50.0)?;

    let summary = pipeline.run_directory(dir.path()).await?;

    assert_eq!(service.call_count(), 2);
    assert_eq!(summary.reports.len(), 2);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.total_detections(), 3);
    let two = summary
        .reports
        .iter()
        .find(|r| r.path.ends_with("two.jpg"))
        .unwrap();
    assert_eq!(two.visible, 1);
    assert_eq!(two.detections[0].class_id, 1);
    assert_eq!(two.detections[1].class_id, 0);
    assert!(two.rendered.is_none());
    Ok(())
}

#[tokio::test]
async fn test_abort_policy_stops_on_service_error() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("bad.jpg"), b"bad")?;

    let service = Arc::new(
        FakeDetectionService::new(vec![]).with_reply(b"bad", Reply::Fail(ServiceErrorKind::Throttled)),
    );
    let pipeline = Pipeline::new(service, vocab(), TEST_MODEL);

    let err = pipeline.run_directory(dir.path()).await.unwrap_err();
    assert!(err.is_retriable());
    Ok(())
}

#[tokio::test]
async fn test_skip_policy_isolates_failed_images() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("bad.jpg"), b"bad")?;
    std::fs::write(dir.path().join("good.jpg"), b"good")?;

    let service = Arc::new(
        FakeDetectionService::new(vec![det("cats", 70.0, 0.0, 0.0, 1.0, 1.0)])
            .with_reply(b"bad", Reply::Fail(ServiceErrorKind::AccessDenied)),
    );
    let pipeline = Pipeline::new(service.clone(), vocab(), TEST_MODEL)
        .with_failure_policy(FailurePolicy::SkipImage);

    let summary = pipeline.run_directory(dir.path()).await?;

    assert_eq!(service.call_count(), 2);
    assert_eq!(summary.reports.len(), 1);
    assert!(summary.reports[0].path.ends_with("good.jpg"));
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].0.ends_with("bad.jpg"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_label_aborts_even_when_skipping() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("hat.jpg"), b"hat")?;

    let service = Arc::new(FakeDetectionService::new(vec![det("hats", 99.0, 0.0, 0.0, 0.1, 0.1)]));
    let pipeline = Pipeline::new(service, vocab(), TEST_MODEL)
        .with_failure_policy(FailurePolicy::SkipImage);

    let err = pipeline.run_directory(dir.path()).await.unwrap_err();
    assert!(matches!(err, Error::UnknownLabel(_)));
    Ok(())
}

#[tokio::test]
async fn test_render_dir_must_be_empty() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("existing.png"), b"x")?;
    let service = Arc::new(FakeDetectionService::new(vec![]));

    let result = Pipeline::new(service, vocab(), TEST_MODEL).with_render_dir(dir.path().to_path_buf());

    assert!(matches!(result, Err(Error::Config(_))));
    Ok(())
}

#[tokio::test]
async fn test_render_dir_receives_overlays() -> anyhow::Result<()> {
    let images = tempfile::TempDir::new()?;
    let out = tempfile::TempDir::new()?;
    let render_dir = out.path().join("overlays");
    write_test_image(&images.path().join("shoe.png"));

    let service = Arc::new(FakeDetectionService::new(vec![
        det("cats", 90.0, 0.1, 0.2, 0.4, 0.4),
        det("boots", 10.0, 0.6, 0.6, 0.3, 0.3),
    ]));
    let pipeline = Pipeline::new(service, vocab(), TEST_MODEL)
        .with_display_threshold(50.0)?
        .with_render_dir(render_dir.clone())?;

    let summary = pipeline.run_directory(images.path()).await?;

    let rendered = summary.reports[0].rendered.clone().unwrap();
    assert_eq!(rendered, render_dir.join("shoe.png"));
    let overlay = image::open(&rendered)?.to_rgb8();
    // Corner of the visible cats box.
    assert_eq!(overlay.get_pixel(10, 20), &class_color(1));
    // The low-confidence boots box is not drawn.
    assert_eq!(overlay.get_pixel(60, 75), &image::Rgb([255, 255, 255]));
    Ok(())
}

#[test]
fn test_display_threshold_outside_percent_rejected() {
    for threshold in [150.0, -1.0, f32::NAN] {
        let service = Arc::new(FakeDetectionService::new(vec![]));
        let result = Pipeline::new(service, vocab(), TEST_MODEL).with_display_threshold(threshold);
        assert!(matches!(result, Err(Error::Config(ref m)) if m.contains("display_threshold")));
    }
}

#[tokio::test]
async fn test_overlays_with_shared_stem_do_not_collide() -> anyhow::Result<()> {
    let images = tempfile::TempDir::new()?;
    let out = tempfile::TempDir::new()?;
    let render_dir = out.path().join("overlays");
    write_test_image(&images.path().join("shoe.png"));
    let img = image::ImageBuffer::from_fn(100, 100, |_, _| image::Rgb([255u8, 255u8, 255u8]));
    img.save_with_format(images.path().join("shoe.jpg"), image::ImageFormat::Jpeg)?;

    let service = Arc::new(FakeDetectionService::new(vec![det("cats", 90.0, 0.1, 0.2, 0.4, 0.4)]));
    let pipeline = Pipeline::new(service, vocab(), TEST_MODEL).with_render_dir(render_dir.clone())?;

    let summary = pipeline.run_directory(images.path()).await?;

    assert_eq!(summary.reports.len(), 2);
    let mut rendered: Vec<_> = summary
        .reports
        .iter()
        .map(|r| r.rendered.clone().unwrap())
        .collect();
    rendered.sort();
    assert_eq!(rendered, vec![render_dir.join("shoe-2.png"), render_dir.join("shoe.png")]);
    assert_eq!(std::fs::read_dir(&render_dir)?.count(), 2);
    Ok(())
}
