use image::{GenericImageView, ImageFormat};
use image_saver::{
    convert::{ConversionEngine, MockCodec},
    models::{CodecConfig, ConversionJob, WorkerConfig},
    producer::ImageSaver,
    queue::{JobPublisher, MockQueue},
    storage::MockBlobStore,
    worker::{JobOutcome, JobStage, Worker, WorkerStats},
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 10) as u8, (y * 10) as u8, 128, 255])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn cat_job(formats: &[&str]) -> ConversionJob {
    ConversionJob::new(
        "cat.png".to_string(),
        "img-123".to_string(),
        formats.iter().map(|f| f.to_string()).collect(),
    )
}

fn native_worker(store: &MockBlobStore) -> Worker {
    Worker::new(
        Arc::new(store.clone()),
        ConversionEngine::new(&CodecConfig::default()),
        &WorkerConfig::default(),
    )
}

#[tokio::test]
async fn test_png_and_jpg_job_is_acked_and_original_removed() {
    let store = MockBlobStore::new().with_file("cat.png".to_string(), create_test_png(20, 10));
    let queue = MockQueue::new();
    queue.publish(&cat_job(&["png", "jpg"])).await.unwrap();

    let stats = native_worker(&store)
        .run(&mut queue.source())
        .await
        .unwrap();

    assert_eq!(
        stats,
        WorkerStats {
            acked: 1,
            rejected: 0
        }
    );
    assert_eq!(queue.get_acked().len(), 1);
    assert!(queue.get_rejected().is_empty());

    let files = store.get_files();
    let mut keys: Vec<_> = files.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["img-123.jpg", "img-123.png"]);

    for key in keys {
        let decoded = image::load_from_memory(&files[&key]).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10), "dimensions of {}", key);
    }
    assert_eq!(
        image::guess_format(&files["img-123.jpg"]).unwrap(),
        ImageFormat::Jpeg
    );
}

#[tokio::test]
async fn test_missing_original_rejects_without_writes() {
    let store = MockBlobStore::new();
    let queue = MockQueue::new();
    queue.publish(&cat_job(&["png", "jpg"])).await.unwrap();

    let stats = native_worker(&store)
        .run(&mut queue.source())
        .await
        .unwrap();

    assert_eq!(stats.rejected, 1);
    assert_eq!(queue.get_rejected().len(), 1);
    assert_eq!(store.get_operations(), vec!["fetch:cat.png"]);
}

#[tokio::test]
async fn test_failure_mid_list_keeps_original_and_skips_later_formats() {
    let store = MockBlobStore::new().with_file("cat.png".to_string(), create_test_png(4, 4));
    let engine = ConversionEngine::new(&CodecConfig::default())
        .with_codec("webp", MockCodec::new().with_failure(true));
    let worker = Worker::new(Arc::new(store.clone()), engine, &WorkerConfig::default());

    let payload = cat_job(&["jpeg", "webp", "png"]).to_vec().unwrap();
    let outcome = worker.process(&payload).await;

    assert!(matches!(
        outcome,
        JobOutcome::Rejected {
            stage: JobStage::ConvertLoop { index: 1 },
            ..
        }
    ));
    assert!(store.contains("cat.png"));
    assert!(store.contains("img-123.jpeg"));
    assert!(!store.contains("img-123.png"));
}

#[tokio::test]
async fn test_corrupt_original_is_rejected() {
    let store =
        MockBlobStore::new().with_file("cat.png".to_string(), b"not really a png".to_vec());

    let payload = cat_job(&["png"]).to_vec().unwrap();
    let outcome = native_worker(&store).process(&payload).await;

    match outcome {
        JobOutcome::Rejected { stage, error } => {
            assert_eq!(stage, JobStage::ConvertLoop { index: 0 });
            assert!(error.is_conversion_failure());
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(store.get_upload_count(), 0);
}

#[tokio::test]
async fn test_redelivery_produces_identical_blobs() {
    let source = create_test_png(9, 9);
    let payload = cat_job(&["png", "jpg"]).to_vec().unwrap();

    let first = MockBlobStore::new().with_file("cat.png".to_string(), source.clone());
    assert!(native_worker(&first).process(&payload).await.is_acked());

    // Redelivered after the original reappears, e.g. a duplicate upload
    let second = first
        .clone()
        .with_file("cat.png".to_string(), source.clone());
    let before = second.get_files();
    assert!(native_worker(&second).process(&payload).await.is_acked());

    let after = second.get_files();
    assert_eq!(before["img-123.png"], after["img-123.png"]);
    assert_eq!(before["img-123.jpg"], after["img-123.jpg"]);
    assert!(!after.contains_key("cat.png"));
}

#[tokio::test]
async fn test_malformed_message_does_not_stop_the_loop() {
    let store = MockBlobStore::new().with_file("cat.png".to_string(), create_test_png(3, 3));
    let queue = MockQueue::new();
    queue.push_raw(b"{\"originalImageName\": 42}".to_vec());
    queue.publish(&cat_job(&["png"])).await.unwrap();

    let stats = native_worker(&store)
        .run(&mut queue.source())
        .await
        .unwrap();

    assert_eq!(
        stats,
        WorkerStats {
            acked: 1,
            rejected: 1
        }
    );
    assert_eq!(
        queue.get_rejected(),
        vec![b"{\"originalImageName\": 42}".to_vec()]
    );
    assert!(store.contains("img-123.png"));
}

#[tokio::test]
async fn test_unsupported_format_differs_between_paths() {
    let store = MockBlobStore::new();
    let queue = MockQueue::new();
    let saver = ImageSaver::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        ConversionEngine::new(&CodecConfig::default()),
    );
    let formats = vec!["bmp".to_string(), "png".to_string()];

    // Producer drops the unsupported entry before queueing
    let job = saver
        .save_async(&create_test_png(6, 2), "Cat.PNG", "img-55", &formats)
        .await
        .unwrap();
    assert_eq!(job.save_formats, vec!["png"]);

    let stats = native_worker(&store)
        .run(&mut queue.source())
        .await
        .unwrap();
    assert_eq!(stats.acked, 1);
    assert!(store.contains("img-55.png"));
    assert!(!store.contains("img-55-original.png"));

    // A job naming it directly is rejected by the worker
    let direct = ConversionJob::new(
        "img-55.png".to_string(),
        "img-56".to_string(),
        formats.clone(),
    );
    let outcome = native_worker(&store).process(&direct.to_vec().unwrap()).await;
    assert!(!outcome.is_acked());
    assert!(store.contains("img-55.png"));
}
