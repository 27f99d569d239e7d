use analyzer::{ImageAnalyzer, PlaceholderModel};
use catalog::Catalog;
use face_grouping::{FaceGrouper, PlaceholderEncoder};
use indexer::Indexer;
use scanner::FileScanner;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_red_jpeg(path: &Path) {
    image::RgbImage::from_pixel(224, 224, image::Rgb([255, 0, 0]))
        .save(path)
        .expect("write jpeg fixture");
}

#[tokio::main]
async fn main() {
    let dir = TempDir::new().expect("dir");
    write_red_jpeg(&dir.path().join("first.jpg"));

    let scanner = FileScanner::new(dir.path()).with_retry(2, Duration::from_millis(1));
    let analyzer = ImageAnalyzer::new(Box::new(PlaceholderModel::new()));
    let grouper = FaceGrouper::new(Box::new(PlaceholderEncoder::new()));
    let indexer = Arc::new(Indexer::new(
        scanner,
        analyzer,
        grouper,
        Arc::new(Catalog::new()),
    ));

    let summary = indexer.process_directory(None).expect("first scan");
    assert_eq!(summary.images, 1);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = server::router(Arc::clone(&indexer));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    // a file that appears after the first pass is picked up by a rescan
    write_red_jpeg(&dir.path().join("second.jpg"));
    let client = reqwest::Client::new();
    let accepted = client
        .post(format!("http://{}/api/scan", addr))
        .send()
        .await
        .expect("post rescan");
    assert_eq!(accepted.status(), 202);

    let mut settled = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let progress: serde_json::Value = client
            .get(format!("http://{}/api/progress", addr))
            .send()
            .await
            .expect("get progress")
            .json()
            .await
            .expect("progress json");
        if progress["scanning_active"] == false {
            settled = true;
            break;
        }
    }
    assert!(settled, "rescan never settled");

    let images: serde_json::Value = client
        .get(format!("http://{}/api/images", addr))
        .send()
        .await
        .expect("get images")
        .json()
        .await
        .expect("images json");
    assert_eq!(images.as_array().expect("array").len(), 2);

    assert_eq!(indexer.catalog().image_count().expect("count"), 2);
    assert!(!indexer.progress().is_active());

    println!("rescan_e2e passed");
}
