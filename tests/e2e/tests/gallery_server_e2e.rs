use analyzer::{Category, ClassifierModel, ImageAnalyzer, ImageTensor, ModelError};
use catalog::Catalog;
use face_grouping::{FaceGrouper, PlaceholderEncoder};
use indexer::Indexer;
use scanner::FileScanner;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct RedSpotter;

impl ClassifierModel for RedSpotter {
    fn input_dimensions(&self) -> (u32, u32) {
        (224, 224)
    }

    fn predict(&self, input: &ImageTensor) -> Result<Vec<Category>, ModelError> {
        let mut red = 0.0f32;
        let mut other = 0.0f32;
        for pixel in input.pixels.chunks_exact(3) {
            red += pixel[0];
            other += pixel[1] + pixel[2];
        }
        if red > other {
            Ok(vec![Category {
                label: "red_object".to_string(),
                confidence: 0.93,
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

fn write_red_jpeg(path: &Path) {
    image::RgbImage::from_pixel(224, 224, image::Rgb([255, 0, 0]))
        .save(path)
        .expect("write jpeg fixture");
}

#[tokio::main]
async fn main() {
    let dir = TempDir::new().expect("dir");
    write_red_jpeg(&dir.path().join("one.jpg"));
    write_red_jpeg(&dir.path().join("two.jpg"));
    std::fs::write(dir.path().join("skip.txt"), b"text").expect("write txt");

    let scanner = FileScanner::new(dir.path()).with_retry(2, Duration::from_millis(1));
    let analyzer = ImageAnalyzer::new(Box::new(RedSpotter));
    let grouper = FaceGrouper::new(Box::new(PlaceholderEncoder::new()));
    let indexer = Arc::new(Indexer::new(
        scanner,
        analyzer,
        grouper,
        Arc::new(Catalog::new()),
    ));

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = server::router(Arc::clone(&indexer));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let client = reqwest::Client::new();

    let accepted = client
        .post(format!("http://{}/api/scan", addr))
        .send()
        .await
        .expect("post scan");
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
            assert_eq!(progress["total_files"], 3);
            assert_eq!(progress["processed_files"], 3);
            assert_eq!(progress["error_count"], 0);
            settled = true;
            break;
        }
    }
    assert!(settled, "scan never settled");

    let images: serde_json::Value = client
        .get(format!("http://{}/api/images", addr))
        .send()
        .await
        .expect("get images")
        .json()
        .await
        .expect("images json");
    let images = images.as_array().expect("array");
    assert_eq!(images.len(), 2);
    assert!(images
        .iter()
        .all(|img| img["categories"][0]["category"] == "red_object"));

    let categories: serde_json::Value = client
        .get(format!("http://{}/api/categories", addr))
        .send()
        .await
        .expect("get categories")
        .json()
        .await
        .expect("categories json");
    assert_eq!(categories[0]["category"], "red_object");
    assert_eq!(categories[0]["count"], 2);

    let page = client
        .get(format!("http://{}/", addr))
        .send()
        .await
        .expect("get page")
        .text()
        .await
        .expect("page body");
    assert!(page.contains("NAS Image Gallery"));

    let bytes = client
        .get(format!("http://{}/images/one.jpg", addr))
        .send()
        .await
        .expect("get image bytes");
    assert_eq!(bytes.status(), 200);
    assert_eq!(bytes.headers()["content-type"], "image/jpeg");

    println!("gallery_server_e2e passed");
}
