use analyzer::{Category, ClassifierModel, ImageAnalyzer, ImageTensor, ModelError};
use catalog::Catalog;
use face_grouping::{FaceEncoder, FaceEncoding, FaceError, FaceGrouper};
use indexer::Indexer;
use scanner::FileScanner;
use std::collections::HashMap;
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

struct NamedFaces(HashMap<String, Vec<f32>>);

impl FaceEncoder for NamedFaces {
    fn encode_faces(&self, path: &Path) -> Result<Vec<FaceEncoding>, FaceError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self
            .0
            .get(&name)
            .map(|embedding| {
                vec![FaceEncoding {
                    top: 0,
                    right: 100,
                    bottom: 100,
                    left: 0,
                    embedding: embedding.clone(),
                }]
            })
            .unwrap_or_default())
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
    let albums = dir.path().join("albums");
    std::fs::create_dir(&albums).expect("albums dir");
    std::fs::write(dir.path().join("notes.txt"), b"not media").expect("write notes");
    write_red_jpeg(&dir.path().join("beach.jpg"));
    write_red_jpeg(&albums.join("family.jpg"));
    write_red_jpeg(&albums.join("portrait.jpg"));
    std::fs::write(albums.join("broken.jpg"), b"not an image").expect("write broken");

    let encoder = NamedFaces(HashMap::from([
        ("family.jpg".to_string(), vec![0.0]),
        ("portrait.jpg".to_string(), vec![0.1]),
        ("beach.jpg".to_string(), vec![0.9]),
    ]));

    let scanner = FileScanner::new(dir.path()).with_retry(2, Duration::from_millis(1));
    let analyzer = ImageAnalyzer::new(Box::new(RedSpotter));
    let grouper = FaceGrouper::new(Box::new(encoder));
    let indexer = Arc::new(Indexer::new(
        scanner,
        analyzer,
        grouper,
        Arc::new(Catalog::new()),
    ));

    let summary = indexer.process_directory(None).expect("scan");
    assert_eq!(summary.files, 5);
    assert_eq!(summary.images, 4);
    assert_eq!(summary.face_groups, 1);
    assert_eq!(summary.errors, 0);

    let catalog = indexer.catalog();
    assert_eq!(catalog.images().expect("images").len(), 4);

    let broken = catalog
        .image(&albums.join("broken.jpg"))
        .expect("get")
        .expect("entry for broken.jpg");
    assert!(broken.error.is_some());
    assert!(broken.categories.is_empty());
    assert_eq!(broken.relative_path, "albums/broken.jpg");

    let beach = catalog
        .image(&dir.path().join("beach.jpg"))
        .expect("get")
        .expect("entry for beach.jpg");
    assert_eq!(beach.categories[0].label, "red_object");
    assert_eq!(beach.face_group, None);

    let family = catalog
        .image(&albums.join("family.jpg"))
        .expect("get")
        .expect("entry for family.jpg");
    assert_eq!(family.face_group, Some(0));

    let groups = catalog.face_groups().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].images.len(), 2);
    assert!(groups[0].images.contains(&albums.join("family.jpg")));
    assert!(groups[0].images.contains(&albums.join("portrait.jpg")));

    let categories = catalog.category_summary().expect("summary");
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].category, "red_object");
    assert_eq!(categories[0].count, 3);

    let progress = indexer.progress().snapshot();
    assert!(!progress.scanning_active);
    assert_eq!(progress.total_files, 5);
    assert_eq!(progress.processed_files, 5);
    assert_eq!(progress.error_count, 0);

    println!("gallery_pipeline_e2e passed");
}
