use std::sync::Arc;

use medscan::{
    analysis::{AnalysisClient, OpenRouterClient},
    config::{self, AnalysisMode},
    ingest::UploadedImage,
    ocr::{OcrSpaceClient, TextExtractor},
    retry::RetryPolicy,
    sanitize::parse_medicine_info,
};

fn sample_image_path() -> Option<std::path::PathBuf> {
    std::env::var("MEDSCAN_SAMPLE_IMAGE").ok().map(Into::into)
}

#[tokio::test]
#[ignore = "Requires OCR_API_KEY and MEDSCAN_SAMPLE_IMAGE"]
async fn live_ocr_reads_sample_package() {
    let config = config::load_config().expect("config from environment");
    let path = sample_image_path().expect("MEDSCAN_SAMPLE_IMAGE set");
    let size_bytes = std::fs::metadata(&path).expect("sample image").len();
    let image = UploadedImage {
        file_name: path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("sample.jpg")
            .to_string(),
        path,
        mime_type: "image/jpeg".into(),
        size_bytes,
    };

    let text = OcrSpaceClient::new(&config)
        .expect("ocr client")
        .extract(&image)
        .await
        .expect("ocr response")
        .into_text()
        .expect("usable text");
    assert!(!text.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires COMPLETION_API_KEY"]
async fn live_completion_identifies_paracetamol() {
    let config = config::load_config().expect("config from environment");
    let client = AnalysisClient::new(
        Arc::new(OpenRouterClient::new(&config).expect("completion client")),
        AnalysisMode::TextOnly,
        config.completion_model.clone(),
        RetryPolicy::once(),
    );
    let scratch = tempfile::NamedTempFile::new().expect("scratch file");
    let image = UploadedImage {
        path: scratch.path().to_path_buf(),
        mime_type: "image/jpeg".into(),
        size_bytes: 0,
        file_name: "unused.jpg".into(),
    };

    let response = client
        .analyze("PARACETAMOL 500mg Tablets", &image)
        .await
        .expect("completion");
    let info = parse_medicine_info(&response.raw_completion_text).expect("json answer");
    let name = info.name.expect("name reported").to_lowercase();
    assert!(name.contains("paracetamol") || name.contains("acetaminophen"));
}
