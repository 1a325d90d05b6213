use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mri_berry::infer::InferenceService;
use mri_berry::model::{ModelError, SegmentationModel};
use mri_berry::transforms::InferencePipeline;
use mri_berry::{MriScan, NiftiHeaderAttr, SegLabel};
use ndarray::{Array3, Array5};
use nifti::NiftiHeader;
use serve::{router, AppState, ErrorRes, HealthRes, PredictRes, SUCCESS_MESSAGE};
use std::path::{Path, PathBuf};
use tower::ServiceExt;

const SHAPE: (usize, usize, usize) = (8, 8, 8);

/// 整个输入区域标为水肿.
struct AllEdema;

impl SegmentationModel for AllEdema {
    fn predict(&self, batch: &Array5<f32>) -> Result<Array3<u8>, ModelError> {
        let (_, _, x, y, z) = batch.dim();
        Ok(Array3::from_elem((x, y, z), 2))
    }
}

/// 在 `root/BraTS2021_00001` 下写出模态文件 `{prefix}{role}.nii.gz`.
fn write_patient(root: &Path, prefix: &str, roles: &[&str]) -> PathBuf {
    let dir = root.join("BraTS2021_00001");
    std::fs::create_dir_all(&dir).unwrap();
    let h = NiftiHeader::default();
    for role in roles {
        let data = Array3::from_shape_fn(SHAPE, |(i, j, k)| {
            if (2..6).contains(&i) && (2..6).contains(&j) && (2..6).contains(&k) {
                100.0
            } else {
                0.0
            }
        });
        MriScan::from_array(&h, data)
            .save(dir.join(format!("{prefix}{role}.nii.gz")))
            .unwrap();
    }
    dir
}

fn app(out_dir: &Path) -> axum::Router {
    let service = InferenceService::new(AllEdema, out_dir)
        .with_pipeline(InferencePipeline::new().with_spatial([4, 4, 4]));
    router(AppState::new(service))
}

fn post_json(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_of<T: serde::de::DeserializeOwned>(res: axum::response::Response) -> T {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let res = app(dir.path())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let h: HealthRes = body_of(res).await;
    assert!(h.ok);
}

#[tokio::test]
async fn predict_writes_segmentation() {
    let dir = tempfile::tempdir().unwrap();
    let patient = write_patient(dir.path(), "BraTS2021_00001_", &["t1", "t1ce", "t2", "flair"]);
    let out_dir = dir.path().join("current_predictions");

    let body = serde_json::json!({ "patient_folder": patient }).to_string();
    let res = app(&out_dir).oneshot(post_json(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let r: PredictRes = body_of(res).await;
    assert_eq!(r.message, SUCCESS_MESSAGE);
    assert_eq!(PathBuf::from(&r.output_path), out_dir.join("seg.nii.gz"));

    let seg = SegLabel::open(&r.output_path).unwrap();
    assert_eq!(seg.shape(), SHAPE);
    assert_eq!(seg.count(2), 4 * 4 * 4);
}

#[tokio::test]
async fn plain_file_names_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let patient = write_patient(dir.path(), "", &["t1", "t1ce", "t2", "flair"]);
    let out_dir = dir.path().join("out");

    let body = serde_json::json!({ "patient_folder": patient }).to_string();
    let res = app(&out_dir).oneshot(post_json(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let r: PredictRes = body_of(res).await;
    assert_eq!(SegLabel::open(&r.output_path).unwrap().shape(), SHAPE);
}

#[tokio::test]
async fn missing_modality_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let patient = write_patient(dir.path(), "BraTS2021_00001_", &["t1", "t1ce", "t2"]);
    let out_dir = dir.path().join("out");

    let body = serde_json::json!({ "patient_folder": patient }).to_string();
    let res = app(&out_dir).oneshot(post_json(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let e: ErrorRes = body_of(res).await;
    assert_eq!(e.error, "Missing modalities: [flair]");
    assert!(!out_dir.join("seg.nii.gz").exists());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let res = app(dir.path())
        .oneshot(post_json("{\"folder\": 1}".into()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
