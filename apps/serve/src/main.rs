//! 推理服务入口.
//!
//! 环境变量:
//!
//! - `BRATS_SERVE_ADDR`: 监听地址, 默认 `127.0.0.1:5000`;
//! - `BRATS_MODEL_PATH`: 权重文件 (`.mpk` 或 PyTorch `.pt`), 默认 `Brain_30.mpk`;
//! - `BRATS_OUTPUT_DIR`: 结果目录, 默认 `current_predictions`.

use anyhow::Context;
use mri_berry::infer::InferenceService;
use mri_berry::model::{CpuBackend, Segmenter};
use serve::{router, AppState, ServeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logger()?;
    let cfg = ServeConfig::from_env();

    let model = Segmenter::<CpuBackend>::load(&cfg.model_path, Default::default())
        .with_context(|| format!("failed to load model {}", cfg.model_path.display()))?;
    log::info!("Model loaded from {}", cfg.model_path.display());

    let service = InferenceService::new(model, &cfg.output_dir);
    let app = router(AppState::new(service));

    log::info!("Starting segmentation service on {}", cfg.addr);
    let listener = tokio::net::TcpListener::bind(&cfg.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
