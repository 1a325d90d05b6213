//! 分割推理 HTTP 服务.
//!
//! - `POST /predict`: 请求体 `{"patient_folder": "<路径>"}`, 对该病人目录做分割.
//! - `GET /health`: 存活检查.
//!
//! 网络在启动时载入一次. 推理请求经互斥锁串行化, 并在阻塞线程池中执行.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use mri_berry::infer::InferenceService;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 默认监听地址.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// 默认权重文件.
pub const DEFAULT_MODEL_PATH: &str = "Brain_30.mpk";

/// 默认结果目录.
pub const DEFAULT_OUTPUT_DIR: &str = "current_predictions";

/// 成功时的提示.
pub const SUCCESS_MESSAGE: &str = "Prediction completed successfully!";

/// 服务配置.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeConfig {
    /// 监听地址.
    pub addr: String,

    /// 权重文件.
    pub model_path: PathBuf,

    /// 结果目录.
    pub output_dir: PathBuf,
}

impl ServeConfig {
    /// 从 `BRATS_SERVE_ADDR`, `BRATS_MODEL_PATH`, `BRATS_OUTPUT_DIR` 读取, 未设置时使用默认值.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str, default: &str| {
            lookup(k)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_owned())
        };
        Self {
            addr: get("BRATS_SERVE_ADDR", DEFAULT_ADDR),
            model_path: get("BRATS_MODEL_PATH", DEFAULT_MODEL_PATH).into(),
            output_dir: get("BRATS_OUTPUT_DIR", DEFAULT_OUTPUT_DIR).into(),
        }
    }

    /// 从进程环境变量读取.
    #[inline]
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

/// 推理请求.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictReq {
    /// 病人目录.
    pub patient_folder: PathBuf,
}

/// 推理成功.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRes {
    /// 固定为 [`SUCCESS_MESSAGE`].
    pub message: String,

    /// 结果文件路径.
    pub output_path: String,
}

/// 失败响应.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRes {
    /// 错误描述.
    pub error: String,
}

/// 存活检查响应.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRes {
    /// 总是 `true`.
    pub ok: bool,

    /// 描述.
    pub message: String,
}

/// 所有请求共享的状态.
#[derive(Clone)]
pub struct AppState {
    service: Arc<Mutex<InferenceService>>,
}

impl AppState {
    /// 包装已经载入网络的推理服务.
    pub fn new(service: InferenceService) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
        }
    }
}

/// 构建路由.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(state)
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorRes { error })).into_response()
}

async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "BraTS segmentation service is alive".into(),
    })
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictReq>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            log::warn!("Rejected request: {}", e.body_text());
            return error_response(StatusCode::BAD_REQUEST, e.body_text());
        }
    };

    let service = state.service.clone();
    let folder = req.patient_folder;
    let res = tokio::task::spawn_blocking(move || {
        // 服务只读, 上一个请求 panic 后仍可继续使用.
        let guard = service.lock().unwrap_or_else(|p| p.into_inner());
        guard.predict(&folder)
    })
    .await;

    match res {
        Ok(Ok(path)) => Json(PredictRes {
            message: SUCCESS_MESSAGE.to_owned(),
            output_path: path.to_string_lossy().into_owned(),
        })
        .into_response(),
        Ok(Err(e)) => {
            log::error!("Prediction failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            log::error!("Prediction task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
