//! 推理服务核心: 给定病人目录, 生成分割结果文件.
//!
//! 处理顺序: 定位模态 -> 预处理 -> 网络推理 -> arg-max -> 映射回原始网格 -> 保存.
//! 任一步失败都会返回 [`InferError`], 不会留下部分写入的结果.

use crate::consts::PREDICTION_FILE_NAME;
use crate::dataset::patient::join_names;
use crate::dataset::{discover_modalities, DiscoverError, Modality};
use crate::model::{ModelError, SegmentationModel};
use crate::transforms::InferencePipeline;
use crate::{SegLabel, VolumeError};
use std::path::{Path, PathBuf};

/// 推理失败的原因.
#[derive(Debug, thiserror::Error)]
pub enum InferError {
    /// 病人目录缺少模态文件.
    #[error("Missing modalities: [{}]", join_names(.missing))]
    MissingModality {
        /// 病人目录.
        folder: PathBuf,
        /// 缺失的模态.
        missing: Vec<Modality>,
    },

    /// 网络无法加载.
    #[error("model error: {0}")]
    ModelLoad(ModelError),

    /// 读写失败, 包括 nifti 编解码错误.
    #[error("{0}")]
    Io(String),

    /// 张量形状不符.
    #[error("{0}")]
    Shape(String),
}

impl From<DiscoverError> for InferError {
    fn from(e: DiscoverError) -> Self {
        match e {
            DiscoverError::MissingModality { folder, missing } => {
                Self::MissingModality { folder, missing }
            }
            e @ DiscoverError::Io { .. } => Self::Io(e.to_string()),
        }
    }
}

impl From<VolumeError> for InferError {
    fn from(e: VolumeError) -> Self {
        match e {
            e @ (VolumeError::ShapeMismatch { .. } | VolumeError::NotVolume(_)) => {
                Self::Shape(e.to_string())
            }
            e => Self::Io(e.to_string()),
        }
    }
}

impl From<ModelError> for InferError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Shape(s) => Self::Shape(s),
            e => Self::ModelLoad(e),
        }
    }
}

/// 单进程的推理服务. 网络在构造时已经载入, 之后只读使用.
pub struct InferenceService {
    model: Box<dyn SegmentationModel>,
    pipeline: InferencePipeline,
    output_dir: PathBuf,
}

impl std::fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("pipeline", &self.pipeline)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl InferenceService {
    /// 以默认预处理创建.
    pub fn new<M, P>(model: M, output_dir: P) -> Self
    where
        M: SegmentationModel + 'static,
        P: Into<PathBuf>,
    {
        Self {
            model: Box::new(model),
            pipeline: InferencePipeline::new(),
            output_dir: output_dir.into(),
        }
    }

    /// 替换预处理流水线.
    #[inline]
    pub fn with_pipeline(mut self, pipeline: InferencePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// 结果目录.
    #[inline]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 结果文件路径. 每次推理都会覆盖它.
    #[inline]
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(PREDICTION_FILE_NAME)
    }

    /// 对 `folder` 下的病人做分割, 返回结果文件路径.
    ///
    /// 结果与参考模态 (T1) 的网格一致, 并沿用其 header.
    pub fn predict<P: AsRef<Path>>(&self, folder: P) -> Result<PathBuf, InferError> {
        let folder = folder.as_ref();
        log::info!("Predicting {}", folder.display());

        let paths = discover_modalities(folder)?;
        let paths = paths.to_array().map_err(|missing| InferError::MissingModality {
            folder: folder.to_owned(),
            missing,
        })?;

        let pre = self.pipeline.run(&paths)?;
        let mask = self.model.predict(&pre.batch)?;
        let expected = self.pipeline.spatial();
        if mask.dim() != (expected[0], expected[1], expected[2]) {
            return Err(InferError::Shape(format!(
                "expected a {expected:?} mask, found {:?}",
                mask.dim()
            )));
        }

        let restored = pre.geometry.restore(mask.view());
        let label = SegLabel::from_array(&pre.reference, restored);

        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            InferError::Io(format!("failed to create {}: {e}", self.output_dir.display()))
        })?;
        let out = self.output_path();
        label.save_with_header(&out, &pre.reference)?;
        log::info!("Prediction saved to {}", out.display());
        Ok(out)
    }
}
