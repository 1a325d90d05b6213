//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{
    ImgWriteRaw, ImgWriteVis, IntensityWindow, LabelSlice, MriScan, NiftiHeaderAttr, Plane,
    ScanSlice, SegLabel, VolumeError,
};

pub use crate::consts::gray::{BRATS_BACKGROUND, BRATS_EDEMA, BRATS_ENHANCING, BRATS_NECROTIC};
pub use crate::consts::{NUM_CLASSES, NUM_MODALITIES, ROI_SIZE};

pub use crate::config::Config;
pub use crate::dataset::{
    collate_dataset, discover_modalities, home_dataset_dir_with, Modality, ModalityPaths,
    PatientRecord, SplitDataset,
};
pub use crate::infer::{InferError, InferenceService};
pub use crate::model::{CpuBackend, SegmentationModel, Segmenter, UNet, UNetConfig};
pub use crate::transforms::{InferencePipeline, TrainingPipeline};
pub use crate::visual::{Scene, SegStatistics};
