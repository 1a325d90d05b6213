//! 体数据预处理与数据增强.
//!
//! 所有变换都作用于通道优先的 `(c, x, y, z)` 四维数组.
//! 空间变换对扫描与标签成对使用, 强度变换只作用于扫描.

mod intensity;
mod pipeline;
mod spatial;

pub use intensity::{ensure_channel_first, scale_intensity_range, shift_intensity};
pub use pipeline::{Geometry, InferencePipeline, Preprocessed, Sample, TrainingPipeline};
pub use spatial::{
    crop, flip, foreground_bbox, rand_crop_start, resize_area, resize_nearest, rot90,
    spatial_dim, spatial_pad, BoundingBox,
};
