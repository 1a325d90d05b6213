//! MRI scan/label 二维切片对象的操作.

mod core;
mod save;

pub use core::{LabelSlice, Plane, ScanSlice};

pub use save::{ImgWriteRaw, ImgWriteVis};

pub(crate) use save::normalize_gray;
