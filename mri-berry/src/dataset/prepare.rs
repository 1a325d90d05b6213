//! 数据集清洗.
//!
//! 原始数据目录下每个子目录对应一位病人. 清洗包括:
//!
//! 1. 文件名编号一致性检查 (只报告, 不修改);
//! 2. 预览一位病人每个文件的中间 5 个轴状切片;
//! 3. 找出标签类别数不为 4 的病人目录并递归删除 (不可逆);
//! 4. 将标签中的历史编码 4 改写为 3, 保留原 header 重新保存.
//!
//! 单个目录的失败会被记录并跳过, 整批任务继续.

use super::list_patient_dirs;
use super::patient::{is_nifti, sorted_files, DiscoverError};
use crate::consts::gray::{BRATS_ENHANCING, BRATS_LEGACY_ENHANCING};
use crate::consts::EXPECTED_LABEL_CLASSES;
use crate::data::slice::normalize_gray;
use crate::{MriScan, NiftiHeaderAttr, Plane, SegLabel, VolumeError};
use std::path::{Path, PathBuf};

/// 清洗过程中的错误.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// 文件系统操作失败.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// 体数据读写失败.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// 预览图像保存失败.
    #[error("failed to save preview: {0}")]
    Image(#[from] image::ImageError),
}

impl From<DiscoverError> for PrepareError {
    fn from(e: DiscoverError) -> Self {
        match e {
            DiscoverError::Io { path, source } => PrepareError::Io { path, source },
            other => PrepareError::Io {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
            },
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PrepareError + '_ {
    move |source| PrepareError::Io {
        path: path.to_owned(),
        source,
    }
}

/// 文件名编号与目录编号不一致.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMismatch {
    /// 病人目录名.
    pub folder: String,

    /// 不一致的文件名.
    pub file: String,
}

/// 取 `_` 分隔的第 `n` 段.
#[inline]
fn segment(name: &str, n: usize) -> Option<&str> {
    name.split('_').nth(n)
}

/// 文件是否是标签文件: 若文件名有第三个 `_` 分隔段, 则要求该段含有 `seg`,
/// 否则要求文件名任意位置含有 `seg`.
pub fn is_label_file(name: &str) -> bool {
    match segment(name, 2) {
        Some(s) => s.contains("seg"),
        None => name.contains("seg"),
    }
}

/// 找到病人目录下的标签文件. 多个候选时文件名最小者胜出.
pub fn find_label_file(folder: &Path) -> Result<Option<PathBuf>, PrepareError> {
    Ok(sorted_files(folder)?
        .into_iter()
        .find(|(name, _)| is_nifti(name) && is_label_file(name))
        .map(|(_, p)| p))
}

/// 检查每个病人目录下的文件名编号是否与目录编号一致.
///
/// 例如目录 `BraTS2021_00000` 下的文件都应形如 `BraTS2021_00000_*`.
/// 目录名本身没有编号段时跳过该目录.
pub fn check_file_names<P: AsRef<Path>>(root: P) -> Result<Vec<NameMismatch>, PrepareError> {
    let root = root.as_ref();
    let mut ans = Vec::new();
    for dir in list_patient_dirs(root).map_err(io_err(root))? {
        let folder = dir_name(&dir);
        let Some(number) = segment(&folder, 1) else {
            log::warn!("Folder `{folder}` has no numeric segment, skipped");
            continue;
        };
        let files = match sorted_files(&dir) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("{e}");
                continue;
            }
        };
        for (file, _) in files {
            if segment(&file, 1) != Some(number) {
                log::warn!("File name should be changed: {folder} {file}");
                ans.push(NameMismatch {
                    folder: folder.clone(),
                    file,
                });
            }
        }
    }
    log::info!("Done checking file names, {} mismatches", ans.len());
    Ok(ans)
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// 标签文件的类别数是否合格? 没有标签文件的目录视为合格.
fn label_cardinality(dir: &Path) -> Result<Option<usize>, PrepareError> {
    let Some(path) = find_label_file(dir)? else {
        return Ok(None);
    };
    let label = SegLabel::open(&path)?;
    Ok(Some(label.unique().len()))
}

/// 找出标签中不同体素值个数不为 4 的病人目录.
///
/// 读取失败的目录会被记录并跳过, 不会被标记.
pub fn identify_unwanted<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>, PrepareError> {
    let root = root.as_ref();
    let dirs = list_patient_dirs(root).map_err(io_err(root))?;

    let judge = |dir: &PathBuf| -> Option<PathBuf> {
        match label_cardinality(dir) {
            Ok(Some(n)) if n != EXPECTED_LABEL_CLASSES => {
                log::info!("{} has {n} label classes", dir.display());
                Some(dir.clone())
            }
            Ok(_) => None,
            Err(e) => {
                log::warn!("Error processing {}: {e}", dir.display());
                None
            }
        }
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::prelude::*;
            let ans: Vec<PathBuf> = dirs.par_iter().filter_map(judge).collect();
        } else {
            let ans: Vec<PathBuf> = dirs.iter().filter_map(judge).collect();
        }
    }
    log::info!("No. of unwanted folders: {}", ans.len());
    Ok(ans)
}

/// 删除结果.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// 已删除的目录.
    pub deleted: Vec<PathBuf>,

    /// 删除失败的目录与原因.
    pub failed: Vec<(PathBuf, String)>,
}

/// 递归删除给定目录. 单个目录失败会被记录, 其余目录继续删除. 不可逆.
pub fn delete_unwanted<I, P>(folders: I) -> DeleteReport
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut report = DeleteReport::default();
    for f in folders {
        let f = f.as_ref();
        match std::fs::remove_dir_all(f) {
            Ok(()) => {
                log::info!("Removed {}", f.display());
                report.deleted.push(f.to_owned());
            }
            Err(e) => {
                log::warn!("Failed to remove {}: {e}", f.display());
                report.failed.push((f.to_owned(), e.to_string()));
            }
        }
    }
    report
}

/// 标签重映射结果.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    /// 被改写的标签文件.
    pub rewritten: Vec<PathBuf>,

    /// 被改写的体素总数.
    pub voxels: usize,

    /// 处理失败的目录与原因.
    pub failed: Vec<(PathBuf, String)>,
}

/// 将单个标签文件中的 4 改写为 3, 数据类型保持不变. 没有 4 时不改写文件, 返回 `Ok(0)`.
pub fn remap_label_file(path: &Path) -> Result<usize, PrepareError> {
    let mut label = SegLabel::open(path)?;
    if !label.has_legacy() {
        return Ok(0);
    }
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let n = label.par_replace(BRATS_LEGACY_ENHANCING, BRATS_ENHANCING);
        } else {
            let n = label.replace(BRATS_LEGACY_ENHANCING, BRATS_ENHANCING);
        }
    }
    label.save_keeping_type(path)?;
    Ok(n)
}

/// 将 `root` 下所有标签中的历史编码 4 改写为 3. 可重复执行.
pub fn remap_legacy_labels<P: AsRef<Path>>(root: P) -> Result<RemapReport, PrepareError> {
    let root = root.as_ref();
    let mut report = RemapReport::default();
    for dir in list_patient_dirs(root).map_err(io_err(root))? {
        let res = find_label_file(&dir).and_then(|p| match p {
            Some(p) => remap_label_file(&p).map(|n| (p, n)).map(Some),
            None => Ok(None),
        });
        match res {
            Ok(Some((p, n))) if n > 0 => {
                log::debug!("Remapped {n} voxels in {}", p.display());
                report.voxels += n;
                report.rewritten.push(p);
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Error relabeling {}: {e}", dir.display());
                report.failed.push((dir, e.to_string()));
            }
        }
    }
    log::info!(
        "Relabeled {} files ({} voxels)",
        report.rewritten.len(),
        report.voxels
    );
    Ok(report)
}

/// 每个文件预览的切片个数.
pub const PREVIEW_SLICES: usize = 5;

/// 将 `scan` 中间 5 个轴状切片横向拼接成一张灰度图. 每个切片按自身最小/最大值规范化.
pub fn preview_montage(scan: &MriScan) -> image::GrayImage {
    let n = scan.len_of(Plane::Axial);
    let mid = n / 2;
    let first = mid.saturating_sub(PREVIEW_SLICES / 2);
    let last = (first + PREVIEW_SLICES).min(n);

    let (rows, cols, _) = scan.shape();
    let mut buf = image::GrayImage::new((cols * (last - first)) as u32, rows as u32);
    for (k, z) in (first..last).enumerate() {
        let sli = scan.slice_at(Plane::Axial, z);
        let (lo, hi) = sli.min_max().unwrap_or((0.0, 0.0));
        for ((r, c), &v) in sli.indexed_iter() {
            let x = (k * cols + c) as u32;
            buf.put_pixel(x, r as u32, image::Luma([normalize_gray(v, lo, hi)]));
        }
    }
    buf
}

/// 为病人目录中的每个 nifti 文件保存中间切片预览 `slices_{角色}.png`.
///
/// 单个文件失败会被记录并跳过. 返回成功保存的图片路径.
pub fn preview_patient<P: AsRef<Path>, Q: AsRef<Path>>(
    folder: P,
    save_location: Q,
) -> Result<Vec<PathBuf>, PrepareError> {
    let (folder, out) = (folder.as_ref(), save_location.as_ref());
    std::fs::create_dir_all(out).map_err(io_err(out))?;

    let mut ans = Vec::new();
    for (name, path) in sorted_files(folder)? {
        if !is_nifti(&name) {
            continue;
        }
        let role = segment(&name, 2).unwrap_or(&name);
        let role = role.trim_end_matches(".gz").trim_end_matches(".nii");
        let save = out.join(format!("slices_{role}.png"));
        let res = MriScan::open(&path)
            .map_err(PrepareError::from)
            .and_then(|scan| {
                log::info!("Shape of volume {name}: {:?}", scan.shape());
                preview_montage(&scan).save(&save).map_err(PrepareError::from)
            });
        match res {
            Ok(()) => {
                log::info!("Figure saved at: {}", save.display());
                ans.push(save);
            }
            Err(e) => log::warn!("Error with file {name}: {e}"),
        }
    }
    Ok(ans)
}

/// 清洗结果汇总.
#[derive(Debug, Clone, Default)]
pub struct PrepareReport {
    /// 病人目录个数 (清洗前).
    pub patients: usize,

    /// 文件名不一致项.
    pub mismatches: Vec<NameMismatch>,

    /// 预览图片.
    pub previews: Vec<PathBuf>,

    /// 被标记的目录.
    pub unwanted: Vec<PathBuf>,

    /// 删除结果. 只标记不删除时为空.
    pub deleted: DeleteReport,

    /// 标签重映射结果.
    pub remap: RemapReport,
}

/// 数据集清洗流程.
#[derive(Debug, Clone)]
pub struct Preparer {
    raw_dir: PathBuf,
    preview_dir: PathBuf,
    delete: bool,
}

impl Preparer {
    /// 以原始数据目录和预览图片目录创建清洗流程. 默认会删除被标记的目录.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(raw_dir: P, preview_dir: Q) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            preview_dir: preview_dir.into(),
            delete: true,
        }
    }

    /// 由配置创建.
    #[inline]
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(&config.data.raw_data_path, &config.visualization.loc)
    }

    /// 设置是否真正删除被标记的目录.
    #[inline]
    pub fn with_deletion(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// 依次执行: 概况 -> 文件名检查 -> 预览 -> 标记 -> 删除 -> 重映射.
    pub fn run(&self) -> Result<PrepareReport, PrepareError> {
        let root = self.raw_dir.as_path();
        let dirs = list_patient_dirs(root).map_err(io_err(root))?;
        log::info!("Length of dataset: {}", dirs.len());

        let mut report = PrepareReport {
            patients: dirs.len(),
            ..Default::default()
        };
        if let Some(first) = dirs.first() {
            log::info!("Sample folder: {}", first.display());
        }

        report.mismatches = check_file_names(root)?;

        if let Some(first) = dirs.first() {
            report.previews = preview_patient(first, &self.preview_dir)?;
        }

        report.unwanted = identify_unwanted(root)?;
        if self.delete {
            log::info!("Removing unwanted folders");
            report.deleted = delete_unwanted(&report.unwanted);
        } else {
            log::info!("Deletion disabled, {} folders kept", report.unwanted.len());
        }

        log::info!("Making label 4->3");
        report.remap = remap_legacy_labels(root)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::writer::WriterOptions;
    use nifti::{NiftiObject, NiftiType, ReaderOptions};

    fn stored_type(path: &Path) -> NiftiType {
        let obj = ReaderOptions::new().read_file(path).unwrap();
        obj.header().data_type().unwrap()
    }

    #[test]
    fn test_remap_keeps_float_datatype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BraTS2020_001_seg.nii.gz");
        let data = Array3::from_shape_fn((4, 3, 2), |(x, _, _)| x as f32);
        WriterOptions::new(&path).write_nifti(&data).unwrap();
        assert_eq!(stored_type(&path), NiftiType::Float32);

        assert_eq!(remap_label_file(&path).unwrap(), 0);
        let n = {
            let data = Array3::from_shape_fn((4, 3, 2), |(x, _, _)| if x == 3 { 4.0f32 } else { x as f32 });
            WriterOptions::new(&path).write_nifti(&data).unwrap();
            remap_label_file(&path).unwrap()
        };
        assert_eq!(n, 6);
        assert_eq!(stored_type(&path), NiftiType::Float32);

        let back = SegLabel::open(&path).unwrap();
        assert!(!back.has_legacy());
        assert_eq!(back.count(3), 6);
        assert_eq!(back.statistics(), [6, 6, 6, 6]);
    }

    #[test]
    fn test_remap_keeps_int16_datatype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.nii");
        let mut data = Array3::<i16>::zeros((3, 3, 3));
        data[(1, 1, 1)] = 4;
        data[(0, 1, 2)] = 2;
        WriterOptions::new(&path).write_nifti(&data).unwrap();

        assert_eq!(remap_label_file(&path).unwrap(), 1);
        assert_eq!(stored_type(&path), NiftiType::Int16);
        let back = SegLabel::open(&path).unwrap();
        assert_eq!(back[(1, 1, 1)], 3);
        assert_eq!(back[(0, 1, 2)], 2);
    }

    #[test]
    fn test_is_label_file() {
        assert!(is_label_file("BraTS2021_00000_seg.nii.gz"));
        assert!(!is_label_file("BraTS2021_00000_t1.nii.gz"));
        assert!(is_label_file("seg.nii.gz"));
        // `seg` 出现在非第三段时不算.
        assert!(!is_label_file("segment_00000_t1.nii.gz"));
    }

    #[test]
    fn test_segment() {
        assert_eq!(segment("BraTS2021_00012_flair.nii.gz", 1), Some("00012"));
        assert_eq!(segment("BraTS2021_00012_flair.nii.gz", 2), Some("flair.nii.gz"));
        assert_eq!(segment("flair.nii.gz", 1), None);
    }

    #[test]
    fn test_check_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("BraTS2021_00001");
        std::fs::create_dir(&p).unwrap();
        for n in ["BraTS2021_00001_t1.nii.gz", "BraTS2021_00002_t2.nii.gz"] {
            std::fs::write(p.join(n), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("misc")).unwrap();

        let m = check_file_names(dir.path()).unwrap();
        assert_eq!(
            m,
            vec![NameMismatch {
                folder: "BraTS2021_00001".to_owned(),
                file: "BraTS2021_00002_t2.nii.gz".to_owned(),
            }]
        );
    }

    #[test]
    fn test_delete_unwanted_continues() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::create_dir_all(a.join("inner")).unwrap();
        let ghost = dir.path().join("ghost");
        let r = delete_unwanted([&ghost, &a]);
        assert_eq!(r.deleted, vec![a.clone()]);
        assert_eq!(r.failed.len(), 1);
        assert!(!a.exists());
    }
}
