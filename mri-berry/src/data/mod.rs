use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};

use crate::consts::gray::*;
use crate::Idx3d;

pub mod slice;
pub mod window;

pub use slice::{ImgWriteRaw, ImgWriteVis, LabelSlice, Plane, ScanSlice};

pub use window::IntensityWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 读写单个 nii 体数据时可能发生的错误.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// nifti 编解码失败, 包括底层 I/O 失败.
    #[error("nifti codec error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 数据不是 3D 体数据.
    #[error("expected a 3-D volume, found shape {0:?}")]
    NotVolume(Vec<usize>),

    /// 病人没有标签文件.
    #[error("no label volume for `{0}`")]
    MissingLabel(String),

    /// 数据形状与参考形状不一致.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 参考形状.
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },
}

/// nii 格式 3D MRI 单模态扫描, 包括 header 和体素强度. 强度以 `f32` 保存.
///
/// 数据按照 nifti 惯用的 `(x, y, z)` 轴序存储, 不做任何转置.
#[derive(Debug, Clone)]
pub struct MriScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

/// 从 header 读取 `(x, y, z)` 形状.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, x, y, z, ..] = h.dim;
    (x as usize, y as usize, z as usize)
}

/// 读取 nii 文件, 返回 header 与 `(x, y, z)` 行优先数据.
fn read_volume<T>(path: &Path) -> Result<(BoxedHeader, Array3<T>), VolumeError>
where
    T: nifti::DataElement + Clone,
{
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    let data = obj.into_volume().into_ndarray::<T>()?;
    let shape = data.shape().to_vec();

    // 某些文件会带有尾部长度为 1 的时间维度.
    if shape.len() < 3 || shape[3..].iter().any(|&d| d != 1) {
        return Err(VolumeError::NotVolume(shape));
    }
    let mut data = data;
    while data.ndim() > 3 {
        let last = Axis(data.ndim() - 1);
        data = data.index_axis_move(last, 0);
    }
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| VolumeError::NotVolume(shape))?;

    // nifti 数据按列优先排布, 这里统一为行优先以便后续按轴切片.
    let data = data.as_standard_layout().into_owned();
    Ok((header, data))
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小 `(x, y, z)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取单个体素分辨率 `[x, y, z]`, 以毫米为单位.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }
}

/// 生成两类体数据共用的访问方法.
macro_rules! impl_volume_common {
    ($volume: ty, $elem: ty, $slice: ident) => {
        impl NiftiHeaderAttr for $volume {
            #[inline]
            fn header(&self) -> &NiftiHeader {
                &self.header
            }

            #[inline]
            fn shape(&self) -> Idx3d {
                self.data.dim()
            }
        }

        impl Index<Idx3d> for $volume {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx3d) -> &Self::Output {
                &self.data[index]
            }
        }

        impl IndexMut<Idx3d> for $volume {
            #[inline]
            fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
                &mut self.data[index]
            }
        }

        impl $volume {
            /// 以 `header` 为参考头, 直接由 `(x, y, z)` 数据创建实体.
            ///
            /// 返回的实体的 header 维度信息与 `data` 一致, 其余几何信息照搬 `header`.
            pub fn from_array(header: &NiftiHeader, data: Array3<$elem>) -> Self {
                let mut header = Box::new(header.clone());
                let (x, y, z) = data.dim();
                header.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
                Self { header, data }
            }

            /// 获得数据的一份不可变 shallow copy.
            #[inline]
            pub fn data(&self) -> ArrayView<'_, $elem, Ix3> {
                self.data.view()
            }

            /// 取出底层数据, 丢弃 header.
            #[inline]
            pub fn into_data(self) -> Array3<$elem> {
                self.data
            }

            /// 获取 `plane` 方向上的第 `index` 层切片视图.
            ///
            /// 当 `index` 越界时 panic.
            #[inline]
            pub fn slice_at(&self, plane: Plane, index: usize) -> $slice<'_> {
                $slice::new(self.data.index_axis(Axis(plane.axis()), index))
            }

            /// `plane` 方向上的切片个数.
            #[inline]
            pub fn len_of(&self, plane: Plane) -> usize {
                self.data.len_of(Axis(plane.axis()))
            }

            /// 以 `reference` 为参考头保存到 `path`. `.gz` 后缀会自动压缩.
            ///
            /// 仿射、像素间距、qform/sform 等几何字段全部照搬 `reference`,
            /// 写入器仅更新维度与数据类型.
            pub fn save_with_header<P: AsRef<Path>>(
                &self,
                path: P,
                reference: &NiftiHeader,
            ) -> Result<(), VolumeError> {
                WriterOptions::new(path.as_ref())
                    .reference_header(reference)
                    .write_nifti(&self.data)?;
                Ok(())
            }

            /// 以自身 header 保存到 `path`.
            #[inline]
            pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VolumeError> {
                self.save_with_header(path, &self.header)
            }
        }
    };
}

impl_volume_common!(MriScan, f32, ScanSlice);
impl_volume_common!(SegLabel, u8, LabelSlice);

impl MriScan {
    /// 打开 nii 文件格式的 3D MRI 扫描. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VolumeError> {
        let (header, data) = read_volume::<f32>(path.as_ref())?;
        Ok(Self { header, data })
    }

    /// 计算全体体素强度的最小值与最大值. 非有限值会被忽略.
    ///
    /// 若不存在有限值则返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// nii 格式 3D 分割标签, 包括 header 和类别值. 标签值以 `u8` 保存.
///
/// 合法的类别为 0 (背景), 1 (坏死核心), 2 (水肿), 3 (增强肿瘤).
/// 旧版数据中的 4 会在清洗阶段被重映射为 3.
#[derive(Debug, Clone)]
pub struct SegLabel {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl SegLabel {
    /// 打开 nii 文件格式的 3D 分割标签. 浮点存储的标签会被截断为 `u8`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VolumeError> {
        let (header, data) = read_volume::<f32>(path.as_ref())?;
        let data = data.mapv(|v| if v.is_finite() { v.round() as u8 } else { 0 });
        Ok(Self { header, data })
    }

    /// 以自身 header 保存到 `path`, 数据类型沿用 header 记录的类型.
    ///
    /// 原文件以浮点或有符号整数存储标签时, 改写后仍是同一类型.
    /// header 记录的类型无法表示时按 `u8` 写出.
    pub fn save_keeping_type<P: AsRef<Path>>(&self, path: P) -> Result<(), VolumeError> {
        let w = WriterOptions::new(path.as_ref()).reference_header(&self.header);
        let d = &self.data;
        match self.header.data_type()? {
            NiftiType::Int8 => w.write_nifti(&d.mapv(|v| v as i8))?,
            NiftiType::Int16 => w.write_nifti(&d.mapv(i16::from))?,
            NiftiType::Uint16 => w.write_nifti(&d.mapv(u16::from))?,
            NiftiType::Int32 => w.write_nifti(&d.mapv(i32::from))?,
            NiftiType::Uint32 => w.write_nifti(&d.mapv(u32::from))?,
            NiftiType::Int64 => w.write_nifti(&d.mapv(i64::from))?,
            NiftiType::Uint64 => w.write_nifti(&d.mapv(u64::from))?,
            NiftiType::Float32 => w.write_nifti(&d.mapv(f32::from))?,
            NiftiType::Float64 => w.write_nifti(&d.mapv(f64::from))?,
            _ => w.write_nifti(d)?,
        }
        Ok(())
    }

    /// 获取 3D 标签中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 升序返回标签中出现过的所有不同体素值.
    pub fn unique(&self) -> Vec<u8> {
        let mut seen = [false; 256];
        self.data.iter().for_each(|&p| seen[p as usize] = true);
        (0..=u8::MAX).filter(|&v| seen[v as usize]).collect()
    }

    /// 获取标签的基本统计信息.
    ///
    /// 统计信息格式为: \[背景, 坏死核心, 水肿, 增强肿瘤\] 的体素数.
    /// 该操作不会统计任何其他体素值.
    pub fn statistics(&self) -> [usize; 4] {
        let mut ans = [0; 4];
        for pixel in self.data.iter().filter(|p| **p <= BRATS_ENHANCING) {
            ans[*pixel as usize] += 1;
        }
        ans
    }

    /// 标签中是否存在任何肿瘤体素?
    #[inline]
    pub fn has_tumor(&self) -> bool {
        self.data.iter().any(|p| is_tumor(*p))
    }

    /// 标签中是否仍存在旧版编码 4?
    #[inline]
    pub fn has_legacy(&self) -> bool {
        self.data.iter().any(|p| is_legacy(*p))
    }

    /// 将 3D 标签中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u8, new: u8) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }

    /// 生成二值掩膜: 等于 `class` 的体素为 1.0, 其余为 0.0.
    pub fn binary_mask(&self, class: u8) -> Array3<f32> {
        self.data.mapv(|p| if p == class { 1.0 } else { 0.0 })
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl SegLabel {
    /// 借助 `rayon`, 并行地将 3D 标签中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn par_replace(&mut self, old: u8, new: u8) -> usize {
        let cnt = AtomicUsize::new(0);
        self.data
            .axis_iter_mut(Axis(2))
            .into_par_iter()
            .for_each(|mut v| {
                let mut local = 0usize;
                v.iter_mut().filter(|p| **p == old).for_each(|p| {
                    local += 1;
                    *p = new;
                });
                cnt.fetch_add(local, Ordering::Release);
            });

        cnt.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn label() -> SegLabel {
        let mut data = Array3::<u8>::zeros((4, 3, 2));
        data[(0, 0, 0)] = 1;
        data[(1, 1, 1)] = 2;
        data[(2, 2, 1)] = 4;
        data[(3, 2, 0)] = 4;
        SegLabel::from_array(&NiftiHeader::default(), data)
    }

    #[test]
    fn test_label_unique_and_statistics() {
        let l = label();
        assert_eq!(l.unique(), vec![0, 1, 2, 4]);
        assert_eq!(l.statistics(), [20, 1, 1, 0]);
        assert_eq!(l.count(4), 2);
        assert!(l.has_legacy());
        assert_eq!(l.shape(), (4, 3, 2));
        assert_eq!(l.header().dim[1..4], [4, 3, 2]);
    }

    #[test]
    fn test_label_replace() {
        let mut l = label();
        assert_eq!(l.replace(4, 3), 2);
        assert_eq!(l.replace(4, 3), 0);
        assert_eq!(l.unique(), vec![0, 1, 2, 3]);
        assert!(!l.has_legacy());
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_label_par_replace() {
        let mut l = label();
        assert_eq!(l.par_replace(4, 3), 2);
        assert_eq!(l.count(3), 2);
    }

    #[test]
    fn test_label_slices() {
        let l = label();
        assert_eq!(l.len_of(Plane::Sagittal), 4);
        assert_eq!(l.len_of(Plane::Coronal), 3);
        assert_eq!(l.len_of(Plane::Axial), 2);
        let s = l.slice_at(Plane::Axial, 1);
        assert_eq!(s.shape(), (4, 3));
        assert_eq!(s.count(2), 1);
    }

    #[test]
    fn test_open_drops_trailing_time_axis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.nii.gz");
        let data = ndarray::Array4::from_shape_fn((3, 4, 2, 1), |(x, y, z, _)| (x * 8 + y * 2 + z) as f32);
        WriterOptions::new(&path).write_nifti(&data).unwrap();

        let s = MriScan::open(&path).unwrap();
        assert_eq!(s.shape(), (3, 4, 2));
        assert_eq!(s[(2, 3, 1)], 23.0);
        assert_eq!(s[(0, 1, 0)], 2.0);
    }

    #[test]
    fn test_open_rejects_time_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bold.nii.gz");
        let data = ndarray::Array4::<f32>::zeros((2, 2, 2, 3));
        WriterOptions::new(&path).write_nifti(&data).unwrap();
        assert!(matches!(MriScan::open(&path), Err(VolumeError::NotVolume(_))));
    }

    #[test]
    fn test_scan_min_max() {
        let mut data = Array3::<f32>::zeros((2, 2, 2));
        data[(0, 0, 0)] = -5.0;
        data[(1, 1, 1)] = f32::NAN;
        data[(1, 0, 1)] = 7.5;
        let s = MriScan::from_array(&NiftiHeader::default(), data);
        assert_eq!(s.min_max(), Some((-5.0, 7.5)));
    }
}
