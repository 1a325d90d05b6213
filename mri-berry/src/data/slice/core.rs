use crate::consts::gray::*;
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView2, Ix2};
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

/// 切片方向. 体数据按照 `(x, y, z)` 存储, 三个正交平面分别垂直于其中一根轴.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Plane {
    /// 矢状面, 垂直于 x 轴. 切片形状为 `(y, z)`.
    Sagittal,

    /// 冠状面, 垂直于 y 轴. 切片形状为 `(x, z)`.
    Coronal,

    /// 轴状面 (水平面), 垂直于 z 轴. 切片形状为 `(x, y)`.
    Axial,
}

impl Plane {
    /// 三个平面, 按 `[轴状, 矢状, 冠状]` 排列.
    pub const ALL: [Plane; 3] = [Plane::Axial, Plane::Sagittal, Plane::Coronal];

    /// 该平面垂直的轴.
    #[inline]
    pub const fn axis(self) -> usize {
        match self {
            Plane::Sagittal => 0,
            Plane::Coronal => 1,
            Plane::Axial => 2,
        }
    }

    /// 小写名称.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Plane::Sagittal => "sagittal",
            Plane::Coronal => "coronal",
            Plane::Axial => "axial",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Plane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sagittal" => Ok(Plane::Sagittal),
            "coronal" => Ok(Plane::Coronal),
            "axial" => Ok(Plane::Axial),
            other => Err(format!("unknown plane `{other}`")),
        }
    }
}

/// 不可变、借用的二维 MRI 标签切片.
pub struct LabelSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::SegLabel`].
    data: ArrayView2<'a, u8>,
}

/// 不可变、借用的二维 MRI 扫描切片.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::MriScan`].
    data: ArrayView2<'a, f32>,
}

/// 两类切片共用的不可变方法.
macro_rules! impl_slice_immut {
    ($slice: ident, $elem: ty) => {
        impl<'a> $slice<'a> {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: ArrayView2<'a, $elem>) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<$elem> {
                self.data.view()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, $elem, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (行, 列) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&$elem> {
                self.data.get(pos)
            }

            /// 图像的分辨率 (行, 列).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &$elem)> {
                self.data.indexed_iter()
            }

            /// 克隆自己, 获得一份拥有所有权的数据.
            #[inline]
            pub fn to_owned_array(&self) -> Array2<$elem> {
                self.data.to_owned()
            }
        }

        impl Index<Idx2d> for $slice<'_> {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx2d) -> &Self::Output {
                &self.data[index]
            }
        }
    };
}

impl_slice_immut!(LabelSlice, u8);
impl_slice_immut!(ScanSlice, f32);

impl LabelSlice<'_> {
    /// 统计图像中值为 `label` 的像素总个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|&p| *p == label).count()
    }

    /// 该图是否为全背景图?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 判断图像上是否有肿瘤像素.
    #[inline]
    pub fn has_tumor(&self) -> bool {
        self.data.iter().any(|c| is_tumor(*c))
    }
}

impl ScanSlice<'_> {
    /// 切片内有限强度值的最小值与最大值. 若不存在有限值则返回 `None`.
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
