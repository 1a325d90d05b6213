//! 病人体数据加载器.
//!
//! 提供迭代器风格的数据集获取模式. 每次迭代只打开一位病人的文件,
//! 数据生命周期不超过一次迭代.

use super::patient::Modality;
use crate::{MriScan, NiftiHeaderAttr, SegLabel, VolumeError};
use std::path::PathBuf;

/// 一位病人的四个模态扫描与可选标签.
#[derive(Debug, Clone)]
pub struct PatientVolumes {
    /// 病人标识.
    pub id: String,

    /// 按 [`Modality::ALL`] 顺序排列的扫描.
    pub scans: [MriScan; 4],

    /// 标签.
    pub label: Option<SegLabel>,
}

impl PatientVolumes {
    /// 打开四个模态与可选标签, 并检查它们形状一致.
    pub fn open(
        id: impl Into<String>,
        images: &[PathBuf; 4],
        label: Option<&PathBuf>,
    ) -> Result<Self, VolumeError> {
        let [a, b, c, d] = images;
        let scans = [
            MriScan::open(a)?,
            MriScan::open(b)?,
            MriScan::open(c)?,
            MriScan::open(d)?,
        ];
        let label = label.map(SegLabel::open).transpose()?;

        let expected = scans[0].shape();
        let shapes = scans
            .iter()
            .map(|s| s.shape())
            .chain(label.iter().map(|l| l.shape()));
        for found in shapes {
            if found != expected {
                return Err(VolumeError::ShapeMismatch { expected, found });
            }
        }

        Ok(Self {
            id: id.into(),
            scans,
            label,
        })
    }

    /// 获取 `m` 对应的扫描.
    #[inline]
    pub fn scan(&self, m: Modality) -> &MriScan {
        &self.scans[m.index()]
    }
}

/// 从 `(标识, 四个模态路径, 标签路径)` 列表创建加载器.
pub fn volume_loader<I>(items: I) -> VolumeLoader
where
    I: IntoIterator<Item = (String, [PathBuf; 4], Option<PathBuf>)>,
{
    let mut data: Vec<_> = items.into_iter().collect();
    data.reverse();
    VolumeLoader { data_rev: data }
}

/// 病人体数据加载器.
#[derive(Debug)]
pub struct VolumeLoader {
    data_rev: Vec<(String, [PathBuf; 4], Option<PathBuf>)>,
}

impl Iterator for VolumeLoader {
    type Item = (String, Result<PatientVolumes, VolumeError>);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, images, label) = self.data_rev.pop()?;
        let data = PatientVolumes::open(id.clone(), &images, label.as_ref());
        Some((id, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.data_rev.len();
        (n, Some(n))
    }
}

impl ExactSizeIterator for VolumeLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}
