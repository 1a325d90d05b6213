//! 病人目录发现.
//!
//! 每个病人目录下有四个模态文件, 角色由文件名中 (不区分大小写的) 标记决定:
//! `t1.`, `t1ce.`, `t2.`, `flair.`. 标签文件名中含有 `seg`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 四种 MRI 模态. 其声明顺序即所有多通道张量的通道顺序.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// T1 加权.
    T1,
    /// 增强 T1 加权.
    T1ce,
    /// T2 加权.
    T2,
    /// 液体衰减反转恢复.
    Flair,
}

impl Modality {
    /// 固定顺序的全部模态.
    pub const ALL: [Modality; 4] = [Modality::T1, Modality::T1ce, Modality::T2, Modality::Flair];

    /// 模态在通道轴上的位置.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 小写名称.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Modality::T1 => "t1",
            Modality::T1ce => "t1ce",
            Modality::T2 => "t2",
            Modality::Flair => "flair",
        }
    }

    /// 文件名中标识该模态的标记.
    #[inline]
    pub const fn token(self) -> &'static str {
        match self {
            Modality::T1 => "t1.",
            Modality::T1ce => "t1ce.",
            Modality::T2 => "t2.",
            Modality::Flair => "flair.",
        }
    }

    /// 根据文件名判断模态. 按 [`Modality::ALL`] 的顺序测试标记, 第一个命中者胜出.
    pub fn classify(file_name: &str) -> Option<Modality> {
        let lower = file_name.to_lowercase();
        Self::ALL.into_iter().find(|m| lower.contains(m.token()))
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 未知的模态名称.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown modality `{0}`")]
pub struct UnknownModality(pub String);

impl FromStr for Modality {
    type Err = UnknownModality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownModality(s.to_owned()))
    }
}

/// 以模态为键的路径映射.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModalityPaths {
    paths: [Option<PathBuf>; 4],
}

impl ModalityPaths {
    /// 获取 `m` 对应的路径.
    #[inline]
    pub fn get(&self, m: Modality) -> Option<&Path> {
        self.paths[m.index()].as_deref()
    }

    /// 为 `m` 设置路径. 若该角色已被占用则不覆盖, 并返回 `false`.
    pub fn insert(&mut self, m: Modality, path: PathBuf) -> bool {
        let slot = &mut self.paths[m.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(path);
        true
    }

    /// 按固定顺序返回缺失的模态.
    pub fn missing(&self) -> Vec<Modality> {
        Modality::ALL
            .into_iter()
            .filter(|m| self.paths[m.index()].is_none())
            .collect()
    }

    /// 四个模态是否齐全?
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.paths.iter().all(Option::is_some)
    }

    /// 按固定顺序迭代已有的 `(模态, 路径)`.
    pub fn iter(&self) -> impl Iterator<Item = (Modality, &Path)> {
        Modality::ALL
            .into_iter()
            .filter_map(|m| self.get(m).map(|p| (m, p)))
    }

    /// 若齐全, 按固定顺序返回四个路径; 否则返回缺失的模态.
    pub fn to_array(&self) -> Result<[PathBuf; 4], Vec<Modality>> {
        match &self.paths {
            [Some(a), Some(b), Some(c), Some(d)] => {
                Ok([a.clone(), b.clone(), c.clone(), d.clone()])
            }
            _ => Err(self.missing()),
        }
    }
}

/// 病人目录发现失败.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    /// 缺失模态. 消息中列出缺失的角色.
    #[error("Missing modalities: [{}]", join_names(.missing))]
    MissingModality {
        /// 病人目录.
        folder: PathBuf,
        /// 按固定顺序排列的缺失模态.
        missing: Vec<Modality>,
    },

    /// 目录读取失败.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn join_names(ms: &[Modality]) -> String {
    ms.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ")
}

/// 文件名是否是 nifti 文件?
#[inline]
pub fn is_nifti(name: &str) -> bool {
    name.ends_with(".nii.gz") || name.ends_with(".nii")
}

/// 按文件名升序列出 `folder` 下所有普通文件的 `(文件名, 路径)`.
pub(crate) fn sorted_files(folder: &Path) -> Result<Vec<(String, PathBuf)>, DiscoverError> {
    let io_err = |source| DiscoverError::Io {
        path: folder.to_owned(),
        source,
    };
    let mut ans = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        ans.push((name.to_owned(), path.clone()));
    }
    ans.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    Ok(ans)
}

/// 定位病人目录下的四个模态文件.
///
/// 只考虑 nifti 文件. 目录项在分类前按文件名排序, 因此结果与目录枚举顺序无关;
/// 同一角色出现多个候选时, 文件名最小者胜出.
///
/// 任一模态缺失时返回 [`DiscoverError::MissingModality`], 其中列出全部缺失角色.
pub fn discover_modalities<P: AsRef<Path>>(folder: P) -> Result<ModalityPaths, DiscoverError> {
    let folder = folder.as_ref();
    let mut paths = ModalityPaths::default();
    for (name, path) in sorted_files(folder)? {
        if !is_nifti(&name) {
            continue;
        }
        if let Some(m) = Modality::classify(&name) {
            if !paths.insert(m, path) {
                log::debug!("Ignoring duplicated {m} candidate `{name}`");
            }
        }
    }

    let missing = paths.missing();
    if !missing.is_empty() {
        return Err(DiscoverError::MissingModality {
            folder: folder.to_owned(),
            missing,
        });
    }
    log::debug!("Found all modalities in {}", folder.display());
    Ok(paths)
}

/// 一位病人的文件记录.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRecord {
    /// 病人标识, 即目录名.
    pub id: String,

    /// 模态文件.
    pub images: ModalityPaths,

    /// 标签文件.
    pub label: Option<PathBuf>,
}

impl PatientRecord {
    /// 可用于训练: 四个模态齐全且有标签?
    #[inline]
    pub fn is_trainable(&self) -> bool {
        self.images.is_complete() && self.label.is_some()
    }
}

/// 以训练数据的规则整理一个病人目录: 文件名含 `seg` 的是标签,
/// 其余 nifti 文件按标记归入模态, 不匹配任何模态的文件被跳过.
pub fn collate_patient<P: AsRef<Path>>(folder: P) -> Result<PatientRecord, DiscoverError> {
    let folder = folder.as_ref();
    let id = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut images = ModalityPaths::default();
    let mut label = None;
    for (name, path) in sorted_files(folder)? {
        if !is_nifti(&name) {
            continue;
        }
        if name.contains("seg") {
            if label.is_none() {
                label = Some(path);
            }
            continue;
        }
        match Modality::classify(&name) {
            Some(m) => {
                images.insert(m, path);
            }
            None => log::warn!("Skipping `{name}` in {id}: no modality marker"),
        }
    }
    Ok(PatientRecord { id, images, label })
}

/// 整理 `root` 下每个病人子目录 (按名称排序). 单个目录的失败会被记录并跳过.
pub fn collate_dataset<P: AsRef<Path>>(root: P) -> Result<Vec<PatientRecord>, DiscoverError> {
    let root = root.as_ref();
    let dirs = super::list_patient_dirs(root).map_err(|source| DiscoverError::Io {
        path: root.to_owned(),
        source,
    })?;
    log::info!("Collating {} patient folders under {}", dirs.len(), root.display());

    let mut ans = Vec::with_capacity(dirs.len());
    for dir in dirs {
        match collate_patient(&dir) {
            Ok(r) => ans.push(r),
            Err(e) => log::warn!("Skipping {}: {e}", dir.display()),
        }
    }
    log::info!("Done with collating {}", ans.len());
    Ok(ans)
}
