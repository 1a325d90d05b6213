//! 训练/测试集划分.
//!
//! 以固定种子打乱病人记录后按比例切分, 测试集大小为 `ceil(ratio * n)`.
//! 结果以 JSON 持久化为 `train_dataset.json` 与 `test_dataset.json`, 创建后不再修改.

use super::patient::PatientRecord;
use crate::consts::{SPLIT_SEED, SPLIT_TEST_RATIO};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 训练集文件名.
pub const TRAIN_FILE_NAME: &str = "train_dataset.json";

/// 测试集文件名.
pub const TEST_FILE_NAME: &str = "test_dataset.json";

/// 划分过程中的错误.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// 可用记录太少, 无法划分.
    #[error("need at least 2 trainable records to split, found {0}")]
    TooFew(usize),

    /// 测试集比例不在 `(0, 1)` 内.
    #[error("test ratio must be within (0, 1), found {0}")]
    BadRatio(f64),

    /// 文件读写失败.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// JSON 编解码失败.
    #[error("invalid split json: {0}")]
    Json(#[from] serde_json::Error),
}

/// 划分的一部分. `x[i]` 是第 `i` 位病人按模态顺序排列的四个扫描路径, `y[i]` 是其标签路径.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPart {
    /// 扫描路径.
    #[serde(rename = "X")]
    pub x: Vec<Vec<PathBuf>>,

    /// 标签路径.
    pub y: Vec<PathBuf>,
}

impl SplitPart {
    /// 病人个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// 迭代 `(扫描路径, 标签路径)`.
    pub fn iter(&self) -> impl Iterator<Item = (&[PathBuf], &Path)> {
        self.x
            .iter()
            .zip(self.y.iter())
            .map(|(x, y)| (x.as_slice(), y.as_path()))
    }

    fn push(&mut self, r: &PatientRecord) {
        self.x.push(r.images.iter().map(|(_, p)| p.to_owned()).collect());
        self.y.extend(r.label.clone());
    }
}

/// 训练/测试集划分.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDataset {
    /// 训练集.
    pub train: SplitPart,

    /// 测试集.
    pub test: SplitPart,
}

impl SplitDataset {
    /// 以 20% 测试比例和种子 42 划分.
    #[inline]
    pub fn from_records_default(records: &[PatientRecord]) -> Result<Self, SplitError> {
        Self::from_records(records, SPLIT_TEST_RATIO, SPLIT_SEED)
    }

    /// 划分记录. 模态不全或没有标签的记录会被记录并跳过.
    ///
    /// 打乱后前 `ceil(test_ratio * n)` 个记录为测试集, 其余为训练集.
    /// 同样的输入与种子总是得到同样的结果.
    pub fn from_records(
        records: &[PatientRecord],
        test_ratio: f64,
        seed: u64,
    ) -> Result<Self, SplitError> {
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(SplitError::BadRatio(test_ratio));
        }
        let usable: Vec<&PatientRecord> = records
            .iter()
            .filter(|r| {
                let ok = r.is_trainable();
                if !ok {
                    log::warn!("Skipping incomplete record {}", r.id);
                }
                ok
            })
            .collect();

        let n = usable.len();
        let n_test = (test_ratio * n as f64).ceil() as usize;
        if n < 2 || n_test >= n {
            return Err(SplitError::TooFew(n));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut ans = Self::default();
        for (k, &i) in order.iter().enumerate() {
            let part = if k < n_test {
                &mut ans.test
            } else {
                &mut ans.train
            };
            part.push(usable[i]);
        }
        log::info!(
            "len of X_train: {}, len of X_test: {}",
            ans.train.len(),
            ans.test.len()
        );
        Ok(ans)
    }

    /// 创建 `dir` 并写入两个 JSON 文件.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), SplitError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| SplitError::Io {
            path: dir.to_owned(),
            source,
        })?;
        for (name, part) in [(TRAIN_FILE_NAME, &self.train), (TEST_FILE_NAME, &self.test)] {
            let path = dir.join(name);
            let text = serde_json::to_string_pretty(part)?;
            std::fs::write(&path, text).map_err(|source| SplitError::Io { path, source })?;
        }
        log::info!("Datasets saved to {}", dir.display());
        Ok(())
    }

    /// 从 `dir` 读取两个 JSON 文件.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, SplitError> {
        let dir = dir.as_ref();
        let read = |name: &str| -> Result<SplitPart, SplitError> {
            let path = dir.join(name);
            let text = std::fs::read_to_string(&path)
                .map_err(|source| SplitError::Io { path, source })?;
            Ok(serde_json::from_str(&text)?)
        };
        Ok(Self {
            train: read(TRAIN_FILE_NAME)?,
            test: read(TEST_FILE_NAME)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Modality, ModalityPaths};

    fn record(i: usize, complete: bool) -> PatientRecord {
        let mut images = ModalityPaths::default();
        for m in Modality::ALL {
            if complete || m != Modality::Flair {
                images.insert(m, PathBuf::from(format!("p{i}/{m}.nii.gz")));
            }
        }
        PatientRecord {
            id: format!("p{i}"),
            images,
            label: Some(PathBuf::from(format!("p{i}/seg.nii.gz"))),
        }
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let records: Vec<_> = (0..11).map(|i| record(i, true)).collect();
        let a = SplitDataset::from_records_default(&records).unwrap();
        assert_eq!(a.test.len(), 3);
        assert_eq!(a.train.len(), 8);
        assert!(a.train.x.iter().all(|x| x.len() == 4));

        let b = SplitDataset::from_records(&records, 0.2, 42).unwrap();
        assert_eq!(a, b);

        let mut all: Vec<_> = a.train.y.iter().chain(a.test.y.iter()).cloned().collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 11);
    }

    #[test]
    fn test_split_skips_incomplete() {
        let mut records: Vec<_> = (0..5).map(|i| record(i, true)).collect();
        records.push(record(99, false));
        let s = SplitDataset::from_records_default(&records).unwrap();
        assert_eq!(s.train.len() + s.test.len(), 5);
        assert!(!s.test.y.iter().any(|p| p.starts_with("p99")));
    }

    #[test]
    fn test_split_errors() {
        let one = vec![record(0, true)];
        assert!(matches!(
            SplitDataset::from_records_default(&one),
            Err(SplitError::TooFew(1))
        ));
        assert!(matches!(
            SplitDataset::from_records(&one, 1.5, 0),
            Err(SplitError::BadRatio(_))
        ));
    }

    #[test]
    fn test_save_load() {
        let records: Vec<_> = (0..4).map(|i| record(i, true)).collect();
        let s = SplitDataset::from_records_default(&records).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("split");
        s.save(&out).unwrap();
        let text = std::fs::read_to_string(out.join(TRAIN_FILE_NAME)).unwrap();
        assert!(text.contains("\"X\""));
        assert_eq!(SplitDataset::load(&out).unwrap(), s);
    }
}
