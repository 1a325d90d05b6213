//! 离线阶段共用的运行配置.
//!
//! 配置在进程启动时解析一次, 之后以只读方式传入各阶段.
//! YAML 布局与数据集准备脚本使用的 `config.yaml` 兼容:
//!
//! ```yaml
//! data:
//!   raw_data_path: /data/brats/raw
//!   split_data: /data/brats/split
//! visualaization:
//!   loc: /data/brats/vis
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::home_dataset_dir_with;

/// 读取配置时可能发生的错误.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 配置文件读取失败.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// 配置文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// YAML 解析失败.
    #[error("invalid config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 无法确定用户主目录, 也未给出显式路径.
    #[error("no home directory available for default dataset location")]
    NoHome,
}

/// 数据目录配置.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// 原始数据集目录. 其下每个子目录对应一位病人.
    pub raw_data_path: PathBuf,

    /// 训练/测试划分结果的保存目录.
    pub split_data: PathBuf,
}

/// 可视化输出配置.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualConfig {
    /// 预览切片图像的保存目录.
    pub loc: PathBuf,
}

/// 完整配置.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// 数据目录.
    pub data: DataConfig,

    /// 可视化输出. 旧配置文件中的拼写 `visualaization` 同样被接受.
    #[serde(alias = "visualaization")]
    pub visualization: VisualConfig,
}

impl Config {
    /// 以 `{用户主目录}/dataset/brats` 为根目录构建默认配置.
    pub fn home_default() -> Result<Self, ConfigError> {
        let root = home_dataset_dir_with(["brats"]).ok_or(ConfigError::NoHome)?;
        Ok(Self::under(root))
    }

    /// 以 `root` 为根目录构建配置: `root/raw`, `root/split`, `root/vis`.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            data: DataConfig {
                raw_data_path: root.join("raw"),
                split_data: root.join("split"),
            },
            visualization: VisualConfig {
                loc: root.join("vis"),
            },
        }
    }

    /// 从 YAML 文本解析配置.
    #[inline]
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// 从 YAML 文件解析配置.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// 用 `lookup` 提供的覆盖值替换对应字段.
    ///
    /// 识别的键为 `BRATS_RAW_DATA_DIR`, `BRATS_SPLIT_DIR`, `BRATS_VIS_DIR`.
    /// 空字符串视为未设置.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(p) = get("BRATS_RAW_DATA_DIR") {
            self.data.raw_data_path = p;
        }
        if let Some(p) = get("BRATS_SPLIT_DIR") {
            self.data.split_data = p;
        }
        if let Some(p) = get("BRATS_VIS_DIR") {
            self.visualization.loc = p;
        }
        self
    }
}
