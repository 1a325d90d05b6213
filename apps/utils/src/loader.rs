//! 对 `mri-berry::config` 的更一层封装. 按固定顺序定位并读取配置.

use anyhow::Context;
use mri_berry::config::Config;
use std::env;
use std::path::{Path, PathBuf};

/// 指定配置文件的环境变量.
pub const CONFIG_ENV: &str = "BRATS_CONFIG";

/// 当前目录下的默认配置文件名.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// 定位配置文件.
///
/// 1. 若 `cli` 非空, 则返回其值;
/// 2. 否则, 若 `$BRATS_CONFIG` 非空, 则返回其值;
/// 3. 否则, 若当前目录下存在 `config.yaml`, 则返回它;
/// 4. 否则返回 `None`.
pub fn config_path_with<F>(cli: Option<&Path>, lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(p) = cli {
        return Some(p.to_owned());
    }
    if let Some(p) = lookup(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(p));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

/// 读取配置并应用覆盖项. 找不到配置文件时使用 `$HOME/dataset/brats` 下的默认布局.
pub fn resolve_config_with<F>(cli: Option<&Path>, lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let config = match config_path_with(cli, &lookup) {
        Some(path) => {
            log::info!("Using config file {}", path.display());
            Config::from_file(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => {
            log::info!("No config file found, using the home dataset layout");
            Config::home_default()?
        }
    };
    Ok(config.with_overrides(lookup))
}

/// 以进程环境变量调用 [`resolve_config_with`].
#[inline]
pub fn resolve_config(cli: Option<&Path>) -> anyhow::Result<Config> {
    resolve_config_with(cli, |k| env::var(k).ok())
}
