use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::debug;
use serde::Deserialize;

use crate::error::ToolError;

const CONFIG_FILE_NAME: &str = "config.yml";
const APP_DIR_NAME: &str = "toggl-tools";

/// 設定ファイル全体。
///
/// ```yaml
/// toggl:
///   api-key: xxxxxxxx
/// ```
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub toggl: TogglSettings,
}

/// Toggl APIに関する設定。
#[derive(Debug, Deserialize)]
pub struct TogglSettings {
    #[serde(rename = "api-key")]
    pub api_key: String,
}

impl Settings {
    /// 設定ファイルを読み込む。
    ///
    /// `path`が指定されていない場合は、カレントディレクトリの`config.yml`、
    /// ユーザ設定ディレクトリの`toggl-tools/config.yml`の順に探す。
    ///
    /// # Arguments
    ///
    /// * `path` - コマンドラインで指定された設定ファイルのパス
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path().ok_or_else(|| {
                ToolError::Config(format!(
                    "Config file not found: {} (or in the user config directory)",
                    CONFIG_FILE_NAME
                ))
            })?,
        };
        debug!("Loading config from {}", path.display());

        let content = fs::read_to_string(&path).map_err(|err| {
            ToolError::Config(format!(
                "Error opening config file ({}): {}",
                path.display(),
                err
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// YAML文字列から設定を作成する。
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)
            .map_err(|err| ToolError::Config(format!("Error decoding config file: {}", err)))?;
        if settings.toggl.api_key.trim().is_empty() {
            return Err(ToolError::Config("toggl.api-key must not be empty".to_string()).into());
        }

        Ok(settings)
    }
}

/// 既定の設定ファイルの場所を探す。
fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}
