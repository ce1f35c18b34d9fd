//! 游戏版本与读写配置
//!
//! 不同游戏版本的二进制格式略有差异：头部长度、`HEDR` 版本号、记录的 form version。
//! 这里集中描述这些差异，读写两端都只依赖 [`GameRelease`] 的查询方法。

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// 游戏版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum GameRelease {
    Oblivion,
    SkyrimLE,
    #[default]
    SkyrimSE,
    SkyrimVR,
    Fallout4,
}

impl GameRelease {
    /// 记录头部长度（GRUP 头部长度相同）
    pub fn header_len(&self) -> usize {
        match self {
            GameRelease::Oblivion => 20,
            _ => 24,
        }
    }

    /// 允许的 TES4 `HEDR` 版本号
    pub fn header_versions(&self) -> &'static [f32] {
        match self {
            GameRelease::Oblivion => &[0.8, 1.0],
            GameRelease::SkyrimLE => &[0.94],
            GameRelease::SkyrimSE | GameRelease::SkyrimVR => &[0.94, 1.7, 1.71],
            GameRelease::Fallout4 => &[0.95, 1.0],
        }
    }

    /// 检查 `HEDR` 版本号是否受支持
    pub fn accepts_header_version(&self, version: f32) -> bool {
        self.header_versions()
            .iter()
            .any(|v| (v - version).abs() < 0.001)
    }

    /// 新建插件时写入的 `HEDR` 版本号
    pub fn default_header_version(&self) -> f32 {
        match self {
            GameRelease::Oblivion => 1.0,
            GameRelease::SkyrimLE => 0.94,
            GameRelease::SkyrimSE | GameRelease::SkyrimVR => 1.71,
            GameRelease::Fallout4 => 1.0,
        }
    }

    /// 记录 form version 的支持范围；Oblivion 的记录头没有该字段
    pub fn form_versions(&self) -> Option<RangeInclusive<u16>> {
        match self {
            GameRelease::Oblivion => None,
            GameRelease::SkyrimLE => Some(0..=43),
            GameRelease::SkyrimSE | GameRelease::SkyrimVR => Some(0..=44),
            GameRelease::Fallout4 => Some(0..=131),
        }
    }

    /// 新建记录时写入的 form version
    pub fn default_form_version(&self) -> u16 {
        match self {
            GameRelease::Oblivion => 0,
            GameRelease::SkyrimLE => 43,
            GameRelease::SkyrimSE | GameRelease::SkyrimVR => 44,
            GameRelease::Fallout4 => 131,
        }
    }
}

/// 遇到不支持的记录版本时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedRecordPolicy {
    /// 记录保留在索引中，访问字段时返回 `UnsupportedVersion`
    #[default]
    Report,
    /// 记录不进入索引
    Skip,
}

/// 打开插件时的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayOptions {
    pub release: GameRelease,
    pub on_unsupported_record: UnsupportedRecordPolicy,
}

impl OverlayOptions {
    pub fn new(release: GameRelease) -> Self {
        Self {
            release,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: UnsupportedRecordPolicy) -> Self {
        self.on_unsupported_record = policy;
        self
    }

    /// 从 JSON 读取配置，缺省字段使用默认值
    pub fn from_json_str(json: &str) -> crate::utils::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 写出插件时的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// 目标文件已存在时先创建带时间戳的备份
    pub backup_existing: bool,
}
