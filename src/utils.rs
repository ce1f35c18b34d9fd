use thiserror::Error;
use std::path::Path;

/// 自定义错误类型
#[derive(Error, Debug)]
pub enum EspError {
    /// 头部或子记录截断、长度越界等结构性错误
    #[error("Invalid file format: {0}")]
    Format(String),

    /// 记录或文件版本不在当前游戏版本支持的范围内
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// 字段值超出目标格式的表示范围
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// 插件的本地 ID 空间耗尽
    #[error("Local identifier space exhausted for {0}")]
    IdentifierExhausted(String),

    #[error("Invalid ModKey: {0}")]
    InvalidModKey(String),

    #[error("Invalid FormKey: {0}")]
    InvalidFormKey(String),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Record type mismatch: expected {expected}, found {found}")]
    RecordTypeMismatch { expected: String, found: String },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 库内统一的结果类型
pub type Result<T> = std::result::Result<T, EspError>;

/// 单条记录解码失败的原因
///
/// 解码结果会被缓存在记录视图中，因此需要可克隆；取出时再转换为 [`EspError`]。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{0}")]
    Format(String),

    #[error("{0}")]
    UnsupportedVersion(String),

    #[error("{0}")]
    Compression(String),
}

impl From<DecodeError> for EspError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Format(msg) => EspError::Format(msg),
            DecodeError::UnsupportedVersion(msg) => EspError::UnsupportedVersion(msg),
            DecodeError::Compression(msg) => EspError::Compression(msg),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Format(err.to_string())
    }
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<std::path::PathBuf> {
    if !file_path.exists() {
        return Err(EspError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "原文件不存在"
        )));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let backup_path = file_path.with_extension(format!("{}.bak", timestamp));

    std::fs::copy(file_path, &backup_path)?;

    Ok(backup_path)
}
