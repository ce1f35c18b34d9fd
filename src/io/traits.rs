/// IO 抽象层 - trait 定义
///
/// 读取端只负责提供字节，不负责解析；写入端只负责落盘，不负责序列化。

use crate::utils::Result;
use memmap2::Mmap;
use std::ops::Deref;
use std::path::Path;

/// 插件的字节来源
///
/// 由 [`crate::PluginOverlay`] 独占持有，释放时（包括打开失败时）随之解除映射或释放内存。
#[derive(Debug)]
pub enum ArchiveBytes {
    /// 内存映射文件
    Mapped(Mmap),
    /// 已读入内存的数据
    Owned(Vec<u8>),
}

impl Deref for ArchiveBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ArchiveBytes::Mapped(mmap) => mmap,
            ArchiveBytes::Owned(bytes) => bytes,
        }
    }
}

impl From<Vec<u8>> for ArchiveBytes {
    fn from(bytes: Vec<u8>) -> Self {
        ArchiveBytes::Owned(bytes)
    }
}

/// 插件读取 trait
///
/// # 职责
/// - 从环境中获取插件文件的字节
/// - 不负责解析，仅负责 IO
pub trait PluginReader {
    /// 打开插件文件
    ///
    /// # 参数
    /// * `path` - 文件路径
    fn open(&self, path: &Path) -> Result<ArchiveBytes>;
}

/// 插件写入 trait
///
/// # 职责
/// - 将序列化后的数据写入目标位置
/// - 不负责序列化，仅负责 IO
pub trait PluginWriter {
    /// 写入插件数据
    ///
    /// # 参数
    /// * `bytes` - 序列化后的插件
    /// * `path` - 目标文件路径
    fn write(&self, bytes: &[u8], path: &Path) -> Result<()>;
}
