/// 插件文件 IO 实现
///
/// 提供基于文件系统的默认读写实现
use super::traits::{ArchiveBytes, PluginReader, PluginWriter};
use crate::utils::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// 内存映射读取器（默认）
#[derive(Debug, Clone, Default)]
pub struct MmapPluginReader;

impl PluginReader for MmapPluginReader {
    fn open(&self, path: &Path) -> Result<ArchiveBytes> {
        let file = File::open(path)?;
        // SAFETY: 映射期间文件不应被外部修改，与常规的只读映射用法相同
        let mmap = unsafe { Mmap::map(&file)? };
        tracing::debug!("已映射 {:?} ({} bytes)", path, mmap.len());
        Ok(ArchiveBytes::Mapped(mmap))
    }
}

/// 一次性读入内存的读取器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct BufferedPluginReader;

impl PluginReader for BufferedPluginReader {
    fn open(&self, path: &Path) -> Result<ArchiveBytes> {
        let bytes = std::fs::read(path)?;
        tracing::debug!("已读取 {:?} ({} bytes)", path, bytes.len());
        Ok(ArchiveBytes::Owned(bytes))
    }
}

/// 默认的插件写入器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultPluginWriter;

impl PluginWriter for DefaultPluginWriter {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<()> {
        // 确保父目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, bytes)?;
        Ok(())
    }
}
