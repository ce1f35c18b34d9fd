/// IO 抽象层模块
///
/// 插件字节来源与写出目标的抽象接口，支持依赖注入和测试替换。
///
/// # 架构设计
///
/// - **traits**: 定义 Reader/Writer trait 接口与 [`ArchiveBytes`]
/// - **plugin_io**: 基于文件系统的默认实现
///
/// # 使用示例
///
/// ```rust,ignore
/// use esp_patcher::io::{MmapPluginReader, PluginReader};
///
/// let bytes = MmapPluginReader.open(Path::new("Skyrim.esm"))?;
/// ```
pub mod traits;
pub mod plugin_io;

// === 导出 trait 定义 ===
pub use traits::{ArchiveBytes, PluginReader, PluginWriter};

// === 导出默认实现 ===
pub use plugin_io::{BufferedPluginReader, DefaultPluginWriter, MmapPluginReader};
