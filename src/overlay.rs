//! 插件的只读覆盖视图
//!
//! 打开时只解析 `TES4` 头部并扫描所有组与记录的头部，记录内容在首次访问时才解码并缓存。
//!
//! ```rust,ignore
//! use esp_patcher::{OverlayOptions, PluginOverlay, RecordType};
//!
//! let plugin = PluginOverlay::open("Skyrim.esm", &OverlayOptions::default())?;
//! for weapon in plugin.records(RecordType::new(*b"WEAP")) {
//!     println!("{}: {}", weapon.editor_id().unwrap_or_default(), weapon.form_key());
//! }
//! ```

mod scan;
mod stats;
mod view;

pub use stats::PluginStats;
pub use view::RecordView;

use crate::form_key::{FormKey, ModKey};
use crate::header::PluginHeader;
use crate::io::{ArchiveBytes, MmapPluginReader, PluginReader};
use crate::masters::MasterReferences;
use crate::record::{decompress_data, RecordHeader, RecordType};
use crate::release::{GameRelease, OverlayOptions};
use crate::schema::SchemaRegistry;
use crate::codec::decode_body;
use crate::fields::RecordBody;
use crate::utils::{DecodeError, EspError, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// 索引中的单条记录：头部、数据位置与解码缓存
#[derive(Debug)]
pub(crate) struct RecordEntry {
    pub(crate) header: RecordHeader,
    pub(crate) form_key: FormKey,
    /// 记录数据（不含头部）在文件中的范围
    pub(crate) span: Range<usize>,
    pub(crate) decoded: OnceLock<std::result::Result<RecordBody, DecodeError>>,
}

/// 打开时被判定为无法读取的记录
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableRecord {
    pub form_key: FormKey,
    pub record_type: RecordType,
    pub reason: String,
}

/// 插件的只读视图
///
/// 独占持有字节来源，视图释放时字节来源随之释放。
#[derive(Debug)]
pub struct PluginOverlay {
    mod_key: ModKey,
    path: Option<PathBuf>,
    options: OverlayOptions,
    header: PluginHeader,
    refs: MasterReferences,
    schemas: &'static SchemaRegistry,
    /// 记录类型（按文件中首次出现的顺序）
    record_types: Vec<RecordType>,
    groups: HashMap<RecordType, Vec<usize>>,
    entries: Vec<RecordEntry>,
    index: HashMap<FormKey, usize>,
    unreadable: Vec<UnreadableRecord>,
    group_count: usize,
    bytes: ArchiveBytes,
}

impl PluginOverlay {
    /// 以内存映射方式打开插件文件
    pub fn open(path: impl AsRef<Path>, options: &OverlayOptions) -> Result<Self> {
        Self::open_with_reader(path, &MmapPluginReader, options)
    }

    /// 使用自定义 Reader 打开插件文件
    ///
    /// # 参数
    /// * `path` - 插件文件路径，文件名决定插件的 ModKey
    /// * `reader` - 实现 PluginReader trait 的读取器
    pub fn open_with_reader(
        path: impl AsRef<Path>,
        reader: &dyn PluginReader,
        options: &OverlayOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mod_key = ModKey::from_path(path)?;
        let bytes = reader.open(path)?;
        let mut overlay = Self::from_bytes(mod_key, bytes, options)?;
        overlay.path = Some(path.to_path_buf());
        Ok(overlay)
    }

    /// 从已获取的字节来源构造视图
    pub fn from_bytes(
        mod_key: ModKey,
        bytes: impl Into<ArchiveBytes>,
        options: &OverlayOptions,
    ) -> Result<Self> {
        let bytes = bytes.into();
        let release = options.release;
        let schemas = SchemaRegistry::builtin()?;

        let (header, header_end) = PluginHeader::parse(&bytes, release)?;
        let refs = MasterReferences::new(header.masters.clone(), mod_key.clone());

        let scanned = scan::scan(&bytes, header_end, release, &refs, options.on_unsupported_record)?;

        tracing::debug!(
            "{}: 扫描完成，{} 个组，{} 条记录，{} 条无法读取",
            mod_key,
            scanned.group_count,
            scanned.entries.len(),
            scanned.unreadable.len()
        );

        Ok(PluginOverlay {
            mod_key,
            path: None,
            options: options.clone(),
            header,
            refs,
            schemas,
            record_types: scanned.record_types,
            groups: scanned.groups,
            entries: scanned.entries,
            index: scanned.index,
            unreadable: scanned.unreadable,
            group_count: scanned.group_count,
            bytes,
        })
    }

    pub fn mod_key(&self) -> &ModKey {
        &self.mod_key
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn release(&self) -> GameRelease {
        self.options.release
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }

    pub fn header(&self) -> &PluginHeader {
        &self.header
    }

    pub fn masters(&self) -> &[ModKey] {
        &self.header.masters
    }

    /// 文件中出现的记录类型（按首次出现顺序）
    pub fn record_types(&self) -> &[RecordType] {
        &self.record_types
    }

    /// 某一类型的全部记录（文件顺序）
    pub fn records(&self, record_type: RecordType) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.groups
            .get(&record_type)
            .into_iter()
            .flatten()
            .map(move |&i| RecordView::new(self, &self.entries[i]))
    }

    /// 全部记录（文件顺序）
    pub fn all_records(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        self.entries.iter().map(move |entry| RecordView::new(self, entry))
    }

    /// 按 FormKey 查找记录
    pub fn record(&self, form_key: &FormKey) -> Option<RecordView<'_>> {
        self.index
            .get(form_key)
            .map(|&i| RecordView::new(self, &self.entries[i]))
    }

    pub fn contains(&self, form_key: &FormKey) -> bool {
        self.index.contains_key(form_key)
    }

    /// 索引中的全部 FormKey（文件顺序）
    pub fn form_keys(&self) -> impl Iterator<Item = &FormKey> + '_ {
        self.entries.iter().map(|entry| &entry.form_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 打开时被判定为无法读取的记录
    pub fn unreadable(&self) -> &[UnreadableRecord] {
        &self.unreadable
    }

    /// 并行解码全部记录，返回解码失败的记录
    pub fn decode_all(&self) -> Vec<(FormKey, EspError)> {
        self.entries
            .par_iter()
            .filter_map(|entry| {
                RecordView::new(self, entry)
                    .body()
                    .err()
                    .map(|e| (entry.form_key.clone(), e))
            })
            .collect()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.group_count
    }

    pub(crate) fn master_references(&self) -> &MasterReferences {
        &self.refs
    }

    /// 解码单条记录的内容
    pub(crate) fn decode_entry(&self, entry: &RecordEntry) -> std::result::Result<RecordBody, DecodeError> {
        entry.header.check_form_version(self.options.release)?;

        let raw = &self.bytes[entry.span.clone()];
        let schema = self.schemas.get(entry.header.record_type);
        let localized = self.header.is_localized();

        if entry.header.is_compressed() {
            let data = decompress_data(raw)?;
            decode_body(schema, &data, &self.refs, localized)
        } else {
            decode_body(schema, raw, &self.refs, localized)
        }
    }
}
