//! 覆盖/补丁插件
//!
//! [`MutablePlugin`] 是正在组装的新插件。写入 FormKey 属于其他插件的记录即为覆盖，
//! 记录插入时就标记为 [`RecordOrigin::New`] 或 [`RecordOrigin::OverridesOriginIn`]。

mod writer;

use crate::datatypes::RecordFlags;
use crate::form_key::{FormKey, ModKey, ModType, MAX_LOCAL_ID};
use crate::header::PluginHeader;
use crate::mutable_record::MutableRecord;
use crate::overlay::{PluginOverlay, RecordView};
use crate::record::RecordType;
use crate::release::GameRelease;
use crate::schema::SchemaRegistry;
use crate::utils::{EspError, Result};
use std::collections::{BTreeMap, HashMap};

/// 新插件分配的第一个本地 ID（更小的 ID 保留给引擎）
pub const FIRST_LOCAL_ID: u32 = 0x800;

/// 记录与所在插件的关系
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOrigin {
    /// 插件自己的新记录
    New,
    /// 覆盖其他插件中的记录
    OverridesOriginIn(ModKey),
}

#[derive(Debug, Clone)]
struct PatchEntry {
    record: MutableRecord,
    origin: RecordOrigin,
}

/// 可修改的插件
#[derive(Debug, Clone)]
pub struct MutablePlugin {
    mod_key: ModKey,
    release: GameRelease,
    header: PluginHeader,
    groups: BTreeMap<RecordType, BTreeMap<FormKey, PatchEntry>>,
    types: HashMap<FormKey, RecordType>,
    next_id: u32,
}

impl MutablePlugin {
    pub fn new(mod_key: ModKey, release: GameRelease) -> Self {
        let mut header = PluginHeader::new(release);
        match mod_key.mod_type() {
            ModType::Master => header.flags |= RecordFlags::MASTER_FILE,
            ModType::Light => header.flags |= RecordFlags::LIGHT_MASTER,
            ModType::Plugin => {}
        }
        MutablePlugin {
            mod_key,
            release,
            header,
            groups: BTreeMap::new(),
            types: HashMap::new(),
            next_id: FIRST_LOCAL_ID,
        }
    }

    /// 完整读入一个插件（所有记录都会被解码）
    pub fn from_overlay(overlay: &PluginOverlay) -> Result<Self> {
        let mut plugin = MutablePlugin::new(overlay.mod_key().clone(), overlay.release());
        let source = overlay.header();
        plugin.header.flags = source.flags;
        plugin.header.version = source.version;
        plugin.header.author = source.author.clone();
        plugin.header.description = source.description.clone();
        plugin.header.masters = source.masters.clone();
        plugin.next_id = source.next_object_id.max(FIRST_LOCAL_ID);

        for view in overlay.all_records() {
            plugin.set_record(view.deep_copy()?);
        }
        Ok(plugin)
    }

    pub fn mod_key(&self) -> &ModKey {
        &self.mod_key
    }

    pub fn release(&self) -> GameRelease {
        self.release
    }

    pub fn header(&self) -> &PluginHeader {
        &self.header
    }

    pub fn set_author(&mut self, author: &str) {
        self.header.author = Some(author.to_string());
    }

    pub fn set_description(&mut self, description: &str) {
        self.header.description = Some(description.to_string());
    }

    /// 设置 `LOCALIZED` 标志；本地化插件中可本地化的字符串只能以字符串表 ID 写出
    pub fn set_localized(&mut self, localized: bool) {
        self.header.flags.set(RecordFlags::LOCALIZED, localized);
    }

    pub fn is_localized(&self) -> bool {
        self.header.is_localized()
    }

    /// 预先指定主文件，写出时排在其余被引用插件之前
    pub fn add_master(&mut self, master: ModKey) {
        if master != self.mod_key && !self.header.masters.contains(&master) {
            self.header.masters.push(master);
        }
    }

    /// 下一个将要分配的本地 ID
    pub fn next_local_id(&self) -> u32 {
        self.next_id
    }

    /// 插入或替换记录，返回被替换的旧记录
    pub fn set_record(&mut self, record: MutableRecord) -> Option<MutableRecord> {
        let form_key = record.form_key().clone();
        let origin = if *form_key.mod_key() == self.mod_key {
            if form_key.id() >= self.next_id {
                self.next_id = form_key.id() + 1;
            }
            RecordOrigin::New
        } else {
            RecordOrigin::OverridesOriginIn(form_key.mod_key().clone())
        };

        // 同一 FormKey 换了记录类型时先移除旧记录
        let old_type = self.types.get(&form_key).copied();
        let previous = match old_type {
            Some(old_type) if old_type != record.record_type() => self.remove_record(&form_key),
            _ => None,
        };

        tracing::debug!("{}: 写入记录 {} ({:?})", self.mod_key, form_key, origin);
        self.types.insert(form_key.clone(), record.record_type());
        let replaced = self
            .groups
            .entry(record.record_type())
            .or_default()
            .insert(form_key, PatchEntry { record, origin });
        replaced.map(|entry| entry.record).or(previous)
    }

    /// 分配新的本地 ID 并插入一条空白记录
    pub fn add_new(&mut self, record_type: RecordType) -> Result<&mut MutableRecord> {
        if SchemaRegistry::builtin()?.get(record_type).is_none() {
            return Err(EspError::UnknownRecordType(format!(
                "没有 {} 的记录结构定义",
                record_type
            )));
        }
        if self.next_id > MAX_LOCAL_ID {
            return Err(EspError::IdentifierExhausted(self.mod_key.to_string()));
        }

        let form_key = FormKey::new(self.mod_key.clone(), self.next_id)?;
        self.next_id += 1;

        let record = MutableRecord::new(form_key.clone(), record_type, self.release);
        self.set_record(record);
        self.record_mut(&form_key)
            .ok_or_else(|| EspError::Format(format!("新记录 {} 插入失败", form_key)))
    }

    /// 删除记录；本地 ID 不会被回收
    pub fn remove_record(&mut self, form_key: &FormKey) -> Option<MutableRecord> {
        let record_type = self.types.remove(form_key)?;
        let group = self.groups.get_mut(&record_type)?;
        let removed = group.remove(form_key);
        if group.is_empty() {
            self.groups.remove(&record_type);
        }
        removed.map(|entry| entry.record)
    }

    /// 取得记录的覆盖版本；尚未加入时从视图完整复制
    pub fn get_or_add_as_override(&mut self, view: &RecordView<'_>) -> Result<&mut MutableRecord> {
        if !self.types.contains_key(view.form_key()) {
            self.set_record(view.deep_copy()?);
        }
        self.record_mut(view.form_key())
            .ok_or_else(|| EspError::Format(format!("记录 {} 插入失败", view.form_key())))
    }

    pub fn record(&self, form_key: &FormKey) -> Option<&MutableRecord> {
        self.entry(form_key).map(|entry| &entry.record)
    }

    pub fn record_mut(&mut self, form_key: &FormKey) -> Option<&mut MutableRecord> {
        let record_type = self.types.get(form_key)?;
        self.groups
            .get_mut(record_type)?
            .get_mut(form_key)
            .map(|entry| &mut entry.record)
    }

    /// 记录插入时确定的来源
    pub fn origin(&self, form_key: &FormKey) -> Option<&RecordOrigin> {
        self.entry(form_key).map(|entry| &entry.origin)
    }

    /// 某一类型的全部记录（按 FormKey 排序）
    pub fn records(&self, record_type: RecordType) -> impl Iterator<Item = &MutableRecord> + '_ {
        self.groups
            .get(&record_type)
            .into_iter()
            .flat_map(|group| group.values().map(|entry| &entry.record))
    }

    /// 包含记录的类型（排序后）
    pub fn record_types(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.groups.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn entry(&self, form_key: &FormKey) -> Option<&PatchEntry> {
        let record_type = self.types.get(form_key)?;
        self.groups.get(record_type)?.get(form_key)
    }
}
