use super::{PluginOverlay, RecordEntry};
use crate::datatypes::RecordFlags;
use crate::fields::{FieldSet, RecordBody};
use crate::form_key::{FormKey, ModKey};
use crate::mutable_record::MutableRecord;
use crate::record::{RecordHeader, RecordType};
use crate::utils::Result;
use std::fmt;

/// 单条记录的只读视图
///
/// 头部信息立即可用；字段在首次访问时解码，结果缓存在记录上，多线程同时首次访问也只会写入一次。
#[derive(Clone, Copy)]
pub struct RecordView<'a> {
    plugin: &'a PluginOverlay,
    entry: &'a RecordEntry,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(plugin: &'a PluginOverlay, entry: &'a RecordEntry) -> Self {
        RecordView { plugin, entry }
    }

    pub fn form_key(&self) -> &'a FormKey {
        &self.entry.form_key
    }

    pub fn record_type(&self) -> RecordType {
        self.entry.header.record_type
    }

    pub fn flags(&self) -> RecordFlags {
        self.entry.header.flags
    }

    pub fn form_version(&self) -> u16 {
        self.entry.header.form_version
    }

    pub fn header(&self) -> &'a RecordHeader {
        &self.entry.header
    }

    /// 所在插件
    pub fn plugin(&self) -> &'a PluginOverlay {
        self.plugin
    }

    /// 所在插件的 ModKey（覆盖记录的 FormKey 属于其他插件）
    pub fn source(&self) -> &'a ModKey {
        self.plugin.mod_key()
    }

    /// 是否已经解码
    pub fn is_decoded(&self) -> bool {
        self.entry.decoded.get().is_some()
    }

    /// 解码后的记录内容
    pub fn body(&self) -> Result<&'a RecordBody> {
        let plugin = self.plugin;
        let entry = self.entry;
        entry
            .decoded
            .get_or_init(|| plugin.decode_entry(entry))
            .as_ref()
            .map_err(|e| e.clone().into())
    }

    pub fn fields(&self) -> Result<&'a FieldSet> {
        Ok(&self.body()?.fields)
    }

    /// EditorID；无法解码或不存在时为 None
    pub fn editor_id(&self) -> Option<&'a str> {
        self.fields().ok().and_then(|f| f.string("editor_id"))
    }

    /// 完整复制为可修改记录，不再依赖插件数据
    pub fn deep_copy(&self) -> Result<MutableRecord> {
        let body = self.body()?.clone();
        let refs = self.plugin.master_references();
        let mut master_context = refs.masters().to_vec();
        master_context.push(refs.own().clone());
        Ok(MutableRecord::from_decoded(
            self.entry.form_key.clone(),
            &self.entry.header,
            body,
            master_context,
        ))
    }
}

impl fmt::Debug for RecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("source", self.source())
            .field("form_key", self.form_key())
            .field("record_type", &self.record_type())
            .field("decoded", &self.is_decoded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::release::{GameRelease, OverlayOptions};
    use crate::subrecord::Subrecord;
    use crate::test_support::PluginBuilder;

    fn plugin() -> PluginOverlay {
        let mut data = Vec::new();
        Subrecord::new(*b"EDID", b"Dagger\0".to_vec()).write(&mut data).unwrap();
        Subrecord::new(*b"KWDA", vec![7, 0, 0, 0]).write(&mut data).unwrap();
        let bytes = PluginBuilder::new(GameRelease::SkyrimSE)
            .master("Skyrim.esm")
            .record(*b"WEAP", 0x0100_0801, data)
            .build();
        PluginOverlay::from_bytes(
            ModKey::from_file_name("Mod.esp").unwrap(),
            bytes,
            &OverlayOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_fields_decoded_lazily_once() {
        let plugin = plugin();
        let view = plugin.all_records().next().unwrap();
        assert!(!view.is_decoded());

        let first = view.fields().unwrap() as *const FieldSet;
        assert!(view.is_decoded());
        let second = view.fields().unwrap() as *const FieldSet;
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_first_access() {
        let plugin = plugin();
        let view = plugin.all_records().next().unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || view.editor_id().map(str::to_string)))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().as_deref(), Some("Dagger"));
            }
        });
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let plugin = plugin();
        let view = plugin.all_records().next().unwrap();

        let mut copy = view.deep_copy().unwrap();
        copy.fields_mut()
            .set("editor_id", FieldValue::String("Changed".into()));

        assert_eq!(view.editor_id(), Some("Dagger"));
        assert_eq!(copy.form_key(), view.form_key());
        assert_eq!(copy.body().raw_subrecords().count(), 1);
        assert_eq!(
            copy.master_context(),
            &[
                ModKey::from_file_name("Skyrim.esm").unwrap(),
                ModKey::from_file_name("Mod.esp").unwrap()
            ]
        );
    }
}
