//! 可修改的记录
//!
//! [`MutableRecord`] 完全解码、独立持有数据，修改不会影响来源插件。
//! 字段合并（[`MutableRecord::deep_copy_in`]）按记录结构定义递归处理。

use crate::datatypes::RecordFlags;
use crate::fields::{FieldSet, FieldValue, RecordBody};
use crate::form_key::{FormKey, ModKey};
use crate::mask::TranslationMask;
use crate::record::{RecordHeader, RecordType};
use crate::release::GameRelease;
use crate::schema::{FieldDef, FieldKind, RecordSchema, SchemaRegistry};
use crate::utils::{EspError, Result};

/// 完全解码的可修改记录
#[derive(Debug, Clone, PartialEq)]
pub struct MutableRecord {
    form_key: FormKey,
    record_type: RecordType,
    pub flags: RecordFlags,
    pub timestamp: u16,
    pub version_control_info: u16,
    pub form_version: u16,
    pub unknown: u16,
    body: RecordBody,
    /// 原样保存的子记录中的 FormID 按这个主文件列表解释；为空时按写出插件的主文件列表解释
    master_context: Vec<ModKey>,
}

impl MutableRecord {
    /// 新建空白记录
    pub fn new(form_key: FormKey, record_type: RecordType, release: GameRelease) -> Self {
        MutableRecord {
            form_key,
            record_type,
            flags: RecordFlags::empty(),
            timestamp: 0,
            version_control_info: 0,
            form_version: release.default_form_version(),
            unknown: 0,
            body: RecordBody::default(),
            master_context: Vec::new(),
        }
    }

    /// 由已解码的记录头和内容构造
    ///
    /// `master_context` 为来源插件的主文件列表加上来源插件自身。
    pub(crate) fn from_decoded(
        form_key: FormKey,
        header: &RecordHeader,
        body: RecordBody,
        master_context: Vec<ModKey>,
    ) -> Self {
        MutableRecord {
            form_key,
            record_type: header.record_type,
            flags: header.flags,
            timestamp: header.timestamp,
            version_control_info: header.version_control_info,
            form_version: header.form_version,
            unknown: header.unknown,
            body,
            master_context,
        }
    }

    pub fn form_key(&self) -> &FormKey {
        &self.form_key
    }

    /// 重新指定 FormKey（不再是原记录的覆盖）
    pub fn set_form_key(&mut self, form_key: FormKey) {
        self.form_key = form_key;
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn body(&self) -> &RecordBody {
        &self.body
    }

    /// 直接修改字段与子记录顺序
    pub fn body_mut(&mut self) -> &mut RecordBody {
        &mut self.body
    }

    pub fn fields(&self) -> &FieldSet {
        &self.body.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.body.fields
    }

    pub fn master_context(&self) -> &[ModKey] {
        &self.master_context
    }

    /// 指定原样保存的子记录所用的主文件列表（最后一项通常是来源插件自身）
    pub fn set_master_context(&mut self, master_context: Vec<ModKey>) {
        self.master_context = master_context;
    }

    pub fn editor_id(&self) -> Option<&str> {
        self.body.fields.string("editor_id")
    }

    pub fn set_editor_id(&mut self, editor_id: &str) {
        self.body
            .fields
            .set("editor_id", FieldValue::String(editor_id.to_string()));
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(RecordFlags::DELETED)
    }

    /// 该记录类型的结构定义
    pub fn schema(&self) -> Result<Option<&'static RecordSchema>> {
        Ok(SchemaRegistry::builtin()?.get(self.record_type))
    }

    /// 子结构字段；不存在时按零值创建
    pub fn block_or_default(&mut self, name: &str) -> Result<&mut FieldSet> {
        if self.body.fields.block(name).is_none() {
            let schema = self.schema()?.ok_or_else(|| {
                EspError::UnknownRecordType(self.record_type.to_string())
            })?;
            let def = schema
                .field(name)
                .filter(|def| def.is_struct())
                .ok_or_else(|| {
                    EspError::Encoding(format!("{} 没有名为 {} 的子结构", schema.name, name))
                })?;
            self.body
                .fields
                .set(name, FieldValue::Block(FieldSet::zeroed(def.members())));
        }
        self.body
            .fields
            .block_mut(name)
            .ok_or_else(|| EspError::Encoding(format!("字段 {} 不是子结构", name)))
    }

    /// 按掩码把模板记录的字段复制到当前记录
    ///
    /// 模板缺少的字段不做处理；结构定义未描述的子记录跟随掩码默认值。
    pub fn deep_copy_in(&mut self, template: &MutableRecord, mask: &TranslationMask) -> Result<()> {
        if self.record_type != template.record_type {
            return Err(EspError::RecordTypeMismatch {
                expected: self.record_type.to_string(),
                found: template.record_type.to_string(),
            });
        }

        if let Some(schema) = self.schema()? {
            merge_fields(&schema.fields, &mut self.body.fields, &template.body.fields, mask);
        }

        // 原样保存的子记录整体来自模板，FormID 索引随之按模板的主文件列表解释
        if mask.default_include() {
            self.body.layout = template.body.layout.clone();
            self.master_context = template.master_context.clone();
        }

        Ok(())
    }
}

fn merge_fields(defs: &[FieldDef], target: &mut FieldSet, template: &FieldSet, mask: &TranslationMask) {
    for def in defs {
        if !mask.includes(&def.name) {
            continue;
        }
        let Some(source) = template.get(&def.name) else {
            continue;
        };

        match (&def.kind, source, mask.sub_mask(&def.name)) {
            (FieldKind::Struct(members), FieldValue::Block(source_block), Some(sub)) => {
                if target.block(&def.name).is_none() {
                    target.set(&def.name, FieldValue::Block(FieldSet::zeroed(members)));
                }
                if let Some(target_block) = target.block_mut(&def.name) {
                    merge_fields(members, target_block, source_block, sub);
                    if sub.default_include() {
                        target_block.set_trailing(source_block.trailing().to_vec());
                    }
                }
            }
            _ => {
                target.set(&def.name, source.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Slot;
    use crate::subrecord::Subrecord;

    const WEAPON: RecordType = RecordType(*b"WEAP");

    fn weapon(id: &str, editor_id: &str, damage: i64) -> MutableRecord {
        let mut record = MutableRecord::new(id.parse().unwrap(), WEAPON, GameRelease::SkyrimSE);
        record.set_editor_id(editor_id);
        record
            .fields_mut()
            .set("name", FieldValue::String(format!("{} Name", editor_id)));
        record
            .fields_mut()
            .set("description", FieldValue::String(format!("{} Desc", editor_id)));
        let stats = record.block_or_default("basic_stats").unwrap();
        stats.set("damage", FieldValue::Int(damage));
        stats.set("value", FieldValue::Int(damage * 10));
        stats.set("weight", FieldValue::Float(2.0));
        record
    }

    #[test]
    fn test_mask_excludes_single_field() {
        let mut target = weapon("000800:Out.esp", "Target", 5);
        let template = weapon("000801:Base.esm", "Template", 40);

        let mask = TranslationMask::all().with("name", false);
        target.deep_copy_in(&template, &mask).unwrap();

        assert_eq!(target.fields().string("name"), Some("Target Name"));
        assert_eq!(target.editor_id(), Some("Template"));
        assert_eq!(target.fields().string("description"), Some("Template Desc"));
        assert_eq!(target.fields().block("basic_stats"), template.fields().block("basic_stats"));
        assert_eq!(target.form_key().to_string(), "000800:Out.esp", "FormKey 不随字段复制");
    }

    #[test]
    fn test_false_block_ignores_sub_mask() {
        let mut target = weapon("000800:Out.esp", "Target", 5);
        let template = weapon("000801:Base.esm", "Template", 40);

        let sub = TranslationMask::all();
        let mask = TranslationMask::all().with_block("basic_stats", false, sub);
        target.deep_copy_in(&template, &mask).unwrap();

        assert_eq!(target.fields().block("basic_stats").unwrap().int("damage"), Some(5));
    }

    #[test]
    fn test_partial_sub_mask() {
        let mut target = weapon("000800:Out.esp", "Target", 5);
        let template = weapon("000801:Base.esm", "Template", 40);

        let sub = TranslationMask::new(false).with("damage", true);
        let mask = TranslationMask::new(false).with_block("basic_stats", true, sub);
        target.deep_copy_in(&template, &mask).unwrap();

        let stats = target.fields().block("basic_stats").unwrap();
        assert_eq!(stats.int("damage"), Some(40));
        assert_eq!(stats.int("value"), Some(50));
        assert_eq!(target.editor_id(), Some("Target"));
    }

    #[test]
    fn test_missing_template_block_is_noop() {
        let mut target = weapon("000800:Out.esp", "Target", 5);
        let mut template = weapon("000801:Base.esm", "Template", 40);
        template.fields_mut().remove("basic_stats");

        target.deep_copy_in(&template, &TranslationMask::all()).unwrap();
        assert_eq!(target.fields().block("basic_stats").unwrap().int("damage"), Some(5));
        assert_eq!(target.editor_id(), Some("Template"));
    }

    #[test]
    fn test_absent_target_block_starts_from_zero() {
        let mut target = MutableRecord::new("000800:Out.esp".parse().unwrap(), WEAPON, GameRelease::SkyrimSE);
        let template = weapon("000801:Base.esm", "Template", 40);

        let sub = TranslationMask::new(false).with("damage", true);
        let mask = TranslationMask::new(false).with_block("basic_stats", true, sub);
        target.deep_copy_in(&template, &mask).unwrap();

        let stats = target.fields().block("basic_stats").unwrap();
        assert_eq!(stats.int("damage"), Some(40));
        assert_eq!(stats.int("value"), Some(0));
        assert_eq!(stats.float("weight"), Some(0.0));
    }

    #[test]
    fn test_copied_values_are_independent() {
        let mut target = MutableRecord::new("000800:Out.esp".parse().unwrap(), WEAPON, GameRelease::SkyrimSE);
        let mut template = weapon("000801:Base.esm", "Template", 40);
        target.deep_copy_in(&template, &TranslationMask::all()).unwrap();

        template
            .fields_mut()
            .block_mut("basic_stats")
            .unwrap()
            .set("damage", FieldValue::Int(1));
        assert_eq!(target.fields().block("basic_stats").unwrap().int("damage"), Some(40));
    }

    #[test]
    fn test_raw_chunks_follow_mask_default() {
        let mut target = weapon("000800:Out.esp", "Target", 5);
        target.set_master_context(vec!["Out.esp".parse().unwrap()]);
        let mut template = weapon("000801:Base.esm", "Template", 40);
        template
            .body
            .layout
            .push(Slot::Raw(Subrecord::new(*b"KWDA", vec![1, 0, 0, 0])));
        let context: Vec<ModKey> = vec!["Skyrim.esm".parse().unwrap(), "Base.esm".parse().unwrap()];
        template.set_master_context(context.clone());

        let mut excluded = target.clone();
        excluded
            .deep_copy_in(&template, &TranslationMask::new(false))
            .unwrap();
        assert_eq!(excluded.body().raw_subrecords().count(), 0);
        assert_eq!(excluded.master_context(), target.master_context());

        target.deep_copy_in(&template, &TranslationMask::all()).unwrap();
        assert_eq!(target.body().raw_subrecords().count(), 1);
        assert_eq!(target.master_context(), context.as_slice(), "主文件列表整体替换，不与原列表合并");
    }

    #[test]
    fn test_record_type_mismatch() {
        let mut target = weapon("000800:Out.esp", "Target", 5);
        let armor = MutableRecord::new(
            "000801:Base.esm".parse().unwrap(),
            RecordType(*b"ARMO"),
            GameRelease::SkyrimSE,
        );
        let err = target.deep_copy_in(&armor, &TranslationMask::all()).unwrap_err();
        assert!(matches!(err, EspError::RecordTypeMismatch { .. }));
    }

    #[test]
    fn test_block_or_default_rejects_scalar() {
        let mut record = weapon("000800:Out.esp", "Target", 5);
        assert!(record.block_or_default("name").is_err());
    }
}
