use crate::form_key::FormKey;
use crate::schema::{FieldDef, FieldKind};
use crate::subrecord::Subrecord;
use std::collections::BTreeMap;

/// 解码后的字段值
///
/// 整数统一以 i64 保存，写出时再按字段宽度检查范围。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f32),
    String(String),
    /// 本地化插件中的字符串表 ID
    Localized(u32),
    /// `None` 为空引用（FormID 0）
    Link(Option<FormKey>),
    Bytes(Vec<u8>),
    Block(FieldSet),
}

impl FieldValue {
    /// 按字段类型生成零值
    pub fn zero(kind: &FieldKind) -> FieldValue {
        match kind {
            FieldKind::F32 => FieldValue::Float(0.0),
            FieldKind::Zstring | FieldKind::Lstring => FieldValue::String(String::new()),
            FieldKind::FormLink => FieldValue::Link(None),
            FieldKind::Bytes => FieldValue::Bytes(Vec::new()),
            FieldKind::Struct(members) => FieldValue::Block(FieldSet::zeroed(members)),
            _ => FieldValue::Int(0),
        }
    }
}

/// 命名字段集合
///
/// 用于记录的顶级字段和子结构成员；`trailing` 只对子结构有意义，保存结构定义之外的尾部字节。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    values: BTreeMap<String, FieldValue>,
    trailing: Vec<u8>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有成员为零值的子结构
    pub fn zeroed(members: &[FieldDef]) -> Self {
        let values = members
            .iter()
            .map(|m| (m.name.clone(), FieldValue::zero(&m.kind)))
            .collect();
        FieldSet {
            values,
            trailing: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.values.get_mut(name)
    }

    /// 设置字段，返回旧值
    pub fn set(&mut self, name: &str, value: FieldValue) -> Option<FieldValue> {
        self.values.insert(name.to_string(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(FieldValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(FieldValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn localized(&self, name: &str) -> Option<u32> {
        match self.values.get(name) {
            Some(FieldValue::Localized(id)) => Some(*id),
            _ => None,
        }
    }

    /// 链接字段；空引用与字段缺失都返回 None
    pub fn link(&self, name: &str) -> Option<&FormKey> {
        match self.values.get(name) {
            Some(FieldValue::Link(link)) => link.as_ref(),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.values.get(name) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn block(&self, name: &str) -> Option<&FieldSet> {
        match self.values.get(name) {
            Some(FieldValue::Block(set)) => Some(set),
            _ => None,
        }
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut FieldSet> {
        match self.values.get_mut(name) {
            Some(FieldValue::Block(set)) => Some(set),
            _ => None,
        }
    }

    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    pub fn set_trailing(&mut self, trailing: Vec<u8>) {
        self.trailing = trailing;
    }

    /// 收集所有链接（含子结构）
    pub fn links(&self) -> Vec<&FormKey> {
        let mut links = Vec::new();
        self.collect_links(&mut links);
        links
    }

    fn collect_links<'a>(&'a self, links: &mut Vec<&'a FormKey>) {
        for value in self.values.values() {
            match value {
                FieldValue::Link(Some(key)) => links.push(key),
                FieldValue::Block(set) => set.collect_links(links),
                _ => {}
            }
        }
    }
}

/// 子记录在记录内的位置
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// 结构定义中的字段（按名称）
    Field(String),
    /// 结构定义未描述的子记录，原样保存
    Raw(Subrecord),
}

/// 记录内容：字段值 + 子记录顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBody {
    pub fields: FieldSet,
    pub layout: Vec<Slot>,
}

impl RecordBody {
    /// 未被结构定义描述的子记录
    pub fn raw_subrecords(&self) -> impl Iterator<Item = &Subrecord> {
        self.layout.iter().filter_map(|slot| match slot {
            Slot::Raw(sr) => Some(sr),
            Slot::Field(_) => None,
        })
    }
}
