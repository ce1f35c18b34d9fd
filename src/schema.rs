//! 记录结构定义
//!
//! 每种记录类型的字段（名称、子记录标签、类型、嵌套结构）以 JSON 数据描述，
//! 编解码与字段合并都按结构定义递归处理，新增记录类型只需补充数据。

use crate::record::RecordType;
use crate::utils::{EspError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// 字段类型
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    /// 以 NULL 结尾的字符串
    Zstring,
    /// 可本地化的字符串：本地化插件中为 4 字节字符串表 ID，否则同 `Zstring`
    Lstring,
    /// 指向其他记录的 FormID
    FormLink,
    /// 原样保存的字节
    Bytes,
    /// 定长子结构
    Struct(Vec<FieldDef>),
}

impl FieldKind {
    /// 定长类型的字节数；变长类型返回 None
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldKind::U8 | FieldKind::I8 => Some(1),
            FieldKind::U16 | FieldKind::I16 => Some(2),
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 | FieldKind::FormLink => Some(4),
            FieldKind::Zstring | FieldKind::Lstring | FieldKind::Bytes => None,
            FieldKind::Struct(fields) => fields.iter().map(|f| f.kind.fixed_size()).sum(),
        }
    }

    /// 整数类型的取值范围
    pub fn int_range(&self) -> Option<(i64, i64)> {
        match self {
            FieldKind::U8 => Some((0, u8::MAX as i64)),
            FieldKind::U16 => Some((0, u16::MAX as i64)),
            FieldKind::U32 => Some((0, u32::MAX as i64)),
            FieldKind::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            FieldKind::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            FieldKind::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            _ => None,
        }
    }
}

/// 字段定义
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// 顶级字段对应的子记录标签；结构成员没有标签
    #[serde(default)]
    pub tag: Option<String>,
    pub kind: FieldKind,
}

impl FieldDef {
    /// 子记录标签字节
    pub fn tag_bytes(&self) -> Option<[u8; 4]> {
        self.tag.as_deref().and_then(|t| t.as_bytes().try_into().ok())
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, FieldKind::Struct(_))
    }

    /// 结构成员定义
    pub fn members(&self) -> &[FieldDef] {
        match &self.kind {
            FieldKind::Struct(fields) => fields,
            _ => &[],
        }
    }
}

/// 单种记录的结构定义
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordSchema {
    /// 可读名称，例如 `Weapon`
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 按子记录标签查找字段，返回字段在定义中的序号
    pub fn field_by_tag(&self, tag: &[u8; 4]) -> Option<(usize, &FieldDef)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.tag_bytes().as_ref() == Some(tag))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn validate(&self, record_type: &str) -> Result<()> {
        for field in &self.fields {
            if field.tag_bytes().is_none() {
                return Err(EspError::Format(format!(
                    "{}.{} 缺少 4 字符子记录标签",
                    record_type, field.name
                )));
            }
            if field.is_struct() {
                Self::validate_members(record_type, &field.name, field.members())?;
            }
        }
        Ok(())
    }

    fn validate_members(record_type: &str, parent: &str, members: &[FieldDef]) -> Result<()> {
        for member in members {
            match &member.kind {
                FieldKind::Zstring | FieldKind::Lstring | FieldKind::Bytes => {
                    return Err(EspError::Format(format!(
                        "{}.{}.{} 结构成员必须是定长类型",
                        record_type, parent, member.name
                    )));
                }
                FieldKind::Struct(nested) => {
                    Self::validate_members(record_type, &member.name, nested)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// 记录结构注册表
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<RecordType, RecordSchema>,
}

static BUILTIN: OnceLock<std::result::Result<SchemaRegistry, String>> = OnceLock::new();

impl SchemaRegistry {
    /// 内置结构定义（首次访问时解析）
    pub fn builtin() -> Result<&'static SchemaRegistry> {
        BUILTIN
            .get_or_init(|| {
                let json_data = include_str!("../data/record_schemas.json");
                Self::from_json(json_data).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| EspError::Format(format!("内置记录结构定义无效: {}", e)))
    }

    /// 从 JSON 加载结构定义
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, RecordSchema> = serde_json::from_str(json)?;
        let mut schemas = HashMap::with_capacity(raw.len());
        for (key, schema) in raw {
            let record_type: RecordType = key.parse()?;
            schema.validate(&key)?;
            schemas.insert(record_type, schema);
        }
        Ok(SchemaRegistry { schemas })
    }

    pub fn get(&self, record_type: RecordType) -> Option<&RecordSchema> {
        self.schemas.get(&record_type)
    }

    pub fn record_types(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.schemas.keys().copied()
    }
}
