//! 记录内容的编解码
//!
//! 按记录结构定义把子记录解码为 [`RecordBody`]，或反过来编码为子记录字节。
//! 结构定义中的字段按名称保存，其余子记录原样保留，写出时维持原有顺序。
//! 可本地化的字符串按插件头部的 `LOCALIZED` 标志解释为字符串表 ID 或文本。

use crate::datatypes::{
    read_f32, read_i16, read_i32, read_i8, read_u16, read_u32, read_u8, write_f32, write_i16,
    write_i32, write_i8, write_u16, write_u32, write_u8, RawString,
};
use crate::fields::{FieldSet, FieldValue, RecordBody, Slot};
use crate::masters::{MasterReferences, MasterTable};
use crate::schema::{FieldDef, FieldKind, RecordSchema};
use crate::subrecord::Subrecord;
use crate::utils::{DecodeError, EspError, Result};
use std::io::Cursor;

/// 解码记录数据（已解压）；`localized` 为来源插件的本地化标志
pub fn decode_body(
    schema: Option<&RecordSchema>,
    data: &[u8],
    refs: &MasterReferences,
    localized: bool,
) -> std::result::Result<RecordBody, DecodeError> {
    let mut body = RecordBody::default();

    for subrecord in Subrecord::parse_all(data)? {
        let known = schema
            .and_then(|s| s.field_by_tag(&subrecord.tag))
            .filter(|(_, def)| !body.fields.contains(&def.name));

        let decoded = known.and_then(|(_, def)| {
            decode_value(&def.kind, &subrecord.data, refs, localized).map(|value| (def, value))
        });

        match decoded {
            Some((def, value)) => {
                body.fields.set(&def.name, value);
                body.layout.push(Slot::Field(def.name.clone()));
            }
            None => {
                if let Some((_, def)) = known {
                    tracing::debug!(
                        "子记录 {} 的长度 {} 与字段 {} 的定义不符，按原始数据保留",
                        subrecord.tag_str(),
                        subrecord.data.len(),
                        def.name
                    );
                }
                body.layout.push(Slot::Raw(subrecord));
            }
        }
    }

    Ok(body)
}

/// 解码单个顶级字段；数据形状与定义不符时返回 None
fn decode_value(
    kind: &FieldKind,
    data: &[u8],
    refs: &MasterReferences,
    localized: bool,
) -> Option<FieldValue> {
    match kind {
        FieldKind::Zstring => Some(FieldValue::String(RawString::parse_zstring(data).content)),
        FieldKind::Lstring if localized => {
            if data.len() != 4 {
                return None;
            }
            read_u32(&mut Cursor::new(data)).ok().map(FieldValue::Localized)
        }
        FieldKind::Lstring => Some(FieldValue::String(RawString::parse_zstring(data).content)),
        FieldKind::Bytes => Some(FieldValue::Bytes(data.to_vec())),
        FieldKind::Struct(members) => {
            let mut cursor = Cursor::new(data);
            let block = decode_block(members, &mut cursor, refs);
            Some(FieldValue::Block(block))
        }
        _ => {
            if Some(data.len()) != kind.fixed_size() {
                return None;
            }
            let mut cursor = Cursor::new(data);
            read_scalar(kind, &mut cursor, refs)
        }
    }
}

/// 解码子结构：成员依次读取，数据不足的成员视为缺失，多余字节保存为尾部
fn decode_block(members: &[FieldDef], cursor: &mut Cursor<&[u8]>, refs: &MasterReferences) -> FieldSet {
    let mut block = FieldSet::new();

    for member in members {
        let remaining = cursor.get_ref().len() - cursor.position() as usize;
        let Some(size) = member.kind.fixed_size() else {
            break;
        };
        if remaining < size {
            break;
        }
        let value = match &member.kind {
            FieldKind::Struct(nested) => Some(FieldValue::Block(decode_block(nested, cursor, refs))),
            kind => read_scalar(kind, cursor, refs),
        };
        match value {
            Some(value) => {
                block.set(&member.name, value);
            }
            None => break,
        }
    }

    let position = cursor.position() as usize;
    block.set_trailing(cursor.get_ref()[position..].to_vec());
    block
}

fn read_scalar(kind: &FieldKind, cursor: &mut Cursor<&[u8]>, refs: &MasterReferences) -> Option<FieldValue> {
    let value = match kind {
        FieldKind::U8 => FieldValue::Int(read_u8(cursor).ok()? as i64),
        FieldKind::U16 => FieldValue::Int(read_u16(cursor).ok()? as i64),
        FieldKind::U32 => FieldValue::Int(read_u32(cursor).ok()? as i64),
        FieldKind::I8 => FieldValue::Int(read_i8(cursor).ok()? as i64),
        FieldKind::I16 => FieldValue::Int(read_i16(cursor).ok()? as i64),
        FieldKind::I32 => FieldValue::Int(read_i32(cursor).ok()? as i64),
        FieldKind::F32 => FieldValue::Float(read_f32(cursor).ok()?),
        FieldKind::FormLink => FieldValue::Link(refs.link(read_u32(cursor).ok()?)),
        FieldKind::Zstring | FieldKind::Lstring | FieldKind::Bytes | FieldKind::Struct(_) => return None,
    };
    Some(value)
}

/// 编码记录内容为子记录字节；`localized` 为输出插件的本地化标志
pub fn encode_body(
    schema: Option<&RecordSchema>,
    body: &RecordBody,
    table: &MasterTable,
    localized: bool,
) -> Result<Vec<u8>> {
    let mut output = Vec::new();

    for slot in ordered_slots(schema, body)? {
        match slot {
            SlotRef::Raw(subrecord) => subrecord.write(&mut output)?,
            SlotRef::Field(def) => {
                let Some(value) = body.fields.get(&def.name) else {
                    continue;
                };
                let tag = def.tag_bytes().ok_or_else(|| {
                    EspError::Encoding(format!("字段 {} 没有子记录标签", def.name))
                })?;
                let data = encode_value(&def.name, &def.kind, value, table, localized)?;
                Subrecord::new(tag, data).write(&mut output)?;
            }
        }
    }

    Ok(output)
}

enum SlotRef<'a> {
    Field(&'a FieldDef),
    Raw(&'a Subrecord),
}

/// 确定写出顺序：保留原有顺序，新增字段按结构定义的顺序插入
fn ordered_slots<'a>(schema: Option<&'a RecordSchema>, body: &'a RecordBody) -> Result<Vec<SlotRef<'a>>> {
    let lookup = |name: &str| -> Result<(usize, &'a FieldDef)> {
        schema
            .and_then(|s| s.position(name).map(|i| (i, &s.fields[i])))
            .ok_or_else(|| EspError::Encoding(format!("字段 {} 不在记录结构定义中", name)))
    };

    // (结构定义序号, 槽位)
    let mut slots: Vec<(Option<usize>, SlotRef<'a>)> = Vec::with_capacity(body.layout.len());
    let mut placed: Vec<&str> = Vec::new();

    for slot in &body.layout {
        match slot {
            Slot::Raw(subrecord) => slots.push((None, SlotRef::Raw(subrecord))),
            Slot::Field(name) => {
                if placed.contains(&name.as_str()) || !body.fields.contains(name) {
                    continue;
                }
                let (index, def) = lookup(name)?;
                placed.push(name);
                slots.push((Some(index), SlotRef::Field(def)));
            }
        }
    }

    let mut missing: Vec<(usize, &'a FieldDef)> = Vec::new();
    for name in body.fields.names() {
        if !placed.contains(&name) {
            missing.push(lookup(name)?);
        }
    }
    missing.sort_by_key(|(index, _)| *index);

    for (index, def) in missing {
        let after = slots
            .iter()
            .rposition(|(pos, _)| matches!(pos, Some(p) if *p < index));
        let insert_at = match after {
            Some(i) => i + 1,
            None => slots
                .iter()
                .position(|(pos, _)| pos.is_some())
                .unwrap_or(slots.len()),
        };
        slots.insert(insert_at, (Some(index), SlotRef::Field(def)));
    }

    Ok(slots.into_iter().map(|(_, slot)| slot).collect())
}

/// 编码单个字段值，检查类型与取值范围
fn encode_value(
    path: &str,
    kind: &FieldKind,
    value: &FieldValue,
    table: &MasterTable,
    localized: bool,
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    write_value(path, kind, value, table, localized, &mut output)?;
    Ok(output)
}

fn write_value(
    path: &str,
    kind: &FieldKind,
    value: &FieldValue,
    table: &MasterTable,
    localized: bool,
    output: &mut Vec<u8>,
) -> Result<()> {
    match (kind, value) {
        (FieldKind::F32, FieldValue::Float(v)) => write_f32(output, *v)?,
        (FieldKind::Zstring, FieldValue::String(s)) => {
            output.extend_from_slice(&RawString::encode_zstring(s))
        }
        (FieldKind::Lstring, FieldValue::String(s)) if !localized => {
            output.extend_from_slice(&RawString::encode_zstring(s))
        }
        (FieldKind::Lstring, FieldValue::Localized(id)) if localized => write_u32(output, *id)?,
        (FieldKind::Lstring, FieldValue::String(_)) => {
            return Err(EspError::Encoding(format!(
                "字段 {} 是文本，但输出插件带有 LOCALIZED 标志，只能写入字符串表 ID",
                path
            )));
        }
        (FieldKind::Lstring, FieldValue::Localized(id)) => {
            return Err(EspError::Encoding(format!(
                "字段 {} 是字符串表 ID 0x{:08X}，但输出插件没有 LOCALIZED 标志",
                path, id
            )));
        }
        (FieldKind::Bytes, FieldValue::Bytes(b)) => output.extend_from_slice(b),
        (FieldKind::FormLink, FieldValue::Link(link)) => {
            let raw = match link {
                Some(key) => table.raw(key)?,
                None => 0,
            };
            write_u32(output, raw)?;
        }
        (FieldKind::Struct(members), FieldValue::Block(block)) => {
            write_block(path, members, block, table, localized, output)?
        }
        (kind, FieldValue::Int(v)) if kind.int_range().is_some() => {
            if let Some((min, max)) = kind.int_range() {
                if *v < min || *v > max {
                    return Err(EspError::Encoding(format!(
                        "字段 {} 的值 {} 超出 {:?} 的范围 [{}, {}]",
                        path, v, kind, min, max
                    )));
                }
            }
            match kind {
                FieldKind::U8 => write_u8(output, *v as u8)?,
                FieldKind::I8 => write_i8(output, *v as i8)?,
                FieldKind::U16 => write_u16(output, *v as u16)?,
                FieldKind::I16 => write_i16(output, *v as i16)?,
                FieldKind::U32 => write_u32(output, *v as u32)?,
                _ => write_i32(output, *v as i32)?,
            }
        }
        (kind, value) => {
            return Err(EspError::Encoding(format!(
                "字段 {} 的类型不匹配: 定义为 {:?}，实际值 {:?}",
                path, kind, value
            )));
        }
    }
    Ok(())
}

/// 子结构成员按定义顺序写出，遇到第一个缺失成员即停止（兼容较短的旧版本结构）
fn write_block(
    path: &str,
    members: &[FieldDef],
    block: &FieldSet,
    table: &MasterTable,
    localized: bool,
    output: &mut Vec<u8>,
) -> Result<()> {
    if let Some(unknown) = block
        .names()
        .find(|name| !members.iter().any(|member| member.name == *name))
    {
        return Err(EspError::Encoding(format!(
            "字段 {}.{} 不在记录结构定义中",
            path, unknown
        )));
    }

    let mut complete = true;
    for member in members {
        let member_path = format!("{}.{}", path, member.name);
        match block.get(&member.name) {
            Some(value) if complete => {
                write_value(&member_path, &member.kind, value, table, localized, output)?
            }
            Some(_) => {
                return Err(EspError::Encoding(format!(
                    "字段 {} 之前有缺失的结构成员",
                    member_path
                )));
            }
            None => complete = false,
        }
    }
    if complete {
        output.extend_from_slice(block.trailing());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form_key::{FormKey, ModKey};
    use crate::record::RecordType;
    use crate::schema::SchemaRegistry;

    fn key(name: &str) -> ModKey {
        ModKey::from_file_name(name).unwrap()
    }

    fn weapon_schema() -> &'static RecordSchema {
        SchemaRegistry::builtin()
            .unwrap()
            .get(RecordType(*b"WEAP"))
            .unwrap()
    }

    fn sample_weapon_data() -> Vec<u8> {
        let mut data = Vec::new();
        Subrecord::new(*b"EDID", b"IronSword\0".to_vec()).write(&mut data).unwrap();
        Subrecord::new(*b"KWDA", vec![1, 2, 3, 4]).write(&mut data).unwrap();
        Subrecord::new(*b"FULL", b"Iron Sword\0".to_vec()).write(&mut data).unwrap();
        let mut stats = Vec::new();
        stats.extend_from_slice(&25u32.to_le_bytes());
        stats.extend_from_slice(&9.0f32.to_le_bytes());
        stats.extend_from_slice(&7u16.to_le_bytes());
        Subrecord::new(*b"DATA", stats).write(&mut data).unwrap();
        Subrecord::new(*b"CNAM", 0x0000_0ABCu32.to_le_bytes().to_vec()).write(&mut data).unwrap();
        data
    }

    #[test]
    fn test_decode_weapon() {
        let refs = MasterReferences::new(vec![key("Skyrim.esm")], key("Mod.esp"));
        let body = decode_body(Some(weapon_schema()), &sample_weapon_data(), &refs, false).unwrap();

        assert_eq!(body.fields.string("editor_id"), Some("IronSword"));
        assert_eq!(body.fields.string("name"), Some("Iron Sword"));
        let stats = body.fields.block("basic_stats").unwrap();
        assert_eq!(stats.int("value"), Some(25));
        assert_eq!(stats.float("weight"), Some(9.0));
        assert_eq!(stats.int("damage"), Some(7));
        assert_eq!(
            body.fields.link("template").map(|k| k.to_string()),
            Some("000ABC:Skyrim.esm".to_string())
        );
        assert_eq!(body.raw_subrecords().count(), 1, "KWDA 不在结构定义中");
    }

    #[test]
    fn test_encode_preserves_layout() {
        let refs = MasterReferences::new(vec![key("Skyrim.esm")], key("Mod.esp"));
        let data = sample_weapon_data();
        let body = decode_body(Some(weapon_schema()), &data, &refs, false).unwrap();

        let table = MasterTable::new(key("Mod.esp"), &[key("Skyrim.esm")]);
        let encoded = encode_body(Some(weapon_schema()), &body, &table, false).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_new_fields_follow_schema_order() {
        let mut body = RecordBody::default();
        body.fields.set("name", FieldValue::String("Blade".into()));
        body.fields.set("editor_id", FieldValue::String("Blade".into()));

        let table = MasterTable::new(key("Mod.esp"), &[]);
        let encoded = encode_body(Some(weapon_schema()), &body, &table, false).unwrap();
        let subrecords = Subrecord::parse_all(&encoded).unwrap();
        assert_eq!(&subrecords[0].tag, b"EDID");
        assert_eq!(&subrecords[1].tag, b"FULL");
    }

    #[test]
    fn test_out_of_range_damage_is_rejected() {
        let refs = MasterReferences::new(vec![], key("Mod.esp"));
        let mut body = decode_body(Some(weapon_schema()), &sample_weapon_data(), &refs, false).unwrap();
        body.fields
            .block_mut("basic_stats")
            .unwrap()
            .set("damage", FieldValue::Int(70_000));

        let table = MasterTable::new(key("Mod.esp"), &[]);
        let err = encode_body(Some(weapon_schema()), &body, &table, false).unwrap_err();
        assert!(matches!(err, EspError::Encoding(_)));
        assert!(err.to_string().contains("basic_stats.damage"));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut body = RecordBody::default();
        body.fields.set("name", FieldValue::Int(3));
        let table = MasterTable::new(key("Mod.esp"), &[]);
        assert!(encode_body(Some(weapon_schema()), &body, &table, false).is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut body = RecordBody::default();
        body.fields.set("sharpness", FieldValue::Int(3));
        let table = MasterTable::new(key("Mod.esp"), &[]);
        assert!(encode_body(Some(weapon_schema()), &body, &table, false).is_err());
    }

    #[test]
    fn test_short_struct_round_trips() {
        // 只有 value 和 weight 的旧版本 DATA
        let mut data = Vec::new();
        let mut stats = Vec::new();
        stats.extend_from_slice(&5u32.to_le_bytes());
        stats.extend_from_slice(&1.5f32.to_le_bytes());
        Subrecord::new(*b"DATA", stats).write(&mut data).unwrap();

        let refs = MasterReferences::new(vec![], key("Mod.esp"));
        let body = decode_body(Some(weapon_schema()), &data, &refs, false).unwrap();
        let block = body.fields.block("basic_stats").unwrap();
        assert_eq!(block.int("damage"), None);

        let table = MasterTable::new(key("Mod.esp"), &[]);
        assert_eq!(encode_body(Some(weapon_schema()), &body, &table, false).unwrap(), data);
    }

    #[test]
    fn test_struct_trailing_bytes_round_trip() {
        let mut data = Vec::new();
        let mut stats = Vec::new();
        stats.extend_from_slice(&5u32.to_le_bytes());
        stats.extend_from_slice(&1.5f32.to_le_bytes());
        stats.extend_from_slice(&3u16.to_le_bytes());
        stats.extend_from_slice(&[0xAA, 0xBB]);
        Subrecord::new(*b"DATA", stats).write(&mut data).unwrap();

        let refs = MasterReferences::new(vec![], key("Mod.esp"));
        let body = decode_body(Some(weapon_schema()), &data, &refs, false).unwrap();
        assert_eq!(body.fields.block("basic_stats").unwrap().trailing(), &[0xAA, 0xBB]);

        let table = MasterTable::new(key("Mod.esp"), &[]);
        assert_eq!(encode_body(Some(weapon_schema()), &body, &table, false).unwrap(), data);
    }

    #[test]
    fn test_wrong_sized_scalar_kept_raw() {
        let mut data = Vec::new();
        Subrecord::new(*b"CNAM", vec![1, 2]).write(&mut data).unwrap();

        let refs = MasterReferences::new(vec![], key("Mod.esp"));
        let body = decode_body(Some(weapon_schema()), &data, &refs, false).unwrap();
        assert!(body.fields.is_empty());
        assert_eq!(body.raw_subrecords().count(), 1);
    }

    #[test]
    fn test_without_schema_everything_is_raw() {
        let refs = MasterReferences::new(vec![], key("Mod.esp"));
        let body = decode_body(None, &sample_weapon_data(), &refs, false).unwrap();
        assert!(body.fields.is_empty());
        assert_eq!(body.raw_subrecords().count(), 5);

        let table = MasterTable::new(key("Mod.esp"), &[]);
        assert_eq!(encode_body(None, &body, &table, false).unwrap(), sample_weapon_data());
    }

    #[test]
    fn test_links_encode_through_master_table() {
        let mut body = RecordBody::default();
        let target: FormKey = "012EB7:Skyrim.esm".parse().unwrap();
        body.fields.set("template", FieldValue::Link(Some(target)));

        let mut table = MasterTable::new(key("Mod.esp"), &[]);
        table.register(&key("Skyrim.esm")).unwrap();
        let encoded = encode_body(Some(weapon_schema()), &body, &table, false).unwrap();
        let subrecords = Subrecord::parse_all(&encoded).unwrap();
        assert_eq!(subrecords[0].data, 0x0001_2EB7u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_unknown_block_member_is_rejected() {
        let mut body = RecordBody::default();
        let mut stats = FieldSet::zeroed(weapon_schema().field("basic_stats").unwrap().members());
        stats.set("sharpness", FieldValue::Int(3));
        body.fields.set("basic_stats", FieldValue::Block(stats));

        let table = MasterTable::new(key("Mod.esp"), &[]);
        let err = encode_body(Some(weapon_schema()), &body, &table, false).unwrap_err();
        assert!(matches!(err, EspError::Encoding(_)));
        assert!(err.to_string().contains("basic_stats.sharpness"));
    }

    fn localized_name_data() -> Vec<u8> {
        let mut data = Vec::new();
        Subrecord::new(*b"EDID", b"IronSword\0".to_vec()).write(&mut data).unwrap();
        Subrecord::new(*b"FULL", 0x0001_1234u32.to_le_bytes().to_vec()).write(&mut data).unwrap();
        data
    }

    #[test]
    fn test_localized_name_is_string_id() {
        let refs = MasterReferences::new(vec![], key("Skyrim.esm"));
        let body = decode_body(Some(weapon_schema()), &localized_name_data(), &refs, true).unwrap();
        assert_eq!(body.fields.localized("name"), Some(0x0001_1234));
        assert_eq!(body.fields.string("name"), None);
        assert_eq!(body.fields.string("editor_id"), Some("IronSword"));

        let table = MasterTable::new(key("Skyrim.esm"), &[]);
        assert_eq!(
            encode_body(Some(weapon_schema()), &body, &table, true).unwrap(),
            localized_name_data()
        );

        let err = encode_body(Some(weapon_schema()), &body, &table, false).unwrap_err();
        assert!(matches!(err, EspError::Encoding(_)));
    }

    #[test]
    fn test_text_name_rejected_in_localized_plugin() {
        let mut body = RecordBody::default();
        body.fields.set("name", FieldValue::String("Blade".into()));
        let table = MasterTable::new(key("Mod.esp"), &[]);

        assert!(encode_body(Some(weapon_schema()), &body, &table, false).is_ok());
        let err = encode_body(Some(weapon_schema()), &body, &table, true).unwrap_err();
        assert!(matches!(err, EspError::Encoding(_)));
    }

    #[test]
    fn test_localized_name_with_wrong_size_kept_raw() {
        let mut data = Vec::new();
        Subrecord::new(*b"FULL", b"Iron Sword\0".to_vec()).write(&mut data).unwrap();

        let refs = MasterReferences::new(vec![], key("Skyrim.esm"));
        let body = decode_body(Some(weapon_schema()), &data, &refs, true).unwrap();
        assert!(body.fields.is_empty());
        assert_eq!(body.raw_subrecords().count(), 1);
    }
}
