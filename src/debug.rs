use crate::fields::{FieldSet, FieldValue, Slot};
use crate::overlay::{PluginOverlay, RecordView};
use crate::subrecord::Subrecord;
use crate::utils::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// 插件结构调试器
pub struct EspDebugger;

impl EspDebugger {
    /// 生成详细的文件结构dump
    pub fn dump_file_structure(plugin: &PluginOverlay, output_path: &Path) -> Result<()> {
        let mut output = BufWriter::new(File::create(output_path)?);
        Self::dump(plugin, &mut output)?;
        output.flush()?;
        Ok(())
    }

    /// 输出到任意目标
    pub fn dump(plugin: &PluginOverlay, output: &mut dyn Write) -> Result<()> {
        Self::write_header_info(output, plugin)?;
        Self::write_masters_info(output, plugin)?;
        Self::write_records_info(output, plugin)?;
        Ok(())
    }

    /// 写入头部信息
    fn write_header_info(output: &mut dyn Write, plugin: &PluginOverlay) -> Result<()> {
        let header = plugin.header();
        writeln!(output, "=== 插件结构dump ===")?;
        writeln!(output, "文件: {}", plugin.mod_key())?;
        writeln!(output, "游戏版本: {:?}", plugin.release())?;
        writeln!(output, "HEDR 版本: {}", header.version)?;
        writeln!(output, "标志位: 0x{:08X}", header.flags.bits())?;
        writeln!(output, "记录数(HEDR): {}", header.num_records)?;
        writeln!(output, "下一个对象 ID: 0x{:06X}", header.next_object_id)?;
        if let Some(author) = &header.author {
            writeln!(output, "作者: {}", author)?;
        }
        if let Some(description) = &header.description {
            writeln!(output, "描述: {}", description)?;
        }
        writeln!(output)?;
        Ok(())
    }

    /// 写入主文件信息
    fn write_masters_info(output: &mut dyn Write, plugin: &PluginOverlay) -> Result<()> {
        writeln!(output, "=== 主文件列表 ({}) ===", plugin.masters().len())?;
        for (i, master) in plugin.masters().iter().enumerate() {
            writeln!(output, "  {:02X}: {}", i, master)?;
        }
        writeln!(output)?;
        Ok(())
    }

    /// 按记录类型写入记录
    fn write_records_info(output: &mut dyn Write, plugin: &PluginOverlay) -> Result<()> {
        for &record_type in plugin.record_types() {
            let count = plugin.records(record_type).count();
            writeln!(output, "=== {} ({}) ===", record_type, count)?;
            for view in plugin.records(record_type) {
                Self::dump_record(&view, output)?;
            }
            writeln!(output)?;
        }

        if !plugin.unreadable().is_empty() {
            writeln!(output, "=== 无法读取的记录 ({}) ===", plugin.unreadable().len())?;
            for record in plugin.unreadable() {
                writeln!(output, "  {} {}: {}", record.record_type, record.form_key, record.reason)?;
            }
        }
        Ok(())
    }

    /// Dump 记录结构
    fn dump_record(view: &RecordView<'_>, output: &mut dyn Write) -> Result<()> {
        let header = view.header();
        writeln!(output, "{} {} {{", header.record_type, view.form_key())?;
        writeln!(output, "  数据大小: {} bytes", header.data_size)?;
        writeln!(output, "  标志位: 0x{:08X}", header.flags.bits())?;
        writeln!(output, "  FormID: 0x{:08X}", header.raw_form_id)?;
        writeln!(output, "  内部版本: {}", header.form_version)?;

        match view.body() {
            Ok(body) => {
                Self::dump_fields(&body.fields, output, 1)?;
                for slot in &body.layout {
                    if let Slot::Raw(subrecord) = slot {
                        Self::dump_subrecord(subrecord, output)?;
                    }
                }
            }
            Err(e) => writeln!(output, "  ⚠ 无法解码: {}", e)?,
        }

        writeln!(output, "}}")?;
        Ok(())
    }

    fn dump_fields(fields: &FieldSet, output: &mut dyn Write, indent: usize) -> Result<()> {
        let prefix = "  ".repeat(indent);
        for (name, value) in fields.iter() {
            match value {
                FieldValue::Block(block) => {
                    writeln!(output, "{}{}: {{", prefix, name)?;
                    Self::dump_fields(block, output, indent + 1)?;
                    if !block.trailing().is_empty() {
                        writeln!(output, "{}  (尾部 {} bytes)", prefix, block.trailing().len())?;
                    }
                    writeln!(output, "{}}}", prefix)?;
                }
                FieldValue::Link(Some(key)) => writeln!(output, "{}{}: -> {}", prefix, name, key)?,
                FieldValue::Link(None) => writeln!(output, "{}{}: -> (空)", prefix, name)?,
                FieldValue::String(text) => writeln!(output, "{}{}: \"{}\"", prefix, name, text)?,
                FieldValue::Localized(id) => writeln!(output, "{}{}: 字符串表 0x{:08X}", prefix, name, id)?,
                FieldValue::Int(v) => writeln!(output, "{}{}: {}", prefix, name, v)?,
                FieldValue::Float(v) => writeln!(output, "{}{}: {}", prefix, name, v)?,
                FieldValue::Bytes(bytes) => {
                    writeln!(output, "{}{}: {}", prefix, name, Self::hex_preview(bytes))?
                }
            }
        }
        Ok(())
    }

    /// Dump 未被结构定义描述的子记录
    fn dump_subrecord(subrecord: &Subrecord, output: &mut dyn Write) -> Result<()> {
        writeln!(
            output,
            "  [{}] {} bytes: {}",
            subrecord.tag_str(),
            subrecord.data.len(),
            Self::hex_preview(&subrecord.data)
        )?;
        Ok(())
    }

    fn hex_preview(data: &[u8]) -> String {
        let preview_len = std::cmp::min(32, data.len());
        let hex_data: Vec<String> = data[..preview_len]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        format!("{}{}", hex_data.join(" "), if data.len() > 32 { "..." } else { "" })
    }

    /// 对比两个插件中同一 FormKey 的记录内容，返回不一致的数量
    pub fn compare_structures(
        original: &PluginOverlay,
        rebuilt: &PluginOverlay,
        output: &mut dyn Write,
    ) -> Result<usize> {
        writeln!(output, "=== 插件结构对比 ===")?;
        writeln!(output, "原始文件: {}", original.mod_key())?;
        writeln!(output, "重建文件: {}", rebuilt.mod_key())?;
        writeln!(output, "记录数量: {} vs {}", original.len(), rebuilt.len())?;

        let mut mismatches = 0;
        for view in original.all_records() {
            let Some(other) = rebuilt.record(view.form_key()) else {
                writeln!(output, "  ⚠ 缺少记录 {} {}", view.record_type(), view.form_key())?;
                mismatches += 1;
                continue;
            };
            let same = match (view.fields(), other.fields()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !same {
                writeln!(output, "  ⚠ 字段不一致: {} {}", view.record_type(), view.form_key())?;
                mismatches += 1;
            }
        }

        if mismatches == 0 {
            writeln!(output, "✓ 全部记录一致")?;
        }
        Ok(mismatches)
    }
}
