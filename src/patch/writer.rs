use super::{MutablePlugin, PatchEntry};
use crate::codec::encode_body;
use crate::datatypes::RecordFlags;
use crate::form_key::{FormKey, ModKey};
use crate::group::GroupHeader;
use crate::io::{DefaultPluginWriter, PluginWriter};
use crate::masters::MasterTable;
use crate::mutable_record::MutableRecord;
use crate::record::{compress_data, RecordHeader, RecordType};
use crate::release::{GameRelease, WriteOptions};
use crate::schema::SchemaRegistry;
use crate::utils::{create_backup, EspError, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

impl MutablePlugin {
    /// 写入文件，目标目录不存在时自动创建
    pub fn write_to_path(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        self.write_with_writer(path, &DefaultPluginWriter, options)
    }

    /// 使用自定义 Writer 写入
    pub fn write_with_writer(
        &self,
        path: impl AsRef<Path>,
        writer: &dyn PluginWriter,
        options: &WriteOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        if options.backup_existing && path.exists() {
            let backup_path = create_backup(path)?;
            tracing::info!("已创建备份文件: {:?}", backup_path);
        }

        writer.write(&bytes, path)?;
        tracing::info!("已写入 {:?} ({} 条记录, {} bytes)", path, self.len(), bytes.len());
        Ok(())
    }

    /// 序列化到任意目标
    pub fn write_to<W: Write>(&self, mut destination: W) -> Result<()> {
        let bytes = self.to_bytes()?;
        destination.write_all(&bytes)?;
        destination.flush()?;
        Ok(())
    }

    /// 序列化为字节
    ///
    /// 输出只由插件内容决定：组按记录类型排序，组内记录按 FormKey 排序，
    /// 所有长度字段按最终内容重新计算。
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let table = self.master_table()?;
        let release = self.release;
        let encoder = Encoder {
            table: &table,
            schemas: SchemaRegistry::builtin()?,
            release,
            localized: self.header.is_localized(),
        };

        let groups: Vec<(&RecordType, &BTreeMap<FormKey, PatchEntry>)> = self.groups.iter().collect();
        let encoded: Vec<Vec<u8>> = groups
            .par_iter()
            .map(|(record_type, group)| encoder.encode_group(**record_type, group))
            .collect::<Result<_>>()?;

        let mut header = self.header.clone();
        header.masters = table.masters().to_vec();
        header.num_records = u32::try_from(self.len() + groups.len())
            .map_err(|_| EspError::Encoding("记录数量超出 u32 范围".into()))?;
        header.next_object_id = self.next_id;

        let mut output = Vec::with_capacity(encoded.iter().map(Vec::len).sum::<usize>() + 256);
        header.write(release, &mut output)?;
        for group in encoded {
            output.extend_from_slice(&group);
        }

        tracing::debug!(
            "{}: 序列化完成，{} 个组，{} 条记录，{} 个主文件",
            self.mod_key,
            groups.len(),
            self.len(),
            table.masters().len()
        );
        Ok(output)
    }

    /// 按确定的顺序登记被引用的插件：预设主文件、原始子记录的主文件上下文、记录所属插件、字段中的链接
    ///
    /// 原始子记录中的 FormID 不改写，其主文件上下文最先登记。
    fn master_table(&self) -> Result<MasterTable> {
        let mut table = MasterTable::new(self.mod_key.clone(), &self.header.masters);
        let entries = || self.groups.values().flat_map(|group| group.values());

        for entry in entries() {
            let record = &entry.record;
            if record.body().raw_subrecords().next().is_some() {
                for mod_key in record.master_context() {
                    table.register(mod_key)?;
                }
            }
        }
        for entry in entries() {
            let record = &entry.record;
            table.register(record.form_key().mod_key())?;
            for link in record.fields().links() {
                table.register(link.mod_key())?;
            }
        }
        Ok(table)
    }
}

/// 单次写出共用的编码参数
struct Encoder<'a> {
    table: &'a MasterTable,
    schemas: &'a SchemaRegistry,
    release: GameRelease,
    localized: bool,
}

impl Encoder<'_> {
    fn encode_group(&self, record_type: RecordType, group: &BTreeMap<FormKey, PatchEntry>) -> Result<Vec<u8>> {
        let release = self.release;
        let entries: Vec<&PatchEntry> = group.values().collect();
        let records: Vec<Vec<u8>> = entries
            .par_iter()
            .map(|entry| self.encode_record(&entry.record))
            .collect::<Result<_>>()?;

        let body_len: usize = records.iter().map(Vec::len).sum();
        let size = u32::try_from(release.header_len() + body_len)
            .map_err(|_| EspError::Encoding(format!("{} 组超出 u32 大小", record_type)))?;

        let mut output = Vec::with_capacity(size as usize);
        GroupHeader::top_level(record_type).write(release, size, &mut output)?;
        for record in records {
            output.extend_from_slice(&record);
        }
        Ok(output)
    }

    fn encode_record(&self, record: &MutableRecord) -> Result<Vec<u8>> {
        let table = self.table;
        if record.body().raw_subrecords().next().is_some() && !table.preserves(record.master_context()) {
            return Err(EspError::Encoding(format!(
                "{}: 原样保存的子记录按主文件顺序 [{}] 编码，与输出插件的主文件顺序 [{}] 不一致",
                record.form_key(),
                join_mods(record.master_context()),
                join_mods(table.masters())
            )));
        }

        let schema = self.schemas.get(record.record_type());
        let mut data = encode_body(schema, record.body(), table, self.localized)
            .map_err(|e| match e {
                EspError::Encoding(msg) => EspError::Encoding(format!("{}: {}", record.form_key(), msg)),
                other => other,
            })?;

        // 原本压缩的记录重新压缩
        if record.flags.contains(RecordFlags::COMPRESSED) {
            data = compress_data(&data)?;
        }

        let data_size = u32::try_from(data.len())
            .map_err(|_| EspError::Encoding(format!("记录 {} 数据超出 u32 大小", record.form_key())))?;
        let header = RecordHeader {
            record_type: record.record_type(),
            data_size,
            flags: record.flags,
            raw_form_id: table.raw(record.form_key())?,
            timestamp: record.timestamp,
            version_control_info: record.version_control_info,
            form_version: record.form_version,
            unknown: record.unknown,
        };

        let mut output = Vec::with_capacity(self.release.header_len() + data.len());
        header.write(self.release, &mut output)?;
        output.extend_from_slice(&data);
        Ok(output)
    }
}

fn join_mods(mods: &[ModKey]) -> String {
    mods.iter().map(ModKey::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::release::OverlayOptions;
    use crate::PluginOverlay;

    const WEAPON: RecordType = RecordType(*b"WEAP");

    fn plugin_with_weapon() -> MutablePlugin {
        let mut plugin = MutablePlugin::new(ModKey::from_file_name("Out.esp").unwrap(), GameRelease::SkyrimSE);
        let record = plugin.add_new(WEAPON).unwrap();
        record.set_editor_id("NewBlade");
        record
            .fields_mut()
            .set("template", FieldValue::Link(Some("012EB7:Skyrim.esm".parse().unwrap())));
        plugin
    }

    #[test]
    fn test_output_is_deterministic() {
        let plugin = plugin_with_weapon();
        assert_eq!(plugin.to_bytes().unwrap(), plugin.to_bytes().unwrap());
    }

    #[test]
    fn test_links_become_masters() {
        let plugin = plugin_with_weapon();
        let bytes = plugin.to_bytes().unwrap();

        let overlay = PluginOverlay::from_bytes(plugin.mod_key().clone(), bytes, &OverlayOptions::default()).unwrap();
        assert_eq!(overlay.masters(), &[ModKey::from_file_name("Skyrim.esm").unwrap()]);
        assert_eq!(overlay.header().num_records, 2);
        assert_eq!(overlay.header().next_object_id, 0x801);

        let view = overlay.records(WEAPON).next().unwrap();
        assert_eq!(
            view.fields().unwrap().link("template").map(|k| k.to_string()),
            Some("012EB7:Skyrim.esm".to_string())
        );
    }

    #[test]
    fn test_oversize_subrecord_round_trips() {
        let mut plugin = MutablePlugin::new(ModKey::from_file_name("Out.esp").unwrap(), GameRelease::SkyrimSE);
        let long_text = "x".repeat(70_000);
        plugin
            .add_new(WEAPON)
            .unwrap()
            .fields_mut()
            .set("description", FieldValue::String(long_text.clone()));

        let bytes = plugin.to_bytes().unwrap();
        let overlay = PluginOverlay::from_bytes(plugin.mod_key().clone(), bytes, &OverlayOptions::default()).unwrap();
        let view = overlay.records(WEAPON).next().unwrap();
        assert_eq!(view.fields().unwrap().string("description"), Some(long_text.as_str()));
    }

    #[test]
    fn test_compressed_flag_is_preserved() {
        let mut plugin = MutablePlugin::new(ModKey::from_file_name("Out.esp").unwrap(), GameRelease::SkyrimSE);
        let record = plugin.add_new(WEAPON).unwrap();
        record.flags |= RecordFlags::COMPRESSED;
        record.set_editor_id("Packed");

        let bytes = plugin.to_bytes().unwrap();
        let overlay = PluginOverlay::from_bytes(plugin.mod_key().clone(), bytes, &OverlayOptions::default()).unwrap();
        let view = overlay.records(WEAPON).next().unwrap();
        assert!(view.flags().contains(RecordFlags::COMPRESSED));
        assert_eq!(view.editor_id(), Some("Packed"));
    }

    #[test]
    fn test_write_to_failing_destination() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = plugin_with_weapon().write_to(Broken).unwrap_err();
        assert!(matches!(err, EspError::Io(_)));
    }

    #[test]
    fn test_out_of_range_value_names_record() {
        let mut plugin = MutablePlugin::new(ModKey::from_file_name("Out.esp").unwrap(), GameRelease::SkyrimSE);
        let record = plugin.add_new(WEAPON).unwrap();
        record
            .fields_mut()
            .set("enchantment_amount", FieldValue::Int(-1));

        let err = plugin.to_bytes().unwrap_err();
        assert!(matches!(err, EspError::Encoding(_)));
        assert!(err.to_string().contains("000800:Out.esp"));
    }

    #[test]
    fn test_backup_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Out.esp");
        std::fs::write(&path, b"old").unwrap();

        let options = WriteOptions { backup_existing: true };
        plugin_with_weapon().write_to_path(&path, &options).unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read(backups[0].path()).unwrap(), b"old");
        assert_ne!(std::fs::read(&path).unwrap(), b"old");
    }
}
