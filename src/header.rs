//! 插件头部（`TES4` 记录）

use crate::datatypes::{read_f32, read_u32, write_f32, write_u32, write_u64, RawString, RecordFlags};
use crate::form_key::ModKey;
use crate::record::{RecordHeader, RecordType};
use crate::release::GameRelease;
use crate::subrecord::Subrecord;
use crate::utils::{EspError, Result};
use std::io::Cursor;

/// `HEDR` 子记录的固定长度
const HEDR_LEN: usize = 12;

/// 插件头部信息
#[derive(Debug, Clone, PartialEq)]
pub struct PluginHeader {
    pub flags: RecordFlags,
    /// `HEDR` 版本号
    pub version: f32,
    /// 记录与组的总数
    pub num_records: u32,
    /// 下一个可分配的本地 ID
    pub next_object_id: u32,
    pub author: Option<String>,
    pub description: Option<String>,
    pub masters: Vec<ModKey>,
    pub form_version: u16,
}

impl PluginHeader {
    /// 新建插件的头部
    pub fn new(release: GameRelease) -> Self {
        PluginHeader {
            flags: RecordFlags::empty(),
            version: release.default_header_version(),
            num_records: 0,
            next_object_id: 0x800,
            author: None,
            description: None,
            masters: Vec::new(),
            form_version: release.default_form_version(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.flags.contains(RecordFlags::MASTER_FILE)
    }

    pub fn is_light(&self) -> bool {
        self.flags.contains(RecordFlags::LIGHT_MASTER)
    }

    pub fn is_localized(&self) -> bool {
        self.flags.contains(RecordFlags::LOCALIZED)
    }

    /// 解析文件开头的头部记录，返回头部及其后第一个字节的位置
    pub fn parse(data: &[u8], release: GameRelease) -> Result<(Self, usize)> {
        let mut cursor = Cursor::new(data);
        let record = RecordHeader::parse(&mut cursor, release)?;
        if record.record_type != RecordType::HEADER {
            return Err(EspError::Format(format!(
                "文件开头应为 TES4 头部记录，但找到 {}",
                record.record_type
            )));
        }

        let start = release.header_len();
        let end = start + record.data_size as usize;
        if end > data.len() {
            return Err(EspError::Format(format!(
                "头部记录越界: 需要 {} bytes，文件只有 {} bytes",
                end,
                data.len()
            )));
        }

        let mut header = PluginHeader {
            flags: record.flags,
            version: 0.0,
            num_records: 0,
            next_object_id: 0,
            author: None,
            description: None,
            masters: Vec::new(),
            form_version: record.form_version,
        };
        let mut has_hedr = false;

        for subrecord in Subrecord::parse_all(&data[start..end])? {
            match &subrecord.tag {
                b"HEDR" => {
                    if subrecord.data.len() < HEDR_LEN {
                        return Err(EspError::Format(format!(
                            "HEDR 长度不足: {} bytes",
                            subrecord.data.len()
                        )));
                    }
                    let mut hedr = Cursor::new(subrecord.data.as_slice());
                    header.version = read_f32(&mut hedr)?;
                    header.num_records = read_u32(&mut hedr)?;
                    header.next_object_id = read_u32(&mut hedr)?;
                    has_hedr = true;
                }
                b"CNAM" => header.author = Some(RawString::parse_zstring(&subrecord.data).content),
                b"SNAM" => {
                    header.description = Some(RawString::parse_zstring(&subrecord.data).content)
                }
                b"MAST" => {
                    let name = RawString::parse_zstring(&subrecord.data).content;
                    let master = ModKey::from_file_name(&name)
                        .map_err(|e| EspError::Format(format!("无效的主文件名 {}: {}", name, e)))?;
                    header.masters.push(master);
                }
                // MAST 之后的 DATA（主文件大小）以及其余子记录不需要保留
                _ => {}
            }
        }

        if !has_hedr {
            return Err(EspError::Format("头部记录缺少 HEDR".into()));
        }
        if !release.accepts_header_version(header.version) {
            return Err(EspError::UnsupportedVersion(format!(
                "HEDR 版本 {} 不在 {:?} 支持的版本 {:?} 中",
                header.version,
                release,
                release.header_versions()
            )));
        }

        Ok((header, end))
    }

    /// 写出头部记录
    pub fn write(&self, release: GameRelease, output: &mut Vec<u8>) -> Result<()> {
        let mut data = Vec::new();

        let mut hedr = Vec::with_capacity(HEDR_LEN);
        write_f32(&mut hedr, self.version)?;
        write_u32(&mut hedr, self.num_records)?;
        write_u32(&mut hedr, self.next_object_id)?;
        Subrecord::new(*b"HEDR", hedr).write(&mut data)?;

        if let Some(author) = &self.author {
            Subrecord::new(*b"CNAM", RawString::encode_zstring(author)).write(&mut data)?;
        }
        if let Some(description) = &self.description {
            Subrecord::new(*b"SNAM", RawString::encode_zstring(description)).write(&mut data)?;
        }
        for master in &self.masters {
            Subrecord::new(*b"MAST", RawString::encode_zstring(&master.file_name())).write(&mut data)?;
            let mut size = Vec::with_capacity(8);
            write_u64(&mut size, 0)?;
            Subrecord::new(*b"DATA", size).write(&mut data)?;
        }

        let data_size = u32::try_from(data.len())
            .map_err(|_| EspError::Encoding(format!("头部记录过大: {} bytes", data.len())))?;
        let record = RecordHeader {
            record_type: RecordType::HEADER,
            data_size,
            flags: self.flags,
            raw_form_id: 0,
            timestamp: 0,
            version_control_info: 0,
            form_version: self.form_version,
            unknown: 0,
        };
        record.write(release, output)?;
        output.extend_from_slice(&data);
        Ok(())
    }
}
