use crate::datatypes::{read_u16, read_u32, write_u16, write_u32, RecordFlags};
use crate::release::GameRelease;
use crate::utils::{DecodeError, EspError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::str::FromStr;

/// 单条记录数据的上限（100MB），超过视为数据损坏
const MAX_RECORD_DATA: u32 = 100_000_000;
/// 解压后数据的上限（50MB）
const MAX_DECOMPRESSED: u32 = 50_000_000;

/// 4字符记录类型，例如 `WEAP`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType(pub [u8; 4]);

impl RecordType {
    pub const HEADER: RecordType = RecordType(*b"TES4");
    pub const GROUP: RecordType = RecordType(*b"GRUP");

    pub const fn new(bytes: [u8; 4]) -> Self {
        RecordType(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordType({})", self)
    }
}

impl FromStr for RecordType {
    type Err = EspError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| EspError::UnknownRecordType(format!("记录类型必须是 4 个字符: {}", s)))?;
        Ok(RecordType(bytes))
    }
}

/// 记录头部
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub record_type: RecordType,
    /// 数据大小（不含头部）
    pub data_size: u32,
    pub flags: RecordFlags,
    /// 原始 FormID（高 8 位为主文件索引）
    pub raw_form_id: u32,
    /// 时间戳
    pub timestamp: u16,
    /// 版本控制信息
    pub version_control_info: u16,
    /// 记录格式版本（Oblivion 没有该字段，恒为 0）
    pub form_version: u16,
    /// 未知字段
    pub unknown: u16,
}

impl RecordHeader {
    /// 解析记录头部
    pub fn parse(cursor: &mut Cursor<&[u8]>, release: GameRelease) -> Result<Self> {
        let start = cursor.position();
        if start + release.header_len() as u64 > cursor.get_ref().len() as u64 {
            return Err(EspError::Format(format!(
                "Insufficient data for record header at 0x{:X}",
                start
            )));
        }

        let mut type_bytes = [0u8; 4];
        cursor.read_exact(&mut type_bytes)?;
        let record_type = RecordType(type_bytes);

        let data_size = read_u32(cursor)?;
        if data_size > MAX_RECORD_DATA {
            return Err(EspError::Format(format!(
                "记录 {} 数据大小异常: {} bytes (可能数据损坏)",
                record_type, data_size
            )));
        }

        let flags = RecordFlags::from_bits_retain(read_u32(cursor)?);
        let raw_form_id = read_u32(cursor)?;

        let (timestamp, version_control_info, form_version, unknown) = match release {
            GameRelease::Oblivion => {
                let vc = read_u32(cursor)?;
                ((vc & 0xFFFF) as u16, (vc >> 16) as u16, 0, 0)
            }
            _ => (
                read_u16(cursor)?,
                read_u16(cursor)?,
                read_u16(cursor)?,
                read_u16(cursor)?,
            ),
        };

        Ok(RecordHeader {
            record_type,
            data_size,
            flags,
            raw_form_id,
            timestamp,
            version_control_info,
            form_version,
            unknown,
        })
    }

    /// 写入记录头部
    pub fn write(&self, release: GameRelease, output: &mut dyn Write) -> std::io::Result<()> {
        output.write_all(self.record_type.as_bytes())?;
        write_u32(output, self.data_size)?;
        write_u32(output, self.flags.bits())?;
        write_u32(output, self.raw_form_id)?;
        match release {
            GameRelease::Oblivion => {
                let vc = ((self.version_control_info as u32) << 16) | self.timestamp as u32;
                write_u32(output, vc)?;
            }
            _ => {
                write_u16(output, self.timestamp)?;
                write_u16(output, self.version_control_info)?;
                write_u16(output, self.form_version)?;
                write_u16(output, self.unknown)?;
            }
        }
        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(RecordFlags::COMPRESSED)
    }

    /// 检查 form version 是否在当前游戏版本的支持范围内
    pub fn check_form_version(&self, release: GameRelease) -> std::result::Result<(), DecodeError> {
        match release.form_versions() {
            Some(range) if !range.contains(&self.form_version) => {
                Err(DecodeError::UnsupportedVersion(format!(
                    "记录 {} (FormID 0x{:08X}) 的 form version {} 不在 {:?} 支持范围 {:?} 内",
                    self.record_type, self.raw_form_id, self.form_version, release, range
                )))
            }
            _ => Ok(()),
        }
    }
}

/// 解压缩数据
///
/// 压缩记录的数据部分为：解压后大小 (u32) + zlib 数据流。
pub fn decompress_data(data: &[u8]) -> std::result::Result<Vec<u8>, DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::Compression("压缩数据太短，无法包含解压大小".into()));
    }

    let mut data_cursor = Cursor::new(data);
    let decompressed_size = read_u32(&mut data_cursor)?;

    if decompressed_size > MAX_DECOMPRESSED {
        return Err(DecodeError::Compression(format!(
            "解压大小过大: {} bytes (可能数据损坏)",
            decompressed_size
        )));
    }

    let compressed_data = &data[4..];
    if compressed_data.is_empty() {
        return Err(DecodeError::Compression("没有压缩数据".into()));
    }

    let mut decoder = ZlibDecoder::new(compressed_data);
    let mut decompressed = Vec::with_capacity(decompressed_size as usize);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::Compression(e.to_string()))?;

    if decompressed.len() != decompressed_size as usize {
        return Err(DecodeError::Compression(format!(
            "解压大小不匹配: 期望 {} bytes，实际 {} bytes",
            decompressed_size,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

/// 压缩数据（格式同 [`decompress_data`]）
pub fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed_data = encoder.finish()?;

    let mut result = Vec::with_capacity(compressed_data.len() + 4);
    write_u32(&mut result, data.len() as u32)?;
    result.extend_from_slice(&compressed_data);
    Ok(result)
}
