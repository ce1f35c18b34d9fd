use crate::datatypes::{read_i32, read_u16, read_u32, write_i32, write_u16, write_u32};
use crate::record::RecordType;
use crate::release::GameRelease;
use crate::utils::{EspError, Result};
use std::io::{Cursor, Read, Write};

/// 组大小上限（200MB），超过视为数据损坏
const MAX_GROUP_SIZE: u32 = 200_000_000;

/// 组类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    /// 顶级组（标签为记录类型）
    Normal,
    /// 世界组
    World,
    /// 单元格组
    Cell,
    /// 其余嵌套组类型
    Unknown(i32),
}

impl GroupType {
    /// 转换为i32值
    pub fn to_i32(&self) -> i32 {
        match self {
            GroupType::Normal => 0,
            GroupType::World => 1,
            GroupType::Cell => 6,
            GroupType::Unknown(value) => *value,
        }
    }
}

impl From<i32> for GroupType {
    fn from(value: i32) -> Self {
        match value {
            0 => GroupType::Normal,
            1 => GroupType::World,
            6 => GroupType::Cell,
            _ => GroupType::Unknown(value),
        }
    }
}

/// 组头部
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    /// 组大小（包含头部）
    pub size: u32,
    /// 标签（顶级组为记录类型）
    pub label: [u8; 4],
    pub group_type: GroupType,
    pub timestamp: u16,
    pub version_control_info: u16,
    pub unknown: u32,
}

impl GroupHeader {
    /// 顶级组头部，大小在写入内容后回填
    pub fn top_level(record_type: RecordType) -> Self {
        GroupHeader {
            size: 0,
            label: *record_type.as_bytes(),
            group_type: GroupType::Normal,
            timestamp: 0,
            version_control_info: 0,
            unknown: 0,
        }
    }

    /// 解析组头部（含 `GRUP` 标识）
    pub fn parse(cursor: &mut Cursor<&[u8]>, release: GameRelease) -> Result<Self> {
        let start = cursor.position();
        let header_len = release.header_len();
        if start + header_len as u64 > cursor.get_ref().len() as u64 {
            return Err(EspError::Format(format!(
                "Insufficient data for group header at 0x{:X}",
                start
            )));
        }

        let mut type_bytes = [0u8; 4];
        cursor.read_exact(&mut type_bytes)?;
        if &type_bytes != RecordType::GROUP.as_bytes() {
            return Err(EspError::Format(format!(
                "在位置 0x{:X} 期望 GRUP，但找到 {}",
                start,
                String::from_utf8_lossy(&type_bytes)
            )));
        }

        let size = read_u32(cursor)?;
        if size > MAX_GROUP_SIZE {
            return Err(EspError::Format(format!("组大小异常: {} bytes (可能数据损坏)", size)));
        }
        if (size as usize) < header_len {
            return Err(EspError::Format(format!(
                "组大小太小: {} bytes (最小应为{}字节)",
                size, header_len
            )));
        }

        let mut label = [0u8; 4];
        cursor.read_exact(&mut label)?;
        let group_type = GroupType::from(read_i32(cursor)?);

        let (timestamp, version_control_info, unknown) = match release {
            GameRelease::Oblivion => {
                let stamp = read_u32(cursor)?;
                ((stamp & 0xFFFF) as u16, (stamp >> 16) as u16, 0)
            }
            _ => (read_u16(cursor)?, read_u16(cursor)?, read_u32(cursor)?),
        };

        Ok(GroupHeader {
            size,
            label,
            group_type,
            timestamp,
            version_control_info,
            unknown,
        })
    }

    /// 写入组头部；`size` 为包含头部的总大小
    pub fn write(&self, release: GameRelease, size: u32, output: &mut dyn Write) -> std::io::Result<()> {
        output.write_all(RecordType::GROUP.as_bytes())?;
        write_u32(output, size)?;
        output.write_all(&self.label)?;
        write_i32(output, self.group_type.to_i32())?;
        match release {
            GameRelease::Oblivion => {
                let stamp = ((self.version_control_info as u32) << 16) | self.timestamp as u32;
                write_u32(output, stamp)?;
            }
            _ => {
                write_u16(output, self.timestamp)?;
                write_u16(output, self.version_control_info)?;
                write_u32(output, self.unknown)?;
            }
        }
        Ok(())
    }

    /// 获取组标签字符串
    pub fn label_string(&self) -> String {
        String::from_utf8_lossy(&self.label).into_owned()
    }
}
