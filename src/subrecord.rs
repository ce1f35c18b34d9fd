use crate::datatypes::{read_u16, read_u32, write_u16, write_u32};
use crate::utils::DecodeError;
use std::io::{Cursor, Read, Write};

/// 超长子记录的前缀标签，其 4 字节数据为下一个子记录的真实大小
pub const OVERSIZE_TAG: [u8; 4] = *b"XXXX";

/// 子记录结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subrecord {
    /// 4字符类型标签（原始字节）
    pub tag: [u8; 4],
    /// 原始数据
    pub data: Vec<u8>,
}

impl Subrecord {
    pub fn new(tag: [u8; 4], data: Vec<u8>) -> Self {
        Self { tag, data }
    }

    /// 解析子记录
    ///
    /// `size_override` 来自前一个 `XXXX` 子记录。
    pub fn parse(cursor: &mut Cursor<&[u8]>, size_override: Option<u32>) -> Result<Self, DecodeError> {
        // 检查是否有足够的数据读取头部
        if cursor.position() + 6 > cursor.get_ref().len() as u64 {
            return Err(DecodeError::Format("Insufficient data for subrecord header".into()));
        }

        // 读取类型标签 (4字节)
        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag)?;

        // 读取数据大小 (2字节)
        let declared = read_u16(cursor)? as u32;
        let size = size_override.unwrap_or(declared);

        // 检查是否有足够的数据
        if cursor.position() + size as u64 > cursor.get_ref().len() as u64 {
            return Err(DecodeError::Format(format!(
                "Insufficient data for subrecord {} data: expected {} bytes",
                String::from_utf8_lossy(&tag), size
            )));
        }

        let mut data = vec![0u8; size as usize];
        cursor.read_exact(&mut data)?;

        Ok(Subrecord { tag, data })
    }

    /// 解析记录数据中的全部子记录
    pub fn parse_all(data: &[u8]) -> Result<Vec<Subrecord>, DecodeError> {
        let mut subrecords = Vec::new();
        let mut cursor = Cursor::new(data);
        let mut size_override = None;

        while cursor.position() < data.len() as u64 {
            let remaining = data.len() as u64 - cursor.position();

            // 子记录最小头部大小为 6 字节，不足时只允许 NULL 填充
            if remaining < 6 {
                let remaining_bytes = &data[cursor.position() as usize..];
                if remaining_bytes.iter().all(|&b| b == 0) {
                    break;
                }
                return Err(DecodeError::Format(format!(
                    "记录末尾有 {} 字节非 NULL 数据，无法解析为子记录: {:02X?}",
                    remaining, remaining_bytes
                )));
            }

            let subrecord = Self::parse(&mut cursor, size_override.take())?;
            if subrecord.tag == OVERSIZE_TAG {
                if subrecord.data.len() != 4 {
                    return Err(DecodeError::Format(format!(
                        "XXXX 子记录大小应为 4，实际 {}",
                        subrecord.data.len()
                    )));
                }
                let mut size_cursor = Cursor::new(subrecord.data.as_slice());
                size_override = Some(read_u32(&mut size_cursor)?);
                continue;
            }
            subrecords.push(subrecord);
        }

        if size_override.is_some() {
            return Err(DecodeError::Format("XXXX 子记录之后没有数据".into()));
        }

        Ok(subrecords)
    }

    /// 写入子记录，超过 u16 范围时先写 `XXXX`
    pub fn write(&self, output: &mut dyn Write) -> std::io::Result<()> {
        if self.data.len() > u16::MAX as usize {
            output.write_all(&OVERSIZE_TAG)?;
            write_u16(output, 4)?;
            write_u32(output, self.data.len() as u32)?;
            output.write_all(&self.tag)?;
            write_u16(output, 0)?;
        } else {
            output.write_all(&self.tag)?;
            write_u16(output, self.data.len() as u16)?;
        }
        output.write_all(&self.data)
    }

    /// 获取子记录类型
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}
