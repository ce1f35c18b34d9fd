use super::{RecordEntry, UnreadableRecord};
use crate::group::GroupHeader;
use crate::masters::MasterReferences;
use crate::record::{RecordHeader, RecordType};
use crate::release::{GameRelease, UnsupportedRecordPolicy};
use crate::utils::{EspError, Result};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::OnceLock;

/// 头部扫描结果
#[derive(Debug, Default)]
pub(super) struct ScanResult {
    pub record_types: Vec<RecordType>,
    pub groups: HashMap<RecordType, Vec<usize>>,
    pub entries: Vec<RecordEntry>,
    pub index: HashMap<crate::form_key::FormKey, usize>,
    pub unreadable: Vec<UnreadableRecord>,
    pub group_count: usize,
}

struct Scanner<'a> {
    data: &'a [u8],
    release: GameRelease,
    refs: &'a MasterReferences,
    policy: UnsupportedRecordPolicy,
    result: ScanResult,
}

/// 扫描头部记录之后的全部组，只读取组头与记录头
pub(super) fn scan(
    data: &[u8],
    start: usize,
    release: GameRelease,
    refs: &MasterReferences,
    policy: UnsupportedRecordPolicy,
) -> Result<ScanResult> {
    let mut scanner = Scanner {
        data,
        release,
        refs,
        policy,
        result: ScanResult::default(),
    };
    scanner.scan_region(start, data.len(), true)?;
    Ok(scanner.result)
}

impl Scanner<'_> {
    fn scan_region(&mut self, start: usize, end: usize, top_level: bool) -> Result<()> {
        let header_len = self.release.header_len();
        let region = &self.data[..end];
        let mut pos = start;

        while pos < end {
            if end - pos < header_len {
                return Err(EspError::Format(format!(
                    "位置 0x{:X} 处剩余 {} bytes，不足以容纳头部",
                    pos,
                    end - pos
                )));
            }

            let mut cursor = Cursor::new(region);
            cursor.set_position(pos as u64);

            if &region[pos..pos + 4] == RecordType::GROUP.as_bytes() {
                let group = GroupHeader::parse(&mut cursor, self.release)?;
                let group_end = pos + group.size as usize;
                if group_end > end {
                    return Err(EspError::Format(format!(
                        "组 {} (位置 0x{:X}) 超出所在范围: 结束于 0x{:X}，上限 0x{:X}",
                        group.label_string(),
                        pos,
                        group_end,
                        end
                    )));
                }
                self.result.group_count += 1;
                self.scan_region(pos + header_len, group_end, false)?;
                pos = group_end;
            } else {
                if top_level {
                    return Err(EspError::Format(format!(
                        "位置 0x{:X} 处期望 GRUP，但找到 {}",
                        pos,
                        String::from_utf8_lossy(&region[pos..pos + 4])
                    )));
                }
                let header = RecordHeader::parse(&mut cursor, self.release)?;
                let data_start = pos + header_len;
                let data_end = data_start + header.data_size as usize;
                if data_end > end {
                    return Err(EspError::Format(format!(
                        "记录 {} (FormID 0x{:08X}) 超出所在组: 结束于 0x{:X}，上限 0x{:X}",
                        header.record_type, header.raw_form_id, data_end, end
                    )));
                }
                self.add_record(header, data_start..data_end);
                pos = data_end;
            }
        }

        Ok(())
    }

    fn add_record(&mut self, header: RecordHeader, span: std::ops::Range<usize>) {
        let form_key = self.refs.form_key(header.raw_form_id);
        let record_type = header.record_type;
        let decoded = OnceLock::new();

        if let Err(err) = header.check_form_version(self.release) {
            tracing::warn!("记录 {} ({}) 无法读取: {}", form_key, record_type, err);
            self.result.unreadable.push(UnreadableRecord {
                form_key: form_key.clone(),
                record_type,
                reason: err.to_string(),
            });
            match self.policy {
                UnsupportedRecordPolicy::Skip => return,
                UnsupportedRecordPolicy::Report => {
                    let _ = decoded.set(Err(err));
                }
            }
        }

        let result = &mut self.result;
        if result.index.contains_key(&form_key) {
            tracing::warn!("重复的 FormKey {}，保留先出现的记录", form_key);
            return;
        }

        let idx = result.entries.len();
        result.index.insert(form_key.clone(), idx);
        if !result.groups.contains_key(&record_type) {
            result.record_types.push(record_type);
        }
        result.groups.entry(record_type).or_default().push(idx);
        result.entries.push(RecordEntry {
            header,
            form_key,
            span,
            decoded,
        });
    }
}
