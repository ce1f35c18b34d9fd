//! 单元测试用的插件字节构造器

use crate::datatypes::RecordFlags;
use crate::form_key::ModKey;
use crate::group::{GroupHeader, GroupType};
use crate::header::PluginHeader;
use crate::record::{RecordHeader, RecordType};
use crate::release::GameRelease;

struct RawRecord {
    group: [u8; 4],
    nested: bool,
    header: RecordHeader,
    data: Vec<u8>,
}

/// 直接拼接记录字节，不经过写入器
pub(crate) struct PluginBuilder {
    release: GameRelease,
    header: PluginHeader,
    records: Vec<RawRecord>,
}

impl PluginBuilder {
    pub fn new(release: GameRelease) -> Self {
        PluginBuilder {
            release,
            header: PluginHeader::new(release),
            records: Vec::new(),
        }
    }

    pub fn master(mut self, file_name: &str) -> Self {
        self.header
            .masters
            .push(ModKey::from_file_name(file_name).unwrap());
        self
    }

    pub fn record(self, tag: [u8; 4], raw_form_id: u32, data: Vec<u8>) -> Self {
        let version = self.release.default_form_version();
        self.push(tag, tag, false, raw_form_id, data, RecordFlags::empty(), version)
    }

    pub fn record_with_version(self, tag: [u8; 4], raw_form_id: u32, data: Vec<u8>, form_version: u16) -> Self {
        self.push(tag, tag, false, raw_form_id, data, RecordFlags::empty(), form_version)
    }

    pub fn record_with_flags(self, tag: [u8; 4], raw_form_id: u32, data: Vec<u8>, flags: RecordFlags) -> Self {
        let version = self.release.default_form_version();
        self.push(tag, tag, false, raw_form_id, data, flags, version)
    }

    /// 放在顶级组 `group` 的子组中的记录
    pub fn nested_record(self, group: [u8; 4], tag: [u8; 4], raw_form_id: u32, data: Vec<u8>) -> Self {
        let version = self.release.default_form_version();
        self.push(group, tag, true, raw_form_id, data, RecordFlags::empty(), version)
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        mut self,
        group: [u8; 4],
        tag: [u8; 4],
        nested: bool,
        raw_form_id: u32,
        data: Vec<u8>,
        flags: RecordFlags,
        form_version: u16,
    ) -> Self {
        self.records.push(RawRecord {
            group,
            nested,
            header: RecordHeader {
                record_type: RecordType(tag),
                data_size: data.len() as u32,
                flags,
                raw_form_id,
                timestamp: 0,
                version_control_info: 0,
                form_version,
                unknown: 0,
            },
            data,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let release = self.release;
        let header_len = release.header_len();
        let mut output = Vec::new();
        self.header.write(release, &mut output).unwrap();

        let mut labels: Vec<[u8; 4]> = Vec::new();
        for record in &self.records {
            if !labels.contains(&record.group) {
                labels.push(record.group);
            }
        }

        for label in labels {
            let mut body = Vec::new();
            for record in self.records.iter().filter(|r| r.group == label) {
                let mut bytes = Vec::new();
                record.header.write(release, &mut bytes).unwrap();
                bytes.extend_from_slice(&record.data);
                if record.nested {
                    let mut child = GroupHeader::top_level(RecordType(label));
                    child.group_type = GroupType::Cell;
                    child
                        .write(release, (header_len + bytes.len()) as u32, &mut body)
                        .unwrap();
                }
                body.extend_from_slice(&bytes);
            }
            GroupHeader::top_level(RecordType(label))
                .write(release, (header_len + body.len()) as u32, &mut output)
                .unwrap();
            output.extend_from_slice(&body);
        }

        output
    }
}
