use super::PluginOverlay;
use crate::record::RecordType;
use crate::release::GameRelease;

/// 插件统计信息
pub struct PluginStats {
    pub name: String,
    pub release: GameRelease,
    pub is_master: bool,
    pub is_light: bool,
    pub is_localized: bool,
    pub master_count: usize,
    pub group_count: usize,
    pub record_count: usize,
    pub compressed_count: usize,
    pub unreadable_count: usize,
    /// 各记录类型的数量（按首次出现顺序）
    pub record_types: Vec<(RecordType, usize)>,
}

impl std::fmt::Display for PluginStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== 插件统计信息 ===")?;
        writeln!(f, "名称: {}", self.name)?;
        writeln!(f, "游戏版本: {:?}", self.release)?;
        writeln!(f, "主文件: {}", if self.is_master { "是" } else { "否" })?;
        writeln!(f, "轻量级: {}", if self.is_light { "是" } else { "否" })?;
        writeln!(f, "本地化: {}", if self.is_localized { "是" } else { "否" })?;
        writeln!(f, "依赖主文件数: {}", self.master_count)?;
        writeln!(f, "组数量: {}", self.group_count)?;
        writeln!(f, "记录数量: {}", self.record_count)?;
        writeln!(f, "压缩记录数: {}", self.compressed_count)?;
        writeln!(f, "无法读取的记录数: {}", self.unreadable_count)?;
        for (record_type, count) in &self.record_types {
            writeln!(f, "  {}: {}", record_type, count)?;
        }
        Ok(())
    }
}

impl PluginOverlay {
    /// 获取统计信息（只使用扫描得到的头部信息，不解码记录）
    pub fn stats(&self) -> PluginStats {
        PluginStats {
            name: self.mod_key().to_string(),
            release: self.release(),
            is_master: self.header().is_master(),
            is_light: self.header().is_light(),
            is_localized: self.header().is_localized(),
            master_count: self.masters().len(),
            group_count: self.group_count(),
            record_count: self.len(),
            compressed_count: self
                .all_records()
                .filter(|r| r.header().is_compressed())
                .count(),
            unreadable_count: self.unreadable().len(),
            record_types: self
                .record_types()
                .iter()
                .map(|&t| (t, self.records(t).count()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::form_key::ModKey;
    use crate::release::{GameRelease, OverlayOptions};
    use crate::test_support::PluginBuilder;
    use crate::PluginOverlay;

    #[test]
    fn test_stats_counts() {
        let bytes = PluginBuilder::new(GameRelease::SkyrimSE)
            .master("Skyrim.esm")
            .record(*b"WEAP", 0x0100_0801, Vec::new())
            .record(*b"WEAP", 0x0100_0802, Vec::new())
            .record(*b"ARMO", 0x0100_0803, Vec::new())
            .build();
        let plugin = PluginOverlay::from_bytes(
            ModKey::from_file_name("Mod.esp").unwrap(),
            bytes,
            &OverlayOptions::default(),
        )
        .unwrap();

        let stats = plugin.stats();
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.group_count, 2);
        assert_eq!(stats.master_count, 1);
        assert_eq!(stats.record_types.len(), 2);

        let text = stats.to_string();
        assert!(text.contains("名称: Mod.esp"));
        assert!(text.contains("WEAP: 2"));
    }
}
