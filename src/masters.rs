//! 原始 FormID 与 FormKey 之间的转换
//!
//! 磁盘上的 FormID 高 8 位是插件头部 `MAST` 列表的索引，低 24 位是本地 ID。
//! 索引等于（或超过）主文件数量时表示插件自身。

use crate::form_key::{FormKey, ModKey};
use crate::utils::{EspError, Result};

/// 主文件索引上限
const MAX_MASTERS: usize = 0xFF;

/// 读取方向：插件头部的主文件列表 + 插件自身
#[derive(Debug, Clone)]
pub struct MasterReferences {
    masters: Vec<ModKey>,
    own: ModKey,
}

impl MasterReferences {
    pub fn new(masters: Vec<ModKey>, own: ModKey) -> Self {
        Self { masters, own }
    }

    pub fn masters(&self) -> &[ModKey] {
        &self.masters
    }

    pub fn own(&self) -> &ModKey {
        &self.own
    }

    /// 原始 FormID 转 FormKey（不处理空引用）
    pub fn form_key(&self, raw: u32) -> FormKey {
        let index = (raw >> 24) as usize;
        let mod_key = self.masters.get(index).unwrap_or(&self.own).clone();
        FormKey::masked(mod_key, raw)
    }

    /// 链接字段转换，FormID 0 为空引用
    pub fn link(&self, raw: u32) -> Option<FormKey> {
        if raw == 0 {
            None
        } else {
            Some(self.form_key(raw))
        }
    }
}

/// 写入方向：按遇到的顺序分配主文件索引
#[derive(Debug, Clone)]
pub struct MasterTable {
    own: ModKey,
    masters: Vec<ModKey>,
}

impl MasterTable {
    /// `seed` 中的主文件按给定顺序排在最前
    pub fn new(own: ModKey, seed: &[ModKey]) -> Self {
        let mut table = MasterTable {
            own,
            masters: Vec::with_capacity(seed.len()),
        };
        for mod_key in seed {
            if *mod_key != table.own && !table.masters.contains(mod_key) {
                table.masters.push(mod_key.clone());
            }
        }
        table
    }

    /// 登记一个被引用的插件
    pub fn register(&mut self, mod_key: &ModKey) -> Result<()> {
        if *mod_key == self.own || self.masters.contains(mod_key) {
            return Ok(());
        }
        if self.masters.len() >= MAX_MASTERS {
            return Err(EspError::Encoding(format!(
                "主文件数量超过 {} 个，无法引用 {}",
                MAX_MASTERS, mod_key
            )));
        }
        self.masters.push(mod_key.clone());
        Ok(())
    }

    /// FormKey 转原始 FormID；引用的插件必须已登记
    pub fn raw(&self, form_key: &FormKey) -> Result<u32> {
        let index = if *form_key.mod_key() == self.own {
            self.masters.len()
        } else {
            self.masters
                .iter()
                .position(|m| m == form_key.mod_key())
                .ok_or_else(|| {
                    EspError::Encoding(format!("{} 的插件未登记为主文件", form_key))
                })?
        };
        Ok(((index as u32) << 24) | form_key.id())
    }

    pub fn masters(&self) -> &[ModKey] {
        &self.masters
    }

    /// 原始 FormID 索引对应的插件；索引等于主文件数量时为插件自身
    pub fn mod_at(&self, index: usize) -> Option<&ModKey> {
        self.masters
            .get(index)
            .or_else(|| (index == self.masters.len()).then_some(&self.own))
    }

    /// 按 `context` 编码的原始 FormID 在本表中是否仍指向同一插件
    pub fn preserves(&self, context: &[ModKey]) -> bool {
        context
            .iter()
            .enumerate()
            .all(|(index, mod_key)| self.mod_at(index) == Some(mod_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ModKey {
        ModKey::from_file_name(name).unwrap()
    }

    #[test]
    fn test_raw_form_id_to_form_key() {
        let refs = MasterReferences::new(vec![key("Skyrim.esm"), key("Update.esm")], key("Patch.esp"));

        assert_eq!(refs.form_key(0x0001_2EB7).to_string(), "012EB7:Skyrim.esm");
        assert_eq!(refs.form_key(0x0100_0800).to_string(), "000800:Update.esm");
        assert_eq!(refs.form_key(0x0200_0801).to_string(), "000801:Patch.esp");
        // 越界索引视为插件自身
        assert_eq!(refs.form_key(0x0500_0001).mod_key(), &key("Patch.esp"));
        assert!(refs.link(0).is_none());
    }

    #[test]
    fn test_master_table_assigns_in_order() {
        let mut table = MasterTable::new(key("Out.esp"), &[key("Skyrim.esm")]);
        table.register(&key("Dawnguard.esm")).unwrap();
        table.register(&key("Out.esp")).unwrap();
        table.register(&key("skyrim.esm")).unwrap();
        assert_eq!(table.masters(), &[key("Skyrim.esm"), key("Dawnguard.esm")]);

        let own: FormKey = "000800:Out.esp".parse().unwrap();
        let dawnguard: FormKey = "00000F:Dawnguard.esm".parse().unwrap();
        assert_eq!(table.raw(&own).unwrap(), 0x0200_0800);
        assert_eq!(table.raw(&dawnguard).unwrap(), 0x0100_000F);
    }

    #[test]
    fn test_unregistered_master_is_encoding_error() {
        let table = MasterTable::new(key("Out.esp"), &[]);
        let foreign: FormKey = "000001:Other.esp".parse().unwrap();
        assert!(matches!(table.raw(&foreign), Err(EspError::Encoding(_))));
    }

    #[test]
    fn test_too_many_masters() {
        let mut table = MasterTable::new(key("Out.esp"), &[]);
        for i in 0..MAX_MASTERS {
            table.register(&key(&format!("Master{}.esm", i))).unwrap();
        }
        let err = table.register(&key("OneTooMany.esm")).unwrap_err();
        assert!(matches!(err, EspError::Encoding(_)));
    }

    #[test]
    fn test_preserves_master_context() {
        let table = MasterTable::new(key("Out.esp"), &[key("Skyrim.esm"), key("Dawnguard.esm")]);
        assert_eq!(table.mod_at(2), Some(&key("Out.esp")));
        assert_eq!(table.mod_at(3), None);

        assert!(table.preserves(&[]));
        assert!(table.preserves(&[key("Skyrim.esm")]));
        assert!(table.preserves(&[key("Skyrim.esm"), key("Dawnguard.esm")]));
        assert!(!table.preserves(&[key("Dawnguard.esm"), key("Skyrim.esm")]));
        assert!(!table.preserves(&[key("Skyrim.esm"), key("Dawnguard.esm"), key("Mod.esp")]));
    }
}
