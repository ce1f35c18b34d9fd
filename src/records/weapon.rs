use crate::fields::{FieldSet, FieldValue};
use crate::mutable_record::MutableRecord;
use crate::utils::Result;

const BASIC_STATS: &str = "basic_stats";

/// 武器的 `DATA` 子结构
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponBasicStats {
    pub value: i64,
    pub weight: f32,
    pub damage: i64,
}

impl WeaponBasicStats {
    /// 读取基础属性；记录没有该子结构时返回 None，缺失的成员按 0 处理
    pub fn read(fields: &FieldSet) -> Option<Self> {
        let block = fields.block(BASIC_STATS)?;
        Some(WeaponBasicStats {
            value: block.int("value").unwrap_or(0),
            weight: block.float("weight").unwrap_or(0.0),
            damage: block.int("damage").unwrap_or(0),
        })
    }

    /// 写入基础属性，子结构不存在时创建
    pub fn write(&self, record: &mut MutableRecord) -> Result<()> {
        let block = record.block_or_default(BASIC_STATS)?;
        block.set("value", FieldValue::Int(self.value));
        block.set("weight", FieldValue::Float(self.weight));
        block.set("damage", FieldValue::Int(self.damage));
        Ok(())
    }

    /// 增加伤害；没有基础属性或属性结构不完整（缺少伤害之前的成员）的记录不做修改，返回 false
    pub fn add_damage(record: &mut MutableRecord, amount: i64) -> bool {
        let Some(block) = record.fields_mut().block_mut(BASIC_STATS) else {
            return false;
        };
        if !block.contains("value") || !block.contains("weight") {
            return false;
        }
        let damage = block.int("damage").unwrap_or(0);
        block.set("damage", FieldValue::Int(damage + amount));
        true
    }
}
