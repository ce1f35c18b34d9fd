//! 常用记录类型的字段访问
//!
//! 字段本身由结构定义描述，这里只是按名称读写的便捷封装。

pub mod npc;
pub mod weapon;

use crate::record::RecordType;

pub const WEAPON: RecordType = RecordType::new(*b"WEAP");
pub const ARMOR: RecordType = RecordType::new(*b"ARMO");
pub const NPC: RecordType = RecordType::new(*b"NPC_");

pub use npc::{magicka_offset, set_magicka_offset, worn_armor};
pub use weapon::WeaponBasicStats;
