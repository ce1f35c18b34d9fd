use super::ARMOR;
use crate::fields::{FieldSet, FieldValue};
use crate::link_cache::FormLink;
use crate::mutable_record::MutableRecord;
use crate::utils::Result;

const CONFIGURATION: &str = "configuration";

/// NPC 穿戴的护甲（`WNAM`）
pub fn worn_armor(fields: &FieldSet) -> Option<FormLink> {
    fields
        .link("worn_armor")
        .map(|key| FormLink::new(key.clone(), ARMOR))
}

/// `ACBS` 中的魔法值偏移
pub fn magicka_offset(fields: &FieldSet) -> Option<i64> {
    fields.block(CONFIGURATION)?.int("magicka_offset")
}

pub fn set_magicka_offset(record: &mut MutableRecord, offset: i64) -> Result<()> {
    record
        .block_or_default(CONFIGURATION)?
        .set("magicka_offset", FieldValue::Int(offset));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NPC;
    use crate::release::GameRelease;

    #[test]
    fn test_worn_armor_and_magicka() {
        let mut npc = MutableRecord::new("000800:Out.esp".parse().unwrap(), NPC, GameRelease::SkyrimSE);
        assert!(worn_armor(npc.fields()).is_none());
        assert!(magicka_offset(npc.fields()).is_none());

        npc.fields_mut()
            .set("worn_armor", FieldValue::Link(Some("012E49:Skyrim.esm".parse().unwrap())));
        set_magicka_offset(&mut npc, 2).unwrap();

        let link = worn_armor(npc.fields()).unwrap();
        assert_eq!(link.record_type, ARMOR);
        assert_eq!(magicka_offset(npc.fields()), Some(2));
        assert_eq!(
            npc.fields().block(CONFIGURATION).unwrap().int("level"),
            Some(0),
            "新建的 ACBS 其余成员为零值"
        );
    }
}
