#![allow(dead_code)]

use esp_patcher::records::{WeaponBasicStats, WEAPON};
use esp_patcher::{
    FieldValue, FormKey, GameRelease, ModKey, MutablePlugin, MutableRecord, OverlayOptions,
    PluginOverlay, WriteOptions,
};
use std::path::{Path, PathBuf};

pub fn mod_key(file_name: &str) -> ModKey {
    ModKey::from_file_name(file_name).unwrap()
}

pub fn form_key(text: &str) -> FormKey {
    text.parse().unwrap()
}

/// 指定 FormKey 的武器记录
pub fn weapon(key: &str, editor_id: &str, damage: i64) -> MutableRecord {
    let mut record = MutableRecord::new(form_key(key), WEAPON, GameRelease::SkyrimSE);
    record.set_editor_id(editor_id);
    record
        .fields_mut()
        .set("name", FieldValue::String(format!("{} Name", editor_id)));
    WeaponBasicStats {
        value: damage * 10,
        weight: 9.0,
        damage,
    }
    .write(&mut record)
    .unwrap();
    record
}

/// 把插件写入目录并返回路径
pub fn write_plugin(dir: &Path, plugin: &MutablePlugin) -> PathBuf {
    let path = dir.join(plugin.mod_key().file_name());
    plugin.write_to_path(&path, &WriteOptions::default()).unwrap();
    path
}

pub fn open(path: &Path) -> PluginOverlay {
    PluginOverlay::open(path, &OverlayOptions::default()).unwrap()
}

/// 只包含给定记录的插件
pub fn plugin_with(file_name: &str, records: Vec<MutableRecord>) -> MutablePlugin {
    let mut plugin = MutablePlugin::new(mod_key(file_name), GameRelease::SkyrimSE);
    for record in records {
        plugin.set_record(record);
    }
    plugin
}
