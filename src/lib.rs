pub mod codec;
pub mod datatypes;
pub mod debug;
pub mod fields;
pub mod form_key;
pub mod group;
pub mod header;
pub mod io;
pub mod link_cache;
pub mod mask;
pub mod masters;
pub mod mutable_record;
pub mod overlay;
pub mod patch;
pub mod record;
pub mod records;
pub mod release;
pub mod schema;
pub mod subrecord;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出主要结构
pub use datatypes::RecordFlags;
pub use debug::EspDebugger;
pub use fields::{FieldSet, FieldValue, RecordBody};
pub use form_key::{FormKey, ModKey, ModType};
pub use header::PluginHeader;
pub use io::{ArchiveBytes, PluginReader, PluginWriter};
pub use link_cache::{FormLink, LinkCache};
pub use mask::TranslationMask;
pub use mutable_record::MutableRecord;
pub use overlay::{PluginOverlay, PluginStats, RecordView, UnreadableRecord};
pub use patch::{MutablePlugin, RecordOrigin};
pub use record::RecordType;
pub use release::{GameRelease, OverlayOptions, UnsupportedRecordPolicy, WriteOptions};
pub use schema::SchemaRegistry;
pub use subrecord::Subrecord;
pub use utils::{EspError, Result};
