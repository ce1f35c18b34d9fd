use crate::utils::{EspError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;

/// 本地 ID 的最大值（FormID 低 24 位）
pub const MAX_LOCAL_ID: u32 = 0x00FF_FFFF;

/// 插件类型（由扩展名决定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModType {
    /// .esm
    Master,
    /// .esp
    Plugin,
    /// .esl
    Light,
}

impl ModType {
    pub fn extension(&self) -> &'static str {
        match self {
            ModType::Master => "esm",
            ModType::Plugin => "esp",
            ModType::Light => "esl",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "esm" => Some(ModType::Master),
            "esp" => Some(ModType::Plugin),
            "esl" => Some(ModType::Light),
            _ => None,
        }
    }
}

/// 插件标识：名称 + 类型
///
/// 名称比较不区分 ASCII 大小写（`Skyrim.esm` 与 `skyrim.esm` 是同一个插件），
/// 显示时保留原始大小写。
#[derive(Debug, Clone)]
pub struct ModKey {
    name: String,
    folded: String,
    mod_type: ModType,
}

impl ModKey {
    /// 由名称（不含扩展名）和类型构造
    pub fn new(name: &str, mod_type: ModType) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(EspError::InvalidModKey("插件名称为空".to_string()));
        }
        if name.contains(['/', '\\']) {
            return Err(EspError::InvalidModKey(format!("插件名称不能包含路径分隔符: {}", name)));
        }
        Ok(ModKey {
            name: name.to_string(),
            folded: name.to_ascii_lowercase(),
            mod_type,
        })
    }

    /// 由文件名构造，例如 `Skyrim.esm`
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let (name, ext) = file_name
            .rsplit_once('.')
            .ok_or_else(|| EspError::InvalidModKey(format!("缺少扩展名: {}", file_name)))?;
        let mod_type = ModType::from_extension(ext)
            .ok_or_else(|| EspError::InvalidModKey(format!("不支持的扩展名: {}", file_name)))?;
        Self::new(name, mod_type)
    }

    /// 由文件路径构造（只取文件名部分）
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EspError::InvalidModKey(format!("无法获取文件名: {:?}", path)))?;
        Self::from_file_name(file_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mod_type(&self) -> ModType {
        self.mod_type
    }

    /// 还原为文件名
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.mod_type.extension())
    }
}

impl PartialEq for ModKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded && self.mod_type == other.mod_type
    }
}

impl Eq for ModKey {}

impl Hash for ModKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
        self.mod_type.hash(state);
    }
}

impl Ord for ModKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded
            .cmp(&other.folded)
            .then(self.mod_type.cmp(&other.mod_type))
    }
}

impl PartialOrd for ModKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ModKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.mod_type.extension())
    }
}

impl FromStr for ModKey {
    type Err = EspError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_file_name(s)
    }
}

/// 与加载顺序无关的记录标识：(所属插件, 24 位本地 ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormKey {
    mod_key: ModKey,
    id: u32,
}

impl FormKey {
    pub fn new(mod_key: ModKey, id: u32) -> Result<Self> {
        if id > MAX_LOCAL_ID {
            return Err(EspError::InvalidFormKey(format!(
                "本地 ID 0x{:X} 超出 24 位范围 ({})",
                id, mod_key
            )));
        }
        Ok(FormKey { mod_key, id })
    }

    /// 直接截取低 24 位构造
    pub(crate) fn masked(mod_key: ModKey, id: u32) -> Self {
        FormKey {
            mod_key,
            id: id & MAX_LOCAL_ID,
        }
    }

    pub fn mod_key(&self) -> &ModKey {
        &self.mod_key
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for FormKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}:{}", self.id, self.mod_key)
    }
}

impl FromStr for FormKey {
    type Err = EspError;

    /// 解析 `02C66F:Skyrim.esm` 形式
    fn from_str(s: &str) -> Result<Self> {
        let (id, file_name) = s
            .split_once(':')
            .ok_or_else(|| EspError::InvalidFormKey(format!("缺少 ':' 分隔符: {}", s)))?;
        let id = u32::from_str_radix(id.trim(), 16)
            .map_err(|e| EspError::InvalidFormKey(format!("{}: {}", s, e)))?;
        Self::new(ModKey::from_file_name(file_name.trim())?, id)
    }
}
