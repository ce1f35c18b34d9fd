use std::collections::HashMap;

/// 单个字段的复制设置
#[derive(Debug, Clone, PartialEq)]
pub struct MaskItem {
    pub include: bool,
    /// 子结构的细分设置；为 None 时整个子结构按 `include` 处理
    pub sub: Option<TranslationMask>,
}

/// 字段复制掩码
///
/// 未单独设置的字段使用 `default` 的值。
///
/// ```
/// use esp_patcher::TranslationMask;
///
/// // 除名称、EditorID 和基础属性外全部复制
/// let mask = TranslationMask::new(true)
///     .with("name", false)
///     .with("editor_id", false)
///     .with("basic_stats", false);
/// assert!(mask.includes("description"));
/// assert!(!mask.includes("name"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationMask {
    default: bool,
    items: HashMap<String, MaskItem>,
}

impl TranslationMask {
    pub fn new(default: bool) -> Self {
        TranslationMask {
            default,
            items: HashMap::new(),
        }
    }

    /// 包含所有字段
    pub fn all() -> Self {
        Self::new(true)
    }

    pub fn with(mut self, field: &str, include: bool) -> Self {
        self.items.insert(
            field.to_string(),
            MaskItem {
                include,
                sub: None,
            },
        );
        self
    }

    /// 为子结构设置细分掩码
    pub fn with_block(mut self, field: &str, include: bool, sub: TranslationMask) -> Self {
        self.items.insert(
            field.to_string(),
            MaskItem {
                include,
                sub: Some(sub),
            },
        );
        self
    }

    pub fn default_include(&self) -> bool {
        self.default
    }

    pub fn includes(&self, field: &str) -> bool {
        self.items
            .get(field)
            .map(|item| item.include)
            .unwrap_or(self.default)
    }

    /// 子结构的细分掩码
    pub fn sub_mask(&self, field: &str) -> Option<&TranslationMask> {
        self.items.get(field).and_then(|item| item.sub.as_ref())
    }
}

impl Default for TranslationMask {
    fn default() -> Self {
        Self::all()
    }
}
