//! 跨插件的链接解析缓存
//!
//! 按加载顺序（低优先级在前）解析 FormKey，后加载的插件胜出。解析结果按 FormKey 缓存，
//! 构建后插件集合不再变化，需要感知新插件时重新构建。

use crate::form_key::FormKey;
use crate::overlay::{PluginOverlay, RecordView};
use crate::record::RecordType;
use crate::utils::{EspError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// FormKey → 胜出记录 的解析缓存
#[derive(Debug)]
pub struct LinkCache<'a> {
    /// 加载顺序，低优先级在前
    plugins: Vec<&'a PluginOverlay>,
    memo: RwLock<HashMap<FormKey, Option<RecordView<'a>>>>,
}

impl<'a> LinkCache<'a> {
    /// 按加载顺序构建缓存
    ///
    /// 所有插件必须使用同一个游戏版本。
    pub fn build(load_order: &[&'a PluginOverlay]) -> Result<Self> {
        if let Some(first) = load_order.first() {
            if let Some(other) = load_order.iter().find(|p| p.release() != first.release()) {
                return Err(EspError::UnsupportedVersion(format!(
                    "加载顺序中混用了不同的游戏版本: {} 为 {:?}，{} 为 {:?}",
                    first.mod_key(),
                    first.release(),
                    other.mod_key(),
                    other.release()
                )));
            }
        }

        tracing::debug!("构建链接缓存，{} 个插件", load_order.len());
        Ok(LinkCache {
            plugins: load_order.to_vec(),
            memo: RwLock::new(HashMap::new()),
        })
    }

    /// 加载顺序（低优先级在前）
    pub fn priority_order(&self) -> &[&'a PluginOverlay] {
        &self.plugins
    }

    /// 解析 FormKey；没有任何插件定义时返回 None
    pub fn resolve(&self, form_key: &FormKey) -> Option<RecordView<'a>> {
        {
            let memo = self.memo.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = memo.get(form_key) {
                return *cached;
            }
        }

        let resolved = self
            .plugins
            .iter()
            .rev()
            .find_map(|plugin| plugin.record(form_key));

        self.memo
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(form_key.clone(), resolved);
        resolved
    }

    /// 解析并检查记录类型
    pub fn resolve_as(&self, form_key: &FormKey, record_type: RecordType) -> Option<RecordView<'a>> {
        self.resolve(form_key)
            .filter(|view| view.record_type() == record_type)
    }

    /// 某一类型在整个加载顺序中的胜出版本，每个 FormKey 只出现一次，高优先级插件的记录在前
    pub fn winning_overrides(&self, record_type: RecordType) -> Vec<RecordView<'a>> {
        let mut seen = HashSet::new();
        let mut winners = Vec::new();
        for plugin in self.plugins.iter().rev() {
            for view in plugin.records(record_type) {
                if seen.insert(view.form_key()) {
                    winners.push(view);
                }
            }
        }
        winners
    }

    /// 已缓存的解析结果数量
    pub fn len(&self) -> usize {
        self.memo.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PluginOverlay {
    /// 只包含当前插件的链接缓存
    pub fn link_cache(&self) -> Result<LinkCache<'_>> {
        LinkCache::build(&[self])
    }
}

/// 带期望记录类型的链接
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormLink {
    pub form_key: FormKey,
    pub record_type: RecordType,
}

impl FormLink {
    pub fn new(form_key: FormKey, record_type: RecordType) -> Self {
        FormLink {
            form_key,
            record_type,
        }
    }

    /// 解析链接，目标不存在或类型不符时返回 None
    pub fn try_resolve<'a>(&self, cache: &LinkCache<'a>) -> Option<RecordView<'a>> {
        cache.resolve_as(&self.form_key, self.record_type)
    }
}
