//! Cache Controller (Feature 5)
//!
//! A component caches nothing unless a [`CacheAttribute`] asks for it. The
//! attribute is read from the component's own metadata (targets `SelfOnly` or
//! `SelfAndChildren`) and from the parent's or owning list's metadata (targets
//! `Children` or `SelfAndChildren`).
//!
//! - **Scope** mode keeps the found element handle until cleared or stale.
//! - **Value** mode additionally remembers read values, so pure reads skip
//!   the element lookup entirely.
//!
//! [`Session::clear_cache`] clears the component's own caches, then its
//! registered parts (attribute and CSS providers, lists), then every child.
//! [`Session::clear_cache_of_descendants`] does the same without touching
//! the scope and value caches.

use crate::component::ComponentId;
use crate::context::Session;
use crate::result::PomarResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// What is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Element handle only
    #[default]
    Scope,
    /// Element handle and read values
    Value,
}

/// Which components a cache attribute applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheTarget {
    /// The declaring component
    #[default]
    SelfOnly,
    /// Its children and list items
    Children,
    /// Both
    SelfAndChildren,
}

impl CacheTarget {
    pub(crate) const fn includes_self(self) -> bool {
        matches!(self, Self::SelfOnly | Self::SelfAndChildren)
    }

    pub(crate) const fn includes_children(self) -> bool {
        matches!(self, Self::Children | Self::SelfAndChildren)
    }
}

/// Enables caching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CacheAttribute {
    /// What is cached
    pub mode: CacheMode,
    /// Who is affected
    pub target: CacheTarget,
}

impl CacheAttribute {
    /// Cache the scope element of the declaring component
    #[must_use]
    pub const fn scope() -> Self {
        Self {
            mode: CacheMode::Scope,
            target: CacheTarget::SelfOnly,
        }
    }

    /// Cache scope element and values of the declaring component
    #[must_use]
    pub const fn value() -> Self {
        Self {
            mode: CacheMode::Value,
            target: CacheTarget::SelfOnly,
        }
    }

    /// Set the target
    #[must_use]
    pub const fn with_target(mut self, target: CacheTarget) -> Self {
        self.target = target;
        self
    }
}

impl Session {
    fn effective_cache(&self, component: ComponentId) -> PomarResult<Option<CacheAttribute>> {
        let node = self.tree.node(component)?;
        if let Some(own) = node.metadata.get::<CacheAttribute>() {
            if own.target.includes_self() {
                return Ok(Some(*own));
            }
        }
        let inherited = match (node.list, node.parent) {
            (Some(list), _) => self.tree.list(list)?.metadata.get::<CacheAttribute>().copied(),
            (None, Some(parent)) => self.tree.node(parent)?.metadata.get::<CacheAttribute>().copied(),
            (None, None) => None,
        };
        Ok(inherited.filter(|cache| cache.target.includes_children()))
    }

    /// Whether the scope element of `component` is cached
    pub fn uses_scope_cache(&self, component: ComponentId) -> PomarResult<bool> {
        Ok(self.effective_cache(component)?.is_some())
    }

    /// Whether read values of `component` are cached
    pub fn uses_value_cache(&self, component: ComponentId) -> PomarResult<bool> {
        Ok(self
            .effective_cache(component)?
            .is_some_and(|cache| cache.mode == CacheMode::Value))
    }

    /// Forget the cached scope element
    pub fn clear_scope_cache(&mut self, component: ComponentId) -> PomarResult<()> {
        self.tree.node_mut(component)?.cached_scope = None;
        Ok(())
    }

    /// Forget cached values, including attribute and CSS providers
    pub fn clear_value_cache(&mut self, component: ComponentId) -> PomarResult<()> {
        let node = self.tree.node_mut(component)?;
        node.value_cache.clear();
        node.parts.clear();
        Ok(())
    }

    /// Clear own caches, then those of every descendant
    pub fn clear_cache(&mut self, component: ComponentId) -> PomarResult<()> {
        tracing::trace!(%component, "clear cache");
        self.clear_scope_cache(component)?;
        self.clear_value_cache(component)?;
        self.clear_cache_of_descendants(component)
    }

    /// Clear registered parts and children, keeping the scope and value caches
    pub fn clear_cache_of_descendants(&mut self, component: ComponentId) -> PomarResult<()> {
        let node = self.tree.node_mut(component)?;
        node.parts.clear();
        let lists = node.parts.lists.clone();
        let children = node.children.clone();

        for list in lists {
            self.clear_list_cache(list)?;
        }
        for child in children {
            self.clear_cache(child)?;
        }
        Ok(())
    }

    /// Value read through the value cache when enabled
    pub fn cached_value<T, F>(&mut self, component: ComponentId, key: &str, read: F) -> PomarResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Self) -> PomarResult<T>,
    {
        let caching = self.uses_value_cache(component)?;
        if caching {
            if let Some(cached) = self.tree.node(component)?.value_cache.get(key) {
                return Ok(serde_json::from_value(cached.clone())?);
            }
        }
        let value = read(self)?;
        if caching {
            let stored = serde_json::to_value(&value)?;
            let _ = self
                .tree
                .node_mut(component)?
                .value_cache
                .insert(key.to_string(), stored);
        }
        Ok(value)
    }
}
