//! Component Tree (Feature 3)
//!
//! Components live in an arena owned by the session and are addressed by a
//! copyable [`ComponentId`]. A parent owns its children through its child
//! list; the child keeps only the parent's id. Uncached list items are
//! detached: they point at their parent but are not in its child list.
//! Removed slots are reused under a new generation, so an id of a
//! cleaned-up component fails with an invalid-state error instead of
//! reaching another component.
//!
//! ## Toyota Way Application:
//! - **Poka-Yoke**: Parent link and child list are updated together
//! - **5S**: Clean-up removes the whole subtree and its lists

use crate::driver::ElementHandle;
use crate::list::{ListId, ListState};
use crate::locator::{ElementDefinition, FindAttribute};
use crate::metadata::{Attribute, Metadata, MulticastAttribute};
use crate::result::{PomarError, PomarResult};
use crate::scope::ScopeLocator;
use crate::trigger::TriggerEvents;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Identity of a component within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl ComponentId {
    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}.{}", self.index, self.generation)
        }
    }
}

// =============================================================================
// KINDS
// =============================================================================

/// Type-level declaration of a control kind.
///
/// Everything here is static: the element definition, the name endings
/// stripped when deriving a display name, and the attributes declared on
/// the type and for its children.
pub trait ComponentKind: 'static {
    /// Type name used in full names, e.g. `"checkbox"`
    const TYPE_NAME: &'static str;

    /// Element definition searched for
    fn definition() -> ElementDefinition {
        ElementDefinition::any()
    }

    /// Property name endings dropped from the display name
    fn ignore_name_endings() -> &'static [&'static str] {
        &[]
    }

    /// Attributes declared on the type
    fn attributes() -> Vec<Attribute> {
        Vec::new()
    }

    /// Attributes declared for children
    fn child_attributes() -> Vec<MulticastAttribute> {
        Vec::new()
    }

    /// Find strategy used when no [`FindAttribute`] is declared
    fn default_find(property_name: &str, _display_name: &str) -> FindAttribute {
        FindAttribute::id(property_name)
    }
}

/// Erased form of a kind, stored on nodes and lists
#[derive(Debug, Clone)]
pub struct ComponentBlueprint {
    /// Type name
    pub type_name: &'static str,
    /// Rust type of the kind
    pub kind_id: TypeId,
    /// Element definition
    pub definition: ElementDefinition,
    /// Ignored name endings
    pub ignore_name_endings: &'static [&'static str],
    /// Type-level attributes
    pub attributes: Vec<Attribute>,
    /// Attributes for children
    pub child_attributes: Vec<MulticastAttribute>,
    /// Default find strategy
    pub default_find: fn(&str, &str) -> FindAttribute,
    /// Whether this is a page object
    pub is_page: bool,
}

impl ComponentBlueprint {
    /// Blueprint of a control kind
    #[must_use]
    pub fn of<K: ComponentKind>() -> Self {
        Self {
            type_name: K::TYPE_NAME,
            kind_id: TypeId::of::<K>(),
            definition: K::definition(),
            ignore_name_endings: K::ignore_name_endings(),
            attributes: K::attributes(),
            child_attributes: K::child_attributes(),
            default_find: K::default_find,
            is_page: false,
        }
    }
}

// =============================================================================
// NODES
// =============================================================================

/// Initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, `Init` not fired yet
    Created,
    /// `Init` is being fired for the subtree
    Initializing,
    /// `Init` fired
    Initialized,
}

/// Cache-clearable parts registered on a component
#[derive(Debug, Clone, Default)]
pub struct ComponentParts {
    attributes: Option<HashMap<String, Option<String>>>,
    css: Option<HashMap<String, String>>,
    /// Lists declared under the component
    pub lists: Vec<ListId>,
}

impl ComponentParts {
    /// Attribute provider cache, registered on first use
    pub fn attributes(&mut self) -> &mut HashMap<String, Option<String>> {
        self.attributes.get_or_insert_with(HashMap::new)
    }

    /// CSS provider cache, registered on first use
    pub fn css(&mut self) -> &mut HashMap<String, String> {
        self.css.get_or_insert_with(HashMap::new)
    }

    /// Number of registered providers and lists
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.attributes.is_some()) + usize::from(self.css.is_some()) + self.lists.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop provider values; lists are cleared through the session
    pub fn clear(&mut self) {
        if let Some(values) = &mut self.attributes {
            values.clear();
        }
        if let Some(values) = &mut self.css {
            values.clear();
        }
    }
}

/// A component instance
#[derive(Debug)]
pub struct ComponentNode {
    /// Display name
    pub name: String,
    /// Declared property name
    pub property_name: String,
    /// Kind type name
    pub type_name: &'static str,
    /// Rust type of the kind
    pub kind_id: TypeId,
    /// Page object root
    pub is_page: bool,
    /// Position within a list
    pub index: Option<usize>,
    /// Root page object
    pub owner: ComponentId,
    /// Parent, `None` for a page
    pub parent: Option<ComponentId>,
    /// Owning list for list items
    pub list: Option<ListId>,
    /// Not linked into the parent's child list
    pub detached: bool,
    /// Children in declaration order
    pub children: Vec<ComponentId>,
    /// Merged attributes
    pub metadata: Metadata,
    /// Attributes declared for children
    pub child_attributes: Vec<MulticastAttribute>,
    /// How the scope element is found
    pub scope_locator: Rc<dyn ScopeLocator>,
    /// Cached scope element
    pub cached_scope: Option<ElementHandle>,
    /// Cached read values
    pub value_cache: HashMap<String, serde_json::Value>,
    /// Cache-clearable parts
    pub parts: ComponentParts,
    denied: Vec<TriggerEvents>,
    /// Initialization state
    pub lifecycle: Lifecycle,
}

impl ComponentNode {
    /// New node in the `Created` state
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        property_name: String,
        blueprint: &ComponentBlueprint,
        owner: ComponentId,
        parent: Option<ComponentId>,
        metadata: Metadata,
        scope_locator: Rc<dyn ScopeLocator>,
    ) -> Self {
        Self {
            name,
            property_name,
            type_name: blueprint.type_name,
            kind_id: blueprint.kind_id,
            is_page: blueprint.is_page,
            index: None,
            owner,
            parent,
            list: None,
            detached: false,
            children: Vec::new(),
            metadata,
            child_attributes: blueprint.child_attributes.clone(),
            scope_locator,
            cached_scope: None,
            value_cache: HashMap::new(),
            parts: ComponentParts::default(),
            denied: Vec::new(),
            lifecycle: Lifecycle::Created,
        }
    }

    /// `"Name" type`
    #[must_use]
    pub fn label(&self) -> String {
        format!("\"{}\" {}", self.name, self.type_name)
    }

    /// Whether `on` is currently suppressed
    #[must_use]
    pub fn is_denied(&self, on: TriggerEvents) -> bool {
        self.denied.iter().any(|denied| denied.contains(on))
    }

    /// Suppress events; returns the mark to restore
    pub fn push_denied(&mut self, events: TriggerEvents) -> usize {
        let mark = self.denied.len();
        self.denied.push(events);
        mark
    }

    /// Restore the denial stack to `mark`
    pub fn restore_denied(&mut self, mark: usize) {
        self.denied.truncate(mark);
    }

    /// Whether a tree-wide event fired on the parent reaches this node
    #[must_use]
    pub fn accepts_fan_out(&self, on: TriggerEvents) -> bool {
        if on == TriggerEvents::INIT {
            self.lifecycle == Lifecycle::Initializing
        } else {
            on == TriggerEvents::DE_INIT
        }
    }
}

// =============================================================================
// TREE
// =============================================================================

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<ComponentNode>,
}

/// Arena of components and lists
#[derive(Debug, Default)]
pub struct ComponentTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    lists: Vec<Option<ListState>>,
}

impl ComponentTree {
    /// Empty tree
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next inserted node receives
    #[must_use]
    pub fn next_id(&self) -> ComponentId {
        match self.free.last() {
            Some(&index) => ComponentId::new(index, self.slots[index].generation),
            None => ComponentId::new(self.slots.len(), 0),
        }
    }

    /// Insert a node, linking it into its parent's child list unless detached
    pub fn insert(&mut self, node: ComponentNode) -> PomarResult<ComponentId> {
        let id = self.next_id();
        if let Some(parent) = node.parent.filter(|_| !node.detached) {
            self.node_mut(parent)?.children.push(id);
        }
        if self.free.last() == Some(&id.index) {
            let _ = self.free.pop();
            self.slots[id.index].node = Some(node);
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
        }
        Ok(id)
    }

    /// Node by id
    pub fn node(&self, id: ComponentId) -> PomarResult<&ComponentNode> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or_else(|| PomarError::invalid_state(format!("component {id} was cleaned up")))
    }

    /// Mutable node by id
    pub fn node_mut(&mut self, id: ComponentId) -> PomarResult<&mut ComponentNode> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or_else(|| PomarError::invalid_state(format!("component {id} was cleaned up")))
    }

    /// Whether the id refers to a live node
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.node(id).is_ok()
    }

    /// Number of live nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of allocated slots, live or free
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether no node is alive
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `id` and all its descendants, parents first
    pub fn subtree(&self, id: ComponentId) -> PomarResult<Vec<ComponentId>> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current)?;
            result.push(current);
            stack.extend(node.children.iter().rev());
        }
        Ok(result)
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: ComponentId) -> PomarResult<Vec<ComponentId>> {
        let mut result = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            result.push(parent);
            current = self.node(parent)?.parent;
        }
        Ok(result)
    }

    /// Remove `id` with its subtree, the lists declared in it and their
    /// detached items
    pub fn remove_subtree(&mut self, id: ComponentId) -> PomarResult<()> {
        let mut removed = self.subtree(id)?;
        loop {
            let detached: Vec<ComponentId> = self
                .lists
                .iter()
                .flatten()
                .filter(|list| removed.contains(&list.parent))
                .flat_map(|list| list.transient.iter().copied())
                .filter(|item| self.contains(*item) && !removed.contains(item))
                .collect();
            if detached.is_empty() {
                break;
            }
            for item in detached {
                if !removed.contains(&item) {
                    removed.extend(self.subtree(item)?);
                }
            }
        }

        if let Some(parent) = self.node(id)?.parent {
            if let Ok(parent) = self.node_mut(parent) {
                parent.children.retain(|child| *child != id);
            }
        }
        for slot in &mut self.lists {
            let owned = slot.as_ref().is_some_and(|list| removed.contains(&list.parent));
            if owned {
                *slot = None;
            }
        }
        for list in self.lists.iter_mut().flatten() {
            list.items.retain(|_, item| !removed.contains(item));
            list.transient.retain(|item| !removed.contains(item));
        }
        for node in removed {
            let slot = &mut self.slots[node.index];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
        }
        Ok(())
    }

    /// Register a list
    pub fn insert_list(&mut self, list: ListState) -> ListId {
        let id = ListId(self.lists.len());
        self.lists.push(Some(list));
        id
    }

    /// List by id
    pub fn list(&self, id: ListId) -> PomarResult<&ListState> {
        self.lists
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| PomarError::invalid_state(format!("list {id} was cleaned up")))
    }

    /// Mutable list by id
    pub fn list_mut(&mut self, id: ListId) -> PomarResult<&mut ListState> {
        self.lists
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| PomarError::invalid_state(format!("list {id} was cleaned up")))
    }

    /// Hierarchical name, e.g. `"Sign In" page / "Agree" checkbox`
    pub fn full_name(&self, id: ComponentId) -> PomarResult<String> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id)?;
            segments.push(node.label());
            if let Some(list) = node.list {
                segments.push(self.list(list)?.label());
            }
            current = node.parent;
        }
        segments.reverse();
        Ok(segments.join(" / "))
    }
}
