//! Component Resolver (Feature 3)
//!
//! Builds components: merges metadata from the five declaration levels,
//! derives the display name, binds a scope locator and links the node into
//! its parent. Creation never touches the driver.
//!
//! Lifecycle: `Created` → `Initializing` → `Initialized`. Initializing a
//! component fires `Init` for it and its declared children once, then
//! `InitCompleted`. Clean-up fires `DeInit` for the subtree, clears its
//! caches and removes it from the tree.

use crate::component::{ComponentBlueprint, ComponentId, ComponentNode, Lifecycle};
use crate::context::Session;
use crate::driver::ElementHandle;
use crate::list::{ListId, ListItemScopeLocator};
use crate::locator::{
    ElementDefinition, FindAttribute, FindSettings, ScopeSource, Selector, Visibility,
};
use crate::metadata::{Attribute, AttributeLevel, Metadata, MulticastAttribute, NameAttribute};
use crate::result::{PomarError, PomarResult};
use crate::scope::{
    DefinedScopeLocator, DynamicScopeLocator, FindInShadowRoot, LocateFn, ScopeLocator,
    ShadowHostScopeLocator, StrategyScopeLocator,
};
use crate::trigger::TriggerEvents;
use std::any::TypeId;
use std::rc::Rc;

/// How the new component's scope is located
#[derive(Clone)]
pub enum ScopeSpec {
    /// From its find attribute, relative to the parent
    Strategy,
    /// A fixed selector, relative to the parent
    Selector {
        /// Selector
        selector: Selector,
        /// Visibility filter
        visibility: Visibility,
        /// Search context
        scope_source: ScopeSource,
    },
    /// A known element
    Defined(Option<ElementHandle>),
    /// A locating function
    Dynamic(Rc<LocateFn>),
    /// The n-th element of the owning list
    ListItem(usize),
    /// Page object root
    Page,
}

impl std::fmt::Debug for ScopeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strategy => f.write_str("Strategy"),
            Self::Selector { selector, .. } => f.debug_tuple("Selector").field(selector).finish(),
            Self::Defined(element) => f.debug_tuple("Defined").field(element).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic"),
            Self::ListItem(index) => f.debug_tuple("ListItem").field(index).finish(),
            Self::Page => f.write_str("Page"),
        }
    }
}

/// Everything needed to create a component
#[derive(Debug, Clone)]
pub struct ComponentRequest {
    /// Kind
    pub blueprint: ComponentBlueprint,
    /// Parent; `None` for a page
    pub parent: Option<ComponentId>,
    /// Declared property name
    pub property_name: String,
    /// Property-level attributes
    pub extra: Vec<Attribute>,
    /// Scope location
    pub scope: ScopeSpec,
    /// Owning list
    pub list: Option<ListId>,
    /// Position within the list
    pub index: Option<usize>,
    /// Display name when no name attribute is declared
    pub display_name: Option<String>,
    /// Fire `Init` right away when the parent is initialized
    pub initialize: bool,
    /// Keep out of the parent's child list
    pub detached: bool,
}

impl ComponentRequest {
    /// Request for a child found by its find strategy
    #[must_use]
    pub fn new(blueprint: ComponentBlueprint, parent: Option<ComponentId>, property_name: &str) -> Self {
        Self {
            blueprint,
            parent,
            property_name: property_name.to_string(),
            extra: Vec::new(),
            scope: ScopeSpec::Strategy,
            list: None,
            index: None,
            display_name: None,
            initialize: true,
            detached: false,
        }
    }

    /// Add property-level attributes
    #[must_use]
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.extra.extend(attributes);
        self
    }

    /// Set the scope
    #[must_use]
    pub fn with_scope(mut self, scope: ScopeSpec) -> Self {
        self.scope = scope;
        self
    }

    /// Set the display name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// `"signInButton"` → `"Sign In Button"`
#[must_use]
pub fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `1` → `"1st"`, `12` → `"12th"`, `22` → `"22nd"`
#[must_use]
pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn strip_ending<'a>(name: &'a str, endings: &[&str]) -> &'a str {
    for ending in endings {
        let Some(cut) = name.len().checked_sub(ending.len()).filter(|cut| *cut > 0) else {
            continue;
        };
        if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(ending) {
            return &name[..cut];
        }
    }
    name
}

fn add_multicast(
    metadata: &mut Metadata,
    level: AttributeLevel,
    attributes: &[MulticastAttribute],
    type_name: &str,
    property_name: &str,
) {
    for multicast in attributes {
        if multicast.targets.applies_to(type_name, property_name) {
            metadata.add(level, multicast.attribute.clone());
        }
    }
}

impl Session {
    pub(crate) fn derive_metadata(&self, request: &ComponentRequest) -> PomarResult<Metadata> {
        let type_name = request.blueprint.type_name;
        let property = request.property_name.as_str();
        let mut metadata = Metadata::new();
        add_multicast(&mut metadata, AttributeLevel::Global, &self.global_attributes, type_name, property);
        add_multicast(&mut metadata, AttributeLevel::Suite, &self.suite_attributes, type_name, property);
        metadata.add_all(AttributeLevel::Component, request.blueprint.attributes.iter().cloned());
        if let Some(parent) = request.parent {
            let parent = self.tree.node(parent)?;
            add_multicast(&mut metadata, AttributeLevel::Parent, &parent.child_attributes, type_name, property);
        }
        if let Some(list) = request.list {
            metadata.add_all(AttributeLevel::Parent, self.tree.list(list)?.item_attributes.iter().cloned());
        }
        metadata.add_all(AttributeLevel::Property, request.extra.iter().cloned());
        Ok(metadata)
    }

    fn derive_name(request: &ComponentRequest, metadata: &Metadata) -> String {
        if let Some(NameAttribute(name)) = metadata.get::<NameAttribute>() {
            return name.clone();
        }
        if let Some(name) = &request.display_name {
            return name.clone();
        }
        humanize(strip_ending(&request.property_name, request.blueprint.ignore_name_endings))
    }

    fn strategy_locator(
        &self,
        id: ComponentId,
        request: &ComponentRequest,
        metadata: &Metadata,
        name: &str,
    ) -> Rc<dyn ScopeLocator> {
        let find = metadata
            .get::<FindAttribute>()
            .cloned()
            .unwrap_or_else(|| (request.blueprint.default_find)(&request.property_name, name));
        let settings_visibility = metadata.get::<FindSettings>().and_then(|s| s.visibility);
        let visibility = find
            .visibility
            .or(settings_visibility)
            .unwrap_or(self.config().default_visibility);
        let selector = find.to_selector(&request.blueprint.definition);

        match metadata.get::<FindInShadowRoot>() {
            Some(shadow) => {
                let host = StrategyScopeLocator {
                    component: id,
                    parent: request.parent,
                    selector: shadow.host.to_selector(&ElementDefinition::any()),
                    visibility: shadow.host.visibility.unwrap_or(Visibility::Any),
                    scope_source: shadow.host.scope_source.unwrap_or_default(),
                };
                Rc::new(ShadowHostScopeLocator {
                    component: id,
                    host: Rc::new(host),
                    selector,
                    visibility,
                })
            }
            None => Rc::new(StrategyScopeLocator {
                component: id,
                parent: request.parent,
                selector,
                visibility,
                scope_source: find.scope_source.unwrap_or(ScopeSource::Parent),
            }),
        }
    }

    /// Create a component and link it into its parent.
    ///
    /// No element is looked up. When the parent is already initialized and
    /// the request asks for it, the new component is initialized too.
    pub fn create_component(&mut self, request: ComponentRequest) -> PomarResult<ComponentId> {
        let metadata = self.derive_metadata(&request)?;
        let name = Self::derive_name(&request, &metadata);
        let id = self.tree.next_id();

        let locator: Rc<dyn ScopeLocator> = match &request.scope {
            ScopeSpec::Strategy => self.strategy_locator(id, &request, &metadata, &name),
            ScopeSpec::Selector {
                selector,
                visibility,
                scope_source,
            } => Rc::new(StrategyScopeLocator {
                component: id,
                parent: request.parent,
                selector: selector.clone(),
                visibility: *visibility,
                scope_source: *scope_source,
            }),
            ScopeSpec::Defined(element) => Rc::new(DefinedScopeLocator::new(element.clone())),
            ScopeSpec::Dynamic(locate) => Rc::new(DynamicScopeLocator::from_rc(id, Rc::clone(locate))),
            ScopeSpec::ListItem(index) => {
                let list = request.list.ok_or_else(|| {
                    PomarError::invalid_state(format!(
                        "list item {} requested without a list",
                        request.property_name
                    ))
                })?;
                Rc::new(ListItemScopeLocator::new(id, list, *index))
            }
            ScopeSpec::Page => Rc::new(DefinedScopeLocator::new(None)),
        };

        let (owner, parent_state) = match request.parent {
            Some(parent) => {
                let parent = self.tree.node(parent)?;
                (parent.owner, Some(parent.lifecycle))
            }
            None => (id, None),
        };
        let mut node = ComponentNode::new(
            name,
            request.property_name.clone(),
            &request.blueprint,
            owner,
            request.parent,
            metadata,
            locator,
        );
        node.list = request.list;
        node.index = request.index;
        node.detached = request.detached;
        let id = self.tree.insert(node)?;
        tracing::trace!(%id, full_name = %self.full_name(id)?, "component created");

        if request.initialize && parent_state == Some(Lifecycle::Initialized) {
            self.init_component(id)?;
        }
        Ok(id)
    }

    /// Fire `Init` for the component and its declared children, once
    pub fn init_component(&mut self, component: ComponentId) -> PomarResult<()> {
        if self.tree.node(component)?.lifecycle != Lifecycle::Created {
            return Ok(());
        }
        let subtree = self.tree.subtree(component)?;
        for id in &subtree {
            let node = self.tree.node_mut(*id)?;
            if node.lifecycle == Lifecycle::Created {
                node.lifecycle = Lifecycle::Initializing;
            }
        }

        let result = self.execute_triggers(component, TriggerEvents::INIT);

        for id in &subtree {
            if let Ok(node) = self.tree.node_mut(*id) {
                if node.lifecycle == Lifecycle::Initializing {
                    node.lifecycle = Lifecycle::Initialized;
                }
            }
        }
        result?;
        self.execute_triggers(component, TriggerEvents::INIT_COMPLETED)
    }

    /// Fire `DeInit` for the subtree, clear its caches and remove it
    pub fn clean_up_component(&mut self, component: ComponentId) -> PomarResult<()> {
        let full_name = self.full_name(component)?;
        let de_init = self.execute_triggers(component, TriggerEvents::DE_INIT);
        let cleared = self.clear_cache(component);
        self.tree.remove_subtree(component)?;
        tracing::debug!(component = %full_name, "component cleaned up");
        de_init?;
        cleared
    }

    /// Hierarchical name of a component
    pub fn full_name(&self, component: ComponentId) -> PomarResult<String> {
        self.tree.full_name(component)
    }

    /// Display name of a component
    pub fn component_name(&self, component: ComponentId) -> PomarResult<String> {
        Ok(self.tree.node(component)?.name.clone())
    }

    /// Parent of a component
    pub fn parent_of(&self, component: ComponentId) -> PomarResult<Option<ComponentId>> {
        Ok(self.tree.node(component)?.parent)
    }

    /// Ancestors, nearest first
    pub fn ancestors(&self, component: ComponentId) -> PomarResult<Vec<ComponentId>> {
        self.tree.ancestors(component)
    }

    /// Children in declaration order
    pub fn children_of(&self, component: ComponentId) -> PomarResult<Vec<ComponentId>> {
        Ok(self.tree.node(component)?.children.clone())
    }

    /// Nearest ancestor whose kind is `kind`
    pub fn ancestor_of_kind(&self, component: ComponentId, kind: TypeId) -> PomarResult<Option<ComponentId>> {
        for ancestor in self.tree.ancestors(component)? {
            if self.tree.node(ancestor)?.kind_id == kind {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    /// The component itself or its nearest ancestor of `kind`
    pub fn ancestor_or_self_of_kind(&self, component: ComponentId, kind: TypeId) -> PomarResult<Option<ComponentId>> {
        if self.tree.node(component)?.kind_id == kind {
            return Ok(Some(component));
        }
        self.ancestor_of_kind(component, kind)
    }

    /// Add an instance-level attribute
    pub fn push_attribute(&mut self, component: ComponentId, attribute: impl Into<Attribute>) -> PomarResult<()> {
        self.tree.node_mut(component)?.metadata.push(attribute);
        Ok(())
    }

    /// Merged metadata of a component
    pub fn metadata(&self, component: ComponentId) -> PomarResult<&Metadata> {
        Ok(&self.tree.node(component)?.metadata)
    }

    /// Number of live components
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod naming_tests {
        use super::*;

        #[test]
        fn test_humanize() {
            assert_eq!(humanize("signInButton"), "Sign In Button");
            assert_eq!(humanize("agree"), "Agree");
            assert_eq!(humanize("first_name"), "First Name");
            assert_eq!(humanize("option2Value"), "Option2 Value");
            assert_eq!(humanize(""), "");
        }

        #[test]
        fn test_strip_ending() {
            assert_eq!(strip_ending("agreeCheckbox", &["CheckBox"]), "agree");
            assert_eq!(strip_ending("checkbox", &["Checkbox"]), "checkbox");
            assert_eq!(strip_ending("save", &["Button"]), "save");
        }

        #[test]
        fn test_strip_ending_with_multibyte_names() {
            // KELVIN SIGN lowercases to a one-byte 'k'
            assert_eq!(strip_ending("a\u{212A}", &["K"]), "a\u{212A}");
            assert_eq!(strip_ending("lin\u{212A}", &["Link"]), "lin\u{212A}");
            assert_eq!(strip_ending("caféLink", &["link"]), "café");
        }

        #[test]
        fn test_ordinal() {
            assert_eq!(ordinal(1), "1st");
            assert_eq!(ordinal(2), "2nd");
            assert_eq!(ordinal(3), "3rd");
            assert_eq!(ordinal(4), "4th");
            assert_eq!(ordinal(11), "11th");
            assert_eq!(ordinal(12), "12th");
            assert_eq!(ordinal(22), "22nd");
            assert_eq!(ordinal(101), "101st");
        }
    }
}
