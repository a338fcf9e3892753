//! Controls
//!
//! [`Control<K>`] is a typed, copyable handle of a component in the session
//! tree. `K` is a [`ComponentKind`] that fixes the element definition, the
//! type name used in full names, and for value kinds how the value is read
//! and written.
//!
//! Every access runs through the session: triggers fire around it, the
//! scope element is resolved lazily, and caches are consulted first.
//!
//! ## Toyota Way Application:
//! - **Poka-Yoke**: Only [`EditableKind`] controls expose `set`
//! - **Jidoka**: Failures carry the control's full name

use crate::behavior::ContentSource;
use crate::component::{ComponentBlueprint, ComponentId, ComponentKind};
use crate::context::Session;
use crate::driver::ScriptArg;
use crate::list::ControlList;
use crate::locator::{ElementDefinition, ElementPattern, FindAttribute, SearchOptions};
use crate::metadata::Attribute;
use crate::resolver::ComponentRequest;
use crate::result::PomarResult;
use crate::trigger::TriggerEvents;
use crate::wait::{Until, WaitOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

/// Typed handle of a component
pub struct Control<K> {
    id: ComponentId,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Control<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Control<K> {}

impl<K> PartialEq for Control<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K> Eq for Control<K> {}

impl<K> fmt::Debug for Control<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Control").field(&self.id).finish()
    }
}

impl<K> Control<K> {
    pub(crate) const fn from_id(id: ComponentId) -> Self {
        Self {
            id,
            kind: PhantomData,
        }
    }

    /// Component id
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }
}

impl<K: ComponentKind> Control<K> {
    /// Hierarchical name
    pub fn full_name(&self, session: &Session) -> PomarResult<String> {
        session.full_name(self.id)
    }

    /// Display name
    pub fn name(&self, session: &Session) -> PomarResult<String> {
        session.component_name(self.id)
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Whether the element exists now; never fails for absence
    pub fn is_present(&self, session: &mut Session) -> PomarResult<bool> {
        session.exists(self.id, &SearchOptions::safely_at_once())
    }

    /// Whether the element exists and is displayed
    pub fn is_visible(&self, session: &mut Session) -> PomarResult<bool> {
        Ok(session
            .with_scope_safely(self.id, |session, element| {
                Ok(session.driver_mut().is_displayed(element)?)
            })?
            .unwrap_or(false))
    }

    /// Whether the element's box lies inside the viewport
    pub fn is_visible_in_viewport(&self, session: &mut Session) -> PomarResult<bool> {
        session.is_in_viewport(self.id)
    }

    /// Whether the element is enabled
    pub fn is_enabled(&self, session: &mut Session) -> PomarResult<bool> {
        session.with_scope(self.id, |session, element| {
            Ok(session.driver_mut().is_enabled(element)?)
        })
    }

    /// Content from the declared [`ContentSource`]
    pub fn content(&self, session: &mut Session) -> PomarResult<String> {
        let id = self.id;
        session.cached_value(id, "content", |session| {
            let source = session.content_source(id)?;
            session.read_content(id, source)
        })
    }

    /// Content from an explicit source, bypassing the value cache
    pub fn content_from(&self, session: &mut Session, source: ContentSource) -> PomarResult<String> {
        session.read_content(self.id, source)
    }

    /// Attribute value; `None` when the attribute is absent
    pub fn attribute(&self, session: &mut Session, name: &str) -> PomarResult<Option<String>> {
        let caching = session.uses_value_cache(self.id)?;
        if caching {
            if let Some(value) = session.tree.node_mut(self.id)?.parts.attributes().get(name) {
                return Ok(value.clone());
            }
        }
        let value = session.with_scope(self.id, |session, element| {
            Ok(session.driver_mut().attribute(element, name)?)
        })?;
        if caching {
            let _ = session
                .tree
                .node_mut(self.id)?
                .parts
                .attributes()
                .insert(name.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Boolean attribute such as `disabled` or `readonly`
    pub fn has_attribute(&self, session: &mut Session, name: &str) -> PomarResult<bool> {
        Ok(self
            .attribute(session, name)?
            .is_some_and(|value| !value.eq_ignore_ascii_case("false")))
    }

    /// Classes from the `class` attribute
    pub fn classes(&self, session: &mut Session) -> PomarResult<Vec<String>> {
        Ok(self
            .attribute(session, "class")?
            .map(|classes| classes.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Computed CSS value
    pub fn css(&self, session: &mut Session, property: &str) -> PomarResult<String> {
        let caching = session.uses_value_cache(self.id)?;
        if caching {
            if let Some(value) = session.tree.node_mut(self.id)?.parts.css().get(property) {
                return Ok(value.clone());
            }
        }
        let value = session.with_scope(self.id, |session, element| {
            Ok(session.driver_mut().css_value(element, property)?)
        })?;
        if caching {
            let _ = session
                .tree
                .node_mut(self.id)?
                .parts
                .css()
                .insert(property.to_string(), value.clone());
        }
        Ok(value)
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    fn action<F>(&self, session: &mut Session, before: TriggerEvents, after: TriggerEvents, act: F) -> PomarResult<()>
    where
        F: FnOnce(&mut Session, ComponentId) -> PomarResult<()>,
    {
        session.execute_triggers(self.id, before)?;
        act(session, self.id)?;
        session.execute_triggers(self.id, after)
    }

    /// Click
    pub fn click(&self, session: &mut Session) -> PomarResult<()> {
        self.action(session, TriggerEvents::BEFORE_CLICK, TriggerEvents::AFTER_CLICK, |s, id| {
            s.execute_click(id)
        })
    }

    /// Double click
    pub fn double_click(&self, session: &mut Session) -> PomarResult<()> {
        self.action(session, TriggerEvents::BEFORE_CLICK, TriggerEvents::AFTER_CLICK, |s, id| {
            s.execute_double_click(id)
        })
    }

    /// Hover
    pub fn hover(&self, session: &mut Session) -> PomarResult<()> {
        self.action(session, TriggerEvents::BEFORE_HOVER, TriggerEvents::AFTER_HOVER, |s, id| {
            s.execute_hover(id)
        })
    }

    /// Focus
    pub fn focus(&self, session: &mut Session) -> PomarResult<()> {
        self.action(session, TriggerEvents::BEFORE_FOCUS, TriggerEvents::AFTER_FOCUS, |s, id| {
            s.execute_focus(id)
        })
    }

    /// Blur
    pub fn blur(&self, session: &mut Session) -> PomarResult<()> {
        self.action(session, TriggerEvents::BEFORE_BLUR, TriggerEvents::AFTER_BLUR, |s, id| {
            s.execute_blur(id)
        })
    }

    /// Scroll into view
    pub fn scroll_into_view(&self, session: &mut Session) -> PomarResult<()> {
        session.scroll_into_view(self.id)
    }

    /// Run a script with the element as `arguments[0]`, followed by `args`
    pub fn execute_script(
        &self,
        session: &mut Session,
        script: &str,
        args: &[serde_json::Value],
    ) -> PomarResult<serde_json::Value> {
        session.with_scope(self.id, |session, element| {
            let mut all = Vec::with_capacity(args.len() + 1);
            all.push(ScriptArg::Element(element.clone()));
            all.extend(args.iter().cloned().map(ScriptArg::Value));
            Ok(session.driver_mut().execute_script(script, &all)?)
        })
    }

    // =========================================================================
    // WAITING
    // =========================================================================

    /// Wait for a state
    pub fn wait(&self, session: &mut Session, until: Until, options: WaitOptions) -> PomarResult<bool> {
        session.wait(self.id, until, options)
    }

    /// Whether the element exists under `options`
    pub fn exists(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool> {
        session.exists(self.id, options)
    }

    /// Whether the element is missing under `options`
    pub fn missing(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool> {
        session.missing(self.id, options)
    }

    // =========================================================================
    // TREE
    // =========================================================================

    /// Clear own and descendant caches
    pub fn clear_cache(&self, session: &mut Session) -> PomarResult<()> {
        session.clear_cache(self.id)
    }

    /// Add an instance-level attribute
    pub fn push(&self, session: &mut Session, attribute: impl Into<Attribute>) -> PomarResult<()> {
        session.push_attribute(self.id, attribute)
    }

    /// Declare a child control
    pub fn find<C: ComponentKind>(
        &self,
        session: &mut Session,
        property_name: &str,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> PomarResult<Control<C>> {
        let request = ComponentRequest::new(ComponentBlueprint::of::<C>(), Some(self.id), property_name)
            .with_attributes(attributes);
        session.create_component(request).map(Control::from_id)
    }

    /// Declare a list of child controls
    pub fn find_all<C: ComponentKind>(
        &self,
        session: &mut Session,
        property_name: &str,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> PomarResult<ControlList<C>> {
        session
            .create_list(
                self.id,
                property_name,
                ComponentBlueprint::of::<C>(),
                attributes.into_iter().collect(),
            )
            .map(ControlList::from_id)
    }

    /// Parent component
    pub fn parent(&self, session: &Session) -> PomarResult<Option<ComponentId>> {
        session.parent_of(self.id)
    }

    /// Nearest ancestor of kind `A`
    pub fn get_ancestor<A: ComponentKind>(&self, session: &Session) -> PomarResult<Option<Control<A>>> {
        Ok(session
            .ancestor_of_kind(self.id, TypeId::of::<A>())?
            .map(Control::from_id))
    }

    /// This control or its nearest ancestor of kind `A`
    pub fn get_ancestor_or_self<A: ComponentKind>(&self, session: &Session) -> PomarResult<Option<Control<A>>> {
        Ok(session
            .ancestor_or_self_of_kind(self.id, TypeId::of::<A>())?
            .map(Control::from_id))
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// Kind whose control has a typed value
pub trait FieldKind: ComponentKind {
    /// Value type
    type Value: Serialize + DeserializeOwned + PartialEq + fmt::Debug;

    /// Read the value from the page
    fn read(session: &mut Session, component: ComponentId) -> PomarResult<Self::Value>;
}

/// Kind whose value can be set
pub trait EditableKind: FieldKind {
    /// Write the value to the page
    fn write(session: &mut Session, component: ComponentId, value: &Self::Value) -> PomarResult<()>;
}

impl<K: FieldKind> Control<K> {
    /// Value, between `BeforeGet` and `AfterGet`
    pub fn get(&self, session: &mut Session) -> PomarResult<K::Value> {
        let id = self.id;
        session.execute_triggers(id, TriggerEvents::BEFORE_GET)?;
        let value = session.cached_value(id, "value", |session| K::read(session, id))?;
        session.execute_triggers(id, TriggerEvents::AFTER_GET)?;
        Ok(value)
    }
}

impl<K: EditableKind> Control<K> {
    /// Set the value, between `BeforeSet` and `AfterSet`
    pub fn set(&self, session: &mut Session, value: &K::Value) -> PomarResult<()> {
        let id = self.id;
        session.execute_triggers(id, TriggerEvents::BEFORE_SET)?;
        K::write(session, id, value)?;
        session.clear_value_cache(id)?;
        session.execute_triggers(id, TriggerEvents::AFTER_SET)
    }
}

// =============================================================================
// KINDS
// =============================================================================

/// Any element; groups children
#[derive(Debug, Clone, Copy)]
pub struct Container;

impl ComponentKind for Container {
    const TYPE_NAME: &'static str = "control";
}

/// `<button>`, `<input type="submit">` or `<input type="button">`
#[derive(Debug, Clone, Copy)]
pub struct Button;

impl ComponentKind for Button {
    const TYPE_NAME: &'static str = "button";

    fn definition() -> ElementDefinition {
        ElementDefinition::of(ElementPattern::tag("button"))
            .or(ElementPattern::tag("input").with_attribute("type", "submit"))
            .or(ElementPattern::tag("input").with_attribute("type", "button"))
    }

    fn ignore_name_endings() -> &'static [&'static str] {
        &["Button"]
    }

    fn default_find(_property_name: &str, display_name: &str) -> FindAttribute {
        FindAttribute::content(display_name)
    }
}

/// `<a>`
#[derive(Debug, Clone, Copy)]
pub struct Link;

impl ComponentKind for Link {
    const TYPE_NAME: &'static str = "link";

    fn definition() -> ElementDefinition {
        ElementDefinition::of(ElementPattern::tag("a"))
    }

    fn ignore_name_endings() -> &'static [&'static str] {
        &["Link"]
    }

    fn default_find(_property_name: &str, display_name: &str) -> FindAttribute {
        FindAttribute::content(display_name)
    }
}

/// Read-only text
#[derive(Debug, Clone, Copy)]
pub struct Text;

impl ComponentKind for Text {
    const TYPE_NAME: &'static str = "text";
}

impl FieldKind for Text {
    type Value = String;

    fn read(session: &mut Session, component: ComponentId) -> PomarResult<String> {
        let source = session.content_source(component)?;
        session.read_content(component, source)
    }
}

/// `<input type="text">`
#[derive(Debug, Clone, Copy)]
pub struct TextInput;

impl ComponentKind for TextInput {
    const TYPE_NAME: &'static str = "text input";

    fn definition() -> ElementDefinition {
        ElementDefinition::of(ElementPattern::tag("input").with_attribute("type", "text"))
    }

    fn ignore_name_endings() -> &'static [&'static str] {
        &["TextInput", "Input"]
    }
}

impl FieldKind for TextInput {
    type Value = String;

    fn read(session: &mut Session, component: ComponentId) -> PomarResult<String> {
        session.read_content(component, ContentSource::Value)
    }
}

impl EditableKind for TextInput {
    fn write(session: &mut Session, component: ComponentId, value: &String) -> PomarResult<()> {
        session.execute_set_text(component, value)
    }
}

/// `<input type="checkbox">`
#[derive(Debug, Clone, Copy)]
pub struct CheckBox;

impl ComponentKind for CheckBox {
    const TYPE_NAME: &'static str = "checkbox";

    fn definition() -> ElementDefinition {
        ElementDefinition::of(ElementPattern::tag("input").with_attribute("type", "checkbox"))
    }

    fn ignore_name_endings() -> &'static [&'static str] {
        &["Checkbox", "CheckBox", "Option"]
    }
}

impl FieldKind for CheckBox {
    type Value = bool;

    fn read(session: &mut Session, component: ComponentId) -> PomarResult<bool> {
        session.with_scope(component, |session, element| {
            Ok(session.driver_mut().is_selected(element)?)
        })
    }
}

impl EditableKind for CheckBox {
    fn write(session: &mut Session, component: ComponentId, value: &bool) -> PomarResult<()> {
        if Self::read(session, component)? != *value {
            session.execute_click(component)?;
        }
        Ok(())
    }
}

impl Control<CheckBox> {
    /// Select the checkbox unless already selected
    pub fn check(&self, session: &mut Session) -> PomarResult<()> {
        self.set(session, &true)
    }

    /// Clear the checkbox unless already clear
    pub fn uncheck(&self, session: &mut Session) -> PomarResult<()> {
        self.set(session, &false)
    }

    /// Whether the checkbox is selected
    pub fn is_checked(&self, session: &mut Session) -> PomarResult<bool> {
        self.get(session)
    }
}

impl Control<TextInput> {
    /// Type after the current value
    pub fn append(&self, session: &mut Session, text: &str) -> PomarResult<()> {
        let id = self.id;
        session.execute_triggers(id, TriggerEvents::BEFORE_SET)?;
        session.with_scope(id, |session, element| {
            Ok(session.driver_mut().send_keys(element, text)?)
        })?;
        session.clear_value_cache(id)?;
        session.execute_triggers(id, TriggerEvents::AFTER_SET)
    }
}
