//! Component List (Feature 7)
//!
//! A [`ControlList`] enumerates sibling controls found by one shared selector.
//! Items are created lazily and addressed by a discriminator: a zero-based
//! index, an XPath condition, or a named predicate.
//!
//! Caching follows the list's own [`CacheAttribute`]:
//!
//! - targeting the list itself keeps the matched element handles, so
//!   repeated `count` calls look up the collection once;
//! - targeting children remembers item components per discriminator, so a
//!   repeated access returns the same component without a new lookup.
//!
//! Items of a list that does not cache them are detached: they keep a link
//! to the list's parent but are not among its children, so cache clearing
//! and `DeInit` fan-out never walk them. [`ControlList::clear_cache`] forgets
//! remembered items and element handles, and removes detached items.

use crate::cache::CacheAttribute;
use crate::component::{ComponentBlueprint, ComponentId, ComponentKind};
use crate::context::Session;
use crate::controls::Control;
use crate::driver::ElementHandle;
use crate::locator::{
    Condition, ElementQuery, FindAttribute, FindSettings, ScopeSource, SearchOptions, Selector,
    Visibility,
};
use crate::metadata::{Attribute, Metadata, NameAttribute};
use crate::resolver::{humanize, ordinal, ComponentRequest, ScopeSpec};
use crate::result::{PomarError, PomarResult};
use crate::scope::{LocateFn, ScopeLocator, StrategyScopeLocator};
use crate::wait::{poll, Probe, RetryConfig};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Identity of a list within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(pub(crate) usize);

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discriminator of a list item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// Zero-based position
    Index(usize),
    /// XPath condition appended to the list selector
    XPath(String),
    /// Zero-based match of an XPath condition
    XPathMatch(String, usize),
    /// Named predicate
    Predicate(String),
}

/// Predicate over a materialized item
pub type ItemPredicate<K> = dyn Fn(&mut Session, Control<K>) -> PomarResult<bool>;

/// State of a declared list
#[derive(Debug)]
pub struct ListState {
    /// Component the list is declared in
    pub parent: ComponentId,
    /// Display name
    pub name: String,
    /// Item kind
    pub blueprint: ComponentBlueprint,
    /// Attributes declared on the list
    pub metadata: Metadata,
    /// Attributes handed down to every item
    pub item_attributes: Vec<Attribute>,
    /// Selector matching all items
    pub selector: Selector,
    /// Visibility filter of the items
    pub visibility: Visibility,
    /// Search context of the items
    pub scope_source: ScopeSource,
    /// Cached item elements
    pub cached_elements: Option<Vec<ElementHandle>>,
    /// Remembered item components
    pub items: HashMap<ItemKey, ComponentId>,
    /// Detached items created while item caching is off
    pub transient: Vec<ComponentId>,
}

impl ListState {
    /// `"Name" list`
    #[must_use]
    pub fn label(&self) -> String {
        format!("\"{}\" list", self.name)
    }

    fn cache(&self) -> Option<CacheAttribute> {
        self.metadata.get::<CacheAttribute>().copied()
    }

    fn caches_elements(&self) -> bool {
        self.cache()
            .is_some_and(|cache| cache.target.includes_self())
    }

    fn caches_items(&self) -> bool {
        self.cache()
            .is_some_and(|cache| cache.target.includes_children())
    }

    fn locator(&self) -> StrategyScopeLocator {
        StrategyScopeLocator {
            component: self.parent,
            parent: Some(self.parent),
            selector: self.selector.clone(),
            visibility: self.visibility,
            scope_source: self.scope_source,
        }
    }

    fn selector_with(&self, condition: &str) -> PomarResult<Selector> {
        match &self.selector {
            Selector::Query(query) => Ok(Selector::Query(
                query.clone().with_condition(Condition::XPath(condition.to_string())),
            )),
            Selector::XPath(xpath) => Ok(Selector::xpath(format!("{xpath}[{condition}]"))),
            Selector::Css(css) => Err(PomarError::configuration(format!(
                "{} uses CSS selector '{css}'; XPath conditions need an XPath or query selector",
                self.label()
            ))),
        }
    }
}

/// Selector of the n-th (zero-based) match of `selector`
fn nth_match(selector: &Selector, index: usize) -> Selector {
    match selector {
        Selector::Query(query) => Selector::Query(query.clone().with_index(index)),
        Selector::XPath(xpath) => Selector::xpath(format!("({xpath})[{}]", index + 1)),
        Selector::Css(css) => Selector::css(format!("{css}:nth-of-type({})", index + 1)),
    }
}

// =============================================================================
// LIST ITEM LOCATOR
// =============================================================================

/// The n-th element of a list, re-read from the list on every lookup
#[derive(Debug, Clone)]
pub struct ListItemScopeLocator {
    component: ComponentId,
    list: ListId,
    index: usize,
}

impl ListItemScopeLocator {
    /// Locator of item `index`
    #[must_use]
    pub const fn new(component: ComponentId, list: ListId, index: usize) -> Self {
        Self {
            component,
            list,
            index,
        }
    }

    fn probe(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<Option<ElementHandle>> {
        let elements = session.list_elements(self.list)?;
        let Some(element) = elements.get(self.index).cloned() else {
            return Ok(None);
        };
        match options.visibility {
            Some(visibility) if visibility != Visibility::Any => {
                let displayed = session.driver_mut().is_displayed(&element)?;
                Ok(visibility.accepts(displayed).then_some(element))
            }
            _ => Ok(Some(element)),
        }
    }

    fn poll_item(
        &self,
        session: &mut Session,
        options: &SearchOptions,
        want_found: bool,
    ) -> PomarResult<Option<Option<ElementHandle>>> {
        let mut first = true;
        let outcome = poll(&RetryConfig::from(options), || {
            if !first {
                session.tree.list_mut(self.list)?.cached_elements = None;
            }
            first = false;
            let found = self.probe(session, options)?;
            Ok(match (want_found, found) {
                (true, Some(element)) => Probe::Ready(Some(element)),
                (false, None) => Probe::Ready(None),
                (true, None) => Probe::Pending(format!("no item at index {}", self.index)),
                (false, Some(_)) => Probe::Pending(format!("item at index {} present", self.index)),
            })
        })?;
        Ok(outcome.ready())
    }

    fn search_description(&self, session: &Session, options: &SearchOptions) -> PomarResult<String> {
        let list = session.tree.list(self.list)?;
        Ok(format!("item {} of {}; {options}", self.index, list.selector))
    }
}

impl ScopeLocator for ListItemScopeLocator {
    fn get_element(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>> {
        match self.poll_item(session, options, true)? {
            Some(found) => Ok(found),
            None if options.safely => Ok(None),
            None => Err(PomarError::NotFound {
                component: session.full_name(self.component)?,
                search: self.search_description(session, options)?,
            }),
        }
    }

    fn get_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Vec<ElementHandle>> {
        Ok(self
            .get_element(session, &options.with_safely(true))?
            .into_iter()
            .collect())
    }

    fn is_missing(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool> {
        match self.poll_item(session, options, false)? {
            Some(_) => Ok(true),
            None if options.safely => Ok(false),
            None => Err(PomarError::UnexpectedlyPresent {
                component: session.full_name(self.component)?,
                search: self.search_description(session, options)?,
            }),
        }
    }
}

// =============================================================================
// SESSION OPERATIONS
// =============================================================================

impl Session {
    /// Declare a list of `blueprint` items under `parent`
    pub fn create_list(
        &mut self,
        parent: ComponentId,
        property_name: &str,
        blueprint: ComponentBlueprint,
        attributes: Vec<Attribute>,
    ) -> PomarResult<ListId> {
        let request = ComponentRequest::new(blueprint.clone(), Some(parent), property_name)
            .with_attributes(attributes);
        let metadata = self.derive_metadata(&request)?;
        let name = metadata
            .get::<NameAttribute>()
            .map_or_else(|| humanize(property_name), |NameAttribute(name)| name.clone());

        let selector = metadata.get::<FindAttribute>().map_or_else(
            || Selector::Query(ElementQuery::new(blueprint.definition.clone())),
            |find| find.to_selector(&blueprint.definition),
        );
        let find = metadata.get::<FindAttribute>();
        let visibility = find
            .and_then(|find| find.visibility)
            .or_else(|| metadata.get::<FindSettings>().and_then(|s| s.visibility))
            .unwrap_or(self.config().default_visibility);
        let scope_source = find.and_then(|find| find.scope_source).unwrap_or_default();

        let item_attributes = request
            .extra
            .iter()
            .filter(|attribute| {
                !matches!(
                    attribute,
                    Attribute::Find(_) | Attribute::Cache(_) | Attribute::Name(_)
                )
            })
            .cloned()
            .collect();

        let list = self.tree.insert_list(ListState {
            parent,
            name,
            blueprint,
            metadata,
            item_attributes,
            selector,
            visibility,
            scope_source,
            cached_elements: None,
            items: HashMap::new(),
            transient: Vec::new(),
        });
        self.tree.node_mut(parent)?.parts.lists.push(list);
        tracing::trace!(%list, %parent, "list declared");
        Ok(list)
    }

    /// Elements currently matching the list selector, from cache when enabled
    pub fn list_elements(&mut self, list: ListId) -> PomarResult<Vec<ElementHandle>> {
        let state = self.tree.list(list)?;
        if state.caches_elements() {
            if let Some(cached) = &state.cached_elements {
                return Ok(cached.clone());
            }
        }
        let caching = state.caches_elements();
        let locator = state.locator();
        let elements = locator.get_elements(self, &SearchOptions::safely_at_once())?;
        if caching {
            self.tree.list_mut(list)?.cached_elements = Some(elements.clone());
        }
        Ok(elements)
    }

    /// Forget cached elements and remembered items, remove detached items
    pub fn clear_list_cache(&mut self, list: ListId) -> PomarResult<()> {
        let state = self.tree.list_mut(list)?;
        state.cached_elements = None;
        let items: Vec<ComponentId> = state.items.drain().map(|(_, item)| item).collect();
        let transient = std::mem::take(&mut state.transient);
        for item in items {
            if self.tree.contains(item) {
                self.clear_cache(item)?;
            }
        }
        for item in transient {
            if self.tree.contains(item) {
                self.tree.remove_subtree(item)?;
            }
        }
        Ok(())
    }

    fn remembered_item(&self, list: ListId, key: &ItemKey) -> PomarResult<Option<ComponentId>> {
        let state = self.tree.list(list)?;
        if !state.caches_items() {
            return Ok(None);
        }
        Ok(state
            .items
            .get(key)
            .copied()
            .filter(|item| self.tree.contains(*item)))
    }

    /// Create an item; without a key it is a short-lived predicate
    /// candidate that the caller removes
    fn create_item(
        &mut self,
        list: ListId,
        key: Option<ItemKey>,
        scope: ScopeSpec,
        index: Option<usize>,
        display_name: String,
    ) -> PomarResult<ComponentId> {
        let state = self.tree.list(list)?;
        let remember = state.caches_items() && key.is_some();
        let mut request = ComponentRequest::new(state.blueprint.clone(), Some(state.parent), &display_name)
            .with_scope(scope)
            .with_display_name(display_name);
        request.list = Some(list);
        request.index = index;
        request.initialize = key.is_some();
        request.detached = !remember;
        let item = self.create_component(request)?;

        let state = self.tree.list_mut(list)?;
        match key {
            Some(key) if remember => {
                let _ = state.items.insert(key, item);
            }
            Some(_) => state.transient.push(item),
            None => {}
        }
        Ok(item)
    }

    /// Item at a zero-based index
    pub fn list_item(&mut self, list: ListId, index: usize) -> PomarResult<ComponentId> {
        let key = ItemKey::Index(index);
        if let Some(item) = self.remembered_item(list, &key)? {
            return Ok(item);
        }
        self.create_item(list, Some(key), ScopeSpec::ListItem(index), Some(index), ordinal(index + 1))
    }

    /// Item matching an XPath condition such as `@data-row='2'`
    pub fn list_item_by_xpath(&mut self, list: ListId, name: &str, condition: &str) -> PomarResult<ComponentId> {
        let key = ItemKey::XPath(condition.to_string());
        if let Some(item) = self.remembered_item(list, &key)? {
            return Ok(item);
        }
        let state = self.tree.list(list)?;
        let scope = ScopeSpec::Selector {
            selector: state.selector_with(condition)?,
            visibility: state.visibility,
            scope_source: state.scope_source,
        };
        self.create_item(list, Some(key), scope, None, name.to_string())
    }

    /// Every item matching an XPath condition, found now
    pub fn list_items_by_xpath(&mut self, list: ListId, name: &str, condition: &str) -> PomarResult<Vec<ComponentId>> {
        let state = self.tree.list(list)?;
        let selector = state.selector_with(condition)?;
        let (visibility, scope_source) = (state.visibility, state.scope_source);
        let locator = StrategyScopeLocator {
            selector: selector.clone(),
            ..state.locator()
        };
        let count = locator.get_elements(self, &SearchOptions::safely_at_once())?.len();

        let mut items = Vec::with_capacity(count);
        for index in 0..count {
            let key = ItemKey::XPathMatch(condition.to_string(), index);
            if let Some(item) = self.remembered_item(list, &key)? {
                items.push(item);
                continue;
            }
            let scope = ScopeSpec::Selector {
                selector: nth_match(&selector, index),
                visibility,
                scope_source,
            };
            let display = format!("{} {name}", ordinal(index + 1));
            items.push(self.create_item(list, Some(key), scope, Some(index), display)?);
        }
        Ok(items)
    }

    /// First element whose transient item satisfies `predicate`, in one pass
    fn match_predicate<K, P>(
        &mut self,
        list: ListId,
        predicate: &P,
    ) -> PomarResult<Option<(usize, ElementHandle)>>
    where
        K: ComponentKind,
        P: Fn(&mut Self, Control<K>) -> PomarResult<bool> + ?Sized,
    {
        let elements = self.list_elements(list)?;
        for (index, element) in elements.into_iter().enumerate() {
            let probe = self.create_item(
                list,
                None,
                ScopeSpec::Defined(Some(element.clone())),
                Some(index),
                ordinal(index + 1),
            )?;
            let matched = predicate(self, Control::from_id(probe));
            self.tree.remove_subtree(probe)?;
            if matched? {
                return Ok(Some((index, element)));
            }
        }
        Ok(None)
    }

    fn locate_by_predicate<K: ComponentKind>(
        &mut self,
        list: ListId,
        predicate: &ItemPredicate<K>,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>> {
        let mut first = true;
        let outcome = poll(&RetryConfig::from(options), || {
            if !first {
                self.tree.list_mut(list)?.cached_elements = None;
            }
            first = false;
            Ok(match self.match_predicate::<K, ItemPredicate<K>>(list, predicate)? {
                Some((_, element)) => Probe::Ready(element),
                None => Probe::Pending("no item matches".to_string()),
            })
        })?;
        Ok(outcome.ready())
    }

    /// Item satisfying a predicate; `name` identifies the predicate for caching
    pub fn list_item_where<K, F>(&mut self, list: ListId, name: &str, predicate: F) -> PomarResult<ComponentId>
    where
        K: ComponentKind,
        F: Fn(&mut Self, Control<K>) -> PomarResult<bool> + 'static,
    {
        let key = ItemKey::Predicate(name.to_string());
        if let Some(item) = self.remembered_item(list, &key)? {
            return Ok(item);
        }
        let predicate: Rc<ItemPredicate<K>> = Rc::new(predicate);
        let locate: Rc<LocateFn> = Rc::new(move |session: &mut Self, options: &SearchOptions| {
            session.locate_by_predicate(list, predicate.as_ref(), options)
        });
        self.create_item(list, Some(key), ScopeSpec::Dynamic(locate), None, name.to_string())
    }

    /// Index of the first item satisfying `predicate`
    pub fn list_index_of<K, F>(&mut self, list: ListId, predicate: F) -> PomarResult<Option<usize>>
    where
        K: ComponentKind,
        F: Fn(&mut Self, Control<K>) -> PomarResult<bool>,
    {
        Ok(self
            .match_predicate::<K, F>(list, &predicate)?
            .map(|(index, _)| index))
    }
}

// =============================================================================
// CONTROL LIST HANDLE
// =============================================================================

/// Typed handle of a declared list
pub struct ControlList<K> {
    list: ListId,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ControlList<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for ControlList<K> {}

impl<K> fmt::Debug for ControlList<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControlList").field(&self.list).finish()
    }
}

impl<K: ComponentKind> ControlList<K> {
    pub(crate) const fn from_id(list: ListId) -> Self {
        Self {
            list,
            kind: PhantomData,
        }
    }

    /// List id
    #[must_use]
    pub const fn id(&self) -> ListId {
        self.list
    }

    /// Number of items present now
    pub fn count(&self, session: &mut Session) -> PomarResult<usize> {
        Ok(session.list_elements(self.list)?.len())
    }

    /// Item at a zero-based index
    pub fn get(&self, session: &mut Session, index: usize) -> PomarResult<Control<K>> {
        session.list_item(self.list, index).map(Control::from_id)
    }

    /// First item satisfying `predicate`.
    ///
    /// The returned control re-evaluates the predicate whenever its element
    /// is looked up; it does not exist while no item matches.
    pub fn find<F>(&self, session: &mut Session, name: &str, predicate: F) -> PomarResult<Control<K>>
    where
        F: Fn(&mut Session, Control<K>) -> PomarResult<bool> + 'static,
    {
        session
            .list_item_where(self.list, name, predicate)
            .map(Control::from_id)
    }

    /// Item matching an XPath condition
    pub fn get_by_xpath_condition(
        &self,
        session: &mut Session,
        name: &str,
        condition: &str,
    ) -> PomarResult<Control<K>> {
        session
            .list_item_by_xpath(self.list, name, condition)
            .map(Control::from_id)
    }

    /// All items matching an XPath condition
    pub fn get_all_by_xpath_condition(
        &self,
        session: &mut Session,
        name: &str,
        condition: &str,
    ) -> PomarResult<Vec<Control<K>>> {
        Ok(session
            .list_items_by_xpath(self.list, name, condition)?
            .into_iter()
            .map(Control::from_id)
            .collect())
    }

    /// All items present now
    pub fn items(&self, session: &mut Session) -> PomarResult<Vec<Control<K>>> {
        let count = self.count(session)?;
        (0..count).map(|index| self.get(session, index)).collect()
    }

    /// Content of every item
    pub fn contents(&self, session: &mut Session) -> PomarResult<Vec<String>> {
        self.items(session)?
            .into_iter()
            .map(|item| item.content(session))
            .collect()
    }

    /// Index of the first item satisfying `predicate`
    pub fn index_of<F>(&self, session: &mut Session, predicate: F) -> PomarResult<Option<usize>>
    where
        F: Fn(&mut Session, Control<K>) -> PomarResult<bool>,
    {
        session.list_index_of(self.list, predicate)
    }

    /// Forget cached elements and items
    pub fn clear_cache(&self, session: &mut Session) -> PomarResult<()> {
        session.clear_list_cache(self.list)
    }

    /// Hierarchical name of the list
    pub fn full_name(&self, session: &Session) -> PomarResult<String> {
        let state = session.tree.list(self.list)?;
        Ok(format!("{} / {}", session.full_name(state.parent)?, state.label()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::ElementDefinition;

    struct Row;

    impl ComponentKind for Row {
        const TYPE_NAME: &'static str = "row";
    }

    fn state(selector: Selector) -> ListState {
        ListState {
            parent: ComponentId::new(0, 0),
            name: "Rows".to_string(),
            blueprint: ComponentBlueprint::of::<Row>(),
            metadata: Metadata::new(),
            item_attributes: Vec::new(),
            selector,
            visibility: Visibility::Any,
            scope_source: ScopeSource::Parent,
            cached_elements: None,
            items: HashMap::new(),
            transient: Vec::new(),
        }
    }

    mod state_tests {
        use super::*;
        use crate::cache::CacheTarget;

        #[test]
        fn test_label() {
            assert_eq!(state(Selector::css("tr")).label(), "\"Rows\" list");
        }

        #[test]
        fn test_cache_flags() {
            let mut list = state(Selector::css("tr"));
            assert!(!list.caches_elements());
            assert!(!list.caches_items());
            list.metadata
                .push(CacheAttribute::scope().with_target(CacheTarget::Children));
            assert!(!list.caches_elements());
            assert!(list.caches_items());
            list.metadata.push(CacheAttribute::value());
            assert!(list.caches_elements());
        }

        #[test]
        fn test_xpath_condition_selectors() {
            let xpath = state(Selector::xpath(".//tr")).selector_with("@id='a'").unwrap();
            assert_eq!(xpath, Selector::xpath(".//tr[@id='a']"));

            let query = state(Selector::Query(ElementQuery::new(ElementDefinition::any())))
                .selector_with("@id='a'")
                .unwrap();
            assert!(query.to_xpath().unwrap().ends_with("[@id='a']"));

            assert!(matches!(
                state(Selector::css("tr")).selector_with("@id='a'"),
                Err(PomarError::Configuration { .. })
            ));
        }

        #[test]
        fn test_nth_match() {
            assert_eq!(
                nth_match(&Selector::xpath(".//tr[@id='a']"), 1),
                Selector::xpath("(.//tr[@id='a'])[2]")
            );
            let query = Selector::Query(ElementQuery::new(ElementDefinition::any()));
            assert!(matches!(nth_match(&query, 0), Selector::Query(q) if q.index == Some(0)));
        }
    }
}
