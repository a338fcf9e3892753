//! Scope Locators (Feature 2)
//!
//! A [`ScopeLocator`] turns a component's search target into element handles.
//! Lookups are safe (absent result) or unsafe (`NotFound` carrying the
//! component's full name and the search options). Variants:
//!
//! - [`StrategyScopeLocator`]: selector searched inside the parent's element,
//!   retried within the search budget, filtered by visibility.
//! - [`DefinedScopeLocator`]: an already known element, options ignored.
//! - [`DynamicScopeLocator`]: a locating closure invoked on every call.
//! - [`ShadowHostScopeLocator`]: resolves a host first, then searches inside
//!   its shadow root.
//!
//! [`Session::get_scope`] is the single entry point used by components: it
//! consults the scope cache, fires `BeforeAccess`/`AfterAccess` and wraps the
//! lookup in an `ElementFind` log section.

use crate::component::ComponentId;
use crate::context::Session;
use crate::driver::{Driver, ElementHandle};
use crate::locator::{FindAttribute, FindSettings, ScopeSource, SearchOptions, Selector, Visibility};
use crate::log::LogSection;
use crate::result::{PomarError, PomarResult};
use crate::trigger::TriggerEvents;
use crate::wait::{self, poll, Probe, RetryConfig};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Element lookup capability of a component
pub trait ScopeLocator: fmt::Debug {
    /// First matching element; `None` only when `options.safely`
    fn get_element(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>>;

    /// All matching elements; empty when none appeared within the budget
    fn get_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Vec<ElementHandle>>;

    /// Whether no element matches.
    ///
    /// Unsafe checks fail with `UnexpectedlyPresent` when an element is
    /// still there after the budget.
    fn is_missing(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool>;
}

/// Attribute: find the component inside the shadow root of a host element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInShadowRoot {
    /// How the host is found, relative to the component's parent
    pub host: FindAttribute,
}

impl FindInShadowRoot {
    /// Host found by `host`
    #[must_use]
    pub const fn new(host: FindAttribute) -> Self {
        Self { host }
    }
}

fn ready_or_pending(found: Vec<ElementHandle>, want_found: bool) -> Probe<Vec<ElementHandle>> {
    match (want_found, found.is_empty()) {
        (true, false) | (false, true) => Probe::Ready(found),
        (true, true) => Probe::Pending("no matching element".to_string()),
        (false, false) => Probe::Pending(format!("{} matching elements", found.len())),
    }
}

fn find_visible(
    driver: &mut dyn Driver,
    context: Option<&ElementHandle>,
    selector: &Selector,
    visibility: Visibility,
) -> PomarResult<Vec<ElementHandle>> {
    let found = driver.find_elements(context, selector)?;
    if visibility == Visibility::Any {
        return Ok(found);
    }
    let mut visible = Vec::with_capacity(found.len());
    for element in found {
        if visibility.accepts(driver.is_displayed(&element)?) {
            visible.push(element);
        }
    }
    Ok(visible)
}

// =============================================================================
// SEARCH CONTEXT
// =============================================================================

/// Where a strategy search runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SearchContext {
    /// Whole document
    Document,
    /// Inside an element of a component
    Element {
        handle: ElementHandle,
        owner: ComponentId,
    },
    /// The context element is absent
    Missing,
}

impl SearchContext {
    fn handle(&self) -> Option<&ElementHandle> {
        match self {
            Self::Element { handle, .. } => Some(handle),
            _ => None,
        }
    }

    const fn owner(&self) -> Option<ComponentId> {
        match self {
            Self::Element { owner, .. } => Some(*owner),
            _ => None,
        }
    }
}

impl Session {
    /// Context for a search anchored at `parent`
    pub(crate) fn search_context(
        &mut self,
        parent: Option<ComponentId>,
        source: ScopeSource,
        options: &SearchOptions,
    ) -> PomarResult<SearchContext> {
        let anchor = match (source, parent) {
            (ScopeSource::PageObject, _) | (_, None) => None,
            (ScopeSource::Parent, Some(parent)) => Some(parent),
            (ScopeSource::Grandparent, Some(parent)) => self.tree.node(parent)?.parent,
        };
        let Some(anchor) = anchor else {
            return Ok(SearchContext::Document);
        };
        if self.tree.node(anchor)?.is_page {
            return Ok(SearchContext::Document);
        }
        let context_options = SearchOptions {
            visibility: None,
            ..*options
        };
        Ok(match self.get_scope(anchor, &context_options)? {
            Some(handle) => SearchContext::Element {
                handle,
                owner: anchor,
            },
            None => SearchContext::Missing,
        })
    }
}

// =============================================================================
// STRATEGY LOCATOR
// =============================================================================

/// Selector searched inside the parent's scope
#[derive(Debug, Clone)]
pub struct StrategyScopeLocator {
    /// Component named in failures
    pub component: ComponentId,
    /// Anchor of the search context
    pub parent: Option<ComponentId>,
    /// Selector
    pub selector: Selector,
    /// Visibility filter unless overridden by the options
    pub visibility: Visibility,
    /// Which ancestor's element is the context
    pub scope_source: ScopeSource,
}

impl StrategyScopeLocator {
    /// Poll until the wanted state; `None` when the budget ran out
    fn poll_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
        context_options: &SearchOptions,
        want_found: bool,
    ) -> PomarResult<Option<Vec<ElementHandle>>> {
        let mut context = session.search_context(self.parent, self.scope_source, context_options)?;
        if context == SearchContext::Missing {
            return Ok(if want_found { None } else { Some(Vec::new()) });
        }
        let visibility = options.visibility.unwrap_or(self.visibility);
        let outcome = poll(&RetryConfig::from(options), || {
            if context == SearchContext::Missing {
                context = session.search_context(self.parent, self.scope_source, context_options)?;
                if context == SearchContext::Missing {
                    return Ok(ready_or_pending(Vec::new(), want_found));
                }
            }
            let handle = context.handle().cloned();
            let driver = session.driver_mut();
            match find_visible(driver, handle.as_ref(), &self.selector, visibility) {
                Ok(found) => Ok(ready_or_pending(found, want_found)),
                Err(e) if e.is_stale() => {
                    if let Some(owner) = context.owner() {
                        tracing::debug!(%owner, "search context went stale, re-resolving");
                        session.clear_scope_cache(owner)?;
                        context = session.search_context(self.parent, self.scope_source, context_options)?;
                    }
                    Ok(Probe::Pending(e.to_string()))
                }
                Err(e) => Err(e),
            }
        })?;
        Ok(outcome.ready())
    }

    fn search_description(&self, options: &SearchOptions) -> String {
        format!("{}; {options}", self.selector)
    }
}

impl ScopeLocator for StrategyScopeLocator {
    fn get_element(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>> {
        match self.poll_elements(session, options, options, true)? {
            Some(found) => Ok(found.into_iter().next()),
            None if options.safely => Ok(None),
            None => Err(PomarError::NotFound {
                component: session.full_name(self.component)?,
                search: self.search_description(options),
            }),
        }
    }

    fn get_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Vec<ElementHandle>> {
        let context_options = options.with_safely(true);
        Ok(self
            .poll_elements(session, options, &context_options, true)?
            .unwrap_or_default())
    }

    fn is_missing(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool> {
        let context_options = options.with_safely(true);
        match self.poll_elements(session, options, &context_options, false)? {
            Some(_) => Ok(true),
            None if options.safely => Ok(false),
            None => Err(PomarError::UnexpectedlyPresent {
                component: session.full_name(self.component)?,
                search: self.search_description(options),
            }),
        }
    }
}

// =============================================================================
// DEFINED / DYNAMIC LOCATORS
// =============================================================================

/// Already known element
#[derive(Debug, Clone, Default)]
pub struct DefinedScopeLocator {
    element: Option<ElementHandle>,
}

impl DefinedScopeLocator {
    /// Wrap an element (or its absence)
    #[must_use]
    pub const fn new(element: Option<ElementHandle>) -> Self {
        Self { element }
    }
}

impl ScopeLocator for DefinedScopeLocator {
    fn get_element(&self, _: &mut Session, _: &SearchOptions) -> PomarResult<Option<ElementHandle>> {
        Ok(self.element.clone())
    }

    fn get_elements(&self, _: &mut Session, _: &SearchOptions) -> PomarResult<Vec<ElementHandle>> {
        Ok(self.element.iter().cloned().collect())
    }

    fn is_missing(&self, _: &mut Session, _: &SearchOptions) -> PomarResult<bool> {
        Ok(self.element.is_none())
    }
}

/// Locating closure of a [`DynamicScopeLocator`]
pub type LocateFn = dyn Fn(&mut Session, &SearchOptions) -> PomarResult<Option<ElementHandle>>;

/// Invokes a locating function on every call
#[derive(Clone)]
pub struct DynamicScopeLocator {
    component: ComponentId,
    locate: Rc<LocateFn>,
}

impl DynamicScopeLocator {
    /// Wrap a locating function for `component`
    pub fn new<F>(component: ComponentId, locate: F) -> Self
    where
        F: Fn(&mut Session, &SearchOptions) -> PomarResult<Option<ElementHandle>> + 'static,
    {
        Self {
            component,
            locate: Rc::new(locate),
        }
    }

    /// Shared locating function
    pub fn from_rc(component: ComponentId, locate: Rc<LocateFn>) -> Self {
        Self { component, locate }
    }
}

impl fmt::Debug for DynamicScopeLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicScopeLocator")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl ScopeLocator for DynamicScopeLocator {
    fn get_element(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>> {
        (self.locate)(session, options)
    }

    fn get_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Vec<ElementHandle>> {
        Ok((self.locate)(session, &options.with_safely(true))?
            .into_iter()
            .collect())
    }

    fn is_missing(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool> {
        let found = (self.locate)(session, &options.with_safely(true))?;
        match found {
            None => Ok(true),
            Some(_) if options.safely => Ok(false),
            Some(element) => Err(PomarError::UnexpectedlyPresent {
                component: session.full_name(self.component)?,
                search: format!("dynamic lookup found {element}; {options}"),
            }),
        }
    }
}

// =============================================================================
// SHADOW ROOT LOCATOR
// =============================================================================

/// Searches inside the shadow root of a host element
#[derive(Debug, Clone)]
pub struct ShadowHostScopeLocator {
    /// Component named in failures
    pub component: ComponentId,
    /// Host lookup
    pub host: Rc<dyn ScopeLocator>,
    /// Selector inside the shadow root
    pub selector: Selector,
    /// Visibility filter unless overridden by the options
    pub visibility: Visibility,
}

impl ShadowHostScopeLocator {
    fn poll_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
        host_options: &SearchOptions,
        want_found: bool,
    ) -> PomarResult<Option<Vec<ElementHandle>>> {
        let host_options = SearchOptions {
            visibility: None,
            ..*host_options
        };
        let Some(host) = self.host.get_element(session, &host_options)? else {
            return Ok(if want_found { None } else { Some(Vec::new()) });
        };
        let visibility = options.visibility.unwrap_or(self.visibility);
        let outcome = poll(&RetryConfig::from(options), || {
            let driver = session.driver_mut();
            let root = driver.shadow_root(&host)?;
            let found = find_visible(driver, Some(&root), &self.selector, visibility)?;
            Ok(ready_or_pending(found, want_found))
        })?;
        Ok(outcome.ready())
    }
}

impl ScopeLocator for ShadowHostScopeLocator {
    fn get_element(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>> {
        match self.poll_elements(session, options, options, true)? {
            Some(found) => Ok(found.into_iter().next()),
            None if options.safely => Ok(None),
            None => Err(PomarError::NotFound {
                component: session.full_name(self.component)?,
                search: format!("shadow root / {}; {options}", self.selector),
            }),
        }
    }

    fn get_elements(
        &self,
        session: &mut Session,
        options: &SearchOptions,
    ) -> PomarResult<Vec<ElementHandle>> {
        Ok(self
            .poll_elements(session, options, &options.with_safely(true), true)?
            .unwrap_or_default())
    }

    fn is_missing(&self, session: &mut Session, options: &SearchOptions) -> PomarResult<bool> {
        match self.poll_elements(session, options, &options.with_safely(true), false)? {
            Some(_) => Ok(true),
            None if options.safely => Ok(false),
            None => Err(PomarError::UnexpectedlyPresent {
                component: session.full_name(self.component)?,
                search: format!("shadow root / {}; {options}", self.selector),
            }),
        }
    }
}

// =============================================================================
// SESSION ACCESS
// =============================================================================

impl Session {
    /// Default search options of a component: element find budget,
    /// overridden by its [`FindSettings`]
    pub fn search_options(&self, component: ComponentId) -> PomarResult<SearchOptions> {
        let mut options = self.config().element_find_options();
        if let Some(settings) = self
            .tree
            .node(component)?
            .metadata
            .get::<FindSettings>()
        {
            if let Some(timeout) = settings.timeout {
                options.timeout = timeout;
            }
            if let Some(interval) = settings.retry_interval {
                options.retry_interval = interval;
            }
        }
        Ok(options)
    }

    /// Scope element of a component.
    ///
    /// A cached element is returned without firing triggers. Otherwise
    /// `BeforeAccess` fires, the locator runs inside an `ElementFind` section,
    /// and `AfterAccess` fires once the element was found.
    pub fn get_scope(
        &mut self,
        component: ComponentId,
        options: &SearchOptions,
    ) -> PomarResult<Option<ElementHandle>> {
        let caching = self.uses_scope_cache(component)?;
        if caching {
            if let Some(cached) = &self.tree.node(component)?.cached_scope {
                tracing::trace!(%component, element = %cached, "scope cache hit");
                return Ok(Some(cached.clone()));
            }
        }

        self.execute_triggers(component, TriggerEvents::BEFORE_ACCESS)?;
        let locator = Rc::clone(&self.tree.node(component)?.scope_locator);
        let full_name = self.full_name(component)?;
        let found = self.execute_section(LogSection::element_find(&full_name), |session| {
            locator.get_element(session, options)
        })?;
        let element = match found {
            Some(element) => element,
            None if options.safely => return Ok(None),
            None => {
                return Err(PomarError::NotFound {
                    component: full_name,
                    search: options.to_string(),
                })
            }
        };
        if caching {
            self.tree.node_mut(component)?.cached_scope = Some(element.clone());
        }
        self.execute_triggers(component, TriggerEvents::AFTER_ACCESS)?;
        Ok(Some(element))
    }

    /// Scope element with default options; fails when absent
    pub fn scope(&mut self, component: ComponentId) -> PomarResult<ElementHandle> {
        let options = self.search_options(component)?;
        let full_name = self.full_name(component)?;
        self.get_scope(component, &options)?
            .ok_or_else(|| PomarError::NotFound {
                component: full_name,
                search: options.to_string(),
            })
    }

    /// Whether the element exists; unsafe options fail with `NotFound`
    pub fn exists(&mut self, component: ComponentId, options: &SearchOptions) -> PomarResult<bool> {
        self.execute_triggers(component, TriggerEvents::BEFORE_ACCESS)?;
        let locator = Rc::clone(&self.tree.node(component)?.scope_locator);
        let found = locator.get_element(self, options)?;
        if found.is_none() && !options.safely {
            return Err(PomarError::NotFound {
                component: self.full_name(component)?,
                search: options.to_string(),
            });
        }
        self.execute_triggers(component, TriggerEvents::AFTER_ACCESS)?;
        Ok(found.is_some())
    }

    /// Whether the element is absent; unsafe options fail with `UnexpectedlyPresent`
    pub fn missing(&mut self, component: ComponentId, options: &SearchOptions) -> PomarResult<bool> {
        self.execute_triggers(component, TriggerEvents::BEFORE_ACCESS)?;
        let locator = Rc::clone(&self.tree.node(component)?.scope_locator);
        let missing = locator.is_missing(self, options)?;
        self.execute_triggers(component, TriggerEvents::AFTER_ACCESS)?;
        if missing {
            self.clear_scope_cache(component)?;
        }
        Ok(missing)
    }

    fn refresh_stale(&mut self, component: ComponentId) -> PomarResult<()> {
        self.clear_scope_cache(component)?;
        if let Some(list) = self.tree.node(component)?.list {
            self.tree.list_mut(list)?.cached_elements = None;
        }
        Ok(())
    }

    fn scope_action<T, F>(
        &mut self,
        component: ComponentId,
        options: SearchOptions,
        mut action: F,
    ) -> PomarResult<Option<T>>
    where
        F: FnMut(&mut Self, &ElementHandle) -> PomarResult<T>,
    {
        let config = RetryConfig::from(self.config().element_find());
        let what = format!("{} to stay attached", self.full_name(component)?);
        wait::retry(&config, &what, || {
            let Some(element) = self.get_scope(component, &options)? else {
                return Ok(Probe::Ready(None));
            };
            match action(self, &element) {
                Ok(value) => Ok(Probe::Ready(Some(value))),
                Err(e) if e.is_stale() => {
                    tracing::debug!(%component, error = %e, "scope element went stale");
                    self.refresh_stale(component)?;
                    Ok(Probe::Pending(e.to_string()))
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Run `action` against the scope element, re-resolving it when stale
    pub fn with_scope<T, F>(&mut self, component: ComponentId, action: F) -> PomarResult<T>
    where
        F: FnMut(&mut Self, &ElementHandle) -> PomarResult<T>,
    {
        let options = self.search_options(component)?;
        let full_name = self.full_name(component)?;
        self.scope_action(component, options, action)?
            .ok_or_else(|| PomarError::NotFound {
                component: full_name,
                search: options.to_string(),
            })
    }

    /// Like [`Session::with_scope`], with a single safe lookup
    pub fn with_scope_safely<T, F>(&mut self, component: ComponentId, action: F) -> PomarResult<Option<T>>
    where
        F: FnMut(&mut Self, &ElementHandle) -> PomarResult<T>,
    {
        let options = self
            .search_options(component)?
            .with_safely(true)
            .with_timeout(Duration::ZERO);
        self.scope_action(component, options, action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::component::ComponentBlueprint;
    use crate::controls::Container;
    use crate::driver::{MockDom, MockElement};
    use crate::resolver::{ComponentRequest, ScopeSpec};

    fn session(dom: &MockDom) -> Session {
        Session::builder().driver(dom.driver()).build().unwrap()
    }

    mod probe_tests {
        use super::*;

        #[test]
        fn test_ready_or_pending() {
            let one = vec![ElementHandle::new("a")];
            assert_eq!(ready_or_pending(one.clone(), true), Probe::Ready(one.clone()));
            assert!(matches!(ready_or_pending(one, false), Probe::Pending(s) if s.contains('1')));
            assert_eq!(ready_or_pending(Vec::new(), false), Probe::Ready(Vec::new()));
            assert!(matches!(ready_or_pending(Vec::new(), true), Probe::Pending(_)));
        }

        #[test]
        fn test_find_visible_filters_hidden() {
            let dom = MockDom::new();
            let _ = dom.add(MockElement::new("div").with_attribute("class", "row"));
            let _ = dom.add(MockElement::new("div").with_attribute("class", "row").hidden());
            let mut driver = dom.driver();
            let selector = Selector::css("div.row");
            assert_eq!(find_visible(&mut driver, None, &selector, Visibility::Any).unwrap().len(), 2);
            assert_eq!(find_visible(&mut driver, None, &selector, Visibility::Visible).unwrap().len(), 1);
            assert_eq!(find_visible(&mut driver, None, &selector, Visibility::Hidden).unwrap().len(), 1);
        }
    }

    mod locator_tests {
        use super::*;

        #[test]
        fn test_defined_locator_ignores_options() {
            let dom = MockDom::new();
            let mut session = session(&dom);
            let locator = DefinedScopeLocator::new(Some(ElementHandle::new("x")));
            let options = SearchOptions::at_once();
            assert_eq!(
                locator.get_element(&mut session, &options).unwrap(),
                Some(ElementHandle::new("x"))
            );
            assert!(!locator.is_missing(&mut session, &options).unwrap());
            assert!(DefinedScopeLocator::new(None)
                .is_missing(&mut session, &options)
                .unwrap());
        }

        fn clock_locator(session: &mut Session) -> DynamicScopeLocator {
            let request = ComponentRequest::new(ComponentBlueprint::of::<Container>(), None, "clock")
                .with_scope(ScopeSpec::Page);
            let component = session.create_component(request).unwrap();
            DynamicScopeLocator::new(component, |session, _| {
                Ok(session
                    .driver_mut()
                    .find_elements(None, &Selector::css("#clock"))?
                    .into_iter()
                    .next())
            })
        }

        #[test]
        fn test_dynamic_locator_runs_every_call() {
            let dom = MockDom::new();
            let index = dom.add(MockElement::new("span").with_id("clock"));
            let mut session = session(&dom);
            let locator = clock_locator(&mut session);
            let options = SearchOptions::safely_at_once();
            assert!(locator.get_element(&mut session, &options).unwrap().is_some());
            dom.remove(index);
            assert!(locator.get_element(&mut session, &options).unwrap().is_none());
            assert!(locator.is_missing(&mut session, &options).unwrap());
            assert_eq!(dom.find_count(), 3);
        }

        #[test]
        fn test_dynamic_locator_unsafe_missing_check_fails_when_present() {
            let dom = MockDom::new();
            let index = dom.add(MockElement::new("span").with_id("clock"));
            let mut session = session(&dom);
            let locator = clock_locator(&mut session);

            assert!(!locator
                .is_missing(&mut session, &SearchOptions::safely_at_once())
                .unwrap());
            match locator.is_missing(&mut session, &SearchOptions::at_once()) {
                Err(PomarError::UnexpectedlyPresent { component, search }) => {
                    assert_eq!(component, "\"Clock\" control");
                    assert!(search.contains("dynamic lookup"));
                }
                other => panic!("expected UnexpectedlyPresent, got {other:?}"),
            }

            dom.remove(index);
            assert!(locator.is_missing(&mut session, &SearchOptions::at_once()).unwrap());
        }
    }
}
