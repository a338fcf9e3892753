//! Driver - Abstract Browser Automation Capability
//!
//! The component engine never talks to a browser directly. Everything it needs
//! (element lookup, element state, input, script execution, navigation and
//! windows) goes through the [`Driver`] trait, so a WebDriver client, a CDP
//! client or the in-memory [`MockDriver`] can be plugged in.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Driver (capability trait)                                    │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────┐ │
//! │  │  WebDriver       │  │  CDP client      │  │  MockDriver  │ │
//! │  │  (external)      │  │  (external)      │  │  (in-memory) │ │
//! │  └──────────────────┘  └──────────────────┘  └──────────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stale handles and missing elements are distinct [`DriverError`] kinds: the
//! engine recovers from the first by re-resolving and treats the second as
//! "not yet" while waiting.

use crate::locator::{Condition, ElementQuery, Selector, TermMatch};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Result type for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Failure kinds reported by a driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Lookup matched nothing
    #[error("no such element: {selector}")]
    NoSuchElement {
        /// Selector used
        selector: String,
    },

    /// Handle no longer attached to the document
    #[error("stale element reference: {element}")]
    StaleElementReference {
        /// Handle id
        element: String,
    },

    /// Window does not exist
    #[error("no such window: {name}")]
    NoSuchWindow {
        /// Window name or handle
        name: String,
    },

    /// Script raised an error
    #[error("script error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Anything else
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl DriverError {
    /// Stale references and missing elements are retried by wait loops
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NoSuchElement { .. } | Self::StaleElementReference { .. }
        )
    }

    fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Opaque reference to a DOM element owned by the driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    /// Wrap a driver-specific element id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Driver-specific element id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Screenshot as returned by a driver (base64 PNG)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    base64: String,
}

impl Screenshot {
    /// Wrap a base64 payload
    #[must_use]
    pub fn from_base64(data: impl Into<String>) -> Self {
        Self {
            base64: data.into(),
        }
    }

    /// Encode raw PNG bytes
    #[must_use]
    pub fn from_png(bytes: &[u8]) -> Self {
        Self::from_base64(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Base64 payload
    #[must_use]
    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    /// Decode the PNG bytes
    pub fn decode(&self) -> DriverResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.base64)
            .map_err(|e| DriverError::other(format!("invalid screenshot payload: {e}")))
    }
}

/// Script argument
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    /// Element passed as `arguments[n]`
    Element(ElementHandle),
    /// JSON value
    Value(serde_json::Value),
}

// =============================================================================
// DRIVER TRAIT
// =============================================================================

/// Browser automation capability consumed by the component engine.
///
/// Calls are synchronous; one session drives one driver from one thread.
pub trait Driver: fmt::Debug {
    /// Driver kind, used to detect alias re-registration with another kind
    fn kind(&self) -> &str {
        "custom"
    }

    /// Navigate to an absolute URL
    fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Current document URL
    fn current_url(&mut self) -> DriverResult<String>;

    /// All elements matching `selector` inside `context` (document when `None`)
    fn find_elements(
        &mut self,
        context: Option<&ElementHandle>,
        selector: &Selector,
    ) -> DriverResult<Vec<ElementHandle>>;

    /// First element matching `selector`
    fn find_element(
        &mut self,
        context: Option<&ElementHandle>,
        selector: &Selector,
    ) -> DriverResult<ElementHandle> {
        self.find_elements(context, selector)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement {
                selector: selector.to_string(),
            })
    }

    /// Open shadow root of a host element
    fn shadow_root(&mut self, host: &ElementHandle) -> DriverResult<ElementHandle>;

    /// Whether the element is displayed
    fn is_displayed(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// Whether the element is selected (checkbox, radio, option)
    fn is_selected(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// Whether the element is enabled
    fn is_enabled(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// Rendered text
    fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    /// Tag name
    fn tag_name(&mut self, element: &ElementHandle) -> DriverResult<String>;

    /// Attribute or property value
    fn attribute(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    /// Computed CSS value
    fn css_value(&mut self, element: &ElementHandle, property: &str) -> DriverResult<String>;

    /// Click
    fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Double click
    fn double_click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Move the pointer over the element
    fn hover(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Clear an editable element
    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Type text into an element
    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Execute synchronous script
    fn execute_script(
        &mut self,
        script: &str,
        args: &[ScriptArg],
    ) -> DriverResult<serde_json::Value>;

    /// Window handles
    fn window_handles(&mut self) -> DriverResult<Vec<String>>;

    /// Switch to a window by name or handle
    fn switch_to_window(&mut self, name: &str) -> DriverResult<()>;

    /// Take a viewport screenshot
    fn screenshot(&mut self) -> DriverResult<Screenshot>;

    /// Close the browser
    fn quit(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

// =============================================================================
// MOCK DOM
// =============================================================================

const SHADOW_ROOT_TAG: &str = "#shadow-root";

/// Element of the in-memory DOM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    /// Tag name
    pub tag: String,
    /// Attributes (including `value`)
    pub attributes: BTreeMap<String, String>,
    /// Rendered text
    pub text: String,
    /// Displayed flag
    pub displayed: bool,
    /// Selected flag
    pub selected: bool,
    /// Enabled flag
    pub enabled: bool,
    /// Computed CSS values
    pub css: BTreeMap<String, String>,
}

impl MockElement {
    /// Displayed, enabled element with a tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            text: String::new(),
            displayed: true,
            selected: false,
            enabled: true,
            css: BTreeMap::new(),
        }
    }

    /// `<input type="checkbox" id=..>`
    #[must_use]
    pub fn checkbox(id: impl Into<String>) -> Self {
        Self::new("input")
            .with_attribute("type", "checkbox")
            .with_id(id)
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the id attribute
    #[must_use]
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attribute("id", id)
    }

    /// Set the text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set a computed CSS value
    #[must_use]
    pub fn with_css(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.css.insert(property.into(), value.into());
        self
    }

    /// Mark hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Mark selected
    #[must_use]
    pub const fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    fn is_checkable(&self) -> bool {
        self.tag.eq_ignore_ascii_case("input")
            && matches!(
                self.attributes.get("type").map(String::as_str),
                Some("checkbox" | "radio")
            )
    }
}

#[derive(Debug)]
struct MockNode {
    element: MockElement,
    parent: Option<usize>,
    generation: u32,
    removed: bool,
    clicks: usize,
}

#[derive(Debug)]
struct MockDomState {
    nodes: Vec<MockNode>,
    shadow_roots: HashMap<usize, usize>,
    url: String,
    windows: Vec<String>,
    current_window: String,
    history: Vec<String>,
    scripts: Vec<String>,
    script_results: Vec<serde_json::Value>,
    find_count: usize,
    screenshot_png: Vec<u8>,
}

impl Default for MockDomState {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            shadow_roots: HashMap::new(),
            url: "about:blank".to_string(),
            windows: vec!["main".to_string()],
            current_window: "main".to_string(),
            history: Vec::new(),
            scripts: Vec::new(),
            script_results: Vec::new(),
            find_count: 0,
            screenshot_png: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        }
    }
}

/// Shared handle to the in-memory DOM.
///
/// Clone it before moving the [`MockDriver`] into a session to keep
/// inspecting and mutating the page from the test.
#[derive(Debug, Clone, Default)]
pub struct MockDom {
    state: Rc<RefCell<MockDomState>>,
}

impl MockDom {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver bound to this DOM
    #[must_use]
    pub fn driver(&self) -> MockDriver {
        MockDriver { dom: self.clone() }
    }

    /// Append a top-level element; returns its index
    pub fn add(&self, element: MockElement) -> usize {
        self.insert(element, None)
    }

    /// Append a child element; returns its index
    pub fn add_child(&self, parent: usize, element: MockElement) -> usize {
        self.insert(element, Some(parent))
    }

    /// Attach an open shadow root to a host; returns the root's index
    pub fn attach_shadow_root(&self, host: usize) -> usize {
        let root = self.insert(MockElement::new(SHADOW_ROOT_TAG), None);
        let _ = self.state.borrow_mut().shadow_roots.insert(host, root);
        root
    }

    fn insert(&self, element: MockElement, parent: Option<usize>) -> usize {
        let mut state = self.state.borrow_mut();
        state.nodes.push(MockNode {
            element,
            parent,
            generation: 0,
            removed: false,
            clicks: 0,
        });
        state.nodes.len() - 1
    }

    fn with_element<T>(&self, index: usize, f: impl FnOnce(&mut MockElement) -> T) -> Option<T> {
        self.state
            .borrow_mut()
            .nodes
            .get_mut(index)
            .map(|node| f(&mut node.element))
    }

    /// Set the selected flag
    pub fn set_selected(&self, index: usize, selected: bool) {
        let _ = self.with_element(index, |e| e.selected = selected);
    }

    /// Set the displayed flag
    pub fn set_displayed(&self, index: usize, displayed: bool) {
        let _ = self.with_element(index, |e| e.displayed = displayed);
    }

    /// Replace the text
    pub fn set_text(&self, index: usize, text: &str) {
        let _ = self.with_element(index, |e| e.text = text.to_string());
    }

    /// Set an attribute
    pub fn set_attribute(&self, index: usize, name: &str, value: &str) {
        let _ = self.with_element(index, |e| {
            e.attributes.insert(name.to_string(), value.to_string())
        });
    }

    /// Selected flag of an element
    #[must_use]
    pub fn is_selected(&self, index: usize) -> bool {
        self.with_element(index, |e| e.selected).unwrap_or(false)
    }

    /// Attribute of an element
    #[must_use]
    pub fn attribute(&self, index: usize, name: &str) -> Option<String> {
        self.with_element(index, |e| e.attributes.get(name).cloned())
            .flatten()
    }

    /// Detach an element; existing handles become stale and lookups skip it
    pub fn remove(&self, index: usize) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(index) {
            node.removed = true;
        }
    }

    /// Re-attach a removed element
    pub fn restore(&self, index: usize) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(index) {
            node.removed = false;
            node.generation += 1;
        }
    }

    /// Re-render an element: same position, but existing handles go stale
    pub fn make_stale(&self, index: usize) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(index) {
            node.generation += 1;
        }
    }

    /// Number of `find_elements` calls so far
    #[must_use]
    pub fn find_count(&self) -> usize {
        self.state.borrow().find_count
    }

    /// Reset the `find_elements` counter
    pub fn reset_find_count(&self) {
        self.state.borrow_mut().find_count = 0;
    }

    /// Clicks received by an element (native or script)
    #[must_use]
    pub fn clicks(&self, index: usize) -> usize {
        self.state
            .borrow()
            .nodes
            .get(index)
            .map_or(0, |node| node.clicks)
    }

    /// Call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.borrow().history.clone()
    }

    /// Whether a call starting with `prefix` was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.state
            .borrow()
            .history
            .iter()
            .any(|entry| entry.starts_with(prefix))
    }

    /// Executed scripts
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        self.state.borrow().scripts.clone()
    }

    /// Queue a result for the next unrecognized script
    pub fn queue_script_result(&self, value: serde_json::Value) {
        self.state.borrow_mut().script_results.push(value);
    }

    /// Open another window
    pub fn add_window(&self, name: &str) {
        self.state.borrow_mut().windows.push(name.to_string());
    }

    /// Current window name
    #[must_use]
    pub fn current_window(&self) -> String {
        self.state.borrow().current_window.clone()
    }

    /// Current URL
    #[must_use]
    pub fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    /// Set the bytes returned by screenshots
    pub fn set_screenshot(&self, png: Vec<u8>) {
        self.state.borrow_mut().screenshot_png = png;
    }
}

impl MockDomState {
    fn handle(&self, index: usize) -> ElementHandle {
        ElementHandle::new(format!("mock-{index}-{}", self.nodes[index].generation))
    }

    fn resolve(&self, handle: &ElementHandle) -> DriverResult<usize> {
        let stale = || DriverError::StaleElementReference {
            element: handle.id().to_string(),
        };
        let rest = handle.id().strip_prefix("mock-").ok_or_else(stale)?;
        let (index, generation) = rest.split_once('-').ok_or_else(stale)?;
        let index: usize = index.parse().map_err(|_| stale())?;
        let generation: u32 = generation.parse().map_err(|_| stale())?;
        match self.nodes.get(index) {
            Some(node) if node.generation == generation && self.is_attached(index) => Ok(index),
            _ => Err(stale()),
        }
    }

    fn is_attached(&self, mut index: usize) -> bool {
        loop {
            let node = &self.nodes[index];
            if node.removed {
                return false;
            }
            match node.parent {
                Some(parent) => index = parent,
                None => return true,
            }
        }
    }

    fn top_ancestor(&self, mut index: usize) -> usize {
        while let Some(parent) = self.nodes[index].parent {
            index = parent;
        }
        index
    }

    fn is_descendant_of(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.nodes[index].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }

    fn candidates(&self, context: Option<usize>, descendants: bool) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.is_attached(i) && self.nodes[i].element.tag != SHADOW_ROOT_TAG)
            .filter(|&i| match context {
                Some(ctx) if descendants => self.is_descendant_of(i, ctx),
                Some(ctx) => self.nodes[i].parent == Some(ctx),
                None if descendants => {
                    let top = self.top_ancestor(i);
                    self.nodes[top].element.tag != SHADOW_ROOT_TAG
                }
                None => self.nodes[i].parent.is_none(),
            })
            .collect()
    }

    fn matches_query(&self, index: usize, query: &ElementQuery) -> DriverResult<bool> {
        let element = &self.nodes[index].element;
        let definition_ok = query.definition.patterns.is_empty()
            || query.definition.patterns.iter().any(|p| {
                (p.tag == "*" || p.tag.eq_ignore_ascii_case(&element.tag))
                    && p
                        .attributes
                        .iter()
                        .all(|(k, v)| element.attributes.get(k) == Some(v))
            });
        if !definition_ok {
            return Ok(false);
        }
        for condition in &query.conditions {
            let ok = match condition {
                Condition::Attribute {
                    name,
                    term,
                    matching,
                } => element
                    .attributes
                    .get(name)
                    .is_some_and(|value| attribute_matches(name, value, term, *matching)),
                Condition::Content { term, matching } => matching.matches(&element.text, term),
                Condition::XPath(raw) => raw_condition_matches(element, raw)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn find(&self, context: Option<usize>, selector: &Selector) -> DriverResult<Vec<usize>> {
        match selector {
            Selector::Query(query) => {
                let mut found = Vec::new();
                for index in self.candidates(context, query.descendants) {
                    if self.matches_query(index, query)? {
                        found.push(index);
                    }
                }
                Ok(match query.index {
                    Some(n) => found.into_iter().nth(n).into_iter().collect(),
                    None => found,
                })
            }
            Selector::Css(css) => {
                let simple = parse_css(css)?;
                let mut found = Vec::new();
                for index in self.candidates(context, true) {
                    if self.matches_query(index, &simple)? {
                        found.push(index);
                    }
                }
                Ok(found)
            }
            Selector::XPath(xpath) => {
                let (descendants, query) = parse_xpath(xpath)?;
                let mut found = Vec::new();
                for index in self.candidates(context, descendants) {
                    if self.matches_query(index, &query)? {
                        found.push(index);
                    }
                }
                Ok(found)
            }
        }
    }
}

fn attribute_matches(name: &str, value: &str, term: &str, matching: TermMatch) -> bool {
    if name == "class" && matching == TermMatch::Contains {
        value.split_whitespace().any(|class| class == term)
    } else {
        matching.matches(value, term)
    }
}

fn regex(pattern: &str) -> DriverResult<Regex> {
    Regex::new(pattern).map_err(|e| DriverError::other(e.to_string()))
}

/// Evaluate the XPath predicate subset produced for list conditions
fn raw_condition_matches(element: &MockElement, raw: &str) -> DriverResult<bool> {
    let raw = raw.trim();
    let text_target = r"(?:\.|normalize-space\(\.?\))";
    if let Some(c) = regex(r"^@([\w-]+)\s*=\s*'([^']*)'$")?.captures(raw) {
        return Ok(element.attributes.get(&c[1]).is_some_and(|v| v == &c[2]));
    }
    if let Some(c) = regex(&format!(r"^{text_target}\s*=\s*'([^']*)'$"))?.captures(raw) {
        return Ok(TermMatch::Equals.matches(&element.text, &c[1]));
    }
    if let Some(c) = regex(&format!(r"^contains\({text_target},\s*'([^']*)'\)$"))?.captures(raw) {
        return Ok(TermMatch::Contains.matches(&element.text, &c[1]));
    }
    if let Some(c) = regex(r"^contains\(@([\w-]+),\s*'([^']*)'\)$")?.captures(raw) {
        return Ok(element.attributes.get(&c[1]).is_some_and(|v| v.contains(&c[2])));
    }
    Err(DriverError::other(format!(
        "mock driver does not support condition: {raw}"
    )))
}

fn parse_css(css: &str) -> DriverResult<ElementQuery> {
    use crate::locator::{ElementDefinition, ElementPattern};

    let whole = regex(r"^([A-Za-z][\w-]*|\*)?((?:#[\w-]+|\.[\w-]+|\[[\w-]+(?:='[^']*')?\])*)$")?;
    let caps = whole
        .captures(css.trim())
        .ok_or_else(|| DriverError::other(format!("mock driver does not support css: {css}")))?;
    let tag = caps.get(1).map_or("*", |m| m.as_str());
    let mut query = ElementQuery::new(ElementDefinition::of(ElementPattern::tag(tag)));
    let part = regex(r"#([\w-]+)|\.([\w-]+)|\[([\w-]+)(?:='([^']*)')?\]")?;
    for p in part.captures_iter(caps.get(2).map_or("", |m| m.as_str())) {
        let (name, term, matching) = if let Some(id) = p.get(1) {
            ("id", id.as_str().to_string(), TermMatch::Equals)
        } else if let Some(class) = p.get(2) {
            ("class", class.as_str().to_string(), TermMatch::Contains)
        } else {
            let name = p.get(3).map_or("", |m| m.as_str());
            match p.get(4) {
                Some(value) => {
                    query = query.with_condition(Condition::Attribute {
                        name: name.to_string(),
                        term: value.as_str().to_string(),
                        matching: TermMatch::Equals,
                    });
                }
                None => {
                    query = query.with_condition(Condition::Attribute {
                        name: name.to_string(),
                        term: String::new(),
                        matching: TermMatch::StartsWith,
                    });
                }
            }
            continue;
        };
        query = query.with_condition(Condition::Attribute {
            name: name.to_string(),
            term,
            matching,
        });
    }
    Ok(query)
}

fn parse_xpath(xpath: &str) -> DriverResult<(bool, ElementQuery)> {
    use crate::locator::{ElementDefinition, ElementPattern};

    let whole = regex(r"^\.?(//?)([\w*-]+)((?:\[[^\]]+\])*)$")?;
    let caps = whole.captures(xpath.trim()).ok_or_else(|| {
        DriverError::other(format!("mock driver does not support xpath: {xpath}"))
    })?;
    let descendants = &caps[1] == "//";
    let mut query = ElementQuery::new(ElementDefinition::of(ElementPattern::tag(&caps[2])));
    query.descendants = descendants;
    for predicate in regex(r"\[([^\]]+)\]")?.captures_iter(&caps[3]) {
        query = query.with_condition(Condition::XPath(predicate[1].to_string()));
    }
    Ok((descendants, query))
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// Driver over a [`MockDom`] for tests
#[derive(Debug, Clone)]
pub struct MockDriver {
    dom: MockDom,
}

impl MockDriver {
    /// Driver over a fresh empty DOM
    #[must_use]
    pub fn new() -> Self {
        MockDom::new().driver()
    }

    /// Shared DOM handle
    #[must_use]
    pub fn dom(&self) -> MockDom {
        self.dom.clone()
    }

    fn record(&self, entry: String) {
        self.dom.state.borrow_mut().history.push(entry);
    }

    fn read<T>(
        &self,
        element: &ElementHandle,
        f: impl FnOnce(&MockElement) -> T,
    ) -> DriverResult<T> {
        let state = self.dom.state.borrow();
        let index = state.resolve(element)?;
        Ok(f(&state.nodes[index].element))
    }

    fn click_index(&self, index: usize) {
        let mut state = self.dom.state.borrow_mut();
        let node = &mut state.nodes[index];
        node.clicks += 1;
        if node.element.is_checkable() {
            let is_radio = node.element.attributes.get("type").map(String::as_str) == Some("radio");
            node.element.selected = is_radio || !node.element.selected;
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MockDriver {
    fn kind(&self) -> &str {
        "mock"
    }

    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.record(format!("navigate:{url}"));
        self.dom.state.borrow_mut().url = url.to_string();
        Ok(())
    }

    fn current_url(&mut self) -> DriverResult<String> {
        Ok(self.dom.url())
    }

    fn find_elements(
        &mut self,
        context: Option<&ElementHandle>,
        selector: &Selector,
    ) -> DriverResult<Vec<ElementHandle>> {
        self.record(format!("find_elements:{selector}"));
        let mut state = self.dom.state.borrow_mut();
        state.find_count += 1;
        let context = context.map(|handle| state.resolve(handle)).transpose()?;
        let found = state.find(context, selector)?;
        Ok(found.into_iter().map(|index| state.handle(index)).collect())
    }

    fn shadow_root(&mut self, host: &ElementHandle) -> DriverResult<ElementHandle> {
        let state = self.dom.state.borrow();
        let index = state.resolve(host)?;
        state
            .shadow_roots
            .get(&index)
            .map(|&root| state.handle(root))
            .ok_or_else(|| DriverError::NoSuchElement {
                selector: format!("shadow root of {host}"),
            })
    }

    fn is_displayed(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.read(element, |e| e.displayed)
    }

    fn is_selected(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.read(element, |e| e.selected)
    }

    fn is_enabled(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.read(element, |e| e.enabled)
    }

    fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.read(element, |e| {
            if e.displayed {
                e.text.clone()
            } else {
                String::new()
            }
        })
    }

    fn tag_name(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.read(element, |e| e.tag.clone())
    }

    fn attribute(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        self.read(element, |e| match name {
            "textContent" | "innerText" => Some(e.text.clone()),
            "checked" => e.selected.then(|| "true".to_string()),
            _ => e.attributes.get(name).cloned(),
        })
    }

    fn css_value(&mut self, element: &ElementHandle, property: &str) -> DriverResult<String> {
        self.read(element, |e| e.css.get(property).cloned().unwrap_or_default())
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let index = self.dom.state.borrow().resolve(element)?;
        self.record(format!("click:{index}"));
        self.click_index(index);
        Ok(())
    }

    fn double_click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let index = self.dom.state.borrow().resolve(element)?;
        self.record(format!("double_click:{index}"));
        Ok(())
    }

    fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let index = self.dom.state.borrow().resolve(element)?;
        self.record(format!("hover:{index}"));
        Ok(())
    }

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let index = self.dom.state.borrow().resolve(element)?;
        self.record(format!("clear:{index}"));
        self.dom.set_attribute(index, "value", "");
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let index = self.dom.state.borrow().resolve(element)?;
        self.record(format!("send_keys:{index}:{text}"));
        let current = self.dom.attribute(index, "value").unwrap_or_default();
        self.dom.set_attribute(index, "value", &format!("{current}{text}"));
        Ok(())
    }

    fn execute_script(
        &mut self,
        script: &str,
        args: &[ScriptArg],
    ) -> DriverResult<serde_json::Value> {
        self.record(format!("execute_script:{script}"));
        self.dom.state.borrow_mut().scripts.push(script.to_string());
        let element = match args.first() {
            Some(ScriptArg::Element(handle)) => {
                Some(self.dom.state.borrow().resolve(handle)?)
            }
            _ => None,
        };
        if let Some(index) = element {
            if script.contains(".click()") {
                self.click_index(index);
                return Ok(serde_json::Value::Null);
            }
            if script.contains("getBoundingClientRect") {
                let displayed = self.dom.with_element(index, |e| e.displayed);
                return Ok(serde_json::Value::Bool(displayed.unwrap_or(false)));
            }
            if script.contains(".value =") || script.contains(".value=") {
                if let Some(ScriptArg::Value(serde_json::Value::String(v))) = args.get(1) {
                    self.dom.set_attribute(index, "value", v);
                }
                return Ok(serde_json::Value::Null);
            }
            if script.contains("innerHTML") {
                let text = self.dom.with_element(index, |e| e.text.clone());
                return Ok(text.map_or(serde_json::Value::Null, serde_json::Value::String));
            }
        }
        let mut state = self.dom.state.borrow_mut();
        if state.script_results.is_empty() {
            Ok(serde_json::Value::Null)
        } else {
            Ok(state.script_results.remove(0))
        }
    }

    fn window_handles(&mut self) -> DriverResult<Vec<String>> {
        Ok(self.dom.state.borrow().windows.clone())
    }

    fn switch_to_window(&mut self, name: &str) -> DriverResult<()> {
        let mut state = self.dom.state.borrow_mut();
        if !state.windows.iter().any(|w| w == name) {
            return Err(DriverError::NoSuchWindow {
                name: name.to_string(),
            });
        }
        state.current_window = name.to_string();
        state.history.push(format!("switch_to_window:{name}"));
        Ok(())
    }

    fn screenshot(&mut self) -> DriverResult<Screenshot> {
        self.record("screenshot".to_string());
        Ok(Screenshot::from_png(&self.dom.state.borrow().screenshot_png))
    }

    fn quit(&mut self) -> DriverResult<()> {
        self.record("quit".to_string());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
