//! Locator Vocabulary (Feature 2)
//!
//! Describes *how* a component's element is searched for: the selector, the
//! term-matching strategy for text and attribute values, the visibility filter
//! and the search options (safely, timeout, retry interval) of a single lookup.
//!
//! ## Toyota Way Application:
//! - **Poka-Yoke**: Structured queries instead of hand-concatenated XPath strings
//! - **Genchi Genbutsu**: Every query renders to a real XPath for real drivers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// =============================================================================
// TERM MATCHING
// =============================================================================

/// String matching strategy used for text and attribute conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TermMatch {
    /// Whole value equals the term
    #[default]
    Equals,
    /// Value contains the term
    Contains,
    /// Value starts with the term
    StartsWith,
    /// Value ends with the term
    EndsWith,
}

impl TermMatch {
    /// Check a value against an expected term. Whitespace is normalized first.
    #[must_use]
    pub fn matches(&self, actual: &str, expected: &str) -> bool {
        let actual = normalize_space(actual);
        let expected = normalize_space(expected);
        match self {
            Self::Equals => actual == expected,
            Self::Contains => actual.contains(&expected),
            Self::StartsWith => actual.starts_with(&expected),
            Self::EndsWith => actual.ends_with(&expected),
        }
    }

    /// Render as an XPath 1.0 predicate over `target` (e.g. `normalize-space(.)`)
    #[must_use]
    pub fn to_xpath(&self, target: &str, term: &str) -> String {
        let literal = xpath_literal(term);
        match self {
            Self::Equals => format!("{target}={literal}"),
            Self::Contains => format!("contains({target},{literal})"),
            Self::StartsWith => format!("starts-with({target},{literal})"),
            Self::EndsWith => format!(
                "substring({target},string-length({target})-string-length({literal})+1)={literal}"
            ),
        }
    }
}

/// Collapse runs of whitespace and trim, like XPath `normalize-space`
#[must_use]
pub fn normalize_space(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

// =============================================================================
// VISIBILITY / SCOPE SOURCE
// =============================================================================

/// Visibility filter applied to found elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Any element regardless of display state
    #[default]
    Any,
    /// Only displayed elements
    Visible,
    /// Only hidden elements
    Hidden,
}

impl Visibility {
    /// Whether an element with the given display state passes the filter
    #[must_use]
    pub const fn accepts(&self, displayed: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Visible => displayed,
            Self::Hidden => !displayed,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        };
        f.write_str(s)
    }
}

/// Which ancestor's element a component is searched within
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScopeSource {
    /// The parent component's scope
    #[default]
    Parent,
    /// The grandparent component's scope
    Grandparent,
    /// The owning page object (whole document)
    PageObject,
}

// =============================================================================
// ELEMENT DEFINITION
// =============================================================================

/// One alternative of an element definition: a tag plus required attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementPattern {
    /// Tag name, or `*` for any
    pub tag: String,
    /// Required attribute values
    pub attributes: Vec<(String, String)>,
}

impl ElementPattern {
    /// Pattern for a tag
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
        }
    }

    /// Require an attribute value
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    fn to_xpath(&self) -> String {
        let mut out = format!("self::{}", self.tag);
        for (name, value) in &self.attributes {
            out.push_str(&format!("[@{name}={}]", xpath_literal(value)));
        }
        out
    }
}

/// What kind of element a component type binds to (any of the patterns)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementDefinition {
    /// Alternatives; empty means any element
    pub patterns: Vec<ElementPattern>,
}

impl ElementDefinition {
    /// Matches any element
    #[must_use]
    pub const fn any() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Single pattern definition
    #[must_use]
    pub fn of(pattern: ElementPattern) -> Self {
        Self {
            patterns: vec![pattern],
        }
    }

    /// Add an alternative pattern
    #[must_use]
    pub fn or(mut self, pattern: ElementPattern) -> Self {
        self.patterns.push(pattern);
        self
    }
}

impl Default for ElementDefinition {
    fn default() -> Self {
        Self::any()
    }
}

// =============================================================================
// QUERY AND SELECTOR
// =============================================================================

/// Condition narrowing an element query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Attribute value condition
    Attribute {
        /// Attribute name
        name: String,
        /// Expected term
        term: String,
        /// Match strategy
        matching: TermMatch,
    },
    /// Normalized text content condition
    Content {
        /// Expected term
        term: String,
        /// Match strategy
        matching: TermMatch,
    },
    /// Raw XPath predicate, e.g. `@data-row='2'`
    XPath(String),
}

impl Condition {
    fn to_xpath(&self) -> String {
        match self {
            Self::Attribute {
                name,
                term,
                matching,
            } => matching.to_xpath(&format!("@{name}"), term),
            Self::Content { term, matching } => matching.to_xpath("normalize-space(.)", term),
            Self::XPath(raw) => raw.clone(),
        }
    }
}

/// Structured element query built from a definition plus conditions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementQuery {
    /// Element definition alternatives
    pub definition: ElementDefinition,
    /// Conditions that all must hold
    pub conditions: Vec<Condition>,
    /// Zero-based index among matches
    pub index: Option<usize>,
    /// Search all descendants (true) or only direct children
    pub descendants: bool,
}

impl ElementQuery {
    /// Query for descendants matching a definition
    #[must_use]
    pub fn new(definition: ElementDefinition) -> Self {
        Self {
            definition,
            conditions: Vec::new(),
            index: None,
            descendants: true,
        }
    }

    /// Add a condition
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Select the n-th match
    #[must_use]
    pub const fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Render as XPath relative to the search context
    #[must_use]
    pub fn to_xpath(&self) -> String {
        let axis = if self.descendants { ".//*" } else { "./*" };
        let mut out = String::from(axis);
        if !self.definition.patterns.is_empty() {
            let alternatives: Vec<String> = self
                .definition
                .patterns
                .iter()
                .map(ElementPattern::to_xpath)
                .collect();
            out.push_str(&format!("[{}]", alternatives.join(" or ")));
        }
        for condition in &self.conditions {
            out.push_str(&format!("[{}]", condition.to_xpath()));
        }
        match self.index {
            Some(index) => format!("({out})[{}]", index + 1),
            None => out,
        }
    }
}

/// Selector handed to the driver
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Raw CSS selector
    Css(String),
    /// Raw XPath expression
    XPath(String),
    /// Structured query
    Query(ElementQuery),
}

impl Selector {
    /// CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// XPath selector
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// XPath form of any selector kind (CSS stays CSS)
    #[must_use]
    pub fn to_xpath(&self) -> Option<String> {
        match self {
            Self::Css(_) => None,
            Self::XPath(x) => Some(x.clone()),
            Self::Query(q) => Some(q.to_xpath()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "css={css}"),
            Self::XPath(xpath) => write!(f, "xpath={xpath}"),
            Self::Query(q) => write!(f, "xpath={}", q.to_xpath()),
        }
    }
}

// =============================================================================
// FIND STRATEGIES
// =============================================================================

/// Strategy for finding a component's element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FindBy {
    /// By `id` attribute
    Id(String),
    /// By `name` attribute
    Name(String),
    /// By CSS class
    Class(String),
    /// By arbitrary attribute
    Attribute {
        /// Attribute name
        name: String,
        /// Attribute value
        value: String,
    },
    /// By visible text content
    Content(String),
    /// By zero-based index among elements of the component's definition
    Index(usize),
    /// By raw CSS selector, ignoring the definition
    Css(String),
    /// By raw XPath, ignoring the definition
    XPath(String),
}

/// Find attribute: strategy plus term matching and search settings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FindAttribute {
    /// Strategy
    pub by: FindBy,
    /// Term matching for value-based strategies
    pub matching: TermMatch,
    /// Visibility override
    pub visibility: Option<Visibility>,
    /// Scope source override
    pub scope_source: Option<ScopeSource>,
}

impl FindAttribute {
    /// New find attribute with equality matching
    #[must_use]
    pub const fn new(by: FindBy) -> Self {
        Self {
            by,
            matching: TermMatch::Equals,
            visibility: None,
            scope_source: None,
        }
    }

    /// Find by id
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(FindBy::Id(id.into()))
    }

    /// Find by name attribute
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(FindBy::Name(name.into()))
    }

    /// Find by CSS class
    #[must_use]
    pub fn class(class: impl Into<String>) -> Self {
        Self::new(FindBy::Class(class.into()))
    }

    /// Find by text content
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self::new(FindBy::Content(text.into()))
    }

    /// Find by index
    #[must_use]
    pub const fn index(index: usize) -> Self {
        Self::new(FindBy::Index(index))
    }

    /// Find by CSS selector
    #[must_use]
    pub fn css(css: impl Into<String>) -> Self {
        Self::new(FindBy::Css(css.into()))
    }

    /// Find by XPath
    #[must_use]
    pub fn xpath(xpath: impl Into<String>) -> Self {
        Self::new(FindBy::XPath(xpath.into()))
    }

    /// Find by attribute value
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(FindBy::Attribute {
            name: name.into(),
            value: value.into(),
        })
    }

    /// Set the term match
    #[must_use]
    pub const fn with_match(mut self, matching: TermMatch) -> Self {
        self.matching = matching;
        self
    }

    /// Set the visibility filter
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Set the scope source
    #[must_use]
    pub const fn with_scope_source(mut self, source: ScopeSource) -> Self {
        self.scope_source = Some(source);
        self
    }

    /// Build the selector for a component of the given definition
    #[must_use]
    pub fn to_selector(&self, definition: &ElementDefinition) -> Selector {
        let query = ElementQuery::new(definition.clone());
        let attribute = |name: &str, term: &str, matching: TermMatch| Condition::Attribute {
            name: name.to_string(),
            term: term.to_string(),
            matching,
        };
        match &self.by {
            FindBy::Css(css) => Selector::Css(css.clone()),
            FindBy::XPath(xpath) => Selector::XPath(xpath.clone()),
            FindBy::Index(index) => Selector::Query(query.with_index(*index)),
            FindBy::Id(id) => {
                Selector::Query(query.with_condition(attribute("id", id, self.matching)))
            }
            FindBy::Name(name) => {
                Selector::Query(query.with_condition(attribute("name", name, self.matching)))
            }
            FindBy::Class(class) => Selector::Query(
                query.with_condition(attribute("class", class, TermMatch::Contains)),
            ),
            FindBy::Attribute { name, value } => {
                Selector::Query(query.with_condition(attribute(name, value, self.matching)))
            }
            FindBy::Content(text) => Selector::Query(query.with_condition(Condition::Content {
                term: text.clone(),
                matching: self.matching,
            })),
        }
    }
}

/// Find settings: defaults applied to the component's searches
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FindSettings {
    /// Visibility filter
    pub visibility: Option<Visibility>,
    /// Search timeout
    pub timeout: Option<Duration>,
    /// Search retry interval
    pub retry_interval: Option<Duration>,
}

impl FindSettings {
    /// Empty settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set visibility
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set retry interval
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }
}

// =============================================================================
// SEARCH OPTIONS
// =============================================================================

/// Options of a single element lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Return absent instead of failing
    pub safely: bool,
    /// Visibility override; `None` uses the component's own filter
    pub visibility: Option<Visibility>,
    /// How long to keep retrying
    pub timeout: Duration,
    /// Pause between attempts
    pub retry_interval: Duration,
}

impl SearchOptions {
    /// Unsafe lookup retried within a budget
    #[must_use]
    pub const fn within(timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            safely: false,
            visibility: None,
            timeout,
            retry_interval,
        }
    }

    /// Unsafe single-probe lookup
    #[must_use]
    pub const fn at_once() -> Self {
        Self::within(Duration::ZERO, Duration::from_millis(1))
    }

    /// Safe single-probe lookup
    #[must_use]
    pub const fn safely_at_once() -> Self {
        Self::at_once().with_safely(true)
    }

    /// Set the safely flag
    #[must_use]
    pub const fn with_safely(mut self, safely: bool) -> Self {
        self.safely = safely;
        self
    }

    /// Override visibility
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for SearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "safely: {}, visibility: {}, timeout: {}ms, retry interval: {}ms",
            self.safely,
            self.visibility
                .map_or_else(|| "default".to_string(), |v| v.to_string()),
            self.timeout.as_millis(),
            self.retry_interval.as_millis()
        )
    }
}
