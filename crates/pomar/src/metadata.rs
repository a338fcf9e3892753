//! Metadata Store (Feature 1)
//!
//! Every component carries a [`Metadata`] collection of declarative
//! [`Attribute`]s merged from five precedence levels:
//!
//! ```text
//! Global < Suite < Component (type-declared) < Parent (declared for children) < Property
//! ```
//!
//! Lookups by attribute kind return matches in ascending precedence, then
//! priority, then insertion order, so the *most specific* attribute is last.
//! A higher-level trigger of the same kind on the same events replaces the
//! lower-level one instead of running twice.
//!
//! ## Toyota Way Application:
//! - **Heijunka**: One deterministic ordering rule for every lookup
//! - **Poka-Yoke**: Typed lookups (`get_all::<TriggerAttribute>()`) instead of downcasts

use crate::behavior::{ClickBehavior, ContentSource, ScrollBehavior, ValueSetBehavior};
use crate::cache::CacheAttribute;
use crate::locator::{FindAttribute, FindSettings};
use crate::scope::FindInShadowRoot;
use crate::trigger::{TriggerAttribute, TriggerPriority};
use serde::{Deserialize, Serialize};

// =============================================================================
// LEVELS AND TARGETS
// =============================================================================

/// Declaration level, ascending precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeLevel {
    /// Session-wide declarations
    Global,
    /// Test-suite declarations
    Suite,
    /// Declared by the component type
    Component,
    /// Declared by the parent for its children
    Parent,
    /// Declared on the property or pushed at runtime
    Property,
}

/// Restricts which components a multicast attribute applies to.
///
/// Empty lists place no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeTargets {
    /// Component type names (e.g. `"checkbox"`)
    pub types: Vec<String>,
    /// Exact property names
    pub names: Vec<String>,
    /// Property name endings (case-insensitive)
    pub name_endings: Vec<String>,
}

impl AttributeTargets {
    /// Applies to every component
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to component types
    #[must_use]
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Restrict to property names
    #[must_use]
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restrict to property name endings
    #[must_use]
    pub fn name_endings<I, S>(mut self, endings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_endings.extend(endings.into_iter().map(Into::into));
        self
    }

    /// Whether a component of `type_name` declared as `property_name` is targeted
    #[must_use]
    pub fn applies_to(&self, type_name: &str, property_name: &str) -> bool {
        let type_ok = self.types.is_empty() || self.types.iter().any(|t| t == type_name);
        let name_ok = self.names.is_empty() || self.names.iter().any(|n| n == property_name);
        let lower = property_name.to_lowercase();
        let ending_ok = self.name_endings.is_empty()
            || self
                .name_endings
                .iter()
                .any(|e| lower.ends_with(&e.to_lowercase()));
        type_ok && name_ok && ending_ok
    }
}

/// Attribute declared for many components at once
#[derive(Debug, Clone)]
pub struct MulticastAttribute {
    /// The attribute
    pub attribute: Attribute,
    /// Which components receive it
    pub targets: AttributeTargets,
}

impl MulticastAttribute {
    /// Target every component
    #[must_use]
    pub fn new(attribute: impl Into<Attribute>) -> Self {
        Self {
            attribute: attribute.into(),
            targets: AttributeTargets::any(),
        }
    }

    /// Set targets
    #[must_use]
    pub fn with_targets(mut self, targets: AttributeTargets) -> Self {
        self.targets = targets;
        self
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Explicit component display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameAttribute(pub String);

/// A declarative attribute
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Display name override
    Name(NameAttribute),
    /// Find strategy
    Find(FindAttribute),
    /// Find settings
    FindSettings(FindSettings),
    /// Resolve the element inside a host's shadow root
    ShadowRoot(FindInShadowRoot),
    /// Trigger bound to events
    Trigger(TriggerAttribute),
    /// Cache configuration
    Cache(CacheAttribute),
    /// Click behavior
    Click(ClickBehavior),
    /// Value set behavior
    ValueSet(ValueSetBehavior),
    /// Content source behavior
    Content(ContentSource),
    /// Scroll behavior
    Scroll(ScrollBehavior),
}

impl Attribute {
    /// Display name attribute
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(NameAttribute(name.into()))
    }
}

/// Typed view of one [`Attribute`] variant
pub trait AttributeKind: Sized + 'static {
    /// Borrow the payload if `attribute` is of this kind
    fn from_attribute(attribute: &Attribute) -> Option<&Self>;

    /// Tie-break within one level
    fn priority(&self) -> TriggerPriority {
        TriggerPriority::Medium
    }

    /// Whether `self`, declared at a higher level, replaces `lower`
    fn overrides(&self, _lower: &Self) -> bool {
        false
    }
}

macro_rules! attribute_kind {
    ($ty:ty, $variant:ident) => {
        impl AttributeKind for $ty {
            fn from_attribute(attribute: &Attribute) -> Option<&Self> {
                match attribute {
                    Attribute::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Attribute {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

attribute_kind!(NameAttribute, Name);
attribute_kind!(FindAttribute, Find);
attribute_kind!(FindSettings, FindSettings);
attribute_kind!(FindInShadowRoot, ShadowRoot);
attribute_kind!(CacheAttribute, Cache);
attribute_kind!(ClickBehavior, Click);
attribute_kind!(ValueSetBehavior, ValueSet);
attribute_kind!(ContentSource, Content);
attribute_kind!(ScrollBehavior, Scroll);

impl AttributeKind for TriggerAttribute {
    fn from_attribute(attribute: &Attribute) -> Option<&Self> {
        match attribute {
            Attribute::Trigger(trigger) => Some(trigger),
            _ => None,
        }
    }

    fn priority(&self) -> TriggerPriority {
        self.priority
    }

    fn overrides(&self, lower: &Self) -> bool {
        self.on == lower.on && self.name() == lower.name()
    }
}

impl From<TriggerAttribute> for Attribute {
    fn from(value: TriggerAttribute) -> Self {
        Self::Trigger(value)
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Attribute with its level and insertion order
#[derive(Debug, Clone)]
pub struct AttributeEntry {
    /// Declaration level
    pub level: AttributeLevel,
    /// Attribute
    pub attribute: Attribute,
    seq: u64,
}

/// Per-component attribute collection
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<AttributeEntry>,
    next_seq: u64,
}

impl Metadata {
    /// Empty metadata
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute at a level
    pub fn add(&mut self, level: AttributeLevel, attribute: impl Into<Attribute>) {
        self.entries.push(AttributeEntry {
            level,
            attribute: attribute.into(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Add several attributes at a level
    pub fn add_all<I>(&mut self, level: AttributeLevel, attributes: I)
    where
        I: IntoIterator<Item = Attribute>,
    {
        for attribute in attributes {
            self.add(level, attribute);
        }
    }

    /// Add an instance-level override
    pub fn push(&mut self, attribute: impl Into<Attribute>) {
        self.add(AttributeLevel::Property, attribute);
    }

    /// All attributes of kind `T`, least specific first
    #[must_use]
    pub fn get_all<T: AttributeKind>(&self) -> Vec<&T> {
        let mut matches: Vec<(&AttributeEntry, &T)> = self
            .entries
            .iter()
            .filter_map(|entry| T::from_attribute(&entry.attribute).map(|value| (entry, value)))
            .collect();
        matches.sort_by(|(a, va), (b, vb)| {
            a.level
                .cmp(&b.level)
                .then_with(|| va.priority().cmp(&vb.priority()))
                .then_with(|| a.seq.cmp(&b.seq))
        });

        let mut result = Vec::with_capacity(matches.len());
        for (i, (entry, value)) in matches.iter().enumerate() {
            let overridden = matches[i + 1..]
                .iter()
                .any(|(later, other)| later.level > entry.level && other.overrides(value));
            if !overridden {
                result.push(*value);
            }
        }
        result
    }

    /// Most specific attribute of kind `T`
    #[must_use]
    pub fn get<T: AttributeKind>(&self) -> Option<&T> {
        self.get_all::<T>().pop()
    }

    /// Whether any attribute of kind `T` is present
    #[must_use]
    pub fn contains<T: AttributeKind>(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| T::from_attribute(&entry.attribute).is_some())
    }

    /// Remove every attribute of kind `T` declared at `level`
    pub fn remove_all<T: AttributeKind>(&mut self, level: AttributeLevel) {
        self.entries
            .retain(|entry| entry.level != level || T::from_attribute(&entry.attribute).is_none());
    }

    /// Raw entries in insertion order
    #[must_use]
    pub fn entries(&self) -> &[AttributeEntry] {
        &self.entries
    }

    /// Number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::trigger::{LogInfoTrigger, TriggerEvents};
    use proptest::prelude::*;

    fn log_info(on: TriggerEvents, message: &str) -> TriggerAttribute {
        TriggerAttribute::new(on, LogInfoTrigger::new(message))
    }

    fn message_of(trigger: &TriggerAttribute) -> String {
        format!("{:?}", trigger.action())
    }

    mod targets_tests {
        use super::*;

        #[test]
        fn test_any_applies_everywhere() {
            assert!(AttributeTargets::any().applies_to("button", "save"));
        }

        #[test]
        fn test_type_and_ending_filters() {
            let targets = AttributeTargets::any()
                .types(["checkbox"])
                .name_endings(["Option"]);
            assert!(targets.applies_to("checkbox", "agreeOption"));
            assert!(!targets.applies_to("checkbox", "agree"));
            assert!(!targets.applies_to("button", "saveOption"));
        }

        #[test]
        fn test_name_filter() {
            let targets = AttributeTargets::any().names(["save"]);
            assert!(targets.applies_to("button", "save"));
            assert!(!targets.applies_to("button", "cancel"));
        }
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn test_empty_lookup() {
            let metadata = Metadata::new();
            assert!(metadata.get_all::<FindAttribute>().is_empty());
            assert!(metadata.get::<FindAttribute>().is_none());
        }

        #[test]
        fn test_get_returns_most_specific() {
            let mut metadata = Metadata::new();
            metadata.add(AttributeLevel::Property, FindAttribute::id("b"));
            metadata.add(AttributeLevel::Component, FindAttribute::id("a"));
            assert_eq!(metadata.get::<FindAttribute>().unwrap(), &FindAttribute::id("b"));
            assert!(metadata.contains::<FindAttribute>());
            assert!(!metadata.contains::<CacheAttribute>());
        }

        #[test]
        fn test_push_overrides_same_trigger() {
            let mut metadata = Metadata::new();
            metadata.add(
                AttributeLevel::Component,
                log_info(TriggerEvents::BEFORE_CLICK, "type level"),
            );
            metadata.push(log_info(TriggerEvents::BEFORE_CLICK, "pushed"));

            let triggers = metadata.get_all::<TriggerAttribute>();
            assert_eq!(triggers.len(), 1);
            assert!(message_of(triggers[0]).contains("pushed"));
        }

        #[test]
        fn test_different_events_do_not_override() {
            let mut metadata = Metadata::new();
            metadata.add(
                AttributeLevel::Component,
                log_info(TriggerEvents::BEFORE_CLICK, "click"),
            );
            metadata.push(log_info(TriggerEvents::AFTER_CLICK, "after"));
            assert_eq!(metadata.get_all::<TriggerAttribute>().len(), 2);
        }

        #[test]
        fn test_priority_breaks_ties_within_level() {
            let mut metadata = Metadata::new();
            metadata.add(
                AttributeLevel::Component,
                log_info(TriggerEvents::INIT, "low").with_priority(TriggerPriority::Low),
            );
            metadata.add(
                AttributeLevel::Component,
                log_info(TriggerEvents::BEFORE_CLICK, "high").with_priority(TriggerPriority::High),
            );
            let triggers = metadata.get_all::<TriggerAttribute>();
            assert!(message_of(triggers[0]).contains("high"));
            assert!(message_of(triggers[1]).contains("low"));
        }

        #[test]
        fn test_remove_all_at_level() {
            let mut metadata = Metadata::new();
            metadata.add(AttributeLevel::Component, FindAttribute::id("a"));
            metadata.add(AttributeLevel::Property, FindAttribute::id("b"));
            metadata.remove_all::<FindAttribute>(AttributeLevel::Property);
            assert_eq!(metadata.get::<FindAttribute>().unwrap(), &FindAttribute::id("a"));
            assert_eq!(metadata.len(), 1);
        }
    }

    fn level_strategy() -> impl Strategy<Value = AttributeLevel> {
        prop_oneof![
            Just(AttributeLevel::Global),
            Just(AttributeLevel::Suite),
            Just(AttributeLevel::Component),
            Just(AttributeLevel::Parent),
            Just(AttributeLevel::Property),
        ]
    }

    proptest! {
        #[test]
        fn prop_get_all_is_sorted_by_level(levels in proptest::collection::vec(level_strategy(), 0..20)) {
            let mut metadata = Metadata::new();
            for (i, level) in levels.iter().enumerate() {
                metadata.add(*level, FindAttribute::id(format!("{i}")));
            }
            let found = metadata.get_all::<FindAttribute>();
            prop_assert_eq!(found.len(), levels.len());

            let mut expected: Vec<(AttributeLevel, usize)> =
                levels.iter().copied().enumerate().map(|(i, l)| (l, i)).collect();
            expected.sort();
            let expected_ids: Vec<FindAttribute> =
                expected.iter().map(|(_, i)| FindAttribute::id(format!("{i}"))).collect();
            let actual: Vec<FindAttribute> = found.into_iter().cloned().collect();
            prop_assert_eq!(actual, expected_ids);
        }
    }
}
