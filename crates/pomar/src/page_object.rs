//! Page Object Model Support (Feature 19)
//!
//! A page object is the root of a component tree. Its type declares the URL
//! it lives at and, in [`PageObject::declare`], the controls it contains.
//! Declaration only builds components; nothing touches the driver until a
//! control is used.
//!
//! ## Toyota Way Application:
//! - **Muda**: Page structure is declared once and reused by every test
//! - **Genchi Genbutsu**: Page objects reflect actual page structure

use crate::component::{ComponentBlueprint, ComponentId, ComponentKind};
use crate::context::Session;
use crate::controls::Control;
use crate::list::ControlList;
use crate::locator::{ElementDefinition, FindAttribute};
use crate::metadata::{Attribute, MulticastAttribute};
use crate::resolver::{humanize, ComponentRequest, ScopeSpec};
use crate::result::PomarResult;
use std::any::TypeId;
use std::collections::HashMap;
use std::ops::Deref;

/// A page or window of the application under test.
///
/// # Example
///
/// ```ignore
/// struct SignInPage {
///     email: Control<TextInput>,
///     agree: Control<CheckBox>,
///     sign_in: Control<Button>,
/// }
///
/// impl PageObject for SignInPage {
///     fn url() -> Option<&'static str> {
///         Some("/signin")
///     }
///
///     fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self> {
///         Ok(Self {
///             email: page.find("email", [])?,
///             agree: page.find("agreeCheckbox", [])?,
///             sign_in: page.find("signIn", [])?,
///         })
///     }
/// }
/// ```
pub trait PageObject: Sized + 'static {
    /// URL navigated to by [`Session::go_to`], relative to the base URL
    fn url() -> Option<&'static str> {
        None
    }

    /// URL pattern the page is recognized by; defaults to [`PageObject::url`]
    fn url_pattern() -> Option<&'static str> {
        Self::url()
    }

    /// Display name; the type name without a `Page` ending
    fn page_name() -> String {
        let type_name = short_type_name::<Self>();
        humanize(type_name.strip_suffix("Page").filter(|s| !s.is_empty()).unwrap_or(type_name))
    }

    /// Attributes declared on the page
    fn attributes() -> Vec<Attribute> {
        Vec::new()
    }

    /// Attributes declared for the page's controls
    fn child_attributes() -> Vec<MulticastAttribute> {
        Vec::new()
    }

    /// Declare the page's controls
    fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self>;
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn find_by_id(property_name: &str, _display_name: &str) -> FindAttribute {
    FindAttribute::id(property_name)
}

/// Blueprint of a page object type
#[must_use]
pub fn page_blueprint<P: PageObject>() -> ComponentBlueprint {
    ComponentBlueprint {
        type_name: "page",
        kind_id: TypeId::of::<P>(),
        definition: ElementDefinition::any(),
        ignore_name_endings: &["Page"],
        attributes: P::attributes(),
        child_attributes: P::child_attributes(),
        default_find: find_by_id,
        is_page: true,
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Declares the controls of a page under construction
#[derive(Debug)]
pub struct PageBuilder<'a> {
    session: &'a mut Session,
    page: ComponentId,
}

impl<'a> PageBuilder<'a> {
    pub(crate) fn new(session: &'a mut Session, page: ComponentId) -> Self {
        Self { session, page }
    }

    /// Id of the page component
    #[must_use]
    pub const fn page_id(&self) -> ComponentId {
        self.page
    }

    /// Session the page is built in
    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    /// Declare a control directly on the page
    pub fn find<K: ComponentKind>(
        &mut self,
        property_name: &str,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> PomarResult<Control<K>> {
        self.find_in(self.page, property_name, attributes)
    }

    /// Declare a control inside another control of the page
    pub fn find_in<K: ComponentKind>(
        &mut self,
        parent: ComponentId,
        property_name: &str,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> PomarResult<Control<K>> {
        let request = ComponentRequest::new(ComponentBlueprint::of::<K>(), Some(parent), property_name)
            .with_attributes(attributes);
        self.session.create_component(request).map(Control::from_id)
    }

    /// Declare a list of controls on the page
    pub fn find_all<K: ComponentKind>(
        &mut self,
        property_name: &str,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> PomarResult<ControlList<K>> {
        self.session
            .create_list(
                self.page,
                property_name,
                ComponentBlueprint::of::<K>(),
                attributes.into_iter().collect(),
            )
            .map(ControlList::from_id)
    }
}

// =============================================================================
// PAGE HANDLE
// =============================================================================

/// An attached page: its component id plus the declared controls
#[derive(Debug)]
pub struct Page<P> {
    id: ComponentId,
    object: P,
}

impl<P: PageObject> Page<P> {
    /// Attach a page object to the session as a new tree
    pub(crate) fn attach(session: &mut Session) -> PomarResult<Self> {
        let request = ComponentRequest::new(page_blueprint::<P>(), None, short_type_name::<P>())
            .with_scope(ScopeSpec::Page)
            .with_display_name(P::page_name());
        let id = session.create_component(request)?;
        let declared = P::declare(&mut PageBuilder::new(session, id));
        match declared {
            Ok(object) => Ok(Self { id, object }),
            Err(e) => {
                session.tree.remove_subtree(id)?;
                Err(e)
            }
        }
    }

    /// Page component id
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Declared controls
    #[must_use]
    pub const fn object(&self) -> &P {
        &self.object
    }

    /// `"Sign In" page`
    pub fn full_name(&self, session: &Session) -> PomarResult<String> {
        session.full_name(self.id)
    }

    /// Clear the caches of every control on the page
    pub fn clear_cache(&self, session: &mut Session) -> PomarResult<()> {
        session.clear_cache(self.id)
    }

    /// Whether the driver's current URL matches [`PageObject::url_pattern`]
    pub fn is_current(&self, session: &mut Session) -> PomarResult<bool> {
        let Some(pattern) = P::url_pattern() else {
            return Ok(true);
        };
        let current = session.driver_mut().current_url()?;
        Ok(UrlMatcher::new(pattern).matches(&current))
    }
}

impl<P> Deref for Page<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.object
    }
}

// =============================================================================
// URL MATCHING
// =============================================================================

/// URL pattern matcher for page objects
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone)]
enum UrlSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

fn path_segments(url: &str) -> Vec<&str> {
    let path = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest.find('/').map_or("", |i| &rest[i..]));
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl UrlMatcher {
    /// Matcher for a pattern.
    ///
    /// Patterns support:
    /// - Literal segments: `/signin`
    /// - Wildcards: `/users/*`
    /// - Named parameters: `/users/:id`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = path_segments(pattern)
            .into_iter()
            .map(|s| {
                if s == "*" {
                    UrlSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    UrlSegment::Parameter(name.to_string())
                } else {
                    UrlSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Whether the path of `url` matches; scheme, host, query and fragment are ignored
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let url_segments = path_segments(url);
        url_segments.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(&url_segments)
                .all(|(segment, actual)| match segment {
                    UrlSegment::Literal(literal) => literal == actual,
                    UrlSegment::Wildcard | UrlSegment::Parameter(_) => true,
                })
    }

    /// Named parameters captured from `url`
    #[must_use]
    pub fn extract_params(&self, url: &str) -> HashMap<String, String> {
        self.segments
            .iter()
            .zip(path_segments(url))
            .filter_map(|(segment, actual)| match segment {
                UrlSegment::Parameter(name) => Some((name.clone(), actual.to_string())),
                _ => None,
            })
            .collect()
    }

    /// Original pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct SignInPage;

    impl PageObject for SignInPage {
        fn url() -> Option<&'static str> {
            Some("/signin")
        }

        fn declare(_page: &mut PageBuilder<'_>) -> PomarResult<Self> {
            Ok(Self)
        }
    }

    struct Home;

    impl PageObject for Home {
        fn declare(_page: &mut PageBuilder<'_>) -> PomarResult<Self> {
            Ok(Self)
        }
    }

    mod naming_tests {
        use super::*;

        #[test]
        fn test_page_name_strips_ending() {
            assert_eq!(SignInPage::page_name(), "Sign In");
            assert_eq!(Home::page_name(), "Home");
        }

        #[test]
        fn test_short_type_name() {
            assert_eq!(short_type_name::<SignInPage>(), "SignInPage");
            assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
        }

        #[test]
        fn test_blueprint() {
            let blueprint = page_blueprint::<SignInPage>();
            assert!(blueprint.is_page);
            assert_eq!(blueprint.type_name, "page");
            assert_eq!(blueprint.kind_id, TypeId::of::<SignInPage>());
            assert_eq!(SignInPage::url_pattern(), Some("/signin"));
        }
    }

    mod url_matcher_tests {
        use super::*;

        #[test]
        fn test_literal_match() {
            let matcher = UrlMatcher::new("/signin");
            assert!(matcher.matches("/signin"));
            assert!(matcher.matches("https://example.com/signin?next=%2F#top"));
            assert!(!matcher.matches("/signup"));
            assert!(!matcher.matches("/signin/extra"));
        }

        #[test]
        fn test_wildcard_and_parameters() {
            let matcher = UrlMatcher::new("/users/:id/*");
            assert!(matcher.matches("http://localhost:8080/users/42/edit"));
            assert!(!matcher.matches("/users/42"));
            let params = matcher.extract_params("/users/42/edit");
            assert_eq!(params.get("id").map(String::as_str), Some("42"));
            assert_eq!(matcher.pattern(), "/users/:id/*");
        }

        #[test]
        fn test_root() {
            let matcher = UrlMatcher::new("/");
            assert!(matcher.matches("https://example.com"));
            assert!(matcher.matches("https://example.com/"));
        }
    }
}
