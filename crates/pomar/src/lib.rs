//! Pomar: Page Object Model Automation for Rust
//!
//! Pomar (Portuguese: "orchard") models the pages of a web application as
//! typed trees of components. Each component lazily resolves its DOM element
//! relative to its parent, fires declarative triggers around every access,
//! caches what it is told to cache, and retries lookups within configured
//! time budgets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      POMAR Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ PageObject │    │ Component  │    │ Driver     │            │
//! │   │ (declare)  │───►│ Tree +     │───►│ (WebDriver │            │
//! │   │            │    │ Triggers   │    │  or mock)  │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │         │                 │                 ▲                   │
//! │         ▼                 ▼                 │                   │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Metadata   │    │ Cache      │    │ Scope      │            │
//! │   │ Store      │    │ Controller │    │ Locators   │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pomar::prelude::*;
//!
//! let mut session = Session::builder()
//!     .driver(driver)
//!     .base_url("https://demo.example.com/")?
//!     .build()?;
//! let page = session.go_to::<SignInPage>()?;
//! page.email.set(&mut session, &"admin@example.com".to_string())?;
//! page.agree.check(&mut session)?;
//! page.sign_in.click(&mut session)?;
//! session.clean_up()?;
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Behaviors: how clicks, value writes, content reads and scrolling are performed
#[allow(clippy::missing_errors_doc)]
pub mod behavior;

/// Cache controller: scope, value and list caches
#[allow(clippy::missing_errors_doc)]
pub mod cache;

/// Component tree arena and component kinds
pub mod component;

/// Configuration: time budgets, base URL and YAML loading
pub mod config;

/// Session context, builder and navigation
#[allow(clippy::missing_errors_doc)]
pub mod context;

/// Typed control handles and built-in control kinds
#[allow(clippy::missing_errors_doc)]
pub mod controls;

/// Browser driver abstraction and in-memory mock DOM
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod driver;

/// Component lists
#[allow(clippy::missing_errors_doc)]
pub mod list;

/// Element definitions, find strategies and search options
pub mod locator;

/// Log journal and screenshot consumers
#[allow(clippy::missing_errors_doc)]
pub mod log;

/// Metadata store: leveled attributes
pub mod metadata;

/// Page objects and URL matching
#[allow(clippy::missing_errors_doc)]
pub mod page_object;

/// Component resolver: metadata derivation, naming and lifecycle
#[allow(clippy::missing_errors_doc)]
pub mod resolver;

/// Error types
pub mod result;

/// Scope locators
#[allow(clippy::missing_errors_doc)]
pub mod scope;

/// Trigger events, attributes and execution
#[allow(clippy::missing_errors_doc)]
pub mod trigger;

/// Retry engine and waits
#[allow(clippy::missing_errors_doc)]
pub mod wait;

pub use behavior::{ClickBehavior, ContentSource, ScrollBehavior, ValueSetBehavior};
pub use cache::{CacheAttribute, CacheMode, CacheTarget};
pub use component::{ComponentBlueprint, ComponentId, ComponentKind, Lifecycle};
pub use config::{PomarConfig, RetryBudget};
pub use context::{DriverFactory, Session, SessionBuilder};
pub use controls::{Button, CheckBox, Container, Control, EditableKind, FieldKind, Link, Text, TextInput};
pub use driver::{
    Driver, DriverError, DriverResult, ElementHandle, MockDom, MockDriver, MockElement, Screenshot,
    ScriptArg,
};
pub use list::{ControlList, ItemKey, ListId};
pub use locator::{
    Condition, ElementDefinition, ElementQuery, FindAttribute, FindBy, FindSettings, ScopeSource,
    SearchOptions, Selector, TermMatch, Visibility,
};
pub use log::{
    FileScreenshotConsumer, LogManager, LogSection, LogSectionKind, MemoryScreenshotConsumer,
    ScreenshotConsumer, ScreenshotInfo,
};
pub use metadata::{Attribute, AttributeLevel, AttributeTargets, Metadata, MulticastAttribute, NameAttribute};
pub use page_object::{Page, PageBuilder, PageObject, UrlMatcher};
pub use result::{PomarError, PomarResult};
pub use scope::{FindInShadowRoot, ScopeLocator};
pub use trigger::{
    FnTrigger, LogInfoTrigger, ScreenshotTrigger, ScrollToTrigger, ScrollUpTrigger, Trigger,
    TriggerAttribute, TriggerContext, TriggerEvents, TriggerPriority, WaitForElementTrigger,
    WaitSecondsTrigger,
};
pub use wait::{RetryConfig, Until, WaitOptions};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::behavior::*;
    pub use super::cache::*;
    pub use super::component::{ComponentBlueprint, ComponentId, ComponentKind};
    pub use super::config::*;
    pub use super::context::*;
    pub use super::controls::*;
    pub use super::driver::{Driver, ElementHandle, MockDom, MockDriver, MockElement};
    pub use super::list::{ControlList, ItemKey};
    pub use super::locator::*;
    pub use super::log::{LogSectionKind, MemoryScreenshotConsumer, ScreenshotConsumer};
    pub use super::metadata::{Attribute, AttributeLevel, AttributeTargets, MulticastAttribute};
    pub use super::page_object::*;
    pub use super::result::*;
    pub use super::trigger::*;
    pub use super::wait::{Until, WaitOptions};
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::prelude::*;

    mod prelude_tests {
        use super::*;

        struct Blank;

        impl PageObject for Blank {
            fn declare(_page: &mut PageBuilder<'_>) -> PomarResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn test_prelude_is_enough_for_a_session() {
            let dom = MockDom::new();
            let mut session = Session::builder().driver(dom.driver()).build().unwrap();
            let page = session.on::<Blank>().unwrap();
            assert_eq!(page.full_name(&session).unwrap(), "\"Blank\" page");
            session.clean_up().unwrap();
        }
    }
}
