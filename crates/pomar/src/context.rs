//! Test Session Context (Feature 14)
//!
//! A [`Session`] is the explicit context of one logical test: it owns the
//! driver, the configuration, the component tree with its caches and denial
//! stacks, the log journal and the screenshot consumers. Nothing is shared
//! between sessions, and exactly one page tree is active at a time.
//!
//! Sessions are built with [`SessionBuilder`], which validates its input
//! eagerly so that configuration mistakes fail before any page is touched.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: Invalid configuration stops the build
//! - **5S**: Leaving a page cleans up its whole tree

use crate::component::{ComponentId, ComponentTree};
use crate::config::{parse_base_url, PomarConfig};
use crate::driver::Driver;
use crate::locator::Visibility;
use crate::log::{LogManager, LogSection, ScreenshotConsumer, ScreenshotInfo};
use crate::metadata::MulticastAttribute;
use crate::page_object::{Page, PageObject};
use crate::result::{PomarError, PomarResult};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Creates a driver on demand
pub type DriverFactory = Box<dyn Fn() -> PomarResult<Box<dyn Driver>>>;

struct DriverEntry {
    alias: String,
    kind: String,
    factory: DriverFactory,
}

impl fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverEntry")
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

// =============================================================================
// BUILDER
// =============================================================================

/// Fluent builder of a [`Session`]
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: PomarConfig,
    driver: Option<Box<dyn Driver>>,
    drivers: Vec<DriverEntry>,
    selected: Option<String>,
    global_attributes: Vec<MulticastAttribute>,
    suite_attributes: Vec<MulticastAttribute>,
    screenshot_consumers: Vec<Box<dyn ScreenshotConsumer>>,
}

impl SessionBuilder {
    /// Builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: PomarConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already created driver
    #[must_use]
    pub fn driver(mut self, driver: impl Driver + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    /// Register a driver factory under `alias`.
    ///
    /// The first registered alias is used unless [`SessionBuilder::use_driver`]
    /// selects another. Re-registering an alias with a different kind fails.
    pub fn configure_driver<F>(mut self, alias: &str, kind: &str, factory: F) -> PomarResult<Self>
    where
        F: Fn() -> PomarResult<Box<dyn Driver>> + 'static,
    {
        if let Some(existing) = self.drivers.iter_mut().find(|entry| entry.alias == alias) {
            if existing.kind != kind {
                return Err(PomarError::configuration(format!(
                    "driver alias \"{alias}\" is already configured as \"{}\", not \"{kind}\"",
                    existing.kind
                )));
            }
            existing.factory = Box::new(factory);
            return Ok(self);
        }
        self.drivers.push(DriverEntry {
            alias: alias.to_string(),
            kind: kind.to_string(),
            factory: Box::new(factory),
        });
        if self.selected.is_none() {
            self.selected = Some(alias.to_string());
        }
        Ok(self)
    }

    /// Select a registered driver alias
    pub fn use_driver(mut self, alias: &str) -> PomarResult<Self> {
        if !self.drivers.iter().any(|entry| entry.alias == alias) {
            return Err(PomarError::configuration(format!(
                "no driver is configured with alias \"{alias}\""
            )));
        }
        self.selected = Some(alias.to_string());
        Ok(self)
    }

    /// Set the absolute base URL relative page URLs are joined with
    pub fn base_url(mut self, url: &str) -> PomarResult<Self> {
        let _ = parse_base_url(url)?;
        self.config.base_url = Some(url.to_string());
        Ok(self)
    }

    /// Base timeout of every retry loop
    #[must_use]
    pub fn base_retry_timeout(mut self, timeout: Duration) -> Self {
        self.config.base_retry_timeout_ms = millis(timeout);
        self
    }

    /// Base pause between attempts
    #[must_use]
    pub fn base_retry_interval(mut self, interval: Duration) -> Self {
        self.config.base_retry_interval_ms = millis(interval);
        self
    }

    /// Element lookup timeout
    #[must_use]
    pub fn element_find_timeout(mut self, timeout: Duration) -> Self {
        self.config.element_find_timeout_ms = Some(millis(timeout));
        self
    }

    /// Element lookup retry interval
    #[must_use]
    pub fn element_find_retry_interval(mut self, interval: Duration) -> Self {
        self.config.element_find_retry_interval_ms = Some(millis(interval));
        self
    }

    /// Wait timeout
    #[must_use]
    pub fn waiting_timeout(mut self, timeout: Duration) -> Self {
        self.config.waiting_timeout_ms = Some(millis(timeout));
        self
    }

    /// Wait retry interval
    #[must_use]
    pub fn waiting_retry_interval(mut self, interval: Duration) -> Self {
        self.config.waiting_retry_interval_ms = Some(millis(interval));
        self
    }

    /// Verification timeout
    #[must_use]
    pub fn verification_timeout(mut self, timeout: Duration) -> Self {
        self.config.verification_timeout_ms = Some(millis(timeout));
        self
    }

    /// Verification retry interval
    #[must_use]
    pub fn verification_retry_interval(mut self, interval: Duration) -> Self {
        self.config.verification_retry_interval_ms = Some(millis(interval));
        self
    }

    /// Visibility filter of controls that declare none
    #[must_use]
    pub const fn default_visibility(mut self, visibility: Visibility) -> Self {
        self.config.default_visibility = visibility;
        self
    }

    /// Attribute applied to every component of the session
    #[must_use]
    pub fn global_attribute(mut self, attribute: MulticastAttribute) -> Self {
        self.global_attributes.push(attribute);
        self
    }

    /// Suite-level attribute
    #[must_use]
    pub fn suite_attribute(mut self, attribute: MulticastAttribute) -> Self {
        self.suite_attributes.push(attribute);
        self
    }

    /// Add a screenshot consumer
    #[must_use]
    pub fn screenshot_consumer(mut self, consumer: impl ScreenshotConsumer + 'static) -> Self {
        self.screenshot_consumers.push(Box::new(consumer));
        self
    }

    /// Validate and create the session
    pub fn build(self) -> PomarResult<Session> {
        self.config.validate()?;
        let driver = match (self.driver, &self.selected) {
            (Some(driver), _) => driver,
            (None, Some(alias)) => {
                let entry = self
                    .drivers
                    .iter()
                    .find(|entry| &entry.alias == alias)
                    .ok_or_else(|| {
                        PomarError::configuration(format!("no driver is configured with alias \"{alias}\""))
                    })?;
                (entry.factory)()?
            }
            (None, None) => return Err(PomarError::configuration("no driver is configured")),
        };

        let session = Session {
            id: Uuid::new_v4(),
            driver,
            log: LogManager::new(self.config.log_max_entries),
            config: self.config,
            tree: ComponentTree::new(),
            global_attributes: self.global_attributes,
            suite_attributes: self.suite_attributes,
            screenshot_consumers: self.screenshot_consumers,
            screenshot_count: 0,
            active_page: None,
        };
        tracing::info!(session = %session.id, driver = session.driver.kind(), "session started");
        Ok(session)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Context of one logical test
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    driver: Box<dyn Driver>,
    config: PomarConfig,
    pub(crate) tree: ComponentTree,
    log: LogManager,
    pub(crate) global_attributes: Vec<MulticastAttribute>,
    pub(crate) suite_attributes: Vec<MulticastAttribute>,
    screenshot_consumers: Vec<Box<dyn ScreenshotConsumer>>,
    screenshot_count: usize,
    active_page: Option<ComponentId>,
}

impl Session {
    /// Start building a session
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Unique session id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &PomarConfig {
        &self.config
    }

    /// Log journal
    #[must_use]
    pub const fn log(&self) -> &LogManager {
        &self.log
    }

    /// Mutable log journal
    pub fn log_mut(&mut self) -> &mut LogManager {
        &mut self.log
    }

    /// Driver
    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    /// Root component of the active page
    #[must_use]
    pub const fn active_page(&self) -> Option<ComponentId> {
        self.active_page
    }

    /// Run `action` inside a log section; the section is closed on every path
    pub fn execute_section<T, F>(&mut self, section: LogSection, action: F) -> PomarResult<T>
    where
        F: FnOnce(&mut Self) -> PomarResult<T>,
    {
        self.log.start_section(section);
        let result = action(self);
        self.log.end_section(result.as_ref().err());
        result
    }

    /// Capture a screenshot and hand it to every consumer
    pub fn take_screenshot(&mut self, title: Option<&str>) -> PomarResult<()> {
        if self.screenshot_consumers.is_empty() {
            tracing::debug!("no screenshot consumer registered, skipping screenshot");
            return Ok(());
        }
        let png = self.driver.screenshot()?.decode()?;
        self.screenshot_count += 1;
        let page_name = match self.active_page {
            Some(page) => Some(self.tree.node(page)?.name.clone()),
            None => None,
        };
        let info = ScreenshotInfo {
            number: self.screenshot_count,
            title: title.map(str::to_string),
            page_name,
            png,
        };
        self.log.info(format!("Take screenshot #{:02}", info.number));
        for consumer in &mut self.screenshot_consumers {
            consumer.take(&info)?;
        }
        Ok(())
    }

    // =========================================================================
    // NAVIGATION
    // =========================================================================

    fn navigate(&mut self, url: &str) -> PomarResult<()> {
        let url = self.config.resolve_url(url)?;
        self.execute_section(LogSection::navigation(&url), |session| {
            Ok(session.driver.navigate(&url)?)
        })
    }

    fn leave_active_page(&mut self) -> PomarResult<()> {
        match self.active_page.take() {
            Some(page) if self.tree.contains(page) => self.clean_up_component(page),
            _ => Ok(()),
        }
    }

    fn attach_page<P: PageObject>(&mut self) -> PomarResult<Page<P>> {
        self.leave_active_page()?;
        let page = Page::<P>::attach(self)?;
        self.active_page = Some(page.id());
        self.init_component(page.id())?;
        tracing::debug!(page = %self.full_name(page.id())?, "page attached");
        Ok(page)
    }

    /// Navigate to the page's URL and attach it
    pub fn go_to<P: PageObject>(&mut self) -> PomarResult<Page<P>> {
        let url = P::url().ok_or_else(|| {
            PomarError::configuration(format!("page \"{}\" declares no URL", P::page_name()))
        })?;
        self.go_to_url::<P>(url)
    }

    /// Navigate to `url` and attach the page
    pub fn go_to_url<P: PageObject>(&mut self, url: &str) -> PomarResult<Page<P>> {
        self.navigate(url)?;
        self.attach_page()
    }

    /// Attach the page without navigating
    pub fn on<P: PageObject>(&mut self) -> PomarResult<Page<P>> {
        self.attach_page()
    }

    /// Switch to a window and attach the page shown there
    pub fn to_window<P: PageObject>(&mut self, name: &str) -> PomarResult<Page<P>> {
        self.execute_section(LogSection::navigation(&format!("window \"{name}\"")), |session| {
            Ok(session.driver.switch_to_window(name)?)
        })?;
        self.attach_page()
    }

    /// De-initialize and remove the active page, then quit the driver
    pub fn clean_up(mut self) -> PomarResult<()> {
        let left = self.leave_active_page();
        let quit = self.driver.quit();
        tracing::info!(session = %self.id, components = self.tree.len(), "session cleaned up");
        left?;
        Ok(quit?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDom, MockDriver};
    use crate::log::MemoryScreenshotConsumer;
    use crate::page_object::PageBuilder;

    struct HomePage;

    impl PageObject for HomePage {
        fn url() -> Option<&'static str> {
            Some("/home")
        }

        fn declare(_page: &mut PageBuilder<'_>) -> PomarResult<Self> {
            Ok(Self)
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_missing_driver_fails() {
            let err = Session::builder().build().unwrap_err();
            assert!(matches!(err, PomarError::Configuration { .. }));
        }

        #[test]
        fn test_malformed_base_url_fails() {
            let err = Session::builder().base_url("not a url").unwrap_err();
            assert!(matches!(err, PomarError::Configuration { .. }));
        }

        #[test]
        fn test_zero_interval_fails_at_build() {
            let err = Session::builder()
                .driver(MockDriver::new())
                .waiting_retry_interval(Duration::ZERO)
                .build()
                .unwrap_err();
            assert!(err.to_string().contains("waiting retry interval"));
        }

        #[test]
        fn test_alias_kind_mismatch_fails() {
            let builder = Session::builder()
                .configure_driver("main", "mock", || Ok(Box::new(MockDriver::new()) as Box<dyn Driver>))
                .unwrap();
            let err = builder
                .configure_driver("main", "chrome", || Ok(Box::new(MockDriver::new()) as Box<dyn Driver>))
                .unwrap_err();
            assert!(err.to_string().contains("already configured"));
        }

        #[test]
        fn test_unknown_alias_fails() {
            let err = Session::builder().use_driver("nope").unwrap_err();
            assert!(matches!(err, PomarError::Configuration { .. }));
        }

        #[test]
        fn test_factory_driver_is_used() {
            let dom = MockDom::new();
            let shared = dom.clone();
            let mut session = Session::builder()
                .configure_driver("main", "mock", move || Ok(Box::new(shared.driver()) as Box<dyn Driver>))
                .unwrap()
                .use_driver("main")
                .unwrap()
                .build()
                .unwrap();
            session.driver_mut().navigate("https://example.com/").unwrap();
            assert_eq!(dom.url(), "https://example.com/");
        }
    }

    mod navigation_tests {
        use super::*;

        #[test]
        fn test_go_to_joins_base_url() {
            let dom = MockDom::new();
            let mut session = Session::builder()
                .driver(dom.driver())
                .base_url("https://demo.example.com/app/")
                .unwrap()
                .build()
                .unwrap();
            let page = session.go_to::<HomePage>().unwrap();
            assert_eq!(dom.url(), "https://demo.example.com/home");
            assert_eq!(page.full_name(&session).unwrap(), "\"Home\" page");
            assert!(page.is_current(&mut session).unwrap());
        }

        #[test]
        fn test_relative_url_without_base_fails() {
            let dom = MockDom::new();
            let mut session = Session::builder().driver(dom.driver()).build().unwrap();
            assert!(matches!(
                session.go_to::<HomePage>(),
                Err(PomarError::Configuration { .. })
            ));
        }

        #[test]
        fn test_new_page_replaces_old_tree() {
            let dom = MockDom::new();
            let mut session = Session::builder().driver(dom.driver()).build().unwrap();
            let first = session.on::<HomePage>().unwrap();
            let second = session.on::<HomePage>().unwrap();
            assert_ne!(first.id(), second.id());
            assert_eq!(session.active_page(), Some(second.id()));
            assert_eq!(session.component_count(), 1);
            assert!(first.full_name(&session).is_err());
        }

        #[test]
        fn test_to_window() {
            let dom = MockDom::new();
            dom.add_window("popup");
            let mut session = Session::builder().driver(dom.driver()).build().unwrap();
            let _ = session.to_window::<HomePage>("popup").unwrap();
            assert_eq!(dom.current_window(), "popup");
            assert!(session.to_window::<HomePage>("missing").is_err());
        }

        #[test]
        fn test_clean_up_quits_driver() {
            let dom = MockDom::new();
            let mut session = Session::builder().driver(dom.driver()).build().unwrap();
            let _ = session.on::<HomePage>().unwrap();
            session.clean_up().unwrap();
            assert!(dom.was_called("quit"));
        }
    }

    mod screenshot_tests {
        use super::*;

        #[test]
        fn test_screenshots_are_numbered() {
            let dom = MockDom::new();
            dom.set_screenshot(vec![0x89, b'P', b'N', b'G']);
            let shots = MemoryScreenshotConsumer::new();
            let mut session = Session::builder()
                .driver(dom.driver())
                .screenshot_consumer(shots.clone())
                .build()
                .unwrap();
            let _ = session.on::<HomePage>().unwrap();
            session.take_screenshot(Some("first")).unwrap();
            session.take_screenshot(None).unwrap();
            let taken = shots.shots();
            assert_eq!(taken.len(), 2);
            assert_eq!(taken[0].file_name(), "01 - Home - first.png");
            assert_eq!(taken[1].number, 2);
            assert_eq!(taken[1].png, vec![0x89, b'P', b'N', b'G']);
        }

        #[test]
        fn test_no_consumer_skips_driver() {
            let dom = MockDom::new();
            let mut session = Session::builder().driver(dom.driver()).build().unwrap();
            session.take_screenshot(None).unwrap();
            assert!(!dom.was_called("screenshot"));
        }
    }
}
