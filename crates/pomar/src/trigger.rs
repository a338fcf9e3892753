//! Trigger Pipeline (Feature 4)
//!
//! Triggers are behaviors bound to lifecycle and access events of a component
//! (`BeforeClick`, `AfterSet`, `Init`, ...). [`Session::execute_triggers`]
//! selects the triggers whose event mask contains the fired event, orders them
//! by [`TriggerPriority`], and runs each one inside an `ExecuteTrigger` log
//! section.
//!
//! While a batch runs, the fired event together with `BeforeAccess` and
//! `AfterAccess` is pushed onto the component's denial stack, so a trigger
//! that touches the component's own element does not fire the same triggers
//! again. The stack is restored whether the batch succeeds or fails. `Init`
//! and `DeInit` fan out to the children afterwards.
//!
//! ## Toyota Way Application:
//! - **Jidoka**: A failing trigger stops the batch and surfaces with context
//! - **Poka-Yoke**: Guaranteed release of the denial stack

use crate::component::ComponentId;
use crate::context::Session;
use crate::driver::Driver;
use crate::locator::Selector;
use crate::log::LogSection;
use crate::result::{PomarError, PomarResult};
use crate::wait::{self, Probe, RetryConfig};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;
use std::time::Duration;

// =============================================================================
// EVENTS
// =============================================================================

/// Bit set of trigger events
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TriggerEvents(u32);

const EVENT_NAMES: [(TriggerEvents, &str); 17] = [
    (TriggerEvents::INIT, "Init"),
    (TriggerEvents::INIT_COMPLETED, "InitCompleted"),
    (TriggerEvents::DE_INIT, "DeInit"),
    (TriggerEvents::BEFORE_ACCESS, "BeforeAccess"),
    (TriggerEvents::AFTER_ACCESS, "AfterAccess"),
    (TriggerEvents::BEFORE_GET, "BeforeGet"),
    (TriggerEvents::AFTER_GET, "AfterGet"),
    (TriggerEvents::BEFORE_SET, "BeforeSet"),
    (TriggerEvents::AFTER_SET, "AfterSet"),
    (TriggerEvents::BEFORE_CLICK, "BeforeClick"),
    (TriggerEvents::AFTER_CLICK, "AfterClick"),
    (TriggerEvents::BEFORE_HOVER, "BeforeHover"),
    (TriggerEvents::AFTER_HOVER, "AfterHover"),
    (TriggerEvents::BEFORE_FOCUS, "BeforeFocus"),
    (TriggerEvents::AFTER_FOCUS, "AfterFocus"),
    (TriggerEvents::BEFORE_BLUR, "BeforeBlur"),
    (TriggerEvents::AFTER_BLUR, "AfterBlur"),
];

impl TriggerEvents {
    /// No event
    pub const NONE: Self = Self(0);
    /// Component initialized
    pub const INIT: Self = Self(1);
    /// Component de-initialized
    pub const DE_INIT: Self = Self(1 << 1);
    /// Before the scope element is looked up
    pub const BEFORE_ACCESS: Self = Self(1 << 2);
    /// After the scope element was looked up
    pub const AFTER_ACCESS: Self = Self(1 << 3);
    /// Before a value is read
    pub const BEFORE_GET: Self = Self(1 << 4);
    /// After a value was read
    pub const AFTER_GET: Self = Self(1 << 5);
    /// Before a value is set
    pub const BEFORE_SET: Self = Self(1 << 6);
    /// After a value was set
    pub const AFTER_SET: Self = Self(1 << 7);
    /// Before click
    pub const BEFORE_CLICK: Self = Self(1 << 8);
    /// After click
    pub const AFTER_CLICK: Self = Self(1 << 9);
    /// Before hover
    pub const BEFORE_HOVER: Self = Self(1 << 10);
    /// After hover
    pub const AFTER_HOVER: Self = Self(1 << 11);
    /// Before focus
    pub const BEFORE_FOCUS: Self = Self(1 << 12);
    /// After focus
    pub const AFTER_FOCUS: Self = Self(1 << 13);
    /// Before blur
    pub const BEFORE_BLUR: Self = Self(1 << 14);
    /// After blur
    pub const AFTER_BLUR: Self = Self(1 << 15);
    /// Component and its declared children finished initializing
    pub const INIT_COMPLETED: Self = Self(1 << 16);

    /// Any "before" action event
    pub const BEFORE_ANY_ACTION: Self = Self(
        Self::BEFORE_SET.0
            | Self::BEFORE_CLICK.0
            | Self::BEFORE_HOVER.0
            | Self::BEFORE_FOCUS.0
            | Self::BEFORE_BLUR.0,
    );
    /// Any "after" action event
    pub const AFTER_ANY_ACTION: Self = Self(
        Self::AFTER_SET.0
            | Self::AFTER_CLICK.0
            | Self::AFTER_HOVER.0
            | Self::AFTER_FOCUS.0
            | Self::AFTER_BLUR.0,
    );

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no event is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every event of `other` is in `self`
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Whether `self` and `other` share an event
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for TriggerEvents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TriggerEvents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for TriggerEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<&str> = EVENT_NAMES
            .iter()
            .filter(|(event, _)| self.contains(*event))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(" | "))
    }
}

impl fmt::Debug for TriggerEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TriggerEvents({self})")
    }
}

/// Events suppressed on a component while triggers for `on` run
#[must_use]
pub fn denied_events(on: TriggerEvents) -> TriggerEvents {
    if on.is_empty() {
        TriggerEvents::NONE
    } else {
        on | TriggerEvents::BEFORE_ACCESS | TriggerEvents::AFTER_ACCESS
    }
}

/// Execution order of triggers for one event, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TriggerPriority {
    /// Runs first
    Highest,
    /// Runs earlier
    Higher,
    /// Runs early
    High,
    /// Default
    #[default]
    Medium,
    /// Runs late
    Low,
    /// Runs later
    Lower,
    /// Runs last
    Lowest,
}

// =============================================================================
// TRIGGER TRAIT AND CONTEXT
// =============================================================================

/// Ephemeral context handed to a trigger
pub struct TriggerContext<'a> {
    session: &'a mut Session,
    component: ComponentId,
    event: TriggerEvents,
}

impl<'a> TriggerContext<'a> {
    pub(crate) fn new(session: &'a mut Session, component: ComponentId, event: TriggerEvents) -> Self {
        Self {
            session,
            component,
            event,
        }
    }

    /// Event being executed
    #[must_use]
    pub const fn event(&self) -> TriggerEvents {
        self.event
    }

    /// Component under trigger
    #[must_use]
    pub const fn component(&self) -> ComponentId {
        self.component
    }

    /// Session
    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    /// Driver
    pub fn driver(&mut self) -> &mut dyn Driver {
        self.session.driver_mut()
    }

    /// Full name of the component
    pub fn full_name(&self) -> PomarResult<String> {
        self.session.full_name(self.component)
    }
}

impl fmt::Debug for TriggerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerContext")
            .field("component", &self.component)
            .field("event", &self.event)
            .finish()
    }
}

/// Action of a trigger
pub trait Trigger: fmt::Debug {
    /// Kind name, used for logging and override detection
    fn name(&self) -> &str;

    /// Run the action
    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()>;
}

/// Trigger bound to an event mask with a priority
#[derive(Debug, Clone)]
pub struct TriggerAttribute {
    /// Events the trigger runs on
    pub on: TriggerEvents,
    /// Order among triggers of the same event
    pub priority: TriggerPriority,
    action: Rc<dyn Trigger>,
}

impl TriggerAttribute {
    /// Bind an action to events
    pub fn new(on: TriggerEvents, action: impl Trigger + 'static) -> Self {
        Self {
            on,
            priority: TriggerPriority::Medium,
            action: Rc::new(action),
        }
    }

    /// Set the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: TriggerPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the event mask
    #[must_use]
    pub const fn with_on(mut self, on: TriggerEvents) -> Self {
        self.on = on;
        self
    }

    /// Kind name of the action
    #[must_use]
    pub fn name(&self) -> &str {
        self.action.name()
    }

    /// The action
    #[must_use]
    pub fn action(&self) -> &Rc<dyn Trigger> {
        &self.action
    }

    /// Screenshot before click
    #[must_use]
    pub fn screenshot(title: Option<&str>) -> Self {
        Self::new(
            TriggerEvents::BEFORE_CLICK,
            ScreenshotTrigger {
                title: title.map(String::from),
            },
        )
    }

    /// Scroll the window to the top before any action
    #[must_use]
    pub fn scroll_up() -> Self {
        Self::new(TriggerEvents::BEFORE_ANY_ACTION, ScrollUpTrigger)
    }

    /// Scroll the component into view before any action
    #[must_use]
    pub fn scroll_to() -> Self {
        Self::new(TriggerEvents::BEFORE_ANY_ACTION, ScrollToTrigger)
    }

    /// Log a message on init
    #[must_use]
    pub fn log_info(message: impl Into<String>) -> Self {
        Self::new(TriggerEvents::INIT, LogInfoTrigger::new(message))
    }

    /// Sleep after click
    #[must_use]
    pub fn wait_seconds(seconds: f64) -> Self {
        Self::new(TriggerEvents::AFTER_CLICK, WaitSecondsTrigger { seconds })
    }

    /// Wait for an element after click
    #[must_use]
    pub fn wait_for_element(selector: Selector, until: ElementState) -> Self {
        Self::new(
            TriggerEvents::AFTER_CLICK,
            WaitForElementTrigger {
                selector,
                until,
                timeout: None,
            },
        )
    }

    /// Closure trigger
    pub fn from_fn<F>(name: impl Into<String>, on: TriggerEvents, f: F) -> Self
    where
        F: Fn(&mut TriggerContext<'_>) -> PomarResult<()> + 'static,
    {
        Self::new(on, FnTrigger::new(name, f))
    }
}

// =============================================================================
// BUILT-IN TRIGGERS
// =============================================================================

/// Hands a screenshot to the session's consumers
#[derive(Debug, Clone, Default)]
pub struct ScreenshotTrigger {
    /// Title
    pub title: Option<String>,
}

impl Trigger for ScreenshotTrigger {
    fn name(&self) -> &str {
        "Screenshot"
    }

    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()> {
        context.session().take_screenshot(self.title.as_deref())
    }
}

/// Runs `scroll(0,0);`
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollUpTrigger;

impl Trigger for ScrollUpTrigger {
    fn name(&self) -> &str {
        "ScrollUp"
    }

    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()> {
        let _ = context.driver().execute_script("scroll(0,0);", &[])?;
        Ok(())
    }
}

/// Scrolls the component into view
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollToTrigger;

impl Trigger for ScrollToTrigger {
    fn name(&self) -> &str {
        "ScrollTo"
    }

    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()> {
        let component = context.component();
        context.session().scroll_into_view(component)
    }
}

/// Writes an info message to the log
#[derive(Debug, Clone)]
pub struct LogInfoTrigger {
    message: String,
}

impl LogInfoTrigger {
    /// New trigger
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Trigger for LogInfoTrigger {
    fn name(&self) -> &str {
        "LogInfo"
    }

    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()> {
        context.session().log_mut().info(self.message.clone());
        Ok(())
    }
}

/// Sleeps for a number of seconds
#[derive(Debug, Clone, Copy)]
pub struct WaitSecondsTrigger {
    /// Seconds to sleep
    pub seconds: f64,
}

impl Trigger for WaitSecondsTrigger {
    fn name(&self) -> &str {
        "WaitSeconds"
    }

    fn execute(&self, _context: &mut TriggerContext<'_>) -> PomarResult<()> {
        if self.seconds > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(self.seconds));
        }
        Ok(())
    }
}

/// State awaited by [`WaitForElementTrigger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// At least one match
    Present,
    /// No match
    Missing,
}

/// Waits until a document-level selector is present or missing
#[derive(Debug, Clone)]
pub struct WaitForElementTrigger {
    /// Selector searched in the document
    pub selector: Selector,
    /// Awaited state
    pub until: ElementState,
    /// Timeout override; waiting timeout of the session otherwise
    pub timeout: Option<Duration>,
}

impl WaitForElementTrigger {
    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Trigger for WaitForElementTrigger {
    fn name(&self) -> &str {
        "WaitForElement"
    }

    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()> {
        let session = context.session();
        let budget = session.config().waiting();
        let config = RetryConfig::new(self.timeout.unwrap_or(budget.timeout))
            .with_poll_interval(budget.interval);
        let what = match self.until {
            ElementState::Present => format!("{} to be present", self.selector),
            ElementState::Missing => format!("{} to be missing", self.selector),
        };
        wait::retry(&config, &what, || {
            let found = session.driver_mut().find_elements(None, &self.selector)?;
            let done = match self.until {
                ElementState::Present => !found.is_empty(),
                ElementState::Missing => found.is_empty(),
            };
            Ok(if done {
                Probe::Ready(())
            } else {
                Probe::Pending(format!("{} matching elements", found.len()))
            })
        })
    }
}

type TriggerFn = dyn Fn(&mut TriggerContext<'_>) -> PomarResult<()>;

/// Trigger backed by a closure
pub struct FnTrigger {
    name: String,
    f: Box<TriggerFn>,
}

impl FnTrigger {
    /// New closure trigger
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut TriggerContext<'_>) -> PomarResult<()> + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for FnTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTrigger").field("name", &self.name).finish()
    }
}

impl Trigger for FnTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, context: &mut TriggerContext<'_>) -> PomarResult<()> {
        (self.f)(context)
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

impl Session {
    /// Run the triggers of `component` for `on`.
    ///
    /// No-op for `NONE` or while `on` is denied on the component. `Init` and
    /// `DeInit` propagate to children afterwards, depth-first.
    pub fn execute_triggers(&mut self, component: ComponentId, on: TriggerEvents) -> PomarResult<()> {
        if on.is_empty() {
            return Ok(());
        }
        let node = self.tree.node(component)?;
        if node.is_denied(on) {
            tracing::trace!(%component, event = %on, "trigger event denied");
            return Ok(());
        }
        let mut triggers: Vec<TriggerAttribute> = node
            .metadata
            .get_all::<TriggerAttribute>()
            .into_iter()
            .filter(|trigger| trigger.on.contains(on))
            .cloned()
            .collect();
        triggers.sort_by_key(|trigger| trigger.priority);

        if !triggers.is_empty() {
            let mark = self.tree.node_mut(component)?.push_denied(denied_events(on));
            let result = self.run_triggers(component, on, &triggers);
            if let Ok(node) = self.tree.node_mut(component) {
                node.restore_denied(mark);
            }
            result?;
        }

        if on == TriggerEvents::INIT || on == TriggerEvents::DE_INIT {
            let children = match self.tree.node(component) {
                Ok(node) => node.children.clone(),
                Err(_) => Vec::new(),
            };
            for child in children {
                let fan_out = self
                    .tree
                    .node(child)
                    .is_ok_and(|node| node.accepts_fan_out(on));
                if fan_out {
                    self.execute_triggers(child, on)?;
                }
            }
        }
        Ok(())
    }

    fn run_triggers(
        &mut self,
        component: ComponentId,
        on: TriggerEvents,
        triggers: &[TriggerAttribute],
    ) -> PomarResult<()> {
        let full_name = self.full_name(component)?;
        let event = on.to_string();
        for trigger in triggers {
            let action = Rc::clone(trigger.action());
            let section = LogSection::execute_trigger(action.name(), &event, &full_name);
            self.execute_section(section, |session| {
                let mut context = TriggerContext::new(session, component, on);
                action.execute(&mut context)
            })
            .map_err(|source| PomarError::TriggerFailed {
                trigger: action.name().to_string(),
                event: event.clone(),
                component: full_name.clone(),
                source: Box::new(source),
            })?;
        }
        Ok(())
    }
}
