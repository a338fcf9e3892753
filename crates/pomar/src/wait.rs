//! Wait Mechanisms (Feature 6)
//!
//! A single retry loop serves element lookups, presence/absence waits,
//! trigger waits and stale-element recovery. A probe either reports
//! [`Probe::Ready`] or [`Probe::Pending`] with a description of the observed
//! state. Stale references and missing elements raised by the driver count as
//! "pending"; any other error stops the loop immediately.
//!
//! - A zero timeout probes exactly once.
//! - A probe that succeeds on attempt N returns without sleeping again.
//! - On expiry the last observed state is reported.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: Automatic detection of ready state
//! - **Heijunka**: Consistent polling intervals for predictable test timing
//! - **Muda**: No sleep after the final attempt

use crate::component::ComponentId;
use crate::config::RetryBudget;
use crate::context::Session;
use crate::locator::{SearchOptions, Visibility};
use crate::log::LogSection;
use crate::result::{PomarError, PomarResult};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

// =============================================================================
// RETRY ENGINE
// =============================================================================

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Condition met
    Ready(T),
    /// Not yet; the observed state
    Pending(String),
}

/// Outcome of a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Condition met
    Ready {
        /// Value produced by the probe
        value: T,
        /// Attempts made
        attempts: usize,
    },
    /// Budget exhausted
    Expired {
        /// Last observed state
        last_state: String,
        /// Attempts made
        attempts: usize,
    },
}

impl<T> PollOutcome<T> {
    /// Value if ready
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready { value, .. } => Some(value),
            Self::Expired { .. } => None,
        }
    }

    /// Attempts made
    pub const fn attempts(&self) -> usize {
        match self {
            Self::Ready { attempts, .. } | Self::Expired { attempts, .. } => *attempts,
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total timeout duration
    pub timeout: Duration,
    /// Interval between retry attempts
    pub poll_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with timeout
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Single attempt
    #[must_use]
    pub const fn at_once() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl From<RetryBudget> for RetryConfig {
    fn from(budget: RetryBudget) -> Self {
        Self::new(budget.timeout).with_poll_interval(budget.interval)
    }
}

impl From<&SearchOptions> for RetryConfig {
    fn from(options: &SearchOptions) -> Self {
        Self::new(options.timeout).with_poll_interval(options.retry_interval)
    }
}

/// Probe until ready or the budget runs out
pub fn poll<T, F>(config: &RetryConfig, mut probe: F) -> PomarResult<PollOutcome<T>>
where
    F: FnMut() -> PomarResult<Probe<T>>,
{
    let start = Instant::now();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let last_state = match probe() {
            Ok(Probe::Ready(value)) => return Ok(PollOutcome::Ready { value, attempts }),
            Ok(Probe::Pending(state)) => state,
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return Err(e),
        };

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            return Ok(PollOutcome::Expired {
                last_state,
                attempts,
            });
        }
        std::thread::sleep(config.poll_interval.min(config.timeout - elapsed));
    }
}

/// Probe until ready; [`PomarError::Timeout`] on expiry
pub fn retry<T, F>(config: &RetryConfig, what: &str, probe: F) -> PomarResult<T>
where
    F: FnMut() -> PomarResult<Probe<T>>,
{
    match poll(config, probe)? {
        PollOutcome::Ready { value, .. } => Ok(value),
        PollOutcome::Expired { last_state, .. } => Err(PomarError::Timeout {
            what: what.to_string(),
            ms: config.timeout.as_millis() as u64,
            last_state,
        }),
    }
}

/// Waiting mode over a boolean probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Succeed when the probe reports true
    Presence,
    /// Succeed when the probe reports false
    Missing,
}

/// Wait until `probe` reports the state required by `mode`
pub fn wait_for<F>(config: &RetryConfig, what: &str, mode: WaitMode, mut probe: F) -> PomarResult<()>
where
    F: FnMut() -> PomarResult<bool>,
{
    retry(config, what, || {
        let present = probe()?;
        Ok(match (mode, present) {
            (WaitMode::Presence, true) | (WaitMode::Missing, false) => Probe::Ready(()),
            (WaitMode::Presence, false) => Probe::Pending("missing".to_string()),
            (WaitMode::Missing, true) => Probe::Pending("present".to_string()),
        })
    })
}

// =============================================================================
// COMPONENT WAITS
// =============================================================================

/// Elementary state a component can be waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitState {
    /// In the DOM
    Present,
    /// Not in the DOM
    Missing,
    /// In the DOM and displayed
    Visible,
    /// In the DOM and not displayed
    Hidden,
    /// Not in the DOM or not displayed
    MissingOrHidden,
}

impl WaitState {
    const fn is_presence(self) -> bool {
        matches!(self, Self::Present | Self::Visible | Self::Hidden)
    }

    /// Lookup visibility and whether a found element satisfies the state
    const fn lookup_target(self) -> (Visibility, bool) {
        match self {
            Self::Present => (Visibility::Any, true),
            Self::Missing => (Visibility::Any, false),
            Self::Visible => (Visibility::Visible, true),
            Self::Hidden => (Visibility::Hidden, true),
            Self::MissingOrHidden => (Visibility::Visible, false),
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Missing => "missing",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::MissingOrHidden => "missing or hidden",
        };
        f.write_str(s)
    }
}

/// One step of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitUnit {
    /// Awaited state
    pub state: WaitState,
}

/// Composite wait condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Until {
    /// Present in the DOM
    Present,
    /// Displayed
    Visible,
    /// Not displayed
    Hidden,
    /// Removed from the DOM
    Missing,
    /// Removed or not displayed
    MissingOrHidden,
    /// Displayed, then hidden
    VisibleThenHidden,
    /// Displayed, then removed
    VisibleThenMissing,
}

impl Until {
    /// Ordered units
    #[must_use]
    pub fn units(self) -> Vec<WaitUnit> {
        let states: &[WaitState] = match self {
            Self::Present => &[WaitState::Present],
            Self::Visible => &[WaitState::Visible],
            Self::Hidden => &[WaitState::Hidden],
            Self::Missing => &[WaitState::Missing],
            Self::MissingOrHidden => &[WaitState::MissingOrHidden],
            Self::VisibleThenHidden => &[WaitState::Visible, WaitState::Hidden],
            Self::VisibleThenMissing => &[WaitState::Visible, WaitState::Missing],
        };
        states.iter().map(|&state| WaitUnit { state }).collect()
    }
}

/// Options for component waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout; session waiting timeout when `None`
    pub timeout: Option<Duration>,
    /// Polling interval; session waiting interval when `None`
    pub poll_interval: Option<Duration>,
    /// Fail when a presence unit times out
    pub throw_on_presence_failure: bool,
    /// Fail when an absence unit times out
    pub throw_on_absence_failure: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: None,
            throw_on_presence_failure: true,
            throw_on_absence_failure: true,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Return `false` instead of failing on timeouts
    #[must_use]
    pub const fn without_throwing(mut self) -> Self {
        self.throw_on_presence_failure = false;
        self.throw_on_absence_failure = false;
        self
    }

    fn retry_config(&self, budget: RetryBudget) -> RetryConfig {
        RetryConfig::new(self.timeout.unwrap_or(budget.timeout))
            .with_poll_interval(self.poll_interval.unwrap_or(budget.interval))
    }
}

impl Session {
    /// Wait until the component reaches `until`.
    ///
    /// Returns `false` when a unit timed out and throwing is disabled for it.
    pub fn wait(&mut self, component: ComponentId, until: Until, options: WaitOptions) -> PomarResult<bool> {
        let full_name = self.full_name(component)?;
        let config = options.retry_config(self.config().waiting());
        let locator = Rc::clone(&self.tree.node(component)?.scope_locator);

        for unit in until.units() {
            let (visibility, want_found) = unit.state.lookup_target();
            let lookup = SearchOptions::safely_at_once().with_visibility(visibility);
            let section = LogSection::wait(&full_name, &unit.state.to_string());
            let outcome = self.execute_section(section, |session| {
                poll(&config, || {
                    let found = locator.get_element(session, &lookup)?.is_some();
                    Ok(if found == want_found {
                        Probe::Ready(())
                    } else if found {
                        Probe::Pending("present".to_string())
                    } else {
                        Probe::Pending("missing".to_string())
                    })
                })
            })?;
            self.clear_scope_cache(component)?;

            if let PollOutcome::Expired { last_state, .. } = outcome {
                let throw = if unit.state.is_presence() {
                    options.throw_on_presence_failure
                } else {
                    options.throw_on_absence_failure
                };
                if throw {
                    return Err(PomarError::Timeout {
                        what: format!("{full_name} to be {}", unit.state),
                        ms: config.timeout.as_millis() as u64,
                        last_state,
                    });
                }
                return Ok(false);
            }
        }
        Ok(true)
    }
}
