//! Execution Log and Artifacts (Feature 9)
//!
//! Sections wrap every trigger, behavior, element find, wait and navigation
//! with start/end entries carrying elapsed time and outcome. Entries go to the
//! `tracing` subscriber and into a bounded in-memory journal that tests can
//! inspect. Screenshots taken by triggers are handed to registered
//! [`ScreenshotConsumer`]s.
//!
//! ## Toyota Way Application
//!
//! - **Genchi Genbutsu**: The journal shows what actually ran, in order
//! - **Mieruka**: Section nesting makes the trigger pipeline visible

use crate::result::{PomarError, PomarResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;
use uuid::Uuid;

/// Default journal capacity
pub const DEFAULT_LOG_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// SECTIONS
// =============================================================================

/// Kind of a log section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogSectionKind {
    /// A trigger running for an event
    ExecuteTrigger,
    /// A behavior (click, set value, ...) running
    ExecuteBehavior,
    /// A scope element lookup
    ElementFind,
    /// A wait unit
    Wait,
    /// A verification retry
    Verification,
    /// Navigation to a URL or window
    Navigation,
    /// User-defined
    Custom,
}

/// Severity of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Very detailed
    Trace,
    /// Diagnostics
    Debug,
    /// Regular progress
    Info,
    /// Suspicious
    Warn,
    /// Failure
    Error,
}

/// Descriptor of a section about to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSection {
    /// Kind
    pub kind: LogSectionKind,
    /// Human readable message
    pub message: String,
    /// Level of the start/end entries
    pub level: LogLevel,
}

impl LogSection {
    /// Section with the default level of its kind
    #[must_use]
    pub fn new(kind: LogSectionKind, message: impl Into<String>) -> Self {
        let level = match kind {
            LogSectionKind::ElementFind | LogSectionKind::ExecuteBehavior => LogLevel::Trace,
            LogSectionKind::ExecuteTrigger | LogSectionKind::Wait => LogLevel::Debug,
            _ => LogLevel::Info,
        };
        Self {
            kind,
            message: message.into(),
            level,
        }
    }

    /// Override the level
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// `Execute {trigger} trigger on {event} against {component}`
    #[must_use]
    pub fn execute_trigger(trigger: &str, event: &str, component: &str) -> Self {
        Self::new(
            LogSectionKind::ExecuteTrigger,
            format!("Execute {trigger} trigger on {event} against {component}"),
        )
    }

    /// `Execute {behavior} behavior against {component}`
    #[must_use]
    pub fn execute_behavior(behavior: &str, component: &str) -> Self {
        Self::new(
            LogSectionKind::ExecuteBehavior,
            format!("Execute {behavior} behavior against {component}"),
        )
    }

    /// `Find element of {component}`
    #[must_use]
    pub fn element_find(component: &str) -> Self {
        Self::new(
            LogSectionKind::ElementFind,
            format!("Find element of {component}"),
        )
    }

    /// `Wait until {component} is {state}`
    #[must_use]
    pub fn wait(component: &str, state: &str) -> Self {
        Self::new(
            LogSectionKind::Wait,
            format!("Wait until {component} is {state}"),
        )
    }

    /// `Go to {target}`
    #[must_use]
    pub fn navigation(target: &str) -> Self {
        Self::new(LogSectionKind::Navigation, format!("Go to {target}"))
    }
}

// =============================================================================
// JOURNAL
// =============================================================================

/// Outcome of a finished section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionOutcome {
    /// Completed
    Ok,
    /// Failed with an error
    Failed {
        /// Error message
        error: String,
    },
}

/// What an entry records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntryKind {
    /// Section started
    SectionStart,
    /// Section ended
    SectionEnd {
        /// Elapsed time
        elapsed_ms: u64,
        /// Outcome
        outcome: SectionOutcome,
    },
    /// Plain message
    Message,
}

/// One journal record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number
    pub seq: u64,
    /// RFC 3339 wall-clock time
    pub timestamp: String,
    /// Section nesting depth
    pub depth: usize,
    /// Section id for start/end entries
    pub section_id: Option<String>,
    /// Section kind for start/end entries
    pub section_kind: Option<LogSectionKind>,
    /// Level
    pub level: LogLevel,
    /// Message
    pub message: String,
    /// Record kind
    pub kind: LogEntryKind,
}

#[derive(Debug)]
struct OpenSection {
    id: String,
    section: LogSection,
    started: Instant,
}

/// Log capability: section bookkeeping plus a bounded journal
#[derive(Debug)]
pub struct LogManager {
    entries: VecDeque<LogEntry>,
    open: Vec<OpenSection>,
    max_entries: usize,
    seq: u64,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_MAX_ENTRIES)
    }
}

impl LogManager {
    /// Manager keeping at most `max_entries` records
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            open: Vec::new(),
            max_entries: max_entries.max(1),
            seq: 0,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.max_entries {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn entry(
        &mut self,
        level: LogLevel,
        message: String,
        kind: LogEntryKind,
        section: Option<(&str, LogSectionKind)>,
    ) -> LogEntry {
        self.seq += 1;
        LogEntry {
            seq: self.seq,
            timestamp: chrono::Local::now().to_rfc3339(),
            depth: self.open.len(),
            section_id: section.map(|(id, _)| id.to_string()),
            section_kind: section.map(|(_, kind)| kind),
            level,
            message,
            kind,
        }
    }

    /// Open a section
    pub fn start_section(&mut self, section: LogSection) {
        let id = Uuid::new_v4().to_string();
        tracing::debug!(
            kind = ?section.kind,
            depth = self.open.len(),
            "> {}",
            section.message
        );
        let entry = self.entry(
            section.level,
            section.message.clone(),
            LogEntryKind::SectionStart,
            Some((&id, section.kind)),
        );
        self.push(entry);
        self.open.push(OpenSection {
            id,
            section,
            started: Instant::now(),
        });
    }

    /// Close the innermost section
    pub fn end_section(&mut self, error: Option<&PomarError>) {
        let Some(open) = self.open.pop() else {
            tracing::warn!("log section ended without a matching start");
            return;
        };
        let elapsed_ms = open.started.elapsed().as_millis() as u64;
        let outcome = match error {
            None => {
                tracing::debug!(kind = ?open.section.kind, elapsed_ms, "< {}", open.section.message);
                SectionOutcome::Ok
            }
            Some(e) => {
                tracing::debug!(
                    kind = ?open.section.kind,
                    elapsed_ms,
                    error = %e,
                    "< {} (failed)",
                    open.section.message
                );
                SectionOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        let level = if error.is_some() {
            LogLevel::Error
        } else {
            open.section.level
        };
        let entry = self.entry(
            level,
            open.section.message,
            LogEntryKind::SectionEnd {
                elapsed_ms,
                outcome,
            },
            Some((&open.id, open.section.kind)),
        );
        self.push(entry);
    }

    /// Record an info message
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        let entry = self.entry(LogLevel::Info, message, LogEntryKind::Message, None);
        self.push(entry);
    }

    /// Record a trace message
    pub fn trace(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::trace!("{message}");
        let entry = self.entry(LogLevel::Trace, message, LogEntryKind::Message, None);
        self.push(entry);
    }

    /// Journal in order
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Section start entries of a kind
    #[must_use]
    pub fn section_starts(&self, kind: LogSectionKind) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == LogEntryKind::SectionStart && e.section_kind == Some(kind))
            .collect()
    }

    /// Number of started sections of a kind whose message contains `text`
    #[must_use]
    pub fn count_sections(&self, kind: LogSectionKind, text: &str) -> usize {
        self.section_starts(kind)
            .iter()
            .filter(|e| e.message.contains(text))
            .count()
    }

    /// Depth of currently open sections
    #[must_use]
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Drop the journal
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Journal as JSON
    pub fn to_json(&self) -> PomarResult<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }
}

/// Install a `tracing` subscriber for test runs.
///
/// Honors `RUST_LOG`, defaults to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// SCREENSHOTS
// =============================================================================

/// A screenshot handed to consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotInfo {
    /// 1-based number within the session
    pub number: usize,
    /// Optional title
    pub title: Option<String>,
    /// Name of the active page, if any
    pub page_name: Option<String>,
    /// PNG bytes
    pub png: Vec<u8>,
}

impl ScreenshotInfo {
    /// File name: `01 - Page - Title.png`
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut name = format!("{:02}", self.number);
        for part in [&self.page_name, &self.title].into_iter().flatten() {
            name.push_str(" - ");
            name.push_str(part);
        }
        let name = Regex::new(r#"[\\/:*?"<>|]"#)
            .map(|re| re.replace_all(&name, "_").into_owned())
            .unwrap_or(name);
        format!("{name}.png")
    }
}

/// Artifacts capability: receives screenshots
pub trait ScreenshotConsumer: fmt::Debug {
    /// Consume a screenshot
    fn take(&mut self, info: &ScreenshotInfo) -> PomarResult<()>;
}

/// Writes screenshots as PNG files into a directory
#[derive(Debug, Clone)]
pub struct FileScreenshotConsumer {
    directory: PathBuf,
}

impl FileScreenshotConsumer {
    /// Consumer writing into `directory` (created on first use)
    #[must_use]
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Target directory
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ScreenshotConsumer for FileScreenshotConsumer {
    fn take(&mut self, info: &ScreenshotInfo) -> PomarResult<()> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(info.file_name());
        fs::write(&path, &info.png)?;
        tracing::info!(path = %path.display(), "screenshot saved");
        Ok(())
    }
}

/// Keeps screenshots in memory; clones share storage
#[derive(Debug, Clone, Default)]
pub struct MemoryScreenshotConsumer {
    shots: Rc<RefCell<Vec<ScreenshotInfo>>>,
}

impl MemoryScreenshotConsumer {
    /// Empty consumer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Screenshots taken so far
    #[must_use]
    pub fn shots(&self) -> Vec<ScreenshotInfo> {
        self.shots.borrow().clone()
    }

    /// Number of screenshots taken
    #[must_use]
    pub fn len(&self) -> usize {
        self.shots.borrow().len()
    }

    /// Whether nothing was taken
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScreenshotConsumer for MemoryScreenshotConsumer {
    fn take(&mut self, info: &ScreenshotInfo) -> PomarResult<()> {
        self.shots.borrow_mut().push(info.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod log_manager_tests {
        use super::*;

        #[test]
        fn test_sections_nest() {
            let mut log = LogManager::default();
            log.start_section(LogSection::navigation("https://example.com/"));
            log.start_section(LogSection::element_find("\"Home\" page"));
            assert_eq!(log.depth(), 2);
            log.end_section(None);
            log.end_section(None);

            let entries: Vec<_> = log.entries().collect();
            assert_eq!(entries.len(), 4);
            assert_eq!(entries[0].depth, 0);
            assert_eq!(entries[1].depth, 1);
            assert_eq!(entries[1].section_id, entries[2].section_id);
            assert!(matches!(entries[3].kind, LogEntryKind::SectionEnd { .. }));
        }

        #[test]
        fn test_failed_section_records_error() {
            let mut log = LogManager::default();
            log.start_section(LogSection::wait("\"Ok\" button", "visible"));
            let err = PomarError::invalid_state("boom");
            log.end_section(Some(&err));
            let last = log.entries().last().unwrap();
            assert_eq!(last.level, LogLevel::Error);
            match &last.kind {
                LogEntryKind::SectionEnd { outcome, .. } => {
                    assert!(matches!(outcome, SectionOutcome::Failed { error } if error.contains("boom")));
                }
                other => panic!("unexpected entry {other:?}"),
            }
        }

        #[test]
        fn test_journal_is_bounded() {
            let mut log = LogManager::new(3);
            for i in 0..5 {
                log.info(format!("message {i}"));
            }
            let messages: Vec<_> = log.entries().map(|e| e.message.clone()).collect();
            assert_eq!(messages, vec!["message 2", "message 3", "message 4"]);
        }

        #[test]
        fn test_count_sections() {
            let mut log = LogManager::default();
            for _ in 0..2 {
                log.start_section(LogSection::execute_trigger("LogInfo", "BeforeClick", "\"Ok\" button"));
                log.end_section(None);
            }
            assert_eq!(log.count_sections(LogSectionKind::ExecuteTrigger, "LogInfo"), 2);
            assert_eq!(log.count_sections(LogSectionKind::Wait, ""), 0);
        }

        #[test]
        fn test_unbalanced_end_is_ignored() {
            let mut log = LogManager::default();
            log.end_section(None);
            assert_eq!(log.entries().count(), 0);
        }

        #[test]
        fn test_to_json() {
            let mut log = LogManager::default();
            log.info("hello");
            let json = log.to_json().unwrap();
            assert!(json.contains("hello"));
        }
    }

    mod screenshot_tests {
        use super::*;

        fn info(title: Option<&str>) -> ScreenshotInfo {
            ScreenshotInfo {
                number: 3,
                title: title.map(String::from),
                page_name: Some("Sign In".into()),
                png: vec![1, 2, 3],
            }
        }

        #[test]
        fn test_file_name_sanitized() {
            assert_eq!(info(Some("a/b")).file_name(), "03 - Sign In - a_b.png");
            assert_eq!(info(None).file_name(), "03 - Sign In.png");
        }

        #[test]
        fn test_file_consumer_writes_png() {
            let dir = tempfile::tempdir().unwrap();
            let mut consumer = FileScreenshotConsumer::new(dir.path().join("shots"));
            consumer.take(&info(Some("before click"))).unwrap();
            let written = fs::read(dir.path().join("shots/03 - Sign In - before click.png")).unwrap();
            assert_eq!(written, vec![1, 2, 3]);
        }

        #[test]
        fn test_memory_consumer_shares_storage() {
            let consumer = MemoryScreenshotConsumer::new();
            let mut sink = consumer.clone();
            sink.take(&info(None)).unwrap();
            assert_eq!(consumer.len(), 1);
            assert!(!consumer.is_empty());
        }
    }
}
