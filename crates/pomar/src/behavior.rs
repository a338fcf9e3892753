//! Interaction Behaviors
//!
//! How a component clicks, reads its content, receives a value or scrolls is
//! selected from its metadata. Every behavior runs inside an
//! `ExecuteBehavior` log section against the component's scope element and
//! recovers from stale element references.

use crate::component::ComponentId;
use crate::context::Session;
use crate::driver::{Driver, ScriptArg};
use crate::log::LogSection;
use crate::result::{PomarError, PomarResult};
use std::fmt;

/// How a click is performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClickBehavior {
    /// Driver click
    #[default]
    Native,
    /// `arguments[0].click();`
    Script,
}

/// How a text value is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueSetBehavior {
    /// Clear, then type
    #[default]
    SendKeys,
    /// Assign `value` by script
    Script,
}

/// Where the content of a component is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentSource {
    /// Rendered text
    #[default]
    Text,
    /// `textContent` property
    TextContent,
    /// `innerHTML` by script
    InnerHtml,
    /// `value` attribute
    Value,
}

/// How a component is scrolled into view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScrollBehavior {
    /// `scrollIntoView(true)`
    #[default]
    IntoView,
    /// `scrollIntoView({block: 'center'})`
    IntoViewCentered,
}

impl fmt::Display for ClickBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("Click"),
            Self::Script => f.write_str("ClickUsingScript"),
        }
    }
}

impl fmt::Display for ValueSetBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendKeys => f.write_str("SetValueUsingClearAndSendKeys"),
            Self::Script => f.write_str("SetValueUsingScript"),
        }
    }
}

impl ScrollBehavior {
    const fn script(self) -> &'static str {
        match self {
            Self::IntoView => "arguments[0].scrollIntoView(true);",
            Self::IntoViewCentered => "arguments[0].scrollIntoView({block: 'center'});",
        }
    }
}

const IN_VIEWPORT_SCRIPT: &str = "var r = arguments[0].getBoundingClientRect(); \
     return r.top >= 0 && r.left >= 0 && \
     r.bottom <= (window.innerHeight || document.documentElement.clientHeight) && \
     r.right <= (window.innerWidth || document.documentElement.clientWidth);";

impl Session {
    fn behavior<T>(&self, component: ComponentId) -> PomarResult<T>
    where
        T: crate::metadata::AttributeKind + Copy + Default,
    {
        Ok(self
            .tree
            .node(component)?
            .metadata
            .get::<T>()
            .copied()
            .unwrap_or_default())
    }

    fn run_behavior<T, F>(&mut self, component: ComponentId, name: &str, mut action: F) -> PomarResult<T>
    where
        F: FnMut(&mut dyn Driver, &crate::driver::ElementHandle) -> PomarResult<T>,
    {
        let full_name = self.full_name(component)?;
        self.execute_section(LogSection::execute_behavior(name, &full_name), |session| {
            session.with_scope(component, |session, element| action(session.driver_mut(), element))
        })
    }

    /// Click using the component's [`ClickBehavior`]
    pub fn execute_click(&mut self, component: ComponentId) -> PomarResult<()> {
        let behavior: ClickBehavior = self.behavior(component)?;
        self.run_behavior(component, &behavior.to_string(), |driver, element| {
            match behavior {
                ClickBehavior::Native => driver.click(element)?,
                ClickBehavior::Script => {
                    let _ = driver.execute_script(
                        "arguments[0].click();",
                        &[ScriptArg::Element(element.clone())],
                    )?;
                }
            }
            Ok(())
        })
    }

    /// Double click
    pub fn execute_double_click(&mut self, component: ComponentId) -> PomarResult<()> {
        self.run_behavior(component, "DoubleClick", |driver, element| {
            Ok(driver.double_click(element)?)
        })
    }

    /// Move the pointer over the component
    pub fn execute_hover(&mut self, component: ComponentId) -> PomarResult<()> {
        self.run_behavior(component, "Hover", |driver, element| Ok(driver.hover(element)?))
    }

    /// Focus by script
    pub fn execute_focus(&mut self, component: ComponentId) -> PomarResult<()> {
        self.run_behavior(component, "Focus", |driver, element| {
            let _ = driver.execute_script("arguments[0].focus();", &[ScriptArg::Element(element.clone())])?;
            Ok(())
        })
    }

    /// Blur by script
    pub fn execute_blur(&mut self, component: ComponentId) -> PomarResult<()> {
        self.run_behavior(component, "Blur", |driver, element| {
            let _ = driver.execute_script("arguments[0].blur();", &[ScriptArg::Element(element.clone())])?;
            Ok(())
        })
    }

    /// Enter text using the component's [`ValueSetBehavior`]
    pub fn execute_set_text(&mut self, component: ComponentId, value: &str) -> PomarResult<()> {
        let behavior: ValueSetBehavior = self.behavior(component)?;
        self.run_behavior(component, &behavior.to_string(), |driver, element| {
            match behavior {
                ValueSetBehavior::SendKeys => {
                    driver.clear(element)?;
                    if !value.is_empty() {
                        driver.send_keys(element, value)?;
                    }
                }
                ValueSetBehavior::Script => set_value_by_script(driver, element, value)?,
            }
            Ok(())
        })
    }

    /// Assign the `value` property by script
    pub fn set_value_by_script(&mut self, component: ComponentId, value: &str) -> PomarResult<()> {
        self.run_behavior(component, "SetValueUsingScript", |driver, element| {
            set_value_by_script(driver, element, value)
        })
    }

    /// Read the content from `source`
    pub fn read_content(&mut self, component: ComponentId, source: ContentSource) -> PomarResult<String> {
        self.with_scope(component, |session, element| {
            let driver = session.driver_mut();
            let content = match source {
                ContentSource::Text => driver.text(element)?,
                ContentSource::TextContent => driver
                    .attribute(element, "textContent")?
                    .unwrap_or_default(),
                ContentSource::Value => driver.attribute(element, "value")?.unwrap_or_default(),
                ContentSource::InnerHtml => {
                    let value = driver.execute_script(
                        "return arguments[0].innerHTML;",
                        &[ScriptArg::Element(element.clone())],
                    )?;
                    match value {
                        serde_json::Value::String(html) => html,
                        serde_json::Value::Null => String::new(),
                        other => {
                            return Err(PomarError::Script {
                                message: format!("innerHTML returned {other}"),
                            })
                        }
                    }
                }
            };
            Ok(content)
        })
    }

    /// Content source declared in metadata
    pub fn content_source(&self, component: ComponentId) -> PomarResult<ContentSource> {
        self.behavior(component)
    }

    /// Scroll the component into view using its [`ScrollBehavior`]
    pub fn scroll_into_view(&mut self, component: ComponentId) -> PomarResult<()> {
        let behavior: ScrollBehavior = self.behavior(component)?;
        self.run_behavior(component, "ScrollTo", |driver, element| {
            let _ = driver.execute_script(behavior.script(), &[ScriptArg::Element(element.clone())])?;
            Ok(())
        })
    }

    /// Whether the component's box lies inside the viewport
    pub fn is_in_viewport(&mut self, component: ComponentId) -> PomarResult<bool> {
        self.with_scope(component, |session, element| {
            let value = session
                .driver_mut()
                .execute_script(IN_VIEWPORT_SCRIPT, &[ScriptArg::Element(element.clone())])?;
            Ok(value.as_bool().unwrap_or(false))
        })
    }
}

fn set_value_by_script(
    driver: &mut dyn Driver,
    element: &crate::driver::ElementHandle,
    value: &str,
) -> PomarResult<()> {
    let _ = driver.execute_script(
        "arguments[0].value = arguments[1];",
        &[
            ScriptArg::Element(element.clone()),
            ScriptArg::Value(serde_json::Value::String(value.to_string())),
        ],
    )?;
    Ok(())
}
