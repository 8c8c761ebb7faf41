use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

use crate::window::WindowContext;

/// Query-string key under which the correlation id travels to the iframe
/// document.
pub const DIALOG_CID_PARAM: &str = "pfdlgcid";

/// Bytes escaped when appending the correlation id to a frame URL. Colons
/// stay literal so component-path ids like `form:btn` keep their shape in
/// the query string.
const CID_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'&')
    .add(b'+')
    .add(b'=')
    .add(b'%');

/// Callback registered under a behavior name on a dialog request.
pub type BehaviorFn = Rc<dyn Fn(&BehaviorEvent)>;

/// Named behavior callbacks carried by a request.
pub type Behaviors = HashMap<String, BehaviorFn>;

/// Payload handed to a behavior callback when it fires.
pub struct BehaviorEvent {
    /// Window context the behavior is invoked against.
    pub window: Rc<WindowContext>,
    pub params: Vec<BehaviorParam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorParam {
    pub name: String,
    pub value: String,
}

/// A single open/close/change request. Immutable once enqueued; consumed
/// exactly once by the flush that drains it.
#[derive(Clone)]
pub struct DialogRequest {
    pub correlation_id: String,
    pub invocation_id: String,
    pub source_component_id: String,
    /// Widget var of the invoking component, when the host page already
    /// registered one. Left empty, a var is derived and the invoker widget
    /// is registered lazily on first load.
    pub source_widget_var: Option<String>,
    pub url: Option<String>,
    pub behaviors: Behaviors,
    pub options: DialogOptions,
}

impl DialogRequest {
    pub fn new(
        correlation_id: impl Into<String>,
        invocation_id: impl Into<String>,
        source_component_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            invocation_id: invocation_id.into(),
            source_component_id: source_component_id.into(),
            source_widget_var: None,
            url: None,
            behaviors: Behaviors::new(),
            options: DialogOptions::default(),
        }
    }
}

impl fmt::Debug for DialogRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut behavior_names: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
        behavior_names.sort_unstable();
        f.debug_struct("DialogRequest")
            .field("correlation_id", &self.correlation_id)
            .field("invocation_id", &self.invocation_id)
            .field("source_component_id", &self.source_component_id)
            .field("source_widget_var", &self.source_widget_var)
            .field("url", &self.url)
            .field("behaviors", &behavior_names)
            .field("options", &self.options)
            .finish()
    }
}

/// Dialog chrome and sizing options, in the camelCase shape the host page
/// posts them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogOptions {
    pub closable: bool,
    pub resizable: bool,
    pub modal: bool,
    pub draggable: bool,
    /// Container width/height, CSS values.
    pub width: Option<String>,
    pub height: Option<String>,
    /// Iframe width in pixels; defaults to 640 when absent.
    pub content_width: Option<u32>,
    /// Fixed iframe height in pixels. Absent, the height auto-tracks the
    /// framed document's body.
    pub content_height: Option<u32>,
    pub iframe_title: Option<String>,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self {
            closable: true,
            resizable: true,
            modal: false,
            draggable: true,
            width: None,
            height: None,
            content_width: None,
            content_height: None,
            iframe_title: None,
        }
    }
}

/// Navigation target for a dialog iframe: `url` with the correlation id
/// appended under [`DIALOG_CID_PARAM`], unless the query already carries
/// that key.
pub fn frame_url(url: &str, correlation_id: &str) -> String {
    let query = url.split_once('?').map(|(_, query)| query);
    let already_tagged = query.is_some_and(|query| {
        url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == DIALOG_CID_PARAM)
    });
    if already_tagged {
        return url.to_string();
    }

    let separator = if query.is_some() { '&' } else { '?' };
    format!(
        "{url}{separator}{DIALOG_CID_PARAM}={}",
        utf8_percent_encode(correlation_id, CID_VALUE)
    )
}
