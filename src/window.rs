use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use html_escape::encode_text;
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use tracing::warn;

use crate::navigator::NavigationDriver;
use crate::orchestrator::Orchestrator;
use crate::widget::WidgetRegistry;

/// Navigation target used when blanking an iframe during teardown.
pub const BLANK_TARGET: &str = "about:blank";

const DEFAULT_CONTENT_HEIGHT: u32 = 150;

/// A browsing context: the session root, or the content context of a loaded
/// iframe. Contexts form a tree; the root of that tree owns the shared
/// coordination state.
pub struct WindowContext {
    parent: RefCell<Weak<WindowContext>>,
    /// True when this context lives inside an iframe element.
    framed: Cell<bool>,
    /// Whether the cooperating client framework is installed here. A parent
    /// without it is a foreign boundary for root resolution.
    framework: Cell<bool>,
    document: NodeRef,
    widgets: WidgetRegistry,
    ajax: AjaxQueue,
    content_height: Cell<u32>,
    orchestrator: RefCell<Option<Rc<Orchestrator>>>,
    driver: RefCell<Option<Rc<dyn NavigationDriver>>>,
}

impl WindowContext {
    /// Root context of a host page session.
    pub(crate) fn root(driver: Rc<dyn NavigationDriver>) -> Rc<Self> {
        Rc::new(Self {
            parent: RefCell::new(Weak::new()),
            framed: Cell::new(false),
            framework: Cell::new(true),
            document: blank_document(None),
            widgets: WidgetRegistry::default(),
            ajax: AjaxQueue::default(),
            content_height: Cell::new(DEFAULT_CONTENT_HEIGHT),
            orchestrator: RefCell::new(None),
            driver: RefCell::new(Some(driver)),
        })
    }

    /// Content context produced by an iframe navigation.
    pub(crate) fn frame_content(parent: &Rc<WindowContext>, page: &LoadedPage) -> Rc<Self> {
        Rc::new(Self {
            parent: RefCell::new(Rc::downgrade(parent)),
            framed: Cell::new(true),
            framework: Cell::new(page.has_framework),
            document: blank_document(page.title.as_deref()),
            widgets: WidgetRegistry::default(),
            ajax: AjaxQueue::default(),
            content_height: Cell::new(page.content_height),
            orchestrator: RefCell::new(None),
            driver: RefCell::new(None),
        })
    }

    pub fn parent(&self) -> Option<Rc<WindowContext>> {
        self.parent.borrow().upgrade()
    }

    pub fn is_framed(&self) -> bool {
        self.framed.get()
    }

    /// Capability query: does this context host the cooperating framework?
    pub fn has_framework(&self) -> bool {
        self.framework.get()
    }

    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    /// The document body. Always present: context documents are synthesized
    /// with one.
    pub fn body(&self) -> NodeRef {
        self.document
            .select_first("body")
            .map(|body| body.as_node().clone())
            .unwrap_or_else(|_| self.document.clone())
    }

    /// Document title text, when the document carries a non-empty one.
    pub fn title(&self) -> Option<String> {
        let title = self.document.select_first("title").ok()?;
        let text = title.text_contents();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn widgets(&self) -> &WidgetRegistry {
        &self.widgets
    }

    pub fn ajax(&self) -> &AjaxQueue {
        &self.ajax
    }

    /// Scroll height of the document body, tracked by dialog auto-resize.
    pub fn content_height(&self) -> u32 {
        self.content_height.get()
    }

    pub fn set_content_height(&self, height: u32) {
        self.content_height.set(height);
    }

    /// The orchestrator owned by this context, installed on first use.
    pub fn orchestrator(self: &Rc<Self>) -> Rc<Orchestrator> {
        if let Some(existing) = self.orchestrator.borrow().as_ref() {
            return Rc::clone(existing);
        }
        let created = Orchestrator::new(self);
        *self.orchestrator.borrow_mut() = Some(Rc::clone(&created));
        created
    }

    pub(crate) fn driver(&self) -> Option<Rc<dyn NavigationDriver>> {
        self.driver.borrow().clone()
    }
}

/// Outermost context reachable from `start` through parent-frame links,
/// stopping early at a parent that does not host the framework. Pure
/// traversal; frame-parent chains are acyclic.
pub fn find_root_window(start: &Rc<WindowContext>) -> Rc<WindowContext> {
    let mut current = Rc::clone(start);
    while current.is_framed() {
        let Some(parent) = current.parent() else {
            break;
        };
        if !parent.has_framework() {
            break;
        }
        current = parent;
    }
    current
}

/// Per-context count of in-flight asynchronous operations. Teardown of a
/// dialog waits for its frame's queue to empty before removing the
/// container.
#[derive(Default)]
pub struct AjaxQueue {
    pending: Cell<usize>,
}

impl AjaxQueue {
    pub fn begin(&self) {
        self.pending.set(self.pending.get() + 1);
    }

    pub fn finish(&self) {
        let pending = self.pending.get();
        if pending > 0 {
            self.pending.set(pending - 1);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.get() == 0
    }
}

/// What a completed iframe navigation loaded.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub title: Option<String>,
    pub content_height: u32,
    pub has_framework: bool,
}

impl Default for LoadedPage {
    fn default() -> Self {
        Self {
            title: None,
            content_height: DEFAULT_CONTENT_HEIGHT,
            has_framework: true,
        }
    }
}

/// An iframe: the element in its owner's document, plus the content context
/// the current navigation produced. Navigations go through the session's
/// driver; each completed one replaces the content context.
pub struct Frame {
    element: NodeRef,
    owner: Weak<WindowContext>,
    content: RefCell<Option<Rc<WindowContext>>>,
    load_listeners: RefCell<Vec<Rc<dyn Fn()>>>,
}

impl Frame {
    pub(crate) fn new(element: NodeRef, owner: &Rc<WindowContext>) -> Rc<Self> {
        Rc::new(Self {
            element,
            owner: Rc::downgrade(owner),
            content: RefCell::new(None),
            load_listeners: RefCell::new(Vec::new()),
        })
    }

    pub fn element(&self) -> &NodeRef {
        &self.element
    }

    /// Current navigation target, as set on the element.
    pub fn src(&self) -> Option<String> {
        attr(&self.element, "src")
    }

    /// Content context of the last completed navigation.
    pub fn content(&self) -> Option<Rc<WindowContext>> {
        self.content.borrow().clone()
    }

    pub fn on_load(&self, listener: Rc<dyn Fn()>) {
        self.load_listeners.borrow_mut().push(listener);
    }

    /// Point the frame at `url` and hand the navigation to the session's
    /// driver, which delivers the load signal later.
    pub fn navigate(self: &Rc<Self>, url: &str) {
        set_attr(&self.element, "src", url);
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        let Some(driver) = find_root_window(&owner).driver() else {
            warn!(target: "window", url, "no navigation driver; frame load will never complete");
            return;
        };
        driver.begin(Rc::clone(self), url.to_string());
    }

    /// Completes a navigation: installs the freshly loaded content context
    /// and fires load listeners. Called by navigation drivers.
    pub fn finish_load(self: &Rc<Self>, page: LoadedPage) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        let content = WindowContext::frame_content(&owner, &page);
        *self.content.borrow_mut() = Some(content);
        let listeners: Vec<Rc<dyn Fn()>> = self.load_listeners.borrow().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Blank the frame during teardown: listeners go first so the blank
    /// navigation cannot re-enter dialog logic.
    pub(crate) fn blank(&self) {
        self.load_listeners.borrow_mut().clear();
        set_attr(&self.element, "src", BLANK_TARGET);
        self.content.borrow_mut().take();
    }
}

/// Synthesized context document.
fn blank_document(title: Option<&str>) -> NodeRef {
    let title = title.map(|t| encode_text(t).into_owned()).unwrap_or_default();
    let markup = format!("<html><head><title>{title}</title></head><body></body></html>");
    kuchiki::parse_html().one(markup.as_str())
}

pub(crate) fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get(name).map(str::to_string)
}

pub(crate) fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub(crate) fn remove_class(node: &NodeRef, class: &str) {
    let Some(element) = node.as_element() else {
        return;
    };
    let mut attributes = element.attributes.borrow_mut();
    let updated = attributes.get("class").map(|current| {
        current
            .split_whitespace()
            .filter(|candidate| *candidate != class)
            .collect::<Vec<_>>()
            .join(" ")
    });
    if let Some(updated) = updated {
        attributes.insert("class", updated);
    }
}

pub(crate) fn has_class(node: &NodeRef, class: &str) -> bool {
    attr(node, "class")
        .map(|classes| classes.split_whitespace().any(|candidate| candidate == class))
        .unwrap_or(false)
}
