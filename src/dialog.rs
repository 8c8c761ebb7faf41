//! Dialog lifecycle control: container and iframe construction, load
//! handling, chrome updates, and teardown. One [`DialogWidget`] drives one
//! dialog instance from creation to removal.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use html_escape::encode_double_quoted_attribute;
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use thiserror::Error;
use tracing::{debug, warn};

use crate::poll::{spawn_poller, wait_until, PollHandle, PollStep};
use crate::request::{frame_url, Behaviors, DialogRequest};
use crate::stack::{
    CONTAINER_CID_ATTR, CONTAINER_WIDGET_ATTR, REMOVAL_MARK_ATTR,
};
use crate::widget::{
    create_widget, dialog_widget_var, invoker_widget_var, root_widget_var, InvokerWidget,
    RootWidget, Widget, WidgetConfig,
};
use crate::window::{remove_class, set_attr, Frame, WindowContext};

pub const DEFAULT_FRAME_WIDTH: u32 = 640;
const HEIGHT_OFFSET: u32 = 20;
const RESIZE_POLL: Duration = Duration::from_millis(500);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Class hiding a freshly created container until its first load completes.
const HIDDEN_CLASS: &str = "ui-overlay-hidden";

/// Lifecycle of a dialog instance.
///
/// `PendingCreate` ends when the iframe signals its first load; a frame that
/// never loads parks the dialog here for good. `Hidden` covers the teardown
/// window in which the container still exists but is queued for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    PendingCreate,
    Loaded,
    Visible,
    Hidden,
    Destroyed,
}

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("dialog container markup failed to parse")]
    ContainerMarkup,
    #[error("dialog container has no iframe element")]
    MissingFrame,
}

/// Visual container bound 1:1 to a correlation id at a stack depth, plus the
/// state machine driving it. Registered in the root context's widget
/// registry under the var its container advertises.
pub struct DialogWidget {
    var: String,
    cfg: WidgetConfig,
    request: DialogRequest,
    state: Cell<DialogState>,
    container: NodeRef,
    frame: Rc<Frame>,
    /// Context the cooperating widgets bind to: the root, or the content
    /// context of the deepest prior match's iframe.
    owning: Rc<WindowContext>,
    root: Weak<WindowContext>,
    /// Cooperating widgets this dialog itself registered; torn down with it.
    created_root_widget: RefCell<Option<Rc<RootWidget>>>,
    created_invoker_widget: RefCell<Option<Rc<InvokerWidget>>>,
    resize_poller: RefCell<Option<PollHandle>>,
    last_height: Cell<u32>,
}

impl DialogWidget {
    /// Create the container under the root body and start the first
    /// navigation. The new dialog stays hidden until the frame loads.
    pub(crate) fn open(
        root: &Rc<WindowContext>,
        owning: Rc<WindowContext>,
        request: DialogRequest,
    ) -> Result<Rc<Self>, DialogError> {
        let dialog_id = format!("{}_dlg", request.source_component_id);
        let var = dialog_widget_var(&request.source_component_id);
        let container = build_container(&dialog_id, &var, &request)?;
        let frame_element = container
            .select_first("iframe")
            .map_err(|_| DialogError::MissingFrame)?
            .as_node()
            .clone();
        root.body().append(container.clone());

        let frame = Frame::new(frame_element, root);
        let width = request.options.content_width.unwrap_or(DEFAULT_FRAME_WIDTH);
        set_attr(frame.element(), "width", &width.to_string());
        if let Some(title) = &request.options.iframe_title {
            set_attr(frame.element(), "title", title);
        }

        let cfg = WidgetConfig {
            id: dialog_id,
            source_component_id: Some(request.source_component_id.clone()),
            form_id: None,
            behaviors: request.behaviors.clone(),
        };
        let target = request
            .url
            .as_ref()
            .map(|url| frame_url(url, &request.correlation_id));
        let widget = Rc::new(Self {
            var,
            cfg,
            request,
            state: Cell::new(DialogState::PendingCreate),
            container,
            frame,
            owning,
            root: Rc::downgrade(root),
            created_root_widget: RefCell::new(None),
            created_invoker_widget: RefCell::new(None),
            resize_poller: RefCell::new(None),
            last_height: Cell::new(0),
        });
        create_widget(root, Rc::clone(&widget) as Rc<dyn Widget>);

        let on_load = Rc::downgrade(&widget);
        widget.frame.on_load(Rc::new(move || {
            if let Some(widget) = on_load.upgrade() {
                widget.handle_load();
            }
        }));

        match target {
            Some(target) => widget.frame.navigate(&target),
            None => debug!(target: "dialog", id = %widget.cfg.id, "open request without url; frame left unnavigated"),
        }
        Ok(widget)
    }

    pub fn state(&self) -> DialogState {
        self.state.get()
    }

    pub fn container(&self) -> &NodeRef {
        &self.container
    }

    pub fn frame(&self) -> &Rc<Frame> {
        &self.frame
    }

    pub fn correlation_id(&self) -> &str {
        &self.request.correlation_id
    }

    /// Load signal from the iframe. The first one finishes creation:
    /// cooperating widgets register, chrome adjusts, the dialog shows.
    /// Later ones mean the target changed in place and only re-adjust
    /// chrome.
    pub(crate) fn handle_load(self: &Rc<Self>) {
        match self.state.get() {
            DialogState::Hidden | DialogState::Destroyed => {}
            DialogState::PendingCreate => {
                self.state.set(DialogState::Loaded);
                self.register_cooperating_widgets();
                self.adjust_title();
                self.adjust_height();
                self.show();
            }
            DialogState::Loaded | DialogState::Visible => {
                self.adjust_title();
                self.adjust_height();
            }
        }
    }

    /// Apply a change request: width, title, and/or navigation target, with
    /// no state transition.
    pub(crate) fn apply_change(&self, request: &DialogRequest) {
        if let Some(width) = request.options.content_width {
            set_attr(self.frame.element(), "width", &width.to_string());
        }
        if let Some(title) = &request.options.iframe_title {
            set_attr(self.frame.element(), "title", title);
        }
        if let Some(url) = &request.url {
            self.frame.navigate(&frame_url(url, &request.correlation_id));
        }
    }

    /// Take the dialog out of the live stack and schedule its removal. The
    /// container is gone only once the frame's in-flight work has drained.
    pub(crate) fn hide(self: &Rc<Self>) {
        match self.state.get() {
            DialogState::Loaded | DialogState::Visible => {}
            other => {
                warn!(
                    target: "dialog",
                    id = %self.cfg.id,
                    state = ?other,
                    "ignoring hide for dialog that is not shown"
                );
                return;
            }
        }

        set_attr(&self.container, REMOVAL_MARK_ATTR, "true");
        self.state.set(DialogState::Hidden);
        if let Some(poller) = self.resize_poller.borrow_mut().take() {
            poller.cancel();
        }

        let content = self.frame.content();
        let widget = Rc::clone(self);
        tokio::task::spawn_local(async move {
            if let Some(content) = content.filter(|content| content.has_framework()) {
                wait_until(DRAIN_POLL, move || content.ajax().is_empty()).await;
            }
            widget.destroy();
        });
    }

    fn register_cooperating_widgets(&self) {
        let root_var = root_widget_var(&self.request.correlation_id);
        if self.owning.widgets().lookup(&root_var).is_none() {
            let cfg = WidgetConfig {
                id: format!(
                    "{}:{}",
                    self.request.correlation_id, self.request.invocation_id
                ),
                source_component_id: Some(self.request.source_component_id.clone()),
                form_id: None,
                behaviors: self.request.behaviors.clone(),
            };
            let root_widget = RootWidget::new(root_var, cfg);
            create_widget(&self.owning, Rc::clone(&root_widget) as Rc<dyn Widget>);
            *self.created_root_widget.borrow_mut() = Some(root_widget);
        }

        if self.request.source_widget_var.is_none() {
            let invoker_var = invoker_widget_var(&self.request.source_component_id);
            if self.owning.widgets().lookup(&invoker_var).is_none() {
                let cfg = WidgetConfig {
                    id: self.request.invocation_id.clone(),
                    source_component_id: Some(self.request.source_component_id.clone()),
                    form_id: None,
                    behaviors: Behaviors::new(),
                };
                let invoker = InvokerWidget::new(invoker_var, cfg);
                create_widget(&self.owning, Rc::clone(&invoker) as Rc<dyn Widget>);
                *self.created_invoker_widget.borrow_mut() = Some(invoker);
            }
        }
    }

    fn adjust_title(&self) {
        let Some(content) = self.frame.content() else {
            return;
        };
        let Some(title) = content.title() else {
            return;
        };
        let Ok(span) = self.container.select_first("span.ui-dialog-title") else {
            return;
        };
        let span = span.as_node();
        let existing: Vec<NodeRef> = span.children().collect();
        for child in existing {
            child.detach();
        }
        span.append(NodeRef::new_text(title));
    }

    fn adjust_height(self: &Rc<Self>) {
        if let Some(height) = self.request.options.content_height {
            set_attr(self.frame.element(), "height", &height.to_string());
            return;
        }
        let Some(content) = self.frame.content() else {
            return;
        };
        let height = content.content_height() + HEIGHT_OFFSET;
        self.last_height.set(height);
        set_attr(self.frame.element(), "height", &height.to_string());
        self.start_auto_resize();
    }

    /// Track the framed document's body height until teardown.
    fn start_auto_resize(self: &Rc<Self>) {
        if self.resize_poller.borrow().is_some() {
            return;
        }
        let tracked = Rc::downgrade(self);
        let handle = spawn_poller(RESIZE_POLL, move || {
            let Some(widget) = tracked.upgrade() else {
                return PollStep::Done;
            };
            if matches!(
                widget.state.get(),
                DialogState::Hidden | DialogState::Destroyed
            ) {
                return PollStep::Done;
            }
            let Some(content) = widget.frame.content() else {
                return PollStep::Continue;
            };
            let height = content.content_height() + HEIGHT_OFFSET;
            if height != widget.last_height.get() {
                widget.last_height.set(height);
                set_attr(widget.frame.element(), "height", &height.to_string());
            }
            PollStep::Continue
        });
        *self.resize_poller.borrow_mut() = Some(handle);
    }

    fn show(&self) {
        remove_class(&self.container, HIDDEN_CLASS);
        self.state.set(DialogState::Visible);
        debug!(target: "dialog", id = %self.cfg.id, cid = %self.request.correlation_id, "dialog visible");
    }

    /// Terminal transition: blank the frame, drop the container, clear every
    /// widget slot this dialog claimed. Slots a successor already reclaimed
    /// are left alone.
    fn destroy(self: &Rc<Self>) {
        if self.state.get() == DialogState::Destroyed {
            return;
        }
        self.frame.blank();
        self.container.detach();
        if let Some(poller) = self.resize_poller.borrow_mut().take() {
            poller.cancel();
        }
        if let Some(root) = self.root.upgrade() {
            let as_widget: Rc<dyn Widget> = Rc::clone(self) as Rc<dyn Widget>;
            root.widgets().remove_if_current(&self.var, &as_widget);
        }
        if let Some(root_widget) = self.created_root_widget.borrow_mut().take() {
            let var = root_widget.widget_var().to_string();
            self.owning
                .widgets()
                .remove_if_current(&var, &(root_widget as Rc<dyn Widget>));
        }
        if let Some(invoker) = self.created_invoker_widget.borrow_mut().take() {
            let var = invoker.widget_var().to_string();
            self.owning
                .widgets()
                .remove_if_current(&var, &(invoker as Rc<dyn Widget>));
        }
        self.state.set(DialogState::Destroyed);
        debug!(target: "dialog", id = %self.cfg.id, cid = %self.request.correlation_id, "dialog destroyed");
    }
}

impl Widget for DialogWidget {
    fn widget_var(&self) -> &str {
        &self.var
    }

    fn config(&self) -> &WidgetConfig {
        &self.cfg
    }

    fn root_element(&self) -> Option<NodeRef> {
        Some(self.container.clone())
    }

    fn init(&self) {
        debug!(target: "widget", var = %self.var, id = %self.cfg.id, "dialog widget registered");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

fn build_container(
    dialog_id: &str,
    widget_var: &str,
    request: &DialogRequest,
) -> Result<NodeRef, DialogError> {
    let options = &request.options;

    let mut classes = String::from(
        "ui-dialog ui-widget ui-widget-content ui-corner-all ui-shadow ui-hidden-container",
    );
    classes.push(' ');
    classes.push_str(HIDDEN_CLASS);
    if options.modal {
        classes.push_str(" ui-dialog-modal");
    }
    if options.resizable {
        classes.push_str(" ui-dialog-resizable");
    }
    if options.draggable {
        classes.push_str(" ui-dialog-draggable");
    }

    let mut style = String::new();
    if let Some(width) = &options.width {
        style.push_str(&format!("width:{width};"));
    }
    if let Some(height) = &options.height {
        style.push_str(&format!("height:{height};"));
    }

    let mut attributes = format!(
        r#"id="{}" class="{classes}""#,
        encode_double_quoted_attribute(dialog_id)
    );
    if !style.is_empty() {
        attributes.push_str(&format!(
            r#" style="{}""#,
            encode_double_quoted_attribute(&style)
        ));
    }
    attributes.push_str(&format!(
        r#" {CONTAINER_CID_ATTR}="{}" {CONTAINER_WIDGET_ATTR}="{}""#,
        encode_double_quoted_attribute(&request.correlation_id),
        encode_double_quoted_attribute(widget_var)
    ));

    let close_icon = if options.closable {
        r##"<a class="ui-dialog-titlebar-icon ui-dialog-titlebar-close ui-corner-all" href="#" role="button"><span class="ui-icon ui-icon-closethick"></span></a>"##
    } else {
        ""
    };

    let markup = format!(
        r#"<div {attributes}><div class="ui-dialog-titlebar ui-widget-header ui-helper-clearfix ui-corner-top"><span class="ui-dialog-title"></span>{close_icon}</div><div class="ui-dialog-content ui-widget-content"><iframe frameborder="0"></iframe></div></div>"#
    );
    let fragment = kuchiki::parse_html().one(markup.as_str());
    let container = fragment
        .select_first("div.ui-dialog")
        .map_err(|_| DialogError::ContainerMarkup)?
        .as_node()
        .clone();
    container.detach();
    Ok(container)
}
