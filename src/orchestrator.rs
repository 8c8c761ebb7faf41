//! Request queueing and the batched flush. Every open/close/change lands in
//! the root context's queues; one coalescing timer per root drains them in
//! close, open, change order and performs the per-flush return dispatch.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Duration;

use kuchiki::NodeRef;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dialog::DialogWidget;
use crate::request::{BehaviorEvent, BehaviorParam, DialogRequest, DIALOG_CID_PARAM};
use crate::stack;
use crate::widget::{root_widget_var, Widget};
use crate::window::{find_root_window, WindowContext};

/// Coalescing window: requests enqueued while the timer runs join the same
/// flush.
pub(crate) const FLUSH_DELAY: Duration = Duration::from_millis(100);

/// Behavior consulted on the parent context's root widget when a dialog
/// closes.
pub const PARENT_REFRESH_BEHAVIOR: &str = "parentRefresh";

#[derive(Default)]
struct DialogQueue {
    open: Vec<DialogRequest>,
    close: Vec<DialogRequest>,
    change: Vec<DialogRequest>,
}

impl DialogQueue {
    fn len(&self) -> usize {
        self.open.len() + self.close.len() + self.change.len()
    }
}

/// The last close a flush processed, kept for return dispatch.
struct LastClose {
    request: DialogRequest,
    parent: Option<NodeRef>,
}

/// Shared coordination state for one root context. Requests from any nested
/// frame funnel here, serializing cross-frame mutation of the dialog stack.
pub struct Orchestrator {
    window: Weak<WindowContext>,
    queues: RefCell<DialogQueue>,
    pending_flush: RefCell<Option<JoinHandle<()>>>,
    flushes: Cell<u64>,
}

impl Orchestrator {
    pub(crate) fn new(window: &Rc<WindowContext>) -> Rc<Self> {
        Rc::new(Self {
            window: Rc::downgrade(window),
            queues: RefCell::new(DialogQueue::default()),
            pending_flush: RefCell::new(None),
            flushes: Cell::new(0),
        })
    }

    /// Number of flushes run so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes.get()
    }

    /// Requests waiting for the next flush.
    pub fn queued_requests(&self) -> usize {
        self.queues.borrow().len()
    }

    pub fn enqueue_open(self: &Rc<Self>, request: DialogRequest) {
        self.queues.borrow_mut().open.push(request);
        self.schedule_flush();
    }

    pub fn enqueue_close(self: &Rc<Self>, request: DialogRequest) {
        self.queues.borrow_mut().close.push(request);
        self.schedule_flush();
    }

    pub fn enqueue_change(self: &Rc<Self>, request: DialogRequest) {
        self.queues.borrow_mut().change.push(request);
        self.schedule_flush();
    }

    /// At most one pending flush per root; re-entrant enqueues while the
    /// timer runs add no timers.
    fn schedule_flush(self: &Rc<Self>) {
        if self.pending_flush.borrow().is_some() {
            return;
        }
        let scheduled = Rc::downgrade(self);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(FLUSH_DELAY).await;
            if let Some(orchestrator) = scheduled.upgrade() {
                orchestrator.flush();
            }
        });
        *self.pending_flush.borrow_mut() = Some(handle);
    }

    /// Drain the queues: closes, then opens, then changes, then one return
    /// dispatch if any close was processed. The queues are snapshotted up
    /// front, so requests enqueued by callbacks during the flush defer to
    /// the next one. A fault on one request never blocks the rest of the
    /// batch.
    fn flush(self: &Rc<Self>) {
        self.pending_flush.borrow_mut().take();
        let batch = mem::take(&mut *self.queues.borrow_mut());
        let Some(root) = self.window.upgrade() else {
            return;
        };
        self.flushes.set(self.flushes.get() + 1);
        debug!(
            target: "flush",
            closes = batch.close.len(),
            opens = batch.open.len(),
            changes = batch.change.len(),
            "processing dialog request batch"
        );

        let mut last_close = None;
        for request in batch.close {
            last_close = Some(self.process_close(&root, request));
        }
        for request in batch.open {
            self.process_open(&root, request);
        }
        for request in &batch.change {
            self.process_change(&root, request);
        }
        if let Some(last_close) = last_close {
            self.dispatch_return(&root, last_close);
        }
    }

    fn process_close(&self, root: &Rc<WindowContext>, request: DialogRequest) -> LastClose {
        let Some(found) = stack::close_target(root, &request.correlation_id) else {
            debug!(target: "flush", cid = %request.correlation_id, "close matched no live dialog");
            return LastClose {
                request,
                parent: None,
            };
        };
        match dialog_widget_for(root, &found.target) {
            Some(widget) => widget.hide(),
            None => warn!(
                target: "flush",
                cid = %request.correlation_id,
                "container has no registered dialog widget; close skipped"
            ),
        }
        LastClose {
            request,
            parent: found.parent,
        }
    }

    fn process_open(&self, root: &Rc<WindowContext>, request: DialogRequest) {
        let dialog_id = format!("{}_dlg", request.source_component_id);
        if stack::live_element_with_id(root, &dialog_id) {
            debug!(target: "flush", id = %dialog_id, "dialog element already present; open ignored");
            return;
        }
        let owning = match stack::open_parent(root, &request.correlation_id) {
            Some(parent) => dialog_widget_for(root, &parent)
                .and_then(|widget| widget.frame().content())
                .unwrap_or_else(|| Rc::clone(root)),
            None => Rc::clone(root),
        };
        if let Err(error) = DialogWidget::open(root, owning, request) {
            warn!(target: "flush", %error, "failed to open dialog");
        }
    }

    fn process_change(&self, root: &Rc<WindowContext>, request: &DialogRequest) {
        let matches = stack::matching_containers(root, &request.correlation_id);
        let Some(target) = matches.last() else {
            debug!(target: "flush", cid = %request.correlation_id, "change matched no live dialog");
            return;
        };
        match dialog_widget_for(root, target) {
            Some(widget) => widget.apply_change(request),
            None => warn!(
                target: "flush",
                cid = %request.correlation_id,
                "container has no registered dialog widget; change skipped"
            ),
        }
    }

    /// Notify the opener once per flush, from the last close processed: the
    /// parent context's root widget may carry a parent-refresh behavior.
    /// Every missing link is a silent no-op.
    fn dispatch_return(&self, root: &Rc<WindowContext>, last_close: LastClose) {
        let context = last_close
            .parent
            .as_ref()
            .and_then(|parent| dialog_widget_for(root, parent))
            .and_then(|widget| widget.frame().content())
            .unwrap_or_else(|| Rc::clone(root));

        let var = root_widget_var(&last_close.request.correlation_id);
        let Some(widget) = context.widgets().lookup(&var) else {
            debug!(target: "flush", widget = %var, "no root widget for return dispatch");
            return;
        };
        let Some(behavior) = widget.config().behaviors.get(PARENT_REFRESH_BEHAVIOR).cloned()
        else {
            return;
        };
        let Some(source_component_id) = widget.config().source_component_id.clone() else {
            return;
        };

        let event = BehaviorEvent {
            window: Rc::clone(&context),
            params: vec![BehaviorParam {
                name: format!("{source_component_id}_{DIALOG_CID_PARAM}"),
                value: last_close.request.correlation_id.clone(),
            }],
        };
        behavior(&event);
    }
}

/// The dialog widget a container advertises through its widget-var
/// attribute, resolved against the root context's registry.
fn dialog_widget_for(root: &WindowContext, container: &NodeRef) -> Option<Rc<DialogWidget>> {
    let var = stack::container_attr(container, stack::CONTAINER_WIDGET_ATTR)?;
    let widget = root.widgets().lookup(&var)?;
    widget.as_any_rc().downcast::<DialogWidget>().ok()
}

impl WindowContext {
    /// Queue a dialog-open request at the root context.
    pub fn open_dialog(self: &Rc<Self>, request: DialogRequest) {
        find_root_window(self).orchestrator().enqueue_open(request);
    }

    /// Queue a dialog-close request at the root context.
    pub fn close_dialog(self: &Rc<Self>, request: DialogRequest) {
        find_root_window(self).orchestrator().enqueue_close(request);
    }

    /// Queue a dialog-change request at the root context.
    pub fn change_dialog(self: &Rc<Self>, request: DialogRequest) {
        find_root_window(self).orchestrator().enqueue_change(request);
    }
}
