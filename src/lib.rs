//! Orchestration for modal sub-flow dialogs rendered as isolated documents
//! inside nested iframes: a debounced request queue per root context, a
//! correlation-id keyed dialog stack, a per-dialog lifecycle state machine,
//! and return dispatch back to the opening component.
//!
//! The crate is single-threaded by design and expects to run inside a tokio
//! current-thread runtime with a `LocalSet` driving its spawned tasks.

pub mod dialog;
pub mod navigator;
pub mod orchestrator;
pub mod poll;
pub mod request;
pub mod session;
pub mod stack;
pub mod widget;
pub mod window;

pub use dialog::{DialogState, DialogWidget};
pub use navigator::{InstantDriver, ManualDriver, NavigationDriver};
pub use orchestrator::{Orchestrator, PARENT_REFRESH_BEHAVIOR};
pub use request::{
    frame_url, BehaviorEvent, BehaviorParam, Behaviors, DialogOptions, DialogRequest,
    DIALOG_CID_PARAM,
};
pub use session::Session;
pub use widget::{create_widget, InvokerWidget, RootWidget, Widget, WidgetConfig};
pub use window::{find_root_window, AjaxQueue, Frame, LoadedPage, WindowContext, BLANK_TARGET};
