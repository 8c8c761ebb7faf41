use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;

use crate::window::{Frame, LoadedPage};

/// Source of iframe load signals. `begin` is called when a frame is pointed
/// at a new target; the driver later completes the navigation with
/// [`Frame::finish_load`]. A navigation it never completes models a stalled
/// iframe.
pub trait NavigationDriver {
    fn begin(&self, frame: Rc<Frame>, url: String);
}

/// Driver that completes every navigation on the next scheduler turn with a
/// fixed page shape.
pub struct InstantDriver {
    page: LoadedPage,
}

impl InstantDriver {
    pub fn new() -> Rc<Self> {
        Self::with_page(LoadedPage::default())
    }

    pub fn with_page(page: LoadedPage) -> Rc<Self> {
        Rc::new(Self { page })
    }
}

impl NavigationDriver for InstantDriver {
    fn begin(&self, frame: Rc<Frame>, url: String) {
        debug!(target: "window", %url, "completing frame navigation");
        let page = self.page.clone();
        tokio::task::spawn_local(async move {
            frame.finish_load(page);
        });
    }
}

/// Driver that parks navigations until the embedder completes them,
/// one at a time and with a page shape of its choosing.
#[derive(Default)]
pub struct ManualDriver {
    pending: RefCell<VecDeque<PendingNavigation>>,
}

pub struct PendingNavigation {
    pub frame: Rc<Frame>,
    pub url: String,
}

impl ManualDriver {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn pending_urls(&self) -> Vec<String> {
        self.pending
            .borrow()
            .iter()
            .map(|navigation| navigation.url.clone())
            .collect()
    }

    /// Complete the oldest pending navigation with `page`. Returns false
    /// when nothing is pending.
    pub fn complete_next(&self, page: LoadedPage) -> bool {
        let Some(navigation) = self.pending.borrow_mut().pop_front() else {
            return false;
        };
        navigation.frame.finish_load(page);
        true
    }

    /// Discard the oldest pending navigation, leaving its frame stalled.
    pub fn abandon_next(&self) -> bool {
        self.pending.borrow_mut().pop_front().is_some()
    }
}

impl NavigationDriver for ManualDriver {
    fn begin(&self, frame: Rc<Frame>, url: String) {
        debug!(target: "window", %url, "holding frame navigation for manual completion");
        self.pending
            .borrow_mut()
            .push_back(PendingNavigation { frame, url });
    }
}
