use std::rc::Rc;

use crate::navigator::{InstantDriver, NavigationDriver};
use crate::window::WindowContext;

/// A top-level host page session: owns the root window context and installs
/// the orchestrator that coordinates every nested sub-flow dialog opened
/// during the page's lifetime. State is in-memory only and dies with the
/// session.
pub struct Session {
    root: Rc<WindowContext>,
}

impl Session {
    pub fn new(driver: Rc<dyn NavigationDriver>) -> Self {
        let root = WindowContext::root(driver);
        // Installed exactly once per session; nested frames reach it through
        // root resolution.
        root.orchestrator();
        Self { root }
    }

    /// Session whose frames finish loading on the next scheduler turn.
    pub fn with_instant_navigation() -> Self {
        Self::new(InstantDriver::new())
    }

    pub fn root(&self) -> &Rc<WindowContext> {
        &self.root
    }
}
