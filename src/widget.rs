use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use kuchiki::NodeRef;
use tracing::debug;

use crate::request::Behaviors;
use crate::window::WindowContext;

/// Configuration holder shared by every widget kind.
pub struct WidgetConfig {
    pub id: String,
    pub source_component_id: Option<String>,
    /// Id of the form enclosing the triggering component, when known.
    pub form_id: Option<String>,
    pub behaviors: Behaviors,
}

impl fmt::Debug for WidgetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut behavior_names: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
        behavior_names.sort_unstable();
        f.debug_struct("WidgetConfig")
            .field("id", &self.id)
            .field("source_component_id", &self.source_component_id)
            .field("form_id", &self.form_id)
            .field("behaviors", &behavior_names)
            .finish()
    }
}

/// Base widget capability set: a name in the registry, a configuration
/// holder, an optional root DOM handle, and an init lifecycle hook.
pub trait Widget: 'static {
    fn widget_var(&self) -> &str;

    fn config(&self) -> &WidgetConfig;

    fn root_element(&self) -> Option<NodeRef> {
        None
    }

    fn init(&self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Lookup-by-name widget registry, one per window context.
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: RefCell<HashMap<String, Rc<dyn Widget>>>,
}

impl WidgetRegistry {
    pub fn lookup(&self, widget_var: &str) -> Option<Rc<dyn Widget>> {
        self.widgets.borrow().get(widget_var).cloned()
    }

    pub fn contains(&self, widget_var: &str) -> bool {
        self.widgets.borrow().contains_key(widget_var)
    }

    pub fn remove(&self, widget_var: &str) -> Option<Rc<dyn Widget>> {
        self.widgets.borrow_mut().remove(widget_var)
    }

    /// Remove `widget_var` only while it still resolves to `widget`. A
    /// successor registered under the same var survives its predecessor's
    /// teardown.
    pub fn remove_if_current(&self, widget_var: &str, widget: &Rc<dyn Widget>) -> bool {
        let mut widgets = self.widgets.borrow_mut();
        let Some(current) = widgets.get(widget_var) else {
            return false;
        };
        if Rc::as_ptr(current) as *const () != Rc::as_ptr(widget) as *const () {
            return false;
        }
        widgets.remove(widget_var);
        true
    }

    pub fn len(&self) -> usize {
        self.widgets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.borrow().is_empty()
    }

    fn insert(&self, widget_var: String, widget: Rc<dyn Widget>) {
        self.widgets.borrow_mut().insert(widget_var, widget);
    }
}

/// Construct-and-register entry point: the widget is stored under its var in
/// the window's registry, then its init lifecycle runs.
pub fn create_widget(window: &WindowContext, widget: Rc<dyn Widget>) {
    window
        .widgets()
        .insert(widget.widget_var().to_string(), Rc::clone(&widget));
    widget.init();
}

/// Widget bound in a dialog's owning window context; its configuration is
/// what return dispatch consults when the dialog closes.
pub struct RootWidget {
    var: String,
    cfg: WidgetConfig,
}

impl RootWidget {
    pub fn new(var: String, cfg: WidgetConfig) -> Rc<Self> {
        Rc::new(Self { var, cfg })
    }
}

impl Widget for RootWidget {
    fn widget_var(&self) -> &str {
        &self.var
    }

    fn config(&self) -> &WidgetConfig {
        &self.cfg
    }

    fn init(&self) {
        debug!(target: "widget", var = %self.var, id = %self.cfg.id, "root widget registered");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Widget bound to the component that triggered a dialog, in that
/// component's frame.
pub struct InvokerWidget {
    var: String,
    cfg: WidgetConfig,
}

impl InvokerWidget {
    pub fn new(var: String, cfg: WidgetConfig) -> Rc<Self> {
        Rc::new(Self { var, cfg })
    }
}

impl Widget for InvokerWidget {
    fn widget_var(&self) -> &str {
        &self.var
    }

    fn config(&self) -> &WidgetConfig {
        &self.cfg
    }

    fn init(&self) {
        debug!(target: "widget", var = %self.var, id = %self.cfg.id, "invoker widget registered");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Var under which a dialog's root widget registers, derived from the
/// correlation id. Colons are component-path separators and map to
/// underscores.
pub fn root_widget_var(correlation_id: &str) -> String {
    format!("{}_flowdlgrootwidget", correlation_id.replace(':', "_"))
}

/// Var under which an auto-created invoker widget registers.
pub fn invoker_widget_var(source_component_id: &str) -> String {
    format!("{}_flowdlgwidget", source_component_id.replace(':', "_"))
}

/// Var under which the dialog instance itself registers in the root context.
pub fn dialog_widget_var(source_component_id: &str) -> String {
    format!("{}_dlgwidget", source_component_id.replace(':', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::ManualDriver;

    #[test]
    fn widget_vars_flatten_component_paths() {
        assert_eq!(root_widget_var("j_id1:2"), "j_id1_2_flowdlgrootwidget");
        assert_eq!(invoker_widget_var("form:open"), "form_open_flowdlgwidget");
        assert_eq!(dialog_widget_var("form:open"), "form_open_dlgwidget");
    }

    #[test]
    fn registry_round_trip() {
        let window = WindowContext::root(ManualDriver::new());
        let widget = RootWidget::new(
            "w1".to_string(),
            WidgetConfig {
                id: "c1:inv".to_string(),
                source_component_id: Some("form:open".to_string()),
                form_id: None,
                behaviors: Behaviors::new(),
            },
        );
        create_widget(&window, widget);

        let found = window.widgets().lookup("w1").expect("registered widget");
        assert_eq!(found.config().id, "c1:inv");
        assert!(found.as_any().downcast_ref::<RootWidget>().is_some());

        assert!(window.widgets().remove("w1").is_some());
        assert!(!window.widgets().contains("w1"));
    }
}
