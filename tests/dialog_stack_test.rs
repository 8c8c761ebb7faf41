//! Stack behavior: nesting by correlation id, de-duplication, and the
//! close-then-reopen race.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use flowdialog::stack::{container_attr, matching_containers};
use flowdialog::widget::{dialog_widget_var, root_widget_var};
use flowdialog::{
    BehaviorEvent, DialogRequest, DialogState, DialogWidget, LoadedPage, ManualDriver, Session,
    Widget, WindowContext, PARENT_REFRESH_BEHAVIOR,
};
use tokio::task::LocalSet;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

fn dialog_widget(root: &Rc<WindowContext>, source_component_id: &str) -> Rc<DialogWidget> {
    let widget = root
        .widgets()
        .lookup(&dialog_widget_var(source_component_id))
        .expect("dialog widget registered");
    widget
        .as_any_rc()
        .downcast::<DialogWidget>()
        .ok()
        .expect("dialog widget type")
}

fn logging_request(
    cid: &str,
    invocation: &str,
    source: &str,
    log: &Rc<RefCell<Vec<String>>>,
    label: &str,
) -> DialogRequest {
    let mut request = DialogRequest::new(cid, invocation, source);
    request.url = Some(format!("/flow/{invocation}"));
    let log = Rc::clone(log);
    let label = label.to_string();
    request.behaviors.insert(
        PARENT_REFRESH_BEHAVIOR.to_string(),
        Rc::new(move |_event: &BehaviorEvent| log.borrow_mut().push(label.clone())),
    );
    request
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn nested_stack_closes_inward_out_and_rebinds_the_parent_context() {
    LocalSet::new()
        .run_until(async {
            let driver = ManualDriver::new();
            let session = Session::new(driver.clone());
            let root = session.root();
            let log = Rc::new(RefCell::new(Vec::new()));

            // Three dialogs sharing one correlation chain, each invoked from
            // a deeper frame.
            for (invocation, source, label) in [
                ("i1", "src:a", "outer"),
                ("i2", "src:b", "middle"),
                ("i3", "src:d", "inner"),
            ] {
                root.open_dialog(logging_request("c", invocation, source, &log, label));
                settle().await;
                assert!(driver.complete_next(LoadedPage::default()));
            }
            assert_eq!(matching_containers(root, "c").len(), 3);

            let outer = dialog_widget(root, "src:a");
            let middle = dialog_widget(root, "src:b");
            let outer_frame_context = outer.frame().content().expect("outer content");
            let middle_frame_context = middle.frame().content().expect("middle content");

            // Each depth registered the shared-id root widget one frame up.
            assert!(root.widgets().contains(&root_widget_var("c")));
            assert!(outer_frame_context.widgets().contains(&root_widget_var("c")));
            assert!(middle_frame_context
                .widgets()
                .contains(&root_widget_var("c")));

            // First close removes the innermost dialog; dispatch reaches the
            // root widget living in the middle dialog's frame.
            root.close_dialog(DialogRequest::new("c", "i3", "src:d"));
            settle().await;
            assert_eq!(log.borrow().as_slice(), ["inner"]);
            assert_eq!(matching_containers(root, "c").len(), 2);

            // Subsequent changes target the now-deepest dialog.
            let mut change = DialogRequest::new("c", "i4", "src:b");
            change.options.content_width = Some(777);
            root.change_dialog(change);
            settle().await;
            assert_eq!(
                container_attr(middle.frame().element(), "width").as_deref(),
                Some("777")
            );
            assert_eq!(
                container_attr(outer.frame().element(), "width").as_deref(),
                Some("640")
            );

            // Closing the middle dialog makes the outer one the parent
            // context: dispatch targets the root widget in its frame.
            root.close_dialog(DialogRequest::new("c", "i5", "src:b"));
            settle().await;
            assert_eq!(log.borrow().as_slice(), ["inner", "middle"]);
            assert_eq!(matching_containers(root, "c").len(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn closing_without_a_live_instance_is_a_noop() {
    LocalSet::new()
        .run_until(async {
            let session = Session::new(ManualDriver::new());
            let root = session.root();

            root.close_dialog(DialogRequest::new("ghost", "i1", "src:a"));
            settle().await;

            assert_eq!(root.orchestrator().flush_count(), 1);
            assert_eq!(root.body().children().count(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn opening_the_same_correlation_id_twice_keeps_one_instance() {
    LocalSet::new()
        .run_until(async {
            let driver = ManualDriver::new();
            let session = Session::new(driver.clone());
            let root = session.root();

            let open = |invocation: &str| {
                let mut request = DialogRequest::new("c1", invocation, "src:a");
                request.url = Some("/flow".to_string());
                request
            };

            root.open_dialog(open("i1"));
            root.open_dialog(open("i2"));
            settle().await;
            assert_eq!(matching_containers(root, "c1").len(), 1);

            root.open_dialog(open("i3"));
            settle().await;
            assert_eq!(matching_containers(root, "c1").len(), 1);
            assert_eq!(root.orchestrator().flush_count(), 2);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn close_then_open_in_one_tick_replaces_the_instance() {
    LocalSet::new()
        .run_until(async {
            let driver = ManualDriver::new();
            let session = Session::new(driver.clone());
            let root = session.root();

            let mut first = DialogRequest::new("c1", "i1", "src:a");
            first.url = Some("/one".to_string());
            root.open_dialog(first);
            settle().await;
            assert!(driver.complete_next(LoadedPage::default()));
            let old = dialog_widget(root, "src:a");
            assert_eq!(old.state(), DialogState::Visible);

            // Same tick: tear down the old instance, then create the new one.
            root.close_dialog(DialogRequest::new("c1", "i2", "src:a"));
            let mut second = DialogRequest::new("c1", "i3", "src:a");
            second.url = Some("/two".to_string());
            root.open_dialog(second);
            settle().await;

            let live = matching_containers(root, "c1");
            assert_eq!(live.len(), 1, "exactly one live instance after the flush");
            let replacement = dialog_widget(root, "src:a");
            assert!(!Rc::ptr_eq(&old, &replacement));
            assert_eq!(
                replacement.frame().src().as_deref(),
                Some("/two?pfdlgcid=c1")
            );
            assert_eq!(replacement.state(), DialogState::PendingCreate);

            // The old container finishes draining and disappears; the
            // replacement keeps its registry slot.
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(old.state(), DialogState::Destroyed);
            assert_eq!(root.body().children().count(), 1);
            assert!(Rc::ptr_eq(
                &dialog_widget(root, "src:a"),
                &replacement
            ));
        })
        .await;
}
