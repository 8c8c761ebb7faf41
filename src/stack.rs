//! Dialog stack matching over the root document body. Containers are direct
//! body children carrying the correlation id and widget var as data
//! attributes; ones already queued for removal are invisible to matching so
//! a racing request never touches a half-destroyed dialog.

use kuchiki::NodeRef;

use crate::window::{attr, has_class, WindowContext};

pub const CONTAINER_CLASS: &str = "ui-dialog";
pub const CONTAINER_CID_ATTR: &str = "data-pfdlgcid";
pub const CONTAINER_WIDGET_ATTR: &str = "data-widgetvar";
pub const REMOVAL_MARK_ATTR: &str = "data-queuedforremoval";

/// Ordered live containers for `correlation_id` among the root body's
/// children, outermost first.
pub fn matching_containers(root: &WindowContext, correlation_id: &str) -> Vec<NodeRef> {
    live_containers(root)
        .into_iter()
        .filter(|container| attr(container, CONTAINER_CID_ATTR).as_deref() == Some(correlation_id))
        .collect()
}

/// Every live container in stacking order, any correlation id.
pub fn live_containers(root: &WindowContext) -> Vec<NodeRef> {
    root.body()
        .children()
        .filter(|child| child.as_element().is_some())
        .filter(|child| has_class(child, CONTAINER_CLASS))
        .filter(|child| attr(child, REMOVAL_MARK_ATTR).is_none())
        .collect()
}

/// True when a live element with the given id exists under the root body.
/// Containers queued for removal no longer count; a close immediately
/// followed by an open for the same dialog must see the slot as free.
pub fn live_element_with_id(root: &WindowContext, id: &str) -> bool {
    root.body()
        .children()
        .filter(|child| attr(child, REMOVAL_MARK_ATTR).is_none())
        .any(|child| attr(&child, "id").as_deref() == Some(id))
}

/// Deepest live match for a close, with the next-deepest recorded as the
/// parent context for return dispatch.
pub struct CloseTarget {
    pub target: NodeRef,
    pub parent: Option<NodeRef>,
}

pub fn close_target(root: &WindowContext, correlation_id: &str) -> Option<CloseTarget> {
    let matches = matching_containers(root, correlation_id);
    let target = matches.last()?.clone();
    let parent = (matches.len() > 1).then(|| matches[matches.len() - 2].clone());
    Some(CloseTarget { target, parent })
}

/// Deepest live match for an open: the container whose iframe hosts the new
/// dialog's context. None means the new dialog attaches under the root.
pub fn open_parent(root: &WindowContext, correlation_id: &str) -> Option<NodeRef> {
    matching_containers(root, correlation_id).pop()
}

pub fn container_attr(container: &NodeRef, name: &str) -> Option<String> {
    attr(container, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::ManualDriver;
    use crate::window::set_attr;
    use kuchiki::traits::TendrilSink;
    use std::rc::Rc;

    fn root_with_containers(cids: &[&str]) -> Rc<WindowContext> {
        let root = WindowContext::root(ManualDriver::new());
        for (index, cid) in cids.iter().enumerate() {
            let markup = format!(
                r#"<div id="d{index}" class="ui-dialog" data-pfdlgcid="{cid}" data-widgetvar="w{index}"></div>"#
            );
            let fragment = kuchiki::parse_html().one(markup.as_str());
            let container = fragment
                .select_first("div.ui-dialog")
                .expect("container markup")
                .as_node()
                .clone();
            container.detach();
            root.body().append(container);
        }
        root
    }

    #[test]
    fn matches_in_stacking_order() {
        let root = root_with_containers(&["c1", "c2", "c1"]);
        let matches = matching_containers(&root, "c1");
        assert_eq!(matches.len(), 2);
        assert_eq!(container_attr(&matches[0], "id").as_deref(), Some("d0"));
        assert_eq!(container_attr(&matches[1], "id").as_deref(), Some("d2"));
    }

    #[test]
    fn removal_marked_containers_are_invisible() {
        let root = root_with_containers(&["c1", "c1"]);
        let matches = matching_containers(&root, "c1");
        set_attr(&matches[1], REMOVAL_MARK_ATTR, "true");

        let remaining = matching_containers(&root, "c1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(container_attr(&remaining[0], "id").as_deref(), Some("d0"));
        assert!(!live_element_with_id(&root, "d1"));
        assert!(live_element_with_id(&root, "d0"));
    }

    #[test]
    fn close_target_picks_deepest_and_its_parent() {
        let root = root_with_containers(&["c1", "c1", "c1"]);
        let found = close_target(&root, "c1").expect("live matches");
        assert_eq!(container_attr(&found.target, "id").as_deref(), Some("d2"));
        let parent = found.parent.expect("parent container");
        assert_eq!(container_attr(&parent, "id").as_deref(), Some("d1"));
    }

    #[test]
    fn close_target_without_siblings_has_no_parent() {
        let root = root_with_containers(&["c1"]);
        let found = close_target(&root, "c1").expect("live match");
        assert!(found.parent.is_none());
        assert!(close_target(&root, "missing").is_none());
    }

    #[test]
    fn open_parent_is_deepest_existing_match() {
        let root = root_with_containers(&["c1", "c2"]);
        let parent = open_parent(&root, "c2").expect("existing match");
        assert_eq!(container_attr(&parent, "id").as_deref(), Some("d1"));
        assert!(open_parent(&root, "c3").is_none());
    }
}
