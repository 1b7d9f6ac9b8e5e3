#[cfg(test)]
mod tests {
    use crate::action::*;
    use crate::tracker::GVR;
    use serde_json::json;

    fn pods() -> GVR {
        GVR::new("", "v1", "pods")
    }

    fn get(name: &str) -> ActionRequest {
        ActionRequest::new(Verb::Get, pods(), "default", ActionPayload::Name(name.to_string()))
    }

    #[test]
    fn test_sequence_starts_at_one_and_increments() {
        let mut history = ActionHistory::new();
        assert!(history.is_empty());

        let first = history.record(get("a"));
        let second = history.record(get("b"));

        assert_eq!(first.seq(), 1);
        assert_eq!(second.seq(), 2);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_clear_keeps_counting() {
        let mut history = ActionHistory::new();
        history.record(get("a"));
        history.record(get("b"));
        history.clear();
        assert!(history.is_empty());

        let next = history.record(get("c"));
        assert_eq!(next.seq(), 3);
        assert_eq!(history.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_records() {
        let mut history = ActionHistory::new();
        history.record(get("a"));
        let snapshot = history.snapshot();

        history.record(get("b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.snapshot().len(), 2);
    }

    #[test]
    fn test_action_carries_request_fields() {
        let mut history = ActionHistory::new();
        let request = ActionRequest::new(
            Verb::Update,
            pods(),
            "default",
            ActionPayload::Object(json!({ "metadata": { "name": "web-0" } })),
        )
        .with_subresource("status");

        let action = history.record(request);
        assert_eq!(action.verb(), Verb::Update);
        assert_eq!(action.resource(), &pods());
        assert_eq!(action.namespace(), "default");
        assert_eq!(action.subresource(), Some("status"));
        assert_eq!(action.name(), Some("web-0"));
        assert!(action.object().is_some());
        assert!(action.list_options().is_none());
    }

    #[test]
    fn test_matches_with_wildcards() {
        let mut history = ActionHistory::new();
        let action = history.record(get("a"));

        assert!(action.matches("get", "pods"));
        assert!(action.matches("*", "pods"));
        assert!(action.matches("get", "*"));
        assert!(action.matches("*", "*"));
        assert!(!action.matches("list", "pods"));
        assert!(!action.matches("get", "services"));
    }

    #[test]
    fn test_name_per_payload() {
        let mut history = ActionHistory::new();

        let patch = history.record(ActionRequest::new(
            Verb::Patch,
            pods(),
            "default",
            ActionPayload::Patch {
                name: "patched".to_string(),
                patch_type: PatchType::Merge,
                patch: json!({}),
            },
        ));
        assert_eq!(patch.name(), Some("patched"));

        let delete = history.record(ActionRequest::new(
            Verb::Delete,
            pods(),
            "default",
            ActionPayload::Delete {
                name: "deleted".to_string(),
                preconditions: Preconditions::default(),
            },
        ));
        assert_eq!(delete.name(), Some("deleted"));

        let list = history.record(ActionRequest::new(
            Verb::List,
            pods(),
            "",
            ActionPayload::Selector(ListOptions {
                label_selector: Some("app=web".to_string()),
                field_selector: None,
            }),
        ));
        assert_eq!(list.name(), None);
        assert_eq!(
            list.list_options().and_then(|o| o.label_selector.as_deref()),
            Some("app=web")
        );
    }

    #[test]
    fn test_verb_strings() {
        assert_eq!(Verb::DeleteCollection.as_str(), "delete-collection");
        assert_eq!(Verb::Watch.to_string(), "watch");
    }

    #[test]
    fn test_display() {
        let mut history = ActionHistory::new();
        let action = history.record(get("web-0"));
        assert_eq!(action.to_string(), "#1 get v1/pods -n default web-0");

        let status = history.record(
            ActionRequest::new(
                Verb::Update,
                GVR::new("apps", "v1", "deployments"),
                "",
                ActionPayload::Object(json!({ "metadata": { "name": "api" } })),
            )
            .with_subresource("status"),
        );
        assert_eq!(status.to_string(), "#2 update apps/v1/deployments/status api");
    }
}
