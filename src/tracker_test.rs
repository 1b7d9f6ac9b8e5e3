#[cfg(test)]
mod tests {
    use crate::selector::ObjectFilter;
    use crate::tracker::*;
    use crate::watch::EventType;
    use crate::Error;
    use serde_json::{json, Value};

    fn widgets() -> (GVR, GVK) {
        (
            GVR::new("example.com", "v1", "widgets"),
            GVK::new("example.com", "v1", "Widget"),
        )
    }

    fn create_test_object(name: &str, namespace: &str) -> Value {
        json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {
                "name": name,
                "namespace": namespace,
            },
            "spec": {
                "size": 1
            }
        })
    }

    fn rv(object: &Value) -> u64 {
        object["metadata"]["resourceVersion"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn test_add_assigns_initial_metadata() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();

        let added = tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        assert_eq!(added["metadata"]["resourceVersion"], "1");
        assert_eq!(added["metadata"]["namespace"], "default");
        assert!(added["metadata"]["uid"].is_string());
        assert!(added["metadata"]["creationTimestamp"].is_string());
    }

    #[test]
    fn test_add_replaces_caller_resource_version() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let mut obj = create_test_object("a", "default");
        obj["metadata"]["resourceVersion"] = json!("42");

        let added = tracker.add(&gvr, &gvk, obj, "default").unwrap();
        assert_eq!(added["metadata"]["resourceVersion"], "1");
    }

    #[test]
    fn test_add_fills_namespace_and_type_meta() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let obj = json!({ "metadata": { "name": "a" } });

        let added = tracker.add(&gvr, &gvk, obj, "team-a").unwrap();
        assert_eq!(added["metadata"]["namespace"], "team-a");
        assert_eq!(added["apiVersion"], "example.com/v1");
        assert_eq!(added["kind"], "Widget");
    }

    #[test]
    fn test_add_duplicate_fails_and_keeps_original() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let mut dup = create_test_object("a", "default");
        dup["spec"]["size"] = json!(99);
        let result = tracker.add(&gvr, &gvk, dup, "default");
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));

        let stored = tracker.get(&gvr, "default", "a").unwrap();
        assert_eq!(stored["spec"]["size"], 1);
        assert_eq!(stored["metadata"]["resourceVersion"], "1");
    }

    #[test]
    fn test_same_name_in_other_namespace_is_distinct() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "one"), "one")
            .unwrap();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "two"), "two")
            .unwrap();

        assert!(tracker.get(&gvr, "one", "a").is_ok());
        assert!(tracker.get(&gvr, "two", "a").is_ok());
    }

    #[test]
    fn test_add_rejects_namespace_mismatch() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();

        let result = tracker.add(&gvr, &gvk, create_test_object("a", "other"), "default");
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_empty_request_namespace_keeps_object_namespace() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();

        let added = tracker
            .add(&gvr, &gvk, create_test_object("a", "team-a"), "")
            .unwrap();
        assert_eq!(added["metadata"]["namespace"], "team-a");

        let stored = tracker.get(&gvr, "team-a", "a").unwrap();
        assert_eq!(stored["metadata"]["namespace"], "team-a");
        assert!(tracker.get(&gvr, "", "a").is_err());
        assert_eq!(
            tracker.list(&gvr, "team-a", &ObjectFilter::everything()).unwrap().len(),
            1
        );

        let mut replacement = stored.clone();
        replacement["spec"]["size"] = json!(2);
        let updated = tracker.update(&gvr, &gvk, replacement, "").unwrap();
        assert_eq!(updated["metadata"]["namespace"], "team-a");
        assert_eq!(updated["metadata"]["resourceVersion"], "2");
        assert_eq!(tracker.get(&gvr, "team-a", "a").unwrap()["spec"]["size"], 2);
    }

    #[test]
    fn test_update_rejects_namespace_mismatch() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "other"), "other")
            .unwrap();

        let mut moved = create_test_object("a", "other");
        moved["spec"]["size"] = json!(5);
        let err = tracker.update(&gvr, &gvk, moved, "default").unwrap_err();
        assert!(err.is_invalid());

        assert_eq!(tracker.get(&gvr, "default", "a").unwrap()["spec"]["size"], 1);
        assert_eq!(tracker.get(&gvr, "other", "a").unwrap()["spec"]["size"], 1);
    }

    #[test]
    fn test_add_requires_name() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();

        let result = tracker.add(&gvr, &gvk, json!({ "metadata": {} }), "default");
        assert!(matches!(result, Err(Error::Invalid(_))));

        let result = tracker.add(&gvr, &gvk, json!({ "spec": {} }), "default");
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_malformed_metadata_is_invalid() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();

        let no_metadata = json!({ "apiVersion": "example.com/v1", "kind": "Widget" });
        let err = tracker.add(&gvr, &gvk, no_metadata, "default").unwrap_err();
        assert!(err.is_invalid());

        let mut bad_labels = create_test_object("a", "default");
        bad_labels["metadata"]["labels"] = json!("oops");
        let err = tracker.add(&gvr, &gvk, bad_labels, "default").unwrap_err();
        assert!(err.is_invalid());

        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();
        let mut bad_update = create_test_object("a", "default");
        bad_update["metadata"]["labels"] = json!(["not", "a", "map"]);
        let err = tracker.update(&gvr, &gvk, bad_update, "default").unwrap_err();
        assert!(err.is_invalid());

        let err = tracker.add(&gvr, &gvk, json!("scalar"), "default").unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_add_expands_generate_name() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let obj = json!({ "metadata": { "generateName": "widget-" } });

        let added = tracker.add(&gvr, &gvk, obj, "default").unwrap();
        let name = added["metadata"]["name"].as_str().unwrap();
        assert!(name.starts_with("widget-"));
        assert_eq!(name.len(), "widget-".len() + 5);
        assert!(tracker.get(&gvr, "default", name).is_ok());
    }

    #[test]
    fn test_get_returns_a_copy() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let mut copy = tracker.get(&gvr, "default", "a").unwrap();
        copy["spec"]["size"] = json!(1000);

        let stored = tracker.get(&gvr, "default", "a").unwrap();
        assert_eq!(stored["spec"]["size"], 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let tracker = ObjectTracker::new();
        let (gvr, _) = widgets();

        let err = tracker.get(&gvr, "default", "missing").unwrap_err();
        match err {
            Error::NotFound {
                kind,
                name,
                namespace,
            } => {
                assert_eq!(kind, "widgets");
                assert_eq!(name, "missing");
                assert_eq!(namespace, "default");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_list_is_ordered_by_name_and_scoped() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        for (name, ns) in [("c", "default"), ("a", "default"), ("b", "other"), ("b", "default")] {
            tracker
                .add(&gvr, &gvk, create_test_object(name, ns), ns)
                .unwrap();
        }

        let names = |items: Vec<Value>| -> Vec<String> {
            items
                .iter()
                .map(|o| {
                    format!(
                        "{}/{}",
                        o["metadata"]["namespace"].as_str().unwrap(),
                        o["metadata"]["name"].as_str().unwrap()
                    )
                })
                .collect()
        };

        let default_list = tracker
            .list(&gvr, "default", &ObjectFilter::everything())
            .unwrap();
        assert_eq!(names(default_list), vec!["default/a", "default/b", "default/c"]);

        let all_list = tracker.list(&gvr, "", &ObjectFilter::everything()).unwrap();
        assert_eq!(
            names(all_list),
            vec!["default/a", "default/b", "other/b", "default/c"]
        );
    }

    #[test]
    fn test_list_unknown_resource_is_empty() {
        let tracker = ObjectTracker::new();
        let list = tracker
            .list(&GVR::new("", "v1", "pods"), "default", &ObjectFilter::everything())
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_list_applies_selectors() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let mut red = create_test_object("red", "default");
        red["metadata"]["labels"] = json!({ "color": "red" });
        let mut blue = create_test_object("blue", "default");
        blue["metadata"]["labels"] = json!({ "color": "blue" });
        tracker.add(&gvr, &gvk, red, "default").unwrap();
        tracker.add(&gvr, &gvk, blue, "default").unwrap();

        let filter = ObjectFilter::new(Some("color=red"), None).unwrap();
        let list = tracker.list(&gvr, "default", &filter).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["metadata"]["name"], "red");

        let filter = ObjectFilter::new(None, Some("metadata.name!=red")).unwrap();
        let list = tracker.list(&gvr, "default", &filter).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["metadata"]["name"], "blue");
    }

    #[test]
    fn test_update_increments_resource_version() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let mut current = tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let mut last = rv(&current);
        for size in 2..6 {
            current["spec"]["size"] = json!(size);
            current = tracker.update(&gvr, &gvk, current, "default").unwrap();
            let next = rv(&current);
            assert!(next > last, "resource version must strictly increase");
            last = next;
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_update_with_stale_version_conflicts() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let v1 = tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let mut first = v1.clone();
        first["spec"]["size"] = json!(2);
        tracker.update(&gvr, &gvk, first, "default").unwrap();

        let mut stale = v1;
        stale["spec"]["size"] = json!(3);
        let result = tracker.update(&gvr, &gvk, stale, "default");
        assert!(matches!(result, Err(Error::Conflict(_))));

        let stored = tracker.get(&gvr, "default", "a").unwrap();
        assert_eq!(stored["spec"]["size"], 2);
    }

    #[test]
    fn test_update_without_version_is_unconditional() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let mut replacement = create_test_object("a", "default");
        replacement["spec"]["size"] = json!(7);
        let updated = tracker.update(&gvr, &gvk, replacement, "default").unwrap();
        assert_eq!(updated["metadata"]["resourceVersion"], "2");
        assert_eq!(updated["spec"]["size"], 7);
    }

    #[test]
    fn test_update_preserves_uid_and_creation_timestamp() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let added = tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let mut replacement = create_test_object("a", "default");
        replacement["metadata"]["uid"] = json!("forged");
        let updated = tracker.update(&gvr, &gvk, replacement, "default").unwrap();
        assert_eq!(updated["metadata"]["uid"], added["metadata"]["uid"]);
        assert_eq!(
            updated["metadata"]["creationTimestamp"],
            added["metadata"]["creationTimestamp"]
        );
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();

        let result = tracker.update(&gvr, &gvk, create_test_object("a", "default"), "default");
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_delete_returns_removed_copy() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();

        let removed = tracker.delete(&gvr, "default", "a").unwrap();
        assert_eq!(removed["metadata"]["name"], "a");
        assert!(matches!(
            tracker.get(&gvr, "default", "a"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            tracker.delete(&gvr, "default", "a"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_mutations_emit_events_matching_later_reads() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        let mut watch = tracker.watch(&gvr, "default", ObjectFilter::everything());

        let added = tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();
        let event = watch.try_recv().unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(event.resource_version, 1);
        assert_eq!(event.object, tracker.get(&gvr, "default", "a").unwrap());

        let mut modified = added;
        modified["spec"]["size"] = json!(5);
        tracker.update(&gvr, &gvk, modified, "default").unwrap();
        let event = watch.try_recv().unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Modified);
        assert_eq!(event.resource_version, 2);
        assert_eq!(event.object, tracker.get(&gvr, "default", "a").unwrap());

        let removed = tracker.delete(&gvr, "default", "a").unwrap();
        let event = watch.try_recv().unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Deleted);
        assert_eq!(event.object, removed);

        assert!(watch.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_failed_mutations_emit_nothing() {
        let tracker = ObjectTracker::new();
        let (gvr, gvk) = widgets();
        tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .unwrap();
        let mut watch = tracker.watch(&gvr, "", ObjectFilter::everything());

        assert!(tracker
            .add(&gvr, &gvk, create_test_object("a", "default"), "default")
            .is_err());
        assert!(tracker.delete(&gvr, "default", "missing").is_err());

        assert!(watch.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_gvr_display() {
        assert_eq!(GVR::new("", "v1", "pods").to_string(), "v1/pods");
        assert_eq!(
            GVR::new("apps", "v1", "deployments").to_string(),
            "apps/v1/deployments"
        );
    }
}
