//! Property-based tests for client frames

use cinder::shared::ClientFrame;
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn test_blank_event_names_are_rejected(spaces in " {0,6}") {
        let text = json!({ "event": spaces }).to_string();
        prop_assert!(ClientFrame::parse(&text).is_err());
    }

    #[test]
    fn test_missing_data_reads_as_empty_object(event in "[a-z]{1,8}(\\.[a-z]{1,8}){0,2}") {
        let frame = ClientFrame::parse(&json!({ "event": event }).to_string()).unwrap();
        prop_assert_eq!(frame.body(), json!({}));
    }

    #[test]
    fn test_non_object_text_never_parses(text in "[^{]*") {
        prop_assert!(ClientFrame::parse(&text).is_err());
    }
}
