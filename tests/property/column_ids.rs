//! Property tests for priority column ids.
//!
//! Column ids are the drag-and-drop destination keys, so every list id the
//! store can produce must survive formatting and parsing.

use proptest::prelude::*;
use taskboard_proto::model::{ColumnId, ListId, Priority};

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(Priority::ALL.to_vec())
}

fn arb_list_id() -> impl Strategy<Value = ListId> {
    "[^\x00]{1,64}".prop_map(ListId::new)
}

proptest! {
    #[test]
    fn formatted_column_ids_parse_back(list_id in arb_list_id(), priority in arb_priority()) {
        let column = ColumnId::new(list_id, priority);
        let parsed: ColumnId = column.to_string().parse().unwrap();
        prop_assert_eq!(parsed, column);
    }

    #[test]
    fn uuid_list_ids_parse_back(n in any::<u128>(), priority in arb_priority()) {
        let list_id = ListId::new(uuid::Uuid::from_u128(n).to_string());
        let text = format!("{list_id}-{priority}");
        let parsed: ColumnId = text.parse().unwrap();
        prop_assert_eq!(parsed.list_id, list_id);
        prop_assert_eq!(parsed.priority, priority);
    }

    #[test]
    fn arbitrary_text_never_panics(text in ".{0,128}") {
        let _ = text.parse::<ColumnId>();
    }
}
