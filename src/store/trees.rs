pub const BEHAVIORAL_PROFILES: &str = "behavioral_profiles";
pub const REVIEW_ITEMS: &str = "review_items";
pub const QUIZ_RESULTS: &str = "quiz_results";
pub const DUE_DIGESTS: &str = "due_digests";
pub const SCHEMA_META: &str = "schema_meta";

// Secondary index trees
pub const REVIEW_DUE_INDEX: &str = "review_due_index";
pub const REVIEW_ITEM_ORDER: &str = "review_item_order";
