pub mod due_digests;
pub mod profiles;
pub mod quiz_results;
pub mod review_items;
