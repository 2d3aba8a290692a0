use crate::store::StoreError;

const SEP: char = ':';

/// Key segments must be non-empty and free of the separator, otherwise prefix scans bleed
/// across users.
fn segment<'a>(kind: &str, value: &'a str) -> Result<&'a str, StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{kind} must not be empty")));
    }
    if value.contains(SEP) {
        return Err(StoreError::Validation(format!(
            "{kind} must not contain '{SEP}': {value}"
        )));
    }
    Ok(value)
}

fn ts_segment(timestamp_ms: i64) -> String {
    format!("{:020}", timestamp_ms.max(0) as u64)
}

pub fn profile_key(user_id: &str) -> Result<String, StoreError> {
    Ok(segment("user_id", user_id)?.to_string())
}

pub fn review_item_key(user_id: &str, item_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        segment("user_id", user_id)?,
        segment("item_id", item_id)?
    ))
}

pub fn review_item_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment("user_id", user_id)?))
}

/// Splits a review item key back into `(user_id, item_id)`.
pub fn parse_review_item_key(key: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(key).ok()?;
    let (user_id, item_id) = text.split_once(SEP)?;
    Some((user_id.to_string(), item_id.to_string()))
}

pub fn due_index_key(user_id: &str, due_ts_ms: i64, item_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        segment("user_id", user_id)?,
        ts_segment(due_ts_ms),
        segment("item_id", item_id)?
    ))
}

pub fn due_index_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment("user_id", user_id)?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueIndexEntry {
    pub user_id: String,
    pub due_ts_ms: i64,
    pub item_id: String,
}

pub fn parse_due_index_key(key: &[u8]) -> Option<DueIndexEntry> {
    let text = std::str::from_utf8(key).ok()?;
    let mut parts = text.splitn(3, SEP);
    let user_id = parts.next()?;
    let due_ts_ms = parts.next()?.parse::<u64>().ok()?;
    let item_id = parts.next()?;
    Some(DueIndexEntry {
        user_id: user_id.to_string(),
        due_ts_ms: i64::try_from(due_ts_ms).ok()?,
        item_id: item_id.to_string(),
    })
}

/// Ascending by completion time within a user.
pub fn quiz_result_key(
    user_id: &str,
    completed_at_ms: i64,
    result_id: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        segment("user_id", user_id)?,
        ts_segment(completed_at_ms),
        segment("result_id", result_id)?
    ))
}

pub fn quiz_result_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment("user_id", user_id)?))
}

pub fn due_digest_key(user_id: &str) -> Result<String, StoreError> {
    Ok(segment("user_id", user_id)?.to_string())
}
