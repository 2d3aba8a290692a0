use crate::adaptive::memory::ReviewItem;
use crate::store::keys;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_review_due_index", m002_review_due_index),
        ("003_review_item_order", m003_review_item_order),
    ]
}

/// 执行所有未应用的数据库迁移。
///
/// - **幂等性要求**：每个迁移函数重复执行不会产生副作用，
///   因为进程可能在 func() 成功但 set_version() 之前中断。
/// - **进度检查点**：版本号在每个迁移成功后立即持久化。
/// - **仅向前**：set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn latest_version() -> u32 {
    migrations().len() as u32
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.schema_meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("schema version has {} bytes, expected 4", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .schema_meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuilds the due index from the item tree.
fn m002_review_due_index(store: &Store) -> Result<(), StoreError> {
    store.review_due_index.clear()?;

    let mut indexed = 0usize;
    for entry in store.review_items.iter() {
        let (key, value) = entry?;
        let Some((user_id, _)) = keys::parse_review_item_key(&key) else {
            tracing::warn!(key = %String::from_utf8_lossy(&key), "Skipping malformed review item key");
            continue;
        };
        let item: ReviewItem = Store::deserialize(&value)?;
        let due_key = keys::due_index_key(&user_id, item.next_due_at.timestamp_millis(), &item.id)?;
        store.review_due_index.insert(due_key.as_bytes(), &[])?;
        indexed += 1;
    }

    tracing::info!(indexed, "Rebuilt review due index");
    Ok(())
}

/// 为缺少插入序号的旧条目补上序号，按 key 顺序分配。
fn m003_review_item_order(store: &Store) -> Result<(), StoreError> {
    let mut assigned = 0usize;
    for entry in store.review_items.iter() {
        let (key, _) = entry?;
        if store.review_item_order.contains_key(&key)? {
            continue;
        }
        let seq = store.next_sequence()?;
        store.review_item_order.insert(&key, seq.to_be_bytes().to_vec())?;
        assigned += 1;
    }

    tracing::info!(assigned, "Backfilled review item order");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::adaptive::config::SchedulerConfig;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, latest_version());
        assert_eq!(second, latest_version());
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 3).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn due_index_is_rebuilt_from_items() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db3").to_str().unwrap()).unwrap();
        let item = ReviewItem::new("i1", None, &SchedulerConfig::default(), Utc::now());

        store.set_review_item("u1", &item).unwrap();
        store.review_due_index.clear().unwrap();
        store.review_due_index.insert("u1:00000000000000000001:ghost", &[]).unwrap();

        m002_review_due_index(&store).unwrap();

        assert_eq!(store.review_due_index.len(), 1);
        assert_eq!(store.get_due_review_items("u1", Utc::now(), 10).unwrap(), vec![item]);
    }

    #[test]
    fn order_backfill_only_fills_gaps() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db4").to_str().unwrap()).unwrap();
        let config = SchedulerConfig::default();

        store.set_review_item("u1", &ReviewItem::new("a", None, &config, Utc::now())).unwrap();
        store.set_review_item("u1", &ReviewItem::new("b", None, &config, Utc::now())).unwrap();
        let kept = store.review_item_order.get("u1:a").unwrap();
        store.review_item_order.remove("u1:b").unwrap();

        m003_review_item_order(&store).unwrap();
        m003_review_item_order(&store).unwrap();

        assert_eq!(store.review_item_order.len(), 2);
        assert_eq!(store.review_item_order.get("u1:a").unwrap(), kept);
    }
}
