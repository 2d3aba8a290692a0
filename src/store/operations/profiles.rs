use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adaptive::signals::BehavioralProfile;
use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

/// Persisted profile with its optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedProfile {
    pub version: u64,
    pub profile: BehavioralProfile,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn get_profile(&self, user_id: &str) -> Result<Option<VersionedProfile>, StoreError> {
        let key = keys::profile_key(user_id)?;
        match self.behavioral_profiles.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Writes `profile` only if the stored version still equals `expected_version`
    /// (`None` meaning "no profile stored yet"). Returns the new version.
    pub fn save_profile(
        &self,
        user_id: &str,
        profile: &BehavioralProfile,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let key = keys::profile_key(user_id)?;
        let current = self.behavioral_profiles.get(key.as_bytes())?;
        let current_version = current
            .as_ref()
            .map(|raw| Self::deserialize::<VersionedProfile>(raw).map(|p| p.version))
            .transpose()?;

        if current_version != expected_version {
            return Err(StoreError::Conflict {
                entity: "behavioral_profile".to_string(),
                key,
            });
        }

        let version = expected_version.map_or(1, |v| v + 1);
        let next = VersionedProfile {
            version,
            profile: profile.clone(),
            updated_at: Utc::now(),
        };
        let bytes = Self::serialize(&next)?;

        let swapped = self
            .behavioral_profiles
            .compare_and_swap(key.as_bytes(), current, Some(bytes))?;
        if swapped.is_err() {
            return Err(StoreError::Conflict {
                entity: "behavioral_profile".to_string(),
                key,
            });
        }

        Ok(version)
    }

    /// Load, transform, save; retried on version conflicts.
    pub fn update_profile<F>(&self, user_id: &str, mut transform: F) -> Result<VersionedProfile, StoreError>
    where
        F: FnMut(&BehavioralProfile) -> BehavioralProfile,
    {
        for attempt in 1..=MAX_CAS_RETRIES {
            let current = self.get_profile(user_id)?;
            let (base, expected) = match &current {
                Some(stored) => (stored.profile.clone(), Some(stored.version)),
                None => (BehavioralProfile::default(), None),
            };
            let next = transform(&base);

            match self.save_profile(user_id, &next, expected) {
                Ok(version) => {
                    return Ok(VersionedProfile {
                        version,
                        profile: next,
                        updated_at: Utc::now(),
                    })
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(user_id, attempt, "Profile version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "behavioral_profile".to_string(),
            key: user_id.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn delete_profile(&self, user_id: &str) -> Result<bool, StoreError> {
        let key = keys::profile_key(user_id)?;
        Ok(self.behavioral_profiles.remove(key.as_bytes())?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn profile_with_frustration(f: f64) -> BehavioralProfile {
        let mut p = BehavioralProfile::default();
        p.global.frustration = f;
        p
    }

    #[test]
    fn versions_increase_on_each_save() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        assert!(store.get_profile("u1").unwrap().is_none());
        let v1 = store.save_profile("u1", &profile_with_frustration(0.1), None).unwrap();
        let v2 = store.save_profile("u1", &profile_with_frustration(0.2), Some(v1)).unwrap();
        assert_eq!((v1, v2), (1, 2));

        let stored = store.get_profile("u1").unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.profile.global.frustration, 0.2);
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store.save_profile("u1", &profile_with_frustration(0.1), None).unwrap();
        let err = store
            .save_profile("u1", &profile_with_frustration(0.5), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn update_profile_starts_from_default() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let first = store
            .update_profile("u1", |p| {
                let mut next = p.clone();
                next.global.question_rate = 0.5;
                next
            })
            .unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .update_profile("u1", |p| {
                let mut next = p.clone();
                next.global.question_rate += 0.1;
                next
            })
            .unwrap();
        assert_eq!(second.version, 2);
        assert!((second.profile.global.question_rate - 0.6).abs() < 1e-12);
    }

    #[test]
    fn corrupt_profile_fails_fast() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        store.behavioral_profiles.insert("u1", b"{broken".to_vec()).unwrap();

        assert!(matches!(
            store.get_profile("u1"),
            Err(StoreError::Serialization(_))
        ));
        assert!(matches!(
            store.update_profile("u1", |p| p.clone()),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn delete_reports_presence() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        store.save_profile("u1", &BehavioralProfile::default(), None).unwrap();
        assert!(store.delete_profile("u1").unwrap());
        assert!(!store.delete_profile("u1").unwrap());
    }
}
