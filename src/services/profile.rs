use std::collections::{HashMap, HashSet};

use crate::{db::RequestStore, error::AppResult, models::BookRequestRecord};

/// Per-request view of what a user likes, built from their request history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub username: String,
    pub authors: HashMap<String, u32>,
    pub narrators: HashMap<String, u32>,
    /// ASINs the user already requested, never recommended back
    pub requested: HashSet<String>,
    /// Requested ASINs newest first, used as implicit seeds
    pub requested_order: Vec<String>,
}

impl UserProfile {
    /// Builds a profile from history records ordered newest first
    pub fn from_records(username: &str, records: &[BookRequestRecord]) -> Self {
        let mut profile = UserProfile {
            username: username.to_string(),
            ..Default::default()
        };

        for record in records {
            for author in &record.authors {
                *profile.authors.entry(author.clone()).or_insert(0) += 1;
            }
            for narrator in &record.narrators {
                *profile.narrators.entry(narrator.clone()).or_insert(0) += 1;
            }
            if profile.requested.insert(record.asin.clone()) {
                profile.requested_order.push(record.asin.clone());
            }
        }

        profile
    }

    pub fn has_history(&self) -> bool {
        !self.requested.is_empty()
    }

    pub fn author_count(&self, author: &str) -> u32 {
        self.authors.get(author).copied().unwrap_or(0)
    }

    pub fn narrator_count(&self, narrator: &str) -> u32 {
        self.narrators.get(narrator).copied().unwrap_or(0)
    }
}

/// Loads the most recent `limit` request records and folds them into a profile
pub async fn build_profile(
    store: &dyn RequestStore,
    username: &str,
    limit: i64,
) -> AppResult<UserProfile> {
    let records = store.history(username, limit).await?;
    let profile = UserProfile::from_records(username, &records);

    tracing::debug!(
        username = %username,
        records = records.len(),
        authors = profile.authors.len(),
        narrators = profile.narrators.len(),
        "User profile built"
    );

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockRequestStore;
    use crate::test_support::record;

    #[test]
    fn test_from_records_counts_authors_and_narrators() {
        let mut first = record("B1", "alice", "Brandon Sanderson");
        first.narrators = vec!["Michael Kramer".to_string(), "Kate Reading".to_string()];
        let mut second = record("B2", "alice", "Brandon Sanderson");
        second.narrators = vec!["Michael Kramer".to_string()];
        let third = record("B3", "alice", "N. K. Jemisin");

        let profile = UserProfile::from_records("alice", &[first, second, third]);

        assert_eq!(profile.author_count("Brandon Sanderson"), 2);
        assert_eq!(profile.author_count("N. K. Jemisin"), 1);
        assert_eq!(profile.narrator_count("Michael Kramer"), 2);
        assert_eq!(profile.narrator_count("Kate Reading"), 1);
        assert_eq!(profile.requested_order, vec!["B1", "B2", "B3"]);
    }

    #[test]
    fn test_duplicate_requests_keep_first_position() {
        let records = vec![
            record("B2", "bob", "A"),
            record("B1", "bob", "A"),
            record("B2", "bob", "A"),
        ];
        let profile = UserProfile::from_records("bob", &records);

        assert_eq!(profile.requested.len(), 2);
        assert_eq!(profile.requested_order, vec!["B2", "B1"]);
        assert_eq!(profile.author_count("A"), 3);
    }

    #[test]
    fn test_empty_history() {
        let profile = UserProfile::from_records("carol", &[]);
        assert!(!profile.has_history());
        assert!(profile.narrators.is_empty());
    }

    #[tokio::test]
    async fn test_build_profile_passes_limit() {
        let mut store = MockRequestStore::new();
        store
            .expect_history()
            .withf(|username, limit| username == "alice" && *limit == 200)
            .times(1)
            .returning(|_, _| Ok(vec![record("B1", "alice", "A")]));

        let profile = build_profile(&store, "alice", 200).await.unwrap();
        assert!(profile.has_history());
        assert!(profile.requested.contains("B1"));
    }
}
