//! Dashboard payload types.
//!
//! These are the values the live dashboard renders. Field names are
//! camelCase on the wire because the browser client reads them directly.

use serde::{Deserialize, Serialize};

use crate::{ArticleStatus, EntityId, Timestamp, UserRole};

/// Aggregate counters shown at the top of the admin dashboard.
///
/// A snapshot is always recomputed from the data store and replaced
/// wholesale; nothing mutates one in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Number of published articles
    pub articles_count: u64,
    /// Number of registered users
    pub users_count: u64,
    /// Number of articles awaiting review
    pub pending_articles_count: u64,
    /// Sum of the view counter over all articles
    pub total_views: u64,
    /// Number of advertisements
    pub total_ads: u64,
    /// Sum of the share counter over all articles
    pub total_shares: u64,
}

/// Row of the "latest articles" widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub id: EntityId,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: ArticleStatus,
    pub views: u64,
    pub shares: u64,
    pub created_at: Timestamp,
}

/// Row of the "latest users" widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_uses_camel_case_fields() -> Result<(), serde_json::Error> {
        let snapshot = DashboardSnapshot {
            articles_count: 5,
            users_count: 2,
            pending_articles_count: 1,
            total_views: 120,
            total_ads: 3,
            total_shares: 9,
        };
        let json = serde_json::to_value(snapshot)?;

        assert_eq!(json["articlesCount"], 5);
        assert_eq!(json["usersCount"], 2);
        assert_eq!(json["pendingArticlesCount"], 1);
        assert_eq!(json["totalViews"], 120);
        assert_eq!(json["totalAds"], 3);
        assert_eq!(json["totalShares"], 9);
        Ok(())
    }

    #[test]
    fn test_article_summary_omits_missing_category() -> Result<(), serde_json::Error> {
        let article = ArticleSummary {
            id: crate::new_entity_id(),
            title: "Budget vote".to_string(),
            author: "desk".to_string(),
            category: None,
            status: ArticleStatus::Published,
            views: 0,
            shares: 0,
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&article)?;
        assert!(json.get("category").is_none());
        assert_eq!(json["status"], "published");
        Ok(())
    }
}
