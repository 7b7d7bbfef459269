//! User preference rows. List columns are stored as JSON arrays.

use chrono::Utc;
use libsql::params;
use newsdesk_shared::{Result, UserPreference, format_timestamp};

use crate::{Storage, db_err, from_json, parse_stored_timestamp, to_json};

impl Storage {
    /// Load a user's preferences, if any have been saved.
    pub async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreference>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, selected_sources_json, excluded_sources_json,
                        selected_categories_json, excluded_categories_json,
                        selected_authors_json, excluded_authors_json, updated_at
                 FROM user_preferences WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };

        let list = |idx: i32| -> Result<String> { row.get::<String>(idx).map_err(db_err) };
        let updated_at: String = row.get(7).map_err(db_err)?;

        Ok(Some(UserPreference {
            user_id: row.get::<String>(0).map_err(db_err)?,
            selected_sources: from_json(&list(1)?)?,
            excluded_sources: from_json(&list(2)?)?,
            selected_categories: from_json(&list(3)?)?,
            excluded_categories: from_json(&list(4)?)?,
            selected_authors: from_json(&list(5)?)?,
            excluded_authors: from_json(&list(6)?)?,
            updated_at: Some(parse_stored_timestamp(&updated_at)?),
        }))
    }

    /// Insert or replace a user's preferences. Returns the stored record.
    pub async fn upsert_preferences(&self, prefs: &UserPreference) -> Result<UserPreference> {
        self.check_writable()?;
        let now = Utc::now();

        self.conn
            .execute(
                "INSERT INTO user_preferences (user_id, selected_sources_json, excluded_sources_json,
                   selected_categories_json, excluded_categories_json,
                   selected_authors_json, excluded_authors_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(user_id) DO UPDATE SET
                   selected_sources_json = excluded.selected_sources_json,
                   excluded_sources_json = excluded.excluded_sources_json,
                   selected_categories_json = excluded.selected_categories_json,
                   excluded_categories_json = excluded.excluded_categories_json,
                   selected_authors_json = excluded.selected_authors_json,
                   excluded_authors_json = excluded.excluded_authors_json,
                   updated_at = excluded.updated_at",
                params![
                    prefs.user_id.as_str(),
                    to_json(&prefs.selected_sources)?,
                    to_json(&prefs.excluded_sources)?,
                    to_json(&prefs.selected_categories)?,
                    to_json(&prefs.excluded_categories)?,
                    to_json(&prefs.selected_authors)?,
                    to_json(&prefs.excluded_authors)?,
                    format_timestamp(&now),
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(UserPreference {
            updated_at: Some(now),
            ..prefs.clone()
        })
    }
}
