//! User preference management.

use newsdesk_shared::{
    MAX_PREFERENCE_VALUE_LEN, NewsdeskError, PreferenceItem, Result, UserPreference, check_len,
};
use newsdesk_storage::Storage;
use tracing::info;

/// Stored preferences for `user_id`, or empty ones if none were saved.
pub async fn show(storage: &Storage, user_id: &str) -> Result<UserPreference> {
    Ok(storage
        .get_preferences(user_id)
        .await?
        .unwrap_or_else(|| UserPreference::new(user_id)))
}

/// Replace every list for `prefs.user_id`.
pub async fn replace(storage: &Storage, prefs: &UserPreference) -> Result<UserPreference> {
    validate(storage, prefs).await?;
    let saved = storage.upsert_preferences(prefs).await?;
    info!(user_id = %saved.user_id, "preferences replaced");
    Ok(saved)
}

/// Add one item to the matching "selected" list. Adding an existing item is a no-op.
pub async fn add(storage: &Storage, user_id: &str, item: PreferenceItem) -> Result<UserPreference> {
    let mut prefs = show(storage, user_id).await?;
    match item {
        PreferenceItem::Source(id) => push_unique(&mut prefs.selected_sources, id),
        PreferenceItem::Category(value) => push_unique(&mut prefs.selected_categories, value),
        PreferenceItem::Author(value) => push_unique(&mut prefs.selected_authors, value),
    }
    replace(storage, &prefs).await
}

/// Remove one item from the matching "selected" list.
pub async fn remove(
    storage: &Storage,
    user_id: &str,
    item: PreferenceItem,
) -> Result<UserPreference> {
    let mut prefs = show(storage, user_id).await?;
    match item {
        PreferenceItem::Source(id) => prefs.selected_sources.retain(|s| *s != id),
        PreferenceItem::Category(value) => prefs.selected_categories.retain(|c| *c != value),
        PreferenceItem::Author(value) => prefs.selected_authors.retain(|a| *a != value),
    }
    replace(storage, &prefs).await
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

async fn validate(storage: &Storage, prefs: &UserPreference) -> Result<()> {
    if prefs.user_id.trim().is_empty() {
        return Err(NewsdeskError::validation("user_id must not be empty"));
    }

    for value in prefs
        .selected_categories
        .iter()
        .chain(&prefs.excluded_categories)
    {
        check_len("category", Some(value), MAX_PREFERENCE_VALUE_LEN)?;
    }
    for value in prefs.selected_authors.iter().chain(&prefs.excluded_authors) {
        check_len("author", Some(value), MAX_PREFERENCE_VALUE_LEN)?;
    }

    for id in prefs.selected_sources.iter().chain(&prefs.excluded_sources) {
        if storage.source_by_id(*id).await?.is_none() {
            return Err(NewsdeskError::validation(format!(
                "source_id {id} does not exist"
            )));
        }
    }
    Ok(())
}
