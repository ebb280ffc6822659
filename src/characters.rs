//! The character directory: public views over the user collection plus
//! the self-service and admin mutations.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::model::{
    sanitize, Annotation, CharacterSeed, CharacterView, Interaction, Position, User, UserView,
};
use crate::store::JsonStore;

/// Fields a user may edit on their own character.
#[derive(Debug, Default, Deserialize)]
pub struct SelfUpdate {
    pub color: Option<String>,
    pub style: Option<String>,
    pub description: Option<String>,
    pub particularity: Option<String>,
    pub message: Option<String>,
}

/// Which dated list an admin annotation lands in.
#[derive(Debug, Clone, Copy)]
pub enum AnnotationList {
    Trait,
    Item,
    History,
}

pub async fn list_all(users: &JsonStore<User>) -> Result<Vec<CharacterView>, ApiError> {
    let all = users.load_all().await?;
    Ok(all.iter().map(User::summary).collect())
}

pub async fn get(users: &JsonStore<User>, id: Uuid) -> Result<CharacterView, ApiError> {
    let user = users.find(id).await?.ok_or(ApiError::NotFound)?;
    Ok(user.summary())
}

pub async fn find_by_username(
    users: &JsonStore<User>,
    username: &str,
) -> Result<Option<User>, ApiError> {
    let all = users.load_all().await?;
    Ok(all.into_iter().find(|u| u.username == username))
}

/// Create an account or NPC record. The first account ever, or the
/// reserved username `admin`, gets the admin role.
pub async fn create_account(
    users: &JsonStore<User>,
    username: &str,
    password_hash: Option<String>,
    is_npc: bool,
    seed: CharacterSeed,
) -> Result<User, ApiError> {
    let existing = users.load_all().await?;
    if existing.iter().any(|u| u.username == username) {
        return Err(ApiError::Conflict("username_taken"));
    }
    let is_admin = existing.is_empty() || username == "admin";
    let user = User::new(username, password_hash, is_admin, is_npc, seed);
    Ok(users.insert(user).await?)
}

/// Create an admin-authored character with no credentials.
pub async fn create_npc(
    users: &JsonStore<User>,
    name: &str,
    seed: CharacterSeed,
) -> Result<UserView, ApiError> {
    if name.len() < 3 {
        return Err(ApiError::Validation("name_too_short"));
    }
    let user = create_account(users, name, None, true, seed).await?;
    Ok(user.view())
}

pub async fn update_self(
    users: &JsonStore<User>,
    id: Uuid,
    update: SelfUpdate,
) -> Result<UserView, ApiError> {
    let updated = users
        .update(id, |user| {
            let character = &mut user.character;
            if let Some(color) = update.color {
                character.color = color;
            }
            if let Some(style) = update.style {
                character.style = style;
            }
            if let Some(description) = update.description {
                character.description = sanitize(&description);
            }
            if let Some(particularity) = update.particularity {
                character.particularity = sanitize(&particularity);
            }
            if let Some(message) = update.message {
                character.message = sanitize(&message);
            }
        })
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}

pub async fn move_to(
    users: &JsonStore<User>,
    id: Uuid,
    x: f64,
    y: f64,
) -> Result<UserView, ApiError> {
    let updated = users
        .update(id, |user| user.character.position = Position { x, y })
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}

/// Append a dated, attributed entry to one of a character's lists.
pub async fn append_annotation(
    users: &JsonStore<User>,
    id: Uuid,
    list: AnnotationList,
    text: &str,
    added_by: &str,
) -> Result<UserView, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("empty_text"));
    }
    let entry = Annotation::new(sanitize(text), added_by);
    let updated = users
        .update(id, move |user| {
            let target = match list {
                AnnotationList::Trait => &mut user.character.traits,
                AnnotationList::Item => &mut user.character.items,
                AnnotationList::History => &mut user.character.history,
            };
            target.push(entry);
        })
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}

pub async fn append_interaction(
    users: &JsonStore<User>,
    id: Uuid,
    message: &str,
    added_by: &str,
) -> Result<UserView, ApiError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation("empty_message"));
    }
    let entry = Interaction::new(sanitize(message), added_by);
    let updated = users
        .update(id, move |user| user.character.interactions.push(entry))
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}

pub async fn set_hearts(
    users: &JsonStore<User>,
    id: Uuid,
    hearts: u32,
) -> Result<UserView, ApiError> {
    let updated = users
        .update(id, |user| user.character.golden_hearts = hearts)
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}

/// Assign a character to a category, or clear the assignment. The id is
/// not checked against the category registry; a later category deletion
/// leaves a dangling reference the directory simply renders nothing for.
pub async fn assign_category(
    users: &JsonStore<User>,
    id: Uuid,
    category_id: Option<Uuid>,
) -> Result<UserView, ApiError> {
    let updated = users
        .update(id, |user| user.character.category_id = category_id)
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}

pub async fn set_costume(
    users: &JsonStore<User>,
    id: Uuid,
    costume_image: Option<String>,
) -> Result<UserView, ApiError> {
    if let Some(data) = &costume_image {
        if !data.starts_with("data:image/") {
            return Err(ApiError::Validation("invalid_image_data"));
        }
    }
    let updated = users
        .update(id, |user| user.character.costume_image = costume_image)
        .await?;
    updated.map(|u| u.view()).ok_or(ApiError::NotFound)
}
