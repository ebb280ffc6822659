//! The category registry: admin-managed named "houses" with their own
//! placement on the scene.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::model::{sanitize, Category, Position};
use crate::store::JsonStore;

#[derive(Debug, Default, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub position: Option<Position>,
}

pub async fn list(categories: &JsonStore<Category>) -> Result<Vec<Category>, ApiError> {
    Ok(categories.load_all().await?)
}

pub async fn get(categories: &JsonStore<Category>, id: Uuid) -> Result<Category, ApiError> {
    categories.find(id).await?.ok_or(ApiError::NotFound)
}

pub async fn create(
    categories: &JsonStore<Category>,
    name: &str,
    color: Option<String>,
    icon: Option<String>,
    position: Option<Position>,
) -> Result<Category, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("empty_name"));
    }
    let category = Category::new(sanitize(name), color, icon, position);
    Ok(categories.insert(category).await?)
}

pub async fn update(
    categories: &JsonStore<Category>,
    id: Uuid,
    update: CategoryUpdate,
) -> Result<Category, ApiError> {
    let updated = categories
        .update(id, |category| {
            if let Some(name) = update.name {
                category.name = sanitize(&name);
            }
            if let Some(color) = update.color {
                category.color = color;
            }
            if let Some(icon) = update.icon {
                category.icon = icon;
            }
            if let Some(position) = update.position {
                category.position = position;
            }
        })
        .await?;
    updated.ok_or(ApiError::NotFound)
}

pub async fn delete(categories: &JsonStore<Category>, id: Uuid) -> Result<(), ApiError> {
    if categories.delete(id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}
