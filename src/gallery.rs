//! The shared gallery: an admin-curated, explicitly ordered image list.

use uuid::Uuid;

use crate::error::ApiError;
use crate::model::{sanitize, GalleryImage};
use crate::store::JsonStore;

fn is_image_data_url(data: &str) -> bool {
    data.starts_with("data:image/")
}

pub async fn list(gallery: &JsonStore<GalleryImage>) -> Result<Vec<GalleryImage>, ApiError> {
    Ok(gallery.load_all().await?)
}

pub async fn get(gallery: &JsonStore<GalleryImage>, id: Uuid) -> Result<GalleryImage, ApiError> {
    gallery.find(id).await?.ok_or(ApiError::NotFound)
}

pub async fn add(
    gallery: &JsonStore<GalleryImage>,
    data: String,
    title: Option<String>,
) -> Result<GalleryImage, ApiError> {
    if !is_image_data_url(&data) {
        return Err(ApiError::Validation("invalid_image_data"));
    }
    let title = title.map(|t| sanitize(&t)).unwrap_or_default();
    Ok(gallery.insert(GalleryImage::new(data, title)).await?)
}

/// Put the listed ids first in the given order; images omitted from the
/// list keep their previous relative order at the tail. Unknown ids are
/// ignored.
pub fn apply_order(images: Vec<GalleryImage>, ids: &[Uuid]) -> Vec<GalleryImage> {
    let mut remaining = images;
    let mut ordered = Vec::with_capacity(remaining.len());
    for id in ids {
        if let Some(pos) = remaining.iter().position(|image| image.id == *id) {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.extend(remaining);
    ordered
}

pub async fn reorder(
    gallery: &JsonStore<GalleryImage>,
    ids: &[Uuid],
) -> Result<Vec<GalleryImage>, ApiError> {
    let reordered = gallery
        .modify(|images| {
            let current = std::mem::take(images);
            *images = apply_order(current, ids);
        })
        .await?;
    Ok(reordered)
}

pub async fn delete(gallery: &JsonStore<GalleryImage>, id: Uuid) -> Result<(), ApiError> {
    if gallery.delete(id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}
