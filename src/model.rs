use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::Record;

pub const DEFAULT_CHARACTER_COLOR: &str = "#8b5fbf";
pub const DEFAULT_CHARACTER_STYLE: &str = "round";
pub const DEFAULT_CHARACTER_MESSAGE: &str = "Hello!";
pub const DEFAULT_CATEGORY_COLOR: &str = "#7c5cbf";
pub const DEFAULT_CATEGORY_ICON: &str = "🏠";

/// Current unix timestamp in seconds.
pub fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Escape HTML-unsafe characters before a string is persisted.
///
/// Idempotent: the replacement entities contain none of the escaped
/// characters, so already-sanitized text passes through unchanged.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Spawn placement for a newly registered character.
    pub fn random_spawn() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            x: rng.gen_range(50..650) as f64,
            y: rng.gen_range(200..500) as f64,
        }
    }

    /// Placement for a category house when none was supplied.
    pub fn random_house() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            x: rng.gen_range(100..700) as f64,
            y: rng.gen_range(50..200) as f64,
        }
    }
}

/// A dated free-text entry on a character (trait, item or history line).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub added_at: i64,
    pub added_by: String,
}

impl Annotation {
    pub fn new(text: String, added_by: &str) -> Self {
        Self {
            text,
            added_at: now_ts(),
            added_by: added_by.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub message: String,
    pub added_at: i64,
    pub added_by: String,
}

impl Interaction {
    pub fn new(message: String, added_by: &str) -> Self {
        Self {
            message,
            added_at: now_ts(),
            added_by: added_by.to_string(),
        }
    }
}

/// Appearance seed accepted at registration and NPC creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterSeed {
    pub color: Option<String>,
    pub style: Option<String>,
    pub description: Option<String>,
    pub particularity: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    pub name: String,
    pub color: String,
    pub style: String,
    pub description: String,
    pub particularity: String,
    pub message: String,
    pub position: Position,
    pub golden_hearts: u32,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub costume_image: Option<String>,
    pub traits: Vec<Annotation>,
    pub items: Vec<Annotation>,
    pub history: Vec<Annotation>,
    pub interactions: Vec<Interaction>,
}

impl Character {
    /// Build a character from its seed, filling defaults and sanitizing
    /// the free-text fields.
    pub fn new(name: &str, seed: CharacterSeed) -> Self {
        Self {
            name: name.to_string(),
            color: seed.color.unwrap_or_else(|| DEFAULT_CHARACTER_COLOR.into()),
            style: seed.style.unwrap_or_else(|| DEFAULT_CHARACTER_STYLE.into()),
            description: sanitize(seed.description.as_deref().unwrap_or("")),
            particularity: sanitize(seed.particularity.as_deref().unwrap_or("")),
            message: sanitize(seed.message.as_deref().unwrap_or(DEFAULT_CHARACTER_MESSAGE)),
            position: Position::random_spawn(),
            golden_hearts: 0,
            category_id: None,
            costume_image: None,
            traits: Vec::new(),
            items: Vec::new(),
            history: Vec::new(),
            interactions: Vec::new(),
        }
    }
}

/// A registered account or admin-created NPC, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// `None` exactly for NPCs, which have no credentials.
    pub password_hash: Option<String>,
    pub is_admin: bool,
    #[serde(default)]
    pub is_npc: bool,
    pub character: Character,
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl User {
    pub fn new(
        username: &str,
        password_hash: Option<String>,
        is_admin: bool,
        is_npc: bool,
        seed: CharacterSeed,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            is_admin,
            is_npc,
            character: Character::new(username, seed),
            created_at: now_ts(),
            updated_at: None,
        }
    }

    /// Full record without the password hash, returned by auth routes and
    /// admin mutators.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
            is_npc: self.is_npc,
            character: self.character.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Directory listing entry.
    pub fn summary(&self) -> CharacterView {
        CharacterView {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
            character: self.character.clone(),
        }
    }
}

impl Record for User {
    fn id(&self) -> Uuid {
        self.id
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub is_npc: bool,
    pub character: Character,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// What everyone can see about a character.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterView {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub character: Character,
}

/// A named "house" characters can be assigned to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub position: Position,
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Category {
    pub fn new(
        name: String,
        color: Option<String>,
        icon: Option<String>,
        position: Option<Position>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            color: color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.into()),
            icon: icon.unwrap_or_else(|| DEFAULT_CATEGORY_ICON.into()),
            position: position.unwrap_or_else(Position::random_house),
            created_at: now_ts(),
            updated_at: None,
        }
    }
}

impl Record for Category {
    fn id(&self) -> Uuid {
        self.id
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = Some(now);
    }
}

/// One image in the shared gallery. List order is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GalleryImage {
    pub id: Uuid,
    /// `data:image/...` data URL.
    pub data: String,
    pub title: String,
    pub added_at: i64,
}

impl GalleryImage {
    pub fn new(data: String, title: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            title,
            added_at: now_ts(),
        }
    }
}

impl Record for GalleryImage {
    fn id(&self) -> Uuid {
        self.id
    }
}
