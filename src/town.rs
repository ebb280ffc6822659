//! Client-side scene state: the polled character list, the current
//! selection and pointer hit testing against stored positions.

use std::time::Duration;

use uuid::Uuid;

use crate::model::CharacterView;

/// How close a click must land to a character's position to count as a
/// hit, in canvas units.
pub const CLICK_RADIUS: f64 = 30.0;

/// Cadence at which clients re-poll the character directory.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Owned scene state; replaces ad-hoc globals on the embedding client.
#[derive(Debug, Default)]
pub struct TownState {
    characters: Vec<CharacterView>,
    selected: Option<Uuid>,
}

impl TownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached character list with a fresh poll result. A
    /// selection whose character disappeared is cleared.
    pub fn apply_refresh(&mut self, characters: Vec<CharacterView>) {
        self.characters = characters;
        if let Some(id) = self.selected {
            if !self.characters.iter().any(|c| c.id == id) {
                self.selected = None;
            }
        }
    }

    pub fn characters(&self) -> &[CharacterView] {
        &self.characters
    }

    pub fn selected(&self) -> Option<&CharacterView> {
        self.selected
            .and_then(|id| self.characters.iter().find(|c| c.id == id))
    }

    /// Nearest character strictly within `CLICK_RADIUS` of the click.
    /// Earlier list position wins exact ties. Linear scan; the town holds
    /// tens of characters.
    pub fn character_at(&self, x: f64, y: f64) -> Option<&CharacterView> {
        let mut best: Option<(&CharacterView, f64)> = None;
        for candidate in &self.characters {
            let dx = candidate.character.position.x - x;
            let dy = candidate.character.position.y - y;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < CLICK_RADIUS && best.map_or(true, |(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }
        best.map(|(c, _)| c)
    }

    /// Select the character under the pointer, clearing the selection on
    /// a miss. Returns the new selection.
    pub fn select_at(&mut self, x: f64, y: f64) -> Option<&CharacterView> {
        self.selected = self.character_at(x, y).map(|c| c.id);
        self.selected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Character, CharacterSeed, Position};

    fn character_at(name: &str, x: f64, y: f64) -> CharacterView {
        let mut character = Character::new(name, CharacterSeed::default());
        character.position = Position { x, y };
        CharacterView {
            id: Uuid::new_v4(),
            username: name.to_string(),
            is_admin: false,
            character,
        }
    }

    fn town(characters: Vec<CharacterView>) -> TownState {
        let mut state = TownState::new();
        state.apply_refresh(characters);
        state
    }

    #[test]
    fn click_near_a_character_selects_it() {
        let mut state = town(vec![
            character_at("ada", 100.0, 100.0),
            character_at("bob", 200.0, 200.0),
        ]);
        let hit = state.select_at(105.0, 103.0).unwrap();
        assert_eq!(hit.username, "ada");
    }

    #[test]
    fn click_far_from_everyone_clears_the_selection() {
        let mut state = town(vec![
            character_at("ada", 100.0, 100.0),
            character_at("bob", 200.0, 200.0),
        ]);
        state.select_at(105.0, 103.0);
        assert!(state.select_at(160.0, 160.0).is_none());
        assert!(state.selected().is_none());
    }

    #[test]
    fn nearest_character_wins_when_hits_overlap() {
        let state = town(vec![
            character_at("far", 120.0, 100.0),
            character_at("near", 102.0, 100.0),
        ]);
        let hit = state.character_at(100.0, 100.0).unwrap();
        assert_eq!(hit.username, "near");
    }

    #[test]
    fn exact_tie_keeps_list_order() {
        let state = town(vec![
            character_at("first", 90.0, 100.0),
            character_at("second", 110.0, 100.0),
        ]);
        let hit = state.character_at(100.0, 100.0).unwrap();
        assert_eq!(hit.username, "first");
    }

    #[test]
    fn boundary_distance_is_a_miss() {
        let state = town(vec![character_at("ada", 100.0, 100.0)]);
        assert!(state.character_at(130.0, 100.0).is_none());
        assert!(state.character_at(129.0, 100.0).is_some());
    }

    #[test]
    fn refresh_drops_vanished_selection() {
        let mut state = town(vec![character_at("ada", 100.0, 100.0)]);
        state.select_at(100.0, 100.0);
        assert!(state.selected().is_some());
        state.apply_refresh(vec![character_at("bob", 50.0, 50.0)]);
        assert!(state.selected().is_none());
    }
}
