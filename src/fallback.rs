use std::collections::HashMap;

use crate::catalog::EntityType;
use crate::config::OfflineConfig;

/// Identifier assigned when a keyword cannot be resolved.
pub const NOT_FOUND: &str = "not_found";

/// Built-in artist identifiers for the bundled fixture exports.
const ARTIST_IDS: &[(&str, &str)] = &[
    ("Arcade Fire", "3kjuyTCjPG1WMFCiyc5IuB"),
    ("Frank Sinatra", "1Mxqyy3pSjf8kZZL4QVxS0"),
    ("Interpol", "3WaJSfKnzc65VDgmj2zU8B"),
    ("Rimsky-Korsakov", "2kXJ68O899XvWOBdpzlXgs"),
    ("M. Ward", "6nXSnNEdLuKTzAQozRtqiI"),
    ("Massive Attack", "6FXMGgJwohJLUSr5nVlf9X"),
    ("Mazzy Star", "37w38cCSGgKLdayTRjna4W"),
    ("Ravel", "17hR0sYHpx7VYTMRfFUOmY"),
    ("Beethoven", "17p2POLSLeRetvc3bXZJZL"),
    ("Björk", "7w29UYBi0qsHi5RTcv3lmA"),
    ("Patsy Cline", "7dNsHhGeGU5MV01r06O8gK"),
    ("Sallie Ford & The Sound Outside", "0Z8RhQLJrLxKMWoUW2qo95"),
];

const ALBUM_IDS: &[(&str, &str)] = &[
    ("The Suburbs", "3DrgM5X3yX1JP1liNLAOHI"),
    ("Sinatra Reprise", "4Rka7iTWRtRUFouxyzEKKV"),
    ("Turn On The Bright Lights", "79deKDaslwLfH3yPR2T3SB"),
    ("Capriccio Espagnol", "4aIDs5QPfX9T7SdPIXOwVL"),
    ("Hold Time", "4C8AUW89DL5LE5ikBBm4sp"),
    ("100th Window", "60szvcndZTCqG9E7GSAplB"),
    ("So Tonight That I Might See", "5K18gTgac0q6Jma5HkV1vA"),
    ("Rapsodie Espagnol", "2tVaOSl5WI3hfTLMmkxcWs"),
    ("Beethoven: The Complete Symphonies", "3mUsLP2bwua6WTPdraPJIL"),
    ("Debut", "3icT9XGrBfhlV8BKK4WEGX"),
    ("Definitive Collection", "3g5uyAp8sS8LnnCxh9y2em"),
    ("Dirty Radio", "7I9KroNPmpw9qFYZ8Vp7pN"),
];

const TRACK_IDS: &[(&str, &str)] = &[
    ("The Suburbs", "5iItYl3Q6wCnKVfpK1uNVf"),
    ("The Best Is Yet To Come", "3HXdy2r9RzawSwqQCwkjnP"),
    ("Obstacle 1", "1ZBqJilDGBVYktvlCEo9jC"),
    ("Capriccio Espagnol, Opus 35 - Alborada", "0qJcOsG3L0IL2lnnZ2pYdQ"),
    ("For Beginners", "1T24OCmbICPdS5iEqzxKdw"),
    ("Future Proof", "58KjQnB2w7MhTbBJ29geBC"),
    ("Fade Into You", "1LzNfuep1bnAUR9skqdHCK"),
    ("Malaguena", "6wydpSs4DgAwPp9DrWJIMn"),
    ("Symphony No.8 in F-major, Op.93: II. Allegro scherzando", "1qxHY4sI1ASklxMCUl3nuX"),
    ("Human Behaviour", "5OnyZ56HLhrWOXdzeETqLk"),
    ("Walkin' After Midnight", "7E8nKMtXMqIQbvl1Ta9Ucw"),
    ("I Swear", "1astr5aXBQ4fA5xzvlxMVx"),
];

/// Static keyword → identifier tables used when the catalog is unreachable
/// or disabled. Exact, case-sensitive lookup only.
#[derive(Debug, Clone, Default)]
pub struct OfflineIds {
    artists: HashMap<String, String>,
    albums: HashMap<String, String>,
    tracks: HashMap<String, String>,
}

fn table(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

impl OfflineIds {
    /// The bundled fixture identifiers.
    pub fn builtin() -> Self {
        Self {
            artists: table(ARTIST_IDS),
            albums: table(ALBUM_IDS),
            tracks: table(TRACK_IDS),
        }
    }

    /// Built-in tables with config entries layered on top (config wins).
    pub fn from_config(config: &OfflineConfig) -> Self {
        let mut ids = Self::builtin();
        ids.artists.extend(config.artists.clone());
        ids.albums.extend(config.albums.clone());
        ids.tracks.extend(config.tracks.clone());
        let overrides = config.artists.len() + config.albums.len() + config.tracks.len();
        if overrides > 0 {
            log::debug!("Merged {overrides} offline identifiers from config");
        }
        ids
    }

    fn table_for(&self, entity: EntityType) -> Option<&HashMap<String, String>> {
        match entity {
            EntityType::Artist => Some(&self.artists),
            EntityType::Album => Some(&self.albums),
            EntityType::Track => Some(&self.tracks),
            EntityType::Playlist | EntityType::Show | EntityType::Episode => None,
        }
    }

    /// Look up `keyword`; returns [`NOT_FOUND`] on a miss.
    pub fn resolve(&self, entity: EntityType, keyword: &str) -> &str {
        self.lookup(entity, keyword).unwrap_or(NOT_FOUND)
    }

    pub fn lookup(&self, entity: EntityType, keyword: &str) -> Option<&str> {
        self.table_for(entity)?.get(keyword).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keywords() {
        let ids = OfflineIds::builtin();
        assert_eq!(ids.resolve(EntityType::Artist, "Mazzy Star"), "37w38cCSGgKLdayTRjna4W");
        assert_eq!(ids.resolve(EntityType::Album, "Debut"), "3icT9XGrBfhlV8BKK4WEGX");
        assert_eq!(ids.resolve(EntityType::Track, "Fade Into You"), "1LzNfuep1bnAUR9skqdHCK");
    }

    #[test]
    fn test_deterministic_across_calls() {
        let ids = OfflineIds::builtin();
        let first = ids.resolve(EntityType::Artist, "Björk").to_string();
        for _ in 0..5 {
            assert_eq!(ids.resolve(EntityType::Artist, "Björk"), first);
        }
    }

    #[test]
    fn test_unknown_returns_sentinel() {
        let ids = OfflineIds::builtin();
        assert_eq!(ids.resolve(EntityType::Artist, "Nobody"), NOT_FOUND);
        // exact lookup: no case folding, no fuzzy matching
        assert_eq!(ids.resolve(EntityType::Artist, "mazzy star"), NOT_FOUND);
        assert_eq!(ids.resolve(EntityType::Artist, "Mazzy Sta"), NOT_FOUND);
        assert_eq!(ids.resolve(EntityType::Playlist, "Mazzy Star"), NOT_FOUND);
    }

    #[test]
    fn test_same_keyword_different_tables() {
        let ids = OfflineIds::builtin();
        assert_ne!(
            ids.resolve(EntityType::Album, "The Suburbs"),
            ids.resolve(EntityType::Track, "The Suburbs")
        );
    }

    #[test]
    fn test_config_overrides() {
        let mut config = OfflineConfig::default();
        config.artists.insert("Mazzy Star".into(), "override".into());
        config.tracks.insert("Halah".into(), "2xJ0vU9G0XgqsJmUgn4lXH".into());
        let ids = OfflineIds::from_config(&config);
        assert_eq!(ids.resolve(EntityType::Artist, "Mazzy Star"), "override");
        assert_eq!(ids.resolve(EntityType::Track, "Halah"), "2xJ0vU9G0XgqsJmUgn4lXH");
        assert_eq!(ids.resolve(EntityType::Album, "Debut"), "3icT9XGrBfhlV8BKK4WEGX");
    }
}
