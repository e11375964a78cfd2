//! Session configuration.

use serde::{Deserialize, Serialize};

/// Storage slot the favorites list lives in.
pub const DEFAULT_STORAGE_KEY: &str = "meowviewer-favorites";

/// Base name of the LMDB directory (`<name>.lmdb`).
pub const DEFAULT_STORAGE_PATH: &str = "meowviewer";

/// LMDB map size. Favorites are small JSON records; 10 MiB holds tens of
/// thousands of them.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

/// Settings for one favorites session.
///
/// Every field has a default, so hosts can pass `{}` over the C ABI.
///
/// ```rust
/// use meow_favorites::config::FavoritesConfig;
///
/// let config: FavoritesConfig = serde_json::from_str(r#"{"max_favorites": 50}"#)?;
/// assert_eq!(config.storage_key, "meowviewer-favorites");
/// assert_eq!(config.max_favorites, Some(50));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
    /// Directory base name for the LMDB environment.
    pub storage_path: String,
    /// Key of the single slot holding the favorites array.
    pub storage_key: String,
    /// Upper bound of the LMDB map in bytes. Writes past it fail as
    /// storage unavailable.
    pub map_size: usize,
    /// Optional cap on the number of favorites. When set, adding past the
    /// cap evicts the oldest favorites. `None` keeps the list unbounded.
    pub max_favorites: Option<usize>,
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self {
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            map_size: DEFAULT_MAP_SIZE,
            max_favorites: None,
        }
    }
}

impl FavoritesConfig {
    /// Config for an LMDB environment at `storage_path`, other fields default.
    pub fn at(storage_path: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    pub fn with_max_favorites(mut self, max: usize) -> Self {
        self.max_favorites = Some(max);
        self
    }
}
