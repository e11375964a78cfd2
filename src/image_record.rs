//! Data model for favorited images.
//!
//! This module defines the records the favorites core stores and hands out.
//! The primary model is [`ImageRecord`], one displayable image identified by
//! the provider's opaque id. [`FavoritesList`] is the read-only, ordered
//! snapshot the registry returns to its consumers.

use std::num::NonZeroU32;
use std::ops::Deref;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::InvalidRecord;

/// Attribution attached to images fetched from the default provider.
pub const DEFAULT_ATTRIBUTION: &str = "Image from The Cat API";

/// Breed information the provider may attach to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breed {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperament: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life_span: Option<String>,
}

/// One displayable image.
///
/// `ImageRecord` is the unit the favorites registry stores. It carries the
/// provider id, the location of the binary content and a few display hints.
/// The image bytes themselves are never embedded; they are fetched lazily
/// from `url` (directly or through the image proxy).
///
/// # Identity
///
/// The `id` is the identity key for every set operation. Two records with the
/// same `id` are the same entity even when their other fields differ; the
/// registry keeps whichever copy it saw first.
///
/// # Persisted shape
///
/// Records serialize to the JSON objects stored in the favorites slot.
/// Optional fields are omitted when absent, so a record written by this
/// crate and read back serializes to the same text again.
///
/// ```rust
/// use meow_favorites::image_record::ImageRecord;
///
/// let record = ImageRecord::new("a", "https://x/a.jpg");
/// let json = serde_json::to_string(&record)?;
/// assert_eq!(json, r#"{"id":"a","url":"https://x/a.jpg"}"#);
///
/// let back: ImageRecord = serde_json::from_str(&json)?;
/// assert_eq!(back, record);
/// # Ok::<(), serde_json::Error>(())
/// ```
///
/// # Field Constraints
///
/// - `width` / `height` are positive when present; a stored `0` does not
///   match the record shape and is rejected on load.
/// - `url` is expected to be absolute when the record comes from the image
///   provider (see [`ImageRecord::validate`]), but the registry itself does
///   not enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Opaque provider identifier, stable for the lifetime of the record.
    pub id: String,

    /// Location of the image bytes.
    pub url: String,

    /// Display hint only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<NonZeroU32>,

    /// Display hint only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<NonZeroU32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breeds: Option<Vec<Breed>>,
}

impl ImageRecord {
    /// Creates a record with only the required fields set.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            width: None,
            height: None,
            attribution: None,
            breeds: None,
        }
    }

    /// Sets the display dimensions. Zero values are treated as unknown.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = NonZeroU32::new(width);
        self.height = NonZeroU32::new(height);
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    pub fn with_breeds(mut self, breeds: Vec<Breed>) -> Self {
        self.breeds = Some(breeds);
        self
    }

    /// Checks the provider contract: a non-empty id and an absolute
    /// `http`/`https` URL.
    ///
    /// Records coming from the image collaborator or from a host over the C
    /// ABI go through this check before they reach the registry.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        if self.id.trim().is_empty() {
            return Err(InvalidRecord("id must not be empty".to_string()));
        }

        let parsed = Url::parse(&self.url)
            .map_err(|e| InvalidRecord(format!("url '{}' is not absolute: {e}", self.url)))?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(InvalidRecord(format!("unsupported url scheme '{scheme}'"))),
        }
    }
}

/// Immutable, ordered snapshot of the favorites.
///
/// Cloning is cheap (reference counted) and there is no way to mutate the
/// registry through a snapshot. A snapshot taken before a mutation keeps
/// showing the old contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesList(Rc<[ImageRecord]>);

impl FavoritesList {
    pub fn empty() -> Self {
        Self(Rc::from(Vec::<ImageRecord>::new()))
    }

    /// Whether a record with `id` is part of this snapshot. Linear scan;
    /// use the registry for O(1) lookups.
    pub fn contains_id(&self, id: &str) -> bool {
        self.0.iter().any(|r| r.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|r| r.id.as_str())
    }

    pub fn to_vec(&self) -> Vec<ImageRecord> {
        self.0.to_vec()
    }
}

impl Default for FavoritesList {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<ImageRecord>> for FavoritesList {
    fn from(records: Vec<ImageRecord>) -> Self {
        Self(Rc::from(records))
    }
}

impl Deref for FavoritesList {
    type Target = [ImageRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a FavoritesList {
    type Item = &'a ImageRecord;
    type IntoIter = std::slice::Iter<'a, ImageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for FavoritesList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let record = ImageRecord::new("abc", "https://cdn2.thecatapi.com/images/abc.jpg");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": "abc", "url": "https://cdn2.thecatapi.com/images/abc.jpg"}));
    }

    #[test]
    fn test_zero_dimension_is_not_a_valid_shape() {
        let parsed: Result<ImageRecord, _> =
            serde_json::from_str(r#"{"id":"a","url":"https://x/a.jpg","width":0}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let parsed: ImageRecord =
            serde_json::from_str(r#"{"id":"a","url":"https://x/a.jpg","mime":"jpg"}"#).unwrap();
        assert_eq!(parsed, ImageRecord::new("a", "https://x/a.jpg"));
    }

    #[test]
    fn test_full_record_with_breeds() {
        let json = r#"{
            "id": "MTY3ODIyMQ",
            "url": "https://cdn2.thecatapi.com/images/MTY3ODIyMQ.jpg",
            "width": 1204,
            "height": 1445,
            "attribution": "Image from The Cat API",
            "breeds": [{"name": "Abyssinian", "origin": "Egypt"}]
        }"#;
        let record: ImageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.width.map(NonZeroU32::get), Some(1204));
        assert_eq!(record.attribution.as_deref(), Some(DEFAULT_ATTRIBUTION));
        let breeds = record.breeds.as_ref().unwrap();
        assert_eq!(breeds[0].name, "Abyssinian");
        assert_eq!(breeds[0].temperament, None);
    }

    #[test]
    fn test_validate() {
        assert!(ImageRecord::new("a", "https://x/a.jpg").validate().is_ok());
        assert!(ImageRecord::new("a", "http://x/a.png").validate().is_ok());
        assert!(ImageRecord::new("", "https://x/a.jpg").validate().is_err());
        assert!(ImageRecord::new("  ", "https://x/a.jpg").validate().is_err());
        assert!(ImageRecord::new("a", "u1").validate().is_err());
        assert!(ImageRecord::new("a", "ftp://x/a.jpg").validate().is_err());
    }

    #[test]
    fn test_with_dimensions_treats_zero_as_unknown() {
        let record = ImageRecord::new("a", "https://x/a.jpg").with_dimensions(0, 300);
        assert_eq!(record.width, None);
        assert_eq!(record.height.map(NonZeroU32::get), Some(300));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let records = vec![ImageRecord::new("a", "u1"), ImageRecord::new("b", "u2")];
        let list = FavoritesList::from(records);
        let mut copy = list.to_vec();
        copy.clear();
        assert_eq!(list.len(), 2);
        assert!(list.contains_id("b"));
        assert_eq!(list.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"[{"id":"a","url":"u1"},{"id":"b","url":"u2"}]"#);
    }
}
