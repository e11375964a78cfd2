//! Contracts of the image collaborators the favorites core talks to.
//!
//! Fetching random images and proxying image bytes are I/O owned by the
//! host; this module only fixes their shape ([`ImageSource`]) plus the pure
//! pieces every implementation needs: the provider request URL, mapping the
//! provider response to an [`ImageRecord`], the share URL and the proxy's
//! `Content-Disposition` value.

use serde::Deserialize;
use url::Url;

use crate::error::CollaboratorError;
use crate::image_record::{ImageRecord, DEFAULT_ATTRIBUTION};

/// Provider search endpoint for random images.
pub const CAT_API_SEARCH_URL: &str = "https://api.thecatapi.com/v1/images/search";

/// Same-origin route that re-serves remote image bytes.
pub const PROXY_IMAGE_PATH: &str = "/api/proxy-image";

/// File name offered when the proxy answers in download mode.
pub const DOWNLOAD_FILE_NAME: &str = "cat.jpg";

/// Image bytes obtained through the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// `Content-Disposition` the proxy answered with.
    pub disposition: String,
}

/// Source of images for the viewer.
///
/// Implementations fail with [`CollaboratorError::Fetch`] on network or
/// parse errors and never retry on their own; the UI shows the error and
/// lets the user try again.
pub trait ImageSource {
    /// Fetches the record of a random image.
    fn fetch_random_image(&self) -> Result<ImageRecord, CollaboratorError>;

    /// Fetches the bytes behind `url` through the same-origin proxy.
    /// `download` asks for save-as instead of inline display.
    fn proxy_image(&self, url: &str, download: bool) -> Result<ProxiedImage, CollaboratorError>;
}

/// Provider request for one random medium-size jpg/png image without breed
/// data.
pub fn random_image_request_url() -> Result<Url, CollaboratorError> {
    let mut url = Url::parse(CAT_API_SEARCH_URL)
        .map_err(|e| CollaboratorError::Fetch(format!("bad provider url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("size", "med")
        .append_pair("has_breeds", "0")
        .append_pair("mime_types", "jpg,png");
    Ok(url)
}

#[derive(Deserialize)]
struct ProviderImage {
    id: String,
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Maps the provider's search response (a JSON array) to the first image
/// record, attributed to the provider and validated.
pub fn parse_search_response(body: &str) -> Result<ImageRecord, CollaboratorError> {
    let images: Vec<ProviderImage> = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::Fetch(format!("unexpected provider response: {e}")))?;

    let first = images
        .into_iter()
        .next()
        .ok_or_else(|| CollaboratorError::Fetch("provider returned no images".to_string()))?;

    let record = ImageRecord::new(first.id, first.url)
        .with_dimensions(first.width.unwrap_or(0), first.height.unwrap_or(0))
        .with_attribution(DEFAULT_ATTRIBUTION);

    record
        .validate()
        .map_err(|e| CollaboratorError::Fetch(e.to_string()))?;

    Ok(record)
}

/// Builds the same-origin URL that serves `image_url` through the proxy.
///
/// Share targets need a URL the sharing origin controls rather than the
/// third-party location.
///
/// ```rust
/// use meow_favorites::collaborators::share_url;
///
/// let shared = share_url("https://meow.example", "https://cdn2.thecatapi.com/images/a b.jpg")?;
/// assert_eq!(
///     shared,
///     "https://meow.example/api/proxy-image?url=https%3A%2F%2Fcdn2.thecatapi.com%2Fimages%2Fa+b.jpg"
/// );
/// # Ok::<(), meow_favorites::error::CollaboratorError>(())
/// ```
pub fn share_url(origin: &str, image_url: &str) -> Result<String, CollaboratorError> {
    if image_url.is_empty() {
        return Err(CollaboratorError::Share("Image URL is required".to_string()));
    }

    let base = Url::parse(origin)
        .map_err(|e| CollaboratorError::Share(format!("invalid origin '{origin}': {e}")))?;
    let mut shared = base
        .join(PROXY_IMAGE_PATH)
        .map_err(|e| CollaboratorError::Share(format!("cannot build share url: {e}")))?;
    shared.query_pairs_mut().append_pair("url", image_url);

    Ok(shared.into())
}

/// `Content-Disposition` the proxy sends for the given mode.
pub fn content_disposition(download: bool) -> String {
    if download {
        format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\"")
    } else {
        "inline".to_string()
    }
}
