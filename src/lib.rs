//! # Meow Favorites
//!
//! The favorites core of the MeowViewer image viewer: a persistent,
//! id-keyed list of favorited images with change subscriptions, built to be
//! linked into a host UI (Flutter, native shell, webview bridge) through a C
//! ABI or used directly from Rust.
//!
//! ## Layers
//!
//! - [`local_store`]: durable key-value storage (LMDB on disk, or memory)
//! - [`favorites_store`]: reads and writes the single favorites slot
//! - [`favorites_registry`]: the session's source of truth, no duplicate ids
//! - [`view_binding`]: shared provider handle with publish/subscribe
//! - [`collaborators`]: contracts of the image fetcher, proxy and share link
//!
//! ## Quick Start
//!
//! ```rust
//! use meow_favorites::favorites_registry::FavoritesRegistry;
//! use meow_favorites::favorites_store::FavoritesStore;
//! use meow_favorites::image_record::ImageRecord;
//! use meow_favorites::local_store::MemoryStore;
//! use meow_favorites::view_binding::{FavoritesEvent, FavoritesProvider};
//!
//! let store = FavoritesStore::new(MemoryStore::new(), "meowviewer-favorites");
//! let provider = FavoritesProvider::new(FavoritesRegistry::hydrate(store, None));
//!
//! let _sub = provider.subscribe(|event: &FavoritesEvent| {
//!     if let FavoritesEvent::Changed(list) = event {
//!         println!("{} favorite(s)", list.len());
//!     }
//! });
//!
//! provider.add_favorite(ImageRecord::new("a", "https://x/a.jpg"));
//! assert!(provider.is_favorite("a"));
//! ```
//!
//! ## FFI Functions
//!
//! Every call returns an [`AppResponse`] serialized to a C string, which the
//! caller releases with [`favorites_free_string`]:
//!
//! - [`favorites_open`] - Open a session from a JSON config
//! - [`favorites_add`] / [`favorites_remove`] / [`favorites_toggle`] - Mutate
//! - [`favorites_is_favorite`] / [`favorites_list`] - Query
//! - [`favorites_subscribe`] / [`favorites_unsubscribe`] - Change events
//! - [`favorites_close`] - Flush and release the session

pub mod collaborators;
pub mod config;
pub mod error;
pub mod favorites_registry;
pub mod favorites_store;
pub mod image_record;
pub mod local_store;
pub mod view_binding;
mod app_response;

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};

pub use crate::app_response::AppResponse;
use crate::config::FavoritesConfig;
use crate::favorites_registry::FavoritesRegistry;
use crate::favorites_store::FavoritesStore;
use crate::image_record::ImageRecord;
use crate::local_store::LmdbStore;
use crate::view_binding::{FavoritesEvent, FavoritesProvider, Subscription};

/// Callback invoked for every favorites event.
///
/// `event_json` is an [`AppResponse`] (`Ok` with the favorites array, or
/// `StorageWarning`) that is only valid for the duration of the call.
pub type FavoritesCallback = extern "C" fn(event_json: *const c_char, user_data: *mut c_void);

/// One favorites session held by a host across C ABI calls.
pub struct FavoritesSession {
    provider: FavoritesProvider<LmdbStore>,
    subscriptions: HashMap<u64, Subscription>,
}

impl FavoritesSession {
    /// Opens the LMDB slot described by `config` and hydrates the registry.
    pub fn open(config: &FavoritesConfig) -> Result<Self, error::StoreError> {
        let backend = LmdbStore::open(&config.storage_path, config.map_size)?;
        let store = FavoritesStore::new(backend, config.storage_key.clone());
        let registry = FavoritesRegistry::hydrate(store, config.max_favorites);

        if let Some(issue) = registry.hydration_issue() {
            warn!("Favorites session starts empty: {issue}");
        }

        Ok(Self {
            provider: FavoritesProvider::new(registry),
            subscriptions: HashMap::new(),
        })
    }

    pub fn provider(&self) -> &FavoritesProvider<LmdbStore> {
        &self.provider
    }
}

/// Opens a favorites session.
///
/// # Parameters
///
/// * `config_json` - Null-terminated JSON [`FavoritesConfig`]; `{}` uses the
///   defaults.
///
/// # Returns
///
/// A session pointer, or null if the config is invalid or the storage cannot
/// be opened. Release it with [`favorites_close`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use meow_favorites::favorites_open;
///
/// let config = CString::new(r#"{"storage_path":"meowviewer"}"#).unwrap();
/// let session = favorites_open(config.as_ptr());
/// assert!(!session.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_open(config_json: *const c_char) -> *mut FavoritesSession {
    if config_json.is_null() {
        warn!("Null config pointer passed to favorites_open");
        return std::ptr::null_mut();
    }

    let raw = match unsafe { CStr::from_ptr(config_json).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in config parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config: FavoritesConfig = match serde_json::from_str(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Invalid favorites config: {e}");
            return std::ptr::null_mut();
        }
    };

    match FavoritesSession::open(&config) {
        Ok(session) => {
            info!("Favorites session opened at '{}'", config.storage_path);
            Box::into_raw(Box::new(session))
        }
        Err(e) => {
            warn!("Failed to open favorites storage at '{}': {e}", config.storage_path);
            std::ptr::null_mut()
        }
    }
}

/// Adds a favorite.
///
/// `record_json` is an image record (`id`, `url`, optional `width`,
/// `height`, `attribution`, `breeds`). The URL must be absolute. Adding an id
/// that is already a favorite changes nothing.
///
/// Returns `Ok` with the favorites array, or `StorageWarning` when the add
/// was kept in memory only.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_add(session: *mut FavoritesSession, record_json: *const c_char) -> *const c_char {
    let session = match session_ref(session, "favorites_add") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let record = match parse_record(record_json) {
        Ok(r) => r,
        Err(err) => return err,
    };

    let outcome = session.provider.add_favorite(record);
    mutation_response(session, &outcome)
}

/// Removes the favorite with `id`. Unknown ids are a no-op.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_remove(session: *mut FavoritesSession, id: *const c_char) -> *const c_char {
    let session = match session_ref(session, "favorites_remove") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let outcome = session.provider.remove_favorite(&id);
    mutation_response(session, &outcome)
}

/// Flips the favorite state of a record.
///
/// Returns `Ok` with `{"is_favorite": bool}` describing the new state, or
/// `StorageWarning` when the toggle was kept in memory only.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_toggle(session: *mut FavoritesSession, record_json: *const c_char) -> *const c_char {
    let session = match session_ref(session, "favorites_toggle") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let record = match parse_record(record_json) {
        Ok(r) => r,
        Err(err) => return err,
    };

    let (is_favorite, outcome) = session.provider.toggle_favorite(record);
    let body = serde_json::json!({ "is_favorite": is_favorite }).to_string();
    response_to_c_string(&AppResponse::from_outcome(&outcome, body))
}

/// Returns `Ok("true")` or `Ok("false")`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_is_favorite(session: *mut FavoritesSession, id: *const c_char) -> *const c_char {
    let session = match session_ref(session, "favorites_is_favorite") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    let answer = session.provider.is_favorite(&id);
    response_to_c_string(&AppResponse::Ok(answer.to_string()))
}

/// Returns `Ok` with the favorites array in insertion order.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_list(session: *mut FavoritesSession) -> *const c_char {
    let session = match session_ref(session, "favorites_list") {
        Ok(s) => s,
        Err(err) => return err,
    };

    response_to_c_string(&list_response(session))
}

/// Registers `callback` for favorites events.
///
/// # Returns
///
/// A non-zero subscription token for [`favorites_unsubscribe`], or `0` if
/// the session or callback is null.
///
/// # Safety
///
/// `user_data` is passed back untouched; the host keeps it valid until it
/// unsubscribes or closes the session. Callbacks run on the thread that
/// performed the mutation.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_subscribe(
    session: *mut FavoritesSession,
    callback: Option<FavoritesCallback>,
    user_data: *mut c_void,
) -> u64 {
    let Some(session) = (unsafe { session.as_mut() }) else {
        warn!("Null session pointer passed to favorites_subscribe");
        return 0;
    };

    let Some(callback) = callback else {
        warn!("Null callback passed to favorites_subscribe");
        return 0;
    };

    let subscription = session.provider.subscribe(move |event: &FavoritesEvent| {
        let response = event_response(event);
        let json = match serde_json::to_string(&response) {
            Ok(j) => j,
            Err(e) => {
                warn!("Error serializing favorites event: {e}");
                return;
            }
        };

        match CString::new(json) {
            Ok(c_str) => callback(c_str.as_ptr(), user_data),
            Err(e) => warn!("Error creating CString for event: {e}"),
        }
    });

    let token = subscription.id();
    session.subscriptions.insert(token, subscription);
    token
}

/// Removes the subscription identified by `token`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_unsubscribe(session: *mut FavoritesSession, token: u64) -> *const c_char {
    let Some(session) = (unsafe { session.as_mut() }) else {
        let error = AppResponse::BadRequest("Null session pointer passed to favorites_unsubscribe".to_string());
        return response_to_c_string(&error);
    };

    match session.subscriptions.remove(&token) {
        Some(subscription) => {
            subscription.unsubscribe();
            response_to_c_string(&AppResponse::success("Subscription removed"))
        }
        None => {
            let not_found = AppResponse::NotFound(format!("No subscription with token: {token}"));
            response_to_c_string(&not_found)
        }
    }
}

/// Flushes the storage and releases the session. The pointer must not be
/// used afterwards.
///
/// # Notes
///
/// The LMDB environment is closed when the session is dropped; this call
/// additionally forces a sync so the last write survives a host crash.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_close(session: *mut FavoritesSession) -> *const c_char {
    if session.is_null() {
        let error = AppResponse::BadRequest("Null session pointer passed to favorites_close".to_string());
        return response_to_c_string(&error);
    }

    let session = unsafe { Box::from_raw(session) };
    let synced = session
        .provider
        .with_registry(|registry| registry.store().backend().sync());
    drop(session);

    match synced {
        Ok(()) => {
            info!("Favorites session closed");
            response_to_c_string(&AppResponse::success("Favorites session closed"))
        }
        Err(e) => {
            let error = AppResponse::DatabaseError(format!("Session closed without final sync: {e}"));
            response_to_c_string(&error)
        }
    }
}

/// Releases a string returned by any `favorites_*` function.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn favorites_free_string(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr as *mut c_char));
    }
}

fn session_ref<'a>(
    session: *mut FavoritesSession,
    caller: &str,
) -> Result<&'a FavoritesSession, *const c_char> {
    match unsafe { session.as_ref() } {
        Some(s) => Ok(s),
        None => {
            let error = AppResponse::BadRequest(format!("Null session pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Parses and validates a record coming from the host.
fn parse_record(ptr: *const c_char) -> Result<ImageRecord, *const c_char> {
    let json = c_ptr_to_string(ptr, "record JSON")?;

    let record: ImageRecord = serde_json::from_str(&json).map_err(|e| {
        let error = AppResponse::SerializationError(format!("Invalid record JSON: {e}"));
        response_to_c_string(&error)
    })?;

    record
        .validate()
        .map_err(|e| response_to_c_string(&AppResponse::from(e)))?;

    Ok(record)
}

fn list_response(session: &FavoritesSession) -> AppResponse {
    match serde_json::to_string(&session.provider.list_favorites()) {
        Ok(json) => AppResponse::Ok(json),
        Err(e) => AppResponse::from(e),
    }
}

fn mutation_response(
    session: &FavoritesSession,
    outcome: &favorites_registry::MutationOutcome,
) -> *const c_char {
    let response = match list_response(session) {
        AppResponse::Ok(list) => AppResponse::from_outcome(outcome, list),
        other => other,
    };
    response_to_c_string(&response)
}

fn event_response(event: &FavoritesEvent) -> AppResponse {
    match event {
        FavoritesEvent::Changed(list) => match serde_json::to_string(list) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => AppResponse::from(e),
        },
        FavoritesEvent::Advisory(warning) => AppResponse::from(warning.clone()),
    }
}

/// Serializes an [`AppResponse`] into a C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// On null pointers or invalid UTF-8 the error side carries a ready-made
/// `BadRequest` response for the caller to return.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
