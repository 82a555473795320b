//! Host operation names.
//!
//! These strings are the versioned contract with the host shell. Renaming
//! one breaks every deployed host, so add a new name next to the old one
//! instead.

use core_runtime::Fault;
use serde_json::Value;

pub const LAUNCHER_SET_TOOLTIP: &str = "/nuvola/launcher/set-tooltip";
pub const LAUNCHER_SET_ACTIONS: &str = "/nuvola/launcher/set-actions";
pub const LAUNCHER_REMOVE_ACTIONS: &str = "/nuvola/launcher/remove-actions";
pub const LAUNCHER_ADD_ACTION: &str = "/nuvola/launcher/add-action";
pub const LAUNCHER_REMOVE_ACTION: &str = "/nuvola/launcher/remove-action";

pub const NOTIFICATION_UPDATE: &str = "/nuvola/notification/update";
pub const NOTIFICATION_SET_ACTIONS: &str = "/nuvola/notification/set-actions";
pub const NOTIFICATION_REMOVE_ACTIONS: &str = "/nuvola/notification/remove-actions";
pub const NOTIFICATION_SHOW: &str = "/nuvola/notification/show";

pub const NOTIFICATIONS_SHOW: &str = "/nuvola/notifications/show-notification";
pub const NOTIFICATIONS_IS_PERSISTENCE_SUPPORTED: &str =
    "/nuvola/notifications/is-persistence-supported";

pub const STORAGE_SET_DEFAULT: &str = "/nuvola/storage/set-default";
pub const STORAGE_HAS_KEY: &str = "/nuvola/storage/has-key";
pub const STORAGE_GET_VALUE: &str = "/nuvola/storage/get-value";
pub const STORAGE_SET_VALUE: &str = "/nuvola/storage/set-value";

/// Host signal names.
pub const SIGNAL_CONFIG_CHANGED: &str = "ConfigChanged";
pub const SIGNAL_MEDIA_KEY_PRESSED: &str = "MediaKeyPressed";

/// Remote error code the host uses for a key with neither value nor default.
pub const KEY_NOT_FOUND_CODE: &str = "key-not-found";

/// Placeholder older hosts return instead of failing on an unset key.
pub const UNDEFINED_SENTINEL: &str = "<UNDEFINED>";

/// Turn the two host spellings of "unset key" into [`Fault::KeyNotFound`].
pub(crate) fn resolve_lookup(result: Result<Value, Fault>, key: &str) -> Result<Value, Fault> {
    match result {
        Ok(Value::String(s)) if s == UNDEFINED_SENTINEL => Err(Fault::KeyNotFound(key.to_string())),
        Err(Fault::Remote { code, .. }) if code == KEY_NOT_FOUND_CODE => {
            Err(Fault::KeyNotFound(key.to_string()))
        }
        other => other,
    }
}

/// Argument at `position`, with missing, null, empty or `false` values
/// becoming an empty string.
pub(crate) fn text_or_empty(args: &[Value], position: usize) -> Value {
    match args.get(position) {
        Some(value) if truthy(Some(value)) => value.clone(),
        _ => Value::String(String::new()),
    }
}

/// Loose truthiness as page scripts see it.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
