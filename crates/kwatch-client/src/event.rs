//! Watch event types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change reported by a watch frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

impl EventKind {
    /// Wire literal of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Bookmark => "BOOKMARK",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded watch frame
///
/// On the wire a frame is `{"type": <kind>, "object": <payload>}`. Object
/// changes carry the caller's payload type `T`. Bookmarks and errors carry
/// their own shapes, so they are delivered whatever `T` is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "object",
    rename_all = "UPPERCASE",
    deny_unknown_fields
)]
pub enum WatchEvent<T = Value> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// Resume point without an object change
    Bookmark(Bookmark),
    /// Server-side failure reported inside the stream
    Error(Status),
}

impl<T> WatchEvent<T> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Added(_) => EventKind::Added,
            Self::Modified(_) => EventKind::Modified,
            Self::Deleted(_) => EventKind::Deleted,
            Self::Bookmark(_) => EventKind::Bookmark,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Changed object, for `ADDED`, `MODIFIED` and `DELETED`
    pub fn object(&self) -> Option<&T> {
        match self {
            Self::Added(object) | Self::Modified(object) | Self::Deleted(object) => Some(object),
            Self::Bookmark(_) | Self::Error(_) => None,
        }
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            Self::Added(object) | Self::Modified(object) | Self::Deleted(object) => Some(object),
            Self::Bookmark(_) | Self::Error(_) => None,
        }
    }

    pub fn bookmark(&self) -> Option<&Bookmark> {
        match self {
            Self::Bookmark(bookmark) => Some(bookmark),
            _ => None,
        }
    }

    /// Status carried by an `ERROR` frame
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Error(status) => Some(status),
            _ => None,
        }
    }

    pub fn is_bookmark(&self) -> bool {
        matches!(self, Self::Bookmark(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Transform the object payload, keeping the kind
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WatchEvent<U> {
        match self {
            Self::Added(object) => WatchEvent::Added(f(object)),
            Self::Modified(object) => WatchEvent::Modified(f(object)),
            Self::Deleted(object) => WatchEvent::Deleted(f(object)),
            Self::Bookmark(bookmark) => WatchEvent::Bookmark(bookmark),
            Self::Error(status) => WatchEvent::Error(status),
        }
    }
}

impl WatchEvent<Value> {
    /// Resume token carried in `object.metadata.resourceVersion`
    ///
    /// Present on regular object events and on bookmarks; store it to
    /// re-issue the watch from this point.
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Bookmark(bookmark) => bookmark.resource_version(),
            Self::Error(_) => None,
            Self::Added(object) | Self::Modified(object) | Self::Deleted(object) => {
                metadata_resource_version(object)
            }
        }
    }

    /// Decode the object payload into a concrete type
    pub fn object_as<U: DeserializeOwned>(&self) -> Option<U> {
        self.object()
            .and_then(|object| serde_json::from_value(object.clone()).ok())
    }
}

fn metadata_resource_version(object: &Value) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .and_then(Value::as_str)
}

/// Payload of a `BOOKMARK` frame, kept as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmark {
    pub object: Value,
}

impl Bookmark {
    /// Resume token to restart the watch from
    pub fn resource_version(&self) -> Option<&str> {
        metadata_resource_version(&self.object)
    }
}

/// Status object carried by `ERROR` frames
///
/// Decoding never fails: missing fields stay empty, and a payload that is
/// not an object is kept as the message text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct Status {
    pub code: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// `410 Gone`: the requested resume token is too old
    pub fn is_gone(&self) -> bool {
        self.code == 410
    }
}

impl From<Value> for Status {
    fn from(value: Value) -> Self {
        let text = |map: &serde_json::Map<String, Value>, key: &str| {
            map.get(key).and_then(Value::as_str).map(str::to_string)
        };

        match value {
            Value::Object(map) => Self {
                code: map
                    .get("code")
                    .and_then(Value::as_u64)
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or_default(),
                reason: text(&map, "reason"),
                message: text(&map, "message"),
            },
            Value::Null => Self::default(),
            Value::String(message) => Self {
                message: Some(message),
                ..Self::default()
            },
            other => Self {
                message: Some(other.to_string()),
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pod {
        name: String,
    }

    #[test]
    fn test_kind_wire_literals() {
        let kind: EventKind = serde_json::from_str("\"BOOKMARK\"").unwrap();
        assert_eq!(kind, EventKind::Bookmark);
        assert_eq!(EventKind::Modified.to_string(), "MODIFIED");
        assert!(serde_json::from_str::<EventKind>("\"added\"").is_err());
    }

    #[test]
    fn test_envelope_decoding() {
        let event: WatchEvent =
            serde_json::from_str(r#"{"type":"ADDED","object":{"a":1}}"#).unwrap();
        assert_eq!(event, WatchEvent::Added(json!({"a": 1})));
        assert_eq!(event.kind(), EventKind::Added);

        // Field order does not matter
        let event: WatchEvent =
            serde_json::from_str(r#"{"object":2,"type":"DELETED"}"#).unwrap();
        assert_eq!(event.into_object(), Some(json!(2)));

        for bad in [
            r#"{"type":"ADDED"}"#,
            r#"{"object":{}}"#,
            r#"{"type":"RENAMED","object":{}}"#,
            r#"{"type":"ADDED","object":{},"extra":true}"#,
        ] {
            assert!(serde_json::from_str::<WatchEvent>(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_error_frame_with_typed_payload() {
        let event: WatchEvent<Pod> = serde_json::from_str(
            concat!(
                r#"{"type":"ERROR","object":{"kind":"Status","#,
                r#""code":410,"reason":"Expired","message":"too old"}}"#,
            ),
        )
        .unwrap();

        assert!(event.is_error());
        let status = event.status().unwrap();
        assert!(status.is_gone());
        assert_eq!(status.reason.as_deref(), Some("Expired"));
        assert!(event.object().is_none());

        let added: WatchEvent<Pod> =
            serde_json::from_str(r#"{"type":"ADDED","object":{"name":"web-0"}}"#).unwrap();
        assert_eq!(added.object().map(|pod| pod.name.as_str()), Some("web-0"));
    }

    #[test]
    fn test_bookmark_with_typed_payload() {
        let event: WatchEvent<Pod> = serde_json::from_str(
            concat!(
                r#"{"type":"BOOKMARK","object":{"kind":"Pod","#,
                r#""metadata":{"resourceVersion":"12345"}}}"#,
            ),
        )
        .unwrap();

        assert!(event.is_bookmark());
        assert_eq!(event.bookmark().unwrap().resource_version(), Some("12345"));
    }

    #[test]
    fn test_status_never_rejects() {
        assert_eq!(
            Status::from(json!("backend unavailable")),
            Status {
                code: 0,
                reason: None,
                message: Some("backend unavailable".to_string()),
            }
        );
        assert_eq!(Status::from(json!(503)).message.as_deref(), Some("503"));
        assert_eq!(Status::from(json!({"code": 70000})).code, 0);
        assert_eq!(Status::from(Value::Null), Status::default());
    }

    #[test]
    fn test_resource_version() {
        let event = WatchEvent::Modified(json!({"metadata": {"resourceVersion": "7"}}));
        assert_eq!(event.resource_version(), Some("7"));

        let bare = WatchEvent::Added(json!("opaque"));
        assert_eq!(bare.resource_version(), None);

        let error: WatchEvent = WatchEvent::Error(Status::default());
        assert_eq!(error.resource_version(), None);
    }

    #[test]
    fn test_serializes_wire_shape() {
        let event = WatchEvent::Added(json!({"a": 1}));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "ADDED", "object": {"a": 1}})
        );

        let error: WatchEvent = WatchEvent::Error(Status {
            code: 410,
            reason: Some("Expired".to_string()),
            message: None,
        });
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "ERROR", "object": {"code": 410, "reason": "Expired"}})
        );
    }

    #[test]
    fn test_map_keeps_kind() {
        let event = WatchEvent::Deleted(7u32).map(|n| n * 2);
        assert_eq!(event, WatchEvent::Deleted(14));

        let error = WatchEvent::<u32>::Error(Status::default()).map(|n| n * 2);
        assert!(error.is_error());
    }
}
