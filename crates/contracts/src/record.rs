//! Record - one typed, time-stamped unit of telemetry
//!
//! Produced by the dispatcher, persisted by the log stream, published on the bus.

use bytes::Bytes;
use serde::Serialize;

use crate::{LogDict, Value};

/// Telemetry record
///
/// The discriminator drives handling downstream (plotting, image store,
/// video playback, UI commands).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    /// Scalar/array samples at one point in time
    Sample { time: f64, payload: LogDict },

    /// Encoded image (e.g. JPEG) for a named camera
    Image { name: String, time: f64, data: Bytes },

    /// Metadata of a video segment served elsewhere
    VideoSegment {
        name: String,
        segment: Value,
        init_file: String,
        base_url: String,
    },

    /// UI directive such as "clear" or "zoomReset"
    Command { name: String, payload: Value },

    /// Time-independent values (scene meshes, layout, constants)
    Static { payload: LogDict },
}

/// Record discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Sample,
    Image,
    VideoSegment,
    Command,
    Static,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Image => "image",
            Self::VideoSegment => "video_segment",
            Self::Command => "command",
            Self::Static => "static",
        }
    }

    /// Parse from the snake_case name used in CLI filters
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sample" => Some(Self::Sample),
            "image" => Some(Self::Image),
            "video_segment" => Some(Self::VideoSegment),
            "command" => Some(Self::Command),
            "static" => Some(Self::Static),
            _ => None,
        }
    }
}

impl Record {
    /// Build a command record
    pub fn command(name: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self::Command {
            name: name.into(),
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Sample { .. } => RecordKind::Sample,
            Self::Image { .. } => RecordKind::Image,
            Self::VideoSegment { .. } => RecordKind::VideoSegment,
            Self::Command { .. } => RecordKind::Command,
            Self::Static { .. } => RecordKind::Static,
        }
    }

    /// Record time, if the variant carries one
    pub fn time(&self) -> Option<f64> {
        match self {
            Self::Sample { time, .. } | Self::Image { time, .. } => Some(*time),
            _ => None,
        }
    }

    /// Sample/static payload, if any
    pub fn payload(&self) -> Option<&LogDict> {
        match self {
            Self::Sample { payload, .. } | Self::Static { payload } => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_and_time() {
        let mut payload = LogDict::new();
        payload.insert("x".into(), Value::Int(1));
        let sample = Record::Sample { time: 1.5, payload };
        assert_eq!(sample.kind(), RecordKind::Sample);
        assert_eq!(sample.time(), Some(1.5));
        assert!(sample.payload().is_some());

        let cmd = Record::command("zoomReset", Value::Map(Default::default()));
        assert_eq!(cmd.kind(), RecordKind::Command);
        assert_eq!(cmd.time(), None);
    }

    #[test]
    fn test_record_kind_names_round_trip() {
        for kind in [
            RecordKind::Sample,
            RecordKind::Image,
            RecordKind::VideoSegment,
            RecordKind::Command,
            RecordKind::Static,
        ] {
            assert_eq!(RecordKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(RecordKind::from_name("mesh"), None);
    }

    #[test]
    fn test_record_serializes_with_type_tag() {
        let record = Record::command("clear", Value::Null);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""type":"command""#));
        assert!(json.contains(r#""name":"clear""#));
    }
}
