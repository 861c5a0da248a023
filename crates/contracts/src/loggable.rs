//! Loggable trait and scene-record helpers
//!
//! Values that know how to turn themselves into a sample payload. The 3-D
//! scene producer emits already-normalized poses and colors under the
//! `3d/<object>/pos` and `3d/<object>/color` keys.

use crate::{LogDict, NumericArray, Value};

/// Conversion into a sample payload
pub trait Loggable {
    /// Flatten into `name -> value` entries
    fn to_log_dict(&self) -> LogDict;
}

impl Loggable for LogDict {
    fn to_log_dict(&self) -> LogDict {
        self.clone()
    }
}

/// Payload key of an object's pose
pub fn pos_key(object: &str) -> String {
    format!("3d/{object}/pos")
}

/// Payload key of an object's color
pub fn color_key(object: &str) -> String {
    format!("3d/{object}/color")
}

/// Pose and optional color of one scene object
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    /// x, y, z
    pub translation: [f32; 3],
    /// Quaternion in x, y, z, w order
    pub rotation: [f32; 4],
    /// r, g, b, a
    pub color: Option<[u8; 4]>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, translation: [f32; 3], rotation: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            translation,
            rotation,
            color: None,
        }
    }

    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = Some(color);
        self
    }

    fn pose_array(&self) -> NumericArray {
        let mut pose = Vec::with_capacity(7);
        pose.extend_from_slice(&self.translation);
        pose.extend_from_slice(&self.rotation);
        NumericArray::F32(pose)
    }
}

/// Batch of scene object updates logged as one sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneUpdate {
    pub objects: Vec<SceneObject>,
}

impl SceneUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: SceneObject) -> &mut Self {
        self.objects.push(object);
        self
    }
}

impl Loggable for SceneUpdate {
    fn to_log_dict(&self) -> LogDict {
        let mut dict = LogDict::new();
        for object in &self.objects {
            dict.insert(pos_key(&object.name), Value::Array(object.pose_array()));
            if let Some(color) = object.color {
                dict.insert(
                    color_key(&object.name),
                    Value::Array(NumericArray::U8(color.to_vec())),
                );
            }
        }
        dict
    }
}
