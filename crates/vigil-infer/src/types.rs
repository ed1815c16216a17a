use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_base::{Rect, Tensor, Vec2};

/// Model head architecture; the numeric codes are what the configuration
/// file stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskType {
    Classify,
    Detect,
    Segment,
    Pose,
    ObbDetect,
}

impl TaskType {
    pub fn code(self) -> u8 {
        match self {
            TaskType::Classify => 0,
            TaskType::Detect => 1,
            TaskType::Segment => 3,
            TaskType::Pose => 5,
            TaskType::ObbDetect => 6,
        }
    }
}

impl TryFrom<u8> for TaskType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TaskType::Classify),
            1 => Ok(TaskType::Detect),
            3 => Ok(TaskType::Segment),
            5 => Ok(TaskType::Pose),
            6 => Ok(TaskType::ObbDetect),
            other => Err(format!("unknown task type code {other}")),
        }
    }
}

impl From<TaskType> for u8 {
    fn from(task: TaskType) -> u8 {
        task.code()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Classify => "classify",
            TaskType::Detect => "detect",
            TaskType::Segment => "segment",
            TaskType::Pose => "pose",
            TaskType::ObbDetect => "obb",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub position: Vec2<f32>,
    pub confidence: f32,
}

/// One detected object in source-image pixel coordinates.
///
/// The box is stored center-based; edge coordinates and area are derived.
/// `angle` is set for oriented-box models, `keypoints` for pose models
/// and `mask` (in prototype resolution) for segmentation models.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub angle: Option<f32>,
    pub keypoints: Option<Vec<Keypoint>>,
    pub mask: Option<Tensor<f32>>,
}

impl Detection {
    pub fn new(cx: f32, cy: f32, width: f32, height: f32, confidence: f32, class_id: usize) -> Self {
        Self { cx, cy, width, height, confidence, class_id, angle: None, keypoints: None, mask: None }
    }

    pub fn left(&self) -> f32 {
        self.cx - self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.cy - self.height / 2.0
    }

    pub fn right(&self) -> f32 {
        self.cx + self.width / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.cy + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn rect(&self) -> Rect<f32> {
        Rect::from_center_size(Vec2::new(self.cx, self.cy), Vec2::new(self.width, self.height))
    }
}
