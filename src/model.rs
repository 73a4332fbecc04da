// 该文件是 Kanlian （看脸） 项目的一部分。
// src/model.rs - 模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::{Deserialize, Serialize};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub const FACE_LANDMARK_COUNT: usize = 5;

/// 五点人脸关键点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FaceLandmark {
  LeftEye = 0,
  RightEye = 1,
  Nose = 2,
  LeftMouth = 3,
  RightMouth = 4,
}

impl From<FaceLandmark> for usize {
  fn from(landmark: FaceLandmark) -> usize {
    landmark as usize
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub landmarks: [[f32; 2]; FACE_LANDMARK_COUNT],
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn center(&self) -> [f32; 2] {
    [
      (self.bbox[0] + self.bbox[2]) / 2.0,
      (self.bbox[1] + self.bbox[3]) / 2.0,
    ]
  }

  pub fn landmark(&self, landmark: FaceLandmark) -> [f32; 2] {
    self.landmarks[usize::from(landmark)]
  }
}

/// 一次检测的最终结果，按分数降序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }

  /// 结果按分数降序，首项即最高分
  pub fn top_score(&self) -> Option<f32> {
    self.items.first().map(|item| item.score)
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

mod decode;
mod detector;
mod nms;
mod rescale;
mod retinaface;

pub use self::decode::{DetectionCandidate, StrideDecoder, bbox_pred, landmark_pred};
pub use self::detector::{DetectorError, FrameDetector, RetinaFaceDetector};
pub use self::nms::{DetectionAggregator, iou, nms};
pub use self::rescale::CoordinateRescaler;
pub use self::retinaface::{RetinaFace, RetinaFaceBuilder, RetinaFaceError};
