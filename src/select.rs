// 该文件是 Kanlian （看脸） 项目的一部分。
// src/select.rs - 主人脸选取
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
use tracing::debug;

use crate::{
  config::ConfigError,
  model::{DetectItem, DetectResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FaceSelectionConfig {
  /// 人脸中心允许偏离画面中线的比例（向左）
  pub margin_center_left_ratio: f32,
  pub margin_center_right_ratio: f32,
  /// 四周留白比例
  pub margin_edge_ratio: f32,
  /// 人脸面积占整幅图像的最小比例
  pub minimum_face_ratio: f32,
  pub minimum_width_height_ratio: f32,
  pub maximum_width_height_ratio: f32,
}

impl Default for FaceSelectionConfig {
  fn default() -> Self {
    Self {
      margin_center_left_ratio: 0.3,
      margin_center_right_ratio: 0.3,
      margin_edge_ratio: 0.1,
      minimum_face_ratio: 0.0075,
      minimum_width_height_ratio: 0.65,
      maximum_width_height_ratio: 1.1,
    }
  }
}

impl FaceSelectionConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    let fields = [
      ("marginCenterLeftRatio", self.margin_center_left_ratio),
      ("marginCenterRightRatio", self.margin_center_right_ratio),
      ("marginEdgeRatio", self.margin_edge_ratio),
      ("minimumFaceRatio", self.minimum_face_ratio),
      ("minimumWidthHeightRatio", self.minimum_width_height_ratio),
      ("maximumWidthHeightRatio", self.maximum_width_height_ratio),
    ];
    for (name, value) in fields {
      if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidConstant { name, value });
      }
    }
    if self.maximum_width_height_ratio < self.minimum_width_height_ratio {
      return Err(ConfigError::InvalidConstant {
        name: "maximumWidthHeightRatio",
        value: self.maximum_width_height_ratio,
      });
    }
    Ok(())
  }
}

/// 从一次检测结果中挑出位置居中、大小合适的最大人脸
#[derive(Debug, Clone, Default)]
pub struct FaceSelector {
  config: FaceSelectionConfig,
}

impl FaceSelector {
  pub fn new(config: FaceSelectionConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &FaceSelectionConfig {
    &self.config
  }

  pub fn accepts(&self, item: &DetectItem, width: u32, height: u32) -> bool {
    let (w, h) = (width as f32, height as f32);
    let c = &self.config;

    let (face_w, face_h) = (item.width(), item.height());
    if face_w <= 0.0 || face_h <= 0.0 {
      return false;
    }
    if item.area() < c.minimum_face_ratio * w * h {
      return false;
    }

    let aspect = face_w / face_h;
    if aspect < c.minimum_width_height_ratio || aspect > c.maximum_width_height_ratio {
      return false;
    }

    let [cx, _] = item.center();
    if cx < w * (0.5 - c.margin_center_left_ratio) || cx > w * (0.5 + c.margin_center_right_ratio) {
      return false;
    }

    let (edge_x, edge_y) = (c.margin_edge_ratio * w, c.margin_edge_ratio * h);
    item.bbox[0] >= edge_x
      && item.bbox[1] >= edge_y
      && item.bbox[2] <= w - edge_x
      && item.bbox[3] <= h - edge_y
  }

  /// 面积相同时取排在前面（分数更高）的那个
  pub fn select<'a>(
    &self,
    result: &'a DetectResult,
    width: u32,
    height: u32,
  ) -> Option<&'a DetectItem> {
    let selected = result
      .iter()
      .filter(|item| self.accepts(item, width, height))
      .fold(None, |best: Option<&DetectItem>, item| match best {
        Some(b) if b.area() >= item.area() => Some(b),
        _ => Some(item),
      });
    debug!(
      "{} 张人脸中选出: {:?}",
      result.len(),
      selected.map(|item| item.bbox)
    );
    selected
  }
}
