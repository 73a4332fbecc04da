// 该文件是 Kanlian （看脸） 项目的一部分。
// src/model/rescale.rs - 坐标还原到原图
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

use crate::model::{DetectItem, RetinaFaceError};

/// 将网络输入坐标除以 detection scale（缩放后高度 / 原图高度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateRescaler {
  scale: f32,
}

impl CoordinateRescaler {
  pub fn new(detection_scale: f32) -> Result<Self, RetinaFaceError> {
    if !detection_scale.is_finite() || detection_scale <= 0.0 {
      return Err(RetinaFaceError::InvalidScale(detection_scale));
    }
    Ok(Self {
      scale: detection_scale,
    })
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn rescale(&self, mut item: DetectItem) -> DetectItem {
    for v in item.bbox.iter_mut() {
      *v /= self.scale;
    }
    for point in item.landmarks.iter_mut() {
      point[0] /= self.scale;
      point[1] /= self.scale;
    }
    item
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  fn item() -> DetectItem {
    DetectItem {
      score: 0.9,
      bbox: [100.0, 100.0, 200.0, 200.0],
      landmarks: [
        [130.0, 130.0],
        [170.0, 130.0],
        [150.0, 150.0],
        [135.0, 175.0],
        [165.0, 175.0],
      ],
    }
  }

  #[test]
  fn half_scale_doubles_coordinates() {
    let out = CoordinateRescaler::new(0.5).unwrap().rescale(item());
    assert_eq!(out.bbox, [200.0, 200.0, 400.0, 400.0]);
    assert_eq!(out.landmarks[2], [300.0, 300.0]);
    assert_eq!(out.score, 0.9);
  }

  #[test]
  fn unit_scale_is_identity() {
    let out = CoordinateRescaler::new(1.0).unwrap().rescale(item());
    assert_eq!(out, item());
  }

  #[test]
  fn inverse_scale_restores_coordinates() {
    let s = 0.37;
    let there = CoordinateRescaler::new(s).unwrap().rescale(item());
    let back = CoordinateRescaler::new(1.0 / s).unwrap().rescale(there);
    let original = item();
    for k in 0..4 {
      assert_abs_diff_eq!(back.bbox[k], original.bbox[k], epsilon = 1e-3);
    }
    for (a, b) in back.landmarks.iter().zip(original.landmarks.iter()) {
      assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-3);
      assert_abs_diff_eq!(a[1], b[1], epsilon = 1e-3);
    }
  }

  #[test]
  fn non_positive_scale_is_rejected() {
    for s in [0.0, -1.0, f32::NAN, f32::INFINITY] {
      assert!(matches!(
        CoordinateRescaler::new(s),
        Err(RetinaFaceError::InvalidScale(_))
      ));
    }
  }
}
