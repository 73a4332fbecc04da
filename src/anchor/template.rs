// 该文件是 Kanlian （看脸） 项目的一部分。
// src/anchor/template.rs - 锚框模板生成
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

use crate::config::{ConfigError, StrideConfig};

use super::AnchorBox;

/// 单个特征格上的参考锚框集合，按 宽高比优先、尺度其次 排列
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTemplate {
  stride: u32,
  boxes: Box<[AnchorBox]>,
}

impl AnchorTemplate {
  /// 以 `(0, 0, base_size - 1, base_size - 1)` 为参考框，枚举宽高比与尺度。
  pub fn generate(config: &StrideConfig) -> Result<Self, ConfigError> {
    config.validate()?;

    let base = f64::from(config.base_size);
    let base_anchor = [0.0, 0.0, base - 1.0, base - 1.0];

    let mut boxes = Vec::with_capacity(config.anchors_per_cell());
    for ratio_anchor in ratio_enum(base_anchor, &config.ratios) {
      boxes.extend(scale_enum(ratio_anchor, &config.scales));
    }

    if config.dense_anchor {
      let shift = f64::from(config.stride / 2);
      let shifted: Vec<_> = boxes.iter().map(|b| b.map(|v| v + shift)).collect();
      boxes.extend(shifted);
    }

    Ok(Self {
      stride: config.stride,
      boxes: boxes
        .into_iter()
        .map(|b| b.map(|v| v as f32))
        .collect(),
    })
  }

  pub fn stride(&self) -> u32 {
    self.stride
  }

  pub fn boxes(&self) -> &[AnchorBox] {
    &self.boxes
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }
}

/// 返回 (宽, 高, 中心 x, 中心 y)，宽高按像素中心约定加 1
fn whctrs(anchor: [f64; 4]) -> (f64, f64, f64, f64) {
  let w = anchor[2] - anchor[0] + 1.0;
  let h = anchor[3] - anchor[1] + 1.0;
  let x_ctr = anchor[0] + 0.5 * (w - 1.0);
  let y_ctr = anchor[1] + 0.5 * (h - 1.0);
  (w, h, x_ctr, y_ctr)
}

fn mk_anchor(w: f64, h: f64, x_ctr: f64, y_ctr: f64) -> [f64; 4] {
  [
    x_ctr - 0.5 * (w - 1.0),
    y_ctr - 0.5 * (h - 1.0),
    x_ctr + 0.5 * (w - 1.0),
    y_ctr + 0.5 * (h - 1.0),
  ]
}

// 保持面积不变的宽高比变换
fn ratio_enum(anchor: [f64; 4], ratios: &[f32]) -> Vec<[f64; 4]> {
  let (w, h, x_ctr, y_ctr) = whctrs(anchor);
  let area = w * h;
  ratios
    .iter()
    .map(|&ratio| {
      let ratio = f64::from(ratio);
      let ws = (area / ratio).sqrt().round();
      let hs = (ws * ratio).round();
      mk_anchor(ws, hs, x_ctr, y_ctr)
    })
    .collect()
}

fn scale_enum(anchor: [f64; 4], scales: &[f32]) -> impl Iterator<Item = [f64; 4]> + '_ {
  let (w, h, x_ctr, y_ctr) = whctrs(anchor);
  scales.iter().map(move |&scale| {
    let scale = f64::from(scale);
    mk_anchor(w * scale, h * scale, x_ctr, y_ctr)
  })
}
