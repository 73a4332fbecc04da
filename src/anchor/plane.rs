// 该文件是 Kanlian （看脸） 项目的一部分。
// src/anchor/plane.rs - 锚框平铺
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

use super::{AnchorBox, AnchorTemplate};

/// 平铺到整个特征图上的锚框，长度为 `H * W * A`
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSet {
  stride: u32,
  height: usize,
  width: usize,
  anchors_per_cell: usize,
  boxes: Box<[AnchorBox]>,
}

impl AnchorTemplate {
  /// 按行优先遍历特征格，每格平移 `(col * stride, row * stride)` 后按模板顺序追加
  pub fn tile(&self, height: usize, width: usize) -> AnchorSet {
    let stride = self.stride() as f32;
    let mut boxes = Vec::with_capacity(height * width * self.len());

    for row in 0..height {
      let shift_y = row as f32 * stride;
      for col in 0..width {
        let shift_x = col as f32 * stride;
        boxes.extend(self.boxes().iter().map(|b| {
          [b[0] + shift_x, b[1] + shift_y, b[2] + shift_x, b[3] + shift_y]
        }));
      }
    }

    AnchorSet {
      stride: self.stride(),
      height,
      width,
      anchors_per_cell: self.len(),
      boxes: boxes.into_boxed_slice(),
    }
  }
}

impl AnchorSet {
  pub fn stride(&self) -> u32 {
    self.stride
  }

  /// 特征图尺寸 (高, 宽)
  pub fn grid(&self) -> (usize, usize) {
    (self.height, self.width)
  }

  pub fn anchors_per_cell(&self) -> usize {
    self.anchors_per_cell
  }

  pub fn boxes(&self) -> &[AnchorBox] {
    &self.boxes
  }

  pub fn get(&self, index: usize) -> Option<&AnchorBox> {
    self.boxes.get(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, AnchorBox> {
    self.boxes.iter()
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }
}
