// 该文件是 Kanlian （看脸） 项目的一部分。
// src/anchor.rs - 锚框
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

use std::borrow::Cow;

use tracing::debug;

use crate::config::{ConfigError, RetinaFaceConfig};

/// [x_min, y_min, x_max, y_max]，像素中心约定
pub type AnchorBox = [f32; 4];

mod plane;
mod template;

pub use self::plane::AnchorSet;
pub use self::template::AnchorTemplate;

#[derive(Debug, Clone)]
struct AnchorEntry {
  template: AnchorTemplate,
  plane: AnchorSet,
}

/// 步长到锚框的只读查找表。
///
/// 构造时为每个步长生成模板，并按网络输入尺寸预先平铺一次；之后只读，可跨线程共享。
#[derive(Debug, Clone)]
pub struct AnchorTable {
  entries: Box<[AnchorEntry]>,
}

impl AnchorTable {
  pub fn build(config: &RetinaFaceConfig) -> Result<Self, ConfigError> {
    config.validate()?;

    let (input_w, input_h) = config.input_size;
    let entries = config
      .strides
      .iter()
      .map(|stride| {
        let template = AnchorTemplate::generate(stride)?;
        let height = input_h.div_ceil(stride.stride) as usize;
        let width = input_w.div_ceil(stride.stride) as usize;
        let plane = template.tile(height, width);
        debug!(
          "步长 {}: 每格 {} 个锚框, 特征图 {}x{}, 共 {} 个锚框",
          stride.stride,
          template.len(),
          height,
          width,
          plane.len()
        );
        Ok(AnchorEntry { template, plane })
      })
      .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(Self {
      entries: entries.into_boxed_slice(),
    })
  }

  fn entry(&self, stride: u32) -> Option<&AnchorEntry> {
    self.entries.iter().find(|e| e.template.stride() == stride)
  }

  /// 按配置顺序返回所有步长
  pub fn strides(&self) -> impl Iterator<Item = u32> + '_ {
    self.entries.iter().map(|e| e.template.stride())
  }

  pub fn template(&self, stride: u32) -> Option<&AnchorTemplate> {
    self.entry(stride).map(|e| &e.template)
  }

  pub fn anchors_per_cell(&self, stride: u32) -> Option<usize> {
    self.entry(stride).map(|e| e.template.len())
  }

  /// 取得给定特征图尺寸的锚框。尺寸与预平铺结果一致时直接借用，否则临时平铺。
  pub fn anchors(&self, stride: u32, height: usize, width: usize) -> Option<Cow<'_, AnchorSet>> {
    let entry = self.entry(stride)?;
    if entry.plane.grid() == (height, width) {
      Some(Cow::Borrowed(&entry.plane))
    } else {
      debug!(
        "步长 {}: 特征图 {}x{} 与预平铺尺寸 {:?} 不同, 重新平铺",
        stride,
        height,
        width,
        entry.plane.grid()
      );
      Some(Cow::Owned(entry.template.tile(height, width)))
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
