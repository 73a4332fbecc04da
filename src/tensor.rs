// 该文件是 Kanlian （看脸） 项目的一部分。
// src/tensor.rs - NCHW 张量与步长输出
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
  #[error("数据长度不匹配: 形状 {shape:?} 需要 {expected} 个元素, 实际 {actual} 个")]
  LengthMismatch {
    shape: [usize; 4],
    expected: usize,
    actual: usize,
  },
  #[error("通道越界: 需要读取到第 {required} 个通道, 张量只有 {channels} 个")]
  ChannelOverflow { required: usize, channels: usize },
  #[error("形状 {0:?} 的元素个数溢出")]
  ShapeOverflow([usize; 4]),
  #[error("下标 {index:?} 超出形状 {shape:?}")]
  IndexOutOfBounds { index: [usize; 4], shape: [usize; 4] },
}

fn element_count(shape: [usize; 4]) -> Result<usize, TensorError> {
  shape
    .iter()
    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    .ok_or(TensorError::ShapeOverflow(shape))
}

/// NCHW 排布的 f32 张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNchwTensor", into = "RawNchwTensor")]
pub struct NchwTensor {
  shape: [usize; 4],
  data: Box<[f32]>,
}

#[derive(Serialize, Deserialize)]
struct RawNchwTensor {
  shape: [usize; 4],
  data: Vec<f32>,
}

impl TryFrom<RawNchwTensor> for NchwTensor {
  type Error = TensorError;

  fn try_from(raw: RawNchwTensor) -> Result<Self, Self::Error> {
    NchwTensor::new(raw.shape, raw.data)
  }
}

impl From<NchwTensor> for RawNchwTensor {
  fn from(tensor: NchwTensor) -> Self {
    RawNchwTensor {
      shape: tensor.shape,
      data: tensor.data.into_vec(),
    }
  }
}

impl NchwTensor {
  pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = element_count(shape)?;
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  pub fn zeros(shape: [usize; 4]) -> Result<Self, TensorError> {
    let len = element_count(shape)?;
    Ok(Self {
      shape,
      data: vec![0.0; len].into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> [usize; 4] {
    self.shape
  }

  pub fn batch(&self) -> usize {
    self.shape[0]
  }

  pub fn channels(&self) -> usize {
    self.shape[1]
  }

  pub fn height(&self) -> usize {
    self.shape[2]
  }

  pub fn width(&self) -> usize {
    self.shape[3]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn as_mut_slice(&mut self) -> &mut [f32] {
    &mut self.data
  }

  fn index(&self, n: usize, c: usize, h: usize, w: usize) -> usize {
    let [_, channels, height, width] = self.shape;
    ((n * channels + c) * height + h) * width + w
  }

  pub fn get(&self, n: usize, c: usize, h: usize, w: usize) -> Option<f32> {
    let [batch, channels, height, width] = self.shape;
    if n >= batch || c >= channels || h >= height || w >= width {
      return None;
    }
    Some(self.data[self.index(n, c, h, w)])
  }

  pub fn set(
    &mut self,
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    value: f32,
  ) -> Result<(), TensorError> {
    let [batch, channels, height, width] = self.shape;
    if n >= batch || c >= channels || h >= height || w >= width {
      return Err(TensorError::IndexOutOfBounds {
        index: [n, c, h, w],
        shape: self.shape,
      });
    }
    let index = self.index(n, c, h, w);
    self.data[index] = value;
    Ok(())
  }

  /// 将第 0 个批次的 `[C, H, W]` 重排为逐锚框排布。
  ///
  /// 通道 `channel_offset + a * values_per_anchor + j` 在格子 `(h, w)` 上的值，
  /// 写入输出的 `((h * W + w) * anchors_per_cell + a) * values_per_anchor + j` 处，
  /// 与锚框平铺顺序（行优先，格内按模板顺序）一致。
  pub fn gather_per_anchor(
    &self,
    anchors_per_cell: usize,
    values_per_anchor: usize,
    channel_offset: usize,
  ) -> Result<Vec<f32>, TensorError> {
    let required = channel_offset + anchors_per_cell * values_per_anchor;
    if required > self.channels() {
      return Err(TensorError::ChannelOverflow {
        required,
        channels: self.channels(),
      });
    }

    let (height, width) = (self.height(), self.width());
    let plane = height * width;
    let mut gathered = Vec::with_capacity(plane * anchors_per_cell * values_per_anchor);
    if self.batch() == 0 {
      return Ok(gathered);
    }

    for cell in 0..plane {
      for anchor in 0..anchors_per_cell {
        let base = channel_offset + anchor * values_per_anchor;
        for value in 0..values_per_anchor {
          gathered.push(self.data[(base + value) * plane + cell]);
        }
      }
    }

    Ok(gathered)
  }
}

/// 单个步长的三路原始输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStrideOutput {
  /// `[1, 2A, H, W]`，前 A 个通道为背景，后 A 个为前景
  pub scores: NchwTensor,
  /// `[1, 4A, H, W]`
  pub bbox_deltas: NchwTensor,
  /// `[1, 10A, H, W]`
  pub landmark_deltas: NchwTensor,
}

/// 按步长索引的一次推理输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrideOutputs {
  strides: BTreeMap<u32, RawStrideOutput>,
}

impl StrideOutputs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, stride: u32, output: RawStrideOutput) -> Self {
    self.insert(stride, output);
    self
  }

  pub fn insert(&mut self, stride: u32, output: RawStrideOutput) -> Option<RawStrideOutput> {
    self.strides.insert(stride, output)
  }

  pub fn get(&self, stride: u32) -> Option<&RawStrideOutput> {
    self.strides.get(&stride)
  }

  pub fn contains(&self, stride: u32) -> bool {
    self.strides.contains_key(&stride)
  }

  pub fn strides(&self) -> impl Iterator<Item = u32> + '_ {
    self.strides.keys().copied()
  }

  pub fn len(&self) -> usize {
    self.strides.len()
  }

  pub fn is_empty(&self) -> bool {
    self.strides.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_rejects_wrong_length() {
    let result = NchwTensor::new([1, 2, 3, 3], vec![0.0; 17]);
    assert_eq!(
      result,
      Err(TensorError::LengthMismatch {
        shape: [1, 2, 3, 3],
        expected: 18,
        actual: 17,
      })
    );
  }

  #[test]
  fn overflowing_shape_is_an_error() {
    let huge = 1usize << 32;
    let shape = [1, 8, huge, huge];
    assert_eq!(
      NchwTensor::new(shape, Vec::new()),
      Err(TensorError::ShapeOverflow(shape))
    );
    assert_eq!(NchwTensor::zeros(shape), Err(TensorError::ShapeOverflow(shape)));

    let json = r#"{ "shape": [1, 8, 4294967296, 4294967296], "data": [] }"#;
    assert!(serde_json::from_str::<NchwTensor>(json).is_err());
  }

  #[test]
  fn set_outside_shape_is_an_error() {
    let mut tensor = NchwTensor::zeros([1, 2, 2, 2]).unwrap();
    assert!(tensor.set(0, 1, 1, 1, 3.0).is_ok());
    assert_eq!(tensor.get(0, 1, 1, 1), Some(3.0));
    assert_eq!(
      tensor.set(0, 2, 0, 0, 1.0),
      Err(TensorError::IndexOutOfBounds {
        index: [0, 2, 0, 0],
        shape: [1, 2, 2, 2],
      })
    );
  }

  #[test]
  fn get_reads_nchw_layout() {
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let tensor = NchwTensor::new([1, 3, 2, 2], data).unwrap();
    assert_eq!(tensor.get(0, 0, 0, 0), Some(0.0));
    assert_eq!(tensor.get(0, 1, 0, 1), Some(5.0));
    assert_eq!(tensor.get(0, 2, 1, 0), Some(10.0));
    assert_eq!(tensor.get(0, 3, 0, 0), None);
  }

  #[test]
  fn gather_orders_cells_then_anchors_then_values() {
    // A = 2, k = 2, H = 1, W = 2: 通道 c 在格子 w 上的值为 c * 10 + w
    let mut tensor = NchwTensor::zeros([1, 4, 1, 2]).unwrap();
    for c in 0..4 {
      for w in 0..2 {
        tensor.set(0, c, 0, w, (c * 10 + w) as f32).unwrap();
      }
    }

    let gathered = tensor.gather_per_anchor(2, 2, 0).unwrap();
    assert_eq!(
      gathered,
      vec![0.0, 10.0, 20.0, 30.0, 1.0, 11.0, 21.0, 31.0]
    );
  }

  #[test]
  fn gather_with_offset_selects_foreground_channels() {
    // 分数张量: A = 2，背景通道 0..2，前景通道 2..4
    let mut tensor = NchwTensor::zeros([1, 4, 2, 1]).unwrap();
    for h in 0..2 {
      tensor.set(0, 2, h, 0, 0.9 - h as f32 * 0.5).unwrap();
      tensor.set(0, 3, h, 0, 0.8 - h as f32 * 0.5).unwrap();
    }

    let foreground = tensor.gather_per_anchor(2, 1, 2).unwrap();
    assert_eq!(foreground.len(), 4);
    approx::assert_abs_diff_eq!(foreground[0], 0.9, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(foreground[1], 0.8, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(foreground[2], 0.4, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(foreground[3], 0.3, epsilon = 1e-6);
  }

  #[test]
  fn gather_rejects_channel_overflow() {
    let tensor = NchwTensor::zeros([1, 4, 1, 1]).unwrap();
    assert_eq!(
      tensor.gather_per_anchor(1, 4, 1),
      Err(TensorError::ChannelOverflow {
        required: 5,
        channels: 4,
      })
    );
  }

  #[test]
  fn stride_outputs_deserialize_with_string_keys() {
    let json = r#"{
      "8": {
        "scores": { "shape": [1, 2, 1, 1], "data": [0.1, 0.9] },
        "bboxDeltas": { "shape": [1, 4, 1, 1], "data": [0, 0, 0, 0] },
        "landmarkDeltas": { "shape": [1, 10, 1, 1], "data": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0] }
      }
    }"#;

    let outputs: StrideOutputs = serde_json::from_str(json).unwrap();
    assert_eq!(outputs.len(), 1);
    let stride8 = outputs.get(8).unwrap();
    assert_eq!(stride8.scores.get(0, 1, 0, 0), Some(0.9));
  }

  #[test]
  fn deserialize_rejects_inconsistent_tensor() {
    let json = r#"{ "shape": [1, 2, 2, 2], "data": [1, 2, 3] }"#;
    let result: Result<NchwTensor, _> = serde_json::from_str(json);
    assert!(result.is_err());
  }
}
