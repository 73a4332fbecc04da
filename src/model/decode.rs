// 该文件是 Kanlian （看脸） 项目的一部分。
// src/model/decode.rs - 单步长输出解码
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

use tracing::debug;

use crate::{
  anchor::{AnchorBox, AnchorSet},
  model::{DetectItem, FACE_LANDMARK_COUNT, RetinaFaceError},
  tensor::{NchwTensor, RawStrideOutput},
};

const SCORE_CHANNELS: usize = 2;
pub(super) const BBOX_VALUES: usize = 4;
const LANDMARK_VALUES: usize = 2 * FACE_LANDMARK_COUNT;

/// 网络输入坐标系下的候选检测
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCandidate {
  pub bbox: [f32; 4],
  pub landmarks: [[f32; 2]; FACE_LANDMARK_COUNT],
  pub score: f32,
  pub stride: u32,
  /// 在本步长锚框集合中的下标
  pub anchor_index: usize,
}

impl From<DetectionCandidate> for DetectItem {
  fn from(candidate: DetectionCandidate) -> Self {
    DetectItem {
      score: candidate.score,
      bbox: candidate.bbox,
      landmarks: candidate.landmarks,
    }
  }
}

/// 锚框的 (宽, 高, 中心 x, 中心 y)
fn anchor_geometry(anchor: &AnchorBox) -> (f32, f32, f32, f32) {
  let w = anchor[2] - anchor[0] + 1.0;
  let h = anchor[3] - anchor[1] + 1.0;
  (w, h, anchor[0] + 0.5 * (w - 1.0), anchor[1] + 0.5 * (h - 1.0))
}

/// 边框回归: 中心平移 + 对数尺度
pub fn bbox_pred(anchor: &AnchorBox, delta: &[f32; 4], bbox_std: &[f32; 4]) -> [f32; 4] {
  let (w, h, cx, cy) = anchor_geometry(anchor);

  let pred_cx = delta[0] * bbox_std[0] * w + cx;
  let pred_cy = delta[1] * bbox_std[1] * h + cy;
  let pred_w = (delta[2] * bbox_std[2]).exp() * w;
  let pred_h = (delta[3] * bbox_std[3]).exp() * h;

  [
    pred_cx - 0.5 * (pred_w - 1.0),
    pred_cy - 0.5 * (pred_h - 1.0),
    pred_cx + 0.5 * (pred_w - 1.0),
    pred_cy + 0.5 * (pred_h - 1.0),
  ]
}

/// 关键点回归，与边框共用锚框的宽高与中心
pub fn landmark_pred(
  anchor: &AnchorBox,
  deltas: &[f32; LANDMARK_VALUES],
  landmark_std: f32,
) -> [[f32; 2]; FACE_LANDMARK_COUNT] {
  let (w, h, cx, cy) = anchor_geometry(anchor);
  std::array::from_fn(|i| {
    [
      deltas[2 * i] * landmark_std * w + cx,
      deltas[2 * i + 1] * landmark_std * h + cy,
    ]
  })
}

/// 将一个步长的原始输出与锚框逐一配对解码
pub struct StrideDecoder<'a> {
  anchors: &'a AnchorSet,
  bbox_std: [f32; 4],
  landmark_std: f32,
}

impl<'a> StrideDecoder<'a> {
  pub fn new(anchors: &'a AnchorSet, bbox_std: [f32; 4], landmark_std: f32) -> Self {
    Self {
      anchors,
      bbox_std,
      landmark_std,
    }
  }

  fn check_shape(
    &self,
    name: &'static str,
    tensor: &NchwTensor,
    values_per_anchor: usize,
  ) -> Result<(), RetinaFaceError> {
    let (height, width) = self.anchors.grid();
    let expected = [
      1,
      values_per_anchor * self.anchors.anchors_per_cell(),
      height,
      width,
    ];
    if tensor.shape() != expected {
      return Err(RetinaFaceError::ShapeMismatch {
        stride: self.anchors.stride(),
        tensor: name,
        detail: format!("期望 {:?}, 实际 {:?}", expected, tensor.shape()),
      });
    }
    Ok(())
  }

  /// 输出与锚框等长、未经过滤的候选列表
  pub fn decode(&self, output: &RawStrideOutput) -> Result<Vec<DetectionCandidate>, RetinaFaceError> {
    let stride = self.anchors.stride();
    if self.anchors.is_empty() {
      debug!("步长 {}: 锚框为空, 跳过解码", stride);
      return Ok(Vec::new());
    }

    self.check_shape("scores", &output.scores, SCORE_CHANNELS)?;
    self.check_shape("bbox_deltas", &output.bbox_deltas, BBOX_VALUES)?;
    self.check_shape("landmark_deltas", &output.landmark_deltas, LANDMARK_VALUES)?;

    let a = self.anchors.anchors_per_cell();
    // 前 A 个通道为背景概率, 后 A 个为前景概率
    let scores = output.scores.gather_per_anchor(a, 1, a)?;
    let bbox_deltas = output.bbox_deltas.gather_per_anchor(a, BBOX_VALUES, 0)?;
    let landmark_deltas = output
      .landmark_deltas
      .gather_per_anchor(a, LANDMARK_VALUES, 0)?;

    let candidates: Vec<DetectionCandidate> = self
      .anchors
      .iter()
      .zip(scores)
      .zip(bbox_deltas.chunks_exact(BBOX_VALUES))
      .zip(landmark_deltas.chunks_exact(LANDMARK_VALUES))
      .enumerate()
      .map(|(anchor_index, (((anchor, score), delta), landmark))| {
        let mut delta4 = [0.0; BBOX_VALUES];
        delta4.copy_from_slice(delta);
        let mut delta10 = [0.0; LANDMARK_VALUES];
        delta10.copy_from_slice(landmark);

        DetectionCandidate {
          bbox: bbox_pred(anchor, &delta4, &self.bbox_std),
          landmarks: landmark_pred(anchor, &delta10, self.landmark_std),
          score,
          stride,
          anchor_index,
        }
      })
      .collect();

    debug!("步长 {}: 解码 {} 个候选", stride, candidates.len());
    Ok(candidates)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{anchor::AnchorTemplate, config::StrideConfig};
  use approx::assert_abs_diff_eq;

  /// 回归目标构造，bbox_pred 的逆运算
  fn bbox_target(anchor: &AnchorBox, gt: &[f32; 4], bbox_std: &[f32; 4]) -> [f32; 4] {
    let (w, h, cx, cy) = anchor_geometry(anchor);
    let gt_w = gt[2] - gt[0] + 1.0;
    let gt_h = gt[3] - gt[1] + 1.0;
    let gt_cx = gt[0] + 0.5 * (gt_w - 1.0);
    let gt_cy = gt[1] + 0.5 * (gt_h - 1.0);
    [
      (gt_cx - cx) / w / bbox_std[0],
      (gt_cy - cy) / h / bbox_std[1],
      (gt_w / w).ln() / bbox_std[2],
      (gt_h / h).ln() / bbox_std[3],
    ]
  }

  fn stride_anchors(height: usize, width: usize) -> AnchorSet {
    AnchorTemplate::generate(&StrideConfig::new(16, 16, vec![1.0], vec![8.0, 4.0]))
      .unwrap()
      .tile(height, width)
  }

  fn zero_output(a: usize, height: usize, width: usize) -> RawStrideOutput {
    RawStrideOutput {
      scores: NchwTensor::zeros([1, 2 * a, height, width]).unwrap(),
      bbox_deltas: NchwTensor::zeros([1, 4 * a, height, width]).unwrap(),
      landmark_deltas: NchwTensor::zeros([1, 10 * a, height, width]).unwrap(),
    }
  }

  #[test]
  fn zero_delta_reproduces_anchor() {
    let anchor = [-248.0, -248.0, 263.0, 263.0];
    let decoded = bbox_pred(&anchor, &[0.0; 4], &[1.0; 4]);
    assert_eq!(decoded, anchor);
  }

  #[test]
  fn decode_inverts_target_construction() {
    let anchors = [
      [0.0, 0.0, 15.0, 15.0],
      [-56.0, -56.0, 71.0, 71.0],
      [100.5, 40.0, 180.0, 99.0],
    ];
    let boxes = [
      [3.0, 4.0, 20.0, 30.0],
      [-10.0, 12.5, 88.0, 60.0],
      [120.0, 50.0, 150.0, 140.0],
    ];
    for bbox_std in [[1.0; 4], [0.1, 0.1, 0.2, 0.2]] {
      for anchor in &anchors {
        for gt in &boxes {
          let delta = bbox_target(anchor, gt, &bbox_std);
          let decoded = bbox_pred(anchor, &delta, &bbox_std);
          for k in 0..4 {
            assert_abs_diff_eq!(decoded[k], gt[k], epsilon = 1e-2);
          }
        }
      }
    }
  }

  #[test]
  fn landmark_offsets_scale_with_anchor_size() {
    // 宽高 16, 中心 (7.5, 7.5)
    let anchor = [0.0, 0.0, 15.0, 15.0];
    let mut deltas = [0.0; LANDMARK_VALUES];
    deltas[0] = 0.5;
    deltas[1] = -0.25;
    deltas[9] = 1.0;
    let points = landmark_pred(&anchor, &deltas, 1.0);
    assert_eq!(points[0], [15.5, 3.5]);
    assert_eq!(points[1], [7.5, 7.5]);
    assert_eq!(points[4], [7.5, 23.5]);

    let halved = landmark_pred(&anchor, &deltas, 0.5);
    assert_eq!(halved[0], [11.5, 5.5]);
  }

  #[test]
  fn decode_pairs_anchor_with_foreground_score() {
    let anchors = stride_anchors(2, 3);
    let a = anchors.anchors_per_cell();
    let mut output = zero_output(a, 2, 3);
    // 格子 (1, 2) 的第 1 个锚框: 下标 (1 * 3 + 2) * 2 + 1 = 11
    output.scores.set(0, a + 1, 1, 2, 0.95).unwrap();
    output.scores.set(0, 1, 1, 2, 0.05).unwrap();
    output.bbox_deltas.set(0, 4 + 2, 1, 2, 0.5f32.ln()).unwrap();

    let decoder = StrideDecoder::new(&anchors, [1.0; 4], 1.0);
    let candidates = decoder.decode(&output).unwrap();
    assert_eq!(candidates.len(), anchors.len());

    let hit = &candidates[11];
    assert_eq!(hit.anchor_index, 11);
    assert_eq!(hit.stride, 16);
    assert_abs_diff_eq!(hit.score, 0.95);

    let anchor = anchors.boxes()[11];
    let (w, _, cx, _) = anchor_geometry(&anchor);
    assert_abs_diff_eq!(hit.bbox[2] - hit.bbox[0] + 1.0, w * 0.5, epsilon = 1e-3);
    assert_abs_diff_eq!((hit.bbox[0] + hit.bbox[2]) / 2.0, cx, epsilon = 1e-3);
    assert_eq!(hit.bbox[1], anchor[1]);

    assert!(
      candidates
        .iter()
        .enumerate()
        .all(|(i, c)| i == 11 || c.score == 0.0)
    );
  }

  #[test]
  fn landmark_channels_follow_their_anchor() {
    let anchors = stride_anchors(2, 3);
    let a = anchors.anchors_per_cell();
    let mut output = zero_output(a, 2, 3);
    // 格子 (1, 2): 第 0 个锚框下标 10, 第 1 个锚框下标 11
    // 通道 10 * a + 2 * i 为第 i 个点的 x, 其后一个为 y
    output.landmark_deltas.set(0, 10 + 2 * 3, 1, 2, 0.5).unwrap();
    output.landmark_deltas.set(0, 10 + 2 * 3 + 1, 1, 2, -0.25).unwrap();
    output.landmark_deltas.set(0, 2 * 3, 1, 2, 1.0).unwrap();

    let decoder = StrideDecoder::new(&anchors, [1.0; 4], 1.0);
    let candidates = decoder.decode(&output).unwrap();

    let (w, h, cx, cy) = anchor_geometry(&anchors.boxes()[11]);
    let hit = &candidates[11].landmarks;
    assert_abs_diff_eq!(hit[3][0], 0.5 * w + cx, epsilon = 1e-4);
    assert_abs_diff_eq!(hit[3][1], -0.25 * h + cy, epsilon = 1e-4);
    for i in [0, 1, 2, 4] {
      assert_eq!(hit[i], [cx, cy]);
    }

    let (w0, _, cx0, cy0) = anchor_geometry(&anchors.boxes()[10]);
    let neighbour = &candidates[10].landmarks;
    assert_abs_diff_eq!(neighbour[3][0], w0 + cx0, epsilon = 1e-4);
    assert_eq!(neighbour[3][1], cy0);

    let (_, _, cx9, cy9) = anchor_geometry(&anchors.boxes()[9]);
    assert!(candidates[9].landmarks.iter().all(|p| *p == [cx9, cy9]));
  }

  #[test]
  fn score_channel_mismatch_is_error() {
    let anchors = stride_anchors(2, 2);
    let mut output = zero_output(2, 2, 2);
    output.scores = NchwTensor::zeros([1, 2, 2, 2]).unwrap();
    let decoder = StrideDecoder::new(&anchors, [1.0; 4], 1.0);
    assert!(matches!(
      decoder.decode(&output),
      Err(RetinaFaceError::ShapeMismatch { stride: 16, tensor: "scores", .. })
    ));
  }

  #[test]
  fn landmark_spatial_mismatch_is_error() {
    let anchors = stride_anchors(2, 2);
    let mut output = zero_output(2, 2, 2);
    output.landmark_deltas = NchwTensor::zeros([1, 20, 2, 3]).unwrap();
    let decoder = StrideDecoder::new(&anchors, [1.0; 4], 1.0);
    assert!(matches!(
      decoder.decode(&output),
      Err(RetinaFaceError::ShapeMismatch {
        tensor: "landmark_deltas",
        ..
      })
    ));
  }

  #[test]
  fn empty_anchor_set_yields_no_candidates() {
    let anchors = stride_anchors(0, 0);
    let output = zero_output(2, 0, 0);
    let decoder = StrideDecoder::new(&anchors, [1.0; 4], 1.0);
    assert!(decoder.decode(&output).unwrap().is_empty());
  }
}
