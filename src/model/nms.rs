// 该文件是 Kanlian （看脸） 项目的一部分。
// src/model/nms.rs - 阈值过滤与非极大值抑制
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

use std::{cmp::Ordering, collections::VecDeque};

use tracing::debug;

use crate::model::DetectionCandidate;

fn area(b: &[f32; 4]) -> f32 {
  (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// 两个框的交并比，并集面积为零时返回 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = inter_w * inter_h;
  let union = area(a) + area(b) - inter;

  if union > 0.0 { inter / union } else { 0.0 }
}

// 分数降序；同分时步长小者优先，再按锚框下标
fn rank(a: &DetectionCandidate, b: &DetectionCandidate) -> Ordering {
  b.score
    .total_cmp(&a.score)
    .then(a.stride.cmp(&b.stride))
    .then(a.anchor_index.cmp(&b.anchor_index))
}

/// 贪心 NMS：依次保留分数最高者，剔除与其 IoU 大于阈值的候选
pub fn nms(mut candidates: Vec<DetectionCandidate>, iou_threshold: f32) -> Vec<DetectionCandidate> {
  candidates.sort_by(rank);
  let mut queue: VecDeque<DetectionCandidate> = candidates.into();
  let mut keep = Vec::new();

  while let Some(current) = queue.pop_front() {
    queue.retain(|other| iou(&current.bbox, &other.bbox) <= iou_threshold);
    keep.push(current);
  }

  keep
}

/// 汇总所有步长的候选，过滤低分并做 NMS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionAggregator {
  confidence_threshold: f32,
  iou_threshold: f32,
}

impl DetectionAggregator {
  pub fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
    Self {
      confidence_threshold,
      iou_threshold,
    }
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn aggregate<I>(&self, candidates: I) -> Vec<DetectionCandidate>
  where
    I: IntoIterator<Item = DetectionCandidate>,
  {
    // NaN 分数不满足 >= 比较，一并丢弃
    let passed: Vec<_> = candidates
      .into_iter()
      .filter(|c| c.score >= self.confidence_threshold)
      .collect();
    let total = passed.len();

    let kept = nms(passed, self.iou_threshold);
    debug!("阈值过滤后 {} 个候选, NMS 后保留 {} 个", total, kept.len());
    kept
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  fn candidate(bbox: [f32; 4], score: f32, stride: u32, anchor_index: usize) -> DetectionCandidate {
    DetectionCandidate {
      bbox,
      landmarks: [[0.0; 2]; 5],
      score,
      stride,
      anchor_index,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = [10.0, 10.0, 50.0, 50.0];
    assert_abs_diff_eq!(iou(&b, &b), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    let point = [5.0, 5.0, 5.0, 5.0];
    assert_eq!(iou(&point, &point), 0.0);
  }

  #[test]
  fn iou_partial_overlap() {
    // 交集 5x10 = 50, 并集 100 + 100 - 50 = 150
    let v = iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 0.0, 15.0, 10.0]);
    assert_abs_diff_eq!(v, 1.0 / 3.0, epsilon = 1e-6);
  }

  #[test]
  fn overlapping_lower_score_is_suppressed() {
    let kept = nms(
      vec![
        candidate([0.0, 0.0, 100.0, 100.0], 0.8, 16, 0),
        candidate([2.0, 2.0, 102.0, 102.0], 0.9, 16, 1),
        candidate([300.0, 300.0, 350.0, 350.0], 0.75, 8, 0),
      ],
      0.45,
    );
    let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
    assert_eq!(scores, vec![0.9, 0.75]);
  }

  #[test]
  fn iou_equal_to_threshold_is_kept() {
    let kept = nms(
      vec![
        candidate([0.0, 0.0, 10.0, 10.0], 0.9, 8, 0),
        candidate([5.0, 0.0, 15.0, 10.0], 0.8, 8, 1),
      ],
      1.0 / 3.0,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn ties_break_on_stride_then_anchor_index() {
    let b = [0.0, 0.0, 10.0, 10.0];
    let kept = nms(
      vec![
        candidate(b, 0.9, 32, 0),
        candidate(b, 0.9, 8, 7),
        candidate(b, 0.9, 8, 3),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 1);
    assert_eq!((kept[0].stride, kept[0].anchor_index), (8, 3));
  }

  #[test]
  fn output_is_an_idempotent_subset() {
    let input = vec![
      candidate([0.0, 0.0, 40.0, 40.0], 0.95, 8, 0),
      candidate([10.0, 10.0, 50.0, 50.0], 0.9, 8, 1),
      candidate([20.0, 20.0, 60.0, 60.0], 0.85, 16, 0),
      candidate([35.0, 35.0, 75.0, 75.0], 0.8, 16, 1),
      candidate([100.0, 0.0, 140.0, 40.0], 0.7, 32, 0),
    ];
    let kept = nms(input.clone(), 0.3);

    for c in &kept {
      assert!(input.contains(c));
    }
    for (i, a) in kept.iter().enumerate() {
      for b in &kept[i + 1..] {
        assert!(iou(&a.bbox, &b.bbox) <= 0.3);
      }
    }
    for pair in kept.windows(2) {
      assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(nms(kept.clone(), 0.3), kept);
  }

  #[test]
  fn aggregator_drops_low_and_nan_scores() {
    let aggregator = DetectionAggregator::new(0.5, 0.45);
    let kept = aggregator.aggregate(vec![
      candidate([0.0, 0.0, 10.0, 10.0], 0.5, 8, 0),
      candidate([20.0, 0.0, 30.0, 10.0], 0.49, 8, 1),
      candidate([40.0, 0.0, 50.0, 10.0], f32::NAN, 8, 2),
    ]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].anchor_index, 0);
  }

  #[test]
  fn landmarks_stay_with_their_box() {
    let with_landmarks = |bbox, score, anchor_index, v: f32| DetectionCandidate {
      landmarks: [[v, v + 0.5]; 5],
      ..candidate(bbox, score, 8, anchor_index)
    };
    let aggregator = DetectionAggregator::new(0.5, 0.45);
    let kept = aggregator.aggregate(vec![
      with_landmarks([200.0, 200.0, 240.0, 240.0], 0.6, 0, 1.0),
      with_landmarks([2.0, 2.0, 42.0, 42.0], 0.7, 1, 3.0),
      with_landmarks([0.0, 0.0, 40.0, 40.0], 0.9, 2, 2.0),
    ]);

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].bbox, [0.0, 0.0, 40.0, 40.0]);
    assert_eq!(kept[0].landmarks, [[2.0, 2.5]; 5]);
    assert_eq!(kept[1].bbox, [200.0, 200.0, 240.0, 240.0]);
    assert_eq!(kept[1].landmarks, [[1.0, 1.5]; 5]);
  }

  #[test]
  fn aggregator_with_no_candidates_is_empty() {
    let aggregator = DetectionAggregator::new(0.7, 0.45);
    assert!(aggregator.aggregate(Vec::new()).is_empty());
  }
}
