// 该文件是 Kanlian （看脸） 项目的一部分。
// src/model/retinaface.rs - RetinaFace 多步长解码引擎
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

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_file_path,
  anchor::AnchorTable,
  config::{ConfigError, RetinaFaceConfig},
  model::{
    CoordinateRescaler, DetectItem, DetectResult, DetectionAggregator, DetectionCandidate,
    StrideDecoder,
  },
  tensor::{StrideOutputs, TensorError},
};

use super::decode::BBOX_VALUES;

#[derive(Error, Debug)]
pub enum RetinaFaceError {
  #[error("配置错误: {0}")]
  Configuration(#[from] ConfigError),
  #[error("步长 {stride} 的 {tensor} 形状不匹配: {detail}")]
  ShapeMismatch {
    stride: u32,
    tensor: &'static str,
    detail: String,
  },
  #[error("缩放系数必须为正的有限值: {0}")]
  InvalidScale(f32),
  #[error("没有任何步长的输出")]
  EmptyInput,
  #[error("缺少步长 {0} 的输出")]
  MissingStride(u32),
  #[error("未配置的步长 {0}")]
  UnknownStride(u32),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 解码引擎。构造后只读，可通过 `Arc` 在多个请求线程间共享。
#[derive(Debug, Clone)]
pub struct RetinaFace {
  config: RetinaFaceConfig,
  anchors: AnchorTable,
  aggregator: DetectionAggregator,
}

impl RetinaFace {
  pub fn new(config: RetinaFaceConfig) -> Result<Self, RetinaFaceError> {
    let anchors = AnchorTable::build(&config)?;
    let aggregator = DetectionAggregator::new(config.confidence_threshold, config.iou_threshold);
    Ok(Self {
      config,
      anchors,
      aggregator,
    })
  }

  pub fn config(&self) -> &RetinaFaceConfig {
    &self.config
  }

  pub fn anchors(&self) -> &AnchorTable {
    &self.anchors
  }

  fn check_strides(&self, outputs: &StrideOutputs) -> Result<(), RetinaFaceError> {
    if outputs.is_empty() {
      return Err(RetinaFaceError::EmptyInput);
    }
    if let Some(stride) = outputs
      .strides()
      .find(|&s| self.anchors.template(s).is_none())
    {
      error!("收到未配置步长 {} 的输出", stride);
      return Err(RetinaFaceError::UnknownStride(stride));
    }
    if let Some(stride) = self.anchors.strides().find(|&s| !outputs.contains(s)) {
      error!("缺少步长 {} 的输出", stride);
      return Err(RetinaFaceError::MissingStride(stride));
    }
    Ok(())
  }

  /// 逐步长解码，返回网络输入坐标系下未过滤的候选
  pub fn decode_candidates(
    &self,
    outputs: &StrideOutputs,
  ) -> Result<Vec<DetectionCandidate>, RetinaFaceError> {
    self.check_strides(outputs)?;

    let mut candidates = Vec::new();
    for stride in self.anchors.strides() {
      let output = outputs
        .get(stride)
        .ok_or(RetinaFaceError::MissingStride(stride))?;
      let per_cell = self
        .anchors
        .anchors_per_cell(stride)
        .ok_or(RetinaFaceError::UnknownStride(stride))?;
      // 特征图尺寸取自回归张量，平铺锚框前先核对其批次与通道
      let [batch, channels, height, width] = output.bbox_deltas.shape();
      if batch != 1 || channels != BBOX_VALUES * per_cell {
        return Err(RetinaFaceError::ShapeMismatch {
          stride,
          tensor: "bbox_deltas",
          detail: format!(
            "期望 [1, {}, H, W], 实际 {:?}",
            BBOX_VALUES * per_cell,
            output.bbox_deltas.shape()
          ),
        });
      }
      let anchors = self
        .anchors
        .anchors(stride, height, width)
        .ok_or(RetinaFaceError::UnknownStride(stride))?;

      let decoder = StrideDecoder::new(&anchors, self.config.bbox_std, self.config.landmark_std);
      candidates.extend(decoder.decode(output)?);
    }
    Ok(candidates)
  }

  /// 完整解码流程：步长解码 → 阈值过滤与 NMS → 还原到原图坐标
  pub fn decode(
    &self,
    outputs: &StrideOutputs,
    detection_scale: f32,
  ) -> Result<DetectResult, RetinaFaceError> {
    let rescaler = CoordinateRescaler::new(detection_scale)?;
    let candidates = self.decode_candidates(outputs)?;
    debug!("共 {} 个候选", candidates.len());

    let items: Vec<DetectItem> = self
      .aggregator
      .aggregate(candidates)
      .into_iter()
      .map(|c| rescaler.rescale(c.into()))
      .collect();

    debug!("检测到 {} 张人脸", items.len());
    Ok(items.into())
  }
}

#[derive(Debug, Default)]
pub struct RetinaFaceBuilder {
  config_path: Option<String>,
  confidence: Option<f32>,
  iou: Option<f32>,
}

impl FromUrl for RetinaFaceBuilder {
  type Error = RetinaFaceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(
        ConfigError::SchemeMismatch(format!("配置路径必须使用 {} 方案", Self::SCHEME)).into(),
      );
    }

    let path = url_file_path(url).map_err(ConfigError::from)?;
    let config_path = if path.is_empty() || path == "/" {
      None
    } else {
      Some(path)
    };

    let mut builder = RetinaFaceBuilder {
      config_path,
      confidence: None,
      iou: None,
    };

    for (key, value) in url.query_pairs() {
      let parse = || {
        value
          .parse::<f32>()
          .map_err(|_| ConfigError::InvalidQuery(key.to_string(), value.to_string()))
      };
      match key.as_ref() {
        "confidence" => builder.confidence = Some(parse()?),
        "iou" => builder.iou = Some(parse()?),
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }

    Ok(builder)
  }
}

impl FromUrlWithScheme for RetinaFaceBuilder {
  const SCHEME: &'static str = "retinaface";
}

impl RetinaFaceBuilder {
  pub fn config_path(mut self, path: &str) -> Self {
    self.config_path = Some(path.to_string());
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = Some(confidence);
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.iou = Some(iou);
    self
  }

  pub fn build(self) -> Result<RetinaFace, RetinaFaceError> {
    let mut config = match &self.config_path {
      Some(path) => {
        info!("加载解码配置: {}", path);
        RetinaFaceConfig::from_json_file(path)?
      }
      None => {
        info!("使用默认 RetinaFace 配置");
        RetinaFaceConfig::default()
      }
    };

    if let Some(confidence) = self.confidence {
      config.confidence_threshold = confidence;
    }
    if let Some(iou) = self.iou {
      config.iou_threshold = iou;
    }

    debug!(
      "置信度阈值: {}, IoU 阈值: {}, 输入尺寸: {:?}",
      config.confidence_threshold, config.iou_threshold, config.input_size
    );

    let engine = RetinaFace::new(config).inspect_err(|e| error!("解码引擎初始化失败: {}", e))?;
    info!("解码引擎就绪, 共 {} 个步长", engine.anchors().len());
    Ok(engine)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::{NchwTensor, RawStrideOutput};

  fn zero_output(a: usize, height: usize, width: usize) -> RawStrideOutput {
    RawStrideOutput {
      scores: NchwTensor::zeros([1, 2 * a, height, width]).unwrap(),
      bbox_deltas: NchwTensor::zeros([1, 4 * a, height, width]).unwrap(),
      landmark_deltas: NchwTensor::zeros([1, 10 * a, height, width]).unwrap(),
    }
  }

  fn small_engine() -> RetinaFace {
    let mut config = RetinaFaceConfig::default();
    config.input_size = (64, 64);
    RetinaFace::new(config).unwrap()
  }

  fn small_outputs() -> StrideOutputs {
    StrideOutputs::new()
      .with(32, zero_output(2, 2, 2))
      .with(16, zero_output(2, 4, 4))
      .with(8, zero_output(2, 8, 8))
  }

  #[test]
  fn all_low_scores_give_empty_result() {
    let result = small_engine().decode(&small_outputs(), 1.0).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn candidates_cover_every_anchor() {
    let candidates = small_engine().decode_candidates(&small_outputs()).unwrap();
    assert_eq!(candidates.len(), (4 + 16 + 64) * 2);
  }

  #[test]
  fn empty_outputs_are_rejected() {
    let result = small_engine().decode(&StrideOutputs::new(), 1.0);
    assert!(matches!(result, Err(RetinaFaceError::EmptyInput)));
  }

  #[test]
  fn missing_stride_is_rejected() {
    let outputs = StrideOutputs::new()
      .with(32, zero_output(2, 2, 2))
      .with(16, zero_output(2, 4, 4));
    let result = small_engine().decode(&outputs, 1.0);
    assert!(matches!(result, Err(RetinaFaceError::MissingStride(8))));
  }

  #[test]
  fn unknown_stride_is_rejected() {
    let outputs = small_outputs().with(64, zero_output(2, 1, 1));
    let result = small_engine().decode(&outputs, 1.0);
    assert!(matches!(result, Err(RetinaFaceError::UnknownStride(64))));
  }

  #[test]
  fn empty_batch_with_huge_grid_is_a_shape_error() {
    let huge = 1usize << 32;
    let mut outputs = small_outputs();
    outputs.insert(
      8,
      RawStrideOutput {
        scores: NchwTensor::new([0, 4, huge, huge], Vec::new()).unwrap(),
        bbox_deltas: NchwTensor::new([0, 8, huge, huge], Vec::new()).unwrap(),
        landmark_deltas: NchwTensor::new([0, 20, huge, huge], Vec::new()).unwrap(),
      },
    );
    let result = small_engine().decode_candidates(&outputs);
    assert!(matches!(
      result,
      Err(RetinaFaceError::ShapeMismatch {
        stride: 8,
        tensor: "bbox_deltas",
        ..
      })
    ));
  }

  #[test]
  fn bad_scale_fails_before_decoding() {
    let result = small_engine().decode(&StrideOutputs::new(), 0.0);
    assert!(matches!(result, Err(RetinaFaceError::InvalidScale(_))));
  }

  #[test]
  fn builder_reads_thresholds_from_query() {
    let url = Url::parse("retinaface:///?confidence=0.5&iou=0.3").unwrap();
    let engine = RetinaFaceBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(engine.config().confidence_threshold, 0.5);
    assert_eq!(engine.config().iou_threshold, 0.3);
  }

  #[test]
  fn builder_rejects_bad_query_value() {
    let url = Url::parse("retinaface:///?confidence=high").unwrap();
    assert!(matches!(
      RetinaFaceBuilder::from_url(&url),
      Err(RetinaFaceError::Configuration(ConfigError::InvalidQuery(..)))
    ));
  }

  #[test]
  fn builder_rejects_other_scheme() {
    let url = Url::parse("replay:///tmp/outputs.json").unwrap();
    assert!(RetinaFaceBuilder::from_url(&url).is_err());
  }

  #[test]
  fn out_of_range_threshold_fails_at_build() {
    let result = RetinaFaceBuilder::default().confidence(1.5).iou(0.4).build();
    assert!(matches!(
      result,
      Err(RetinaFaceError::Configuration(ConfigError::ThresholdOutOfRange { .. }))
    ));
  }
}
