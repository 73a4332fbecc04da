// 该文件是 Kanlian （看脸） 项目的一部分。
// src/config.rs - 检测配置
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

//! # 检测配置
//!
//! 所有归一化常量（`bbox_std`、`landmark_std`、像素均值/方差）都是配置结构体的字段，
//! 引擎构造时传入，之后只读。
//!
//! 配置文件为 JSON，字段使用 camelCase：
//!
//! ```json
//! {
//!   "strides": [
//!     { "stride": 32, "baseSize": 16, "ratios": [1.0], "scales": [32, 16] },
//!     { "stride": 16, "baseSize": 16, "ratios": [1.0], "scales": [8, 4] },
//!     { "stride": 8,  "baseSize": 16, "ratios": [1.0], "scales": [2, 1] }
//!   ],
//!   "confidenceThreshold": 0.7,
//!   "iouThreshold": 0.45,
//!   "inputSize": [640, 640]
//! }
//! ```
//!
//! 缺省字段取默认值（即标准 RetinaFace 模型的配置）。

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未配置任何特征步长")]
  NoStrides,
  #[error("步长 {0} 重复配置")]
  DuplicateStride(u32),
  #[error("步长 {stride} 配置无效: {reason}")]
  InvalidStride { stride: u32, reason: String },
  #[error("启用密集锚框时步长必须为偶数, 实际为 {0}")]
  OddDenseStride(u32),
  #[error("{name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("{name} 取值无效: {value}")]
  InvalidConstant { name: &'static str, value: f32 },
  #[error("网络输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("参数 {0} 解析失败: {1}")]
  InvalidQuery(String, String),
  #[error("路径编码错误: {0}")]
  PathEncoding(#[from] std::string::FromUtf8Error),
}

fn default_base_size() -> u32 {
  16
}

fn default_ratios() -> Vec<f32> {
  vec![1.0]
}

/// 单个特征步长的锚框配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrideConfig {
  /// 特征步长（下采样倍数）
  pub stride: u32,
  /// 参考锚框边长
  #[serde(default = "default_base_size")]
  pub base_size: u32,
  /// 宽高比列表（h / w）
  #[serde(default = "default_ratios")]
  pub ratios: Vec<f32>,
  /// 尺度列表
  pub scales: Vec<f32>,
  /// 是否追加偏移半个步长的密集锚框
  #[serde(default)]
  pub dense_anchor: bool,
}

impl StrideConfig {
  pub fn new(stride: u32, base_size: u32, ratios: Vec<f32>, scales: Vec<f32>) -> Self {
    Self {
      stride,
      base_size,
      ratios,
      scales,
      dense_anchor: false,
    }
  }

  pub fn dense_anchor(mut self, dense_anchor: bool) -> Self {
    self.dense_anchor = dense_anchor;
    self
  }

  /// 每个特征格上的锚框数量
  pub fn anchors_per_cell(&self) -> usize {
    let count = self.ratios.len() * self.scales.len();
    if self.dense_anchor { count * 2 } else { count }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidStride {
      stride: self.stride,
      reason: reason.to_string(),
    };

    if self.stride == 0 {
      return Err(invalid("步长必须大于 0"));
    }
    if self.base_size == 0 {
      return Err(invalid("参考锚框边长必须大于 0"));
    }
    if self.ratios.is_empty() {
      return Err(invalid("宽高比列表为空"));
    }
    if self.scales.is_empty() {
      return Err(invalid("尺度列表为空"));
    }
    if self.ratios.iter().any(|r| !r.is_finite() || *r <= 0.0) {
      return Err(invalid("宽高比必须为正的有限值"));
    }
    if self.scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
      return Err(invalid("尺度必须为正的有限值"));
    }
    if self.dense_anchor && self.stride % 2 != 0 {
      return Err(ConfigError::OddDenseStride(self.stride));
    }
    Ok(())
  }
}

/// 预处理像素归一化参数，通道顺序为 RGB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PixelConfig {
  pub pixel_scale: f32,
  pub pixel_mean: [f32; 3],
  pub pixel_std: [f32; 3],
}

impl Default for PixelConfig {
  fn default() -> Self {
    Self {
      pixel_scale: 1.0,
      pixel_mean: [0.0, 0.0, 0.0],
      pixel_std: [1.0, 1.0, 1.0],
    }
  }
}

impl PixelConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    positive("pixelScale", self.pixel_scale)?;
    for value in self.pixel_std {
      positive("pixelStd", value)?;
    }
    if let Some(value) = self.pixel_mean.iter().find(|v| !v.is_finite()) {
      return Err(ConfigError::InvalidConstant {
        name: "pixelMean",
        value: *value,
      });
    }
    Ok(())
  }
}

/// RetinaFace 解码配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetinaFaceConfig {
  pub strides: Vec<StrideConfig>,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  /// 边框回归归一化常量 [x, y, w, h]
  pub bbox_std: [f32; 4],
  pub landmark_std: f32,
  /// 网络输入尺寸 (宽, 高)
  pub input_size: (u32, u32),
  pub pixel: PixelConfig,
}

impl Default for RetinaFaceConfig {
  fn default() -> Self {
    Self {
      strides: vec![
        StrideConfig::new(32, 16, vec![1.0], vec![32.0, 16.0]),
        StrideConfig::new(16, 16, vec![1.0], vec![8.0, 4.0]),
        StrideConfig::new(8, 16, vec![1.0], vec![2.0, 1.0]),
      ],
      confidence_threshold: 0.7,
      iou_threshold: 0.45,
      bbox_std: [1.0, 1.0, 1.0, 1.0],
      landmark_std: 1.0,
      input_size: (640, 640),
      pixel: PixelConfig::default(),
    }
  }
}

impl RetinaFaceConfig {
  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    debug!("读取检测配置: {}", path.as_ref().display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
    self.confidence_threshold = confidence;
    self.iou_threshold = iou;
    self
  }

  pub fn stride(&self, stride: u32) -> Option<&StrideConfig> {
    self.strides.iter().find(|s| s.stride == stride)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.strides.is_empty() {
      return Err(ConfigError::NoStrides);
    }

    let mut seen = HashSet::new();
    for stride in &self.strides {
      stride.validate()?;
      if !seen.insert(stride.stride) {
        return Err(ConfigError::DuplicateStride(stride.stride));
      }
    }

    unit_interval("confidenceThreshold", self.confidence_threshold)?;
    unit_interval("iouThreshold", self.iou_threshold)?;
    for value in self.bbox_std {
      positive("bboxStd", value)?;
    }
    positive("landmarkStd", self.landmark_std)?;

    let (width, height) = self.input_size;
    if width == 0 || height == 0 {
      return Err(ConfigError::InvalidInputSize(width, height));
    }

    self.pixel.validate()
  }
}

fn unit_interval(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(ConfigError::InvalidConstant { name, value })
  }
}
