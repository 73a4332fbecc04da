// 该文件是 Kanlian （看脸） 项目的一部分。
// src/frame.rs - 图像帧与网络输入
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

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use crate::{
  config::PixelConfig,
  tensor::{NchwTensor, TensorError},
};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像尺寸为零: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("网络输入尺寸为零: {0}x{1}")]
  EmptyInputSize(u32, u32),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 输入源产生的一帧 RGB 图像
#[derive(Debug, Clone)]
pub struct ImageFrame {
  image: RgbImage,
  source: String,
  index: usize,
}

impl ImageFrame {
  pub fn new(image: RgbImage, source: impl Into<String>, index: usize) -> Self {
    Self {
      image,
      source: source.into(),
      index,
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  /// 来源路径或描述
  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 等比缩放后贴到网络输入左上角的方案
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxPlan {
  input_width: u32,
  input_height: u32,
  resized_width: u32,
  resized_height: u32,
  detection_scale: f32,
}

impl LetterboxPlan {
  pub fn new(
    width: u32,
    height: u32,
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyImage(width, height));
    }
    if input_width == 0 || input_height == 0 {
      return Err(FrameError::EmptyInputSize(input_width, input_height));
    }

    let im_ratio = f64::from(height) / f64::from(width);
    let model_ratio = f64::from(input_height) / f64::from(input_width);

    // 较长的一边贴满输入，另一边截断取整
    let (resized_width, resized_height) = if im_ratio > model_ratio {
      let h = input_height;
      ((f64::from(h) / im_ratio) as u32, h)
    } else {
      let w = input_width;
      (w, (f64::from(w) * im_ratio) as u32)
    };
    let resized_width = resized_width.clamp(1, input_width);
    let resized_height = resized_height.clamp(1, input_height);

    Ok(Self {
      input_width,
      input_height,
      resized_width,
      resized_height,
      detection_scale: resized_height as f32 / height as f32,
    })
  }

  pub fn resized_size(&self) -> (u32, u32) {
    (self.resized_width, self.resized_height)
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.input_width, self.input_height)
  }

  /// 缩放后高度 / 原图高度
  pub fn detection_scale(&self) -> f32 {
    self.detection_scale
  }
}

/// 送入推理后端的 NCHW 浮点张量及其预处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInput {
  tensor: NchwTensor,
  detection_scale: f32,
  padded_width: u32,
  padded_height: u32,
}

impl NetworkInput {
  pub fn new(tensor: NchwTensor, detection_scale: f32, padded_width: u32, padded_height: u32) -> Self {
    Self {
      tensor,
      detection_scale,
      padded_width,
      padded_height,
    }
  }

  pub fn from_image(
    image: &RgbImage,
    plan: &LetterboxPlan,
    pixel: &PixelConfig,
  ) -> Result<Self, FrameError> {
    let (resized_w, resized_h) = plan.resized_size();
    let (input_w, input_h) = plan.input_size();
    debug!(
      "预处理: {}x{} -> {}x{}, 画布 {}x{}",
      image.width(),
      image.height(),
      resized_w,
      resized_h,
      input_w,
      input_h
    );

    let resized = imageops::resize(image, resized_w, resized_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::new(input_w, input_h);
    imageops::replace(&mut canvas, &resized, 0, 0);

    let (height, width) = (input_h as usize, input_w as usize);
    let plane = height * width;
    let mut data = vec![0.0f32; RGB_CHANNELS * plane];
    for (x, y, p) in canvas.enumerate_pixels() {
      let offset = y as usize * width + x as usize;
      for c in 0..RGB_CHANNELS {
        let v = f32::from(p[c]) / pixel.pixel_scale;
        data[c * plane + offset] = (v - pixel.pixel_mean[c]) / pixel.pixel_std[c];
      }
    }

    let tensor = NchwTensor::new([1, RGB_CHANNELS, height, width], data)?;
    Ok(Self::new(tensor, plan.detection_scale(), input_w, input_h))
  }

  pub fn tensor(&self) -> &NchwTensor {
    &self.tensor
  }

  pub fn detection_scale(&self) -> f32 {
    self.detection_scale
  }

  pub fn padded_width(&self) -> u32 {
    self.padded_width
  }

  pub fn padded_height(&self) -> u32 {
    self.padded_height
  }
}
