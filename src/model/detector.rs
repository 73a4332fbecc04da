// 该文件是 Kanlian （看脸） 项目的一部分。
// src/model/detector.rs - 预处理、推理后端与解码的串联
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  backend::{BackendError, InferenceBackend},
  frame::{FrameError, ImageFrame, LetterboxPlan, NetworkInput},
  model::{DetectResult, Model, RetinaFace, RetinaFaceError},
};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("预处理错误: {0}")]
  Preprocess(#[from] FrameError),
  #[error("推理后端错误: {0}")]
  Backend(#[from] BackendError),
  #[error("解码错误: {0}")]
  Decode(#[from] RetinaFaceError),
}

/// 人脸检测器。解码引擎只读共享，后端按请求调用。
pub struct RetinaFaceDetector<B> {
  engine: Arc<RetinaFace>,
  backend: B,
}

impl<B: InferenceBackend> RetinaFaceDetector<B> {
  pub fn new(engine: Arc<RetinaFace>, backend: B) -> Self {
    Self { engine, backend }
  }

  pub fn engine(&self) -> &Arc<RetinaFace> {
    &self.engine
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  /// 按引擎配置的输入尺寸与像素参数做预处理
  pub fn preprocess(&self, image: &RgbImage) -> Result<NetworkInput, DetectorError> {
    let config = self.engine.config();
    let (input_w, input_h) = config.input_size;
    let plan = LetterboxPlan::new(image.width(), image.height(), input_w, input_h)?;
    Ok(NetworkInput::from_image(image, &plan, &config.pixel)?)
  }

  pub fn detect_image(&self, image: &RgbImage) -> Result<DetectResult, DetectorError> {
    let input = self.preprocess(image)?;
    self.infer(&input)
  }
}

impl<B: InferenceBackend> Model for RetinaFaceDetector<B> {
  type Input = NetworkInput;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("执行模型推理");
    let outputs = self.backend.forward(input)?;
    debug!("解码 {} 个步长的输出", outputs.len());
    Ok(self.engine.decode(&outputs, input.detection_scale())?)
  }
}

/// 以图像帧为输入的检测器，供任务循环使用
pub struct FrameDetector<B>(RetinaFaceDetector<B>);

impl<B> From<RetinaFaceDetector<B>> for FrameDetector<B> {
  fn from(detector: RetinaFaceDetector<B>) -> Self {
    Self(detector)
  }
}

impl<B> FrameDetector<B> {
  pub fn inner(&self) -> &RetinaFaceDetector<B> {
    &self.0
  }
}

impl<B: InferenceBackend> Model for FrameDetector<B> {
  type Input = ImageFrame;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("处理帧 {} ({})", input.index(), input.source());
    self.0.detect_image(input.image())
  }
}
