// 该文件是 Kanlian （看脸） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanlian::{
  FromUrl,
  backend::ReplayBackend,
  input::InputWrapper,
  model::{FrameDetector, RetinaFaceBuilder, RetinaFaceDetector},
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("解码配置: {}", args.config);
  info!("推理后端: {}", args.backend);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut builder = RetinaFaceBuilder::from_url(&args.config)?;
  if let Some(confidence) = args.confidence {
    builder = builder.confidence(confidence);
  }
  if let Some(iou) = args.iou {
    builder = builder.iou(iou);
  }
  let engine = Arc::new(builder.build()?);

  let backend = ReplayBackend::from_url(&args.backend)?;
  let model = FrameDetector::from(RetinaFaceDetector::new(engine, backend));
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let frame_number = (args.max_frames > 0).then_some(args.max_frames);
  ContinuousTask::default()
    .with_frame_number(frame_number)
    .run_task(input, model, output)?;

  Ok(())
}
