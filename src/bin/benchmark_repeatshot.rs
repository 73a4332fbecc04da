// 该文件是 Kanlian （看脸） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复检测同一帧以测量耗时
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanlian::{
  FromUrl,
  backend::ReplayBackend,
  input::InputWrapper,
  model::{FrameDetector, RetinaFaceBuilder, RetinaFaceDetector},
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// Kanlian 基准测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码配置
  #[arg(long, value_name = "CONFIG", default_value = "retinaface:///")]
  pub config: Url,
  /// 推理后端
  #[arg(long, value_name = "BACKEND")]
  pub backend: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value = "1000", value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("解码配置: {}", args.config);
  info!("推理后端: {}", args.backend);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let engine = Arc::new(RetinaFaceBuilder::from_url(&args.config)?.build()?);
  let backend = ReplayBackend::from_url(&args.backend)?;
  let model = FrameDetector::from(RetinaFaceDetector::new(engine, backend));
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .run_task(input, model, output)?;

  Ok(())
}
