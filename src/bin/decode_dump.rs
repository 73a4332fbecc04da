// 该文件是 Kanlian （看脸） 项目的一部分。
// src/bin/decode_dump.rs - 解码录制的推理输出
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

use std::io::Write;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use url::Url;

use kanlian::{
  FromUrl,
  backend::RecordedDump,
  model::RetinaFaceBuilder,
};

/// 不经过图像与推理服务，直接解码一份录制的多步长输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码配置
  #[arg(long, value_name = "CONFIG", default_value = "retinaface:///")]
  pub config: Url,
  /// 录制的输出文件 (JSON)
  #[arg(long, value_name = "DUMP")]
  pub dump: String,
  /// 缩放系数，缺省时使用录制文件中的值
  #[arg(long, value_name = "SCALE")]
  pub scale: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("解码配置: {}", args.config);
  info!("录制输出: {}", args.dump);

  let engine = RetinaFaceBuilder::from_url(&args.config)?.build()?;
  let dump = RecordedDump::load(&args.dump)?;
  let scale = args
    .scale
    .or(dump.detection_scale)
    .ok_or_else(|| anyhow!("未提供缩放系数, 录制文件中也没有 detectionScale"))?;

  let result = engine.decode(&dump.outputs, scale)?;
  info!("检测到 {} 张人脸", result.len());

  let mut stdout = std::io::stdout().lock();
  serde_json::to_writer_pretty(&mut stdout, &result)?;
  writeln!(stdout)?;

  Ok(())
}
