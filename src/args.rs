// 该文件是 Kanlian （看脸） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

/// Kanlian 人脸检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码配置，例如 retinaface:///etc/kanlian/retinaface.json?confidence=0.8
  #[arg(long, value_name = "CONFIG", default_value = "retinaface:///")]
  pub config: Url,

  /// 推理后端，例如 replay:///tmp/outputs.json
  #[arg(long, value_name = "BACKEND")]
  pub backend: Url,

  /// 输入来源
  /// 支持格式:
  /// - 单张图片: image:///path/to/face.jpg
  /// - 图片目录: folder:///path/to/images
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径
  /// 支持格式:
  /// - JSON Lines: json:// (标准输出) 或 json:///path/to/faces.jsonl
  /// - 标注图片: image:///path/to/out.png
  /// - 日期目录: folder:///path/to/records?record&always
  #[arg(long, value_name = "OUTPUT", default_value = "json://")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IoU 阈值 (0.0 - 1.0)，覆盖配置
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: usize,
}
