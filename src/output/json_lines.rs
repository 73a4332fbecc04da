// 该文件是 Kanlian （看脸） 项目的一部分。
// src/output/json_lines.rs - 以 JSON Lines 输出检测结果
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

use std::{
  fs::OpenOptions,
  io::{LineWriter, Write},
  sync::Mutex,
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_file_path,
  frame::ImageFrame,
  model::{DetectItem, DetectResult},
  output::Render,
  select::FaceSelector,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出写入端已损坏")]
  Poisoned,
  #[error("路径编码错误: {0}")]
  PathEncoding(#[from] std::string::FromUtf8Error),
}

/// 每帧一行的检测记录
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord<'a> {
  pub timestamp: String,
  pub source: &'a str,
  pub index: usize,
  pub width: u32,
  pub height: u32,
  pub faces: &'a [DetectItem],
  /// 主人脸在 `faces` 中的下标
  pub selected: Option<usize>,
}

pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
  selector: FaceSelector,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch(uri.scheme().to_string()));
    }

    // 路径为空或 `-` 时写到标准输出，否则追加到文件
    let path = url_file_path(uri)?;
    let writer: Box<dyn Write + Send> = if path.is_empty() || path == "/" || path == "/-" {
      debug!("检测结果输出到标准输出");
      Box::new(LineWriter::new(std::io::stdout()))
    } else {
      info!("检测结果追加到文件: {}", path);
      let file = OpenOptions::new().create(true).append(true).open(&path)?;
      Box::new(LineWriter::new(file))
    };

    Ok(Self::new(writer))
  }
}

impl JsonLinesOutput {
  pub fn new(writer: Box<dyn Write + Send>) -> Self {
    Self {
      writer: Mutex::new(writer),
      selector: FaceSelector::default(),
    }
  }

  pub fn with_selector(mut self, selector: FaceSelector) -> Self {
    self.selector = selector;
    self
  }
}

impl Render<ImageFrame, DetectResult> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let selected = self
      .selector
      .select(result, frame.width(), frame.height())
      .and_then(|best| result.iter().position(|item| std::ptr::eq(item, best)));

    let record = FrameRecord {
      timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      source: frame.source(),
      index: frame.index(),
      width: frame.width(),
      height: frame.height(),
      faces: &result.items,
      selected,
    };

    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    Ok(())
  }
}
