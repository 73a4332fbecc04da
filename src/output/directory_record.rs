// 该文件是 Kanlian （看脸） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录检测结果
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, url_file_path,
  frame::ImageFrame,
  model::DetectResult,
  output::{Render, draw::Draw},
  select::FaceSelector,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("路径编码错误: {0}")]
  PathEncoding(#[from] std::string::FromUtf8Error),
}

/// 每帧一行: 分数, 边框四值, 五个关键点
fn record(result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
  let records: Vec<String> = result
    .iter()
    .map(|item| {
      let mut fields = vec![format!("{:.4}", item.score)];
      fields.extend(item.bbox.iter().map(|v| format!("{:.2}", v)));
      fields.extend(
        item
          .landmarks
          .iter()
          .flat_map(|p| p.iter().map(|v| format!("{:.2}", v))),
      );
      fields.join(", ")
    })
    .collect();
  std::fs::write(path.with_extension("txt"), records.join("\n"))
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Option<Draw>,
  selector: FaceSelector,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    // `record` 时保存原图与文本记录, 否则保存标注后的图像
    let record_only = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_file_path(uri)?),
      draw: (!record_only).then(Draw::default),
      selector: FaceSelector::default(),
      frame_counter: AtomicU32::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let id = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
    Ok(directory.join(format!("{}-{:06}.png", now.format("%H-%M-%S"), id)))
  }
}

impl Render<ImageFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    match &self.draw {
      Some(draw) => {
        let mut image = frame.image().clone();
        let selected = self.selector.select(result, frame.width(), frame.height());
        draw.draw_detections(&mut image, result, selected);
        image.save(&path)?;
      }
      None => {
        frame.image().save(&path)?;
        record(result, &path)?;
      }
    }
    debug!("记录帧 {} 到 {}", frame.source(), path.display());
    Ok(())
  }
}
