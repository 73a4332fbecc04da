// 该文件是 Kanlian （看脸） 项目的一部分。
// src/input/read_directory.rs - 按文件名顺序读取目录中的图像
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

use std::path::PathBuf;

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ImageFrame, url_file_path};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  NoImages(String),
  #[error("路径编码错误: {0}")]
  PathEncoding(#[from] std::string::FromUtf8Error),
}

pub struct DirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
  index: usize,
}

fn is_image(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let dir = url_file_path(url)?;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
      let path = entry?.path();
      if path.is_file() && is_image(&path) {
        files.push(path);
      }
    }
    if files.is_empty() {
      return Err(DirectoryInputError::NoImages(dir));
    }
    files.sort();
    info!("目录 {} 中共 {} 张图像", dir, files.len());

    Ok(DirectoryInput {
      files: files.into_iter(),
      index: 0,
    })
  }
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl Iterator for DirectoryInput {
  type Item = ImageFrame;

  fn next(&mut self) -> Option<Self::Item> {
    // 读取失败的文件跳过，不中断整个目录
    for path in self.files.by_ref() {
      let decoded = ImageReader::open(&path)
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.decode());
      match decoded {
        Ok(image) => {
          let frame = ImageFrame::new(image.to_rgb8(), path.display().to_string(), self.index);
          self.index += 1;
          return Some(frame);
        }
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn images_are_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for (name, v) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
      RgbImage::from_pixel(2, 2, Rgb([v, v, v]))
        .save(dir.path().join(name))
        .unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let frames: Vec<_> = DirectoryInput::from_url(&url).unwrap().collect();
    let values: Vec<u8> = frames.iter().map(|f| f.image().get_pixel(0, 0)[0]).collect();
    assert_eq!(values, vec![10, 20, 30]);
    assert_eq!(frames[2].index(), 2);
  }

  #[test]
  fn directory_name_with_spaces_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let faces = dir.path().join("front door");
    std::fs::create_dir(&faces).unwrap();
    RgbImage::new(2, 2).save(faces.join("a.png")).unwrap();

    let url = Url::parse(&format!("folder://{}", faces.display())).unwrap();
    assert_eq!(DirectoryInput::from_url(&url).unwrap().count(), 1);
  }

  #[test]
  fn directory_without_images_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    assert!(matches!(
      DirectoryInput::from_url(&url),
      Err(DirectoryInputError::NoImages(_))
    ));
  }
}
