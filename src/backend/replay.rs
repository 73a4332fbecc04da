// 该文件是 Kanlian （看脸） 项目的一部分。
// src/backend/replay.rs - 回放录制的推理输出
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

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_file_path,
  backend::{BackendError, InferenceBackend},
  frame::NetworkInput,
  tensor::StrideOutputs,
};

/// 一次推理的录制结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedDump {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detection_scale: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub padded_width: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub padded_height: Option<u32>,
  pub outputs: StrideOutputs,
}

impl RecordedDump {
  pub fn new(outputs: StrideOutputs) -> Self {
    Self {
      detection_scale: None,
      padded_width: None,
      padded_height: None,
      outputs,
    }
  }

  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
  }

  pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BackendError> {
    let file = File::create(path)?;
    serde_json::to_writer(file, self)?;
    Ok(())
  }
}

/// 不访问推理服务，总是返回同一份录制输出
#[derive(Debug, Clone)]
pub struct ReplayBackend {
  dump: RecordedDump,
}

impl FromUrl for ReplayBackend {
  type Error = BackendError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(BackendError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url_file_path(url)?;
    info!("加载录制输出: {}", path);
    let dump = RecordedDump::load(&path)?;
    debug!(
      "录制输出包含步长 {:?}",
      dump.outputs.strides().collect::<Vec<_>>()
    );
    Ok(Self { dump })
  }
}

impl FromUrlWithScheme for ReplayBackend {
  const SCHEME: &'static str = "replay";
}

impl From<RecordedDump> for ReplayBackend {
  fn from(dump: RecordedDump) -> Self {
    Self { dump }
  }
}

impl ReplayBackend {
  pub fn from_outputs(outputs: StrideOutputs) -> Self {
    RecordedDump::new(outputs).into()
  }

  pub fn dump(&self) -> &RecordedDump {
    &self.dump
  }
}

impl InferenceBackend for ReplayBackend {
  fn forward(&self, input: &NetworkInput) -> Result<StrideOutputs, BackendError> {
    if let (Some(w), Some(h)) = (self.dump.padded_width, self.dump.padded_height) {
      let actual = (input.padded_width(), input.padded_height());
      if (w, h) != actual {
        return Err(BackendError::InputSizeMismatch {
          recorded: (w, h),
          actual,
        });
      }
    }
    Ok(self.dump.outputs.clone())
  }
}
