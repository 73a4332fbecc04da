// 该文件是 Kanlian （看脸） 项目的一部分。
// src/backend.rs - 推理后端边界
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

use thiserror::Error;

use crate::{frame::NetworkInput, tensor::StrideOutputs};

/// 将预处理后的网络输入送入推理服务，取回按步长索引的三路输出
pub trait InferenceBackend {
  fn forward(&self, input: &NetworkInput) -> Result<StrideOutputs, BackendError>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for std::sync::Arc<B> {
  fn forward(&self, input: &NetworkInput) -> Result<StrideOutputs, BackendError> {
    (**self).forward(input)
  }
}

mod replay;

pub use self::replay::{RecordedDump, ReplayBackend};

#[derive(Error, Debug)]
pub enum BackendError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("输出记录解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("路径编码错误: {0}")]
  PathEncoding(#[from] std::string::FromUtf8Error),
  #[error("记录的输入尺寸 {recorded:?} 与网络输入 {actual:?} 不一致")]
  InputSizeMismatch {
    recorded: (u32, u32),
    actual: (u32, u32),
  },
}
