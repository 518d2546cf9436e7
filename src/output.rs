// 该文件是 Lvye （绿野） 项目的一部分。
// src/output.rs - 检测结果消费者
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

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::model::Detection;
use thiserror::Error;
use url::Url;

/// 检测结果的下游消费者（界面叠加、历史记录、告警等）
pub trait Sink: Sized {
  type Error;
  fn consume(&self, frame_index: usize, detections: &[Detection]) -> Result<(), Self::Error>;
}

impl<S: Sink> Sink for &S {
  type Error = S::Error;

  fn consume(&self, frame_index: usize, detections: &[Detection]) -> Result<(), Self::Error> {
    (**self).consume(frame_index, detections)
  }
}

mod log_output;
pub use self::log_output::LogOutput;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

impl From<std::convert::Infallible> for OutputError {
  fn from(err: std::convert::Infallible) -> Self {
    match err {}
  }
}

pub enum OutputWrapper {
  LogOutput(LogOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::LogOutput(LogOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Sink for OutputWrapper {
  type Error = OutputError;

  fn consume(&self, frame_index: usize, detections: &[Detection]) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogOutput(output) => output
        .consume(frame_index, detections)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .consume(frame_index, detections)
        .map_err(OutputError::from),
    }
  }
}
