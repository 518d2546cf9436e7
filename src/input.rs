// 该文件是 Lvye （绿野） 项目的一部分。
// src/input.rs - 帧输入与离线推理引擎
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

#[cfg(feature = "tensor_file_input")]
mod tensor_file;
#[cfg(feature = "tensor_file_input")]
pub use self::tensor_file::{
  TensorDirectoryInput, TensorFileEngine, TensorFileError, TensorFileType,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "tensor_file_input")]
  #[error("张量文件输入错误: {0}")]
  TensorFileError(#[from] TensorFileError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 根据 URL 方案打开帧输入
#[cfg(feature = "tensor_file_input")]
pub fn open_input(url: &url::Url) -> Result<TensorDirectoryInput, InputError> {
  use crate::{FromUrl, FromUrlWithScheme};

  match url.scheme() {
    TensorDirectoryInput::SCHEME => Ok(TensorDirectoryInput::from_url(url)?),
    other => Err(InputError::SchemeMismatch(other.to_string())),
  }
}

/// 根据 URL 方案创建推理引擎
#[cfg(feature = "tensor_file_input")]
pub fn open_engine(url: &url::Url) -> Result<TensorFileEngine, InputError> {
  use crate::{FromUrl, FromUrlWithScheme};

  match url.scheme() {
    TensorFileEngine::SCHEME => Ok(TensorFileEngine::from_url(url)?),
    other => Err(InputError::SchemeMismatch(other.to_string())),
  }
}
