// 该文件是 Lvye （绿野） 项目的一部分。
// src/input/tensor_file.rs - 从文件回放模型输出张量
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::InferenceEngine, tensor::RawTensor};

#[derive(Error, Debug)]
pub enum TensorFileError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("不支持的张量类型: {0}")]
  UnsupportedType(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("文件 {path} 长度 {len} 不是 4 的倍数，无法按 f32 读取")]
  Misaligned { path: PathBuf, len: usize },
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
}

/// 张量文件的元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorFileType {
  #[default]
  UInt8,
  Int8,
  /// 小端序 f32
  Float32,
}

impl std::str::FromStr for TensorFileType {
  type Err = TensorFileError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "u8" | "uint8" => Ok(TensorFileType::UInt8),
      "i8" | "int8" => Ok(TensorFileType::Int8),
      "f32" | "float32" => Ok(TensorFileType::Float32),
      other => Err(TensorFileError::UnsupportedType(other.to_string())),
    }
  }
}

/// 读取事先导出的原始输出张量，代替真实推理引擎，便于离线驱动整条流水线
#[derive(Debug, Clone, Default)]
pub struct TensorFileEngine {
  dtype: TensorFileType,
}

impl FromUrlWithScheme for TensorFileEngine {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileEngine {
  type Error = TensorFileError;

  // tensor:?dtype=f32
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let dtype = match url.query_pairs().find(|(k, _)| k == "dtype") {
      Some((_, v)) => v.parse()?,
      None => TensorFileType::default(),
    };
    info!("张量文件引擎, 元素类型: {:?}", dtype);
    Ok(Self { dtype })
  }
}

impl TensorFileEngine {
  pub fn new(dtype: TensorFileType) -> Self {
    Self { dtype }
  }

  pub fn dtype(&self) -> TensorFileType {
    self.dtype
  }

  pub fn read(&self, path: &Path) -> Result<RawTensor, TensorFileError> {
    let bytes = std::fs::read(path)?;
    debug!("读取张量文件 {} ({} 字节)", path.display(), bytes.len());

    let tensor = match self.dtype {
      TensorFileType::UInt8 => RawTensor::from(bytes),
      TensorFileType::Int8 => {
        RawTensor::from(bytes.into_iter().map(|b| b as i8).collect::<Vec<_>>())
      }
      TensorFileType::Float32 => {
        if bytes.len() % 4 != 0 {
          return Err(TensorFileError::Misaligned {
            path: path.to_path_buf(),
            len: bytes.len(),
          });
        }
        let values: Vec<f32> = bytes
          .chunks_exact(4)
          .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
          .collect();
        RawTensor::from(values)
      }
    };
    Ok(tensor)
  }
}

impl InferenceEngine for TensorFileEngine {
  type Input = PathBuf;
  type Error = TensorFileError;

  fn run(&self, input: &PathBuf) -> Result<RawTensor, Self::Error> {
    self.read(input)
  }
}

/// 按文件名顺序遍历目录中的张量文件
#[derive(Debug)]
pub struct TensorDirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for TensorDirectoryInput {
  const SCHEME: &'static str = "dir";
}

impl FromUrl for TensorDirectoryInput {
  type Error = TensorFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TensorFileError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let path = urlencoding::decode(url.path())?;
    Self::open(Path::new(path.as_ref()))
  }
}

impl TensorDirectoryInput {
  pub fn open(directory: &Path) -> Result<Self, TensorFileError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 个张量文件", directory.display(), files.len());

    Ok(Self {
      files: files.into_iter(),
    })
  }
}

impl Iterator for TensorDirectoryInput {
  type Item = PathBuf;

  fn next(&mut self) -> Option<Self::Item> {
    self.files.next()
  }
}
