// 该文件是 Lvye （绿野） 项目的一部分。
// src/tensor.rs - 原始输出张量与反量化
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

use std::borrow::Cow;

use tracing::{debug, warn};

use crate::config::QuantParams;

/// 推理引擎返回的原始张量，布局为 `[feature][prediction]`
#[derive(Debug, Clone, PartialEq)]
pub enum RawTensor {
  UInt8(Box<[u8]>),
  Int8(Box<[i8]>),
  Float32(Box<[f32]>),
}

impl RawTensor {
  pub fn len(&self) -> usize {
    match self {
      RawTensor::UInt8(data) => data.len(),
      RawTensor::Int8(data) => data.len(),
      RawTensor::Float32(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_integer(&self) -> bool {
    !matches!(self, RawTensor::Float32(_))
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      RawTensor::UInt8(_) => "uint8",
      RawTensor::Int8(_) => "int8",
      RawTensor::Float32(_) => "float32",
    }
  }
}

impl From<Vec<u8>> for RawTensor {
  fn from(data: Vec<u8>) -> Self {
    RawTensor::UInt8(data.into_boxed_slice())
  }
}

impl From<Vec<i8>> for RawTensor {
  fn from(data: Vec<i8>) -> Self {
    RawTensor::Int8(data.into_boxed_slice())
  }
}

impl From<Vec<f32>> for RawTensor {
  fn from(data: Vec<f32>) -> Self {
    RawTensor::Float32(data.into_boxed_slice())
  }
}

/// 张量元素类型与 `quantized` 配置不一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationMismatch {
  /// 配置为量化模型，但收到浮点张量，按浮点原样使用
  ExpectedInteger { actual: &'static str },
  /// 配置为浮点模型，但收到整型张量，仍按量化参数反量化
  ExpectedFloat { actual: &'static str },
}

/// 反量化结果；浮点输入直接借用，不做拷贝
#[derive(Debug, Clone)]
pub struct Dequantized<'a> {
  pub values: Cow<'a, [f32]>,
  pub mismatch: Option<QuantizationMismatch>,
}

impl Dequantized<'_> {
  pub fn as_slice(&self) -> &[f32] {
    &self.values
  }
}

/// 按张量的实际表示转换为浮点；类型与配置不符时仅给出诊断，不作为错误
pub fn dequantize<'a>(
  tensor: &'a RawTensor,
  quantized: bool,
  params: QuantParams,
) -> Dequantized<'a> {
  let mismatch = match (quantized, tensor.is_integer()) {
    (true, false) => Some(QuantizationMismatch::ExpectedInteger {
      actual: tensor.type_name(),
    }),
    (false, true) => Some(QuantizationMismatch::ExpectedFloat {
      actual: tensor.type_name(),
    }),
    _ => None,
  };

  if let Some(mismatch) = mismatch {
    warn!(
      "张量类型与量化配置不一致 (quantized = {}): {:?}，按张量实际类型处理",
      quantized, mismatch
    );
  }

  let zero_point = params.zero_point as f32;
  let values = match tensor {
    RawTensor::UInt8(data) => Cow::Owned(
      data
        .iter()
        .map(|&v| (v as f32 - zero_point) * params.scale)
        .collect(),
    ),
    RawTensor::Int8(data) => Cow::Owned(
      data
        .iter()
        .map(|&v| (v as f32 - zero_point) * params.scale)
        .collect(),
    ),
    RawTensor::Float32(data) => Cow::Borrowed(&data[..]),
  };

  debug!("反量化完成: {} 个元素 ({})", values.len(), tensor.type_name());

  Dequantized { values, mismatch }
}
