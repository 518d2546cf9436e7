// 该文件是 Lvye （绿野） 项目的一部分。
// src/config.rs - 后处理流水线配置
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

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_INPUT_SIZE: f32 = 640.0;
const DEFAULT_MIN_FRAMES_FOR_TRIGGER: u32 = 3;
const DEFAULT_THROTTLE_DURATION_MS: u64 = 300;
const DEFAULT_BUCKET_SIZE: f32 = 10.0;
const DEFAULT_QUANT_SCALE: f32 = 1.0 / 256.0;
const DEFAULT_QUANT_ZERO_POINT: i32 = 0;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("阈值 {name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("配置项 {name} 必须为正的有限数, 实际为 {value}")]
  NotPositive { name: &'static str, value: f32 },
  #[error("配置项 {0} 不能为 0")]
  Zero(&'static str),
  #[error("标签数量 {labels} 与类别数量 {num_classes} 不一致")]
  LabelCountMismatch { labels: usize, num_classes: usize },
  #[error("张量尺寸溢出: {num_predictions} 个预测, {num_classes} 个类别")]
  TensorLenOverflow {
    num_predictions: usize,
    num_classes: usize,
  },
}

/// 仿射量化参数: `real = (q - zero_point) * scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
  pub scale: f32,
  pub zero_point: i32,
}

impl Default for QuantParams {
  fn default() -> Self {
    Self {
      scale: DEFAULT_QUANT_SCALE,
      zero_point: DEFAULT_QUANT_ZERO_POINT,
    }
  }
}

/// 后处理流水线的全部可调参数，构造后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default = "default_confidence_threshold")]
  pub confidence_threshold: f32,
  #[serde(default = "default_iou_threshold")]
  pub iou_threshold: f32,
  /// 模型输入边长（正方形输入）
  #[serde(default = "default_input_size")]
  pub input_size: f32,
  #[serde(default)]
  pub quantized: bool,
  #[serde(default)]
  pub quantization: QuantParams,
  pub num_predictions: usize,
  pub num_classes: usize,
  pub labels: Vec<String>,
  #[serde(default = "default_min_frames_for_trigger")]
  pub min_frames_for_trigger: u32,
  #[serde(default = "default_throttle_duration_ms")]
  pub throttle_duration_ms: u64,
  /// 时序稳定键的空间分桶大小，单位为模型输入像素
  #[serde(default = "default_bucket_size")]
  pub bucket_size: f32,
}

fn default_confidence_threshold() -> f32 {
  DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_iou_threshold() -> f32 {
  DEFAULT_IOU_THRESHOLD
}

fn default_input_size() -> f32 {
  DEFAULT_INPUT_SIZE
}

fn default_min_frames_for_trigger() -> u32 {
  DEFAULT_MIN_FRAMES_FOR_TRIGGER
}

fn default_throttle_duration_ms() -> u64 {
  DEFAULT_THROTTLE_DURATION_MS
}

fn default_bucket_size() -> f32 {
  DEFAULT_BUCKET_SIZE
}

impl PipelineConfig {
  /// 以默认参数创建配置，`num_classes` 取标签数量
  pub fn new(num_predictions: usize, labels: Vec<String>) -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      input_size: DEFAULT_INPUT_SIZE,
      quantized: false,
      quantization: QuantParams::default(),
      num_predictions,
      num_classes: labels.len(),
      labels,
      min_frames_for_trigger: DEFAULT_MIN_FRAMES_FOR_TRIGGER,
      throttle_duration_ms: DEFAULT_THROTTLE_DURATION_MS,
      bucket_size: DEFAULT_BUCKET_SIZE,
    }
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let data = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&data)?;
    config.validate()?;
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_input_size(mut self, input_size: f32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn with_quantized(mut self, quantized: bool) -> Self {
    self.quantized = quantized;
    self
  }

  pub fn with_quantization(mut self, quantization: QuantParams) -> Self {
    self.quantization = quantization;
    self
  }

  pub fn with_min_frames_for_trigger(mut self, frames: u32) -> Self {
    self.min_frames_for_trigger = frames;
    self
  }

  pub fn with_throttle_duration_ms(mut self, ms: u64) -> Self {
    self.throttle_duration_ms = ms;
    self
  }

  pub fn with_bucket_size(mut self, bucket_size: f32) -> Self {
    self.bucket_size = bucket_size;
    self
  }

  /// 张量期望长度: `num_predictions * (4 + num_classes)`，溢出时为 `None`
  pub fn checked_tensor_len(&self) -> Option<usize> {
    self
      .num_classes
      .checked_add(4)
      .and_then(|features| self.num_predictions.checked_mul(features))
  }

  /// 仅在 `validate` 通过后调用
  pub fn expected_tensor_len(&self) -> usize {
    self.checked_tensor_len().unwrap_or(usize::MAX)
  }

  pub fn throttle_duration(&self) -> Duration {
    Duration::from_millis(self.throttle_duration_ms)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_threshold("confidence_threshold", self.confidence_threshold)?;
    check_threshold("iou_threshold", self.iou_threshold)?;
    check_positive("input_size", self.input_size)?;
    check_positive("quantization.scale", self.quantization.scale)?;
    check_positive("bucket_size", self.bucket_size)?;

    if self.num_predictions == 0 {
      return Err(ConfigError::Zero("num_predictions"));
    }
    if self.num_classes == 0 {
      return Err(ConfigError::Zero("num_classes"));
    }
    if self.checked_tensor_len().is_none() {
      return Err(ConfigError::TensorLenOverflow {
        num_predictions: self.num_predictions,
        num_classes: self.num_classes,
      });
    }
    if self.min_frames_for_trigger == 0 {
      return Err(ConfigError::Zero("min_frames_for_trigger"));
    }
    if self.labels.len() != self.num_classes {
      return Err(ConfigError::LabelCountMismatch {
        labels: self.labels.len(),
        num_classes: self.num_classes,
      });
    }

    Ok(())
  }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

fn check_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(ConfigError::NotPositive { name, value })
  }
}
