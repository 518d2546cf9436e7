// 该文件是 Lvye （绿野） 项目的一部分。
// src/decode.rs - 转置输出张量解码
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
use tracing::{debug, error};

use crate::{
  config::PipelineConfig,
  model::{BBox, Detection, LabelSet},
};

/// 回归通道数: cx, cy, w, h
const BOX_FEATURES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("输出张量形状不匹配: 期望长度 {expected}, 实际长度 {actual}")]
pub struct ShapeError {
  pub expected: usize,
  pub actual: usize,
}

/// 单个预测位置的原始解码值，坐标仍位于模型输入像素空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
  pub index: usize,
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub class_index: usize,
  pub score: f32,
}

/// 置信度过滤，分数不低于阈值的预测才会保留
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceFilter {
  threshold: f32,
}

impl ConfidenceFilter {
  pub fn new(threshold: f32) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  // NaN 分数不会通过
  pub fn accepts(&self, prediction: &Prediction) -> bool {
    prediction.score >= self.threshold
  }
}

pub struct TensorDecoder {
  num_predictions: usize,
  num_classes: usize,
  input_size: f32,
  labels: LabelSet,
}

impl TensorDecoder {
  pub fn new(config: &PipelineConfig) -> Self {
    Self {
      num_predictions: config.num_predictions,
      num_classes: config.num_classes,
      input_size: config.input_size,
      labels: LabelSet::new(&config.labels),
    }
  }

  /// 形状溢出时饱和为 `usize::MAX`，任何张量都不会匹配
  pub fn expected_len(&self) -> usize {
    self
      .num_classes
      .checked_add(BOX_FEATURES)
      .and_then(|features| self.num_predictions.checked_mul(features))
      .unwrap_or(usize::MAX)
  }

  /// 逐个预测位置读取几何与最大类别分数；长度不符时直接返回错误
  pub fn predictions<'a>(
    &self,
    tensor: &'a [f32],
  ) -> Result<impl Iterator<Item = Prediction> + 'a, ShapeError> {
    let expected = self.expected_len();
    if tensor.len() != expected {
      error!(
        "输出张量长度不匹配: 期望 {} x (4 + {}) = {}, 实际 {}",
        self.num_predictions,
        self.num_classes,
        expected,
        tensor.len()
      );
      return Err(ShapeError {
        expected,
        actual: tensor.len(),
      });
    }

    let n = self.num_predictions;
    let num_classes = self.num_classes;
    Ok((0..n).map(move |i| {
      let (class_index, score) = argmax_class(tensor, n, num_classes, i);
      Prediction {
        index: i,
        cx: tensor[i],
        cy: tensor[n + i],
        w: tensor[2 * n + i],
        h: tensor[3 * n + i],
        class_index,
        score,
      }
    }))
  }

  /// 将预测转换为归一化角点坐标的检测结果
  pub fn to_detection(&self, prediction: &Prediction) -> Option<Detection> {
    let Prediction { cx, cy, w, h, .. } = *prediction;
    if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
      debug!("预测 {} 的几何值无效，已丢弃", prediction.index);
      return None;
    }
    let label = self.labels.get(prediction.class_index)?.clone();
    let bbox = BBox::from_center(cx, cy, w, h, self.input_size);
    Some(Detection::new(bbox, label, prediction.score))
  }

  /// 解码并按置信度过滤，返回无序候选列表
  pub fn decode(
    &self,
    tensor: &[f32],
    filter: &ConfidenceFilter,
  ) -> Result<Vec<Detection>, ShapeError> {
    let candidates: Vec<Detection> = self
      .predictions(tensor)?
      .filter(|p| filter.accepts(p))
      .filter_map(|p| self.to_detection(&p))
      .collect();

    debug!(
      "解码得到 {} 个候选 (阈值 {})",
      candidates.len(),
      filter.threshold()
    );
    Ok(candidates)
  }
}

/// 类别分数取最大值，相同分数取最小类别索引
fn argmax_class(tensor: &[f32], n: usize, num_classes: usize, i: usize) -> (usize, f32) {
  let mut best = (0usize, f32::NEG_INFINITY);
  for c in 0..num_classes {
    let score = tensor[(BOX_FEATURES + c) * n + i];
    if score > best.1 {
      best = (c, score);
    }
  }
  best
}
