// 该文件是 Lvye （绿野） 项目的一部分。
// src/pipeline.rs - 检测后处理流水线
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

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, PipelineConfig},
  decode::{ConfidenceFilter, ShapeError, TensorDecoder},
  model::Detection,
  nms::non_max_suppression,
  stabilizer::Stabilizer,
  tensor::{RawTensor, dequantize},
  throttle::Throttle,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
  #[error("{0}")]
  Shape(#[from] ShapeError),
  #[error("流水线已释放")]
  Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// 仍处于节流窗口内
  Throttled,
  /// 上一次调用尚未结束
  Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
  Processed(Vec<Detection>),
  Skipped(SkipReason),
}

impl StreamOutcome {
  pub fn detections(&self) -> Option<&[Detection]> {
    match self {
      StreamOutcome::Processed(detections) => Some(detections),
      StreamOutcome::Skipped(_) => None,
    }
  }

  pub fn is_skipped(&self) -> bool {
    matches!(self, StreamOutcome::Skipped(_))
  }
}

/// 一个流水线实例独占其配置、持久化计数表与上次推理时间。
/// 方法不做内部加锁，多线程使用时需由调用方串行化。
pub struct DetectionPipeline {
  config: PipelineConfig,
  decoder: TensorDecoder,
  filter: ConfidenceFilter,
  stabilizer: Stabilizer,
  throttle: Throttle,
  disposed: bool,
}

impl DetectionPipeline {
  pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    info!(
      "创建检测流水线: {} 个预测, {} 个类别, 量化: {}",
      config.num_predictions, config.num_classes, config.quantized
    );

    Ok(Self {
      decoder: TensorDecoder::new(&config),
      filter: ConfidenceFilter::new(config.confidence_threshold),
      stabilizer: Stabilizer::new(&config),
      throttle: Throttle::new(config.throttle_duration()),
      disposed: false,
      config,
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn stabilizer(&self) -> &Stabilizer {
    &self.stabilizer
  }

  pub fn throttle(&self) -> &Throttle {
    &self.throttle
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed
  }

  /// 节流门当前是否允许在 `now` 执行一次推理
  pub fn accepts_frame_at(&self, now: Instant) -> bool {
    !self.disposed && self.throttle.is_open(now)
  }

  /// 单次处理：反量化、解码、置信度过滤与 NMS，不涉及时序状态
  pub fn process_frame(&self, tensor: &RawTensor) -> Result<Vec<Detection>, PipelineError> {
    self.ensure_alive()?;
    self.detect(tensor)
  }

  pub fn process_stream_frame(
    &mut self,
    tensor: &RawTensor,
  ) -> Result<StreamOutcome, PipelineError> {
    self.process_stream_frame_at(tensor, Instant::now())
  }

  /// 连续模式处理一帧。被节流或处理失败时不修改任何时序状态。
  pub fn process_stream_frame_at(
    &mut self,
    tensor: &RawTensor,
    now: Instant,
  ) -> Result<StreamOutcome, PipelineError> {
    self.ensure_alive()?;
    if !self.throttle.is_open(now) {
      debug!("节流窗口内，跳过该帧");
      return Ok(StreamOutcome::Skipped(SkipReason::Throttled));
    }

    let candidates = self.detect(tensor)?;
    self.throttle.commit(now);
    let stable = self.stabilizer.update(candidates);
    Ok(StreamOutcome::Processed(stable))
  }

  /// 清空时序状态，例如切换摄像头之后
  pub fn reset(&mut self) {
    self.stabilizer.clear();
    self.throttle.reset();
  }

  /// 释放流水线，之后的调用均返回 `Disposed`
  pub fn dispose(&mut self) {
    if !self.disposed {
      info!("释放检测流水线");
      self.disposed = true;
      self.stabilizer.clear();
    }
  }

  fn ensure_alive(&self) -> Result<(), PipelineError> {
    if self.disposed {
      Err(PipelineError::Disposed)
    } else {
      Ok(())
    }
  }

  fn detect(&self, tensor: &RawTensor) -> Result<Vec<Detection>, PipelineError> {
    let values = dequantize(tensor, self.config.quantized, self.config.quantization);
    let candidates = self.decoder.decode(values.as_slice(), &self.filter)?;
    Ok(non_max_suppression(candidates, self.config.iou_threshold))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  const N: usize = 4;

  fn config() -> PipelineConfig {
    PipelineConfig::new(N, vec!["healthy".into(), "leaf_rust".into()])
      .with_min_frames_for_trigger(3)
      .with_throttle_duration_ms(300)
  }

  /// 预测 0 为置信 0.9 的 leaf_rust，其余预测全部低于阈值
  fn one_object_tensor() -> RawTensor {
    let mut t = vec![0.0f32; N * 6];
    t[0] = 320.0;
    t[N] = 320.0;
    t[2 * N] = 64.0;
    t[3 * N] = 64.0;
    t[5 * N] = 0.9;
    RawTensor::from(t)
  }

  #[test]
  fn single_shot_returns_nms_output() {
    let pipeline = DetectionPipeline::new(config()).unwrap();
    let dets = pipeline.process_frame(&one_object_tensor()).unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].label.name(), "leaf_rust");
    assert_eq!(pipeline.stabilizer().tracked(), 0);
  }

  #[test]
  fn empty_frame_is_not_an_error() {
    let pipeline = DetectionPipeline::new(config()).unwrap();
    let dets = pipeline
      .process_frame(&RawTensor::from(vec![0.0f32; N * 6]))
      .unwrap();
    assert!(dets.is_empty());
  }

  #[test]
  fn quantized_tensor_is_decoded() {
    let pipeline =
      DetectionPipeline::new(config().with_quantized(true).with_input_size(1.0)).unwrap();
    // scale 1/256: 128 -> 0.5, 64 -> 0.25, 243 -> 0.949...
    let mut t = vec![0u8; N * 6];
    t[0] = 128;
    t[N] = 128;
    t[2 * N] = 64;
    t[3 * N] = 64;
    t[4 * N] = 243;
    let dets = pipeline.process_frame(&RawTensor::from(t)).unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].label.name(), "healthy");
    assert_eq!(dets[0].bbox.as_array(), [0.375, 0.375, 0.625, 0.625]);
  }

  #[test]
  fn shape_error_is_propagated() {
    let mut pipeline = DetectionPipeline::new(config()).unwrap();
    let short = RawTensor::from(vec![0.0f32; N * 6 - 1]);
    assert_eq!(
      pipeline.process_frame(&short),
      Err(PipelineError::Shape(ShapeError {
        expected: 24,
        actual: 23
      }))
    );

    // 失败的调用不推进节流与计数
    let t0 = Instant::now();
    assert!(pipeline.process_stream_frame_at(&short, t0).is_err());
    assert!(pipeline.throttle().last_inference().is_none());
    assert!(pipeline.accepts_frame_at(t0));
  }

  #[test]
  fn stream_confirms_on_third_processed_frame() {
    let mut pipeline = DetectionPipeline::new(config()).unwrap();
    let tensor = one_object_tensor();
    let t0 = Instant::now();

    for i in 0..2u64 {
      let now = t0 + Duration::from_millis(300 * i);
      let outcome = pipeline.process_stream_frame_at(&tensor, now).unwrap();
      assert_eq!(outcome, StreamOutcome::Processed(Vec::new()));
    }
    let outcome = pipeline
      .process_stream_frame_at(&tensor, t0 + Duration::from_millis(600))
      .unwrap();
    assert_eq!(outcome.detections().map(|d| d.len()), Some(1));
  }

  #[test]
  fn throttled_frame_does_not_touch_persistence() {
    let mut pipeline = DetectionPipeline::new(config()).unwrap();
    let tensor = one_object_tensor();
    let t0 = Instant::now();

    let first = pipeline.process_stream_frame_at(&tensor, t0).unwrap();
    assert!(!first.is_skipped());
    let dets = pipeline.process_frame(&tensor).unwrap();
    let key = pipeline.stabilizer().key_of(&dets[0]);
    assert_eq!(pipeline.stabilizer().entry(&key).unwrap().consecutive_count, 1);

    let second = pipeline
      .process_stream_frame_at(&tensor, t0 + Duration::from_millis(50))
      .unwrap();
    assert_eq!(second, StreamOutcome::Skipped(SkipReason::Throttled));
    assert_eq!(pipeline.stabilizer().entry(&key).unwrap().consecutive_count, 1);
    assert_eq!(pipeline.throttle().last_inference(), Some(t0));
  }

  #[test]
  fn disposed_pipeline_rejects_calls() {
    let mut pipeline = DetectionPipeline::new(config()).unwrap();
    pipeline.dispose();
    assert!(pipeline.is_disposed());
    assert_eq!(
      pipeline.process_frame(&one_object_tensor()),
      Err(PipelineError::Disposed)
    );
    assert_eq!(
      pipeline.process_stream_frame(&one_object_tensor()),
      Err(PipelineError::Disposed)
    );
    assert!(!pipeline.accepts_frame_at(Instant::now()));
  }

  #[test]
  fn reset_clears_temporal_state() {
    let mut pipeline = DetectionPipeline::new(config()).unwrap();
    let t0 = Instant::now();
    pipeline
      .process_stream_frame_at(&one_object_tensor(), t0)
      .unwrap();
    assert_eq!(pipeline.stabilizer().tracked(), 1);

    pipeline.reset();
    assert_eq!(pipeline.stabilizer().tracked(), 0);
    assert!(pipeline.accepts_frame_at(t0));
  }

  #[test]
  fn invalid_config_is_rejected() {
    assert!(DetectionPipeline::new(config().with_iou_threshold(2.0)).is_err());
  }
}
