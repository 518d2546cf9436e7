// 该文件是 Lvye （绿野） 项目的一部分。
// src/detector.rs - 推理引擎与后处理流水线的组合
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

use std::{
  sync::{Arc, Mutex, TryLockError},
  time::Instant,
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  model::{Detection, InferenceEngine},
  pipeline::{DetectionPipeline, PipelineError, SkipReason, StreamOutcome},
};

#[derive(Error, Debug)]
pub enum DetectorError<E> {
  #[error("推理引擎错误: {0}")]
  Engine(E),
  #[error(transparent)]
  Pipeline(#[from] PipelineError),
  #[error("检测器锁已损坏")]
  Poisoned,
}

pub struct Detector<E> {
  engine: E,
  pipeline: DetectionPipeline,
}

impl<E: InferenceEngine> Detector<E> {
  pub fn new(engine: E, pipeline: DetectionPipeline) -> Self {
    Self { engine, pipeline }
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn pipeline(&self) -> &DetectionPipeline {
    &self.pipeline
  }

  /// 单次检测：推理一次并返回 NMS 后的结果
  pub fn detect(&mut self, input: &E::Input) -> Result<Vec<Detection>, DetectorError<E::Error>> {
    if self.pipeline.is_disposed() {
      return Err(PipelineError::Disposed.into());
    }
    let tensor = self.engine.run(input).map_err(DetectorError::Engine)?;
    Ok(self.pipeline.process_frame(&tensor)?)
  }

  pub fn detect_stream(
    &mut self,
    input: &E::Input,
  ) -> Result<StreamOutcome, DetectorError<E::Error>> {
    self.detect_stream_at(input, Instant::now())
  }

  /// 连续模式：节流门关闭时不调用推理引擎；推理失败时不推进任何状态
  pub fn detect_stream_at(
    &mut self,
    input: &E::Input,
    now: Instant,
  ) -> Result<StreamOutcome, DetectorError<E::Error>> {
    if self.pipeline.is_disposed() {
      return Err(PipelineError::Disposed.into());
    }
    if !self.pipeline.accepts_frame_at(now) {
      return Ok(StreamOutcome::Skipped(SkipReason::Throttled));
    }
    let tensor = self.engine.run(input).map_err(DetectorError::Engine)?;
    Ok(self.pipeline.process_stream_frame_at(&tensor, now)?)
  }

  pub fn dispose(&mut self) {
    self.pipeline.dispose();
  }
}

/// 可在多个相机回调之间共享的检测器，所有调用通过互斥锁串行执行。
/// 连续模式下若已有调用在执行，新帧直接跳过。
pub struct SharedDetector<E> {
  inner: Arc<Mutex<Detector<E>>>,
}

impl<E> Clone for SharedDetector<E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<E: InferenceEngine> SharedDetector<E> {
  pub fn new(detector: Detector<E>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(detector)),
    }
  }

  /// 等待正在执行的调用完成后再执行
  pub fn detect(&self, input: &E::Input) -> Result<Vec<Detection>, DetectorError<E::Error>> {
    let mut detector = self.inner.lock().map_err(|_| DetectorError::Poisoned)?;
    detector.detect(input)
  }

  pub fn detect_stream(&self, input: &E::Input) -> Result<StreamOutcome, DetectorError<E::Error>> {
    self.detect_stream_at(input, Instant::now())
  }

  pub fn detect_stream_at(
    &self,
    input: &E::Input,
    now: Instant,
  ) -> Result<StreamOutcome, DetectorError<E::Error>> {
    let mut detector = match self.inner.try_lock() {
      Ok(detector) => detector,
      Err(TryLockError::WouldBlock) => {
        debug!("上一帧仍在处理，跳过该帧");
        return Ok(StreamOutcome::Skipped(SkipReason::Busy));
      }
      Err(TryLockError::Poisoned(_)) => return Err(DetectorError::Poisoned),
    };
    detector.detect_stream_at(input, now)
  }

  /// 等待正在执行的调用结束后释放，之后的调用均返回 `Disposed`
  pub fn dispose(&self) {
    match self.inner.lock() {
      Ok(mut detector) => detector.dispose(),
      Err(poisoned) => {
        warn!("检测器锁已损坏，仍然执行释放");
        poisoned.into_inner().dispose();
      }
    }
  }

  pub fn is_disposed(&self) -> bool {
    match self.inner.lock() {
      Ok(detector) => detector.pipeline().is_disposed(),
      Err(poisoned) => poisoned.into_inner().pipeline().is_disposed(),
    }
  }
}
