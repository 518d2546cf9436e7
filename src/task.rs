// 该文件是 Lvye （绿野） 项目的一部分。
// src/task.rs - 单次与连续检测任务
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
  sync::{Mutex, OnceLock, mpsc},
  thread,
  time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
  detector::Detector,
  model::InferenceEngine,
  output::Sink,
  pipeline::StreamOutcome,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  /// 实际执行了推理的帧
  pub processed: usize,
  /// 被节流或因忙碌跳过的帧
  pub skipped: usize,
  /// 输出的确认检测总数
  pub confirmed: usize,
}

pub trait Task<I, E, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    detector: Detector<E>,
    output: O,
  ) -> Result<TaskSummary, Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  EE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  E: InferenceEngine<Input = F, Error = EE>,
  O: Sink<Error = RE>,
> Task<I, E, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    mut detector: Detector<E>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = detector.detect(&frame)?;
    let elapsed = now.elapsed();
    info!("检测完成，耗时: {:.2?}", elapsed);
    output.consume(0, &result)?;

    Ok(TaskSummary {
      processed: 1,
      skipped: 0,
      confirmed: result.len(),
    })
  }
}

/// 连续任务：逐帧送入节流后的流水线
///
/// 输入结束、达到帧数或收到中断时退出
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  frame_interval: Option<Duration>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 模拟相机帧间隔，回放文件时使用
  pub fn with_frame_interval(mut self, frame_interval: Option<Duration>) -> Self {
    self.frame_interval = frame_interval;
    self
  }
}

// Ctrl-C 处理函数在进程内只能设置一次，之后的任务只订阅
static INTERRUPT_SUBSCRIBERS: OnceLock<Mutex<Vec<mpsc::Sender<()>>>> = OnceLock::new();

fn broadcast_interrupt() {
  if let Some(subscribers) = INTERRUPT_SUBSCRIBERS.get() {
    match subscribers.lock() {
      Ok(mut subscribers) => subscribers.retain(|tx| tx.send(()).is_ok()),
      Err(_) => warn!("中断订阅列表锁已损坏"),
    }
  }
}

fn subscribe_interrupt() -> mpsc::Receiver<()> {
  let mut installed_now = false;
  let subscribers = INTERRUPT_SUBSCRIBERS.get_or_init(|| {
    installed_now = true;
    Mutex::new(Vec::new())
  });
  if installed_now {
    let installed = ctrlc::set_handler(|| {
      info!("收到中断信号，准备退出...");
      broadcast_interrupt();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });
    if let Err(e) = installed {
      warn!("无法设置 Ctrl-C 处理函数: {}", e);
    }
  }

  let (tx, rx) = mpsc::channel();
  match subscribers.lock() {
    Ok(mut subscribers) => subscribers.push(tx),
    Err(_) => warn!("中断订阅列表锁已损坏，该任务不会响应 Ctrl-C"),
  }
  rx
}

impl<
  F,
  EE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  E: InferenceEngine<Input = F, Error = EE>,
  O: Sink<Error = RE>,
> Task<I, E, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    mut detector: Detector<E>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let rx = subscribe_interrupt();

    let mut summary = TaskSummary::default();
    let mut frame_index = 0usize;
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      let now = std::time::Instant::now();
      match detector.detect_stream_at(&frame, now)? {
        StreamOutcome::Processed(result) => {
          summary.processed += 1;
          summary.confirmed += result.len();
          output.consume(frame_index, &result)?;
          info!("第 {} 帧处理完成，耗时: {:.2?}", frame_index, now.elapsed());
        }
        StreamOutcome::Skipped(reason) => {
          summary.skipped += 1;
          debug!("第 {} 帧跳过: {:?}", frame_index, reason);
        }
      }

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(interval) = self.frame_interval {
        thread::sleep(interval);
      }
    }

    detector.dispose();
    info!(
      "任务完成，处理 {} 帧，跳过 {} 帧，确认 {} 个目标",
      summary.processed, summary.skipped, summary.confirmed
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interrupt_reaches_every_subscribed_task() {
    let first = subscribe_interrupt();
    let second = subscribe_interrupt();
    drop(subscribe_interrupt());

    broadcast_interrupt();

    assert!(first.try_recv().is_ok());
    assert!(second.try_recv().is_ok());
  }
}
