// 该文件是 Lvye （绿野） 项目的一部分。
// src/throttle.rs - 推理帧率节流
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

use std::time::{Duration, Instant};

/// 硬性节流门：距上一次推理不足 `period` 的帧直接丢弃
#[derive(Debug, Clone)]
pub struct Throttle {
  period: Duration,
  last: Option<Instant>,
}

impl Throttle {
  pub fn new(period: Duration) -> Self {
    Self { period, last: None }
  }

  pub fn last_inference(&self) -> Option<Instant> {
    self.last
  }

  pub fn is_open(&self, now: Instant) -> bool {
    match self.last {
      Some(last) => now.saturating_duration_since(last) >= self.period,
      None => true,
    }
  }

  pub fn commit(&mut self, now: Instant) {
    self.last = Some(now);
  }

  pub fn reset(&mut self) {
    self.last = None;
  }
}
