// 该文件是 Lvye （绿野） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::Detection, output::Sink};

/// 通过 tracing 打印每一个确认的检测结果
#[derive(Debug, Default)]
pub struct LogOutput {
  quiet_empty: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  // log:?quiet
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Self {
      quiet_empty: url.query_pairs().any(|(k, _)| k == "quiet"),
    })
  }
}

impl Sink for LogOutput {
  type Error = Infallible;

  fn consume(&self, frame_index: usize, detections: &[Detection]) -> Result<(), Self::Error> {
    if detections.is_empty() {
      if !self.quiet_empty {
        info!("帧 {}: 无确认目标", frame_index);
      }
      return Ok(());
    }

    info!("帧 {}: 确认 {} 个目标", frame_index, detections.len());
    for det in detections {
      info!(
        "  - {}: {:.2}% at ({:.3}, {:.3}, {:.3}, {:.3})",
        det.label,
        det.confidence * 100.0,
        det.bbox.x1,
        det.bbox.y1,
        det.bbox.x2,
        det.bbox.y2
      );
    }
    Ok(())
  }
}
