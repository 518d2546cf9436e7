// 该文件是 Lvye （绿野） 项目的一部分。
// src/output/directory_record.rs - 检测历史目录记录
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
  fs::OpenOptions,
  io::Write,
  path::PathBuf,
  sync::Mutex,
};

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::Detection,
  output::Sink,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("记录锁已损坏")]
  Poisoned,
}

/// 将确认后的检测结果按日期追加到 `<dir>/YYYY/MM/DD.jsonl`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  always: bool,
  // 串行化对同一文件的追加写入
  writer: Mutex<()>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let directory = urlencoding::decode(uri.path())?;

    Ok(Self::new(PathBuf::from(directory.as_ref()), always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: PathBuf, always: bool) -> Self {
    Self {
      directory,
      always,
      writer: Mutex::new(()),
    }
  }

  pub fn record_path(&self, now: &DateTime<Utc>) -> PathBuf {
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}.jsonl", now.day()))
  }

  pub fn record_at(
    &self,
    frame_index: usize,
    detections: &[Detection],
    now: DateTime<Utc>,
  ) -> Result<(), DirectoryRecordOutputError> {
    if !self.always && detections.is_empty() {
      return Ok(());
    }

    let items: Vec<_> = detections
      .iter()
      .map(|d| {
        json!({
          "label": d.label.name(),
          "label_id": d.label.id(),
          "confidence": d.confidence,
          "bbox": d.bbox.as_array(),
        })
      })
      .collect();
    let line = serde_json::to_string(&json!({
      "timestamp": now.to_rfc3339(),
      "frame": frame_index,
      "detections": items,
    }))?;

    let path = self.record_path(&now);
    let _guard = self
      .writer
      .lock()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", line)?;
    debug!("记录 {} 个检测结果到 {}", detections.len(), path.display());
    Ok(())
  }
}

impl Sink for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn consume(&self, frame_index: usize, detections: &[Detection]) -> Result<(), Self::Error> {
    self.record_at(frame_index, detections, Utc::now())
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::model::{BBox, Label};

  fn detection() -> Detection {
    Detection::new(
      BBox::new(0.25, 0.25, 0.5, 0.75),
      Label::new(1, "leaf_rust"),
      0.875,
    )
  }

  #[test]
  fn appends_json_lines_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path().to_path_buf(), false);
    let now = Utc.with_ymd_and_hms(2026, 3, 7, 10, 30, 0).unwrap();

    output.record_at(1, &[detection()], now).unwrap();
    output.record_at(2, &[detection()], now).unwrap();

    let path = dir.path().join("2026").join("03").join("07.jsonl");
    assert_eq!(output.record_path(&now), path);

    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<serde_json::Value> = content
      .lines()
      .map(|l| serde_json::from_str(l).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["frame"], 1);
    assert_eq!(lines[1]["frame"], 2);
    assert_eq!(lines[0]["detections"][0]["label"], "leaf_rust");
    assert_eq!(lines[0]["detections"][0]["label_id"], 1);
    assert_eq!(lines[0]["detections"][0]["confidence"], 0.875);
    assert_eq!(lines[0]["detections"][0]["bbox"][3], 0.75);
  }

  #[test]
  fn skips_empty_results_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 7, 10, 30, 0).unwrap();

    let output = DirectoryRecordOutput::new(dir.path().to_path_buf(), false);
    output.record_at(1, &[], now).unwrap();
    assert!(!output.record_path(&now).exists());

    let output = DirectoryRecordOutput::new(dir.path().to_path_buf(), true);
    output.record_at(1, &[], now).unwrap();
    assert!(output.record_path(&now).exists());
  }

  #[test]
  fn parses_url_options() {
    let url = url::Url::parse("record:///var/lib/lvye/history?always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.always);
    assert_eq!(output.directory, PathBuf::from("/var/lib/lvye/history"));

    let url = url::Url::parse("log:").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }
}
