// 该文件是 Lvye （绿野） 项目的一部分。
// src/stabilizer.rs - 检测结果时序稳定（连续帧确认）
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

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{config::PipelineConfig, model::Detection};

/// 时序稳定使用的检测标识：类别 + 中心点所在的空间桶。
///
/// 中心点先换算到模型输入像素空间，再按 `bucket_size` 四舍五入。
/// 这是有损的：同类且相距很近的两个目标会合并为同一个键，
/// 中心点跨过桶边界的目标会被拆成两个键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetectionKey {
  pub label_id: u32,
  pub bucket_x: i64,
  pub bucket_y: i64,
}

impl DetectionKey {
  pub fn of(detection: &Detection, input_size: f32, bucket_size: f32) -> Self {
    let (cx, cy) = detection.bbox.center();
    Self {
      label_id: detection.label.id(),
      bucket_x: (cx * input_size / bucket_size).round() as i64,
      bucket_y: (cy * input_size / bucket_size).round() as i64,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceEntry {
  pub key: DetectionKey,
  pub consecutive_count: u32,
}

pub struct Stabilizer {
  min_frames_for_trigger: u32,
  input_size: f32,
  bucket_size: f32,
  entries: HashMap<DetectionKey, PersistenceEntry>,
}

impl Stabilizer {
  pub fn new(config: &PipelineConfig) -> Self {
    Self {
      min_frames_for_trigger: config.min_frames_for_trigger,
      input_size: config.input_size,
      bucket_size: config.bucket_size,
      entries: HashMap::new(),
    }
  }

  pub fn key_of(&self, detection: &Detection) -> DetectionKey {
    DetectionKey::of(detection, self.input_size, self.bucket_size)
  }

  pub fn entry(&self, key: &DetectionKey) -> Option<&PersistenceEntry> {
    self.entries.get(key)
  }

  pub fn tracked(&self) -> usize {
    self.entries.len()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  /// 处理一帧 NMS 之后的检测结果，返回已确认的子集。每帧只调用一次。
  pub fn update(&mut self, detections: Vec<Detection>) -> Vec<Detection> {
    let keys: Vec<DetectionKey> = detections.iter().map(|d| self.key_of(d)).collect();
    let present: HashSet<DetectionKey> = keys.iter().copied().collect();

    for key in &present {
      self
        .entries
        .entry(*key)
        .and_modify(|e| e.consecutive_count = e.consecutive_count.saturating_add(1))
        .or_insert(PersistenceEntry {
          key: *key,
          consecutive_count: 1,
        });
    }

    // 缺席的键逐帧衰减，计数为 1 时移除
    self.entries.retain(|key, entry| {
      if present.contains(key) {
        return true;
      }
      if entry.consecutive_count > 1 {
        entry.consecutive_count -= 1;
        true
      } else {
        false
      }
    });

    let min_frames = self.min_frames_for_trigger;
    let stable: Vec<Detection> = detections
      .into_iter()
      .zip(keys)
      .filter(|(_, key)| {
        self
          .entries
          .get(key)
          .is_some_and(|e| e.consecutive_count >= min_frames)
      })
      .map(|(detection, _)| detection)
      .collect();

    debug!(
      "时序稳定: 本帧 {} 个键, 跟踪 {} 个, 确认 {} 个",
      present.len(),
      self.entries.len(),
      stable.len()
    );
    stable
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BBox, Label};

  fn config(min_frames: u32) -> PipelineConfig {
    PipelineConfig::new(1, vec!["healthy".into(), "leaf_rust".into()])
      .with_min_frames_for_trigger(min_frames)
  }

  fn det_at(cx: f32, cy: f32, label: u32) -> Detection {
    Detection::new(
      BBox::new(cx - 0.05, cy - 0.05, cx + 0.05, cy + 0.05),
      Label::new(label, format!("class-{label}")),
      0.9,
    )
  }

  #[test]
  fn confirms_after_min_frames() {
    let mut stabilizer = Stabilizer::new(&config(3));
    let det = det_at(0.5, 0.5, 1);

    assert!(stabilizer.update(vec![det.clone()]).is_empty());
    assert!(stabilizer.update(vec![det.clone()]).is_empty());
    assert_eq!(stabilizer.update(vec![det.clone()]), vec![det.clone()]);
    assert_eq!(stabilizer.update(vec![det.clone()]), vec![det]);
  }

  #[test]
  fn absent_key_decays_then_is_removed() {
    let mut stabilizer = Stabilizer::new(&config(3));
    let det = det_at(0.5, 0.5, 1);
    let key = stabilizer.key_of(&det);

    stabilizer.update(vec![det.clone()]);
    stabilizer.update(vec![det]);
    assert_eq!(stabilizer.entry(&key).unwrap().consecutive_count, 2);

    stabilizer.update(Vec::new());
    assert_eq!(stabilizer.entry(&key).unwrap().consecutive_count, 1);

    stabilizer.update(Vec::new());
    assert!(stabilizer.entry(&key).is_none());
    assert_eq!(stabilizer.tracked(), 0);
  }

  #[test]
  fn single_miss_does_not_reset_confirmation() {
    let mut stabilizer = Stabilizer::new(&config(3));
    let det = det_at(0.3, 0.7, 0);

    for _ in 0..4 {
      stabilizer.update(vec![det.clone()]);
    }
    // 计数 4 -> 3
    assert!(stabilizer.update(Vec::new()).is_empty());
    assert_eq!(stabilizer.update(vec![det.clone()]), vec![det]);
  }

  #[test]
  fn transient_detection_never_confirms() {
    let mut stabilizer = Stabilizer::new(&config(2));
    let flicker = det_at(0.2, 0.2, 0);
    assert!(stabilizer.update(vec![flicker]).is_empty());
    assert!(stabilizer.update(Vec::new()).is_empty());
    assert_eq!(stabilizer.tracked(), 0);
  }

  #[test]
  fn small_jitter_maps_to_same_key() {
    let stabilizer = Stabilizer::new(&config(3));
    // 640 像素输入、10 像素分桶：0.5 -> 320px，0.503 -> 321.9px
    let a = stabilizer.key_of(&det_at(0.5, 0.5, 1));
    let b = stabilizer.key_of(&det_at(0.503, 0.497, 1));
    assert_eq!(a, b);

    let other_label = stabilizer.key_of(&det_at(0.5, 0.5, 0));
    assert_ne!(a, other_label);

    let far = stabilizer.key_of(&det_at(0.6, 0.5, 1));
    assert_ne!(a, far);
  }

  #[test]
  fn duplicate_keys_in_one_frame_count_once() {
    let mut stabilizer = Stabilizer::new(&config(2));
    let a = det_at(0.5, 0.5, 1);
    let b = det_at(0.501, 0.5, 1);
    let key = stabilizer.key_of(&a);

    assert!(stabilizer.update(vec![a.clone(), b.clone()]).is_empty());
    assert_eq!(stabilizer.entry(&key).unwrap().consecutive_count, 1);
    assert_eq!(stabilizer.update(vec![a.clone(), b.clone()]), vec![a, b]);
  }

  #[test]
  fn min_frames_of_one_confirms_immediately() {
    let mut stabilizer = Stabilizer::new(&config(1));
    let det = det_at(0.5, 0.5, 1);
    assert_eq!(stabilizer.update(vec![det.clone()]), vec![det]);
  }
}
