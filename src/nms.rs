// 该文件是 Lvye （绿野） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::model::Detection;

/// 贪心 NMS：按置信度降序（稳定排序）遍历，
/// 与任一已选框的 IoU 超过阈值即丢弃。几何比较不区分类别。
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  let total = candidates.len();
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut selected: Vec<Detection> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    let suppressed = selected
      .iter()
      .any(|kept| kept.bbox.iou(&candidate.bbox) > iou_threshold);
    if !suppressed {
      selected.push(candidate);
    }
  }

  debug!("NMS: {} 个候选保留 {} 个", total, selected.len());
  selected
}
