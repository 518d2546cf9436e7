// 该文件是 Lvye （绿野） 项目的一部分。
// src/model.rs - 检测结果与推理引擎接口
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

use std::sync::Arc;

use crate::tensor::RawTensor;

/// 推理引擎：给定预处理后的输入，返回一个原始输出张量
pub trait InferenceEngine {
  type Input;
  type Error;

  fn run(&self, input: &Self::Input) -> Result<RawTensor, Self::Error>;
}

/// 归一化坐标下的轴对齐边界框，满足 `0 <= x1 <= x2 <= 1`、`0 <= y1 <= y2 <= 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  /// 由角点构造，坐标截断到 [0, 1] 并保证有序
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    let (x1, x2) = (clamp01(x1), clamp01(x2));
    let (y1, y2) = (clamp01(y1), clamp01(y2));
    Self {
      x1: x1.min(x2),
      y1: y1.min(y2),
      x2: x1.max(x2),
      y2: y1.max(y2),
    }
  }

  /// 由模型输入像素空间中的中心点与宽高构造
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, input_size: f32) -> Self {
    Self::new(
      (cx - w / 2.0) / input_size,
      (cy - h / 2.0) / input_size,
      (cx + w / 2.0) / input_size,
      (cy + h / 2.0) / input_size,
    )
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn center(&self) -> (f32, f32) {
    ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
  }

  pub fn intersection(&self, other: &BBox) -> f32 {
    let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
    let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
    w * h
  }

  /// 交并比；并集面积为 0 时返回 0
  pub fn iou(&self, other: &BBox) -> f32 {
    let intersection = self.intersection(other);
    let union = self.area() + other.area() - intersection;
    if union > 0.0 { intersection / union } else { 0.0 }
  }

  pub fn as_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

fn clamp01(v: f32) -> f32 {
  v.clamp(0.0, 1.0)
}

/// 封闭类别集合中的一个类别，由配置中的有序标签列表给出
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
  id: u32,
  name: Arc<str>,
}

impl Label {
  pub fn new(id: u32, name: impl Into<Arc<str>>) -> Self {
    Self {
      id,
      name: name.into(),
    }
  }

  pub fn id(&self) -> u32 {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl std::fmt::Display for Label {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.name)
  }
}

/// 按配置顺序排列的标签集合
#[derive(Debug, Clone)]
pub struct LabelSet {
  labels: Box<[Label]>,
}

impl LabelSet {
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let labels = names
      .into_iter()
      .enumerate()
      .map(|(id, name)| Label::new(id as u32, name.as_ref()))
      .collect();
    Self { labels }
  }

  pub fn get(&self, index: usize) -> Option<&Label> {
    self.labels.get(index)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BBox,
  pub label: Label,
  pub confidence: f32,
}

impl Detection {
  pub fn new(bbox: BBox, label: Label, confidence: f32) -> Self {
    Self {
      bbox,
      label,
      confidence,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn boxes() -> Vec<BBox> {
    vec![
      BBox::new(0.1, 0.1, 0.4, 0.4),
      BBox::new(0.2, 0.2, 0.5, 0.6),
      BBox::new(0.0, 0.0, 1.0, 1.0),
      BBox::new(0.6, 0.6, 0.9, 0.8),
      BBox::new(0.35, 0.05, 0.7, 0.3),
    ]
  }

  #[test]
  fn iou_is_symmetric() {
    let boxes = boxes();
    for a in &boxes {
      for b in &boxes {
        assert_eq!(a.iou(b), b.iou(a));
      }
    }
  }

  #[test]
  fn iou_with_itself_is_one() {
    for a in boxes() {
      assert_eq!(a.iou(&a), 1.0);
    }
  }

  #[test]
  fn disjoint_boxes_have_zero_iou() {
    let a = BBox::new(0.0, 0.0, 0.2, 0.2);
    let b = BBox::new(0.5, 0.5, 0.7, 0.7);
    assert_eq!(a.iou(&b), 0.0);

    // 仅共享一条边
    let c = BBox::new(0.2, 0.0, 0.4, 0.2);
    assert_eq!(a.iou(&c), 0.0);
  }

  #[test]
  fn degenerate_boxes_have_zero_iou() {
    let point = BBox::new(0.3, 0.3, 0.3, 0.3);
    assert_eq!(point.iou(&point), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = BBox::new(0.0, 0.0, 0.4, 0.2);
    let b = BBox::new(0.2, 0.0, 0.6, 0.2);
    // 交集 0.2*0.2，并集 0.08 + 0.08 - 0.04
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn from_center_clamps_and_orders() {
    let bbox = BBox::from_center(10.0, 320.0, 40.0, 64.0, 640.0);
    assert_eq!(bbox.x1, 0.0);
    assert!((bbox.x2 - 30.0 / 640.0).abs() < 1e-6);
    assert!((bbox.y1 - 288.0 / 640.0).abs() < 1e-6);
    assert!((bbox.y2 - 352.0 / 640.0).abs() < 1e-6);

    let flipped = BBox::from_center(320.0, 320.0, -64.0, 64.0, 640.0);
    assert!(flipped.x1 <= flipped.x2);

    let huge = BBox::from_center(320.0, 320.0, 2000.0, 2000.0, 640.0);
    assert_eq!(huge.as_array(), [0.0, 0.0, 1.0, 1.0]);
  }

  #[test]
  fn label_set_preserves_order() {
    let set = LabelSet::new(["healthy", "leaf_rust", "powdery_mildew"]);
    assert_eq!(set.len(), 3);
    let label = set.get(1).unwrap();
    assert_eq!(label.id(), 1);
    assert_eq!(label.name(), "leaf_rust");
    assert_eq!(label.to_string(), "leaf_rust");
    assert!(set.get(3).is_none());
  }
}
