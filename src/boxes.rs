// 该文件是 GSamNet 项目的一部分。
// src/boxes.rs - 边界框坐标转换与过滤
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ShapeError, model::DetectResult};

/// 边界框所在的坐标空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxSpace {
  /// [cx, cy, w, h]，归一化到 [0, 1]
  Normalized,
  /// [x_min, y_min, x_max, y_max]，像素坐标
  Absolute,
}

fn as_box(bbox: &[f32]) -> Result<[f32; 4], ShapeError> {
  <[f32; 4]>::try_from(bbox).map_err(|_| ShapeError::BoxLength(bbox.len()))
}

pub(crate) fn center_to_corners(bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
  let [cx, cy, w, h] = bbox;
  let (sw, sh) = (width as f32, height as f32);
  [
    (cx - 0.5 * w) * sw,
    (cy - 0.5 * h) * sh,
    (cx + 0.5 * w) * sw,
    (cy + 0.5 * h) * sh,
  ]
}

/// 归一化的中心框转换为像素角点框
pub fn centerbox_to_corners(bbox: &[f32], width: u32, height: u32) -> Result<[f32; 4], ShapeError> {
  Ok(center_to_corners(as_box(bbox)?, width, height))
}

/// 像素角点框转换为归一化的中心框
pub fn corners_to_centerbox(bbox: &[f32], width: u32, height: u32) -> Result<[f32; 4], ShapeError> {
  let [x0, y0, x1, y1] = as_box(bbox)?;
  let (sw, sh) = (width as f32, height as f32);
  Ok([
    (x0 + x1) * 0.5 / sw,
    (y0 + y1) * 0.5 / sh,
    (x1 - x0) / sw,
    (y1 - y0) / sh,
  ])
}

pub fn box_area(bbox: &[f32; 4]) -> f32 {
  (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0)
}

/// 两个角点框的交并比
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = box_area(a) + box_area(b) - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

pub fn clip_box(bbox: &[f32; 4], width: u32, height: u32) -> [f32; 4] {
  let (w, h) = (width as f32, height as f32);
  [
    bbox[0].clamp(0.0, w),
    bbox[1].clamp(0.0, h),
    bbox[2].clamp(0.0, w),
    bbox[3].clamp(0.0, h),
  ]
}

/// 非极大值抑制，返回保留下来的下标，按分数降序排列；
/// 与已保留框的 IoU 超过 `iou_threshold` 时被抑制
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
  order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut keep: Vec<usize> = Vec::with_capacity(order.len());
  for idx in order {
    if keep
      .iter()
      .all(|&kept| iou(&boxes[kept], &boxes[idx]) <= iou_threshold)
    {
      keep.push(idx);
    }
  }
  keep
}

/// 只保留分数不低于阈值的检测结果
pub fn filter_boxes(result: DetectResult, score_threshold: f32) -> DetectResult {
  let before = result.len();
  let DetectResult { space, items } = result;
  let items: Vec<_> = items
    .into_iter()
    .filter(|item| item.score >= score_threshold)
    .collect();
  debug!(
    "分数过滤 (>= {}): {} -> {}",
    score_threshold,
    before,
    items.len()
  );
  DetectResult { space, items }
}

/// 流水线中的第二道过滤：转为像素角点框并裁剪到图像内，
/// 丢弃退化框与低分框，再按 IoU 去重。
pub fn process_boxes(
  result: DetectResult,
  (width, height): (u32, u32),
  score_threshold: f32,
  iou_threshold: f32,
) -> DetectResult {
  let DetectResult { space, items } = result.to_absolute(width, height);
  let items: Vec<_> = items
    .into_iter()
    .map(|mut item| {
      item.bbox = clip_box(&item.bbox, width, height);
      item
    })
    .filter(|item| box_area(&item.bbox) > 0.0 && item.score >= score_threshold)
    .collect();

  let boxes: Vec<_> = items.iter().map(|item| item.bbox).collect();
  let scores: Vec<_> = items.iter().map(|item| item.score).collect();
  let keep = nms(&boxes, &scores, iou_threshold);

  let mut slots: Vec<_> = items.into_iter().map(Some).collect();
  let items: Vec<_> = keep.into_iter().filter_map(|idx| slots[idx].take()).collect();
  debug!("框后处理后保留 {} 个目标", items.len());

  DetectResult { space, items }
}
