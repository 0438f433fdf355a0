// 该文件是 GSamNet 项目的一部分。
// src/prompt.rs - 分割提示的准备与坐标变换
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

use crate::{
  boxes::{BoxSpace, center_to_corners},
  error::{GSamError, ShapeError},
  model::DetectResult,
};

pub const DEFAULT_TARGET_LENGTH: u32 = 1024;

/// 带坐标空间标记的框提示
#[derive(Debug, Clone, PartialEq)]
pub struct BoxPrompt {
  pub space: BoxSpace,
  pub boxes: Vec<[f32; 4]>,
}

impl BoxPrompt {
  pub fn normalized(boxes: Vec<[f32; 4]>) -> Self {
    Self {
      space: BoxSpace::Normalized,
      boxes,
    }
  }

  pub fn absolute(boxes: Vec<[f32; 4]>) -> Self {
    Self {
      space: BoxSpace::Absolute,
      boxes,
    }
  }

  /// 转成像素角点框
  pub fn to_absolute(&self, width: u32, height: u32) -> Vec<[f32; 4]> {
    match self.space {
      BoxSpace::Absolute => self.boxes.clone(),
      BoxSpace::Normalized => self
        .boxes
        .iter()
        .map(|b| center_to_corners(*b, width, height))
        .collect(),
    }
  }
}

impl From<&DetectResult> for BoxPrompt {
  fn from(result: &DetectResult) -> Self {
    Self {
      space: result.space,
      boxes: result.boxes(),
    }
  }
}

/// 将图像长边缩放到 `target_length` 的坐标系，分割器在这个坐标系里接收提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeLongestSide {
  target_length: u32,
}

impl Default for ResizeLongestSide {
  fn default() -> Self {
    Self::new(DEFAULT_TARGET_LENGTH)
  }
}

impl ResizeLongestSide {
  pub fn new(target_length: u32) -> Self {
    Self { target_length }
  }

  pub fn target_length(&self) -> u32 {
    self.target_length
  }

  /// 缩放后的 (width, height)
  pub fn preprocess_shape(&self, (width, height): (u32, u32)) -> (u32, u32) {
    let long = width.max(height).max(1) as f64;
    let scale = self.target_length as f64 / long;
    let new_w = (width as f64 * scale + 0.5) as u32;
    let new_h = (height as f64 * scale + 0.5) as u32;
    (new_w, new_h)
  }

  fn scale(&self, original: (u32, u32)) -> (f32, f32) {
    let (new_w, new_h) = self.preprocess_shape(original);
    (
      new_w as f32 / original.0.max(1) as f32,
      new_h as f32 / original.1.max(1) as f32,
    )
  }

  pub fn apply_coords(&self, coords: &[[f32; 2]], original: (u32, u32)) -> Vec<[f32; 2]> {
    let (sx, sy) = self.scale(original);
    coords.iter().map(|[x, y]| [x * sx, y * sy]).collect()
  }

  pub fn apply_boxes(&self, boxes: &[[f32; 4]], original: (u32, u32)) -> Vec<[f32; 4]> {
    let (sx, sy) = self.scale(original);
    boxes
      .iter()
      .map(|[x0, y0, x1, y1]| [x0 * sx, y0 * sy, x1 * sx, y1 * sy])
      .collect()
  }
}

/// 已变换到分割器坐标系的提示
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPrompt {
  pub boxes: Option<Vec<[f32; 4]>>,
  pub point_coords: Option<Vec<[f32; 2]>>,
  pub point_labels: Option<Vec<i32>>,
  /// 原图 (width, height)
  pub original_size: (u32, u32),
  /// 分割器坐标系 (width, height)
  pub input_size: (u32, u32),
}

/// 校验点提示成对出现，并把框与点映射到分割器坐标系。
///
/// 框按照 `BoxPrompt::space` 的标记处理：`Normalized` 先转成像素角点框；
/// 空框列表视同没有框。
pub fn prepare_prompt(
  boxes: Option<&BoxPrompt>,
  point_coords: Option<&[[f32; 2]]>,
  point_labels: Option<&[i32]>,
  size: (u32, u32),
  transform: &ResizeLongestSide,
) -> Result<PreparedPrompt, GSamError> {
  let (point_coords, point_labels) = match (point_coords, point_labels) {
    (Some(coords), Some(labels)) => {
      if coords.len() != labels.len() {
        return Err(
          ShapeError::Misaligned(format!(
            "point_coords={}, point_labels={}",
            coords.len(),
            labels.len()
          ))
          .into(),
        );
      }
      (
        Some(transform.apply_coords(coords, size)),
        Some(labels.to_vec()),
      )
    }
    (None, None) => (None, None),
    _ => return Err(GSamError::PromptPairing),
  };

  let boxes = boxes
    .filter(|prompt| !prompt.boxes.is_empty())
    .map(|prompt| transform.apply_boxes(&prompt.to_absolute(size.0, size.1), size));

  debug!(
    "提示准备完成: {} 个框, {} 个点",
    boxes.as_ref().map_or(0, Vec::len),
    point_coords.as_ref().map_or(0, Vec::len)
  );

  Ok(PreparedPrompt {
    boxes,
    point_coords,
    point_labels,
    original_size: size,
    input_size: transform.preprocess_shape(size),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn longest_side_is_scaled_to_target() {
    let transform = ResizeLongestSide::new(1024);
    assert_eq!(transform.preprocess_shape((100, 100)), (1024, 1024));
    assert_eq!(transform.preprocess_shape((640, 480)), (1024, 768));
    assert_eq!(transform.preprocess_shape((480, 640)), (768, 1024));
  }

  #[test]
  fn unpaired_points_are_rejected() {
    let transform = ResizeLongestSide::default();
    let coords: [[f32; 2]; 1] = [[1.0, 2.0]];
    let labels: [i32; 1] = [1];
    assert!(matches!(
      prepare_prompt(None, Some(&coords[..]), None, (10, 10), &transform),
      Err(GSamError::PromptPairing)
    ));
    assert!(matches!(
      prepare_prompt(None, None, Some(&labels[..]), (10, 10), &transform),
      Err(GSamError::PromptPairing)
    ));
    assert!(matches!(
      prepare_prompt(
        Some(&BoxPrompt::absolute(vec![[0.0, 0.0, 5.0, 5.0]])),
        Some(&coords[..]),
        None,
        (10, 10),
        &transform
      ),
      Err(GSamError::PromptPairing)
    ));
  }

  #[test]
  fn point_count_must_match_label_count() {
    let transform = ResizeLongestSide::default();
    let coords: [[f32; 2]; 2] = [[1.0, 2.0], [3.0, 4.0]];
    let err = prepare_prompt(
      None,
      Some(&coords[..]),
      Some(&[1][..]),
      (10, 10),
      &transform,
    )
    .unwrap_err();
    assert!(matches!(err, GSamError::Shape(ShapeError::Misaligned(_))));
  }

  #[test]
  fn boxes_follow_explicit_space_tag() {
    let transform = ResizeLongestSide::new(200);
    let normalized = BoxPrompt::normalized(vec![[0.5, 0.5, 0.5, 0.5]]);
    let prompt = prepare_prompt(Some(&normalized), None, None, (100, 50), &transform).unwrap();
    assert_eq!(prompt.input_size, (200, 100));
    assert_eq!(prompt.boxes, Some(vec![[50.0, 25.0, 150.0, 75.0]]));

    // 像素框的第一个坐标落在 [0, 1] 内时也不会被当成归一化框
    let absolute = BoxPrompt::absolute(vec![[0.5, 0.0, 50.0, 25.0]]);
    let prompt = prepare_prompt(Some(&absolute), None, None, (100, 50), &transform).unwrap();
    assert_eq!(prompt.boxes, Some(vec![[1.0, 0.0, 100.0, 50.0]]));
    assert_eq!(prompt.point_coords, None);
    assert_eq!(prompt.point_labels, None);
  }

  #[test]
  fn points_are_mapped_with_labels() {
    let transform = ResizeLongestSide::new(20);
    let prompt = prepare_prompt(
      None,
      Some(&[[5.0f32, 5.0]][..]),
      Some(&[0][..]),
      (10, 10),
      &transform,
    )
    .unwrap();
    assert_eq!(prompt.point_coords, Some(vec![[10.0, 10.0]]));
    assert_eq!(prompt.point_labels, Some(vec![0]));
    assert_eq!(prompt.boxes, None);
  }

  #[test]
  fn empty_box_list_counts_as_absent() {
    let transform = ResizeLongestSide::default();
    let prompt = prepare_prompt(
      Some(&BoxPrompt::absolute(Vec::new())),
      None,
      None,
      (10, 10),
      &transform,
    )
    .unwrap();
    assert_eq!(prompt.boxes, None);
  }
}
