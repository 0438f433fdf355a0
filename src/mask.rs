// 该文件是 GSamNet 项目的一部分。
// src/mask.rs - 二值掩码
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

use image::{GrayImage, Luma};
use tracing::debug;

use crate::error::ShapeError;

/// 行优先存储的二值掩码，尺寸与源图像一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
  width: u32,
  height: u32,
  data: Box<[bool]>,
}

impl Mask {
  pub fn new(width: u32, height: u32, data: Vec<bool>) -> Result<Self, ShapeError> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
      return Err(ShapeError::BufferLength {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 全为 false 的掩码
  pub fn empty(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      data: vec![false; width as usize * height as usize].into_boxed_slice(),
    }
  }

  pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
    let data = (0..height)
      .flat_map(|y| (0..width).map(move |x| (x, y)))
      .map(|(x, y)| f(x, y))
      .collect::<Vec<_>>();
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  /// 非零像素视为前景
  pub fn from_gray_image(image: &GrayImage) -> Self {
    let (width, height) = image.dimensions();
    Self::from_fn(width, height, |x, y| image.get_pixel(x, y)[0] > 0)
  }

  pub fn to_gray_image(&self) -> GrayImage {
    GrayImage::from_fn(self.width, self.height, |x, y| {
      Luma([if self.get(x, y) { 255 } else { 0 }])
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// (width, height)
  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn as_slice(&self) -> &[bool] {
    &self.data
  }

  /// 越界返回 false
  pub fn get(&self, x: u32, y: u32) -> bool {
    if x >= self.width || y >= self.height {
      return false;
    }
    self.data[(y * self.width + x) as usize]
  }

  pub fn pixel_count(&self) -> usize {
    self.data.iter().filter(|&&b| b).count()
  }

  pub fn any(&self) -> bool {
    self.data.iter().any(|&b| b)
  }

  /// 前景像素的外接框 [x_min, y_min, x_max, y_max]
  pub fn bbox(&self) -> Option<[f32; 4]> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in 0..self.height {
      for x in 0..self.width {
        if self.get(x, y) {
          let (x0, y0, x1, y1) = bounds.unwrap_or((x, y, x, y));
          bounds = Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y)));
        }
      }
    }
    bounds.map(|(x0, y0, x1, y1)| [x0 as f32, y0 as f32, (x1 + 1) as f32, (y1 + 1) as f32])
  }

  /// 与另一个同尺寸掩码做逻辑或
  pub fn union_with(&mut self, other: &Mask) -> Result<(), ShapeError> {
    if self.dimensions() != other.dimensions() {
      return Err(ShapeError::MaskSize {
        expected: self.dimensions(),
        actual: other.dimensions(),
      });
    }
    for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
      *a |= *b;
    }
    Ok(())
  }
}

/// 丢弃前景像素数低于阈值的实例掩码；阈值为 0 时全部保留
pub fn filter_by_area(masks: Vec<Mask>, area_threshold: usize) -> Vec<Mask> {
  let before = masks.len();
  let masks: Vec<_> = masks
    .into_iter()
    .filter(|mask| mask.pixel_count() >= area_threshold)
    .collect();
  debug!(
    "面积过滤 (>= {} px): {} -> {}",
    area_threshold,
    before,
    masks.len()
  );
  masks
}

/// 将多个实例掩码合并成一个，没有实例时返回全 false 掩码
pub fn combine(masks: &[Mask], width: u32, height: u32) -> Result<Mask, ShapeError> {
  let mut combined = Mask::empty(width, height);
  for mask in masks {
    combined.union_with(mask)?;
  }
  Ok(combined)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn square(size: u32, x0: u32, y0: u32, side: u32) -> Mask {
    Mask::from_fn(size, size, |x, y| {
      x >= x0 && x < x0 + side && y >= y0 && y < y0 + side
    })
  }

  #[test]
  fn new_checks_buffer_length() {
    assert!(Mask::new(2, 2, vec![true; 3]).is_err());
    let mask = Mask::new(2, 2, vec![true, false, true, false]).unwrap();
    assert!(mask.get(0, 0));
    assert!(!mask.get(1, 0));
    assert!(!mask.get(5, 5));
  }

  #[test]
  fn filter_by_area_keeps_large_masks() {
    let masks = vec![square(50, 0, 0, 10), square(50, 0, 0, 30), square(50, 0, 0, 22)];
    let kept = filter_by_area(masks.clone(), 500);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].pixel_count(), 900);

    let all = filter_by_area(masks.clone(), 0);
    assert_eq!(all, masks);
  }

  #[test]
  fn combine_is_logical_or() {
    let a = square(10, 0, 0, 4);
    let b = square(10, 2, 2, 4);
    let combined = combine(&[a, b], 10, 10).unwrap();
    assert_eq!(combined.pixel_count(), 16 + 16 - 4);
    assert_eq!(combined.bbox(), Some([0.0, 0.0, 6.0, 6.0]));

    let empty = combine(&[], 10, 10).unwrap();
    assert!(!empty.any());
    assert_eq!(empty.bbox(), None);
  }

  #[test]
  fn combine_rejects_mismatched_sizes() {
    let err = combine(&[square(8, 0, 0, 2)], 10, 10).unwrap_err();
    assert_eq!(
      err,
      ShapeError::MaskSize {
        expected: (10, 10),
        actual: (8, 8)
      }
    );
  }

  #[test]
  fn gray_image_round_trip() {
    let mask = square(6, 1, 2, 3);
    assert_eq!(Mask::from_gray_image(&mask.to_gray_image()), mask);
  }
}
