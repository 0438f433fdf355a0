// 该文件是 GSamNet 项目的一部分。
// src/input.rs - 图像输入与规范化
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

use std::borrow::Cow;

use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage, RgbaImage};

use crate::frame::{RgbChwFrame, RgbHwcFrame};

/// 将各种内存中的图像表示统一转换为 `RgbImage`，
/// 检测器与分割器只接受这一种规范形式。
pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;

  /// 已是 `RgbImage` 时直接借用，避免复制
  fn as_rgb_image(&self) -> Cow<'_, RgbImage> {
    Cow::Owned(self.to_rgb_image())
  }
}

impl ToRgbImage for RgbImage {
  fn to_rgb_image(&self) -> RgbImage {
    self.clone()
  }

  fn as_rgb_image(&self) -> Cow<'_, RgbImage> {
    Cow::Borrowed(self)
  }
}

impl ToRgbImage for RgbaImage {
  fn to_rgb_image(&self) -> RgbImage {
    DynamicImage::ImageRgba8(self.clone()).to_rgb8()
  }
}

impl ToRgbImage for GrayImage {
  fn to_rgb_image(&self) -> RgbImage {
    DynamicImage::ImageLuma8(self.clone()).to_rgb8()
  }
}

impl ToRgbImage for DynamicImage {
  fn to_rgb_image(&self) -> RgbImage {
    self.to_rgb8()
  }
}

impl ToRgbImage for RgbHwcFrame {
  fn to_rgb_image(&self) -> RgbImage {
    let width = self.width() as u32;
    let height = self.height() as u32;
    let data = self.as_hwc();

    ImageBuffer::from_fn(width, height, |x, y| {
      let idx = (y as usize * width as usize + x as usize) * 3;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

impl ToRgbImage for RgbChwFrame {
  fn to_rgb_image(&self) -> RgbImage {
    let width = self.width() as u32;
    let height = self.height() as u32;
    let plane = self.width() * self.height();
    let data = self.as_chw();

    // 将 CHW 转为 RGB 图像
    ImageBuffer::from_fn(width, height, |x, y| {
      let idx = y as usize * width as usize + x as usize;
      Rgb([data[idx], data[plane + idx], data[2 * plane + idx]])
    })
  }
}

impl<T: ToRgbImage + ?Sized> ToRgbImage for &T {
  fn to_rgb_image(&self) -> RgbImage {
    (**self).to_rgb_image()
  }

  fn as_rgb_image(&self) -> Cow<'_, RgbImage> {
    (**self).as_rgb_image()
  }
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};
