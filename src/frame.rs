// 该文件是 GSamNet 项目的一部分。
// src/frame.rs - 原始像素帧定义
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

use image::{Rgb, RgbImage};

use crate::error::ShapeError;

pub const RGB_CHANNELS: usize = 3;

/// 交错排列 (H, W, C) 的 RGB 帧
#[derive(Debug, Clone, PartialEq)]
pub struct RgbHwcFrame {
  height: usize,
  width: usize,
  data: Box<[u8]>,
}

/// 平面排列 (C, H, W) 的 RGB 帧
#[derive(Debug, Clone, PartialEq)]
pub struct RgbChwFrame {
  height: usize,
  width: usize,
  data: Box<[u8]>,
}

fn check_len(height: usize, width: usize, len: usize) -> Result<(), ShapeError> {
  let expected = RGB_CHANNELS * height * width;
  if len != expected {
    return Err(ShapeError::BufferLength {
      expected,
      actual: len,
    });
  }
  Ok(())
}

impl RgbHwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      height,
      width,
      data: vec![0u8; RGB_CHANNELS * height * width].into_boxed_slice(),
    }
  }

  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Result<Self, ShapeError> {
    check_len(height, width, data.len())?;
    Ok(Self {
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }
}

impl RgbChwFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      height,
      width,
      data: vec![0u8; RGB_CHANNELS * height * width].into_boxed_slice(),
    }
  }

  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Result<Self, ShapeError> {
    check_len(height, width, data.len())?;
    Ok(Self {
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_chw(&self) -> &[u8] {
    &self.data
  }
}

impl AsMut<[u8]> for RgbHwcFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsMut<[u8]> for RgbChwFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<&RgbImage> for RgbHwcFrame {
  fn from(image: &RgbImage) -> Self {
    // RgbImage 本身就是 HWC 排列
    let (width, height) = image.dimensions();
    Self {
      height: height as usize,
      width: width as usize,
      data: image.as_raw().clone().into_boxed_slice(),
    }
  }
}

impl From<&RgbImage> for RgbChwFrame {
  fn from(image: &RgbImage) -> Self {
    let mut frame = {
      let (width, height) = image.dimensions();
      RgbChwFrame::with_shape(height as usize, width as usize)
    };

    let plane = frame.height * frame.width;
    let width = frame.width;
    let slice = frame.as_mut();

    for (x, y, Rgb(pixel)) in image.enumerate_pixels() {
      let idx = y as usize * width + x as usize;
      for (c, value) in pixel.iter().enumerate() {
        slice[c * plane + idx] = *value;
      }
    }
    frame
  }
}
