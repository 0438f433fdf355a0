// 该文件是 GSamNet 项目的一部分。
// src/output/draw.rs - 检测与分割结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, InvalidFont, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::{
  drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
  },
  rect::Rect,
};
use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::{error::ShapeError, mask::Mask, model::DetectResult, pipeline::RunOutput};

const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;
const MASK_COLOR: [u8; 3] = [30, 144, 255];
const MASK_ALPHA: f32 = 0.6;
const BORDER_COLOR: [u8; 3] = [255, 255, 255];
const BORDER_ALPHA: f32 = 0.5;
const POSITIVE_POINT_COLOR: [u8; 3] = [0, 255, 0];
const NEGATIVE_POINT_COLOR: [u8; 3] = [255, 0, 0];
const POINT_RADIUS: i32 = 6;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const TITLE_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

pub const DEFAULT_GRID_COLUMNS: usize = 8;
pub const DEFAULT_GRID_MAX: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskColor {
  Fixed([u8; 3]),
  /// 每次绘制从调用方给出的随机数发生器取色
  Random,
}

pub fn random_color<R: Rng>(rng: &mut R) -> [u8; 3] {
  [
    rng.gen_range(0..=255),
    rng.gen_range(0..=255),
    rng.gen_range(0..=255),
  ]
}

#[derive(Error, Debug)]
pub enum FontError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件: {0}")]
  InvalidFont(#[from] InvalidFont),
}

/// 读取 TrueType / OpenType 字体文件
pub fn load_font(path: impl AsRef<Path>) -> Result<FontVec, FontError> {
  let data = std::fs::read(path)?;
  Ok(FontVec::try_from_vec(data)?)
}

fn blend(pixel: &mut Rgb<u8>, color: [u8; 3], alpha: f32) {
  for (c, target) in pixel.0.iter_mut().zip(color) {
    *c = (*c as f32 * (1.0 - alpha) + target as f32 * alpha).round() as u8;
  }
}

pub struct Draw {
  box_color: [u8; 3],
  mask_color: MaskColor,
  mask_alpha: f32,
  borders: bool,
  font_size: f32,
  /// 没有字体时只画框、掩码与点，不写文字
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      mask_color: MaskColor::Fixed(MASK_COLOR),
      mask_alpha: MASK_ALPHA,
      borders: true,
      font_size: LABEL_FONT_SIZE,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_mask_color(mut self, mask_color: MaskColor) -> Self {
    self.mask_color = mask_color;
    self
  }

  pub fn with_borders(mut self, borders: bool) -> Self {
    self.borders = borders;
    self
  }

  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 文字连同内边距所占的宽高
  fn label_size(&self, font: &FontVec, text: &str) -> (u32, u32) {
    let (w, h) = text_size(PxScale::from(self.font_size), font, text);
    (w + 2 * LABEL_PADDING, h + 2 * LABEL_PADDING)
  }

  /// 以 `background` 为底，在左上角 (x, y) 写一行文字
  fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, background: [u8; 3]) {
    let Some(font) = &self.font else {
      return;
    };
    let (label_w, label_h) = self.label_size(font, text);
    let max_w = (image.width() as i32 - x).max(0) as u32;
    let label_w = label_w.min(max_w);
    if label_w == 0 || label_h == 0 {
      return;
    }
    draw_filled_rect_mut(
      image,
      Rect::at(x, y).of_size(label_w, label_h),
      Rgb(background),
    );
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      x + LABEL_PADDING as i32,
      y + LABEL_PADDING as i32,
      PxScale::from(self.font_size),
      font,
      text,
    );
  }

  /// 在每个像素角点框上方写 "短语 分数"，框贴顶时标签压在框内
  pub fn draw_labels(&self, image: &mut RgbImage, detections: &DetectResult) {
    let Some(font) = &self.font else {
      return;
    };
    for item in &detections.items {
      let text = format!("{} {:.2}", item.phrase, item.score);
      let (_, label_h) = self.label_size(font, &text);
      let x = (item.bbox[0].floor() as i32).max(0);
      let y = (item.bbox[1].floor() as i32 - label_h as i32).max(0);
      self.draw_label(image, x, y, &text, self.box_color);
    }
  }

  /// 在图像上绘制像素角点框 [x_min, y_min, x_max, y_max]
  pub fn draw_boxes(&self, image: &mut RgbImage, boxes: &[[f32; 4]]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    for bbox in boxes {
      let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
      let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
      let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
      let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

      for t in 0..BOX_THICKNESS {
        let width = x_max - x_min - 2 * t + 1;
        let height = y_max - y_min - 2 * t + 1;
        if width <= 0 || height <= 0 {
          break;
        }
        let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
      }
    }
  }

  /// 半透明叠加掩码；开启 `borders` 时再描一圈白色轮廓
  pub fn draw_mask<R: Rng>(
    &self,
    image: &mut RgbImage,
    mask: &Mask,
    rng: &mut R,
  ) -> Result<(), ShapeError> {
    if mask.dimensions() != image.dimensions() {
      return Err(ShapeError::MaskSize {
        expected: image.dimensions(),
        actual: mask.dimensions(),
      });
    }

    let color = match self.mask_color {
      MaskColor::Fixed(color) => color,
      MaskColor::Random => random_color(rng),
    };

    let edge = |x: u32, y: u32| {
      x == 0
        || y == 0
        || !mask.get(x - 1, y)
        || !mask.get(x + 1, y)
        || !mask.get(x, y - 1)
        || !mask.get(x, y + 1)
    };

    for (x, y, pixel) in image.enumerate_pixels_mut() {
      if !mask.get(x, y) {
        continue;
      }
      blend(pixel, color, self.mask_alpha);
      if self.borders && edge(x, y) {
        blend(pixel, BORDER_COLOR, BORDER_ALPHA);
      }
    }
    Ok(())
  }

  /// 标签为 1 的点画绿色，其余画红色
  pub fn draw_points(
    &self,
    image: &mut RgbImage,
    coords: &[[f32; 2]],
    labels: &[i32],
  ) -> Result<(), ShapeError> {
    if coords.len() != labels.len() {
      return Err(ShapeError::Misaligned(format!(
        "point_coords={}, point_labels={}",
        coords.len(),
        labels.len()
      )));
    }
    for ([x, y], label) in coords.iter().zip(labels) {
      let color = if *label == 1 {
        POSITIVE_POINT_COLOR
      } else {
        NEGATIVE_POINT_COLOR
      };
      let center = (x.round() as i32, y.round() as i32);
      draw_filled_circle_mut(image, center, POINT_RADIUS + 1, Rgb(BORDER_COLOR));
      draw_filled_circle_mut(image, center, POINT_RADIUS, Rgb(color));
    }
    Ok(())
  }

  /// 先叠加掩码，再画检测框与标签
  pub fn annotate<R: Rng>(
    &self,
    image: &RgbImage,
    output: &RunOutput,
    rng: &mut R,
  ) -> Result<RgbImage, ShapeError> {
    let mut canvas = image.clone();
    self.draw_mask(&mut canvas, &output.mask, rng)?;
    let (width, height) = image.dimensions();
    let detections = output.detections.clone().to_absolute(width, height);
    self.draw_boxes(&mut canvas, &detections.boxes());
    self.draw_labels(&mut canvas, &detections);
    Ok(canvas)
  }

  /// 按 `columns` 列排布图像，单元格取最大的宽与高；超过 `max` 张时截断。
  /// 有字体时在每格左上角写上对应的 `ids`
  pub fn grid<S: AsRef<str>>(
    &self,
    images: &[RgbImage],
    ids: &[S],
    columns: usize,
    max: usize,
  ) -> RgbImage {
    let images = if images.len() > max {
      warn!("图像数量 {} 超过上限 {}, 仅显示前 {} 张", images.len(), max, max);
      &images[..max]
    } else {
      images
    };
    if images.is_empty() {
      return RgbImage::new(0, 0);
    }

    let columns = columns.clamp(1, images.len());
    let rows = images.len().div_ceil(columns);
    let cell_w = images.iter().map(RgbImage::width).max().unwrap_or(0);
    let cell_h = images.iter().map(RgbImage::height).max().unwrap_or(0);

    let mut canvas = RgbImage::new(cell_w * columns as u32, cell_h * rows as u32);
    for (i, image) in images.iter().enumerate() {
      let x = (i % columns) as i64 * cell_w as i64;
      let y = (i / columns) as i64 * cell_h as i64;
      imageops::replace(&mut canvas, image, x, y);
      if let Some(id) = ids.get(i) {
        self.draw_label(&mut canvas, x as i32, y as i32, id.as_ref(), TITLE_COLOR);
      }
    }
    canvas
  }
}
