// 该文件是 GSamNet 项目的一部分。
// src/segmenter.rs - 提示分割
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

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  error::{GSamError, ShapeError},
  input::ToRgbImage,
  mask::{Mask, combine, filter_by_area},
  model::Segmenter,
  prompt::{BoxPrompt, PreparedPrompt, ResizeLongestSide, prepare_prompt},
};

pub const DEFAULT_AREA_THRESHOLD: usize = 500;

/// 分割器的活动图像；离开作用域时总会调用 `reset_image`
struct ActiveImage<'a, S: Segmenter + ?Sized> {
  model: &'a mut S,
}

impl<'a, S: Segmenter + ?Sized> ActiveImage<'a, S> {
  fn set(model: &'a mut S, image: &RgbImage) -> Result<Self, GSamError> {
    let mut active = ActiveImage { model };
    active.model.set_image(image).map_err(GSamError::Segmenter)?;
    Ok(active)
  }

  fn predict(&mut self, prompt: &PreparedPrompt) -> Result<Vec<Mask>, GSamError> {
    self
      .model
      .predict(prompt, false)
      .map_err(GSamError::Segmenter)
  }
}

impl<S: Segmenter + ?Sized> Drop for ActiveImage<'_, S> {
  fn drop(&mut self) {
    self.model.reset_image();
    debug!("已释放分割器图像");
  }
}

pub struct SamSegmenter<S> {
  model: S,
  transform: ResizeLongestSide,
  area_threshold: usize,
}

impl<S: Segmenter> SamSegmenter<S> {
  pub fn new(model: S) -> Self {
    let transform = ResizeLongestSide::new(model.target_length());
    Self {
      model,
      transform,
      area_threshold: DEFAULT_AREA_THRESHOLD,
    }
  }

  pub fn with_area_threshold(mut self, area_threshold: usize) -> Self {
    self.area_threshold = area_threshold;
    self
  }

  pub fn area_threshold(&self) -> usize {
    self.area_threshold
  }

  pub fn transform(&self) -> &ResizeLongestSide {
    &self.transform
  }

  pub fn model(&self) -> &S {
    &self.model
  }

  /// 单张图像分割，返回所有保留实例掩码的逻辑或
  pub fn segment<I: ToRgbImage + ?Sized>(
    &mut self,
    image: &I,
    boxes: Option<&BoxPrompt>,
    point_coords: Option<&[[f32; 2]]>,
    point_labels: Option<&[i32]>,
  ) -> Result<Mask, GSamError> {
    let image = image.as_rgb_image();
    let (width, height) = image.dimensions();
    let prompt = prepare_prompt(
      boxes,
      point_coords,
      point_labels,
      (width, height),
      &self.transform,
    )?;

    let masks = {
      let mut active = ActiveImage::set(&mut self.model, &image)?;
      active.predict(&prompt)?
    };
    debug!("分割器返回 {} 个实例掩码", masks.len());

    if let Some(mask) = masks.iter().find(|m| m.dimensions() != (width, height)) {
      return Err(
        ShapeError::MaskSize {
          expected: (width, height),
          actual: mask.dimensions(),
        }
        .into(),
      );
    }

    let masks = filter_by_area(masks, self.area_threshold);
    Ok(combine(&masks, width, height)?)
  }

  /// 逐张分割；给出的提示列表长度必须与图像数量一致
  pub fn segment_batch<I: ToRgbImage>(
    &mut self,
    images: &[I],
    boxes: Option<&[Option<BoxPrompt>]>,
    point_coords: Option<&[Option<Vec<[f32; 2]>>]>,
    point_labels: Option<&[Option<Vec<i32>>]>,
  ) -> Result<Vec<Mask>, GSamError> {
    if point_coords.is_some() != point_labels.is_some() {
      return Err(GSamError::PromptPairing);
    }

    let expected = images.len();
    let lengths = [
      ("boxes", boxes.map(<[_]>::len)),
      ("point_coords", point_coords.map(<[_]>::len)),
      ("point_labels", point_labels.map(<[_]>::len)),
    ];
    for (what, actual) in lengths {
      if let Some(actual) = actual
        && actual != expected
      {
        return Err(GSamError::LengthMismatch {
          what,
          expected,
          actual,
        });
      }
    }

    info!("批量分割 {} 张图像", expected);
    images
      .iter()
      .enumerate()
      .map(|(index, image)| {
        let bbox = boxes.and_then(|b| b[index].as_ref());
        let coords = point_coords.and_then(|c| c[index].as_deref());
        let labels = point_labels.and_then(|l| l[index].as_deref());
        self
          .segment(image, bbox, coords, labels)
          .map_err(GSamError::at(index))
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ModelError;

  /// 按提示框填充矩形的分割器，记录图像上下文的设置与释放
  #[derive(Default)]
  struct BoxFill {
    active: bool,
    resets: usize,
    fail_predict: bool,
    multimask: Vec<bool>,
  }

  impl Segmenter for BoxFill {
    fn set_image(&mut self, _image: &RgbImage) -> Result<(), ModelError> {
      assert!(!self.active, "上一张图像没有释放");
      self.active = true;
      Ok(())
    }

    fn predict(
      &mut self,
      prompt: &PreparedPrompt,
      multimask_output: bool,
    ) -> Result<Vec<Mask>, ModelError> {
      self.multimask.push(multimask_output);
      if self.fail_predict {
        return Err("推理失败".into());
      }
      let (w, h) = prompt.original_size;
      let sx = prompt.input_size.0 as f32 / w as f32;
      let sy = prompt.input_size.1 as f32 / h as f32;
      Ok(
        prompt
          .boxes
          .iter()
          .flatten()
          .map(|b| {
            let [x0, y0, x1, y1] = [b[0] / sx, b[1] / sy, b[2] / sx, b[3] / sy];
            Mask::from_fn(w, h, |x, y| {
              let (x, y) = (x as f32 + 0.5, y as f32 + 0.5);
              x >= x0 && x < x1 && y >= y0 && y < y1
            })
          })
          .collect(),
      )
    }

    fn reset_image(&mut self) {
      self.active = false;
      self.resets += 1;
    }
  }

  #[test]
  fn segment_merges_masks_and_drops_small_ones() {
    let mut segmenter = SamSegmenter::new(BoxFill::default());
    let image = RgbImage::new(100, 100);
    let prompt = BoxPrompt::absolute(vec![
      [0.0, 0.0, 40.0, 40.0],
      [50.0, 50.0, 60.0, 60.0],
      [20.0, 20.0, 50.0, 50.0],
    ]);

    let mask = segmenter.segment(&image, Some(&prompt), None, None).unwrap();
    assert_eq!(mask.dimensions(), (100, 100));
    // 10x10 的实例低于 500 像素被丢弃
    assert!(!mask.get(55, 55));
    assert_eq!(mask.pixel_count(), 1600 + 900 - 400);
    assert_eq!(segmenter.model().resets, 1);
    assert!(!segmenter.model().active);
  }

  #[test]
  fn segmenter_is_asked_for_a_single_mask() {
    let mut segmenter = SamSegmenter::new(BoxFill::default()).with_area_threshold(0);
    let images = vec![RgbImage::new(10, 10), RgbImage::new(20, 10)];
    let boxes = vec![Some(BoxPrompt::absolute(vec![[0.0, 0.0, 5.0, 5.0]])), None];
    segmenter
      .segment_batch(&images, Some(boxes.as_slice()), None, None)
      .unwrap();
    assert_eq!(segmenter.model().multimask, vec![false, false]);
  }

  #[test]
  fn image_is_released_when_prediction_fails() {
    let mut segmenter = SamSegmenter::new(BoxFill {
      fail_predict: true,
      ..Default::default()
    });
    let image = RgbImage::new(10, 10);
    let err = segmenter.segment(&image, None, None, None).unwrap_err();
    assert!(matches!(err, GSamError::Segmenter(_)));
    assert_eq!(segmenter.model().resets, 1);
    assert!(!segmenter.model().active);
  }

  #[test]
  fn no_surviving_mask_gives_empty_mask() {
    let mut segmenter = SamSegmenter::new(BoxFill::default()).with_area_threshold(10_000);
    let image = RgbImage::new(50, 50);
    let prompt = BoxPrompt::normalized(vec![[0.5, 0.5, 0.5, 0.5]]);
    let mask = segmenter.segment(&image, Some(&prompt), None, None).unwrap();
    assert!(!mask.any());
  }

  #[test]
  fn batch_lengths_must_match_images() {
    let mut segmenter = SamSegmenter::new(BoxFill::default());
    let images = vec![RgbImage::new(10, 10), RgbImage::new(10, 10)];
    let boxes = vec![Some(BoxPrompt::absolute(vec![[0.0, 0.0, 5.0, 5.0]]))];
    let err = segmenter
      .segment_batch(&images, Some(boxes.as_slice()), None, None)
      .unwrap_err();
    assert!(matches!(
      err,
      GSamError::LengthMismatch {
        what: "boxes",
        expected: 2,
        actual: 1
      }
    ));
    assert_eq!(segmenter.model().resets, 0);
  }

  #[test]
  fn batch_points_must_be_paired() {
    let mut segmenter = SamSegmenter::new(BoxFill::default());
    let images = vec![RgbImage::new(10, 10)];
    let coords: Vec<Option<Vec<[f32; 2]>>> = vec![Some(vec![[1.0, 1.0]])];
    assert!(matches!(
      segmenter.segment_batch(&images, None, Some(coords.as_slice()), None),
      Err(GSamError::PromptPairing)
    ));
  }

  #[test]
  fn batch_segments_each_image_in_order() {
    let mut segmenter = SamSegmenter::new(BoxFill::default()).with_area_threshold(0);
    let images = vec![RgbImage::new(20, 20), RgbImage::new(30, 10)];
    let boxes = vec![
      Some(BoxPrompt::absolute(vec![[0.0, 0.0, 10.0, 10.0]])),
      None,
    ];
    let masks = segmenter
      .segment_batch(&images, Some(boxes.as_slice()), None, None)
      .unwrap();
    assert_eq!(masks.len(), 2);
    assert_eq!(masks[0].pixel_count(), 100);
    assert_eq!(masks[1].dimensions(), (30, 10));
    assert!(!masks[1].any());
    assert_eq!(segmenter.model().resets, 2);
  }
}
