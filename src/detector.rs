// 该文件是 GSamNet 项目的一部分。
// src/detector.rs - 文本条件目标检测
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

use tracing::{debug, info};

use crate::{
  boxes::filter_boxes,
  error::GSamError,
  input::ToRgbImage,
  model::{DetectResult, Detector},
};

/// 批量检测的结果：按图像排列的框、分数与短语
pub type DetectBatch = (Vec<Vec<[f32; 4]>>, Vec<Vec<f32>>, Vec<Vec<String>>);

pub(crate) fn check_threshold(name: &str, value: f32) -> Result<(), GSamError> {
  if !(0.0..=1.0).contains(&value) {
    return Err(GSamError::configuration(format!(
      "{} 必须位于 [0, 1], 实际为 {}",
      name, value
    )));
  }
  Ok(())
}

/// 检测器要求的提示格式：小写，以句点结尾
pub fn normalize_caption(text_prompt: &str) -> Result<String, GSamError> {
  let mut caption = text_prompt.trim().to_lowercase();
  if caption.is_empty() {
    return Err(GSamError::configuration("文本提示不能为空"));
  }
  if !caption.ends_with('.') {
    caption.push('.');
  }
  Ok(caption)
}

pub struct GroundingDino<D> {
  model: D,
}

impl<D: Detector> GroundingDino<D> {
  pub fn new(model: D) -> Self {
    Self { model }
  }

  pub fn model(&self) -> &D {
    &self.model
  }

  /// 单张图像检测。
  ///
  /// `normalize` 为 true 时把归一化中心框转换为像素角点框；
  /// 返回前总会按 `box_threshold` 过滤一次。
  pub fn detect<I: ToRgbImage + ?Sized>(
    &self,
    image: &I,
    text_prompt: &str,
    box_threshold: f32,
    text_threshold: f32,
    normalize: bool,
  ) -> Result<DetectResult, GSamError> {
    check_threshold("box_threshold", box_threshold)?;
    check_threshold("text_threshold", text_threshold)?;
    let caption = normalize_caption(text_prompt)?;

    let image = image.as_rgb_image();
    let (width, height) = image.dimensions();
    debug!("执行检测: {}x{}, 提示 '{}'", width, height, caption);

    let result = self
      .model
      .predict(&image, &caption, box_threshold, text_threshold)
      .map_err(GSamError::Detector)?;
    debug!("检测器返回 {} 个候选框", result.len());

    let result = if normalize {
      result.to_absolute(width, height)
    } else {
      result
    };

    Ok(filter_boxes(result, box_threshold))
  }

  /// 逐张检测，保持输入顺序；任一图像失败时返回带下标的错误
  pub fn detect_batch<I: ToRgbImage>(
    &self,
    images: &[I],
    text_prompt: &str,
    box_threshold: f32,
    text_threshold: f32,
    normalize: bool,
  ) -> Result<DetectBatch, GSamError> {
    info!("批量检测 {} 张图像", images.len());
    let mut boxes = Vec::with_capacity(images.len());
    let mut scores = Vec::with_capacity(images.len());
    let mut phrases = Vec::with_capacity(images.len());

    for (index, image) in images.iter().enumerate() {
      let (b, s, p) = self
        .detect(image, text_prompt, box_threshold, text_threshold, normalize)
        .map_err(GSamError::at(index))?
        .into_parts();
      boxes.push(b);
      scores.push(s);
      phrases.push(p);
    }

    Ok((boxes, scores, phrases))
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use image::RgbImage;

  use super::*;
  use crate::{boxes::BoxSpace, error::ModelError};

  struct FixedDetector {
    result: DetectResult,
    captions: RefCell<Vec<String>>,
  }

  impl Detector for FixedDetector {
    fn predict(
      &self,
      image: &RgbImage,
      caption: &str,
      _box_threshold: f32,
      _text_threshold: f32,
    ) -> Result<DetectResult, ModelError> {
      if image.width() == 0 {
        return Err("空图像".into());
      }
      self.captions.borrow_mut().push(caption.to_string());
      Ok(self.result.clone())
    }
  }

  fn detector() -> GroundingDino<FixedDetector> {
    let result = DetectResult::from_parts(
      BoxSpace::Normalized,
      vec![[0.5, 0.5, 0.5, 0.5], [0.25, 0.25, 0.1, 0.1]],
      vec![0.9, 0.2],
      vec!["dog".to_string(), "ball".to_string()],
    )
    .unwrap();
    GroundingDino::new(FixedDetector {
      result,
      captions: RefCell::new(Vec::new()),
    })
  }

  #[test]
  fn caption_is_lowercased_and_terminated() {
    assert_eq!(normalize_caption("  A Dog ").unwrap(), "a dog.");
    assert_eq!(normalize_caption("cat.").unwrap(), "cat.");
    assert!(normalize_caption("   ").is_err());
  }

  #[test]
  fn detect_filters_and_optionally_converts() {
    let detector = detector();
    let image = RgbImage::new(100, 100);

    let raw = detector.detect(&image, "Dog", 0.3, 0.25, false).unwrap();
    assert_eq!(raw.space, BoxSpace::Normalized);
    assert_eq!(raw.phrases(), vec!["dog".to_string()]);
    assert_eq!(raw.boxes(), vec![[0.5, 0.5, 0.5, 0.5]]);

    let converted = detector.detect(&image, "Dog", 0.3, 0.25, true).unwrap();
    assert_eq!(converted.space, BoxSpace::Absolute);
    assert_eq!(converted.boxes(), vec![[25.0, 25.0, 75.0, 75.0]]);

    assert_eq!(
      *detector.model().captions.borrow(),
      vec!["dog.".to_string(), "dog.".to_string()]
    );
  }

  #[test]
  fn thresholds_outside_unit_interval_are_rejected() {
    let detector = detector();
    let image = RgbImage::new(10, 10);
    assert!(matches!(
      detector.detect(&image, "dog", 1.5, 0.25, false),
      Err(GSamError::Configuration(_))
    ));
  }

  #[test]
  fn empty_batch_returns_empty_sequences() {
    let detector = detector();
    let images: Vec<RgbImage> = Vec::new();
    let (boxes, scores, phrases) = detector.detect_batch(&images, "dog", 0.3, 0.25, false).unwrap();
    assert!(boxes.is_empty() && scores.is_empty() && phrases.is_empty());
  }

  #[test]
  fn batch_failure_names_the_image() {
    let detector = detector();
    let images = vec![RgbImage::new(10, 10), RgbImage::new(0, 0)];
    let err = detector
      .detect_batch(&images, "dog", 0.3, 0.25, true)
      .unwrap_err();
    assert!(matches!(err, GSamError::Batch { index: 1, .. }));
  }
}
