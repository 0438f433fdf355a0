// 该文件是 GSamNet 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{
  boxes::{BoxSpace, center_to_corners},
  error::{ModelError, ShapeError},
  mask::Mask,
  prompt::{DEFAULT_TARGET_LENGTH, PreparedPrompt},
};

mod catalog;
pub use self::catalog::{
  GROUNDING_DINO_CHECKPOINT, GROUNDING_DINO_CONFIG, HubFile, Sam1Variant, Sam2Variant, SamFamily,
  SamModel,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub phrase: String,
  pub score: f32,
  pub bbox: [f32; 4],
}

/// 检测结果；`space` 标明 `bbox` 所在的坐标空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
  pub space: BoxSpace,
  pub items: Vec<DetectItem>,
}

impl DetectResult {
  pub fn empty(space: BoxSpace) -> Self {
    Self {
      space,
      items: Vec::new(),
    }
  }

  /// 由三个按下标对齐的序列构造
  pub fn from_parts(
    space: BoxSpace,
    boxes: Vec<[f32; 4]>,
    scores: Vec<f32>,
    phrases: Vec<String>,
  ) -> Result<Self, ShapeError> {
    if boxes.len() != scores.len() || boxes.len() != phrases.len() {
      return Err(ShapeError::Misaligned(format!(
        "boxes={}, scores={}, phrases={}",
        boxes.len(),
        scores.len(),
        phrases.len()
      )));
    }
    let items = boxes
      .into_iter()
      .zip(scores)
      .zip(phrases)
      .map(|((bbox, score), phrase)| DetectItem {
        phrase,
        score,
        bbox,
      })
      .collect();
    Ok(Self { space, items })
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn boxes(&self) -> Vec<[f32; 4]> {
    self.items.iter().map(|item| item.bbox).collect()
  }

  pub fn scores(&self) -> Vec<f32> {
    self.items.iter().map(|item| item.score).collect()
  }

  pub fn phrases(&self) -> Vec<String> {
    self.items.iter().map(|item| item.phrase.clone()).collect()
  }

  pub fn into_parts(self) -> (Vec<[f32; 4]>, Vec<f32>, Vec<String>) {
    let mut boxes = Vec::with_capacity(self.items.len());
    let mut scores = Vec::with_capacity(self.items.len());
    let mut phrases = Vec::with_capacity(self.items.len());
    for DetectItem {
      phrase,
      score,
      bbox,
    } in self.items
    {
      boxes.push(bbox);
      scores.push(score);
      phrases.push(phrase);
    }
    (boxes, scores, phrases)
  }

  /// 转为像素角点框，已是像素坐标时原样返回
  pub fn to_absolute(self, width: u32, height: u32) -> Self {
    match self.space {
      BoxSpace::Absolute => self,
      BoxSpace::Normalized => Self {
        space: BoxSpace::Absolute,
        items: self
          .items
          .into_iter()
          .map(|mut item| {
            item.bbox = center_to_corners(item.bbox, width, height);
            item
          })
          .collect(),
      },
    }
  }
}

/// 文本条件目标检测器（Grounding DINO 一类）
pub trait Detector {
  /// 返回的框通常位于 `BoxSpace::Normalized`
  fn predict(
    &self,
    image: &RgbImage,
    caption: &str,
    box_threshold: f32,
    text_threshold: f32,
  ) -> Result<DetectResult, ModelError>;
}

/// 可提示的分割器（SAM 一类），同一时间只持有一张活动图像
pub trait Segmenter {
  /// 分割器输入坐标系的长边长度
  fn target_length(&self) -> u32 {
    DEFAULT_TARGET_LENGTH
  }

  fn set_image(&mut self, image: &RgbImage) -> Result<(), ModelError>;

  /// 每个实例返回一张与原图同尺寸的掩码
  fn predict(
    &mut self,
    prompt: &PreparedPrompt,
    multimask_output: bool,
  ) -> Result<Vec<Mask>, ModelError>;

  /// 清除活动图像；未设置图像时调用也必须安全
  fn reset_image(&mut self);
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn predict(
    &self,
    image: &RgbImage,
    caption: &str,
    box_threshold: f32,
    text_threshold: f32,
  ) -> Result<DetectResult, ModelError> {
    (**self).predict(image, caption, box_threshold, text_threshold)
  }
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
  fn target_length(&self) -> u32 {
    (**self).target_length()
  }

  fn set_image(&mut self, image: &RgbImage) -> Result<(), ModelError> {
    (**self).set_image(image)
  }

  fn predict(
    &mut self,
    prompt: &PreparedPrompt,
    multimask_output: bool,
  ) -> Result<Vec<Mask>, ModelError> {
    (**self).predict(prompt, multimask_output)
  }

  fn reset_image(&mut self) {
    (**self).reset_image()
  }
}

/// 由下载好的配置与权重文件构建具体网络
pub trait ModelLoader {
  type Detector: Detector;
  type Segmenter: Segmenter;

  fn load_detector(&self, config: &Path, checkpoint: &Path) -> Result<Self::Detector, ModelError>;

  fn load_segmenter(
    &self,
    variant: Sam1Variant,
    checkpoint: &Path,
  ) -> Result<Self::Segmenter, ModelError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_parts_requires_aligned_sequences() {
    let err = DetectResult::from_parts(
      BoxSpace::Normalized,
      vec![[0.5; 4]],
      vec![0.9, 0.8],
      vec!["dog".to_string()],
    )
    .unwrap_err();
    assert!(matches!(err, ShapeError::Misaligned(_)));
  }

  #[test]
  fn to_absolute_converts_once() {
    let result = DetectResult::from_parts(
      BoxSpace::Normalized,
      vec![[0.5, 0.5, 0.5, 0.5]],
      vec![0.9],
      vec!["dog".to_string()],
    )
    .unwrap();
    let absolute = result.to_absolute(100, 200);
    assert_eq!(absolute.space, BoxSpace::Absolute);
    assert_eq!(absolute.boxes(), vec![[25.0, 50.0, 75.0, 150.0]]);

    let again = absolute.clone().to_absolute(100, 200);
    assert_eq!(again, absolute);

    let (boxes, scores, phrases) = again.into_parts();
    assert_eq!(boxes.len(), 1);
    assert_eq!(scores, vec![0.9]);
    assert_eq!(phrases, vec!["dog".to_string()]);
  }
}
