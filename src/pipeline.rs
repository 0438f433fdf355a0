// 该文件是 GSamNet 项目的一部分。
// src/pipeline.rs - 检测后分割流水线
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

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use image::RgbImage;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  boxes::process_boxes,
  detector::{GroundingDino, check_threshold},
  error::GSamError,
  hub::ModelHub,
  input::ToRgbImage,
  mask::Mask,
  model::{
    DetectResult, Detector, GROUNDING_DINO_CHECKPOINT, GROUNDING_DINO_CONFIG, HubFile,
    ModelLoader, SamFamily, SamModel, Segmenter,
  },
  prompt::BoxPrompt,
  segmenter::{DEFAULT_AREA_THRESHOLD, SamSegmenter},
};

pub const DEFAULT_DEDUP_IOU: f32 = 0.7;

/// 推理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// 以检测框作为分割提示
  BoxPredict,
}

impl Mode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Mode::BoxPredict => "box_predict",
    }
  }
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Mode {
  type Err = GSamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "box_predict" => Ok(Mode::BoxPredict),
      other => Err(GSamError::UnsupportedMode(other.to_string())),
    }
  }
}

impl TryFrom<&str> for Mode {
  type Error = GSamError;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// 语料的遍历方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
  Batch,
}

impl DataMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      DataMode::Batch => "batch",
    }
  }
}

impl fmt::Display for DataMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DataMode {
  type Err = GSamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "batch" => Ok(DataMode::Batch),
      other => Err(GSamError::UnsupportedDataMode(other.to_string())),
    }
  }
}

impl TryFrom<&str> for DataMode {
  type Error = GSamError;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    value.parse()
  }
}

/// 单张图像的推理结果；`detections` 为像素角点框
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
  pub detections: DetectResult,
  pub mask: Mask,
}

/// 一组按下标对齐的图像、真值掩码与标识
#[derive(Debug, Clone, Default)]
pub struct ImageGroup {
  pub images: Vec<RgbImage>,
  pub masks: Vec<Option<Mask>>,
  pub ids: Vec<String>,
}

impl ImageGroup {
  pub fn new(
    images: Vec<RgbImage>,
    masks: Vec<Option<Mask>>,
    ids: Vec<String>,
  ) -> Result<Self, GSamError> {
    let group = Self { images, masks, ids };
    group.check()?;
    Ok(group)
  }

  pub fn len(&self) -> usize {
    self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.images.is_empty()
  }

  pub fn check(&self) -> Result<(), GSamError> {
    let expected = self.images.len();
    for (what, actual) in [("masks", self.masks.len()), ("ids", self.ids.len())] {
      if actual != expected {
        return Err(GSamError::LengthMismatch {
          what,
          expected,
          actual,
        });
      }
    }
    Ok(())
  }
}

/// 语料推理的七个对齐输出序列
#[derive(Debug, Clone, Default)]
pub struct CorpusOutput {
  pub boxes: Vec<Vec<[f32; 4]>>,
  pub scores: Vec<Vec<f32>>,
  pub phrases: Vec<Vec<String>>,
  pub images: Vec<RgbImage>,
  pub ids: Vec<String>,
  pub original_masks: Vec<Option<Mask>>,
  pub predicted_masks: Vec<Mask>,
}

impl CorpusOutput {
  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  fn push(&mut self, image: RgbImage, id: String, original: Option<Mask>, output: RunOutput) {
    let (boxes, scores, phrases) = output.detections.into_parts();
    self.boxes.push(boxes);
    self.scores.push(scores);
    self.phrases.push(phrases);
    self.images.push(image);
    self.ids.push(id);
    self.original_masks.push(original);
    self.predicted_masks.push(output.mask);
  }
}

/// 网络构造参数，可由 `gsam://?sam=SAM1&model=vit_b` 形式的 URL 给出
#[derive(Debug, Clone)]
pub struct GSamNetworkBuilder {
  sam: Option<String>,
  sam_model: Option<String>,
  area_threshold: usize,
  dedup_iou: f32,
}

impl Default for GSamNetworkBuilder {
  fn default() -> Self {
    Self {
      sam: None,
      sam_model: None,
      area_threshold: DEFAULT_AREA_THRESHOLD,
      dedup_iou: DEFAULT_DEDUP_IOU,
    }
  }
}

impl FromUrlWithScheme for GSamNetworkBuilder {
  const SCHEME: &'static str = "gsam";
}

impl FromUrl for GSamNetworkBuilder {
  type Error = GSamError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GSamError::configuration(format!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = Self::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "sam" => builder.sam = Some(value.into_owned()),
        "model" => builder.sam_model = Some(value.into_owned()),
        "area_threshold" => {
          builder.area_threshold = value.parse().map_err(|_| {
            GSamError::configuration(format!("area_threshold 不是非负整数: {}", value))
          })?
        }
        "dedup_iou" => {
          builder.dedup_iou = value
            .parse()
            .map_err(|_| GSamError::configuration(format!("dedup_iou 不是数值: {}", value)))?
        }
        other => debug!("忽略未知参数: {}", other),
      }
    }
    Ok(builder)
  }
}

fn fetch<H: ModelHub + ?Sized>(hub: &H, file: HubFile) -> Result<PathBuf, GSamError> {
  hub.fetch(file.repo_id, file.filename).map_err(|source| {
    error!("下载 {}/{} 失败: {}", file.repo_id, file.filename, source);
    GSamError::Download {
      repo_id: file.repo_id.to_string(),
      filename: file.filename.to_string(),
      source,
    }
  })
}

impl GSamNetworkBuilder {
  pub fn sam(mut self, sam: impl Into<String>) -> Self {
    self.sam = Some(sam.into());
    self
  }

  pub fn sam_model(mut self, name: impl Into<String>) -> Self {
    self.sam_model = Some(name.into());
    self
  }

  pub fn area_threshold(mut self, area_threshold: usize) -> Self {
    self.area_threshold = area_threshold;
    self
  }

  pub fn dedup_iou(mut self, dedup_iou: f32) -> Self {
    self.dedup_iou = dedup_iou;
    self
  }

  /// 获取权重文件并加载两个网络；任一步失败都会返回错误，不会留下半成品
  pub fn build<H, L>(
    self,
    hub: &H,
    loader: &L,
  ) -> Result<GSamNetwork<L::Detector, L::Segmenter>, GSamError>
  where
    H: ModelHub + ?Sized,
    L: ModelLoader,
  {
    let family: SamFamily = self
      .sam
      .as_deref()
      .ok_or_else(|| {
        GSamError::configuration(format!("必须指定 sam, 可选: {:?}", SamFamily::NAMES))
      })?
      .parse()?;
    check_threshold("dedup_iou", self.dedup_iou)?;

    let variant = match family.resolve(self.sam_model.as_deref())? {
      SamModel::Sam1(variant) => variant,
      model @ SamModel::Sam2(_) => {
        error!("{} 尚未实现", model);
        return Err(GSamError::NotYetSupported(model.to_string()));
      }
    };

    info!("加载 Grounding DINO");
    let config = fetch(hub, GROUNDING_DINO_CONFIG)?;
    let checkpoint = fetch(hub, GROUNDING_DINO_CHECKPOINT)?;
    let detector = loader
      .load_detector(&config, &checkpoint)
      .map_err(|source| {
        error!("Grounding DINO 加载失败: {}", source);
        GSamError::ModelLoad {
          model: "GroundingDINO".to_string(),
          source,
        }
      })?;

    let model = SamModel::Sam1(variant);
    info!("加载 {}", model);
    let checkpoint = fetch(hub, variant.checkpoint())?;
    let segmenter = loader
      .load_segmenter(variant, &checkpoint)
      .map_err(|source| {
        error!("{} 加载失败: {}", model, source);
        GSamError::ModelLoad {
          model: model.to_string(),
          source,
        }
      })?;

    Ok(
      GSamNetwork::from_parts(
        GroundingDino::new(detector),
        SamSegmenter::new(segmenter).with_area_threshold(self.area_threshold),
      )
      .with_dedup_iou(self.dedup_iou),
    )
  }
}

/// 文本提示检测 + 框提示分割
pub struct GSamNetwork<D, S> {
  detector: GroundingDino<D>,
  segmenter: SamSegmenter<S>,
  dedup_iou: f32,
}

impl<D: Detector, S: Segmenter> GSamNetwork<D, S> {
  pub fn from_parts(detector: GroundingDino<D>, segmenter: SamSegmenter<S>) -> Self {
    Self {
      detector,
      segmenter,
      dedup_iou: DEFAULT_DEDUP_IOU,
    }
  }

  pub fn with_dedup_iou(mut self, dedup_iou: f32) -> Self {
    self.dedup_iou = dedup_iou;
    self
  }

  pub fn detector(&self) -> &GroundingDino<D> {
    &self.detector
  }

  pub fn segmenter(&self) -> &SamSegmenter<S> {
    &self.segmenter
  }

  pub fn segmenter_mut(&mut self) -> &mut SamSegmenter<S> {
    &mut self.segmenter
  }

  /// 单张图像推理。
  ///
  /// 先按 `box_threshold` 检测，再按 `process_box_threshold` 与 IoU 去重做第二道过滤。
  /// 没有框留下时不调用分割器，直接返回全 false 掩码。
  #[allow(clippy::too_many_arguments)]
  pub fn run<I, M>(
    &mut self,
    image: &I,
    text_prompt: &str,
    box_threshold: f32,
    process_box_threshold: f32,
    text_threshold: f32,
    mode: M,
  ) -> Result<RunOutput, GSamError>
  where
    I: ToRgbImage + ?Sized,
    M: TryInto<Mode>,
    M::Error: Into<GSamError>,
  {
    let mode: Mode = mode.try_into().map_err(Into::<GSamError>::into)?;
    check_threshold("process_box_threshold", process_box_threshold)?;

    let image = image.as_rgb_image();
    let (width, height) = image.dimensions();
    let detections = self
      .detector
      .detect(&*image, text_prompt, box_threshold, text_threshold, true)?;
    let detections = process_boxes(
      detections,
      (width, height),
      process_box_threshold,
      self.dedup_iou,
    );
    info!("'{}' 保留 {} 个目标", text_prompt, detections.len());

    let mask = match mode {
      Mode::BoxPredict if detections.is_empty() => Mask::empty(width, height),
      Mode::BoxPredict => {
        let prompt = BoxPrompt::from(&detections);
        self.segmenter.segment(&*image, Some(&prompt), None, None)?
      }
    };

    Ok(RunOutput { detections, mask })
  }

  /// 逐组逐张推理，累积七个对齐的输出序列；出错时给出全局图像下标
  #[allow(clippy::too_many_arguments)]
  pub fn run_corpus<M, DM>(
    &mut self,
    groups: &[ImageGroup],
    text_prompt: &str,
    box_threshold: f32,
    process_box_threshold: f32,
    text_threshold: f32,
    mode: M,
    data_mode: DM,
  ) -> Result<CorpusOutput, GSamError>
  where
    M: TryInto<Mode>,
    M::Error: Into<GSamError>,
    DM: TryInto<DataMode>,
    DM::Error: Into<GSamError>,
  {
    let mode: Mode = mode.try_into().map_err(Into::<GSamError>::into)?;
    let data_mode: DataMode = data_mode.try_into().map_err(Into::<GSamError>::into)?;
    for group in groups {
      group.check()?;
    }

    let mut output = CorpusOutput::default();
    match data_mode {
      DataMode::Batch => {
        let total: usize = groups.iter().map(ImageGroup::len).sum();
        info!("语料推理: {} 组, 共 {} 张图像", groups.len(), total);

        for group in groups {
          let records = group.images.iter().zip(&group.masks).zip(&group.ids);
          for ((image, original), id) in records {
            let index = output.len();
            debug!("处理 #{} '{}'", index, id);
            let result = self
              .run(
                image,
                text_prompt,
                box_threshold,
                process_box_threshold,
                text_threshold,
                mode,
              )
              .map_err(GSamError::at(index))?;
            output.push(image.clone(), id.clone(), original.clone(), result);
          }
        }
      }
    }
    Ok(output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{boxes::BoxSpace, error::ModelError, prompt::PreparedPrompt};

  struct Fixed(DetectResult);

  impl Detector for Fixed {
    fn predict(
      &self,
      _image: &RgbImage,
      _caption: &str,
      _box_threshold: f32,
      _text_threshold: f32,
    ) -> Result<DetectResult, ModelError> {
      Ok(self.0.clone())
    }
  }

  /// 每个提示框输出一张全图掩码，并统计调用次数
  #[derive(Default)]
  struct Full {
    calls: usize,
  }

  impl Segmenter for Full {
    fn set_image(&mut self, _image: &RgbImage) -> Result<(), ModelError> {
      Ok(())
    }

    fn predict(
      &mut self,
      prompt: &PreparedPrompt,
      _multimask_output: bool,
    ) -> Result<Vec<Mask>, ModelError> {
      self.calls += 1;
      let (w, h) = prompt.original_size;
      let count = prompt.boxes.as_ref().map_or(0, Vec::len);
      Ok(vec![Mask::from_fn(w, h, |_, _| true); count])
    }

    fn reset_image(&mut self) {}
  }

  fn network(result: DetectResult) -> GSamNetwork<Fixed, Full> {
    GSamNetwork::from_parts(
      GroundingDino::new(Fixed(result)),
      SamSegmenter::new(Full::default()),
    )
  }

  fn dogs() -> DetectResult {
    DetectResult::from_parts(
      BoxSpace::Normalized,
      vec![
        [0.5, 0.5, 0.5, 0.5],
        [0.5, 0.5, 0.48, 0.48],
        [0.2, 0.2, 0.2, 0.2],
      ],
      vec![0.9, 0.8, 0.35],
      vec!["dog".to_string(), "dog".to_string(), "dog".to_string()],
    )
    .unwrap()
  }

  #[test]
  fn modes_are_parsed_at_the_boundary() {
    assert_eq!("box_predict".parse::<Mode>().unwrap(), Mode::BoxPredict);
    assert_eq!(Mode::BoxPredict.to_string(), "box_predict");
    assert!(matches!(
      Mode::try_from("unsupported_value"),
      Err(GSamError::UnsupportedMode(m)) if m == "unsupported_value"
    ));
    assert_eq!(DataMode::try_from("batch").unwrap(), DataMode::Batch);
    assert!(matches!(
      "stream".parse::<DataMode>(),
      Err(GSamError::UnsupportedDataMode(_))
    ));
  }

  #[test]
  fn run_deduplicates_and_applies_second_threshold() {
    let mut network = network(dogs());
    let image = RgbImage::new(100, 100);
    let output = network
      .run(&image, "dog", 0.3, 0.5, 0.25, "box_predict")
      .unwrap();
    assert_eq!(output.detections.space, BoxSpace::Absolute);
    assert_eq!(output.detections.scores(), vec![0.9]);
    assert_eq!(output.detections.boxes(), vec![[25.0, 25.0, 75.0, 75.0]]);
    assert_eq!(output.mask.dimensions(), (100, 100));
    assert!(output.mask.any());
    assert_eq!(network.segmenter().model().calls, 1);
  }

  #[test]
  fn run_without_boxes_skips_segmenter() {
    let mut network = network(DetectResult::empty(BoxSpace::Normalized));
    let image = RgbImage::new(64, 32);
    let output = network
      .run(&image, "dog", 0.3, 0.3, 0.25, Mode::BoxPredict)
      .unwrap();
    assert!(output.detections.is_empty());
    assert_eq!(output.mask.dimensions(), (64, 32));
    assert!(!output.mask.any());
    assert_eq!(network.segmenter().model().calls, 0);
  }

  #[test]
  fn unknown_mode_fails_before_inference() {
    let mut network = network(dogs());
    let image = RgbImage::new(10, 10);
    let err = network
      .run(&image, "dog", 0.3, 0.3, 0.25, "unsupported_value")
      .unwrap_err();
    assert!(matches!(err, GSamError::UnsupportedMode(_)));
    assert_eq!(network.segmenter().model().calls, 0);
  }

  #[test]
  fn image_group_checks_parallel_lengths() {
    let err = ImageGroup::new(
      vec![RgbImage::new(2, 2), RgbImage::new(2, 2)],
      vec![None, None],
      vec!["a".to_string()],
    )
    .unwrap_err();
    assert!(matches!(
      err,
      GSamError::LengthMismatch {
        what: "ids",
        expected: 2,
        actual: 1
      }
    ));
  }

  #[test]
  fn builder_reads_url_query() {
    let url = Url::parse("gsam://?sam=SAM1&model=vit_b&area_threshold=300&dedup_iou=0.6").unwrap();
    let builder = GSamNetworkBuilder::from_url(&url).unwrap();
    assert_eq!(builder.sam.as_deref(), Some("SAM1"));
    assert_eq!(builder.sam_model.as_deref(), Some("vit_b"));
    assert_eq!(builder.area_threshold, 300);
    assert_eq!(builder.dedup_iou, 0.6);

    let url = Url::parse("gsam://?area_threshold=-1").unwrap();
    assert!(matches!(
      GSamNetworkBuilder::from_url(&url),
      Err(GSamError::Configuration(_))
    ));
  }
}
