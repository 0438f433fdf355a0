// 该文件是 GSamNet 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::PathBuf;
use std::sync::{
  Mutex, PoisonError,
  atomic::{AtomicU32, Ordering},
};

use chrono::{Datelike, Utc};
use image::RgbImage;
use rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  error::ShapeError,
  output::{
    Render, RunRecord,
    draw::{Draw, FontError, MaskColor, load_font},
  },
  pipeline::RunOutput,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {0} 无效: {1}")]
  InvalidQuery(String, String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("形状错误: {0}")]
  ShapeError(#[from] ShapeError),
  #[error("字体错误: {0}")]
  FontError(#[from] FontError),
}

/// 按日期分目录保存原图、掩码、标注图与 JSON 记录
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  /// 整个输出共用一个随机数发生器，随机颜色逐条记录变化且可由种子复现
  rng: Mutex<StdRng>,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut output = Self::new(decoded_path(uri));
    let mut draw = Draw::default();
    for (k, v) in uri.query_pairs() {
      match k.as_ref() {
        "seed" => {
          let seed = v.parse().map_err(|_| {
            DirectoryRecordOutputError::InvalidQuery(k.to_string(), v.to_string())
          })?;
          output = output.with_seed(seed);
        }
        "always" => output.always = true,
        "random_color" => draw = draw.with_mask_color(MaskColor::Random),
        "font" => draw = draw.with_font(load_font(&*v)?),
        _ => {}
      }
    }
    Ok(output.with_draw(draw))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      draw: Draw::default(),
      rng: Mutex::new(StdRng::seed_from_u64(0)),
      frame_counter: AtomicU32::new(0),
      always: false,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = Mutex::new(StdRng::seed_from_u64(seed));
    self
  }

  fn frame_id(&self) -> u32 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn day_directory(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;
    Ok(directory)
  }

  /// 保存一条结果并返回 JSON 记录的路径；
  /// 没有检测到目标且未设置 `always` 时不落盘
  pub fn render_named(
    &self,
    id: &str,
    image: &RgbImage,
    output: &RunOutput,
  ) -> Result<Option<PathBuf>, DirectoryRecordOutputError> {
    if !self.always && output.detections.is_empty() {
      debug!("'{}' 没有检测结果, 跳过记录", id);
      return Ok(None);
    }

    let directory = self.day_directory()?;
    let stem = format!("{}-{:04X}", id, self.frame_id());
    let image_file = format!("{}.png", stem);
    let mask_file = format!("{}-mask.png", stem);

    image.save(directory.join(&image_file))?;
    output.mask.to_gray_image().save(directory.join(&mask_file))?;

    let annotated = {
      let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
      self.draw.annotate(image, output, &mut *rng)?
    };
    annotated.save(directory.join(format!("{}-annotated.png", stem)))?;

    let (width, height) = image.dimensions();
    let record = RunRecord {
      id: id.to_string(),
      width,
      height,
      image_file,
      mask_file,
      detections: output.detections.clone().to_absolute(width, height),
    };
    let path = directory.join(format!("{}.json", stem));
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
    info!("已记录 {}", path.display());
    Ok(Some(path))
  }
}

impl Render<RgbImage, RunOutput> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &RunOutput) -> Result<(), Self::Error> {
    let id = Utc::now().format("%H-%M-%S").to_string();
    self.render_named(&id, frame, result)?;
    Ok(())
  }
}
