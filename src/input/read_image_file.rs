// 该文件是 GSamNet 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path, mask::Mask, pipeline::ImageGroup};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI scheme mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image found in {0}")]
  Empty(String),
}

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 单张图片或一个目录下的全部图片。
///
/// 可选的 `masks` 查询参数指向保存真值掩码的目录，
/// 掩码文件以图片的文件名（不含扩展名）加 `.png` 命名。
pub struct ImageFileInput {
  entries: VecDeque<PathBuf>,
  masks: Option<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let input = Self::open(decoded_path(url))?;
    let masks = url
      .query_pairs()
      .find(|(k, _)| k == "masks")
      .map(|(_, v)| PathBuf::from(v.into_owned()));

    Ok(match masks {
      Some(dir) => input.with_masks(dir),
      None => input,
    })
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

fn stem(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let entries = if path.is_dir() {
      let mut entries = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect::<Vec<_>>();
      entries.sort();
      entries
    } else {
      vec![path.to_path_buf()]
    };

    if entries.is_empty() {
      return Err(ImageFileInputError::Empty(path.display().to_string()));
    }
    debug!("找到 {} 张图片: {}", entries.len(), path.display());

    Ok(Self {
      entries: entries.into(),
      masks: None,
    })
  }

  pub fn with_masks(mut self, directory: impl Into<PathBuf>) -> Self {
    self.masks = Some(directory.into());
    self
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn load(path: &Path) -> Result<RgbImage, ImageFileInputError> {
    Ok(ImageReader::open(path)?.decode()?.to_rgb8())
  }

  fn load_mask(&self, id: &str) -> Result<Option<Mask>, ImageFileInputError> {
    let Some(directory) = &self.masks else {
      return Ok(None);
    };
    let path = directory.join(format!("{}.png", id));
    if !path.is_file() {
      warn!("缺少真值掩码: {}", path.display());
      return Ok(None);
    }
    let gray = ImageReader::open(&path)?.decode()?.to_luma8();
    Ok(Some(Mask::from_gray_image(&gray)))
  }

  /// 读取全部图片，组成一组语料
  pub fn into_group(mut self) -> Result<ImageGroup, ImageFileInputError> {
    let mut group = ImageGroup::default();
    while let Some(path) = self.entries.pop_front() {
      let id = stem(&path);
      group.images.push(Self::load(&path)?);
      group.masks.push(self.load_mask(&id)?);
      group.ids.push(id);
    }
    Ok(group)
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<(String, RgbImage), ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self
      .entries
      .pop_front()
      .map(|path| Self::load(&path).map(|image| (stem(&path), image)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Luma, Rgb};

  #[test]
  fn directory_input_reads_sorted_images_with_masks() {
    let dir = tempfile::tempdir().unwrap();
    let masks = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(4, 3, Rgb([4, 5, 6]))
      .save(dir.path().join("a.png"))
      .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
    image::GrayImage::from_fn(4, 3, |x, _| Luma([if x < 2 { 255 } else { 0 }]))
      .save(masks.path().join("a.png"))
      .unwrap();

    let url = Url::parse(&format!(
      "image://{}?masks={}",
      dir.path().display(),
      masks.path().display()
    ))
    .unwrap();
    let group = ImageFileInput::from_url(&url).unwrap().into_group().unwrap();

    assert_eq!(group.ids, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(group.images[0].get_pixel(0, 0), &Rgb([4, 5, 6]));
    assert_eq!(group.masks[0].as_ref().map(|m| m.pixel_count()), Some(6));
    assert!(group.masks[1].is_none());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("video:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
