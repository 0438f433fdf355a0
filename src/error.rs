// 该文件是 GSamNet 项目的一部分。
// src/error.rs - 错误定义
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

use thiserror::Error;

use crate::hub::HubError;

/// 外部模型（检测器、分割器、加载器）返回的错误
pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 形状不合法：边界框、帧缓冲、掩码或并行序列长度不一致
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
  #[error("边界框需要 4 个数值, 实际为 {0}")]
  BoxLength(usize),
  #[error("缓冲区长度不匹配: 期望 {expected}, 实际 {actual}")]
  BufferLength { expected: usize, actual: usize },
  #[error("掩码尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  MaskSize {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("并行序列长度不一致: {0}")]
  Misaligned(String),
}

#[derive(Error, Debug)]
pub enum GSamError {
  #[error("配置错误: {0}")]
  Configuration(String),
  #[error("下载 {repo_id}/{filename} 失败: {source}")]
  Download {
    repo_id: String,
    filename: String,
    #[source]
    source: HubError,
  },
  #[error("模型 {model} 加载失败: {source}")]
  ModelLoad {
    model: String,
    #[source]
    source: ModelError,
  },
  #[error("{0} 暂不支持")]
  NotYetSupported(String),
  #[error("point_coords 与 point_labels 必须同时提供或同时省略")]
  PromptPairing,
  #[error("长度不匹配: {what} 长度为 {actual}, 图像数量为 {expected}")]
  LengthMismatch {
    what: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("不支持的推理模式 '{0}', 可选: box_predict")]
  UnsupportedMode(String),
  #[error("不支持的数据模式 '{0}', 可选: batch")]
  UnsupportedDataMode(String),
  #[error("形状错误: {0}")]
  Shape(#[from] ShapeError),
  #[error("检测器错误: {0}")]
  Detector(#[source] ModelError),
  #[error("分割器错误: {0}")]
  Segmenter(#[source] ModelError),
  #[error("第 {index} 张图像处理失败: {source}")]
  Batch {
    index: usize,
    #[source]
    source: Box<GSamError>,
  },
}

impl GSamError {
  pub(crate) fn at(index: usize) -> impl FnOnce(GSamError) -> GSamError {
    move |source| GSamError::Batch {
      index,
      source: Box::new(source),
    }
  }

  pub(crate) fn configuration(msg: impl Into<String>) -> Self {
    GSamError::Configuration(msg.into())
  }
}

impl From<std::convert::Infallible> for GSamError {
  fn from(e: std::convert::Infallible) -> Self {
    match e {}
  }
}
