// 该文件是 GSamNet 项目的一部分。
// src/hub.rs - 模型仓库文件获取
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path};

#[derive(Error, Debug)]
pub enum HubError {
  #[error("在 {root} 中找不到 {repo_id}/{filename}")]
  NotFound {
    root: String,
    repo_id: String,
    filename: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 (仓库, 文件名) 获取模型配置与权重文件的本地路径
pub trait ModelHub {
  fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf, HubError>;
}

impl<H: ModelHub + ?Sized> ModelHub for &H {
  fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf, HubError> {
    (**self).fetch(repo_id, filename)
  }
}

/// 以本地目录作为模型仓库。
///
/// 依次查找 `<root>/<repo_id>/<filename>` 与 Hugging Face 缓存布局
/// `<root>/models--<org>--<name>/snapshots/<rev>/<filename>`。
#[derive(Debug, Clone)]
pub struct LocalHub {
  root: PathBuf,
}

impl FromUrlWithScheme for LocalHub {
  const SCHEME: &'static str = "hub";
}

impl FromUrl for LocalHub {
  type Error = HubError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(HubError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(Self::new(decoded_path(url)))
  }
}

fn usable(path: &Path) -> bool {
  path
    .metadata()
    .map(|meta| meta.is_file() && meta.len() > 0)
    .unwrap_or(false)
}

impl LocalHub {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn cached_snapshot(&self, repo_id: &str, filename: &str) -> Result<Option<PathBuf>, HubError> {
    let snapshots = self
      .root
      .join(format!("models--{}", repo_id.replace('/', "--")))
      .join("snapshots");
    if !snapshots.is_dir() {
      return Ok(None);
    }

    let mut revisions = std::fs::read_dir(&snapshots)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .collect::<Vec<_>>();
    revisions.sort();

    Ok(
      revisions
        .into_iter()
        .map(|rev| rev.join(filename))
        .find(|path| usable(path)),
    )
  }
}

impl ModelHub for LocalHub {
  fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf, HubError> {
    let direct = self.root.join(repo_id).join(filename);
    if usable(&direct) {
      debug!("命中模型文件: {}", direct.display());
      return Ok(direct);
    }

    if let Some(path) = self.cached_snapshot(repo_id, filename)? {
      debug!("命中缓存快照: {}", path.display());
      return Ok(path);
    }

    error!("找不到模型文件 {}/{}", repo_id, filename);
    Err(HubError::NotFound {
      root: self.root.display().to_string(),
      repo_id: repo_id.to_string(),
      filename: filename.to_string(),
    })
  }
}
