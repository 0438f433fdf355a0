// 该文件是 GSamNet 项目的一部分。
// src/model/catalog.rs - 模型族与权重清单
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
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::GSamError;

/// 模型仓库中的一个文件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubFile {
  pub repo_id: &'static str,
  pub filename: &'static str,
}

const GROUNDING_DINO_REPO: &str = "ShilongLiu/GroundingDINO";

pub const GROUNDING_DINO_CONFIG: HubFile = HubFile {
  repo_id: GROUNDING_DINO_REPO,
  filename: "GroundingDINO_SwinT_OGC.cfg.py",
};

pub const GROUNDING_DINO_CHECKPOINT: HubFile = HubFile {
  repo_id: GROUNDING_DINO_REPO,
  filename: "groundingdino_swint_ogc.pth",
};

const SAM1_REPO: &str = "ybelkada/segment-anything";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamFamily {
  Sam1,
  Sam2,
}

impl SamFamily {
  pub const NAMES: [&'static str; 2] = ["SAM1", "SAM2"];

  /// 解析子模型名称，缺省时回退到该模型族的默认值
  pub fn resolve(self, name: Option<&str>) -> Result<SamModel, GSamError> {
    match self {
      SamFamily::Sam1 => {
        info!("选择 SAM1: 通用的图像目标分割模型");
        let variant = match name {
          Some(name) => name.parse()?,
          None => {
            warn!("未指定 SAM1 模型，默认使用 '{}'", Sam1Variant::DEFAULT);
            Sam1Variant::DEFAULT
          }
        };
        Ok(SamModel::Sam1(variant))
      }
      SamFamily::Sam2 => {
        info!("选择 SAM2: 面向图像与视频优化的分割模型");
        let variant = match name {
          Some(name) => name.parse()?,
          None => {
            warn!("未指定 SAM2 模型，默认使用 '{}'", Sam2Variant::DEFAULT);
            Sam2Variant::DEFAULT
          }
        };
        Ok(SamModel::Sam2(variant))
      }
    }
  }
}

impl FromStr for SamFamily {
  type Err = GSamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "SAM1" => Ok(SamFamily::Sam1),
      "SAM2" => Ok(SamFamily::Sam2),
      other => Err(GSamError::configuration(format!(
        "SAM 模型族 '{}' 不存在, 可选: {:?}",
        other,
        SamFamily::NAMES
      ))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sam1Variant {
  VitH,
  VitL,
  VitB,
}

impl Sam1Variant {
  pub const ALL: [Sam1Variant; 3] = [Sam1Variant::VitH, Sam1Variant::VitL, Sam1Variant::VitB];
  pub const DEFAULT: Sam1Variant = Sam1Variant::VitH;

  pub fn name(&self) -> &'static str {
    match self {
      Sam1Variant::VitH => "vit_h",
      Sam1Variant::VitL => "vit_l",
      Sam1Variant::VitB => "vit_b",
    }
  }

  pub fn checkpoint(&self) -> HubFile {
    let filename = match self {
      Sam1Variant::VitH => "checkpoints/sam_vit_h_4b8939.pth",
      Sam1Variant::VitL => "checkpoints/sam_vit_l_0b3195.pth",
      Sam1Variant::VitB => "checkpoints/sam_vit_b_01ec64.pth",
    };
    HubFile {
      repo_id: SAM1_REPO,
      filename,
    }
  }
}

impl fmt::Display for Sam1Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Sam1Variant {
  type Err = GSamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Sam1Variant::ALL
      .into_iter()
      .find(|v| v.name() == s)
      .ok_or_else(|| {
        GSamError::configuration(format!(
          "SAM1 模型 '{}' 不存在, 可选: {:?}",
          s,
          Sam1Variant::ALL.map(|v| v.name())
        ))
      })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sam2Variant {
  Tiny,
  Small,
  BasePlus,
  Large,
}

impl Sam2Variant {
  pub const ALL: [Sam2Variant; 4] = [
    Sam2Variant::Tiny,
    Sam2Variant::Small,
    Sam2Variant::BasePlus,
    Sam2Variant::Large,
  ];
  pub const DEFAULT: Sam2Variant = Sam2Variant::Large;

  pub fn name(&self) -> &'static str {
    match self {
      Sam2Variant::Tiny => "tiny",
      Sam2Variant::Small => "small",
      Sam2Variant::BasePlus => "base_plus",
      Sam2Variant::Large => "large",
    }
  }
}

impl fmt::Display for Sam2Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Sam2Variant {
  type Err = GSamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Sam2Variant::ALL
      .into_iter()
      .find(|v| v.name() == s)
      .ok_or_else(|| {
        GSamError::configuration(format!(
          "SAM2 模型 '{}' 不存在, 可选: {:?}",
          s,
          Sam2Variant::ALL.map(|v| v.name())
        ))
      })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamModel {
  Sam1(Sam1Variant),
  Sam2(Sam2Variant),
}

impl fmt::Display for SamModel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SamModel::Sam1(v) => write!(f, "SAM1/{}", v),
      SamModel::Sam2(v) => write!(f, "SAM2/{}", v),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_family_lists_valid_choices() {
    let err = "SAM3".parse::<SamFamily>().unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, GSamError::Configuration(_)));
    assert!(msg.contains("SAM1") && msg.contains("SAM2"), "{}", msg);
  }

  #[test]
  fn missing_name_falls_back_to_default() {
    assert_eq!(
      SamFamily::Sam1.resolve(None).unwrap(),
      SamModel::Sam1(Sam1Variant::VitH)
    );
    assert_eq!(
      SamFamily::Sam2.resolve(None).unwrap(),
      SamModel::Sam2(Sam2Variant::Large)
    );
  }

  #[test]
  fn variant_names_are_checked_per_family() {
    assert_eq!(
      SamFamily::Sam1.resolve(Some("vit_b")).unwrap(),
      SamModel::Sam1(Sam1Variant::VitB)
    );
    let err = SamFamily::Sam1.resolve(Some("large")).unwrap_err();
    assert!(err.to_string().contains("vit_h"));
    assert!(SamFamily::Sam2.resolve(Some("vit_h")).is_err());
  }

  #[test]
  fn sam1_checkpoints_live_in_one_repo() {
    for variant in Sam1Variant::ALL {
      let file = variant.checkpoint();
      assert_eq!(file.repo_id, SAM1_REPO);
      assert!(file.filename.contains(variant.name()));
    }
  }
}
