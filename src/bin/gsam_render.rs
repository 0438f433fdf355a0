// 该文件是 GSamNet 项目的一部分。
// src/bin/gsam_render.rs - 重新渲染已保存的推理记录
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

use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::{SeedableRng, rngs::StdRng};
use tracing::info;
use url::Url;

use gsamnet::{
  FromUrl,
  input::ImageFileInput,
  mask::Mask,
  output::{
    RunRecord,
    draw::{DEFAULT_GRID_COLUMNS, DEFAULT_GRID_MAX, Draw, MaskColor, load_font},
  },
  pipeline::RunOutput,
};

/// GSamNet 记录渲染参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 记录文件，可重复给出
  #[arg(long, value_name = "RECORD", required = true)]
  pub record: Vec<PathBuf>,
  /// 替换记录中的原图，如 image:///data/dog.jpg
  #[arg(long, value_name = "SOURCE")]
  pub image: Option<Url>,
  /// 输出图像路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  /// 掩码随机取色的种子
  #[arg(long, default_value_t = 3)]
  pub seed: u64,
  /// 掩码使用随机颜色
  #[arg(long)]
  pub random_color: bool,
  /// 不绘制掩码轮廓
  #[arg(long)]
  pub no_borders: bool,
  /// 标签与网格标题使用的字体文件；不给出时不写文字
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 多条记录时的网格列数
  #[arg(long, default_value_t = DEFAULT_GRID_COLUMNS)]
  pub columns: usize,
  /// 网格中最多显示的图像数
  #[arg(long, default_value_t = DEFAULT_GRID_MAX)]
  pub max: usize,
}

fn load_record(path: &Path) -> Result<(RunRecord, PathBuf)> {
  let text =
    std::fs::read_to_string(path).with_context(|| format!("读取记录 {}", path.display()))?;
  let record: RunRecord = serde_json::from_str(&text)?;
  let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
  Ok((record, base))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("记录: {:?}", args.record);
  info!("输出路径: {}", args.output.display());

  if args.image.is_some() && args.record.len() > 1 {
    bail!("--image 只能与单条记录一起使用");
  }
  let replacement = match &args.image {
    Some(url) => {
      let mut input = ImageFileInput::from_url(url)?;
      match input.next() {
        Some(image) => Some(image?.1),
        None => bail!("{} 中没有图像", url),
      }
    }
    None => None,
  };

  let mask_color = if args.random_color {
    MaskColor::Random
  } else {
    MaskColor::Fixed([30, 144, 255])
  };
  let mut draw = Draw::default()
    .with_mask_color(mask_color)
    .with_borders(!args.no_borders);
  if let Some(path) = &args.font {
    let font = load_font(path).with_context(|| format!("加载字体 {}", path.display()))?;
    draw = draw.with_font(font);
  }
  let mut rng = StdRng::seed_from_u64(args.seed);

  let mut annotated = Vec::with_capacity(args.record.len());
  let mut ids = Vec::with_capacity(args.record.len());
  for path in &args.record {
    let (record, base) = load_record(path)?;
    let image = match &replacement {
      Some(image) => image.clone(),
      None => image::open(base.join(&record.image_file))?.to_rgb8(),
    };
    if image.dimensions() != (record.width, record.height) {
      bail!(
        "图像尺寸 {:?} 与记录 {:?} 不一致",
        image.dimensions(),
        (record.width, record.height)
      );
    }
    let mask = image::open(base.join(&record.mask_file))?.to_luma8();
    let output = RunOutput {
      detections: record.detections,
      mask: Mask::from_gray_image(&mask),
    };
    info!("渲染 '{}': {} 个目标", record.id, output.detections.len());
    annotated.push(draw.annotate(&image, &output, &mut rng)?);
    ids.push(record.id);
  }

  let canvas = match annotated.len() {
    1 => annotated.swap_remove(0),
    _ => draw.grid(&annotated, &ids, args.columns, args.max),
  };
  canvas.save(&args.output)?;
  info!("已保存 {}", args.output.display());

  Ok(())
}
