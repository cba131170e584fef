// 该文件是 Dushu （读数） 项目的一部分。
// src/bin/preview.rs - 二值化阈值预览工具
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

// 正式运行前的标定辅助: 取输入源的第一帧, 按角点透视校正并二值化,
// 把角点标记图、二值化图和数字分隔网格写成 PNG, 便于调整阈值与角点。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use dushu::binarize;
use dushu::config::parse_point;
use dushu::input::FrameSampler;
use dushu::region::RegionExtractor;
use dushu::segment;

/// Dushu 读数区域二值化预览
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct PreviewArgs {
  /// 输入来源（视频文件路径、V4L2 设备路径或摄像头编号）
  #[arg(long, value_name = "SOURCE")]
  input: String,

  /// 读数区域的一个角点, 形如 x,y; 需给出 4 次, 顺序任意
  #[arg(long = "point", value_name = "X,Y", action = clap::ArgAction::Append)]
  points: Vec<String>,

  /// 读数位数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  num_digits: u32,

  /// 每位数字的裁剪宽度(像素)
  #[arg(long, default_value = "100", value_name = "PIXELS")]
  crop_width: u32,

  /// 裁剪高度(像素)
  #[arg(long, default_value = "100", value_name = "PIXELS")]
  crop_height: u32,

  /// 二值化阈值 (0 - 255); 省略时用大津法自动选取
  #[arg(long, value_name = "LEVEL")]
  threshold: Option<u8>,

  /// 预览图输出目录
  #[arg(long, default_value = "preview", value_name = "DIR")]
  out_dir: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt().init();

  let args = PreviewArgs::parse();
  let points = args
    .points
    .iter()
    .map(|text| parse_point(text))
    .collect::<Result<Vec<_>, _>>()?;

  let sampler = FrameSampler::open(&args.input)?;
  let frame = sampler
    .first_frame(1.0)?
    .context("输入源没有任何帧")?;
  info!("首帧已读取: {}x{}", frame.image.width(), frame.image.height());

  std::fs::create_dir_all(&args.out_dir)?;

  let marked = segment::draw_region_markers(&frame.image, &points);
  let marked_path = args.out_dir.join("frame.png");
  marked.save(&marked_path)?;

  let extractor = RegionExtractor::new(args.crop_width, args.crop_height, args.num_digits);
  let region = extractor
    .extract(&frame.image, &points)?
    .context("角点构成的四边形退化, 无法透视校正")?;

  let binary = binarize::binarize(&region, args.threshold);
  let binary_path = args.out_dir.join("binary.png");
  binary.save(&binary_path)?;

  let grid = segment::draw_digit_grid(&binary, args.num_digits);
  let grid_path = args.out_dir.join("grid.png");
  grid.save(&grid_path)?;

  info!(
    "预览图已写入: {}, {}, {}",
    marked_path.display(),
    binary_path.display(),
    grid_path.display()
  );
  Ok(())
}
