// 该文件是 Dushu （读数） 项目的一部分。
// src/segment.rs - 数字单元切分与调试叠加
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

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use thiserror::Error;

use crate::region::Point;

const MARKER_RADIUS: i32 = 5;
const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Error, Debug)]
pub enum SegmentError {
  #[error("区域宽度 {width} 与 {num_digits} 位 × 每位 {cell_width} 像素不符")]
  DimensionMismatch {
    width: u32,
    num_digits: u32,
    cell_width: u32,
  },
}

/// 把校正后的读数区域切成 N 个等宽的数字单元。
///
/// 产出顺序为从左到右, 即从最高位到最低位。
pub fn split_digits(
  region: &GrayImage,
  num_digits: u32,
  cell_width: u32,
) -> Result<Vec<GrayImage>, SegmentError> {
  let (width, height) = region.dimensions();
  if num_digits == 0 || width != num_digits * cell_width {
    return Err(SegmentError::DimensionMismatch {
      width,
      num_digits,
      cell_width,
    });
  }

  let mut cells = Vec::with_capacity(num_digits as usize);
  for i in 0..num_digits {
    let cell = image::imageops::crop_imm(region, i * cell_width, 0, cell_width, height).to_image();
    cells.push(cell);
  }
  Ok(cells)
}

/// 在源帧上圈出用户标定的角点(调试用)。
pub fn draw_region_markers(frame: &RgbImage, points: &[Point]) -> RgbImage {
  let mut out = frame.clone();
  for &(x, y) in points {
    draw_hollow_circle_mut(&mut out, (x, y), MARKER_RADIUS, MARKER_COLOR);
  }
  out
}

/// 在二值化区域上画出数字分隔线(调试用)。
pub fn draw_digit_grid(region: &GrayImage, num_digits: u32) -> RgbImage {
  let (width, height) = region.dimensions();
  let mut out = DynamicImage::ImageLuma8(region.clone()).to_rgb8();
  if num_digits == 0 {
    return out;
  }
  let cell_width = width / num_digits;
  for i in 1..num_digits {
    let x = (i * cell_width) as f32;
    draw_line_segment_mut(&mut out, (x, 0.0), (x, height as f32), MARKER_COLOR);
  }
  out
}
