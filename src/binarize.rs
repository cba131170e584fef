// 该文件是 Dushu （读数） 项目的一部分。
// src/binarize.rs - 读数区域二值化
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

use image::{GrayImage, RgbImage};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use tracing::debug;

/// 彩色图像二值化。`level` 为 None 时用大津法自动选取阈值。
pub fn binarize(image: &RgbImage, level: Option<u8>) -> GrayImage {
  let gray = image::imageops::grayscale(image);
  binarize_gray(&gray, level)
}

/// 灰度图像二值化。
///
/// 大津法在前景/背景灰度分布之间最大化类间方差来选取全局阈值;
/// 给定固定阈值时直接按该值二值化, 同一输入必然得到同一输出。
pub fn binarize_gray(gray: &GrayImage, level: Option<u8>) -> GrayImage {
  let level = match level {
    Some(level) => level,
    None => {
      let level = otsu_level(gray);
      debug!("大津法自动阈值: {}", level);
      level
    }
  };
  threshold(gray, level, ThresholdType::Binary)
}
