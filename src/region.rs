// 该文件是 Dushu （读数） 项目的一部分。
// src/region.rs - 读数区域的角点整理与透视校正
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

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use thiserror::Error;
use tracing::debug;

/// 源帧坐标系下的一个角点 (x, y)
pub type Point = (i32, i32);

#[derive(Error, Debug)]
pub enum GeometryError {
  #[error("需要 4 个互不相同的角点, 实际有效点数为 {0}")]
  NotFourPoints(usize),
}

/// 将任意顺序给出的四个角点整理为 [左上, 右上, 右下, 左下]。
///
/// x+y 最小的点是左上, 最大的点是右下; y-x 最小的点是右上, 最大的点是左下。
/// 坐标恰好相等时不再细分(用户取点的整数像素坐标实际上不会出现)。
pub fn order_points(points: &[Point]) -> Result<[Point; 4], GeometryError> {
  let mut distinct: Vec<Point> = Vec::with_capacity(4);
  for p in points {
    if !distinct.contains(p) {
      distinct.push(*p);
    }
  }
  if distinct.len() != 4 {
    return Err(GeometryError::NotFourPoints(distinct.len()));
  }

  let sum = |p: &&Point| p.0 + p.1;
  let diff = |p: &&Point| p.1 - p.0;

  let top_left = *distinct.iter().min_by_key(sum).unwrap();
  let bottom_right = *distinct.iter().max_by_key(sum).unwrap();
  let top_right = *distinct.iter().min_by_key(diff).unwrap();
  let bottom_left = *distinct.iter().max_by_key(diff).unwrap();

  Ok([top_left, top_right, bottom_right, bottom_left])
}

/// 读数区域提取器
///
/// 把用户标定的任意四边形区域透视校正为
/// (每位宽度 × 位数, 高度) 的轴对齐矩形。
pub struct RegionExtractor {
  crop_width: u32,
  crop_height: u32,
  num_digits: u32,
}

impl RegionExtractor {
  pub fn new(crop_width: u32, crop_height: u32, num_digits: u32) -> Self {
    Self {
      crop_width,
      crop_height,
      num_digits,
    }
  }

  /// 校正后区域的目标尺寸
  pub fn target_size(&self) -> (u32, u32) {
    (self.crop_width * self.num_digits, self.crop_height)
  }

  /// 透视校正裁剪。
  ///
  /// 角点顺序任意; 四点构成的四边形退化(共线等)导致变换矩阵奇异时
  /// 返回 `Ok(None)`, 调用方必须检查后再继续。
  pub fn extract(
    &self,
    frame: &RgbImage,
    click_points: &[Point],
  ) -> Result<Option<RgbImage>, GeometryError> {
    let ordered = order_points(click_points)?;
    let (dst_w, dst_h) = self.target_size();

    let src = ordered.map(|(x, y)| (x as f32, y as f32));
    let dst = [
      (0.0, 0.0),
      (dst_w as f32, 0.0),
      (dst_w as f32, dst_h as f32),
      (0.0, dst_h as f32),
    ];

    let projection = match Projection::from_control_points(src, dst) {
      Some(p) => p,
      None => {
        debug!("角点构成的四边形退化, 无法建立透视变换: {:?}", ordered);
        return Ok(None);
      }
    };

    let mut out = RgbImage::new(dst_w, dst_h);
    warp_into(
      frame,
      &projection,
      Interpolation::Bilinear,
      Rgb([0, 0, 0]),
      &mut out,
    );
    Ok(Some(out))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const QUAD: [Point; 4] = [(129, 596), (179, 595), (178, 616), (128, 617)];

  #[test]
  fn orders_clicks_from_any_order() {
    let expected = [(129, 596), (179, 595), (178, 616), (128, 617)];

    // 顺序打乱的几种典型输入
    let shuffled: [[Point; 4]; 4] = [
      [(178, 616), (179, 595), (129, 596), (128, 617)],
      [(128, 617), (178, 616), (179, 595), (129, 596)],
      [(179, 595), (129, 596), (128, 617), (178, 616)],
      [(129, 596), (179, 595), (178, 616), (128, 617)],
    ];
    for points in shuffled {
      assert_eq!(order_points(&points).unwrap(), expected);
    }
  }

  #[test]
  fn ordering_is_permutation_invariant() {
    let base = order_points(&QUAD).unwrap();
    let mut indices = [0usize, 1, 2, 3];
    // 全部 24 种排列
    permutations(&mut indices, 0, &mut |perm| {
      let points: Vec<Point> = perm.iter().map(|&i| QUAD[i]).collect();
      assert_eq!(order_points(&points).unwrap(), base);
    });
  }

  fn permutations(indices: &mut [usize; 4], k: usize, visit: &mut impl FnMut(&[usize; 4])) {
    if k == indices.len() {
      visit(indices);
      return;
    }
    for i in k..indices.len() {
      indices.swap(k, i);
      permutations(indices, k + 1, visit);
      indices.swap(k, i);
    }
  }

  #[test]
  fn rejects_duplicate_points() {
    let points = [(10, 10), (10, 10), (90, 10), (90, 90)];
    assert!(matches!(
      order_points(&points),
      Err(GeometryError::NotFourPoints(3))
    ));
  }

  #[test]
  fn rejects_wrong_point_count() {
    assert!(matches!(
      order_points(&[(0, 0), (1, 1)]),
      Err(GeometryError::NotFourPoints(2))
    ));
  }

  #[test]
  fn extract_yields_exact_target_size() {
    let frame = RgbImage::new(640, 480);
    let extractor = RegionExtractor::new(100, 100, 4);
    let region = extractor.extract(&frame, &QUAD).unwrap().unwrap();
    assert_eq!(region.dimensions(), (400, 100));
  }

  #[test]
  fn degenerate_quad_returns_none_not_panic() {
    let frame = RgbImage::new(640, 480);
    let extractor = RegionExtractor::new(100, 100, 4);
    // 四个互不相同但共线的点
    let collinear = [(0, 0), (10, 10), (20, 20), (30, 30)];
    assert!(extractor.extract(&frame, &collinear).unwrap().is_none());
  }
}
