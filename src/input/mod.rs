// 该文件是 Dushu （读数） 项目的一部分。
// src/input/mod.rs - 输入源模块
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

mod sampler;
mod v4l2_source;
mod video_source;

pub use sampler::{FrameSampler, SampleWindow, WindowIter};
pub use v4l2_source::V4l2Source;
pub use video_source::VideoSource;

use image::RgbImage;
use thiserror::Error;

/// 帧数据
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳(毫秒)
  pub timestamp_ms: u64,
}

/// 输入源类型
pub enum InputSourceType {
  /// 视频文件
  Video,
  /// V4L2 摄像头
  V4l2,
}

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("无法打开输入源 {input}: {reason}")]
  Unavailable { input: String, reason: String },
  #[error("解码失败: {0}")]
  Decode(String),
}

/// 输入源 trait
///
/// 输入源是一个帧迭代器; 源正常结束时迭代终止, 不算错误。
/// 句柄随输入源一起释放。
pub trait InputSource: Iterator<Item = Result<Frame, SourceError>> + Send {
  /// 获取输入源类型
  fn source_type(&self) -> InputSourceType;

  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 获取帧率
  fn fps(&self) -> f64;
}

/// 从视频文件路径或摄像头编号创建输入源
pub fn create_input_source(source: &str) -> Result<Box<dyn InputSource>, SourceError> {
  // 检查是否是 V4L2 设备
  if source.starts_with("/dev/video") {
    return Ok(Box::new(V4l2Source::new(source)?));
  }

  // 纯数字视为摄像头编号
  if let Ok(index) = source.parse::<u32>() {
    return Ok(Box::new(V4l2Source::new(&format!("/dev/video{}", index))?));
  }

  // 否则视为视频文件
  Ok(Box::new(VideoSource::new(source)?))
}
