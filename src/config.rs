// 该文件是 Dushu （读数） 项目的一部分。
// src/config.rs - 运行配置
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

use std::path::PathBuf;

use thiserror::Error;

use crate::args::Args;
use crate::classifier::ClassifierKind;
use crate::region::{self, Point};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读数位数必须大于 0")]
  NoDigits,
  #[error("裁剪尺寸必须大于 0, 实际为 {0}x{1}")]
  BadCropSize(u32, u32),
  #[error("采样间隔必须大于 0 秒")]
  BadInterval,
  #[error("每样本帧数必须大于 0")]
  NoFramesPerSample,
  #[error("置信度接受阈值必须在 0.0 与 1.0 之间, 实际为 {0}")]
  BadAcceptThreshold(f32),
  #[error("角点无效: {0}")]
  BadClickPoints(#[from] region::GeometryError),
  #[error("角点格式错误: {0:?}, 应为 x,y")]
  BadPointFormat(String),
  #[error("未知的分类器后端: {0:?}, 支持 template 与 cnn")]
  BadClassifierKind(String),
}

/// 一次运行的完整配置, 创建后只读
#[derive(Debug, Clone)]
pub struct SessionConfig {
  /// 输入来源(视频文件路径、/dev/videoN 或摄像头编号)
  pub source: String,
  /// 用户标定的读数区域角点, 顺序任意
  pub click_points: Vec<Point>,
  /// 采样间隔(秒)
  pub sampling_secs: f64,
  /// 每个采样点连续取帧数(多帧投票)
  pub frames_per_sample: u32,
  /// 读数位数
  pub num_digits: u32,
  /// 每位数字的裁剪宽度(像素)
  pub crop_width: u32,
  /// 裁剪高度(像素)
  pub crop_height: u32,
  /// 二值化阈值; None 时用大津法自动选取
  pub binarize_threshold: Option<u8>,
  /// 分类器后端
  pub classifier: ClassifierKind,
  /// CNN 模型文件路径
  pub model_path: Option<PathBuf>,
  /// 置信度接受阈值
  pub accept_threshold: f32,
  /// 最大采样数; None 时直到源结束
  pub max_samples: Option<u64>,
}

impl SessionConfig {
  /// 从命令行参数构造并校验
  pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
    let click_points = args
      .points
      .iter()
      .map(|text| parse_point(text))
      .collect::<Result<Vec<_>, _>>()?;

    let config = Self {
      source: args.input.clone(),
      click_points,
      sampling_secs: args.sampling_sec,
      frames_per_sample: args.frames_per_sample,
      num_digits: args.num_digits,
      crop_width: args.crop_width,
      crop_height: args.crop_height,
      binarize_threshold: args.threshold,
      classifier: parse_classifier_kind(&args.classifier)?,
      model_path: args.model.clone(),
      accept_threshold: args.accept_threshold,
      max_samples: if args.max_samples == 0 {
        None
      } else {
        Some(args.max_samples)
      },
    };
    config.validate()?;
    Ok(config)
  }

  /// 校验各项参数; 配置错误必须在运行开始之前暴露
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.num_digits == 0 {
      return Err(ConfigError::NoDigits);
    }
    if self.crop_width == 0 || self.crop_height == 0 {
      return Err(ConfigError::BadCropSize(self.crop_width, self.crop_height));
    }
    if !(self.sampling_secs > 0.0) {
      return Err(ConfigError::BadInterval);
    }
    if self.frames_per_sample == 0 {
      return Err(ConfigError::NoFramesPerSample);
    }
    if !(0.0..=1.0).contains(&self.accept_threshold) {
      return Err(ConfigError::BadAcceptThreshold(self.accept_threshold));
    }
    region::order_points(&self.click_points)?;
    Ok(())
  }
}

/// 解析 "x,y" 形式的角点
pub fn parse_point(text: &str) -> Result<Point, ConfigError> {
  let bad = || ConfigError::BadPointFormat(text.to_string());
  let (x, y) = text.split_once(',').ok_or_else(bad)?;
  let x = x.trim().parse::<i32>().map_err(|_| bad())?;
  let y = y.trim().parse::<i32>().map_err(|_| bad())?;
  Ok((x, y))
}

fn parse_classifier_kind(text: &str) -> Result<ClassifierKind, ConfigError> {
  match text {
    "template" => Ok(ClassifierKind::Template),
    "cnn" => Ok(ClassifierKind::Cnn),
    other => Err(ConfigError::BadClassifierKind(other.to_string())),
  }
}
