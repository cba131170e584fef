// 该文件是 Dushu （读数） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;

/// Dushu 七段数码读数识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源（视频文件路径、V4L2 设备路径或摄像头编号）
  /// 支持格式:
  /// - 视频: *.mp4, *.avi, *.mkv 等
  /// - V4L2: /dev/video0 或摄像头编号 0
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 读数区域的一个角点, 形如 x,y; 需给出 4 次, 顺序任意
  #[arg(long = "point", value_name = "X,Y", action = clap::ArgAction::Append)]
  pub points: Vec<String>,

  /// 采样间隔(秒)
  #[arg(long, default_value = "3.0", value_name = "SECONDS")]
  pub sampling_sec: f64,

  /// 每个采样点连续取帧数(多帧投票)
  #[arg(long, default_value = "10", value_name = "COUNT")]
  pub frames_per_sample: u32,

  /// 读数位数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub num_digits: u32,

  /// 每位数字的裁剪宽度(像素)
  #[arg(long, default_value = "100", value_name = "PIXELS")]
  pub crop_width: u32,

  /// 裁剪高度(像素)
  #[arg(long, default_value = "100", value_name = "PIXELS")]
  pub crop_height: u32,

  /// 二值化阈值 (0 - 255); 省略时用大津法自动选取
  #[arg(long, value_name = "LEVEL")]
  pub threshold: Option<u8>,

  /// 分类器后端: template 或 cnn
  #[arg(long, default_value = "template", value_name = "BACKEND")]
  pub classifier: String,

  /// CNN 模型文件路径(ONNX)
  #[arg(long, value_name = "FILE")]
  pub model: Option<PathBuf>,

  /// 置信度接受阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub accept_threshold: f32,

  /// 最大采样数(0 表示直到源结束)
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_samples: u64,

  /// 识别结果 JSON 输出路径
  #[arg(long, value_name = "FILE")]
  pub export: Option<PathBuf>,
}
