// 该文件是 Dushu （读数） 项目的一部分。
// src/input/video_source.rs - 视频文件输入源
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

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{Pixel, input};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use image::RgbImage;
use tracing::{debug, warn};

use super::{Frame, InputSource, InputSourceType, SourceError};

/// 元数据中帧率缺失或非法时的替代值
const FALLBACK_FPS: f64 = 30.0;

/// 视频文件输入源
///
/// 顺序解码视频流并把每一帧换算为 RGB; 抽帧逻辑在采样器一层。
pub struct VideoSource {
  input_context: ffmpeg::format::context::Input,
  video_stream_index: usize,
  decoder: ffmpeg::decoder::Video,
  scaler: ScalingContext,
  frame_index: u64,
  width: u32,
  height: u32,
  fps: f64,
  time_base: f64,
  eof_sent: bool,
  finished: bool,
}

impl VideoSource {
  /// 打开视频文件并读取流元数据
  pub fn new(path: &str) -> Result<Self, SourceError> {
    let unavailable = |reason: String| SourceError::Unavailable {
      input: path.to_string(),
      reason,
    };

    ffmpeg::init().map_err(|e| unavailable(format!("FFmpeg 初始化失败: {}", e)))?;

    let input_context = input(&path).map_err(|e| unavailable(e.to_string()))?;

    let video_stream = input_context
      .streams()
      .best(Type::Video)
      .ok_or_else(|| unavailable("找不到视频流".to_string()))?;
    let video_stream_index = video_stream.index();

    let rate = video_stream.avg_frame_rate();
    let fps = if rate.denominator() > 0 && rate.numerator() > 0 {
      rate.numerator() as f64 / rate.denominator() as f64
    } else {
      warn!("视频元数据缺少帧率, 使用替代值 {} fps", FALLBACK_FPS);
      FALLBACK_FPS
    };

    let time_base = video_stream.time_base();
    let time_base = if time_base.denominator() > 0 {
      time_base.numerator() as f64 / time_base.denominator() as f64
    } else {
      0.0
    };

    let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
      .map_err(|e| unavailable(e.to_string()))?
      .decoder()
      .video()
      .map_err(|e| unavailable(e.to_string()))?;

    let width = decoder.width();
    let height = decoder.height();
    debug!("视频已打开: {}x{} @ {:.2} fps", width, height, fps);

    let scaler = ScalingContext::get(
      decoder.format(),
      width,
      height,
      Pixel::RGB24,
      width,
      height,
      Flags::BILINEAR,
    )
    .map_err(|e| unavailable(e.to_string()))?;

    Ok(Self {
      input_context,
      video_stream_index,
      decoder,
      scaler,
      frame_index: 0,
      width,
      height,
      fps,
      time_base,
      eof_sent: false,
      finished: false,
    })
  }

  /// 解码下一帧; 源结束时返回 Ok(None)
  fn decode_next(&mut self) -> Result<Option<Video>, SourceError> {
    loop {
      let mut decoded = Video::empty();
      if self.decoder.receive_frame(&mut decoded).is_ok() {
        return Ok(Some(decoded));
      }
      if self.eof_sent {
        return Ok(None);
      }

      match self.input_context.packets().next() {
        Some((stream, packet)) => {
          if stream.index() != self.video_stream_index {
            continue;
          }
          self
            .decoder
            .send_packet(&packet)
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        }
        None => {
          // 数据包读尽, 冲刷解码器内剩余帧
          self
            .decoder
            .send_eof()
            .map_err(|e| SourceError::Decode(e.to_string()))?;
          self.eof_sent = true;
        }
      }
    }
  }

  fn to_rgb(&mut self, decoded: &Video) -> Result<RgbImage, SourceError> {
    let mut rgb_frame = Video::empty();
    self
      .scaler
      .run(decoded, &mut rgb_frame)
      .map_err(|e| SourceError::Decode(e.to_string()))?;

    // 行数据可能按步长对齐, 逐行拷贝有效部分
    let data = rgb_frame.data(0);
    let stride = rgb_frame.stride(0);
    let width = self.width as usize;
    let height = self.height as usize;
    let mut image_data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
      let row_start = y * stride;
      image_data.extend_from_slice(&data[row_start..row_start + width * 3]);
    }

    RgbImage::from_raw(self.width, self.height, image_data)
      .ok_or_else(|| SourceError::Decode("无法创建 RGB 图像".to_string()))
  }
}

impl Iterator for VideoSource {
  type Item = Result<Frame, SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let decoded = match self.decode_next() {
      Ok(Some(decoded)) => decoded,
      Ok(None) => {
        self.finished = true;
        return None;
      }
      Err(e) => {
        self.finished = true;
        return Some(Err(e));
      }
    };

    let image = match self.to_rgb(&decoded) {
      Ok(image) => image,
      Err(e) => {
        self.finished = true;
        return Some(Err(e));
      }
    };

    let timestamp_ms = decoded
      .timestamp()
      .map_or(0, |ts| (ts as f64 * self.time_base * 1000.0) as u64);

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms,
    };
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for VideoSource {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Video
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> f64 {
    self.fps
  }
}
