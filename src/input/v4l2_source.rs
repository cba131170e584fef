// 该文件是 Dushu （读数） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
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

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use tracing::debug;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{Frame, InputSource, InputSourceType, SourceError};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;
/// 摄像头无法上报帧率时的替代值
const FALLBACK_FPS: f64 = 30.0;

/// V4L2 摄像头输入源
///
/// v4l 的 Stream 持有对 Device 的引用, 因此用 Pin<Box> 固定
/// Device 的内存地址, 再让 Stream 与其同生共死。
pub struct V4l2Source {
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  frame_index: u64,
  width: u32,
  height: u32,
  fps: f64,
  start_time: Instant,
}

impl V4l2Source {
  /// 打开摄像头设备并协商采集格式
  pub fn new(device_path: &str) -> Result<Self, SourceError> {
    let unavailable = |reason: String| SourceError::Unavailable {
      input: device_path.to_string(),
      reason,
    };

    let device =
      Box::pin(Device::with_path(device_path).map_err(|e| unavailable(e.to_string()))?);

    let mut format = device.format().map_err(|e| unavailable(e.to_string()))?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(|e| unavailable(e.to_string()))?;

    // 驱动可上报帧间隔时按其换算帧率
    let fps = device
      .params()
      .ok()
      .and_then(|params| {
        let interval = params.interval;
        if interval.numerator > 0 {
          Some(interval.denominator as f64 / interval.numerator as f64)
        } else {
          None
        }
      })
      .unwrap_or(FALLBACK_FPS);
    debug!(
      "摄像头已打开: {}x{} {} @ {:.2} fps",
      format.width, format.height, format.fourcc, fps
    );

    let mut source = Self {
      device,
      stream: None,
      frame_index: 0,
      width: format.width,
      height: format.height,
      fps,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动;
    // stream 存放在同一结构体里, 且 Drop 时先于 device 释放。
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)
        .map_err(|e| unavailable(e.to_string()))?
    };
    source.stream = Some(stream);

    Ok(source)
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前释放
    self.stream.take();
  }
}

impl Iterator for V4l2Source {
  type Item = Result<Frame, SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    match stream.next() {
      Ok((buffer, _meta)) => {
        let rgb_data = Self::yuyv_to_rgb(buffer, self.width, self.height);
        let image = match RgbImage::from_raw(self.width, self.height, rgb_data) {
          Some(image) => image,
          None => {
            return Some(Err(SourceError::Decode("无法创建 RGB 图像".to_string())));
          }
        };

        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms: self.start_time.elapsed().as_millis() as u64,
        };
        self.frame_index += 1;
        Some(Ok(frame))
      }
      Err(e) => Some(Err(SourceError::Decode(format!("无法捕获帧: {}", e)))),
    }
  }
}

impl InputSource for V4l2Source {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::V4l2
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
