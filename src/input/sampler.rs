// 该文件是 Dushu （读数） 项目的一部分。
// src/input/sampler.rs - 固定间隔抽帧采样器
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

use tracing::{debug, info};

use super::{Frame, InputSource, SourceError, create_input_source};

/// 一个采样窗口: 同一采样时刻连续读取的若干帧
pub struct SampleWindow {
  /// 窗口内的帧, 供多帧投票使用
  pub frames: Vec<Frame>,
  /// 采样序号(从 0 起)
  pub sample_index: u64,
  /// 采样时刻, 形如 "0:00:03"
  pub timestamp: String,
}

/// 按固定时间间隔从输入源抽帧的采样器
///
/// 打开后独占输入源句柄; 采样迭代器在任何退出路径上
/// (包括提前取消)都随自身释放而关闭输入源。
pub struct FrameSampler {
  source: Box<dyn InputSource>,
  fps: f64,
}

impl FrameSampler {
  /// 打开输入源(视频文件路径、/dev/videoN 或摄像头编号)
  pub fn open(source: &str) -> Result<Self, SourceError> {
    let source = create_input_source(source)?;
    info!(
      "输入源已打开: {}x{} @ {:.2} fps",
      source.width(),
      source.height(),
      source.fps()
    );
    Ok(Self::from_source(source))
  }

  /// 用一个已经打开的输入源构造采样器
  pub fn from_source(source: Box<dyn InputSource>) -> Self {
    let fps = source.fps();
    Self { source, fps }
  }

  /// 输入源帧率
  pub fn fps(&self) -> f64 {
    self.fps
  }

  /// 采样帧步长 = round(帧率 × 采样间隔), 最小为 1
  pub fn stride(fps: f64, interval_secs: f64) -> u64 {
    ((fps * interval_secs).round() as u64).max(1)
  }

  /// 采样序号对应的时间戳, 形如 "0:00:03"
  pub fn timestamp(sample_index: u64, interval_secs: f64) -> String {
    let total = (sample_index as f64 * interval_secs).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60)
  }

  /// 只取第一个采样帧(用于阈值预览和角点标定)
  pub fn first_frame(self, interval_secs: f64) -> Result<Option<Frame>, SourceError> {
    let mut windows = self.sample(interval_secs, 1, Some(1));
    match windows.next() {
      Some(Ok(mut window)) => Ok(if window.frames.is_empty() {
        None
      } else {
        Some(window.frames.remove(0))
      }),
      Some(Err(e)) => Err(e),
      None => Ok(None),
    }
  }

  /// 惰性产出采样窗口序列。
  ///
  /// 每个窗口从第 `采样序号 × 步长` 帧起连续取 `frames_per_sample` 帧;
  /// 源结束时序列正常终止。`max_samples` 为 None 时直到源结束为止。
  pub fn sample(
    self,
    interval_secs: f64,
    frames_per_sample: u32,
    max_samples: Option<u64>,
  ) -> WindowIter {
    let stride = Self::stride(self.fps, interval_secs);
    debug!("采样步长: {} 帧 (间隔 {} 秒)", stride, interval_secs);
    WindowIter {
      source: self.source,
      stride,
      frames_per_sample: frames_per_sample.max(1) as u64,
      interval_secs,
      max_samples,
      cursor: 0,
      next_window_start: 0,
      sample_index: 0,
      done: false,
    }
  }
}

/// 采样窗口迭代器, 持有输入源直到迭代结束或被丢弃
pub struct WindowIter {
  source: Box<dyn InputSource>,
  stride: u64,
  frames_per_sample: u64,
  interval_secs: f64,
  max_samples: Option<u64>,
  /// 已从源消耗的帧数
  cursor: u64,
  /// 下一个窗口的起始帧索引
  next_window_start: u64,
  sample_index: u64,
  done: bool,
}

impl Iterator for WindowIter {
  type Item = Result<SampleWindow, SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    if let Some(max) = self.max_samples {
      if self.sample_index >= max {
        self.done = true;
        return None;
      }
    }

    // 跳过到下一个采样点
    while self.cursor < self.next_window_start {
      match self.source.next() {
        Some(Ok(_)) => self.cursor += 1,
        Some(Err(e)) => {
          self.done = true;
          return Some(Err(e));
        }
        None => {
          self.done = true;
          return None;
        }
      }
    }

    // 连续读取窗口内的帧
    let mut frames = Vec::with_capacity(self.frames_per_sample as usize);
    while (frames.len() as u64) < self.frames_per_sample {
      match self.source.next() {
        Some(Ok(frame)) => {
          self.cursor += 1;
          frames.push(frame);
        }
        Some(Err(e)) => {
          self.done = true;
          return Some(Err(e));
        }
        None => {
          self.done = true;
          break;
        }
      }
    }
    if frames.is_empty() {
      return None;
    }

    let window = SampleWindow {
      frames,
      sample_index: self.sample_index,
      timestamp: FrameSampler::timestamp(self.sample_index, self.interval_secs),
    };
    self.sample_index += 1;
    self.next_window_start += self.stride;
    Some(Ok(window))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::InputSourceType;
  use image::RgbImage;

  /// 产出固定数量黑帧的测试输入源
  struct CountingSource {
    produced: u64,
    total: u64,
    fps: f64,
  }

  impl CountingSource {
    fn new(total: u64, fps: f64) -> Self {
      Self {
        produced: 0,
        total,
        fps,
      }
    }
  }

  impl Iterator for CountingSource {
    type Item = Result<Frame, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
      if self.produced >= self.total {
        return None;
      }
      let frame = Frame {
        image: RgbImage::new(8, 8),
        index: self.produced,
        timestamp_ms: self.produced * 33,
      };
      self.produced += 1;
      Some(Ok(frame))
    }
  }

  impl InputSource for CountingSource {
    fn source_type(&self) -> InputSourceType {
      InputSourceType::Video
    }

    fn width(&self) -> u32 {
      8
    }

    fn height(&self) -> u32 {
      8
    }

    fn fps(&self) -> f64 {
      self.fps
    }
  }

  fn sampler(total: u64, fps: f64) -> FrameSampler {
    FrameSampler::from_source(Box::new(CountingSource::new(total, fps)))
  }

  #[test]
  fn stride_is_rounded_rate_times_interval() {
    assert_eq!(FrameSampler::stride(30.0, 3.0), 90);
    assert_eq!(FrameSampler::stride(29.97, 3.0), 90);
    assert_eq!(FrameSampler::stride(25.0, 0.5), 13);
  }

  #[test]
  fn stride_is_at_least_one() {
    assert_eq!(FrameSampler::stride(10.0, 0.01), 1);
  }

  #[test]
  fn timestamps_advance_by_interval() {
    let stamps: Vec<String> = (0..4)
      .map(|i| FrameSampler::timestamp(i, 3.0))
      .collect();
    assert_eq!(stamps, ["0:00:00", "0:00:03", "0:00:06", "0:00:09"]);
  }

  #[test]
  fn timestamp_rolls_into_hours() {
    assert_eq!(FrameSampler::timestamp(1234, 3.0), "1:01:42");
  }

  #[test]
  fn samples_every_stride_frames() {
    // 100 帧 @ 10 fps, 间隔 1 秒 → 步长 10, 采样帧 0,10,...,90
    let windows: Vec<_> = sampler(100, 10.0)
      .sample(1.0, 1, None)
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(windows.len(), 10);
    for (i, window) in windows.iter().enumerate() {
      assert_eq!(window.frames.len(), 1);
      assert_eq!(window.frames[0].index, i as u64 * 10);
      assert_eq!(window.timestamp, FrameSampler::timestamp(i as u64, 1.0));
    }
  }

  #[test]
  fn window_collects_frames_per_sample() {
    let windows: Vec<_> = sampler(100, 10.0)
      .sample(1.0, 3, None)
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(windows.len(), 10);
    for window in &windows {
      assert_eq!(window.frames.len(), 3);
    }
    // 窗口内为连续帧
    assert_eq!(windows[1].frames[0].index, 10);
    assert_eq!(windows[1].frames[2].index, 12);
  }

  #[test]
  fn max_samples_bounds_the_sequence() {
    let windows: Vec<_> = sampler(100, 10.0)
      .sample(1.0, 1, Some(3))
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(windows.len(), 3);
  }

  #[test]
  fn exhausted_source_terminates_normally() {
    // 源长度不足最后一个完整窗口时, 剩余帧仍构成一个窗口
    let windows: Vec<_> = sampler(22, 10.0)
      .sample(1.0, 5, None)
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[2].frames.len(), 2);
  }

  #[test]
  fn single_frame_mode_returns_first_sampled_frame() {
    let frame = sampler(100, 10.0).first_frame(1.0).unwrap().unwrap();
    assert_eq!(frame.index, 0);
  }

  #[test]
  fn single_frame_mode_on_empty_source() {
    assert!(sampler(0, 10.0).first_frame(1.0).unwrap().is_none());
  }
}
