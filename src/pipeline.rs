// 该文件是 Dushu （读数） 项目的一部分。
// src/pipeline.rs - 识别流水线工作线程
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

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use image::GrayImage;
use tracing::{error, info, info_span, warn};

use crate::aggregate::{self, Sample};
use crate::binarize;
use crate::classifier::{self, Classifier};
use crate::config::SessionConfig;
use crate::input::{self, FrameSampler, InputSource, SampleWindow};
use crate::region::RegionExtractor;
use crate::segment;

/// 运行过程中对外发布的事件
pub enum ProgressEvent {
  /// 完成一个采样
  Sample(Sample),
  /// 当前采样窗口的二值化区域(供显示层预览)
  Preview(GrayImage),
  /// 终态, 每次运行只发一次
  Finished(Termination),
}

/// 运行终态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
  /// 输入源正常结束
  Completed,
  /// 被用户中止, 已得样本保留
  Cancelled,
  /// 运行级错误
  Failed(String),
}

/// 显示层发往工作线程的控制消息
pub enum ControlMessage {
  /// 中止运行(即发即忘, 在采样边界生效)
  Cancel,
  /// 更新二值化阈值, 从下一个采样起生效; None 表示自动
  SetThreshold(Option<u8>),
}

/// 一次运行的句柄
///
/// 工作线程独占输入源与分类器; 这里只能发送控制消息、
/// 接收进度事件, 以及等待结束后取回全部样本。
pub struct PipelineHandle {
  control: Sender<ControlMessage>,
  events: Receiver<ProgressEvent>,
  worker: JoinHandle<Vec<Sample>>,
}

impl PipelineHandle {
  /// 请求中止, 在下一个采样边界生效
  pub fn cancel(&self) {
    let _ = self.control.send(ControlMessage::Cancel);
  }

  /// 更新二值化阈值, 从下一个采样起生效
  pub fn set_threshold(&self, level: Option<u8>) {
    let _ = self.control.send(ControlMessage::SetThreshold(level));
  }

  /// 控制消息发送端(供信号处理等另一线程使用)
  pub fn control_sender(&self) -> Sender<ControlMessage> {
    self.control.clone()
  }

  /// 进度事件接收端
  pub fn events(&self) -> &Receiver<ProgressEvent> {
    &self.events
  }

  /// 阻塞等待工作线程结束, 取回按采样顺序排列的全部样本
  pub fn join(self) -> Vec<Sample> {
    self.worker.join().unwrap_or_default()
  }
}

/// 启动一次识别运行, 输入源与分类器按配置在工作线程内创建
pub fn spawn(config: SessionConfig) -> PipelineHandle {
  spawn_inner(config, None)
}

/// 用现成的输入源与分类器启动一次识别运行
pub fn spawn_with(
  config: SessionConfig,
  source: Box<dyn InputSource>,
  classifier: Box<dyn Classifier>,
) -> PipelineHandle {
  spawn_inner(config, Some((source, classifier)))
}

fn spawn_inner(
  config: SessionConfig,
  parts: Option<(Box<dyn InputSource>, Box<dyn Classifier>)>,
) -> PipelineHandle {
  let (control_tx, control_rx) = mpsc::channel();
  let (event_tx, event_rx) = mpsc::channel();
  let worker = thread::Builder::new()
    .name("dushu-pipeline".to_string())
    .spawn(move || run_worker(config, parts, control_rx, event_tx))
    .expect("无法创建工作线程");

  PipelineHandle {
    control: control_tx,
    events: event_rx,
    worker,
  }
}

fn run_worker(
  config: SessionConfig,
  parts: Option<(Box<dyn InputSource>, Box<dyn Classifier>)>,
  control: Receiver<ControlMessage>,
  events: Sender<ProgressEvent>,
) -> Vec<Sample> {
  let span = info_span!("run", source = %config.source);
  let _guard = span.enter();

  let fail = |reason: String| {
    error!("运行失败: {}", reason);
    let _ = events.send(ProgressEvent::Finished(Termination::Failed(reason)));
    Vec::new()
  };

  // 分类器先于输入源构建: 模型缺失必须在处理任何帧之前暴露
  let (source, mut classifier) = match parts {
    Some(parts) => parts,
    None => {
      let classifier =
        match classifier::create_classifier(config.classifier, config.model_path.as_deref()) {
          Ok(classifier) => classifier,
          Err(e) => return fail(e.to_string()),
        };
      let source = match input::create_input_source(&config.source) {
        Ok(source) => source,
        Err(e) => return fail(e.to_string()),
      };
      (source, classifier)
    }
  };

  if let Err(e) = classifier.load() {
    return fail(e.to_string());
  }

  let sampler = FrameSampler::from_source(source);
  let (termination, samples) = run_loop(&config, sampler, classifier.as_ref(), &control, &events);
  match &termination {
    Termination::Completed => info!("处理完成, 共 {} 个样本", samples.len()),
    Termination::Cancelled => info!("已中止, 保留 {} 个样本", samples.len()),
    Termination::Failed(reason) => error!("运行失败: {}", reason),
  }
  let _ = events.send(ProgressEvent::Finished(termination));
  samples
}

fn run_loop(
  config: &SessionConfig,
  sampler: FrameSampler,
  classifier: &dyn Classifier,
  control: &Receiver<ControlMessage>,
  events: &Sender<ProgressEvent>,
) -> (Termination, Vec<Sample>) {
  let extractor = RegionExtractor::new(config.crop_width, config.crop_height, config.num_digits);
  let mut threshold = config.binarize_threshold;
  let mut samples: Vec<Sample> = Vec::new();

  let stride = FrameSampler::stride(sampler.fps(), config.sampling_secs);
  if config.frames_per_sample as u64 > stride {
    warn!(
      "每样本帧数 {} 大于采样步长 {}, 采样点会相应后移",
      config.frames_per_sample, stride
    );
  }

  let mut windows = sampler.sample(
    config.sampling_secs,
    config.frames_per_sample,
    config.max_samples,
  );

  loop {
    let window = match windows.next() {
      Some(Ok(window)) => window,
      Some(Err(e)) => return (Termination::Failed(e.to_string()), samples),
      None => return (Termination::Completed, samples),
    };

    // 控制消息在采样边界统一处理
    let mut cancelled = false;
    loop {
      match control.try_recv() {
        Ok(ControlMessage::Cancel) => cancelled = true,
        Ok(ControlMessage::SetThreshold(level)) => {
          info!("二值化阈值更新为 {:?}", level);
          threshold = level;
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
    }
    if cancelled {
      info!("收到中止指令");
      return (Termination::Cancelled, samples);
    }

    let sample = process_window(config, &extractor, classifier, threshold, &window, events);
    samples.push(sample.clone());
    let _ = events.send(ProgressEvent::Sample(sample));
  }
}

/// 处理一个采样窗口: 逐帧提取/二值化/切分/分类, 再投票合成一个样本
fn process_window(
  config: &SessionConfig,
  extractor: &RegionExtractor,
  classifier: &dyn Classifier,
  threshold: Option<u8>,
  window: &SampleWindow,
  events: &Sender<ProgressEvent>,
) -> Sample {
  let mut per_frame = Vec::with_capacity(window.frames.len());
  let mut preview_sent = false;

  for frame in &window.frames {
    let region = match extractor.extract(&frame.image, &config.click_points) {
      Ok(Some(region)) => region,
      Ok(None) => {
        warn!("第 {} 帧读数区域退化, 跳过该帧", frame.index);
        continue;
      }
      Err(e) => {
        warn!("第 {} 帧角点无效: {}", frame.index, e);
        continue;
      }
    };

    let binary = binarize::binarize(&region, threshold);
    if !preview_sent {
      let _ = events.send(ProgressEvent::Preview(binary.clone()));
      preview_sent = true;
    }

    let cells = match segment::split_digits(&binary, config.num_digits, config.crop_width) {
      Ok(cells) => cells,
      Err(e) => {
        error!("数字切分失败: {}", e);
        continue;
      }
    };

    match classifier.predict_batch(&cells) {
      Ok(results) => per_frame.push(results),
      Err(e) => error!("分类失败: {}", e),
    }
  }

  if per_frame.is_empty() {
    // 整个窗口没有一帧可用, 记失败样本但不中断运行
    return Sample::failed(window.timestamp.clone());
  }

  let voted = aggregate::vote(&per_frame);
  aggregate::aggregate(&voted, config.accept_threshold, window.timestamp.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::classifier::ClassifierKind;
  use crate::input::{Frame, InputSourceType, SourceError};
  use image::RgbImage;
  use std::path::PathBuf;

  /// 帧产出受许可门闸控制的测试输入源
  ///
  /// 每产出一帧消耗一个许可, 测试由此精确决定工作线程
  /// 能推进到哪个采样点。
  struct GatedSource {
    gate: Receiver<()>,
    produced: u64,
    total: u64,
    fps: f64,
  }

  impl Iterator for GatedSource {
    type Item = Result<Frame, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
      if self.produced >= self.total {
        return None;
      }
      // 门闸关闭(发送端被丢弃)视为源结束
      self.gate.recv().ok()?;
      let frame = Frame {
        image: RgbImage::new(64, 32),
        index: self.produced,
        timestamp_ms: self.produced * 100,
      };
      self.produced += 1;
      Some(Ok(frame))
    }
  }

  impl InputSource for GatedSource {
    fn source_type(&self) -> InputSourceType {
      InputSourceType::Video
    }

    fn width(&self) -> u32 {
      64
    }

    fn height(&self) -> u32 {
      32
    }

    fn fps(&self) -> f64 {
      self.fps
    }
  }

  fn test_config() -> SessionConfig {
    SessionConfig {
      source: "gated-test".to_string(),
      click_points: vec![(2, 2), (40, 2), (40, 20), (2, 20)],
      sampling_secs: 10.0,
      frames_per_sample: 1,
      num_digits: 4,
      crop_width: 8,
      crop_height: 10,
      binarize_threshold: Some(128),
      classifier: ClassifierKind::Template,
      model_path: None,
      accept_threshold: 0.0,
      max_samples: None,
    }
  }

  fn loaded_template_classifier() -> Box<dyn Classifier> {
    let mut classifier =
      classifier::create_classifier(ClassifierKind::Template, None).unwrap();
    classifier.load().unwrap();
    classifier
  }

  /// 读事件直到收到 n 个样本事件
  fn wait_samples(handle: &PipelineHandle, n: usize) {
    let mut seen = 0;
    while seen < n {
      match handle.events().recv() {
        Ok(ProgressEvent::Sample(_)) => seen += 1,
        Ok(_) => {}
        Err(_) => panic!("事件通道在收到 {} 个样本前关闭", n),
      }
    }
  }

  fn wait_termination(handle: &PipelineHandle) -> Termination {
    loop {
      match handle.events().recv() {
        Ok(ProgressEvent::Finished(termination)) => return termination,
        Ok(_) => {}
        Err(_) => panic!("事件通道在终态事件前关闭"),
      }
    }
  }

  #[test]
  fn run_completes_when_source_ends() {
    // 30 帧 @ 10 fps, 间隔 1 秒 → 采样帧 0,10,20 共 3 个样本
    let (permit_tx, gate) = mpsc::channel();
    for _ in 0..30 {
      permit_tx.send(()).unwrap();
    }
    drop(permit_tx);

    let mut config = test_config();
    config.sampling_secs = 1.0;
    let source = Box::new(GatedSource {
      gate,
      produced: 0,
      total: 30,
      fps: 10.0,
    });

    let handle = spawn_with(config, source, loaded_template_classifier());
    assert_eq!(wait_termination(&handle), Termination::Completed);
    let samples = handle.join();
    assert_eq!(samples.len(), 3);
    let stamps: Vec<&str> = samples.iter().map(|s| s.timestamp.as_str()).collect();
    assert_eq!(stamps, ["0:00:00", "0:00:01", "0:00:02"]);
  }

  #[test]
  fn cancel_keeps_exactly_the_finished_samples() {
    // 1000 帧 @ 10 fps, 间隔 10 秒 → 步长 100, 最多 10 个样本。
    // 许可精确放行 3 个采样点(第 0 帧 + 两次跨步各 100 帧),
    // 工作线程随后阻塞在第 4 个窗口的拉取上。
    let (permit_tx, gate) = mpsc::channel();
    for _ in 0..201 {
      permit_tx.send(()).unwrap();
    }

    let source = Box::new(GatedSource {
      gate,
      produced: 0,
      total: 1000,
      fps: 10.0,
    });

    let handle = spawn_with(test_config(), source, loaded_template_classifier());
    wait_samples(&handle, 3);

    // 先挂中止指令, 再放行后续帧: 第 4 个窗口拉取完成后
    // 必然先看到中止指令, 样本不会再增加
    handle.cancel();
    for _ in 0..100 {
      permit_tx.send(()).unwrap();
    }

    assert_eq!(wait_termination(&handle), Termination::Cancelled);
    let samples = handle.join();
    assert_eq!(samples.len(), 3);
  }

  #[test]
  fn missing_model_fails_before_any_sample() {
    let mut config = test_config();
    config.classifier = ClassifierKind::Cnn;
    config.model_path = Some(PathBuf::from("/no/such/model.onnx"));
    config.source = "/no/such/video.mp4".to_string();

    let handle = spawn(config);
    match wait_termination(&handle) {
      Termination::Failed(reason) => assert!(reason.contains("模型文件不存在")),
      other => panic!("预期 Failed, 实际为 {:?}", other),
    }
    assert!(handle.join().is_empty());
  }

  #[test]
  fn unavailable_source_fails_the_run() {
    let mut config = test_config();
    config.source = "/no/such/video.mp4".to_string();

    let handle = spawn(config);
    assert!(matches!(wait_termination(&handle), Termination::Failed(_)));
    assert!(handle.join().is_empty());
  }

  #[test]
  fn degenerate_region_records_failed_sample_and_continues() {
    let (permit_tx, gate) = mpsc::channel();
    for _ in 0..25 {
      permit_tx.send(()).unwrap();
    }
    drop(permit_tx);

    let mut config = test_config();
    config.sampling_secs = 1.0;
    // 四个互不相同但共线的角点: 每帧的区域提取都会退化
    config.click_points = vec![(0, 0), (10, 10), (20, 20), (30, 30)];
    let source = Box::new(GatedSource {
      gate,
      produced: 0,
      total: 25,
      fps: 10.0,
    });

    let handle = spawn_with(config, source, loaded_template_classifier());
    assert_eq!(wait_termination(&handle), Termination::Completed);
    let samples = handle.join();
    // 运行不中断, 每个采样都记为失败样本
    assert_eq!(samples.len(), 3);
    for sample in &samples {
      assert_eq!(sample.reading, None);
      assert_eq!(sample.failed_rate, 1.0);
    }
  }

  #[test]
  fn black_frames_degrade_to_failed_samples() {
    let (permit_tx, gate) = mpsc::channel();
    for _ in 0..10 {
      permit_tx.send(()).unwrap();
    }
    drop(permit_tx);

    let mut config = test_config();
    config.sampling_secs = 1.0;
    let source = Box::new(GatedSource {
      gate,
      produced: 0,
      total: 10,
      fps: 10.0,
    });

    let handle = spawn_with(config, source, loaded_template_classifier());
    assert_eq!(wait_termination(&handle), Termination::Completed);
    let samples = handle.join();
    assert_eq!(samples.len(), 1);
    // 全黑帧无法识别: 读数为空, 失败率为 1
    assert_eq!(samples[0].reading, None);
    assert_eq!(samples[0].failed_rate, 1.0);
  }
}
