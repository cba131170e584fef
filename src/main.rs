// 该文件是 Dushu （读数） 项目的一部分。
// src/main.rs - 项目主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use dushu::args::Args;
use dushu::config::SessionConfig;
use dushu::pipeline::{self, ControlMessage, ProgressEvent, Termination};

fn main() -> Result<()> {
  tracing_subscriber::fmt().init();

  let args = Args::parse();
  let config = SessionConfig::from_args(&args)?;
  let started_at = chrono::Local::now();

  info!("输入来源: {}", config.source);
  info!(
    "读数位数: {}, 每位 {}x{} 像素",
    config.num_digits, config.crop_width, config.crop_height
  );
  info!(
    "采样间隔: {} 秒, 每样本 {} 帧",
    config.sampling_secs, config.frames_per_sample
  );
  info!(
    "二值化阈值: {}",
    match config.binarize_threshold {
      Some(level) => level.to_string(),
      None => "自动".to_string(),
    }
  );

  let handle = pipeline::spawn(config.clone());

  // Ctrl-C 转为中止指令, 已完成的样本保留
  let control = handle.control_sender();
  ctrlc::set_handler(move || {
    warn!("收到中断信号, 将在当前采样完成后中止...");
    let _ = control.send(ControlMessage::Cancel);
  })
  .expect("无法设置 Ctrl-C 处理器");

  let mut termination = None;
  for event in handle.events() {
    match event {
      ProgressEvent::Sample(sample) => match sample.reading {
        Some(value) => info!(
          "[{}] 读数: {} (失败率 {:.2})",
          sample.timestamp, value, sample.failed_rate
        ),
        None => warn!(
          "[{}] 读数失败 (失败率 {:.2})",
          sample.timestamp, sample.failed_rate
        ),
      },
      // 没有显示层, 预览帧直接丢弃
      ProgressEvent::Preview(_) => {}
      ProgressEvent::Finished(t) => {
        termination = Some(t);
        break;
      }
    }
  }

  let samples = handle.join();

  if let Some(path) = &args.export {
    let report = serde_json::json!({
      "session": {
        "source": config.source,
        "started_at": started_at.to_rfc3339(),
        "num_digits": config.num_digits,
        "sampling_sec": config.sampling_secs,
        "frames_per_sample": config.frames_per_sample,
        "classifier": args.classifier,
      },
      "samples": samples,
    });
    std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    info!("结果已写入: {}", path.display());
  }

  match termination {
    Some(Termination::Completed) => {
      info!("处理完成, 共 {} 个样本", samples.len());
      Ok(())
    }
    Some(Termination::Cancelled) => {
      warn!("已中止, 保留 {} 个样本", samples.len());
      Ok(())
    }
    Some(Termination::Failed(reason)) => {
      error!("运行失败: {}", reason);
      Err(anyhow::anyhow!(reason))
    }
    None => Err(anyhow::anyhow!("事件通道在终态事件前关闭")),
  }
}
