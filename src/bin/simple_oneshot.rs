// 该文件是 Lvye （绿野） 项目的一部分。
// src/bin/simple_oneshot.rs - 单次检测
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use lvye::{
  DetectionPipeline, Detector, FromUrl, PipelineConfig,
  input::{open_engine, open_input},
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Lvye 单次检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 流水线配置文件 (JSON)
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,
  /// 推理引擎，例如 tensor:?dtype=u8
  #[arg(long, value_name = "ENGINE", default_value = "tensor:?dtype=u8")]
  pub engine: Url,
  /// 输入来源，例如 dir:///data/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 log: 或 record:///data/history
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("配置文件: {}", args.config.display());
  info!("推理引擎: {}", args.engine);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = PipelineConfig::from_json_file(&args.config)?;
  let pipeline = DetectionPipeline::new(config)?;
  let detector = Detector::new(open_engine(&args.engine)?, pipeline);
  let input = open_input(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let summary = OneShotTask.run_task(input, detector, output)?;
  info!("检测到 {} 个目标", summary.confirmed);

  Ok(())
}
