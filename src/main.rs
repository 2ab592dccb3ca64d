//! Drone Copilot 命令行
//!
//! 入口：初始化日志、按配置组装路由器，然后在标准输入上逐行对话。
//! 命令：`/history` 查看历史，`/reset` 清空当前会话，`/config` 查看无人机配置，`/quit` 退出。

use anyhow::Context;
use drone_copilot::agent::{ReplOutput, ReplSession};
use drone_copilot::core::create_copilot_builder;
use drone_copilot::observability;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var("COPILOT_CONFIG").ok().map(Into::into);
    let router = create_copilot_builder(config_path)
        .build()
        .await
        .context("Failed to build copilot")?;

    let thread_id = std::env::var("COPILOT_THREAD").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
    let mut session = ReplSession::new(thread_id);

    println!("Drone Copilot (thread {}). /history /reset /config /quit", session.thread_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match session.handle_line(&router, &line).await {
            ReplOutput::Print(text) => println!("{text}"),
            ReplOutput::Error(text) => eprintln!("{text}"),
            ReplOutput::Quit => break,
        }
    }

    router.supervisor().cancel();
    let (prompt, completion, total) = router.token_usage();
    tracing::info!(prompt, completion, total, "session finished");
    Ok(())
}
