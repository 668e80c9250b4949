//! Sidekick CLI：命令行驱动的任务提交
//!
//! 从标准输入读取任务与成功标准，提交给会话并打印两条对用户可见的输出；
//! 区分「达标」「需要用户补充输入」「系统故障请重试」三种结局。

use std::io::{self, BufRead, Write};

use sidekick::agent::SessionManager;
use sidekick::config::{load_config, AppConfig};
use sidekick::observability;

fn prompt_line(label: &str) -> anyhow::Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None); // EOF
    }
    Ok(Some(line.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let manager = SessionManager::from_config(&cfg)?;
    let session = manager.create_session();
    println!("Session {} ready. Empty task quits.", session.id());

    loop {
        let task = match prompt_line("Task> ")? {
            Some(t) if !t.is_empty() => t,
            _ => break,
        };
        let criterion = match prompt_line("Success criterion> ")? {
            Some(c) if !c.is_empty() => c,
            _ => break,
        };

        match session.submit(&task, &criterion).await {
            Ok(outcome) => {
                println!("\nAssistant: {}\n", outcome.assistant_reply);
                println!("Evaluator: {}\n", outcome.evaluator_feedback);
                if outcome.met_success_criteria {
                    println!("[success criteria met]");
                } else if outcome.required_user_input {
                    println!("[the assistant needs more input from you — refine the task and resubmit]");
                } else {
                    println!("[task still in progress, more turns needed]");
                }
            }
            Err(e) => {
                eprintln!("System failure, please retry: {}", e);
            }
        }
    }

    manager.teardown_session(session.id()).await;
    Ok(())
}
